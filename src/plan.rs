// ABOUTME: Builds the ordered list of dump invocations for a run
// ABOUTME: Handles schema/data splitting, table exclusions, and separate-dump mode

use crate::resolve::{QualifiedTable, ResolvedExclusions};
use std::collections::HashSet;
use std::fmt;

const ALL_DATABASES: &str = "--all-databases";
const DATABASES: &str = "--databases";
const NO_DATA: &str = "--no-data";
const SKIP_TRIGGERS: &str = "--skip-triggers";
const TRIGGERS: &str = "--triggers";
const NO_CREATE_INFO: &str = "--no-create-info";

/// File stem used when one job covers several databases
pub const MULTI_DATABASE_STEM: &str = "multiple_databases";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    Full,
    SchemaOnly,
    DataOnly,
}

impl DumpMode {
    fn file_suffix(self) -> &'static str {
        match self {
            DumpMode::Full => "",
            DumpMode::SchemaOnly => "_schema",
            DumpMode::DataOnly => "_data",
        }
    }
}

impl fmt::Display for DumpMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DumpMode::Full => write!(f, "full"),
            DumpMode::SchemaOnly => write!(f, "schema-only"),
            DumpMode::DataOnly => write!(f, "data-only"),
        }
    }
}

/// Databases a job covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTargets {
    All,
    Databases(Vec<String>),
}

impl fmt::Display for JobTargets {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobTargets::All => write!(f, "all databases"),
            JobTargets::Databases(dbs) => write!(f, "{}", dbs.join(", ")),
        }
    }
}

/// One dump tool invocation. Built once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpJob {
    args: Vec<String>,
    targets: JobTargets,
    mode: DumpMode,
    file_name: String,
}

impl DumpJob {
    fn new(args: Vec<String>, targets: JobTargets, mode: DumpMode, stem: &str) -> Self {
        Self {
            args,
            targets,
            mode,
            file_name: format!("{}{}.sql", stem, mode.file_suffix()),
        }
    }

    /// Job-specific flags, without connection or passthrough flags
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn targets(&self) -> &JobTargets {
        &self.targets
    }

    pub fn mode(&self) -> DumpMode {
        self.mode
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    pub all_databases: bool,
    pub separate_dumps: bool,
}

/// Turn resolved targets and exclusions into the ordered job list.
///
/// `excluded` tables lose both schema and data; `data_excluded` tables keep
/// their schema, which forces a schema job and a data job for the affected
/// targets. With `all_databases` set, `targets` is ignored and separate mode
/// does not apply.
pub fn build_plan(
    targets: &[String],
    excluded: &ResolvedExclusions,
    data_excluded: &ResolvedExclusions,
    options: PlanOptions,
) -> Vec<DumpJob> {
    let separate = options.separate_dumps && !options.all_databases;

    let mut base: Vec<String> = excluded.tables.iter().map(ignore_flag).collect();
    if options.all_databases {
        base.push(ALL_DATABASES.to_string());
    } else if !separate {
        base.push(DATABASES.to_string());
        base.extend(targets.iter().cloned());
    }

    let mut jobs = Vec::new();

    if separate {
        for database in targets {
            let only = JobTargets::Databases(vec![database.clone()]);
            if data_excluded.has_entries_for(database) {
                let mut schema = schema_args(&base);
                schema.push(database.clone());
                let mut data = data_args(&base, data_excluded.tables_in(database));
                data.push(database.clone());

                jobs.push(DumpJob::new(schema, only.clone(), DumpMode::SchemaOnly, database));
                jobs.push(DumpJob::new(data, only, DumpMode::DataOnly, database));
            } else {
                let mut full = base.clone();
                full.push(database.clone());
                jobs.push(DumpJob::new(full, only, DumpMode::Full, database));
            }
        }
        for name in duplicate_file_names(&jobs) {
            tracing::warn!(
                "Several dump jobs write {}; later jobs overwrite earlier output",
                name
            );
        }
        return jobs;
    }

    let (job_targets, stem) = if options.all_databases {
        (JobTargets::All, MULTI_DATABASE_STEM)
    } else if let [single] = targets {
        (JobTargets::Databases(targets.to_vec()), single.as_str())
    } else {
        (JobTargets::Databases(targets.to_vec()), MULTI_DATABASE_STEM)
    };

    if data_excluded.is_empty() {
        jobs.push(DumpJob::new(base, job_targets, DumpMode::Full, stem));
    } else {
        let schema = schema_args(&base);
        let data = data_args(&base, data_excluded.tables.iter());
        jobs.push(DumpJob::new(schema, job_targets.clone(), DumpMode::SchemaOnly, stem));
        jobs.push(DumpJob::new(data, job_targets, DumpMode::DataOnly, stem));
    }

    jobs
}

/// File names claimed by more than one job, in first-seen order
pub fn duplicate_file_names(jobs: &[DumpJob]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for job in jobs {
        let name = job.file_name();
        if !seen.insert(name) && !duplicates.contains(&name) {
            duplicates.push(name);
        }
    }
    duplicates
}

fn ignore_flag(table: &QualifiedTable) -> String {
    format!("--ignore-table={}", table)
}

fn schema_args(base: &[String]) -> Vec<String> {
    let mut args: Vec<String> = base.iter().filter(|a| *a != TRIGGERS).cloned().collect();
    args.push(NO_DATA.to_string());
    args.push(SKIP_TRIGGERS.to_string());
    args
}

fn data_args<'a>(base: &[String], tables: impl Iterator<Item = &'a QualifiedTable>) -> Vec<String> {
    let mut args = base.to_vec();
    args.push(NO_CREATE_INFO.to_string());
    args.extend(tables.map(ignore_flag));
    args
}
