// ABOUTME: Orchestrates a backup run from resolved targets to archived output
// ABOUTME: Prepare resolves and plans; run executes jobs then post-processes the files

use crate::config::RunConfig;
use crate::error::DumpError;
use crate::mysql::{Catalog, ConnectionProfile, MysqlClient};
use crate::plan::{build_plan, DumpJob, PlanOptions};
use crate::postprocess::{apply_compression, archive_prefix, remove_definers_from_all, CompressionFormat};
use crate::progress::Reporter;
use crate::resolve::{expand_database_list, resolve_exclusions};
use crate::summary::RunSummary;
use crate::supervisor::{
    succeeded_paths, DumpOutcome, DumpResult, Supervisor, SupervisorOptions, DUMP_TOOL_CANDIDATES,
};
use anyhow::Result;
use std::path::PathBuf;

/// What a finished run produced
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<DumpResult>,
    pub archive: Option<PathBuf>,
}

impl RunReport {
    pub fn failed_jobs(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, DumpOutcome::Exhausted { .. }))
            .count()
    }
}

pub struct Runner<C> {
    config: RunConfig,
    profile: ConnectionProfile,
    catalog: C,
    reporter: Reporter,
    dump_tools: Vec<String>,
}

impl Runner<MysqlClient> {
    pub fn new(config: RunConfig, reporter: Reporter) -> Self {
        let profile = ConnectionProfile::build(&config.connection);
        let catalog = MysqlClient::new(profile.clone());
        Self::with_catalog(config, profile, catalog, reporter)
    }
}

impl<C: Catalog> Runner<C> {
    pub fn with_catalog(
        config: RunConfig,
        profile: ConnectionProfile,
        catalog: C,
        reporter: Reporter,
    ) -> Self {
        Self {
            config,
            profile,
            catalog,
            reporter,
            dump_tools: DUMP_TOOL_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Override the dump executables tried in order
    pub fn with_dump_tools(mut self, tools: Vec<String>) -> Self {
        self.dump_tools = tools;
        self
    }

    /// Resolve targets and exclusions against the live server and build the plan.
    ///
    /// Fails before anything runs when a non-empty target list resolves to nothing.
    pub fn prepare(&self) -> Result<Vec<DumpJob>> {
        let config = &self.config;
        if config.all_databases && config.separate_dumps {
            tracing::warn!("--separate-dumps has no effect together with --all-databases");
        }

        let targets = if config.all_databases {
            Vec::new()
        } else {
            let resolved = expand_database_list(&self.catalog, &config.databases);
            if resolved.is_empty() {
                tracing::error!("No databases matched the provided patterns.");
                return Err(DumpError::NoTargetsMatched.into());
            }
            resolved
        };

        let excluded = resolve_exclusions(&self.catalog, &config.exclude_tables);
        let data_excluded = resolve_exclusions(&self.catalog, &config.exclude_tables_data);

        let jobs = build_plan(
            &targets,
            &excluded,
            &data_excluded,
            PlanOptions {
                all_databases: config.all_databases,
                separate_dumps: config.separate_dumps,
            },
        );

        tracing::info!("Planned {} dump job(s)", jobs.len());
        for job in &jobs {
            tracing::debug!(
                "{} -> {} ({}): {}",
                job.targets(),
                job.file_name(),
                job.mode(),
                job.args().join(" ")
            );
        }
        Ok(jobs)
    }

    /// Execute every job, then post-process whatever succeeded
    pub async fn run(&self, jobs: &[DumpJob]) -> RunReport {
        let config = &self.config;
        let options = SupervisorOptions {
            output_dir: config.output_dir.clone(),
            retries: config.retries,
            retry_interval: config.retry_interval,
            dry_run: config.dry_run,
            passthrough: config.passthrough.clone(),
            dump_tools: self.dump_tools.clone(),
        };
        let supervisor = Supervisor::new(&self.catalog, &self.profile, options, self.reporter);
        let results = supervisor.run(jobs).await;

        if config.dry_run {
            return RunReport {
                results,
                archive: None,
            };
        }

        let files = succeeded_paths(&results);
        if config.remove_definers {
            remove_definers_from_all(&files);
        }

        let archive = match config.compression.parse::<CompressionFormat>() {
            Ok(format) => {
                let prefix = archive_prefix(&config.output_dir, &files);
                apply_compression(&prefix, format, &files)
            }
            Err(e) => {
                tracing::error!("{}. Skipping compression.", e);
                None
            }
        };

        if let Some(path) = &config.summary {
            let summary = RunSummary::collect(&results, archive.as_deref());
            if let Err(e) = summary.write_to(path) {
                tracing::error!("{:#}", e);
            }
        }

        RunReport { results, archive }
    }
}
