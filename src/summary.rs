// ABOUTME: Machine-readable summary of a backup run
// ABOUTME: Serialized to JSON with per-job outcomes and SHA-256 digests of produced files

use crate::plan::JobTargets;
use crate::supervisor::{DumpOutcome, DumpResult};
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub version: String,
    pub jobs: Vec<JobSummary>,
    pub archive: Option<FileDigest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub file_name: String,
    pub mode: String,
    pub targets: Vec<String>, // empty means all databases
    pub status: String,       // "succeeded", "exhausted" or "skipped"
    pub attempts: u32,
    pub elapsed_secs: Option<f64>,
    pub error: Option<String>,
    pub file: Option<FileDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

impl FileDigest {
    pub fn compute(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut hasher = Sha256::new();
        let size = io::copy(&mut file, &mut hasher)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(Self {
            path: path.display().to_string(),
            size,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }
}

impl RunSummary {
    /// Digests are taken for files that still exist; compressed originals are gone
    pub fn collect(results: &[DumpResult], archive: Option<&Path>) -> Self {
        let jobs = results.iter().map(JobSummary::from_result).collect();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            jobs,
            archive: archive.and_then(digest_if_present),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
        tracing::info!("Run summary written to {}", path.display());
        Ok(())
    }
}

impl JobSummary {
    fn from_result(result: &DumpResult) -> Self {
        let job = &result.job;
        let targets = match job.targets() {
            JobTargets::All => Vec::new(),
            JobTargets::Databases(dbs) => dbs.clone(),
        };
        let (status, elapsed_secs, error, file) = match &result.outcome {
            DumpOutcome::Succeeded { path, elapsed } => (
                "succeeded",
                Some(elapsed.as_secs_f64()),
                None,
                digest_if_present(path),
            ),
            DumpOutcome::Exhausted { last_error } => {
                ("exhausted", None, Some(last_error.clone()), None)
            }
            DumpOutcome::Skipped => ("skipped", None, None, None),
        };

        Self {
            file_name: job.file_name().to_string(),
            mode: job.mode().to_string(),
            targets,
            status: status.to_string(),
            attempts: result.attempts,
            elapsed_secs,
            error,
            file,
        }
    }
}

fn digest_if_present(path: &Path) -> Option<FileDigest> {
    if !path.exists() {
        return None;
    }
    match FileDigest::compute(path) {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::warn!("Could not checksum {}: {:#}", path.display(), e);
            None
        }
    }
}
