// ABOUTME: Runs dump jobs as subprocesses with retries and progress tracking
// ABOUTME: Streams stdout into the destination file while polling its size

use crate::error::DumpError;
use crate::mysql::{Catalog, ConnectionProfile};
use crate::plan::{DumpJob, JobTargets};
use crate::progress::Reporter;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;

/// Dump tool names tried in order
pub const DUMP_TOOL_CANDIDATES: &[&str] = &["mysqldump", "mariadb-dump"];

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub output_dir: PathBuf,
    /// Extra attempts after the first one
    pub retries: u32,
    pub retry_interval: Duration,
    pub dry_run: bool,
    /// Unrecognized user flags, forwarded verbatim
    pub passthrough: Vec<String>,
    pub dump_tools: Vec<String>,
}

impl SupervisorOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            retries: 3,
            retry_interval: Duration::from_secs(30),
            dry_run: false,
            passthrough: Vec::new(),
            dump_tools: DUMP_TOOL_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Lifecycle of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Attempting(u32),
    Retrying(u32),
    Succeeded,
    Exhausted,
}

impl JobState {
    /// State after attempt number `attempt` (1-based) failed
    pub fn after_failure(attempt: u32, max_attempts: u32) -> Self {
        if attempt >= max_attempts {
            JobState::Exhausted
        } else {
            JobState::Retrying(attempt)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    Succeeded { path: PathBuf, elapsed: Duration },
    Exhausted { last_error: String },
    /// Dry run; nothing was launched
    Skipped,
}

#[derive(Debug, Clone)]
pub struct DumpResult {
    pub job: DumpJob,
    pub attempts: u32,
    pub outcome: DumpOutcome,
}

impl DumpResult {
    pub fn output_path(&self) -> Option<&Path> {
        match &self.outcome {
            DumpOutcome::Succeeded { path, .. } => Some(path.as_path()),
            _ => None,
        }
    }
}

/// Output paths of succeeded jobs, in job order
pub fn succeeded_paths(results: &[DumpResult]) -> Vec<PathBuf> {
    results
        .iter()
        .filter_map(|r| r.output_path().map(Path::to_path_buf))
        .collect()
}

/// Drives jobs strictly one after another, one attempt at a time
pub struct Supervisor<'a, C> {
    catalog: &'a C,
    profile: &'a ConnectionProfile,
    options: SupervisorOptions,
    reporter: Reporter,
}

impl<'a, C: Catalog> Supervisor<'a, C> {
    pub fn new(
        catalog: &'a C,
        profile: &'a ConnectionProfile,
        options: SupervisorOptions,
        reporter: Reporter,
    ) -> Self {
        Self {
            catalog,
            profile,
            options,
            reporter,
        }
    }

    /// Run every job. One job's exhaustion never stops the ones after it.
    pub async fn run(&self, jobs: &[DumpJob]) -> Vec<DumpResult> {
        if self.options.dry_run {
            tracing::info!("Dry-run mode enabled. No commands will be executed.");
        }

        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let result = self.run_job(job).await;
            match &result.outcome {
                DumpOutcome::Succeeded { path, elapsed } => tracing::info!(
                    "Dump completed successfully in {:.1?}: {}",
                    elapsed,
                    path.display()
                ),
                DumpOutcome::Exhausted { last_error } => tracing::error!(
                    "Backup of {} failed after {} attempt(s): {}",
                    job.targets(),
                    result.attempts,
                    last_error
                ),
                DumpOutcome::Skipped => {}
            }
            results.push(result);
        }
        results
    }

    async fn run_job(&self, job: &DumpJob) -> DumpResult {
        // Sizing only feeds the progress bar, so a dry run skips it
        let estimated = if self.options.dry_run {
            None
        } else {
            blocking(|| self.estimate_size(job.targets()))
        };
        tracing::info!(
            "Starting {} backup for databases: {}",
            job.mode(),
            job.targets()
        );

        let max_attempts = self.options.max_attempts();
        let path = self.options.output_dir.join(job.file_name());
        let mut state = JobState::Pending;
        let mut last_error = String::new();
        let mut attempt = 0;

        while attempt < max_attempts {
            attempt += 1;
            state = JobState::Attempting(attempt);
            tracing::info!(
                "Attempt {}/{} for dumping database(s)",
                attempt,
                max_attempts
            );
            tracing::debug!("Job {} is {:?}", job.file_name(), state);

            let binary = self.locate_dump_tool();
            let args = self.command_args(job);

            if self.options.dry_run {
                let shown = binary
                    .as_ref()
                    .map(|b| b.display().to_string())
                    .unwrap_or_else(|_| self.options.dump_tools.join("|"));
                tracing::info!("[dry-run] {} {}", shown, self.redacted(job).join(" "));
                return DumpResult {
                    job: job.clone(),
                    attempts: attempt,
                    outcome: DumpOutcome::Skipped,
                };
            }

            let outcome = match binary {
                Ok(binary) => {
                    tracing::debug!(
                        "Executing command: {} {}",
                        binary.display(),
                        self.redacted(job).join(" ")
                    );
                    self.execute(&binary, &args, &path, estimated).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(elapsed) => {
                    state = JobState::Succeeded;
                    tracing::debug!("Job {} is {:?}", job.file_name(), state);
                    return DumpResult {
                        job: job.clone(),
                        attempts: attempt,
                        outcome: DumpOutcome::Succeeded { path, elapsed },
                    };
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    last_error = e.to_string();
                    state = JobState::after_failure(attempt, max_attempts);
                    tracing::debug!("Job {} is {:?}", job.file_name(), state);
                    if let JobState::Retrying(_) = state {
                        tokio::time::sleep(self.options.retry_interval).await;
                    }
                }
            }
        }

        debug_assert_eq!(state, JobState::Exhausted);
        DumpResult {
            job: job.clone(),
            attempts: attempt,
            outcome: DumpOutcome::Exhausted { last_error },
        }
    }

    /// Best-effort byte estimate; failures only cost the progress bar its total
    fn estimate_size(&self, targets: &JobTargets) -> Option<u64> {
        let databases = match targets {
            JobTargets::All => self.catalog.all_databases(),
            JobTargets::Databases(dbs) => Ok(dbs.clone()),
        };

        match databases.and_then(|dbs| self.catalog.total_size(&dbs)) {
            Ok(size) => {
                tracing::info!("Estimated database size: {} bytes", size);
                Some(size)
            }
            Err(e) => {
                tracing::warn!("Error calculating expected dump size: {:#}", e);
                None
            }
        }
    }

    fn locate_dump_tool(&self) -> Result<PathBuf, DumpError> {
        self.options
            .dump_tools
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| DumpError::ExecutableNotFound(self.options.dump_tools.clone()))
    }

    /// Connection flags, then passthrough flags, then the job's own flags.
    /// Rebuilt identically on every attempt.
    fn command_args(&self, job: &DumpJob) -> Vec<String> {
        self.profile
            .args()
            .iter()
            .chain(&self.options.passthrough)
            .chain(job.args())
            .cloned()
            .collect()
    }

    fn redacted(&self, job: &DumpJob) -> Vec<String> {
        let mut args = self.profile.redacted_args();
        args.extend(self.options.passthrough.iter().cloned());
        args.extend(job.args().iter().cloned());
        args
    }

    /// One live attempt. The destination is only removed on failure when this
    /// attempt created it, so an earlier file survives a missing tool or an
    /// unwritable output directory.
    async fn execute(
        &self,
        binary: &Path,
        args: &[String],
        path: &Path,
        estimated: Option<u64>,
    ) -> Result<Duration, DumpError> {
        std::fs::create_dir_all(&self.options.output_dir).map_err(|e| {
            DumpError::Launch(format!(
                "Failed to create output directory {}: {}",
                self.options.output_dir.display(),
                e
            ))
        })?;
        let file = std::fs::File::create(path).map_err(|e| {
            DumpError::Launch(format!(
                "Failed to create output file {}: {}",
                path.display(),
                e
            ))
        })?;

        let result = self.stream_to_file(binary, args, file, path, estimated).await;
        if result.is_err() {
            remove_partial(path);
        }
        result
    }

    /// The child is awaited on its own task while this task polls the
    /// destination file size until the completion signal arrives.
    async fn stream_to_file(
        &self,
        binary: &Path,
        args: &[String],
        file: std::fs::File,
        path: &Path,
        estimated: Option<u64>,
    ) -> Result<Duration, DumpError> {
        let started = Instant::now();
        let mut child = tokio::process::Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                DumpError::Launch(format!("Failed to start {}: {}", binary.display(), e))
            })?;
        tracing::info!("Dump process started...");

        let (done_tx, mut done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = done_tx.send(child.wait().await);
        });

        let bar = self.reporter.byte_progress(estimated, "Dumping database...");
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        let finished = loop {
            tokio::select! {
                biased;
                finished = &mut done_rx => break finished,
                _ = ticker.tick() => {
                    if let Ok(meta) = tokio::fs::metadata(path).await {
                        bar.set_position(meta.len());
                    }
                }
            }
        };

        match finished {
            Ok(Ok(status)) if status.success() => {
                if let Ok(meta) = tokio::fs::metadata(path).await {
                    bar.set_position(meta.len());
                }
                bar.finish();
                Ok(started.elapsed())
            }
            Ok(Ok(status)) => {
                bar.abandon();
                Err(DumpError::ExitStatus(status.code()))
            }
            Ok(Err(e)) => {
                bar.abandon();
                Err(DumpError::Launch(format!("Failed to wait for dump process: {}", e)))
            }
            Err(_) => {
                bar.abandon();
                Err(DumpError::Launch(
                    "dump process watcher exited without reporting".to_string(),
                ))
            }
        }
    }
}

/// Run a blocking catalog lookup without stalling the other worker threads.
/// A current-thread runtime has nowhere to move its tasks, so the call runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
