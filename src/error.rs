// ABOUTME: Custom error types for the dump orchestrator
// ABOUTME: Separates per-attempt failures from fatal preparation errors

use std::fmt;

#[derive(Debug)]
pub enum DumpError {
    /// Every target pattern resolved to nothing
    NoTargetsMatched,
    /// Exclusion entry not of the form `database.pattern`
    InvalidExclusion(String),
    /// None of the candidate executables is on PATH
    ExecutableNotFound(Vec<String>),
    /// Subprocess could not be started or its output file created
    Launch(String),
    /// Subprocess exited unsuccessfully; `None` when killed by a signal
    ExitStatus(Option<i32>),
    /// Query tool invocation or output parsing failed
    Query(String),
    Config(String),
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DumpError::NoTargetsMatched => {
                write!(f, "Resolution error: no databases matched the provided patterns")
            }
            DumpError::InvalidExclusion(entry) => write!(
                f,
                "Invalid exclude pattern: {}. Expected 'database.table'",
                entry
            ),
            DumpError::ExecutableNotFound(names) => write!(
                f,
                "Executable not found: none of {} is in PATH",
                names.join(", ")
            ),
            DumpError::Launch(msg) => write!(f, "Launch error: {}", msg),
            DumpError::ExitStatus(Some(code)) => {
                write!(f, "Dump tool exited with status {}", code)
            }
            DumpError::ExitStatus(None) => write!(f, "Dump tool was terminated by a signal"),
            DumpError::Query(msg) => write!(f, "Query error: {}", msg),
            DumpError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for DumpError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            DumpError::ExitStatus(Some(2)).to_string(),
            "Dump tool exited with status 2"
        );
        assert_eq!(
            DumpError::ExecutableNotFound(vec!["mysqldump".to_string(), "mariadb-dump".to_string()])
                .to_string(),
            "Executable not found: none of mysqldump, mariadb-dump is in PATH"
        );
        assert!(DumpError::InvalidExclusion("nodot".to_string())
            .to_string()
            .contains("nodot"));
    }
}
