// ABOUTME: Connection profile shared by the query tool and the dump tool
// ABOUTME: Turns raw connection settings into an ordered argument vector

use std::path::{Path, PathBuf};

/// Raw connection settings as they come from configuration
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub defaults_file: Option<PathBuf>,
    pub defaults_group_suffix: Option<String>,
}

/// Immutable connection arguments, built once and shared read-only by every job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    args: Vec<String>,
}

impl ConnectionProfile {
    /// Build the argument vector understood by both `mysql` and `mysqldump`.
    ///
    /// `--defaults-file` must come first for the MySQL clients to accept it, so
    /// the option file flags lead the vector. A defaults file that does not
    /// exist is skipped.
    pub fn build(settings: &ConnectionSettings) -> Self {
        let mut args = Vec::new();

        if let Some(defaults_file) = &settings.defaults_file {
            let expanded = expand_tilde(defaults_file);
            if expanded.exists() {
                args.push(format!("--defaults-file={}", expanded.display()));
                if let Some(suffix) = non_empty(&settings.defaults_group_suffix) {
                    args.push(format!("--defaults-group-suffix={}", suffix));
                }
            } else {
                tracing::info!("Skipping --defaults-file: {} not found", expanded.display());
            }
        }

        if let Some(user) = non_empty(&settings.user) {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        // The client only accepts an inline password when attached to the flag
        if let Some(password) = non_empty(&settings.password) {
            args.push(format!("-p{}", password));
        }
        if let Some(host) = non_empty(&settings.host) {
            args.push("-h".to_string());
            args.push(host.to_string());
        }
        if let Some(port) = settings.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        if let Some(socket) = non_empty(&settings.socket) {
            args.push("--socket".to_string());
            args.push(socket.to_string());
        }

        Self { args }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument vector with the password masked, for logging
    pub fn redacted_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                if arg.starts_with("-p") && arg.len() > 2 {
                    "-p****".to_string()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Expand a leading `~` to the current user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (raw, home) {
        ("~", Some(home)) => home,
        (rest, Some(home)) if rest.starts_with("~/") => home.join(&rest[2..]),
        _ => path.to_path_buf(),
    }
}
