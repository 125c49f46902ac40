// ABOUTME: Command-line and config-file options for a backup run
// ABOUTME: Unknown flags are split off before parsing and forwarded to the dump tool

use crate::logging::Verbosity;
use crate::mysql::ConnectionSettings;
use anyhow::{bail, Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DEFAULTS_FILE: &str = "~/.my.cnf";
const DEFAULT_OUTPUT: &str = "./";
const DEFAULT_COMPRESSION: &str = "none";
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;

/// MySQL/MariaDB backup tool built on mysqldump.
///
/// Supports multiple databases with glob patterns, table and data exclusions,
/// retries, progress display, optional DEFINER removal and compression.
/// Flags not listed here are passed through to mysqldump unchanged.
#[derive(Parser, Debug, Default)]
#[command(name = "magicdump", version, disable_help_flag = true)]
pub struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    #[allow(dead_code)]
    help: Option<bool>,

    /// MySQL username
    #[arg(short = 'u', long, value_name = "USER")]
    pub user: Option<String>,

    /// MySQL password
    #[arg(
        short = 'p',
        long,
        value_name = "PASSWORD",
        env = "MAGICDUMP_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// MySQL host address
    #[arg(short = 'h', long, value_name = "HOST")]
    pub host: Option<String>,

    /// MySQL port
    #[arg(short = 'P', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Path to MySQL socket
    #[arg(short = 's', long, value_name = "SOCKET")]
    pub socket: Option<String>,

    /// Path to MySQL defaults file [default: ~/.my.cnf]
    #[arg(long, value_name = "FILE")]
    pub defaults_file: Option<PathBuf>,

    /// Suffix appended to the default group name in the MySQL option file
    #[arg(long, value_name = "SUFFIX")]
    pub defaults_group_suffix: Option<String>,

    /// Dump all databases
    #[arg(long)]
    pub all_databases: bool,

    /// Comma-separated list of databases to dump. Supports glob patterns (* and ?) per entry.
    #[arg(long, value_delimiter = ',', value_name = "DATABASE1,DATABASE2")]
    pub databases: Vec<String>,

    /// Create separate dump files for each database provided with --databases
    #[arg(long)]
    pub separate_dumps: bool,

    /// Comma-separated list of tables to exclude. Supports glob patterns (* and ?).
    #[arg(long = "exclude", value_delimiter = ',', value_name = "DB1.TABLE1,DB2.TABLE2")]
    pub exclude_tables: Vec<String>,

    /// Comma-separated list of tables to exclude data from, keeping the schema. Supports glob patterns (* and ?).
    #[arg(long = "exclude-data", value_delimiter = ',', value_name = "DB1.TABLE1,DB2.TABLE2")]
    pub exclude_tables_data: Vec<String>,

    /// Output directory [default: ./]
    #[arg(long = "output", value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Compression type (tgz, tbz2, zip, none) [default: none]
    #[arg(long, value_name = "TYPE")]
    pub compression: Option<String>,

    /// Simulate the dump process
    #[arg(long)]
    pub dry_run: bool,

    /// Remove DEFINER clauses from the dump files
    #[arg(long)]
    pub remove_definers: bool,

    /// Number of retries on failure [default: 3]
    #[arg(long, value_name = "NUM_RETRIES")]
    pub retries: Option<u32>,

    /// Seconds between retries [default: 30]
    #[arg(long, value_name = "SECONDS")]
    pub retry_interval: Option<u64>,

    /// Only print errors to stderr
    #[arg(short = 'q', long)]
    pub silent: bool,

    /// Enable verbose (debug) logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// TOML file with default values for any of these options
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a JSON summary of the run to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    #[arg(skip)]
    pub passthrough: Vec<String>,
}

/// Option defaults loaded from `--config`. Keys mirror the long flag names.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub defaults_file: Option<PathBuf>,
    pub defaults_group_suffix: Option<String>,
    pub all_databases: Option<bool>,
    pub databases: Option<Vec<String>>,
    pub separate_dumps: Option<bool>,
    pub exclude: Option<Vec<String>>,
    pub exclude_data: Option<Vec<String>>,
    pub output: Option<PathBuf>,
    pub compression: Option<String>,
    pub dry_run: Option<bool>,
    pub remove_definers: Option<bool>,
    pub retries: Option<u32>,
    pub retry_interval: Option<u64>,
    pub silent: Option<bool>,
    pub verbose: Option<bool>,
    pub summary: Option<PathBuf>,
    /// Extra flags forwarded to the dump tool
    pub passthrough: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Everything a run needs, after defaults and validation
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub connection: ConnectionSettings,
    pub all_databases: bool,
    pub databases: Vec<String>,
    pub separate_dumps: bool,
    pub exclude_tables: Vec<String>,
    pub exclude_tables_data: Vec<String>,
    pub output_dir: PathBuf,
    pub compression: String,
    pub dry_run: bool,
    pub remove_definers: bool,
    pub retries: u32,
    pub retry_interval: Duration,
    pub verbosity: Verbosity,
    pub passthrough: Vec<String>,
    pub summary: Option<PathBuf>,
}

impl Cli {
    /// Parse `args`, forwarding flags this tool does not know
    pub fn parse_with_passthrough<I>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = String>,
    {
        let (known, passthrough) = split_passthrough(args.into_iter().collect());
        let mut cli = Cli::try_parse_from(known)?;
        cli.passthrough = passthrough;
        Ok(cli)
    }

    /// Merge in the config file, apply defaults, and validate
    pub fn into_config(self) -> Result<RunConfig> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    fn merge(self, file: FileConfig) -> Result<RunConfig> {
        let connection = ConnectionSettings {
            user: self.user.or(file.user),
            password: self.password.or(file.password),
            host: self.host.or(file.host),
            port: self.port.or(file.port),
            socket: self.socket.or(file.socket),
            defaults_file: Some(
                self.defaults_file
                    .or(file.defaults_file)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DEFAULTS_FILE)),
            ),
            defaults_group_suffix: self.defaults_group_suffix.or(file.defaults_group_suffix),
        };

        let all_databases = self.all_databases || file.all_databases.unwrap_or(false);
        let databases = non_empty_entries(prefer(self.databases, file.databases));
        if !all_databases && databases.is_empty() {
            bail!(crate::error::DumpError::Config(
                "either --all-databases or --databases must be given".to_string()
            ));
        }

        let mut passthrough = file.passthrough.unwrap_or_default();
        passthrough.extend(self.passthrough);

        Ok(RunConfig {
            connection,
            all_databases,
            databases,
            separate_dumps: self.separate_dumps || file.separate_dumps.unwrap_or(false),
            exclude_tables: non_empty_entries(prefer(self.exclude_tables, file.exclude)),
            exclude_tables_data: non_empty_entries(prefer(
                self.exclude_tables_data,
                file.exclude_data,
            )),
            output_dir: self
                .output_path
                .or(file.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            compression: self
                .compression
                .or(file.compression)
                .unwrap_or_else(|| DEFAULT_COMPRESSION.to_string()),
            dry_run: self.dry_run || file.dry_run.unwrap_or(false),
            remove_definers: self.remove_definers || file.remove_definers.unwrap_or(false),
            retries: self.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
            retry_interval: Duration::from_secs(
                self.retry_interval
                    .or(file.retry_interval)
                    .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS),
            ),
            verbosity: Verbosity::from_flags(
                self.silent || file.silent.unwrap_or(false),
                self.verbose || file.verbose.unwrap_or(false),
            ),
            passthrough,
            summary: self.summary.or(file.summary),
        })
    }
}

fn prefer(cli: Vec<String>, file: Option<Vec<String>>) -> Vec<String> {
    if cli.is_empty() {
        file.unwrap_or_default()
    } else {
        cli
    }
}

fn non_empty_entries(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

struct KnownFlag {
    long: Option<String>,
    short: Option<char>,
    takes_value: bool,
}

fn known_flags() -> Vec<KnownFlag> {
    let mut command = Cli::command();
    command.build();
    command
        .get_arguments()
        .map(|arg| KnownFlag {
            long: arg.get_long().map(str::to_string),
            short: arg.get_short(),
            takes_value: arg.get_action().takes_values(),
        })
        .collect()
}

/// Separate raw arguments into the ones clap understands and passthrough flags.
///
/// An unknown `-x`/`--xyz` token is forwarded together with the following token
/// when that one does not look like a flag. Everything after `--` is forwarded.
pub fn split_passthrough(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let flags = known_flags();
    let mut known = Vec::new();
    let mut passthrough = Vec::new();
    let mut iter = args.into_iter().peekable();

    // Program name
    if let Some(program) = iter.next() {
        known.push(program);
    }

    while let Some(token) = iter.next() {
        if token == "--" {
            passthrough.extend(iter.by_ref());
            break;
        }

        let matched = if let Some(long) = token.strip_prefix("--") {
            let name = long.split('=').next().unwrap_or(long);
            flags
                .iter()
                .find(|f| f.long.as_deref() == Some(name))
                .map(|f| f.takes_value && !long.contains('='))
        } else if token.len() > 1 && token.starts_with('-') {
            let short = token.chars().nth(1);
            flags
                .iter()
                .find(|f| f.short.is_some() && f.short == short)
                .map(|f| f.takes_value && token.len() == 2)
        } else {
            known.push(token);
            continue;
        };

        match matched {
            Some(needs_value) => {
                known.push(token);
                if needs_value {
                    if let Some(value) = iter.next() {
                        known.push(value);
                    }
                }
            }
            None => {
                let attached = token.contains('=');
                passthrough.push(token);
                if !attached {
                    if let Some(value) = iter.next_if(|next| !next.starts_with('-')) {
                        passthrough.push(value);
                    }
                }
            }
        }
    }

    (known, passthrough)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        std::iter::once("magicdump")
            .chain(items.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_with_passthrough(args(&["--databases", "shop"])).unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.databases, vec!["shop"]);
        assert_eq!(config.retries, 3);
        assert_eq!(config.retry_interval, Duration::from_secs(30));
        assert_eq!(config.output_dir, PathBuf::from("./"));
        assert_eq!(config.compression, "none");
        assert_eq!(
            config.connection.defaults_file,
            Some(PathBuf::from("~/.my.cnf"))
        );
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert!(config.passthrough.is_empty());
    }

    #[test]
    fn test_mysql_style_short_flags() {
        let cli = Cli::parse_with_passthrough(args(&[
            "-u", "root", "-psecret", "-h", "db.local", "-P", "3307", "--all-databases",
        ]))
        .unwrap();

        assert_eq!(cli.user.as_deref(), Some("root"));
        assert_eq!(cli.password.as_deref(), Some("secret"));
        assert_eq!(cli.host.as_deref(), Some("db.local"));
        assert_eq!(cli.port, Some(3307));
        assert!(cli.all_databases);
    }

    #[test]
    fn test_comma_separated_lists() {
        let cli = Cli::parse_with_passthrough(args(&[
            "--databases",
            "shop,user_*,,blog",
            "--exclude",
            "shop.tmp_*",
            "--exclude-data=shop.logs,blog.cache",
        ]))
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.databases, vec!["shop", "user_*", "blog"]);
        assert_eq!(config.exclude_tables, vec!["shop.tmp_*"]);
        assert_eq!(config.exclude_tables_data, vec!["shop.logs", "blog.cache"]);
    }

    #[test]
    fn test_unknown_flags_are_passed_through() {
        let cli = Cli::parse_with_passthrough(args(&[
            "--single-transaction",
            "--databases",
            "shop",
            "--max-allowed-packet",
            "512M",
            "--where=id>10",
            "-v",
        ]))
        .unwrap();

        assert_eq!(
            cli.passthrough,
            vec!["--single-transaction", "--max-allowed-packet", "512M", "--where=id>10"]
        );
        assert_eq!(cli.databases, vec!["shop"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_everything_after_double_dash_is_passed_through() {
        let (known, passthrough) =
            split_passthrough(args(&["--databases", "shop", "--", "--routines", "--events"]));
        assert_eq!(known, args(&["--databases", "shop"]));
        assert_eq!(passthrough, vec!["--routines", "--events"]);
    }

    #[test]
    fn test_known_flag_value_is_never_passed_through() {
        let (known, passthrough) = split_passthrough(args(&["--password", "-odd-", "--all-databases"]));
        assert_eq!(known, args(&["--password", "-odd-", "--all-databases"]));
        assert!(passthrough.is_empty());
    }

    #[test]
    fn test_missing_targets_rejected() {
        let cli = Cli::parse_with_passthrough(args(&["--separate-dumps"])).unwrap();
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn test_silent_and_verbose() {
        let cli = Cli::parse_with_passthrough(args(&["-q", "-v", "--all-databases"])).unwrap();
        assert_eq!(cli.into_config().unwrap().verbosity, Verbosity::Silent);
    }

    #[test]
    fn test_config_file_supplies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("magicdump.toml");
        std::fs::write(
            &path,
            r#"
user = "backup"
host = "db.internal"
databases = ["shop", "blog"]
retries = 5
compression = "tgz"
passthrough = ["--single-transaction"]
"#,
        )
        .unwrap();

        let cli = Cli::parse_with_passthrough(args(&[
            "--config",
            path.to_str().unwrap(),
            "--host",
            "db.override",
            "--routines",
        ]))
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.connection.user.as_deref(), Some("backup"));
        assert_eq!(config.connection.host.as_deref(), Some("db.override"));
        assert_eq!(config.databases, vec!["shop", "blog"]);
        assert_eq!(config.retries, 5);
        assert_eq!(config.compression, "tgz");
        assert_eq!(config.passthrough, vec!["--single-transaction", "--routines"]);
    }

    #[test]
    fn test_config_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "retires = 4\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
