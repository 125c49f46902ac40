// ABOUTME: Live server metadata lookups through the mysql command-line client
// ABOUTME: Lists databases and tables by LIKE pattern and sums their on-disk size

use crate::error::DumpError;
use crate::mysql::connection::ConnectionProfile;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;

/// Query tool names tried in order
pub const QUERY_TOOL_CANDIDATES: &[&str] = &["mysql", "mariadb"];

/// Metadata the dump plan needs from the live server.
///
/// Patterns are already in the server's LIKE syntax. Every method returns the
/// matched names in the order the server lists them.
pub trait Catalog {
    fn databases_like(&self, pattern: &str) -> Result<Vec<String>>;

    fn tables_like(&self, database: &str, pattern: &str) -> Result<Vec<String>>;

    fn all_databases(&self) -> Result<Vec<String>>;

    /// Sum of data and index bytes over every table of `databases`
    fn total_size(&self, databases: &[String]) -> Result<u64>;
}

/// [`Catalog`] backed by `mysql -sNe <query>`
pub struct MysqlClient {
    profile: ConnectionProfile,
    candidates: Vec<String>,
}

impl MysqlClient {
    pub fn new(profile: ConnectionProfile) -> Self {
        Self {
            profile,
            candidates: QUERY_TOOL_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn binary(&self) -> Result<PathBuf> {
        self.candidates
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| DumpError::ExecutableNotFound(self.candidates.clone()).into())
    }

    fn query(&self, sql: &str) -> Result<String> {
        let binary = self.binary()?;
        tracing::debug!(
            "Executing query: {} {} -sNe \"{}\"",
            binary.display(),
            self.profile.redacted_args().join(" "),
            sql.trim()
        );

        let output = Command::new(&binary)
            .args(self.profile.args())
            .arg("-sNe")
            .arg(sql)
            .output()
            .with_context(|| format!("Failed to execute {}", binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DumpError::Query(format!(
                "command failed: {}, output: {}",
                output.status,
                stderr.trim()
            ))
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Catalog for MysqlClient {
    fn databases_like(&self, pattern: &str) -> Result<Vec<String>> {
        let sql = format!("SHOW DATABASES LIKE {};", quote_literal(pattern));
        Ok(parse_rows(&self.query(&sql)?))
    }

    fn tables_like(&self, database: &str, pattern: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SHOW TABLES IN {} LIKE {};",
            quote_identifier(database),
            quote_literal(pattern)
        );
        Ok(parse_rows(&self.query(&sql)?))
    }

    fn all_databases(&self) -> Result<Vec<String>> {
        Ok(parse_rows(&self.query("SHOW DATABASES;")?))
    }

    fn total_size(&self, databases: &[String]) -> Result<u64> {
        if databases.is_empty() {
            return Err(DumpError::Query("no databases to size".to_string()).into());
        }
        let schemas = databases
            .iter()
            .map(|db| quote_literal(db))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT ROUND(SUM(data_length + index_length), 0) \
             FROM information_schema.TABLES WHERE table_schema IN ({});",
            schemas
        );
        parse_size(&self.query(&sql)?)
    }
}

/// One name per line, surrounding whitespace trimmed, blank lines dropped
pub fn parse_rows(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_size(output: &str) -> Result<u64> {
    let value = output.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("NULL") {
        return Err(DumpError::Query(
            "size query returned no value; check if databases exist".to_string(),
        )
        .into());
    }
    value
        .parse::<u64>()
        .with_context(|| format!("Failed to convert size output '{}' to a number", value))
}

/// Single-quoted string literal; backslash is an escape character in MySQL literals
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn quote_identifier(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}


#[cfg(test)]
mod tests {
    use super::fake::like_matches;
    use super::*;

    #[test]
    fn test_parse_rows_skips_blank_lines() {
        let rows = parse_rows("user_a\n\n  user_b \r\n\n");
        assert_eq!(rows, vec!["user_a", "user_b"]);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("123456\n").unwrap(), 123456);
        assert!(parse_size("NULL\n").is_err());
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_backslashes_cannot_end_the_literal() {
        assert_eq!(quote_literal("trailing\\"), "'trailing\\\\'");
        assert_eq!(quote_literal("a\\%"), "'a\\\\%'");
        assert_eq!(quote_literal("x\\'y"), "'x\\\\''y'");
    }

    #[test]
    fn test_fake_like_matcher() {
        assert!(like_matches("user%", "user_a"));
        assert!(like_matches("user\\_a", "user_a"));
        assert!(!like_matches("user\\_a", "userXa"));
        assert!(like_matches("tmp__", "tmp_1"));
        assert!(!like_matches("tmp_", "tmp_1"));
    }

    #[test]
    fn test_missing_query_tool_reports_candidates() {
        let mut client = MysqlClient::new(ConnectionProfile::build(&Default::default()));
        client.candidates = vec!["definitely-not-a-real-mysql-binary".to_string()];

        let err = client.all_databases().unwrap_err();
        let err = err.downcast_ref::<DumpError>().unwrap();
        assert!(matches!(err, DumpError::ExecutableNotFound(_)));
    }
}
