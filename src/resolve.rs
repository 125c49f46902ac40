// ABOUTME: Expands glob target specifications against the live catalog
// ABOUTME: Resolves database lists and `database.pattern` table exclusions

use crate::error::DumpError;
use crate::mysql::Catalog;
use std::collections::HashSet;
use std::fmt;

/// A concrete table inside a concrete database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedTable {
    pub database: String,
    pub table: String,
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// One raw `database.pattern` exclusion entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionEntry {
    pub database: String,
    pub pattern: String,
}

impl ExclusionEntry {
    /// Split `db.pattern`; anything with other than exactly one dot is rejected
    pub fn parse(raw: &str) -> Result<Self, DumpError> {
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.as_slice() {
            [database, pattern] if !database.is_empty() && !pattern.is_empty() => Ok(Self {
                database: database.to_string(),
                pattern: pattern.to_string(),
            }),
            _ => Err(DumpError::InvalidExclusion(raw.to_string())),
        }
    }
}

/// Exclusion list after resolution: the well-formed entries plus the tables they matched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedExclusions {
    pub entries: Vec<ExclusionEntry>,
    pub tables: Vec<QualifiedTable>,
}

impl ResolvedExclusions {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any well-formed entry targets `database`
    pub fn has_entries_for(&self, database: &str) -> bool {
        self.entries.iter().any(|e| e.database == database)
    }

    pub fn tables_in<'a>(&'a self, database: &'a str) -> impl Iterator<Item = &'a QualifiedTable> {
        self.tables.iter().filter(move |t| t.database == database)
    }
}

pub fn has_glob_wildcards(entry: &str) -> bool {
    entry.contains(['*', '?'])
}

/// Translate a `*`/`?` glob into a LIKE pattern.
///
/// LIKE metacharacters already present in the glob are escaped first so they
/// only ever match themselves.
pub fn glob_to_like(glob: &str) -> String {
    let mut like = String::with_capacity(glob.len() + 4);
    for c in glob.chars() {
        match c {
            '\\' => like.push_str("\\\\"),
            '%' => like.push_str("\\%"),
            '_' => like.push_str("\\_"),
            '*' => like.push('%'),
            '?' => like.push('_'),
            other => like.push(other),
        }
    }
    like
}

/// Expand database entries into concrete names.
///
/// Literal entries pass through untouched. A pattern whose lookup fails or
/// matches nothing is skipped with a warning. The result keeps first-seen
/// order without duplicates.
pub fn expand_database_list<C: Catalog>(catalog: &C, entries: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();

    for entry in entries {
        if !has_glob_wildcards(entry) {
            expanded.push(entry.clone());
            continue;
        }

        match catalog.databases_like(&glob_to_like(entry)) {
            Ok(matched) if matched.is_empty() => {
                tracing::warn!("Pattern {:?} matched no databases", entry);
            }
            Ok(matched) => {
                tracing::debug!("Pattern {:?} matched {}", entry, matched.join(", "));
                expanded.extend(matched);
            }
            Err(e) => {
                tracing::warn!("Failed resolving databases for pattern {:?}: {:#}", entry, e);
            }
        }
    }

    dedup_preserving_order(expanded)
}

/// Resolve a list of `database.pattern` entries into concrete tables.
///
/// Malformed entries and failed lookups are logged and skipped; the rest of
/// the list is still processed.
pub fn resolve_exclusions<C: Catalog>(catalog: &C, raw_entries: &[String]) -> ResolvedExclusions {
    let mut resolved = ResolvedExclusions::default();

    for raw in raw_entries {
        let entry = match ExclusionEntry::parse(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("{}", e);
                continue;
            }
        };

        match catalog.tables_like(&entry.database, &glob_to_like(&entry.pattern)) {
            Ok(tables) => {
                if tables.is_empty() {
                    tracing::warn!("Exclusion {:?} matched no tables", raw);
                }
                for table in tables {
                    let table = QualifiedTable {
                        database: entry.database.clone(),
                        table,
                    };
                    if !resolved.tables.contains(&table) {
                        resolved.tables.push(table);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Error retrieving tables for pattern {}: {:#}", raw, e);
            }
        }

        resolved.entries.push(entry);
    }

    resolved
}

fn dedup_preserving_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mysql::catalog::fake::{like_matches, FakeCatalog};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn catalog() -> FakeCatalog {
        FakeCatalog::new(&[
            ("user_a", &["orders", "tmp_1", "tmp_2", "tmpx"], 100),
            ("user_b", &["orders"], 200),
            ("admin", &["accounts"], 50),
        ])
    }

    #[test]
    fn test_glob_to_like() {
        assert_eq!(glob_to_like("user_*"), "user\\_%");
        assert_eq!(glob_to_like("db?"), "db_");
        assert_eq!(glob_to_like("100%_off*"), "100\\%\\_off%");
        assert_eq!(glob_to_like("plain"), "plain");
    }

    #[test]
    fn test_glob_backslash_matches_itself() {
        let like = glob_to_like("back\\slash*");
        assert_eq!(like, "back\\\\slash%");
        assert!(like_matches(&like, "back\\slash_1"));
        assert!(!like_matches(&like, "backslash_1"));
    }

    #[test]
    fn test_has_glob_wildcards() {
        assert!(has_glob_wildcards("user_*"));
        assert!(has_glob_wildcards("db?"));
        assert!(!has_glob_wildcards("user_a"));
    }

    #[test]
    fn test_literal_entries_pass_through() {
        let entries = strings(&["zeta", "alpha", "zeta", "missing_db"]);
        let resolved = expand_database_list(&catalog(), &entries);
        assert_eq!(resolved, strings(&["zeta", "alpha", "missing_db"]));
    }

    #[test]
    fn test_pattern_resolves_in_catalog_order() {
        let resolved = expand_database_list(&catalog(), &strings(&["user_*"]));
        assert_eq!(resolved, strings(&["user_a", "user_b"]));
    }

    #[test]
    fn test_mixed_entries_dedup_first_seen() {
        let resolved = expand_database_list(&catalog(), &strings(&["user_b", "user_*", "admin"]));
        assert_eq!(resolved, strings(&["user_b", "user_a", "admin"]));
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let resolved = expand_database_list(&catalog(), &strings(&["Admin", "admin"]));
        assert_eq!(resolved, strings(&["Admin", "admin"]));
    }

    #[test]
    fn test_failed_pattern_is_skipped() {
        let mut catalog = catalog();
        catalog.failing_patterns = strings(&["adm%"]);

        let resolved = expand_database_list(&catalog, &strings(&["adm*", "user_?"]));
        assert_eq!(resolved, strings(&["user_a", "user_b"]));
    }

    #[test]
    fn test_unmatched_patterns_resolve_to_nothing() {
        let resolved = expand_database_list(&catalog(), &strings(&["nothing_*", "zz?"]));
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_exclusion_entry_parse() {
        assert_eq!(
            ExclusionEntry::parse("db.tmp_*").unwrap(),
            ExclusionEntry {
                database: "db".to_string(),
                pattern: "tmp_*".to_string()
            }
        );
        assert!(ExclusionEntry::parse("nodot").is_err());
        assert!(ExclusionEntry::parse("a.b.c").is_err());
        assert!(ExclusionEntry::parse(".table").is_err());
    }

    #[test]
    fn test_resolve_exclusions_expands_tables() {
        let resolved = resolve_exclusions(&catalog(), &strings(&["user_a.tmp_*"]));
        assert_eq!(
            resolved.tables.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            vec!["user_a.tmp_1", "user_a.tmp_2"]
        );
        assert!(resolved.has_entries_for("user_a"));
        assert!(!resolved.has_entries_for("user_b"));
    }

    #[test]
    fn test_invalid_exclusion_does_not_stop_the_rest() {
        let resolved =
            resolve_exclusions(&catalog(), &strings(&["broken", "admin.accounts", "x.y.z"]));
        assert_eq!(resolved.entries.len(), 1);
        assert_eq!(resolved.tables.len(), 1);
        assert_eq!(resolved.tables[0].to_string(), "admin.accounts");
    }

    #[test]
    fn test_malformed_entry_never_marks_its_database() {
        let resolved = resolve_exclusions(&catalog(), &strings(&["user_a.x.y", "admin."]));
        assert!(resolved.is_empty());
        assert!(!resolved.has_entries_for("user_a"));
        assert!(!resolved.has_entries_for("admin"));
    }

    #[test]
    fn test_exclusion_for_unknown_database_keeps_entry() {
        let resolved = resolve_exclusions(&catalog(), &strings(&["ghost.t*"]));
        assert!(resolved.tables.is_empty());
        assert!(resolved.has_entries_for("ghost"));
    }

    #[test]
    fn test_tables_in_filters_by_database() {
        let resolved =
            resolve_exclusions(&catalog(), &strings(&["user_a.orders", "user_b.orders"]));
        let tables: Vec<_> = resolved.tables_in("user_b").collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].database, "user_b");
    }
}
