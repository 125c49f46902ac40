// ABOUTME: Strips DEFINER clauses from finished dump files
// ABOUTME: Rewrites through a temp file in the same directory and renames it into place

use anyhow::{Context, Result};
use regex::bytes::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use tempfile::NamedTempFile;

static DEFINER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"DEFINER=\S+ ").unwrap());

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinerRemoval {
    Unchanged,
    Rewritten { removed: usize },
}

/// Remove every DEFINER clause from `path`.
///
/// Files without a clause are not touched at all. Otherwise the new content is
/// written next to the original and atomically renamed over it, so a failure
/// leaves the original intact.
pub fn remove_definers(path: &Path) -> Result<DefinerRemoval> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let removed = DEFINER.find_iter(&data).count();
    if removed == 0 {
        return Ok(DefinerRemoval::Unchanged);
    }
    let processed = DEFINER.replace_all(&data, &b""[..]);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = format!(
        "{}.nodefiner-",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file for {}", path.display()))?;

    write_all(&mut tmp, &processed)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;

    // Dropping the temp file on error removes it
    tmp.persist(path)
        .with_context(|| format!("Failed to replace original file {}", path.display()))?;

    Ok(DefinerRemoval::Rewritten { removed })
}

fn write_all(tmp: &mut NamedTempFile, data: &[u8]) -> std::io::Result<()> {
    tmp.write_all(data)?;
    tmp.as_file().sync_all()
}

/// Strip definers from every file; a failure on one file is logged and skipped
pub fn remove_definers_from_all(paths: &[impl AsRef<Path>]) {
    for path in paths {
        let path = path.as_ref();
        match remove_definers(path) {
            Ok(DefinerRemoval::Unchanged) => {
                tracing::info!("No DEFINER clauses found in {}", path.display())
            }
            Ok(DefinerRemoval::Rewritten { removed }) => tracing::info!(
                "Successfully removed {} DEFINER clause(s) from {}",
                removed,
                path.display()
            ),
            Err(e) => tracing::error!("Couldn't remove definers from {}: {:#}", path.display(), e),
        }
    }
    tracing::info!("DEFINER clauses removal process completed.");
}
