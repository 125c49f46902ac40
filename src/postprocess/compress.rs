// ABOUTME: Folds finished dump files into a single archive
// ABOUTME: Supports tar.gz, tar.bz2 and zip; originals are removed once the archive is complete

use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Tgz,
    Tbz2,
    Zip,
    None,
}

impl CompressionFormat {
    pub fn extension(self) -> Option<&'static str> {
        match self {
            CompressionFormat::Tgz => Some("tar.gz"),
            CompressionFormat::Tbz2 => Some("tar.bz2"),
            CompressionFormat::Zip => Some("zip"),
            CompressionFormat::None => None,
        }
    }
}

impl FromStr for CompressionFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tgz" => Ok(CompressionFormat::Tgz),
            "tbz2" => Ok(CompressionFormat::Tbz2),
            "zip" => Ok(CompressionFormat::Zip),
            "none" => Ok(CompressionFormat::None),
            other => bail!("Unsupported compression type: {}", other),
        }
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CompressionFormat::Tgz => "tgz",
            CompressionFormat::Tbz2 => "tbz2",
            CompressionFormat::Zip => "zip",
            CompressionFormat::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// Archive location for a set of dump files: next to the single file, or a
/// generic name in the output directory when there are several.
pub fn archive_prefix(output_dir: &Path, files: &[PathBuf]) -> PathBuf {
    match files {
        [single] => single.clone(),
        _ => output_dir.join(crate::plan::MULTI_DATABASE_STEM),
    }
}

/// Compress `files` into `<prefix>.<ext>`.
///
/// Returns the archive path, or `None` when nothing was done. Failures are
/// logged and leave the original files in place.
pub fn apply_compression(
    prefix: &Path,
    format: CompressionFormat,
    files: &[PathBuf],
) -> Option<PathBuf> {
    if files.is_empty() {
        tracing::info!("No dump files produced; skipping compression.");
        return None;
    }
    let extension = format.extension()?;

    let mut archive = prefix.as_os_str().to_owned();
    archive.push(".");
    archive.push(extension);
    let archive = PathBuf::from(archive);

    tracing::info!("Starting {} compression for: {}", format, archive.display());
    match write_archive(&archive, format, files) {
        Ok(added) => {
            for file in &added {
                if let Err(e) = std::fs::remove_file(file) {
                    tracing::warn!(
                        "Failed to delete original {} after compression: {}",
                        file.display(),
                        e
                    );
                }
            }
            tracing::info!("{} compression completed successfully.", format);
            Some(archive)
        }
        Err(e) => {
            tracing::error!("Compression to {} failed: {:#}", archive.display(), e);
            if let Err(e) = std::fs::remove_file(&archive) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove incomplete archive {}: {}", archive.display(), e);
                }
            }
            None
        }
    }
}

/// Write the archive and return the files that made it in
fn write_archive(archive: &Path, format: CompressionFormat, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let out = File::create(archive)
        .with_context(|| format!("Failed to create archive {}", archive.display()))?;
    let out = BufWriter::new(out);

    match format {
        CompressionFormat::Tgz => {
            let gz = flate2::write::GzEncoder::new(out, flate2::Compression::default());
            let mut tar = tar::Builder::new(gz);
            let added = append_to_tar(&mut tar, files);
            tar.into_inner()
                .context("Failed to finish tar stream")?
                .finish()
                .context("Failed to finish gzip stream")?
                .flush()?;
            Ok(added)
        }
        CompressionFormat::Tbz2 => {
            let bz = bzip2::write::BzEncoder::new(out, bzip2::Compression::best());
            let mut tar = tar::Builder::new(bz);
            let added = append_to_tar(&mut tar, files);
            tar.into_inner()
                .context("Failed to finish tar stream")?
                .finish()
                .context("Failed to finish bzip2 stream")?
                .flush()?;
            Ok(added)
        }
        CompressionFormat::Zip => {
            let mut zip = zip::ZipWriter::new(out);
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            let mut added = Vec::new();
            for file in files {
                let name = entry_name(file);
                let result = File::open(file).map_err(anyhow::Error::from).and_then(|mut src| {
                    zip.start_file(name.as_str(), options)?;
                    io::copy(&mut src, &mut zip)?;
                    Ok(())
                });
                match result {
                    Ok(()) => added.push(file.clone()),
                    Err(e) => tracing::error!("Cannot add {} to zip: {:#}", file.display(), e),
                }
            }
            zip.finish().context("Failed to finish zip archive")?.flush()?;
            Ok(added)
        }
        CompressionFormat::None => Ok(Vec::new()),
    }
}

fn append_to_tar<W: Write>(tar: &mut tar::Builder<W>, files: &[PathBuf]) -> Vec<PathBuf> {
    let mut added = Vec::new();
    for file in files {
        match tar.append_path_with_name(file, entry_name(file)) {
            Ok(()) => added.push(file.clone()),
            Err(e) => tracing::error!("Cannot add {} to archive: {}", file.display(), e),
        }
    }
    added
}

fn entry_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn write_dumps(dir: &Path) -> Vec<PathBuf> {
        let a = dir.join("a.sql");
        let b = dir.join("b.sql");
        std::fs::write(&a, "CREATE TABLE a (id INT);\n").unwrap();
        std::fs::write(&b, "CREATE TABLE b (id INT);\n").unwrap();
        vec![a, b]
    }

    fn tar_entries<R: Read>(reader: R) -> Vec<(String, String)> {
        let mut archive = tar::Archive::new(reader);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                (name, content)
            })
            .collect()
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!("tgz".parse::<CompressionFormat>().unwrap(), CompressionFormat::Tgz);
        assert_eq!("TBZ2".parse::<CompressionFormat>().unwrap(), CompressionFormat::Tbz2);
        assert_eq!("none".parse::<CompressionFormat>().unwrap(), CompressionFormat::None);
        assert!("rar".parse::<CompressionFormat>().is_err());
    }

    #[test]
    fn test_archive_prefix() {
        let dir = Path::new("/backups");
        assert_eq!(
            archive_prefix(dir, &[PathBuf::from("/backups/shop.sql")]),
            PathBuf::from("/backups/shop.sql")
        );
        assert_eq!(
            archive_prefix(dir, &[PathBuf::from("/backups/a.sql"), PathBuf::from("/backups/b.sql")]),
            PathBuf::from("/backups/multiple_databases")
        );
    }

    #[test]
    fn test_tgz_contains_files_and_removes_originals() {
        let dir = tempdir().unwrap();
        let files = write_dumps(dir.path());
        let prefix = archive_prefix(dir.path(), &files);

        let archive = apply_compression(&prefix, CompressionFormat::Tgz, &files).unwrap();

        assert_eq!(archive, dir.path().join("multiple_databases.tar.gz"));
        assert!(files.iter().all(|f| !f.exists()));
        let entries = tar_entries(flate2::read::GzDecoder::new(File::open(&archive).unwrap()));
        assert_eq!(
            entries,
            vec![
                ("a.sql".to_string(), "CREATE TABLE a (id INT);\n".to_string()),
                ("b.sql".to_string(), "CREATE TABLE b (id INT);\n".to_string()),
            ]
        );
    }

    #[test]
    fn test_tbz2_single_file_archive_name() {
        let dir = tempdir().unwrap();
        let files = write_dumps(dir.path())[..1].to_vec();
        let prefix = archive_prefix(dir.path(), &files);

        let archive = apply_compression(&prefix, CompressionFormat::Tbz2, &files).unwrap();

        assert_eq!(archive, dir.path().join("a.sql.tar.bz2"));
        let entries = tar_entries(bzip2::read::BzDecoder::new(File::open(&archive).unwrap()));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "a.sql");
    }

    #[test]
    fn test_zip_archive() {
        let dir = tempdir().unwrap();
        let files = write_dumps(dir.path());

        let archive =
            apply_compression(&dir.path().join("all"), CompressionFormat::Zip, &files).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut content = String::new();
        zip.by_name("b.sql").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "CREATE TABLE b (id INT);\n");
        assert!(files.iter().all(|f| !f.exists()));
    }

    #[test]
    fn test_none_and_empty_are_no_ops() {
        let dir = tempdir().unwrap();
        let files = write_dumps(dir.path());

        assert!(apply_compression(&dir.path().join("x"), CompressionFormat::None, &files).is_none());
        assert!(apply_compression(&dir.path().join("x"), CompressionFormat::Tgz, &[]).is_none());
        assert!(files.iter().all(|f| f.exists()));
    }

    #[test]
    fn test_missing_file_is_kept_out_and_others_archived() {
        let dir = tempdir().unwrap();
        let mut files = write_dumps(dir.path());
        files.push(dir.path().join("vanished.sql"));

        let archive =
            apply_compression(&dir.path().join("set"), CompressionFormat::Tgz, &files).unwrap();

        let entries = tar_entries(flate2::read::GzDecoder::new(File::open(&archive).unwrap()));
        assert_eq!(entries.len(), 2);
    }
}
