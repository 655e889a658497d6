//! Filesystem routing: output naming, pass-through copies, and moving
//! sources into the `archive` and `failed` folders.

use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::{ARCHIVE_DIR_NAME, FAILED_DIR_NAME, OUTPUT_PREFIX, TEMP_SUFFIX};
use crate::error::Result;

/// Build the output file name for a source file.
///
/// `Orig_<release with '.' replaced by '_'>_<stem>[_<ordinal>].xml`; the
/// ordinal is only present for split parts.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use onix_splitter::routing::output_file_name;
///
/// let source = Path::new("in/catalog.xml");
/// assert_eq!(output_file_name("2.1", source, None), "Orig_2_1_catalog.xml");
/// assert_eq!(output_file_name("3.0", source, Some(4)), "Orig_3_0_catalog_4.xml");
/// ```
pub fn output_file_name(release: &str, source: &Path, ordinal: Option<usize>) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let release = release.trim().replace('.', "_");

    match ordinal {
        Some(n) => format!("{OUTPUT_PREFIX}_{release}_{stem}_{n}.xml"),
        None => format!("{OUTPUT_PREFIX}_{release}_{stem}.xml"),
    }
}

/// Temp path (`<finalName>.tmp`) used while a file is under construction.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(TEMP_SUFFIX);
    final_path.with_file_name(name)
}

/// Atomically move a finished temp file to its final name.
pub fn publish(temp_path: &Path, final_path: &Path) -> Result<()> {
    // On Windows, rename fails if the destination already exists
    #[cfg(target_os = "windows")]
    if final_path.exists() {
        fs::remove_file(final_path)?;
    }

    fs::rename(temp_path, final_path)?;
    Ok(())
}

/// Copy a source byte-for-byte into the output directory.
///
/// Uses the same temp-then-rename pattern as split parts, so the output
/// name never refers to a half-copied file.
pub fn pass_through(source: &Path, output_dir: &Path, release: &str) -> Result<PathBuf> {
    let final_path = output_dir.join(output_file_name(release, source, None));
    let temp_path = temp_path_for(&final_path);

    fs::copy(source, &temp_path)?;
    File::open(&temp_path)?.sync_all()?;
    publish(&temp_path, &final_path)?;

    tracing::info!(
        source = %source.display(),
        output = %final_path.display(),
        "copied file unchanged"
    );
    Ok(final_path)
}

/// Move a processed source into `<input dir>/archive`.
pub fn archive_source(source: &Path) -> Result<PathBuf> {
    let destination = move_into_sibling_dir(source, ARCHIVE_DIR_NAME)?;
    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        "archived source file"
    );
    Ok(destination)
}

/// Move a rejected source into `<input dir>/failed`.
pub fn fail_source(source: &Path) -> Result<PathBuf> {
    let destination = move_into_sibling_dir(source, FAILED_DIR_NAME)?;
    tracing::warn!(
        source = %source.display(),
        destination = %destination.display(),
        "moved source file to failed folder"
    );
    Ok(destination)
}

/// List the `*.xml` files directly inside `input_dir`, sorted by name.
pub fn list_source_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let is_xml = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if is_xml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Remove orphaned `.tmp` files left in `output_dir` by an interrupted run.
///
/// Returns the number of files removed. A missing directory counts as empty.
pub fn cleanup_stale_temp_files(output_dir: &Path) -> Result<usize> {
    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let is_part_temp = name
            .to_str()
            .is_some_and(|n| n.starts_with(OUTPUT_PREFIX) && n.ends_with(TEMP_SUFFIX));
        if is_part_temp && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            tracing::info!(path = %entry.path().display(), "removed stale temp file");
            removed += 1;
        }
    }
    Ok(removed)
}

fn move_into_sibling_dir(source: &Path, dir_name: &str) -> Result<PathBuf> {
    let parent = source.parent().unwrap_or_else(|| Path::new("."));
    let target_dir = parent.join(dir_name);
    fs::create_dir_all(&target_dir)?;

    let file_name = source.file_name().unwrap_or_else(|| OsStr::new("unnamed"));
    let destination = unique_destination(&target_dir, file_name);
    move_file(source, &destination)?;
    Ok(destination)
}

/// Pick `dir/file_name`, or insert a UTC timestamp before the extension if taken.
fn unique_destination(dir: &Path, file_name: &OsStr) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    };
    dir.join(name)
}

/// Rename, falling back to copy + remove when rename fails (e.g. across devices).
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(error = %rename_err, "rename failed, falling back to copy");
            if fs::copy(from, to).is_err() {
                return Err(rename_err);
            }
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_output_file_name() {
        let source = Path::new("/data/in/feed_2024.xml");
        assert_eq!(output_file_name("3.0", source, Some(1)), "Orig_3_0_feed_2024_1.xml");
        assert_eq!(output_file_name("2.1", source, None), "Orig_2_1_feed_2024.xml");
        assert_eq!(output_file_name(" 3.0 ", source, Some(12)), "Orig_3_0_feed_2024_12.xml");
    }

    #[test]
    fn test_temp_path_for() {
        assert_eq!(
            temp_path_for(Path::new("/out/Orig_3_0_feed_1.xml")),
            PathBuf::from("/out/Orig_3_0_feed_1.xml.tmp")
        );
    }

    #[test]
    fn test_pass_through_is_byte_identical() {
        let tmp = tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let source = tmp.path().join("catalog.xml");
        let content = b"<?xml version=\"1.0\"?>\n<ONIXmessage release=\"2.1\">\xC3\xA9</ONIXmessage>\n";
        fs::write(&source, content).unwrap();

        let output = pass_through(&source, &out, "2.1").unwrap();

        assert_eq!(output, out.join("Orig_2_1_catalog.xml"));
        assert_eq!(fs::read(&output).unwrap(), content.to_vec());
        assert!(!temp_path_for(&output).exists());
        assert!(source.exists(), "pass-through leaves the source in place");
    }

    #[test]
    fn test_archive_and_fail_moves() {
        let tmp = tempdir().unwrap();
        let archived = tmp.path().join("a.xml");
        let failed = tmp.path().join("b.xml");
        fs::write(&archived, "a").unwrap();
        fs::write(&failed, "b").unwrap();

        let dest = archive_source(&archived).unwrap();
        assert_eq!(dest, tmp.path().join("archive").join("a.xml"));
        assert!(!archived.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "a");

        let dest = fail_source(&failed).unwrap();
        assert_eq!(dest, tmp.path().join("failed").join("b.xml"));
        assert!(!failed.exists());
    }

    #[test]
    fn test_archive_name_collision_gets_timestamp() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("feed.xml");

        fs::write(&source, "first").unwrap();
        let first = archive_source(&source).unwrap();

        fs::write(&source, "second").unwrap();
        let second = archive_source(&source).unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "first");
        assert_eq!(fs::read_to_string(&second).unwrap(), "second");
        let name = second.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("feed_"));
        assert!(name.ends_with(".xml"));
    }

    #[test]
    fn test_list_source_files() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("b.xml"), "").unwrap();
        fs::write(tmp.path().join("a.XML"), "").unwrap();
        fs::write(tmp.path().join("c.xml.done"), "").unwrap();
        fs::write(tmp.path().join("notes.txt"), "").unwrap();
        fs::create_dir_all(tmp.path().join("archive")).unwrap();
        fs::write(tmp.path().join("archive").join("old.xml"), "").unwrap();

        let files = list_source_files(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xml"]);
    }

    #[test]
    fn test_cleanup_stale_temp_files() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("Orig_3_0_feed_2.xml.tmp"), "partial").unwrap();
        fs::write(tmp.path().join("Orig_3_0_feed_1.xml"), "done").unwrap();
        fs::write(tmp.path().join("unrelated.tmp"), "keep").unwrap();

        assert_eq!(cleanup_stale_temp_files(tmp.path()).unwrap(), 1);
        assert!(tmp.path().join("Orig_3_0_feed_1.xml").exists());
        assert!(tmp.path().join("unrelated.tmp").exists());
        assert!(!tmp.path().join("Orig_3_0_feed_2.xml.tmp").exists());

        assert_eq!(cleanup_stale_temp_files(&tmp.path().join("missing")).unwrap(), 0);
    }
}
