//! # Archive Store
//!
//! Tar extraction into a destination tree, plus removal of extracted trees that
//! may have been left read-only by the archive's own permission bits.
//!
//! Only regular files and directories are materialised. Everything else a tar
//! can carry (symlinks, hard links, devices, FIFOs) is skipped, and so is every
//! member with an absolute path or a `..` component.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, warn};

/// Errors raised while reading, extracting or removing archive trees.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Filesystem failure on a path we were asked to touch.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The tar stream itself could not be read.
    #[error("Malformed tar archive {path}: {source}")]
    Tar {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The sum of member sizes exceeds the configured ceiling.
    #[error("Uncompressed size of {path} exceeds the allowed maximum of {limit} bytes")]
    TooLarge { path: PathBuf, limit: u64 },
}

impl ArchiveError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn tar(path: &Path, source: io::Error) -> Self {
        ArchiveError::Tar {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Extracts every regular file and directory of the tar at `archive_path` into
/// `destination_dir`, preserving relative member paths.
///
/// Directory members are applied after all files, so a read-only directory mode
/// recorded in the archive does not prevent its own contents from being written.
///
/// Returns the number of members written.
pub fn extract_tar(
    archive_path: &Path,
    destination_dir: &Path,
    max_uncompressed_size: Option<u64>,
) -> Result<usize, ArchiveError> {
    if let Some(limit) = max_uncompressed_size {
        let file = File::open(archive_path).map_err(|e| ArchiveError::io(archive_path, e))?;
        validate_tar_size(archive_path, &mut Archive::new(file), limit)?;
    }

    let file = File::open(archive_path).map_err(|e| ArchiveError::io(archive_path, e))?;
    let mut archive = Archive::new(file);
    let mut directories = Vec::new();
    let mut written = 0;

    for entry in archive
        .entries()
        .map_err(|e| ArchiveError::tar(archive_path, e))?
    {
        let mut entry = entry.map_err(|e| ArchiveError::tar(archive_path, e))?;
        let entry_type = entry.header().entry_type();
        let member = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<unreadable name>".to_string());

        if escapes_destination(&entry) {
            warn!(member = %member, "Skipping tar member outside of {}", destination_dir.display());
            continue;
        }

        match entry_type {
            EntryType::Directory => {
                directories.push(entry);
                continue;
            }
            EntryType::Regular | EntryType::Continuous => {}
            other => {
                debug!(member = %member, "Skipping non-regular tar member ({:?})", other);
                continue;
            }
        }

        if entry
            .unpack_in(destination_dir)
            .map_err(|e| ArchiveError::io(destination_dir, e))?
        {
            written += 1;
        } else {
            warn!(member = %member, "Skipping tar member outside of {}", destination_dir.display());
        }
    }

    for mut dir in directories {
        if dir
            .unpack_in(destination_dir)
            .map_err(|e| ArchiveError::io(destination_dir, e))?
        {
            written += 1;
        }
    }

    Ok(written)
}

/// Absolute members and members climbing out with `..` are never unpacked.
fn escapes_destination<R: Read>(entry: &tar::Entry<'_, R>) -> bool {
    match entry.path() {
        Ok(path) => path.components().any(|c| {
            matches!(
                c,
                Component::RootDir | Component::Prefix(_) | Component::ParentDir
            )
        }),
        Err(_) => true,
    }
}

/// Loads a whole archive into memory, gunzipping `.gz` / `.tgz` files first.
pub fn read_archive_bytes(path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let raw = fs::read(path).map_err(|e| ArchiveError::io(path, e))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") | Some("tgz") => {
            let mut decoder = GzDecoder::new(raw.as_slice());
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ArchiveError::tar(path, e))?;
            Ok(out)
        }
        _ => Ok(raw),
    }
}

/// Recursively deletes `path`, even when parts of the tree are read-only.
///
/// A missing path is not an error. When a plain removal is refused, every
/// directory in the tree is made owner-`rwx` and the removal is retried once.
pub fn remove_tree(path: &Path) -> Result<(), ArchiveError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ArchiveError::io(path, e)),
    };

    if !metadata.is_dir() {
        return fs::remove_file(path).map_err(|e| ArchiveError::io(path, e));
    }

    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Normalizing permissions under {} before removal", path.display());
            make_owner_writable(path)?;
            fs::remove_dir_all(path).map_err(|e| ArchiveError::io(path, e))
        }
        Err(e) => Err(ArchiveError::io(path, e)),
    }
}

fn make_owner_writable(dir: &Path) -> Result<(), ArchiveError> {
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
        .map_err(|e| ArchiveError::io(dir, e))?;

    for entry in fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))? {
        let entry = entry.map_err(|e| ArchiveError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| ArchiveError::io(&entry.path(), e))?;
        if file_type.is_dir() {
            make_owner_writable(&entry.path())?;
        }
    }

    Ok(())
}

fn validate_tar_size<R: Read>(
    path: &Path,
    archive: &mut Archive<R>,
    max_uncompressed_size: u64,
) -> Result<(), ArchiveError> {
    let mut total_size = 0u64;

    for entry in archive.entries().map_err(|e| ArchiveError::tar(path, e))? {
        let entry = entry.map_err(|e| ArchiveError::tar(path, e))?;
        total_size += entry
            .header()
            .size()
            .map_err(|e| ArchiveError::tar(path, e))?;
        if total_size > max_uncompressed_size {
            return Err(ArchiveError::TooLarge {
                path: path.to_path_buf(),
                limit: max_uncompressed_size,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn append_file(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8], mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_entry_type(EntryType::Regular);
        builder.append_data(&mut header, path, data).unwrap();
    }

    fn append_dir(builder: &mut tar::Builder<Vec<u8>>, path: &str, mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(mode);
        header.set_entry_type(EntryType::Directory);
        builder.append_data(&mut header, path, io::empty()).unwrap();
    }

    /// Appends a member whose name is written verbatim, bypassing the
    /// builder's own path checks.
    fn append_raw(builder: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8]) {
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn write_tar(dir: &Path, build: impl FnOnce(&mut tar::Builder<Vec<u8>>)) -> PathBuf {
        let mut builder = tar::Builder::new(Vec::new());
        build(&mut builder);
        let bytes = builder.into_inner().unwrap();
        let path = dir.join("archive.tar");
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_extract_preserves_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let tar = write_tar(tmp.path(), |b| {
            append_file(b, "hello/main.c", b"int main(){}", 0o644);
            append_file(b, "hello/nested/data.txt", b"data", 0o644);
        });
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let written = extract_tar(&tar, &dest, None).unwrap();

        assert_eq!(written, 2);
        assert_eq!(fs::read_to_string(dest.join("hello/main.c")).unwrap(), "int main(){}");
        assert_eq!(fs::read_to_string(dest.join("hello/nested/data.txt")).unwrap(), "data");
    }

    #[test]
    fn test_extract_read_only_directory_keeps_contents() {
        let tmp = TempDir::new().unwrap();
        let tar = write_tar(tmp.path(), |b| {
            append_dir(b, "locked/", 0o555);
            append_file(b, "locked/file.txt", b"x", 0o444);
        });
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        extract_tar(&tar, &dest, None).unwrap();
        assert_eq!(fs::read_to_string(dest.join("locked/file.txt")).unwrap(), "x");

        remove_tree(&dest).unwrap();
        assert!(!dest.exists());
    }

    #[test]
    fn test_extract_skips_symlinks() {
        let tmp = TempDir::new().unwrap();
        let tar = write_tar(tmp.path(), |b| {
            append_file(b, "ex/a.txt", b"a", 0o644);
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_entry_type(EntryType::Symlink);
            b.append_link(&mut header, "ex/link", "/etc/passwd").unwrap();
        });
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let written = extract_tar(&tar, &dest, None).unwrap();

        assert_eq!(written, 1);
        assert!(fs::symlink_metadata(dest.join("ex/link")).is_err());
    }

    #[test]
    fn test_extract_skips_absolute_members() {
        let tmp = TempDir::new().unwrap();
        let tar = write_tar(tmp.path(), |b| {
            append_raw(b, "/abs/x.txt", b"abs");
            append_file(b, "ok/y.txt", b"y", 0o644);
        });
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let written = extract_tar(&tar, &dest, None).unwrap();

        assert_eq!(written, 1);
        assert!(!dest.join("abs").exists());
        assert!(dest.join("ok/y.txt").is_file());
    }

    #[test]
    fn test_extract_skips_parent_dir_members() {
        let tmp = TempDir::new().unwrap();
        let tar = write_tar(tmp.path(), |b| {
            append_raw(b, "../evil.txt", b"evil");
            append_raw(b, "ex/../../evil2.txt", b"evil");
        });
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let written = extract_tar(&tar, &dest, None).unwrap();

        assert_eq!(written, 0);
        assert!(!tmp.path().join("evil.txt").exists());
        assert!(!tmp.path().join("evil2.txt").exists());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_extract_rejects_oversized_archive() {
        let tmp = TempDir::new().unwrap();
        let tar = write_tar(tmp.path(), |b| {
            append_file(b, "big.bin", &[0u8; 2048], 0o644);
        });
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        let err = extract_tar(&tar, &dest, Some(1024)).unwrap_err();

        assert!(matches!(err, ArchiveError::TooLarge { limit: 1024, .. }));
        assert!(!dest.join("big.bin").exists());
    }

    #[test]
    fn test_extract_malformed_archive_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.tar");
        fs::write(&path, vec![0x42u8; 700]).unwrap();
        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();

        assert!(extract_tar(&path, &dest, None).is_err());
    }

    #[test]
    fn test_extract_missing_archive_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = extract_tar(&tmp.path().join("nope.tar"), tmp.path(), None).unwrap_err();
        assert!(matches!(err, ArchiveError::Io { .. }));
    }

    #[test]
    fn test_remove_tree_missing_path_is_ok() {
        let tmp = TempDir::new().unwrap();
        assert!(remove_tree(&tmp.path().join("absent")).is_ok());
    }

    #[test]
    fn test_remove_tree_read_only_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tree");
        let inner = root.join("a/b");
        fs::create_dir_all(&inner).unwrap();
        fs::write(inner.join("f.txt"), "f").unwrap();
        fs::set_permissions(&inner, fs::Permissions::from_mode(0o500)).unwrap();
        fs::set_permissions(root.join("a"), fs::Permissions::from_mode(0o500)).unwrap();

        remove_tree(&root).unwrap();

        assert!(!root.exists());
    }

    #[test]
    fn test_read_archive_bytes_gunzips() {
        use flate2::{Compression, write::GzEncoder};
        use std::io::Write;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fixtures.tar.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        assert_eq!(read_archive_bytes(&path).unwrap(), b"payload");
    }
}
