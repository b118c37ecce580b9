//! Fixtures for tests across the workspace: in-memory tar archives and
//! ready-made upload trees.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::paths;

/// Builds an in-memory tar archive holding `files` as regular members.
/// Names ending in `/` become directory members.
pub fn tar_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        if name.ends_with('/') {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder
                .append_data(&mut header, name, std::io::empty())
                .expect("failed to append tar directory");
        } else {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(contents.len() as u64);
            builder
                .append_data(&mut header, name, contents.as_bytes())
                .expect("failed to append tar member");
        }
    }
    builder.into_inner().expect("failed to finish tar archive")
}

/// Like [`tar_bytes`] for members whose contents need not be text.
pub fn tar_bytes_raw(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(contents.len() as u64);
        builder
            .append_data(&mut header, name, *contents)
            .expect("failed to append tar member");
    }
    builder.into_inner().expect("failed to finish tar archive")
}

/// Writes `{root}/{uid}/{timestamp}.tar` containing `files`.
pub fn write_upload(root: &Path, uid: &str, timestamp: &str, files: &[(&str, &str)]) -> PathBuf {
    let path = paths::upload_archive_path(root, uid, timestamp);
    fs::create_dir_all(path.parent().expect("archive path has a parent"))
        .expect("failed to create uploader dir");
    fs::write(&path, tar_bytes(files)).expect("failed to write upload archive");
    path
}

/// Creates a unique temporary upload root.
///
/// Keep the returned `TempDir` in scope for as long as you need the files.
pub fn setup_upload_root() -> TempDir {
    TempDir::new().expect("failed to create tempdir")
}
