//! # Upload Registry
//!
//! Uploaded snapshots live under `{root}/{uid}/{timestamp}.tar`, where the timestamp
//! is milliseconds since the epoch. The registry indexes them once, at construction,
//! and extracts them on request into `{root}/{uid}/{timestamp}/`.
//!
//! After every extraction attempt that ends in a usable tree (fresh or already
//! present), `{root}/{uid}/latest` is re-pointed at that tree. The alias is a
//! relative symlink and is replaced by renaming a freshly created link over it,
//! so a reader never observes a missing `latest`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use util::archive::{ArchiveError, extract_tar, remove_tree};
use util::paths::{self, LATEST_LINK, absolute_root, ensure_private_dir};
use util::time::iso_from_millis;

use crate::error::GraderError;

static ARCHIVE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)\.tar$").expect("valid archive name pattern"));

static TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid timestamp pattern"));

/// An uploader id names exactly one folder directly under the root.
fn is_plain_uid(uid: &str) -> bool {
    let mut components = Path::new(uid).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == uid
    )
}

/// Orders timestamps numerically, falling back to text order for values that do
/// not fit in a `u128`.
fn cmp_timestamps(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}

pub struct UploadRegistry {
    root: PathBuf,
    uploads: HashMap<String, Vec<String>>,
    max_uncompressed_size: Option<u64>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UploadRegistry {
    /// Indexes every `{uid}/{digits}.tar` under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, GraderError> {
        let root = absolute_root(root);
        if !root.is_dir() {
            return Err(GraderError::NotADirectory(root));
        }

        let mut uploads: HashMap<String, Vec<String>> = HashMap::new();
        for uploader in fs::read_dir(&root).map_err(|e| GraderError::io(&root, e))? {
            let uploader = uploader.map_err(|e| GraderError::io(&root, e))?;
            let path = uploader.path();
            if !path.is_dir() {
                continue;
            }
            let Some(uid) = uploader.file_name().to_str().map(str::to_string) else {
                warn!("Skipping uploader folder with a non UTF-8 name: {}", path.display());
                continue;
            };

            for archive in fs::read_dir(&path).map_err(|e| GraderError::io(&path, e))? {
                let archive = archive.map_err(|e| GraderError::io(&path, e))?;
                let name = archive.file_name();
                let Some(captures) = name.to_str().and_then(|n| ARCHIVE_NAME.captures(n)) else {
                    continue;
                };
                if archive.path().is_file() {
                    uploads
                        .entry(uid.clone())
                        .or_default()
                        .push(captures[1].to_string());
                }
            }
        }

        for timestamps in uploads.values_mut() {
            timestamps.sort_by(|a, b| cmp_timestamps(a, b));
        }
        info!(
            "Indexed {} uploaders under {}",
            uploads.len(),
            root.display()
        );

        Ok(Self {
            root,
            uploads,
            max_uncompressed_size: None,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Refuses archives whose members add up to more than `limit` bytes.
    pub fn with_max_uncompressed_size(mut self, limit: Option<u64>) -> Self {
        self.max_uncompressed_size = limit;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every indexed uploader, sorted.
    pub fn uids(&self) -> Vec<String> {
        let mut uids: Vec<String> = self.uploads.keys().cloned().collect();
        uids.sort();
        uids
    }

    /// Indexed timestamps of `uid` in ascending numeric order.
    pub fn timestamps(&self, uid: &str) -> &[String] {
        self.uploads.get(uid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Numerically greatest indexed timestamp of `uid`.
    pub fn latest_known(&self, uid: &str) -> Option<&str> {
        self.timestamps(uid).last().map(String::as_str)
    }

    fn lock_for(&self, uid: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(uid.to_string()).or_default().clone()
    }

    /// Extracts one upload of `uid` and points `latest` at it.
    ///
    /// With `timestamp` unset, the greatest indexed timestamp is used. When `clean` is
    /// false and the destination already exists, nothing is extracted and an empty list
    /// is returned; the alias is still updated. Otherwise any previous tree is removed
    /// and the archive unpacked afresh.
    ///
    /// Returns the names of the top-level directories of the extracted tree, sorted.
    /// Calls for the same uploader are serialized.
    ///
    /// `uid` must name a single folder under the root and an explicit `timestamp` must
    /// be all digits; anything else is refused before the filesystem is touched.
    pub fn extract_latest(
        &self,
        uid: &str,
        timestamp: Option<&str>,
        clean: bool,
    ) -> Result<Vec<String>, GraderError> {
        if !is_plain_uid(uid) {
            return Err(GraderError::UnknownUploader(uid.to_string()));
        }
        let timestamp = match timestamp {
            Some(ts) if !TIMESTAMP.is_match(ts) => {
                let archive = paths::upload_archive_path(&self.root, uid, ts);
                return Err(ArchiveError::io(
                    &archive,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("invalid upload timestamp {ts:?}"),
                    ),
                )
                .into());
            }
            Some(ts) => ts.to_string(),
            None => self
                .latest_known(uid)
                .ok_or_else(|| GraderError::UnknownUploader(uid.to_string()))?
                .to_string(),
        };

        let lock = self.lock_for(uid);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let destination = paths::upload_dir(&self.root, uid, &timestamp);
        let exercises = if !clean && destination.is_dir() {
            info!(uid, "Upload skipped ({})", iso_from_millis(&timestamp));
            Vec::new()
        } else {
            let archive = paths::upload_archive_path(&self.root, uid, &timestamp);
            if !archive.is_file() {
                return Err(ArchiveError::io(
                    &archive,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                )
                .into());
            }

            remove_tree(&destination)?;
            ensure_private_dir(&destination).map_err(|e| ArchiveError::io(&destination, e))?;
            let written = extract_tar(&archive, &destination, self.max_uncompressed_size)?;
            info!(uid, members = written, "Upload untarred ({})", iso_from_millis(&timestamp));

            top_level_dirs(&destination)?
        };

        self.point_latest_at(uid, &timestamp)?;
        Ok(exercises)
    }

    fn point_latest_at(&self, uid: &str, timestamp: &str) -> Result<(), GraderError> {
        let link = paths::latest_link(&self.root, uid);
        let staging = link.with_file_name(format!(".{LATEST_LINK}.{}", std::process::id()));

        if fs::symlink_metadata(&staging).is_ok() {
            fs::remove_file(&staging).map_err(|e| GraderError::io(&staging, e))?;
        }
        symlink(timestamp, &staging).map_err(|e| GraderError::io(&staging, e))?;
        if let Err(e) = fs::rename(&staging, &link) {
            let _ = fs::remove_file(&staging);
            return Err(GraderError::io(&link, e));
        }

        debug!(uid, "{} -> {}", link.display(), timestamp);
        Ok(())
    }
}

/// Names of the visible top-level directories of `dir`, sorted.
fn top_level_dirs(dir: &Path) -> Result<Vec<String>, GraderError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| GraderError::io(dir, e))? {
        let entry = entry.map_err(|e| GraderError::io(dir, e))?;
        let is_dir = entry
            .file_type()
            .map_err(|e| GraderError::io(entry.path(), e))?
            .is_dir();
        if !is_dir {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if !name.starts_with('.') => names.push(name),
            Ok(_) => {}
            Err(name) => warn!("Ignoring exercise with a non UTF-8 name: {:?}", name),
        }
    }
    names.sort();
    Ok(names)
}
