use std::{
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// Name of the per-uploader alias pointing at the most recently extracted upload.
pub const LATEST_LINK: &str = "latest";

/// Create a directory (and all parents) if it doesn't exist, and return the path.
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let p = path.as_ref();
    fs::create_dir_all(p)?;
    Ok(p.to_path_buf())
}

/// Like [`ensure_dir`], but the leaf directory ends up owner-only (`0700`).
pub fn ensure_private_dir<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let p = ensure_dir(path)?;
    fs::set_permissions(&p, fs::Permissions::from_mode(0o700))?;
    Ok(p)
}

/// Resolve a possibly relative root against the current directory.
pub fn absolute_root<P: AsRef<Path>>(root: P) -> PathBuf {
    let p = root.as_ref();
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    }
}

// ─── Upload tree: {root}/{uid}/... ──────────────────────────────

/// An uploader's folder: {root}/{uid}
pub fn uploader_dir(root: &Path, uid: &str) -> PathBuf {
    root.join(uid)
}

/// Uploaded archive: {root}/{uid}/{timestamp}.tar
pub fn upload_archive_path(root: &Path, uid: &str, timestamp: &str) -> PathBuf {
    uploader_dir(root, uid).join(format!("{timestamp}.tar"))
}

/// Extraction target: {root}/{uid}/{timestamp}
pub fn upload_dir(root: &Path, uid: &str, timestamp: &str) -> PathBuf {
    uploader_dir(root, uid).join(timestamp)
}

/// Alias: {root}/{uid}/latest
pub fn latest_link(root: &Path, uid: &str) -> PathBuf {
    uploader_dir(root, uid).join(LATEST_LINK)
}

/// Exercise seen through the alias: {root}/{uid}/latest/{exercise}
pub fn latest_exercise_dir(root: &Path, uid: &str, exercise: &str) -> PathBuf {
    latest_link(root, uid).join(exercise)
}

/// Report: {root}/{uid}/latest/TEST-{exercise}.json
pub fn report_path(root: &Path, uid: &str, exercise: &str) -> PathBuf {
    latest_link(root, uid).join(format!("TEST-{exercise}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn helpers_construct_expected_paths() {
        let root = Path::new("/srv/uploads");

        assert_eq!(uploader_dir(root, "u1"), root.join("u1"));
        assert_eq!(
            upload_archive_path(root, "u1", "1000"),
            root.join("u1").join("1000.tar")
        );
        assert_eq!(upload_dir(root, "u1", "1000"), root.join("u1").join("1000"));
        assert_eq!(latest_link(root, "u1"), root.join("u1").join("latest"));
        assert_eq!(
            latest_exercise_dir(root, "u1", "hello"),
            root.join("u1").join("latest").join("hello")
        );
        assert_eq!(
            report_path(root, "u1", "hello"),
            root.join("u1").join("latest").join("TEST-hello.json")
        );
    }

    #[test]
    fn private_dir_is_owner_only() {
        let td = TempDir::new().unwrap();
        let dir = ensure_private_dir(td.path().join("a/b")).unwrap();
        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn root_uses_absolute_as_is() {
        let td = TempDir::new().unwrap();
        assert_eq!(absolute_root(td.path()), td.path());
    }

    #[test]
    fn root_resolves_relative_against_cwd() {
        let expected = std::env::current_dir().unwrap().join("uploads_rel");
        assert_eq!(absolute_root("uploads_rel"), expected);
    }
}
