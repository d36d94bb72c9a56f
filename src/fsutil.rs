// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Filesystem helpers: directory creation with mode bits, mtime handling,
//! wildcard deletion, and the lock-file guard.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use glob::Pattern;
use log::{info, warn};

use crate::config::{MODE_DIR, MODE_FILE};
use crate::error::{Error, Result};

/// Name of the advisory lock file created in the target directory.
const LOCK_NAME: &str = ".vdbmirror-lock";

fn file_err(path: &Path, err: io::Error) -> Error {
    Error::File(path.to_path_buf(), err)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| file_err(path, e))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Create every missing component of `path` as a directory with `MODE_DIR`.
pub fn make_path(path: &Path) -> Result<()> {
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component);
        if current.as_os_str().is_empty() {
            continue;
        }
        if current.is_dir() {
            continue;
        }
        fs::create_dir(&current).map_err(|e| file_err(&current, e))?;
        set_mode(&current, MODE_DIR)?;
    }
    Ok(())
}

/// Create the directories a file will be written into.
pub fn make_path_for(file: &Path) -> Result<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => make_path(parent),
        _ => Ok(()),
    }
}

/// Set a file's modification time, leaving the access time alone.
pub fn set_mtime(path: &Path, mtime: SystemTime) -> Result<()> {
    let f = fs::File::options()
        .write(true)
        .open(path)
        .map_err(|e| file_err(path, e))?;
    f.set_modified(mtime).map_err(|e| file_err(path, e))
}

/// Apply the mirrored-file permissions.
pub fn set_file_mode(path: &Path) -> Result<()> {
    set_mode(path, MODE_FILE)
}

pub fn file_size(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).map_err(|e| file_err(path, e))?;
    Ok(meta.len())
}

/// Delete the files in `directory` whose name matches `mask` (`*` and `?`
/// wildcards). Failures to delete individual files are logged, not fatal;
/// a missing directory means there is nothing to delete.
pub fn delete_files(directory: &Path, mask: &str) -> Result<()> {
    let pattern = match Pattern::new(mask) {
        Ok(p) => p,
        Err(..) => {
            warn!("Ignoring malformed delete mask {:?}", mask);
            return Ok(());
        }
    };

    let iter = match fs::read_dir(directory) {
        Ok(iter) => iter,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(file_err(directory, e)),
    };

    for dirent in iter {
        let dirent = dirent.map_err(|e| file_err(directory, e))?;
        let name = dirent.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if pattern.matches(name) {
            let victim = directory.join(name);
            info!("Deleting {}", victim.display());
            if let Err(e) = fs::remove_file(&victim) {
                warn!("Can't delete file {}: {}", victim.display(), e);
            }
        }
    }

    Ok(())
}

/// An advisory lock file that serializes concurrent instances on one target
/// directory. The file is removed when the guard is dropped; a failed run
/// cleans up after itself on every exit path.
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn acquire(directory: &Path) -> Result<LockFile> {
        let path = directory.join(LOCK_NAME);
        match fs::File::options().write(true).create_new(true).open(&path) {
            Ok(..) => Ok(LockFile { path }),
            Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::Locked(path)),
            Err(e) => Err(file_err(&path, e)),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        // Nothing to report if this fails; the lock is best-effort advisory
        // and a stale file surfaces as Error::Locked on the next run.
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::{delete_files, file_size, make_path, make_path_for, LockFile};
    use crate::error::Error;

    #[test]
    fn make_path_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c");
        make_path(&target).unwrap();
        assert!(target.is_dir());
        // A second call on an existing path is fine.
        make_path(&target).unwrap();
    }

    #[test]
    fn make_path_for_creates_the_parent_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x/y/file.vdb");
        make_path_for(&file).unwrap();
        assert!(dir.path().join("x/y").is_dir());
        assert!(!file.exists());
    }

    #[test]
    fn delete_files_honors_wildcards() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("drweb32.vdb"), b"x").unwrap();
        fs::write(dir.path().join("drweb33.vdb"), b"x").unwrap();
        fs::write(dir.path().join("keep.lst"), b"x").unwrap();

        delete_files(dir.path(), "drweb3?.vdb").unwrap();
        assert!(!dir.path().join("drweb32.vdb").exists());
        assert!(!dir.path().join("drweb33.vdb").exists());
        assert!(dir.path().join("keep.lst").exists());
    }

    #[test]
    fn delete_files_with_exact_name_deletes_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.vdb"), b"x").unwrap();
        fs::write(dir.path().join("gold.vdb"), b"x").unwrap();

        delete_files(dir.path(), "old.vdb").unwrap();
        assert!(!dir.path().join("old.vdb").exists());
        assert!(dir.path().join("gold.vdb").exists());
    }

    #[test]
    fn delete_files_tolerates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        delete_files(&dir.path().join("nowhere"), "*").unwrap();
    }

    #[test]
    fn file_size_reports_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"12345").unwrap();
        assert_eq!(file_size(&path).unwrap(), 5);
    }

    #[test]
    fn second_lock_acquisition_fails_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockFile::acquire(dir.path()).unwrap();
        match LockFile::acquire(dir.path()) {
            Err(Error::Locked(..)) => {}
            other => panic!("expected Locked, got {:?}", other.map(|_| ())),
        }
        drop(lock);
        LockFile::acquire(dir.path()).unwrap();
    }
}
