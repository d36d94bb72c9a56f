// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The synchronization engine.
//!
//! One skeleton serves all five dialects: lock the target directory, set up
//! fast mode from the previous run's manifest, then run verification passes
//! until one completes. A digest or size mismatch anywhere aborts the pass;
//! the engine sleeps, disables fast mode, and starts the whole pass over,
//! up to `MAX_REPEAT` times. Everything written by an aborted pass stays on
//! disk: its digests won't match on the next pass, so it is re-checked and
//! replaced there.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use log::{debug, info, warn};

use crate::cache;
use crate::cache::IntegrityIndex;
use crate::config::{Config, MAX_REPEAT};
use crate::digest;
use crate::digest::HashFn;
use crate::error::{Error, Result};
use crate::fetch;
use crate::fetch::{DownloadStatus, FileStatus};
use crate::fsutil;
use crate::http::Transport;
use crate::manifest;
use crate::manifest::{Dialect, Entry, Op};

/// How a verification pass ended.
enum Pass {
    Done,
    Restart,
}

/// What to do after one manifest entry.
enum Step {
    Continue,
    Restart,
}

/// Synchronize the local mirror with the remote repository.
pub fn run(config: &Config) -> Result<()> {
    let dialect = manifest::dialect_for(config.protocol);
    let mut task = SyncTask::new(config, &*dialect);
    task.run()
}

struct SyncTask<'a> {
    config: &'a Config,
    dialect: &'a dyn Dialect,
    transport: Transport<'a>,
    index: IntegrityIndex,
    fast: bool,
    attempt: u32,
    /// Remote directory all entries are relative to.
    base: String,
    local_base: PathBuf,
    manifest_remote: String,
    manifest_local: PathBuf,
    /// SHA-256 and size of the previous run's manifest, for the fast-mode
    /// "nothing changed" short-circuit.
    prior: Option<(String, u64)>,
}

fn parent_of(remote: &str) -> String {
    match remote.rfind('/') {
        Some(i) => remote[..i].to_string(),
        None => String::new(),
    }
}

impl<'a> SyncTask<'a> {
    fn new(config: &'a Config, dialect: &'a dyn Dialect) -> SyncTask<'a> {
        let base = dialect.base_dir(config);
        let local_base = config.local_dir(&base);
        let manifest_remote = dialect.manifest_path(config);
        let manifest_local = config.local_path(&manifest_remote);
        SyncTask {
            config,
            dialect,
            transport: Transport::new(config),
            index: IntegrityIndex::new(),
            fast: config.fast_mode,
            attempt: 0,
            base,
            local_base,
            manifest_remote,
            manifest_local,
            prior: None,
        }
    }

    fn run(&mut self) -> Result<()> {
        fsutil::make_path(&self.local_base)?;
        let _lock = fsutil::LockFile::acquire(&self.local_base)?;

        if self.fast {
            self.init_fast_mode();
        }

        loop {
            if self.attempt > 0 && self.fast {
                // An incomplete update would leave the index asserting
                // digests the disk no longer has.
                self.fast = false;
                warn!("Fast mode has been disabled");
            }

            match self.run_pass()? {
                Pass::Done => return Ok(()),
                Pass::Restart => {
                    if self.attempt >= MAX_REPEAT {
                        return Err(Error::TooManyRetries);
                    }
                    self.attempt += 1;
                    thread::sleep(self.config.repeat_sleep);
                }
            }
        }
    }

    /// Digest the previous run's manifest and build the integrity index
    /// from it. Without a previous manifest there is nothing to trust, so
    /// fast mode turns itself off.
    fn init_fast_mode(&mut self) {
        match digest::sha256_file(&self.manifest_local) {
            Ok(hash) => {
                if let Ok(size) = fsutil::file_size(&self.manifest_local) {
                    self.prior = Some((hash, size));
                }
                if let Ok(bytes) = fs::read(&self.manifest_local) {
                    let entries = self.dialect.parse(&bytes);
                    self.index.extend_from_entries(
                        &entries,
                        &self.base,
                        self.dialect.index_includes_lzma(),
                    );
                    debug!("Integrity index holds {} paths", self.index.len());
                }
            }
            Err(..) => {
                warn!("{} was not found", self.manifest_remote);
                warn!("Fast mode has been disabled");
                self.fast = false;
            }
        }
    }

    fn run_pass(&mut self) -> Result<Pass> {
        let manifest_local = self.manifest_local.clone();
        let manifest_remote = self.manifest_remote.clone();
        match fetch::download(
            &mut self.transport,
            self.config,
            &manifest_remote,
            &manifest_local,
        )? {
            DownloadStatus::Downloaded => {}
            DownloadStatus::NotFound => return Err(Error::NotFound(manifest_remote)),
        }

        if self.fast {
            if let Some((ref prior_hash, prior_size)) = self.prior {
                if fsutil::file_size(&manifest_local)? == prior_size
                    && digest::sha256_file(&manifest_local)? == *prior_hash
                {
                    info!("Nothing was changed");
                    return Ok(Pass::Done);
                }
            }
        }

        for remote in self.dialect.optional_paths(self.config) {
            let local = self.config.local_path(&remote);
            match fetch::download(&mut self.transport, self.config, &remote, &local) {
                Ok(..) => {}
                Err(e) => debug!("Ignoring optional file {}: {}", remote, e),
            }
        }

        let bytes = fs::read(&manifest_local)
            .map_err(|e| Error::File(manifest_local.clone(), e))?;
        let entries = self.dialect.parse(&bytes);
        debug!("Manifest lists {} entries", entries.len());

        for entry in &entries {
            match self.apply_entry(entry)? {
                Step::Continue => {}
                Step::Restart => return Ok(Pass::Restart),
            }
        }

        Ok(Pass::Done)
    }

    fn apply_entry(&mut self, entry: &Entry) -> Result<Step> {
        match entry.op {
            Op::Delete => {
                self.delete_entry(entry)?;
                Ok(Step::Continue)
            }
            Op::Other(code) => Err(Error::UnknownFileOperation(code, entry.path.clone())),
            Op::AddOrUpdate => self.update_entry(entry),
        }
    }

    fn delete_entry(&mut self, entry: &Entry) -> Result<()> {
        let dir = self.config.local_dir(&self.base);
        fsutil::delete_files(&dir, &entry.path)?;
        if self.dialect.index_includes_lzma() {
            fsutil::delete_files(&dir, &format!("{}.lzma", entry.path))?;
        }
        Ok(())
    }

    fn update_entry(&mut self, entry: &Entry) -> Result<Step> {
        let remote = cache::join_remote(&self.base, &entry.path);
        let local = self.config.local_path(&remote);
        fsutil::make_path_for(&local)?;

        // A pre-existing child manifest still describes files on disk, so
        // on the first attempt it can extend the index before the new copy
        // replaces it.
        if entry.is_child && self.fast && self.attempt == 0 && local.exists() {
            if let Ok(bytes) = fs::read(&local) {
                let child_entries = self.dialect.parse_child(&bytes);
                let child_base = parent_of(&remote);
                self.index.extend_from_entries(&child_entries, &child_base, false);
            }
        }

        let (hash, kind) = self.dialect.primary_hash();
        let status = self.gate(&local, &remote, &entry.digest, hash, kind)?;
        match status {
            FileStatus::TryAgain => return Ok(Step::Restart),
            FileStatus::NotFound => return Err(Error::NotFound(remote)),
            FileStatus::Exists | FileStatus::Downloaded => {}
        }

        if let Some(size) = entry.size {
            if fsutil::file_size(&local)? != size {
                warn!("Size mismatch on {}", remote);
                return Ok(Step::Restart);
            }
        }

        if self.dialect.lzma_sibling().is_some() {
            match self.update_lzma_sibling(entry, &remote, status)? {
                Step::Restart => return Ok(Step::Restart),
                Step::Continue => {}
            }
        }

        if entry.is_child {
            return self.apply_child(&remote, &local);
        }

        Ok(Step::Continue)
    }

    /// The `.lzma` twin of a mirrored file. It shares the primary digest
    /// (computed over decompressed content) and is only considered when the
    /// primary was just downloaded or a local twin already exists. A 404
    /// means the repository stopped shipping the twin, so a stale local one
    /// is removed.
    fn update_lzma_sibling(
        &mut self,
        entry: &Entry,
        remote: &str,
        primary_status: FileStatus,
    ) -> Result<Step> {
        let (hash, kind) = match self.dialect.lzma_sibling() {
            Some(sibling) => sibling,
            None => return Ok(Step::Continue),
        };
        let lzma_remote = format!("{}.lzma", remote);
        let lzma_local = self.config.local_path(&lzma_remote);

        if primary_status != FileStatus::Downloaded && !lzma_local.exists() {
            return Ok(Step::Continue);
        }

        let status = self.gate(&lzma_local, &lzma_remote, &entry.digest, hash, kind)?;
        match status {
            FileStatus::NotFound => {
                if lzma_local.exists() {
                    info!("Deleting {}", lzma_local.display());
                    if let Err(e) = fs::remove_file(&lzma_local) {
                        warn!("Can't delete file {}: {}", lzma_local.display(), e);
                    }
                }
                return Ok(Step::Continue);
            }
            FileStatus::TryAgain => return Ok(Step::Restart),
            FileStatus::Exists | FileStatus::Downloaded => {}
        }

        // The declared size of the plain file bounds the decompressed
        // content; the declared LZMA size bounds the stored file.
        if let Some(size) = entry.size {
            match digest::lzma_plain_size(&lzma_local) {
                Ok(n) if n == size => {}
                _ => {
                    warn!("Decompressed size mismatch on {}", lzma_remote);
                    return Ok(Step::Restart);
                }
            }
        }
        if let Some(lzma_size) = entry.lzma_size {
            if fsutil::file_size(&lzma_local)? != lzma_size {
                warn!("Size mismatch on {}", lzma_remote);
                return Ok(Step::Restart);
            }
        }

        if !self.fast {
            if let Some(ref lzma_digest) = entry.lzma_digest {
                info!("{} checking stored SHA256", lzma_remote);
                match digest::sha256_file(&lzma_local) {
                    Ok(ref real) if real == lzma_digest => {}
                    Ok(real) => {
                        warn!(
                            "SHA256 mismatch on {} (real=\"{}\", base=\"{}\")",
                            lzma_remote, real, lzma_digest
                        );
                        return Ok(Step::Restart);
                    }
                    Err(..) => return Ok(Step::Restart),
                }
            }
        }

        Ok(Step::Continue)
    }

    /// Fetch and verify every file a v7 child manifest lists.
    fn apply_child(&mut self, remote: &str, local: &Path) -> Result<Step> {
        let bytes = fs::read(local).map_err(|e| Error::File(local.to_path_buf(), e))?;
        let entries = self.dialect.parse_child(&bytes);
        let child_base = parent_of(remote);
        let (hash, kind) = self.dialect.primary_hash();
        debug!("Child manifest {} lists {} entries", remote, entries.len());

        for entry in &entries {
            let entry_remote = cache::join_remote(&child_base, &entry.path);
            let entry_local = self.config.local_path(&entry_remote);
            fsutil::make_path_for(&entry_local)?;

            let status = self.gate(&entry_local, &entry_remote, &entry.digest, hash, kind)?;
            match status {
                FileStatus::TryAgain => return Ok(Step::Restart),
                FileStatus::NotFound => return Err(Error::NotFound(entry_remote)),
                FileStatus::Exists | FileStatus::Downloaded => {}
            }

            if let Some(size) = entry.size {
                if fsutil::file_size(&entry_local)? != size {
                    warn!("Size mismatch on {}", entry_remote);
                    return Ok(Step::Restart);
                }
            }
        }

        Ok(Step::Continue)
    }

    fn gate(
        &mut self,
        local: &Path,
        remote: &str,
        expected: &str,
        hash: HashFn,
        kind: &str,
    ) -> Result<FileStatus> {
        let index = if self.fast { Some(&self.index) } else { None };
        fetch::ensure_file(
            &mut self.transport,
            self.config,
            index,
            local,
            remote,
            expected,
            hash,
            kind,
        )
    }
}

#[cfg(test)]
mod test {
    use super::parent_of;

    #[test]
    fn parent_of_splits_off_the_last_component() {
        assert_eq!(parent_of("xmlzone/pkg/sub.xml"), "xmlzone/pkg");
        assert_eq!(parent_of("drwebce.lst"), "");
    }
}
