// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The fast-mode integrity index.
//!
//! Before the new manifest is fetched, fast mode parses the manifest stored
//! by the previous run and records the digest it asserted for every file.
//! The gate consults this index to skip re-hashing files the previous run
//! already verified. The index asserts nothing beyond what the previous
//! manifest guaranteed; the engine drops it as soon as a pass restarts.

use std::collections::BTreeMap;

use crate::manifest::{Entry, Op};

/// Ordered map from remote path to the digest the previous manifest declared.
#[derive(Debug, Default)]
pub struct IntegrityIndex {
    entries: BTreeMap<String, String>,
}

/// Join a base directory and a relative path the way remote paths are spelled.
pub fn join_remote(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

impl IntegrityIndex {
    pub fn new() -> IntegrityIndex {
        IntegrityIndex { entries: BTreeMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, remote: &str) -> Option<&str> {
        self.entries.get(remote).map(|s| &s[..])
    }

    /// Record the digests a manifest asserts. Under the flat dialects the
    /// digest applies to the decompressed content, so the `.lzma` twin of
    /// every file shares the entry; v7 and Android name exact paths only.
    pub fn extend_from_entries(&mut self, entries: &[Entry], base: &str, include_lzma: bool) {
        for entry in entries {
            if entry.op != Op::AddOrUpdate {
                continue;
            }
            let remote = join_remote(base, &entry.path);
            if include_lzma {
                self.entries.insert(format!("{}.lzma", remote), entry.digest.clone());
            }
            self.entries.insert(remote, entry.digest.clone());
        }
    }
}

#[cfg(test)]
mod test {
    use super::{join_remote, IntegrityIndex};
    use crate::manifest::{Entry, Op};

    fn entry(op: Op, path: &str, digest: &str) -> Entry {
        Entry {
            op,
            path: path.to_string(),
            digest: digest.to_string(),
            size: None,
            lzma_digest: None,
            lzma_size: None,
            is_child: false,
        }
    }

    #[test]
    fn extend_inserts_lzma_twin_for_flat_dialects() {
        let mut index = IntegrityIndex::new();
        let entries = [entry(Op::AddOrUpdate, "drweb32.vdb", "a1b2c3d4")];
        index.extend_from_entries(&entries, "unix/500", true);
        assert_eq!(index.get("unix/500/drweb32.vdb"), Some("a1b2c3d4"));
        assert_eq!(index.get("unix/500/drweb32.vdb.lzma"), Some("a1b2c3d4"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn extend_inserts_exact_paths_only_when_asked() {
        let mut index = IntegrityIndex::new();
        let entries = [entry(Op::AddOrUpdate, "pkg/blob.lzma", "ff")];
        index.extend_from_entries(&entries, "xmlzone", false);
        assert_eq!(index.get("xmlzone/pkg/blob.lzma"), Some("ff"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn extend_skips_delete_entries() {
        let mut index = IntegrityIndex::new();
        let entries = [entry(Op::Delete, "old.vdb", "")];
        index.extend_from_entries(&entries, "unix/500", true);
        assert!(index.is_empty());
    }

    #[test]
    fn join_remote_handles_empty_base() {
        assert_eq!(join_remote("", "drwebce.lst"), "drwebce.lst");
        assert_eq!(join_remote("android", "drwebce.lst"), "android/drwebce.lst");
    }
}
