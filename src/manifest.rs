// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Manifest parsing for the five protocol dialects.
//!
//! The dialects differ only in wire format and digest algorithm; the engine
//! in [`crate::sync`] is written once against the [`Dialect`] capability
//! set. Parsers are tolerant: lines that don't look like an entry are
//! skipped, matching the original clients, and an Android entry with an
//! operation code we don't recognize is carried through as [`Op::Other`] so
//! the engine fails on it only when it is reached.

use crate::config::{Config, Protocol};
use crate::digest;
use crate::digest::HashFn;

/// What the manifest wants done with a file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Op {
    AddOrUpdate,
    Delete,
    /// An Android operation code other than add (0x0) or delete (0x2).
    Other(u64),
}

/// One file record extracted from a manifest.
///
/// `path` is relative to the dialect's base directory. `digest` is
/// normalized lowercase hex; for v4 the CRC32 additionally has its leading
/// zeros stripped, because the hasher's `%x`-style rendering elides them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub op: Op,
    pub path: String,
    pub digest: String,
    pub size: Option<u64>,
    pub lzma_digest: Option<String>,
    pub lzma_size: Option<u64>,
    /// v7: this entry names a child manifest whose own entries must be
    /// fetched and verified too.
    pub is_child: bool,
}

impl Entry {
    fn add(path: String, digest: String) -> Entry {
        Entry {
            op: Op::AddOrUpdate,
            path,
            digest,
            size: None,
            lzma_digest: None,
            lzma_size: None,
            is_child: false,
        }
    }

    fn delete(path: String) -> Entry {
        Entry {
            op: Op::Delete,
            path,
            digest: String::new(),
            size: None,
            lzma_digest: None,
            lzma_size: None,
            is_child: false,
        }
    }
}

/// The capability set a protocol dialect provides to the engine.
pub trait Dialect {
    /// Remote directory all entry paths are relative to.
    fn base_dir(&self, config: &Config) -> String;

    /// Remote path of the top-level manifest.
    fn manifest_path(&self, config: &Config) -> String;

    /// Sibling files fetched after the manifest; their failures are ignored.
    fn optional_paths(&self, config: &Config) -> Vec<String>;

    fn parse(&self, bytes: &[u8]) -> Vec<Entry>;

    /// Entries of a v7 child manifest. Empty for everything else.
    fn parse_child(&self, bytes: &[u8]) -> Vec<Entry> {
        let _ = bytes;
        Vec::new()
    }

    /// The hasher that verifies entries, and its name for log lines.
    fn primary_hash(&self) -> (HashFn, &'static str);

    /// The hasher for `.lzma` twins of mirrored files, where the dialect
    /// has them. The twin shares the primary digest: it is computed over
    /// the decompressed content.
    fn lzma_sibling(&self) -> Option<(HashFn, &'static str)>;

    /// Whether the fast index should also cover `.lzma` twins.
    fn index_includes_lzma(&self) -> bool {
        self.lzma_sibling().is_some()
    }
}

pub fn dialect_for(protocol: Protocol) -> Box<dyn Dialect> {
    match protocol {
        Protocol::V4 => Box::new(V4),
        Protocol::V5 => Box::new(V5x { manifest: "version.lst" }),
        Protocol::V52 => Box::new(V5x { manifest: "version2.lst" }),
        Protocol::V7 => Box::new(V7),
        Protocol::Android => Box::new(Android),
    }
}

fn lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split('\n')
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect()
}

/// Extract the local file name and the text after the first `,` from a flat
/// (v4/v5/v5.2) entry body.
///
/// Entry bodies may carry a `<platform>` marker (everything up to and
/// including the `>` is dropped), a Windows-style `%VAR%\...\name.ext` path
/// (only the basename after the last backslash is kept), and a `|args`
/// suffix (dropped). Bodies without a `,` separator are not entries.
fn split_flat_entry(line: &str) -> Option<(String, &str)> {
    let mut name = &line[1..];
    if let Some(i) = name.find('>') {
        name = &name[i + 1..];
    }
    if let Some(i) = name.rfind('\\') {
        name = &name[i + 1..];
    }
    let end = name.find(',')?;
    let mut name = &name[..end];
    if let Some(i) = name.find('|') {
        name = &name[..i];
    }

    let comma = line.find(',')?;
    let rest = line[comma + 1..].trim_start_matches(' ');
    Some((name.to_string(), rest))
}

/// Parse the decimal digits at the start of a field, `sscanf`-style.
fn leading_u64(s: &str) -> Option<u64> {
    let s = s.trim_start_matches(' ');
    let len = s.bytes().take_while(|b| b.is_ascii_digit()).count();
    if len == 0 {
        None
    } else {
        s[..len].parse().ok()
    }
}

fn is_flat_add(line: &str) -> bool {
    line.starts_with('+') || line.starts_with('=') || line.starts_with('!')
}

fn parse_flat_delete(line: &str) -> Option<Entry> {
    let body = &line[1..];
    let end = body.find(',')?;
    Some(Entry::delete(body[..end].to_string()))
}

/// v4: flat `drweb32.lst`, `<op><path>, <crc32>` entries.
pub struct V4;

impl Dialect for V4 {
    fn base_dir(&self, config: &Config) -> String {
        config.remote_dir.clone()
    }

    fn manifest_path(&self, config: &Config) -> String {
        format!("{}/drweb32.lst", config.remote_dir)
    }

    fn optional_paths(&self, config: &Config) -> Vec<String> {
        [
            "drweb32.lst.lzma",
            "version.lst",
            "version.lst.lzma",
            "drweb32.flg",
            "drweb32.flg.lzma",
        ]
        .iter()
        .map(|name| format!("{}/{}", config.remote_dir, name))
        .collect()
    }

    fn parse(&self, bytes: &[u8]) -> Vec<Entry> {
        let mut entries = Vec::new();
        for line in lines(bytes) {
            if is_flat_add(&line) {
                if let Some((name, rest)) = split_flat_entry(&line) {
                    let crc: String = rest.chars().take(8).collect();
                    let crc = crc
                        .trim_end()
                        .trim_start_matches('0')
                        .to_ascii_lowercase();
                    entries.push(Entry::add(name, crc));
                }
            } else if line.starts_with('-') {
                if let Some(entry) = parse_flat_delete(&line) {
                    entries.push(entry);
                }
            }
        }
        entries
    }

    fn primary_hash(&self) -> (HashFn, &'static str) {
        (digest::crc32_file, "CRC32")
    }

    fn lzma_sibling(&self) -> Option<(HashFn, &'static str)> {
        Some((digest::crc32_lzma_file, "CRC32 LZMA"))
    }
}

/// v5 and v5.2: flat manifest, SHA-256, optional size, and (v5.2) optional
/// LZMA digest and size. The two differ only in the manifest file name.
pub struct V5x {
    manifest: &'static str,
}

impl V5x {
    fn parse_add(line: &str) -> Option<Entry> {
        let (name, rest) = split_flat_entry(line)?;
        let sha = rest.get(..64)?.to_ascii_lowercase();
        let after = rest.get(64..)?;

        let mut entry = Entry::add(name, sha);
        if let Some(i) = after.find(',') {
            let tail = &after[i + 1..];
            entry.size = leading_u64(tail);
            if let Some(j) = tail.find(',') {
                let ltail = tail[j + 1..].trim_start_matches(' ');
                if let Some(lzma_sha) = ltail.get(..64) {
                    entry.lzma_digest = Some(lzma_sha.to_ascii_lowercase());
                    if let Some(k) = ltail[64..].find(',') {
                        entry.lzma_size = leading_u64(&ltail[64 + k + 1..]);
                    }
                }
            }
        }
        Some(entry)
    }
}

impl Dialect for V5x {
    fn base_dir(&self, config: &Config) -> String {
        config.remote_dir.clone()
    }

    fn manifest_path(&self, config: &Config) -> String {
        format!("{}/{}", config.remote_dir, self.manifest)
    }

    fn optional_paths(&self, config: &Config) -> Vec<String> {
        let mut paths = vec![
            format!("{}/{}.lzma", config.remote_dir, self.manifest),
            format!("{}/drweb32.flg", config.remote_dir),
            format!("{}/drweb32.flg.lzma", config.remote_dir),
        ];
        // version.lst usually rides along with the newer manifests.
        if self.manifest != "version.lst" {
            paths.push(format!("{}/version.lst", config.remote_dir));
            paths.push(format!("{}/version.lst.lzma", config.remote_dir));
        }
        paths
    }

    fn parse(&self, bytes: &[u8]) -> Vec<Entry> {
        let mut entries = Vec::new();
        for line in lines(bytes) {
            if is_flat_add(&line) {
                if let Some(entry) = V5x::parse_add(&line) {
                    entries.push(entry);
                }
            } else if line.starts_with('-') {
                if let Some(entry) = parse_flat_delete(&line) {
                    entries.push(entry);
                }
            }
        }
        entries
    }

    fn primary_hash(&self) -> (HashFn, &'static str) {
        (digest::sha256_file, "SHA256")
    }

    fn lzma_sibling(&self) -> Option<(HashFn, &'static str)> {
        Some((digest::sha256_lzma_file, "SHA256 LZMA"))
    }
}

/// v7: `versions.xml` listing `<xml .../>` child manifests and `<lzma .../>`
/// files, both carrying `name`, `hash`, and optionally `size` attributes.
/// Digests are plain SHA-256 over the stored bytes, even for `.lzma` names.
pub struct V7;

fn xml_attr(line: &str, name: &str) -> Option<String> {
    let pattern = format!("{}=\"", name);
    let start = line.find(&pattern)? + pattern.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    if end == 0 {
        None
    } else {
        Some(rest[..end].to_string())
    }
}

fn parse_v7_line(line: &str, accept_children: bool) -> Option<Entry> {
    let is_xml = line.contains("<xml");
    if is_xml && !accept_children {
        return None;
    }
    if !is_xml && !line.contains("<lzma") {
        return None;
    }
    let hash = xml_attr(line, "hash")?;
    let name = xml_attr(line, "name")?;
    let mut entry = Entry::add(name, hash.to_ascii_lowercase());
    entry.size = xml_attr(line, "size").as_deref().and_then(leading_u64);
    entry.is_child = is_xml;
    Some(entry)
}

impl Dialect for V7 {
    fn base_dir(&self, config: &Config) -> String {
        config.remote_dir.clone()
    }

    fn manifest_path(&self, config: &Config) -> String {
        format!("{}/versions.xml", config.remote_dir)
    }

    fn optional_paths(&self, _config: &Config) -> Vec<String> {
        Vec::new()
    }

    fn parse(&self, bytes: &[u8]) -> Vec<Entry> {
        lines(bytes)
            .into_iter()
            .filter_map(|line| parse_v7_line(&line, true))
            .collect()
    }

    fn parse_child(&self, bytes: &[u8]) -> Vec<Entry> {
        lines(bytes)
            .into_iter()
            .filter_map(|line| parse_v7_line(&line, false))
            .collect()
    }

    fn primary_hash(&self) -> (HashFn, &'static str) {
        (digest::sha256_file, "SHA256")
    }

    fn lzma_sibling(&self) -> Option<(HashFn, &'static str)> {
        None
    }
}

/// Android: an INI-style manifest whose `[Files]` section lists seven
/// comma-separated fields per line. Field 2 is the operation code in hex,
/// field 3 the size in hex, field 4 the MD5, field 7 the relative path.
pub struct Android;

fn hex_field(s: &str) -> Option<u64> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

impl Dialect for Android {
    fn base_dir(&self, config: &Config) -> String {
        match config.remote_dir.rfind('/') {
            Some(i) => config.remote_dir[..i].to_string(),
            None => String::new(),
        }
    }

    fn manifest_path(&self, config: &Config) -> String {
        config.remote_dir.clone()
    }

    fn optional_paths(&self, _config: &Config) -> Vec<String> {
        Vec::new()
    }

    fn parse(&self, bytes: &[u8]) -> Vec<Entry> {
        let mut entries = Vec::new();
        let mut in_files = false;
        for line in lines(bytes) {
            if !in_files {
                if line.starts_with("[Files]") {
                    in_files = true;
                }
                continue;
            }
            // A new section or a line too short to hold all seven fields
            // terminates the listing.
            if line.starts_with('[') || line.len() < 84 {
                break;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 7 {
                continue;
            }
            let op_code = match hex_field(fields[1]) {
                Some(code) => code,
                None => continue,
            };
            let path = match fields[6].trim().split_whitespace().next() {
                Some(p) => p.to_string(),
                None => continue,
            };
            let op = match op_code {
                0x0 => Op::AddOrUpdate,
                0x2 => Op::Delete,
                other => Op::Other(other),
            };
            let mut entry = Entry::add(path, fields[3].trim().to_ascii_lowercase());
            entry.op = op;
            entry.size = hex_field(fields[2]);
            entries.push(entry);
        }
        entries
    }

    fn primary_hash(&self) -> (HashFn, &'static str) {
        (digest::md5_file, "MD5")
    }

    fn lzma_sibling(&self) -> Option<(HashFn, &'static str)> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::{dialect_for, Android, Dialect, Entry, Op, V4, V5x, V7};
    use crate::config::Protocol;

    #[test]
    fn v4_parses_a_plain_entry() {
        let manifest = b"+drweb32.vdb, A1B2C3D4\r\n";
        let entries = V4.parse(manifest);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op, Op::AddOrUpdate);
        assert_eq!(entries[0].path, "drweb32.vdb");
        assert_eq!(entries[0].digest, "a1b2c3d4");
        assert_eq!(entries[0].size, None);
    }

    #[test]
    fn v4_strips_platform_marker_and_windows_path() {
        let manifest = b"=<wnt>%SYSDIR%\\spider.cpl, 871D501E\r\n";
        let entries = V4.parse(manifest);
        assert_eq!(entries[0].path, "spider.cpl");
        assert_eq!(entries[0].digest, "871d501e");
    }

    #[test]
    fn v4_strips_argument_suffix() {
        let manifest = b"!drwreg.exe|-xi, FE7E4B36\r\n";
        let entries = V4.parse(manifest);
        assert_eq!(entries[0].path, "drwreg.exe");
        assert_eq!(entries[0].digest, "fe7e4b36");
    }

    #[test]
    fn v4_strips_leading_zeros_from_the_crc() {
        let manifest = b"+a.vdb, 0000ABCD\r\n";
        let entries = V4.parse(manifest);
        assert_eq!(entries[0].digest, "abcd");
    }

    #[test]
    fn v4_parses_delete_entries() {
        let manifest = b"-drwtoday.vdb, 0\r\n";
        let entries = V4.parse(manifest);
        assert_eq!(entries[0].op, Op::Delete);
        assert_eq!(entries[0].path, "drwtoday.vdb");
    }

    #[test]
    fn v4_skips_unrecognized_lines() {
        let manifest = b";comment\r\nDrWebUpdate 4\r\n+a.vdb, 11223344\r\nmalformed\r\n";
        let entries = V4.parse(manifest);
        assert_eq!(entries.len(), 1);
    }

    const SHA_A: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const SHA_B: &str = "9641a49d02e90cbb6213f202fb632da70cdc59073d42283cfcdc1d786454f17f";

    #[test]
    fn v5_parses_digest_and_size() {
        let v5 = V5x { manifest: "version.lst" };
        let manifest = format!("=agent.exe, {}, 2048\r\n", SHA_A.to_uppercase());
        let entries = v5.parse(manifest.as_bytes());
        assert_eq!(entries[0].path, "agent.exe");
        assert_eq!(entries[0].digest, SHA_A);
        assert_eq!(entries[0].size, Some(2048));
        assert_eq!(entries[0].lzma_digest, None);
    }

    #[test]
    fn v5_size_is_optional() {
        let v5 = V5x { manifest: "version.lst" };
        let manifest = format!("+bases/core.vdb, {}\r\n", SHA_A);
        let entries = v5.parse(manifest.as_bytes());
        assert_eq!(entries[0].size, None);
    }

    #[test]
    fn v52_parses_lzma_digest_and_size() {
        let v52 = V5x { manifest: "version2.lst" };
        let manifest = format!("=core.vdb, {}, 4096, {}, 512\r\n", SHA_A, SHA_B);
        let entries = v52.parse(manifest.as_bytes());
        assert_eq!(entries[0].digest, SHA_A);
        assert_eq!(entries[0].size, Some(4096));
        assert_eq!(entries[0].lzma_digest.as_deref(), Some(SHA_B));
        assert_eq!(entries[0].lzma_size, Some(512));
    }

    #[test]
    fn v5_skips_entries_with_truncated_digest() {
        let v5 = V5x { manifest: "version.lst" };
        let entries = v5.parse(b"=broken.vdb, 12345\r\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn v7_parses_child_and_file_entries() {
        let manifest = b"<versions>\r\n\
            \x20 <xml name=\"pkg/sub.xml\" hash=\"AA11\" size=\"100\"/>\r\n\
            \x20 <lzma name=\"blob.lzma\" hash=\"bb22\"/>\r\n\
            </versions>\r\n";
        let entries = V7.parse(manifest);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_child);
        assert_eq!(entries[0].path, "pkg/sub.xml");
        assert_eq!(entries[0].digest, "aa11");
        assert_eq!(entries[0].size, Some(100));
        assert!(!entries[1].is_child);
        assert_eq!(entries[1].path, "blob.lzma");
        assert_eq!(entries[1].size, None);
    }

    #[test]
    fn v7_child_parse_ignores_nested_xml_references() {
        let child = b"<xml name=\"deeper.xml\" hash=\"cc\"/>\r\n\
            <lzma name=\"data.lzma\" hash=\"dd\" size=\"7\"/>\r\n";
        let entries = V7.parse_child(child);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "data.lzma");
        assert_eq!(entries[0].size, Some(7));
    }

    fn android_line(op: &str, size: &str, md5: &str, name: &str) -> String {
        // Field five is padded so the line clears the 84-character minimum
        // real manifests always satisfy.
        format!(
            "com.drweb.pro, {}, {}, {}, {:<40}, 0, {}",
            op, size, md5, "Dr.Web Anti-virus", name
        )
    }

    #[test]
    fn android_parses_adds_with_hex_size() {
        let manifest = format!(
            "[About]\nVersion=9\n[Files]\n{}\n",
            android_line("0x0", "0x200", "900150983CD24FB0D6963F7D28E17F72", "drweb.db")
        );
        let entries = Android.parse(manifest.as_bytes());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op, Op::AddOrUpdate);
        assert_eq!(entries[0].path, "drweb.db");
        assert_eq!(entries[0].size, Some(0x200));
        // MD5 is lowercased at parse.
        assert_eq!(entries[0].digest, "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn android_parses_deletes() {
        let manifest = format!(
            "[Files]\n{}\n",
            android_line("0x2", "0x0", "00000000000000000000000000000000", "old.vdb")
        );
        let entries = Android.parse(manifest.as_bytes());
        assert_eq!(entries[0].op, Op::Delete);
        assert_eq!(entries[0].path, "old.vdb");
    }

    #[test]
    fn android_keeps_unknown_ops_for_the_engine() {
        let manifest = format!(
            "[Files]\n{}\n",
            android_line("0x7", "0x0", "00000000000000000000000000000000", "odd.vdb")
        );
        let entries = Android.parse(manifest.as_bytes());
        assert_eq!(entries[0].op, Op::Other(0x7));
    }

    #[test]
    fn android_section_ends_at_short_line() {
        let manifest = format!(
            "[Files]\n{}\nchecksum=1234\n{}\n",
            android_line("0x0", "0x1", "00000000000000000000000000000000", "a.db"),
            android_line("0x0", "0x1", "00000000000000000000000000000000", "b.db")
        );
        let entries = Android.parse(manifest.as_bytes());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn android_section_ends_at_next_section() {
        let manifest = format!(
            "[Files]\n{}\n[Checksums]\n{}\n",
            android_line("0x0", "0x1", "00000000000000000000000000000000", "a.db"),
            android_line("0x0", "0x1", "00000000000000000000000000000000", "b.db")
        );
        let entries = Android.parse(manifest.as_bytes());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn android_ignores_lines_before_files_section() {
        let manifest = format!(
            "{}\n[Files]\n{}\n",
            android_line("0x0", "0x1", "00000000000000000000000000000000", "early.db"),
            android_line("0x0", "0x1", "00000000000000000000000000000000", "real.db")
        );
        let entries = Android.parse(manifest.as_bytes());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "real.db");
    }

    #[test]
    fn dialect_for_selects_manifest_names() {
        let mut opts = crate::cli::Options::new();
        opts.server = "example.com".to_string();
        opts.protocol = Protocol::Android;
        opts.remote_dir = "android/drwebce.lst".to_string();
        let config = crate::config::Config::from_options(opts).unwrap();

        assert_eq!(
            dialect_for(Protocol::Android).manifest_path(&config),
            "android/drwebce.lst"
        );
        assert_eq!(dialect_for(Protocol::Android).base_dir(&config), "android");

        let mut config = config;
        config.remote_dir = "unix/500".to_string();
        assert_eq!(
            dialect_for(Protocol::V4).manifest_path(&config),
            "unix/500/drweb32.lst"
        );
        assert_eq!(
            dialect_for(Protocol::V5).manifest_path(&config),
            "unix/500/version.lst"
        );
        assert_eq!(
            dialect_for(Protocol::V52).manifest_path(&config),
            "unix/500/version2.lst"
        );
        assert_eq!(
            dialect_for(Protocol::V7).manifest_path(&config),
            "unix/500/versions.xml"
        );
    }

    #[test]
    fn entry_helpers_build_the_expected_shapes() {
        let add = Entry::add("a".to_string(), "ff".to_string());
        assert_eq!(add.op, Op::AddOrUpdate);
        let del = Entry::delete("b".to_string());
        assert_eq!(del.op, Op::Delete);
        assert!(del.digest.is_empty());
    }
}
