// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! File hashers.
//!
//! Every hasher is a pure function `path -> lowercase hex digest`. The
//! engine picks one per dialect and the gate compares its output against the
//! normalized manifest digest. Files are mmapped for hashing; we never read
//! them into an owned buffer. The LZMA variants decode the stream into a
//! rolling hasher, so the decompressed content is never materialized either.

use std::io;
use std::io::Write;
use std::path::Path;

use filebuffer::FileBuffer;
use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// The signature shared by all hashers.
pub type HashFn = fn(&Path) -> Result<String>;

const HEX_CHARS: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7',
    '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// String-format bytes as lowercase hexadecimal.
pub fn hex_string(bytes: &[u8]) -> String {
    let mut string = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        string.push(HEX_CHARS[(b >> 4) as usize]);
        string.push(HEX_CHARS[(b & 0xf) as usize]);
    }
    string
}

fn open(path: &Path) -> Result<FileBuffer> {
    FileBuffer::open(path).map_err(|e| Error::File(path.to_path_buf(), e))
}

/// CRC32 of a file, formatted without leading zeros to match the manifest
/// normalization in v4.
pub fn crc32_file(path: &Path) -> Result<String> {
    let fbuffer = open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&fbuffer);
    Ok(format!("{:x}", hasher.finalize()))
}

/// MD5 of a file. Mmaps the file.
pub fn md5_file(path: &Path) -> Result<String> {
    let fbuffer = open(path)?;
    Ok(hex_string(Md5::digest(&fbuffer[..]).as_slice()))
}

/// SHA-256 of a file. Mmaps the file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let fbuffer = open(path)?;
    Ok(hex_string(Sha256::digest(&fbuffer[..]).as_slice()))
}

/// CRC32 of the decompressed content of an `.lzma` file.
pub fn crc32_lzma_file(path: &Path) -> Result<String> {
    let mut sink = Crc32Sink::new();
    decode_into(path, &mut sink)?;
    Ok(format!("{:x}", sink.hasher.finalize()))
}

/// SHA-256 of the decompressed content of an `.lzma` file.
pub fn sha256_lzma_file(path: &Path) -> Result<String> {
    let mut sink = DigestSink::<Sha256>::new();
    decode_into(path, &mut sink)?;
    Ok(hex_string(sink.hasher.finalize().as_slice()))
}

/// Number of bytes an `.lzma` file decompresses to.
pub fn lzma_plain_size(path: &Path) -> Result<u64> {
    let mut sink = CountSink { len: 0 };
    decode_into(path, &mut sink)?;
    Ok(sink.len)
}

fn decode_into<W: Write>(path: &Path, sink: &mut W) -> Result<()> {
    let fbuffer = open(path)?;
    let mut input: &[u8] = &fbuffer;
    lzma_rs::lzma_decompress(&mut input, sink)
        .map_err(|e| Error::Lzma(path.to_path_buf(), e))
}

/// A write sink that feeds a message digest and discards the bytes.
struct DigestSink<D: Digest> {
    hasher: D,
}

impl<D: Digest> DigestSink<D> {
    fn new() -> DigestSink<D> {
        DigestSink { hasher: D::new() }
    }
}

impl<D: Digest> Write for DigestSink<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Crc32Sink {
    hasher: crc32fast::Hasher,
}

impl Crc32Sink {
    fn new() -> Crc32Sink {
        Crc32Sink { hasher: crc32fast::Hasher::new() }
    }
}

impl Write for Crc32Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct CountSink {
    len: u64,
}

impl Write for CountSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.len += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::{crc32_file, crc32_lzma_file, lzma_plain_size, md5_file, sha256_file,
                sha256_lzma_file};

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn write_lzma(dir: &tempfile::TempDir, name: &str, plain: &[u8]) -> std::path::PathBuf {
        let mut compressed = Vec::new();
        let mut input = plain;
        lzma_rs::lzma_compress(&mut input, &mut compressed).unwrap();
        write_file(dir, name, &compressed)
    }

    #[test]
    fn crc32_file_matches_check_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "f", b"123456789");
        assert_eq!(crc32_file(&path).unwrap(), "cbf43926");
    }

    #[test]
    fn crc32_file_elides_leading_zeros() {
        // CRC32 of "!" is 0x0B5A994F... pick bytes whose crc starts with a
        // zero nibble instead: brute force a small input in the test.
        let dir = tempfile::tempdir().unwrap();
        for i in 0u32..4096 {
            let content = i.to_le_bytes();
            let crc = crc32fast::hash(&content);
            if crc < 0x1000_0000 && crc > 0 {
                let path = write_file(&dir, "f", &content);
                let hex = crc32_file(&path).unwrap();
                assert!(hex.len() < 8);
                assert_eq!(u32::from_str_radix(&hex, 16).unwrap(), crc);
                return;
            }
        }
        panic!("no test input found with a leading zero nibble");
    }

    #[test]
    fn md5_file_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "f", b"abc");
        assert_eq!(md5_file(&path).unwrap(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn sha256_file_matches_known_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "f", b"abc");
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn lzma_hashers_see_decompressed_content() {
        let dir = tempfile::tempdir().unwrap();
        let plain = b"the quick brown fox jumps over the lazy dog";
        let plain_path = write_file(&dir, "plain", plain);
        let lzma_path = write_lzma(&dir, "plain.lzma", plain);

        assert_eq!(
            sha256_lzma_file(&lzma_path).unwrap(),
            sha256_file(&plain_path).unwrap()
        );
        assert_eq!(
            crc32_lzma_file(&lzma_path).unwrap(),
            crc32_file(&plain_path).unwrap()
        );
        assert_eq!(lzma_plain_size(&lzma_path).unwrap(), plain.len() as u64);
    }

    #[test]
    fn lzma_hasher_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.lzma", b"this is not an lzma stream at all");
        assert!(sha256_lzma_file(&path).is_err());
    }
}
