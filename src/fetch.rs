// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Downloading with retries, and the download-and-verify gate.
//!
//! `download` wraps the transport's GET with the transient-retry policy.
//! `ensure_file` is the gate the engine funnels every manifest entry
//! through: make sure the local file matches the expected digest,
//! downloading it if necessary, and report which of the five outcomes
//! happened. The gate never loops; whole-pass restarts are the engine's
//! business.

use std::path::Path;
use std::thread;

use log::{info, warn};

use crate::cache::IntegrityIndex;
use crate::config::{Config, MAX_REPEAT};
use crate::digest::HashFn;
use crate::error::{Error, Result};
use crate::http;
use crate::http::Transport;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DownloadStatus {
    Downloaded,
    /// The server answered 404. Whether that is fatal depends on what was
    /// being fetched, so the caller decides.
    NotFound,
}

/// Outcome of the gate for one file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FileStatus {
    /// The local file already matches the expected digest.
    Exists,
    /// The file was downloaded and its recomputed digest matches.
    Downloaded,
    /// The server does not have the file.
    NotFound,
    /// The downloaded file does not match the expected digest; the engine
    /// should sleep and restart the pass.
    TryAgain,
}

/// GET a file, sleeping and retrying on transient failures.
///
/// Transient means: socket-level errors, or one of the retryable statuses
/// (408, 413, 500, 502, 503, 504). Anything else is mapped to an error
/// here: license statuses get their operator-facing message, the rest get
/// the standard reason phrase.
pub fn download(
    transport: &mut Transport,
    config: &Config,
    remote: &str,
    dest: &Path,
) -> Result<DownloadStatus> {
    let mut counter = 0;
    loop {
        let status = match transport.get(remote, dest) {
            Ok(status) => status,
            Err(e) if e.is_transient() && counter + 1 < MAX_REPEAT => {
                warn!("Download of {} failed: {}", remote, e);
                counter += 1;
                thread::sleep(config.repeat_sleep);
                continue;
            }
            Err(e) => return Err(e),
        };

        match status {
            200 | 203 => return Ok(DownloadStatus::Downloaded),
            404 => return Ok(DownloadStatus::NotFound),
            s if http::is_transient_status(s) && counter + 1 < MAX_REPEAT => {
                warn!("Server response {} {}, retrying", s, http::reason_phrase(s));
                counter += 1;
                thread::sleep(config.repeat_sleep);
            }
            s => {
                if let Some(msg) = http::license_message(s) {
                    return Err(Error::License(s, msg));
                }
                return Err(Error::Http(s, http::reason_phrase(s)));
            }
        }
    }
}

/// Ensure the file at `local` matches `expected`, downloading from `remote`
/// if necessary.
///
/// With fast mode active the integrity index is consulted first: when the
/// file exists and the previous manifest asserted the same digest for it,
/// the file is trusted without re-hashing ("LIKELY"). Otherwise the local
/// file is re-hashed, and only a mismatch or absence triggers a download.
/// The downloaded file is re-hashed unconditionally.
pub fn ensure_file(
    transport: &mut Transport,
    config: &Config,
    index: Option<&IntegrityIndex>,
    local: &Path,
    remote: &str,
    expected: &str,
    hash: HashFn,
    kind: &str,
) -> Result<FileStatus> {
    if let Some(index) = index {
        if local.exists() {
            if let Some(cached) = index.get(remote) {
                info!("{} exists, fast checking {}", remote, kind);
                if cached == expected {
                    info!("{} {} [LIKELY]", remote, kind);
                    return Ok(FileStatus::Exists);
                }
                info!("{} {} [NOT OK]", remote, kind);
            }
        }
    }

    if local.exists() {
        // A hashing failure here means the local file is unreadable or (for
        // the LZMA hashers) corrupt; either way the download below replaces
        // it.
        if let Ok(real) = hash(local) {
            info!("{} exists, checking {}", remote, kind);
            if real == expected {
                info!("{} {} [OK]", remote, kind);
                return Ok(FileStatus::Exists);
            }
            info!("{} {} [NOT OK]", remote, kind);
        }
    }

    match download(transport, config, remote, local)? {
        DownloadStatus::NotFound => return Ok(FileStatus::NotFound),
        DownloadStatus::Downloaded => {}
    }

    let real = hash(local)?;
    info!("{} downloaded, checking {}", remote, kind);
    if real == expected {
        info!("{} {} [OK]", remote, kind);
        Ok(FileStatus::Downloaded)
    } else {
        info!("{} {} [NOT OK]", remote, kind);
        warn!(
            "{} mismatch on {} (real=\"{}\", base=\"{}\")",
            kind, remote, real, expected
        );
        Ok(FileStatus::TryAgain)
    }
}
