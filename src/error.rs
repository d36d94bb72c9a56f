// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Errors that Vdbmirror can encounter.

use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::result;

#[derive(Debug)]
pub enum Error {
    /// Bad command line; the message explains which flag and why.
    Usage(String),

    /// The license keyfile could not be read or is missing a field.
    Keyfile(PathBuf, &'static str),

    /// An Android manifest entry carries an operation code we don't know.
    UnknownFileOperation(u64, String),

    /// The server answered with a status that is neither success, not-found,
    /// nor transient. The reason phrase is from the standard table.
    Http(u16, &'static str),

    /// A license-related server status (451, 452, 600) with its
    /// operator-facing message.
    License(u16, &'static str),

    /// A file the manifest requires does not exist on the server.
    NotFound(String),

    /// The redirect chain exceeded `MAX_REDIRECT`.
    RedirectLimit(String),

    /// A redirect status arrived without a usable `Location` header.
    BadRedirect(&'static str),

    /// The response head could not be parsed.
    BadResponse(&'static str),

    /// A `Transfer-Encoding` other than identity or chunked.
    UnsupportedEncoding(String),

    /// Socket-level failure: resolve, connect, send, or recv. Transient;
    /// the download wrapper sleeps and retries these.
    Connection(io::Error),

    /// Local filesystem failure with the path it happened on. Fatal.
    File(PathBuf, io::Error),

    /// An `.lzma` file could not be decoded.
    Lzma(PathBuf, lzma_rs::error::Error),

    /// Another instance holds the lock file in the target directory.
    Locked(PathBuf),

    /// Digest or size mismatches persisted through `MAX_REPEAT` restarts.
    TooManyRetries,
}

impl Error {
    /// Whether the download wrapper may sleep and try again.
    pub fn is_transient(&self) -> bool {
        matches!(*self, Error::Connection(..))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Usage(ref msg) => write!(f, "{}", msg),
            Error::Keyfile(ref path, msg) => {
                write!(f, "bad keyfile {}: {}", path.display(), msg)
            }
            Error::UnknownFileOperation(op, ref path) => {
                write!(f, "unknown file operation {:#010x} for file {}", op, path)
            }
            Error::Http(status, phrase) if phrase.is_empty() => {
                write!(f, "server response {}", status)
            }
            Error::Http(status, phrase) => {
                write!(f, "server response {} {}", status, phrase)
            }
            Error::License(_, msg) => write!(f, "{}", msg),
            Error::NotFound(ref path) => {
                write!(f, "file not found on server: {}", path)
            }
            Error::RedirectLimit(ref path) => {
                write!(f, "too many redirects while fetching {}", path)
            }
            Error::BadRedirect(msg) => write!(f, "{}", msg),
            Error::BadResponse(msg) => write!(f, "{}", msg),
            Error::UnsupportedEncoding(ref enc) => {
                write!(
                    f,
                    "unsupported Transfer-Encoding \"{}\"; \
                     consider --http-version=1.0 if the problem persists",
                    enc
                )
            }
            Error::Connection(ref err) => write!(f, "connection error: {}", err),
            Error::File(ref path, ref err) => {
                write!(f, "{}: {}", path.display(), err)
            }
            Error::Lzma(ref path, ref err) => {
                write!(f, "error decoding LZMA stream {}: {:?}", path.display(), err)
            }
            Error::Locked(ref path) => {
                write!(
                    f,
                    "lock file {} exists; another instance appears to be running",
                    path.display()
                )
            }
            Error::TooManyRetries => {
                write!(f, "digest or size mismatch persisted after all retries")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Connection(ref err) => Some(err),
            Error::File(_, ref err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
