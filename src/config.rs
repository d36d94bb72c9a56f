// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The immutable configuration value threaded through engine and transport.

use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::cli::Options;
use crate::error::{Error, Result};
use crate::keyfile;

/// Global number of restarts a sync pass may consume before giving up.
pub const MAX_REPEAT: u32 = 3;

/// Pause between restarts and between transient-download retries.
pub const REPEAT_SLEEP: Duration = Duration::from_secs(5);

/// Connect, send, and receive timeout.
pub const TIMEOUT: Duration = Duration::from_secs(15);

/// Longest redirect chain the transport will follow.
pub const MAX_REDIRECT: usize = 10;

/// Size of the bounded buffer that response bodies stream through.
pub const NETBUFSIZE: usize = 32 * 1024;

/// Permissions applied to mirrored files.
pub const MODE_FILE: u32 = 0o644;

/// Permissions applied to created directories.
pub const MODE_DIR: u32 = 0o755;

/// The manifest dialect spoken by the remote repository.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Protocol {
    /// Flat `drweb32.lst`, CRC32 digests.
    V4,
    /// Flat `version.lst`, SHA-256 digests, optional sizes.
    V5,
    /// Flat `version2.lst`, as v5 plus optional LZMA digest and size.
    V52,
    /// `versions.xml` referencing child `*.xml` manifests, SHA-256.
    V7,
    /// INI-style `[Files]` manifest for mobile devices, MD5.
    Android,
}

#[derive(Clone, Debug)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    /// Pre-encoded Basic credentials, without the "Basic " prefix.
    pub auth: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server: String,
    pub port: u16,
    /// "1.0" or "1.1", used verbatim in the request line.
    pub http_version: String,
    /// Pre-encoded Basic credentials, without the "Basic " prefix.
    pub auth: Option<String>,
    pub proxy: Option<Proxy>,
    pub protocol: Protocol,
    /// Remote directory to mirror; for Android, the remote path of the
    /// manifest file itself.
    pub remote_dir: String,
    /// Local directory the remote layout is mirrored under.
    pub local_root: PathBuf,
    /// UserID from the license keyfile. Empty in Android mode.
    pub user_id: String,
    /// MD5 of the license keyfile bytes. Empty in Android mode.
    pub key_md5: String,
    pub syshash: Option<String>,
    pub user_agent: Option<String>,
    pub fast_mode: bool,
    /// Seconds added to the server's Last-Modified before it becomes the
    /// local mtime.
    pub tzshift: i64,
    pub connect_timeout: Duration,
    pub repeat_sleep: Duration,
}

fn encode_basic(credentials: &str) -> String {
    BASE64.encode(credentials.as_bytes())
}

impl Config {
    /// Validate parsed command-line options and read the keyfile.
    pub fn from_options(opts: Options) -> Result<Config> {
        let (user_id, key_md5) = match (opts.protocol, &opts.key_file) {
            (Protocol::Android, _) => (String::new(), String::new()),
            (_, Some(path)) => keyfile::read(path)?,
            (_, None) => {
                let msg = "A license keyfile is required. Pass it via --key-file.";
                return Err(Error::Usage(msg.to_string()));
            }
        };

        let proxy = match opts.proxy {
            Some(ref addr) => {
                let (host, port) = match addr.rsplit_once(':') {
                    Some((h, p)) => {
                        let port = p.parse::<u16>().map_err(|_| {
                            Error::Usage(format!("Invalid proxy port in '{}'.", addr))
                        })?;
                        (h.to_string(), port)
                    }
                    None => (addr.clone(), 3128),
                };
                Some(Proxy {
                    host,
                    port,
                    auth: opts.proxy_auth.as_deref().map(encode_basic),
                })
            }
            None => None,
        };

        Ok(Config {
            server: opts.server,
            port: opts.port,
            http_version: opts.http_version,
            auth: opts.http_auth.as_deref().map(encode_basic),
            proxy,
            protocol: opts.protocol,
            remote_dir: opts.remote_dir.trim_matches('/').to_string(),
            local_root: opts.local_dir,
            user_id,
            key_md5,
            syshash: opts.syshash,
            user_agent: opts.user_agent,
            fast_mode: opts.fast_mode,
            tzshift: opts.tzshift,
            connect_timeout: TIMEOUT,
            repeat_sleep: REPEAT_SLEEP,
        })
    }

    pub fn is_android(&self) -> bool {
        self.protocol == Protocol::Android
    }

    /// Where a remote path lands in the local mirror.
    pub fn local_path(&self, remote: &str) -> PathBuf {
        self.local_root.join(remote)
    }

    /// The local directory corresponding to a remote directory, which may be
    /// empty for Android manifests living at the repository root.
    pub fn local_dir(&self, remote_dir: &str) -> PathBuf {
        if remote_dir.is_empty() {
            self.local_root.clone()
        } else {
            self.local_root.join(remote_dir)
        }
    }
}

impl Protocol {
    pub fn from_flag(value: &str) -> Option<Protocol> {
        match value {
            "4" => Some(Protocol::V4),
            "5" => Some(Protocol::V5),
            "5.2" => Some(Protocol::V52),
            "7" => Some(Protocol::V7),
            "android" => Some(Protocol::Android),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Config, Protocol};
    use crate::cli::Options;

    fn base_options() -> Options {
        let mut opts = Options::new();
        opts.server = "update.example.com".to_string();
        opts.protocol = Protocol::Android;
        opts.remote_dir = "android/drwebce.lst".to_string();
        opts
    }

    #[test]
    fn from_options_encodes_basic_auth() {
        let mut opts = base_options();
        opts.http_auth = Some("user:pass".to_string());
        let config = Config::from_options(opts).unwrap();
        assert_eq!(config.auth.as_deref(), Some("dXNlcjpwYXNz"));
    }

    #[test]
    fn from_options_splits_proxy_host_and_port() {
        let mut opts = base_options();
        opts.proxy = Some("proxy.example.com:8080".to_string());
        let config = Config::from_options(opts).unwrap();
        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.host, "proxy.example.com");
        assert_eq!(proxy.port, 8080);
    }

    #[test]
    fn from_options_requires_keyfile_outside_android() {
        let mut opts = base_options();
        opts.protocol = Protocol::V4;
        opts.remote_dir = "unix/500".to_string();
        assert!(Config::from_options(opts).is_err());
    }

    #[test]
    fn protocol_from_flag_knows_all_dialects() {
        assert_eq!(Protocol::from_flag("4"), Some(Protocol::V4));
        assert_eq!(Protocol::from_flag("5"), Some(Protocol::V5));
        assert_eq!(Protocol::from_flag("5.2"), Some(Protocol::V52));
        assert_eq!(Protocol::from_flag("7"), Some(Protocol::V7));
        assert_eq!(Protocol::from_flag("android"), Some(Protocol::Android));
        assert_eq!(Protocol::from_flag("6"), None);
    }
}
