// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Command-line argument parser.
//!
//! There do exist Rust libraries for this, but they bring along more than
//! this binary needs, and validation and interaction between flags still
//! involves a lot of probing the "parsed" flags afterwards. So rather than
//! using an external parser, this module provides a light abstraction
//! `ArgIter` to deal with the distinction between long and short flags and
//! arguments, and a handwritten parser/validator on top based mostly on
//! pattern matching.

use std::fmt;
use std::path::PathBuf;
use std::vec;

use crate::config::Protocol;

const USAGE: &str = "
Vdbmirror -- Mirror antivirus update repositories.

Usage:
  vdbmirror [options] --server <host> --proto <dialect> --remote-dir <path>
  vdbmirror -h | --help
  vdbmirror --version

Options:
  -s --server <host>       Update server to mirror from.
  -p --port <port>         Server TCP port. Defaults to 80.
  -P --proto <dialect>     Update protocol: 4, 5, 5.2, 7, or android.
  -d --remote-dir <path>   Remote directory to mirror; for android, the
                           remote path of the manifest file itself.
  -l --local-dir <path>    Local directory to mirror into. Defaults to the
                           current directory.
  -k --key-file <file>     License keyfile. Required except for android.
  -f --fast                Trust the previous run's manifest to skip
                           re-hashing unchanged files.
  -v --verbose             Log progress; pass twice for wire-level detail.
  -a --agent <string>      User-Agent header to send.
  --http-version <ver>     1.0 or 1.1. Defaults to 1.1.
  --http-auth <user:pass>  Basic credentials for the update server.
  --proxy <host[:port]>    Forward proxy. Port defaults to 3128.
  --proxy-auth <user:pass> Basic credentials for the proxy.
  --syshash <hex>          X-DrWeb-SysHash header to send.
  --tzshift <seconds>      Shift applied to server mtimes. Defaults to 0.
  -h --help                Show this screen.
  --version                Show version.
";

/// Everything the flags can express, before validation against each other.
#[derive(Debug, Eq, PartialEq)]
pub struct Options {
    pub server: String,
    pub port: u16,
    pub protocol: Protocol,
    pub remote_dir: String,
    pub local_dir: PathBuf,
    pub key_file: Option<PathBuf>,
    pub fast_mode: bool,
    pub verbosity: u32,
    pub http_version: String,
    pub http_auth: Option<String>,
    pub proxy: Option<String>,
    pub proxy_auth: Option<String>,
    pub user_agent: Option<String>,
    pub syshash: Option<String>,
    pub tzshift: i64,
}

impl Options {
    pub fn new() -> Options {
        Options {
            server: String::new(),
            port: 80,
            protocol: Protocol::V4,
            remote_dir: String::new(),
            local_dir: PathBuf::from("."),
            key_file: None,
            fast_mode: false,
            verbosity: 0,
            http_version: "1.1".to_string(),
            http_auth: None,
            proxy: None,
            proxy_auth: None,
            user_agent: None,
            syshash: None,
            tzshift: 0,
        }
    }
}

impl Default for Options {
    fn default() -> Options {
        Options::new()
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum Cmd {
    Sync(Box<Options>),
    Help,
    Version,
}

pub fn print_usage() {
    // Slice the usage string from 1, to cut off the initial newline.
    print!("{}", &USAGE[1..]);
}

pub fn print_version() {
    println!("vdbmirror {}", env!("CARGO_PKG_VERSION"));
}

enum Arg<T> {
    Plain(T),
    Short(T),
    Long(T),
}

impl Arg<String> {
    fn as_ref(&self) -> Arg<&str> {
        match *self {
            Arg::Plain(ref x) => Arg::Plain(&x[..]),
            Arg::Short(ref x) => Arg::Short(&x[..]),
            Arg::Long(ref x) => Arg::Long(&x[..]),
        }
    }
}

impl fmt::Display for Arg<String> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Arg::Plain(ref x) => write!(f, "{}", x),
            Arg::Short(ref x) => write!(f, "-{}", x),
            Arg::Long(ref x) => write!(f, "--{}", x),
        }
    }
}

struct ArgIter {
    /// Underlying args iterator.
    args: vec::IntoIter<String>,

    /// Whether we have observed a `--` argument.
    is_raw: bool,

    /// Leftover to return after an `--foo=bar` or `-fbar`-style argument.
    ///
    /// `--foo=bar` is returned as `Long(foo)` followed by `Plain(bar)`.
    /// `-fbar` is returned as `Short(f)` followed by `Plain(bar)`.
    leftover: Option<String>,
}

impl ArgIter {
    pub fn new(args: Vec<String>) -> ArgIter {
        ArgIter {
            args: args.into_iter(),
            is_raw: false,
            leftover: None,
        }
    }
}

impl Iterator for ArgIter {
    type Item = Arg<String>;

    fn next(&mut self) -> Option<Arg<String>> {
        if self.leftover.is_some() {
            return self.leftover.take().map(Arg::Plain);
        }

        let arg = self.args.next()?;

        if self.is_raw {
            return Some(Arg::Plain(arg));
        }

        if &arg == "--" {
            self.is_raw = true;
            return self.next();
        }

        if let Some(flag) = arg.strip_prefix("--") {
            let mut flag = String::from(flag);
            if let Some(i) = flag.find('=') {
                self.leftover = Some(flag.split_off(i + 1));
                flag.truncate(i);
            }
            return Some(Arg::Long(flag));
        }

        if arg.starts_with('-') && arg.len() > 1 {
            let mut flag = String::from(&arg[1..]);
            if flag.len() > 1 {
                self.leftover = Some(flag.split_off(1));
                flag.truncate(1);
            }
            return Some(Arg::Short(flag));
        }

        Some(Arg::Plain(arg))
    }
}

fn expect_plain(args: &mut ArgIter, msg: &'static str) -> Result<String, String> {
    match args.next() {
        Some(Arg::Plain(value)) => Ok(value),
        _ => Err(msg.to_string()),
    }
}

fn unexpected(arg: Arg<String>) -> Result<Cmd, String> {
    Err(format!("Unexpected argument '{}'. See --help.", arg))
}

pub fn parse(argv: Vec<String>) -> Result<Cmd, String> {
    let mut args = ArgIter::new(argv);

    // Skip executable name.
    args.next();

    let mut opts = Options::new();
    let mut server = None;
    let mut protocol = None;
    let mut remote_dir = None;

    while let Some(arg) = args.next() {
        match arg.as_ref() {
            Arg::Short("s") | Arg::Long("server") => {
                let msg = "Expected a host name after --server.";
                server = Some(expect_plain(&mut args, msg)?);
            }
            Arg::Short("p") | Arg::Long("port") => {
                let msg = "Expected a port number after --port.";
                let value = expect_plain(&mut args, msg)?;
                opts.port = value
                    .parse()
                    .map_err(|_| format!("Invalid port number '{}'.", value))?;
            }
            Arg::Short("P") | Arg::Long("proto") => {
                let msg = "Expected a dialect after --proto.";
                let value = expect_plain(&mut args, msg)?;
                protocol = match Protocol::from_flag(&value) {
                    Some(p) => Some(p),
                    None => {
                        let msg = format!(
                            "Unknown protocol '{}'. Expected 4, 5, 5.2, 7, or android.",
                            value
                        );
                        return Err(msg);
                    }
                };
            }
            Arg::Short("d") | Arg::Long("remote-dir") => {
                let msg = "Expected a path after --remote-dir.";
                remote_dir = Some(expect_plain(&mut args, msg)?);
            }
            Arg::Short("l") | Arg::Long("local-dir") => {
                let msg = "Expected a path after --local-dir.";
                opts.local_dir = PathBuf::from(expect_plain(&mut args, msg)?);
            }
            Arg::Short("k") | Arg::Long("key-file") => {
                let msg = "Expected a keyfile path after --key-file.";
                opts.key_file = Some(PathBuf::from(expect_plain(&mut args, msg)?));
            }
            Arg::Short("f") | Arg::Long("fast") => {
                opts.fast_mode = true;
            }
            Arg::Short("v") | Arg::Long("verbose") => {
                opts.verbosity += 1;
            }
            Arg::Short("a") | Arg::Long("agent") => {
                let msg = "Expected a string after --agent.";
                opts.user_agent = Some(expect_plain(&mut args, msg)?);
            }
            Arg::Long("http-version") => {
                let msg = "Expected 1.0 or 1.1 after --http-version.";
                let value = expect_plain(&mut args, msg)?;
                if value != "1.0" && value != "1.1" {
                    return Err(msg.to_string());
                }
                opts.http_version = value;
            }
            Arg::Long("http-auth") => {
                let msg = "Expected user:pass after --http-auth.";
                opts.http_auth = Some(expect_plain(&mut args, msg)?);
            }
            Arg::Long("proxy") => {
                let msg = "Expected host[:port] after --proxy.";
                opts.proxy = Some(expect_plain(&mut args, msg)?);
            }
            Arg::Long("proxy-auth") => {
                let msg = "Expected user:pass after --proxy-auth.";
                opts.proxy_auth = Some(expect_plain(&mut args, msg)?);
            }
            Arg::Long("syshash") => {
                let msg = "Expected a hex string after --syshash.";
                opts.syshash = Some(expect_plain(&mut args, msg)?);
            }
            Arg::Long("tzshift") => {
                let msg = "Expected a number of seconds after --tzshift.";
                let value = expect_plain(&mut args, msg)?;
                opts.tzshift = value
                    .parse()
                    .map_err(|_| format!("Invalid tzshift '{}'.", value))?;
            }
            Arg::Short("h") | Arg::Long("help") => return Ok(Cmd::Help),
            Arg::Long("version") => return Ok(Cmd::Version),
            _ => return unexpected(arg),
        }
    }

    let msg = "Server not provided. Pass it via --server.";
    opts.server = server.ok_or_else(|| msg.to_string())?;

    let msg = "Protocol not provided. Pass it via --proto.";
    opts.protocol = protocol.ok_or_else(|| msg.to_string())?;

    let msg = "Remote directory not provided. Pass it via --remote-dir.";
    opts.remote_dir = remote_dir.ok_or_else(|| msg.to_string())?;

    Ok(Cmd::Sync(Box::new(opts)))
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use super::{parse, Cmd};
    use crate::config::Protocol;

    fn args(list: &[&str]) -> Vec<String> {
        let mut argv = vec!["vdbmirror".to_string()];
        argv.extend(list.iter().map(|s| s.to_string()));
        argv
    }

    #[test]
    fn parse_accepts_a_minimal_invocation() {
        let cmd = parse(args(&[
            "--server", "update.drweb.com",
            "--proto", "4",
            "--remote-dir", "unix/500",
            "--key-file", "drweb32.key",
        ]))
        .unwrap();
        match cmd {
            Cmd::Sync(opts) => {
                assert_eq!(opts.server, "update.drweb.com");
                assert_eq!(opts.protocol, Protocol::V4);
                assert_eq!(opts.remote_dir, "unix/500");
                assert_eq!(opts.key_file, Some(PathBuf::from("drweb32.key")));
                assert_eq!(opts.port, 80);
                assert!(!opts.fast_mode);
            }
            _ => panic!("expected a sync command"),
        }
    }

    #[test]
    fn parse_accepts_equals_style_flags() {
        let cmd = parse(args(&[
            "--server=mirror.example.com",
            "--proto=android",
            "--remote-dir=android/drwebce.lst",
            "--port=8080",
            "-v", "-v",
            "--fast",
        ]))
        .unwrap();
        match cmd {
            Cmd::Sync(opts) => {
                assert_eq!(opts.port, 8080);
                assert_eq!(opts.protocol, Protocol::Android);
                assert_eq!(opts.verbosity, 2);
                assert!(opts.fast_mode);
            }
            _ => panic!("expected a sync command"),
        }
    }

    #[test]
    fn parse_requires_the_server_flag() {
        let result = parse(args(&["--proto", "4", "--remote-dir", "unix/500"]));
        assert!(result.unwrap_err().contains("--server"));
    }

    #[test]
    fn parse_rejects_unknown_protocols() {
        let result = parse(args(&[
            "--server", "a", "--proto", "9", "--remote-dir", "b",
        ]));
        assert!(result.unwrap_err().contains("Unknown protocol"));
    }

    #[test]
    fn parse_rejects_unknown_flags() {
        let result = parse(args(&["--frobnicate"]));
        assert!(result.unwrap_err().contains("Unexpected argument"));
    }

    #[test]
    fn parse_rejects_bad_http_version() {
        let result = parse(args(&[
            "--server", "a", "--proto", "4", "--remote-dir", "b",
            "--http-version", "2.0",
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse(args(&["--help"])).unwrap(), Cmd::Help);
        assert_eq!(parse(args(&["--version"])).unwrap(), Cmd::Version);
    }
}
