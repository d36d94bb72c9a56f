// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The blocking HTTP transport.
//!
//! A `Transport` issues one GET at a time over a single connection and
//! streams the response body straight into a destination file through a
//! bounded buffer. It speaks HTTP/1.0 and 1.1, identity and chunked
//! transfer coding, follows redirects, and keeps the connection alive
//! across calls when the server agrees. The persistent socket lives inside
//! the `Transport` together with the origin it is connected to; there is no
//! ambient connection state.

use std::fmt::Write as FmtWrite;
use std::fs;
use std::io;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};

use crate::config::{Config, MAX_REDIRECT, NETBUFSIZE};
use crate::error::{Error, Result};
use crate::fsutil;

/// Statuses the download wrapper retries after a pause.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 413 | 500 | 502 | 503 | 504)
}

/// Operator-facing messages for the license-related statuses.
pub fn license_message(status: u16) -> Option<&'static str> {
    match status {
        451 => Some("License key file has not been found in the database."),
        452 => Some("License key file is blocked or incorrect UserID/MD5."),
        600 => Some("License key file is key from an unregistered version."),
        _ => None,
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}

/// The response-head fields the client acts on.
#[derive(Debug, Default)]
struct Head {
    keep_alive: bool,
    content_length: Option<u64>,
    last_modified: Option<SystemTime>,
    chunked: bool,
    location: Option<String>,
}

struct CachedConn {
    stream: TcpStream,
    host: String,
    port: u16,
}

pub struct Transport<'a> {
    config: &'a Config,
    cached: Option<CachedConn>,
}

impl<'a> Transport<'a> {
    pub fn new(config: &'a Config) -> Transport<'a> {
        Transport { config, cached: None }
    }

    /// GET a remote path into `dest` and return the HTTP status.
    ///
    /// On 200 or 203 the body has been written to `dest`, the server's
    /// `Last-Modified` applied as mtime (shifted by `tzshift`), and the
    /// mirrored-file permissions set. Any other status leaves `dest`
    /// untouched. Socket-level failures come back as `Error::Connection`,
    /// which the download wrapper treats as transient.
    pub fn get(&mut self, remote_path: &str, dest: &Path) -> Result<u16> {
        info!("Downloading {}", remote_path);

        let mut host = self.config.server.clone();
        let mut port = self.config.port;
        let mut path = remote_path.to_string();
        let mut redirects = 0;
        let mut carried: Option<TcpStream> = None;

        loop {
            let (peer_host, peer_port) = match self.config.proxy {
                Some(ref proxy) => (proxy.host.clone(), proxy.port),
                None => (host.clone(), port),
            };

            let stream = match carried.take() {
                Some(s) => s,
                None => match self.take_cached(&peer_host, peer_port) {
                    Some(s) => s,
                    None => connect(&peer_host, peer_port, self.config.connect_timeout)?,
                },
            };

            let request = self.build_request(&host, port, &path);
            debug!("Request head:\n{}", request.trim_end());

            let mut stream = stream;
            stream
                .write_all(request.as_bytes())
                .map_err(Error::Connection)?;

            let mut reader = BufReader::with_capacity(NETBUFSIZE, stream);
            let (status, head) = read_head(&mut reader)?;

            if matches!(status, 300..=303 | 307) {
                redirects += 1;
                if redirects >= MAX_REDIRECT {
                    return Err(Error::RedirectLimit(remote_path.to_string()));
                }
                let location = match head.location {
                    Some(ref loc) => loc,
                    None => {
                        let msg = "redirect response without a Location header";
                        return Err(Error::BadRedirect(msg));
                    }
                };
                let (new_host, new_port, new_path) = match parse_location(location) {
                    Some(parts) => parts,
                    None => {
                        let msg = "redirect Location is not an absolute http URL";
                        return Err(Error::BadRedirect(msg));
                    }
                };
                info!(
                    "Redirected ({}) to http://{}:{}/{}",
                    status, new_host, new_port, new_path
                );

                // The redirect body is uninteresting but must leave the
                // socket if we intend to keep using it.
                let clean = drain_body(&mut reader, &head)?;

                let same_peer = match self.config.proxy {
                    Some(..) => true,
                    None => new_host == host && new_port == port,
                };
                host = new_host;
                port = new_port;
                path = new_path;
                if same_peer && clean {
                    carried = Some(reader.into_inner());
                }
                continue;
            }

            if status == 200 || status == 203 {
                let framed = write_body(&mut reader, &head, dest)?;
                if head.keep_alive && framed {
                    self.cached = Some(CachedConn {
                        stream: reader.into_inner(),
                        host: peer_host,
                        port: peer_port,
                    });
                }
                if let Some(last_modified) = head.last_modified {
                    let mtime = shift_mtime(last_modified, self.config.tzshift);
                    fsutil::set_mtime(dest, mtime)?;
                }
                fsutil::set_file_mode(dest)?;
                return Ok(status);
            }

            // Errors and other statuses: keep the socket only if the body
            // could be fully consumed, then surface the status to the caller.
            let clean = drain_body(&mut reader, &head)?;
            if head.keep_alive && clean {
                self.cached = Some(CachedConn {
                    stream: reader.into_inner(),
                    host: peer_host,
                    port: peer_port,
                });
            }
            return Ok(status);
        }
    }

    /// Drop the persistent connection, if any.
    pub fn close(&mut self) {
        self.cached = None;
    }

    /// Take the cached socket if it is connected to the given origin. A
    /// non-matching cached socket is left in place; it may still be the
    /// right one after a redirect.
    fn take_cached(&mut self, host: &str, port: u16) -> Option<TcpStream> {
        let matches = match self.cached {
            Some(ref conn) => conn.host == host && conn.port == port,
            None => false,
        };
        if matches {
            self.cached.take().map(|conn| conn.stream)
        } else {
            None
        }
    }

    fn build_request(&self, host: &str, port: u16, path: &str) -> String {
        let config = self.config;
        let mut req = String::with_capacity(512);

        if let Some(ref proxy) = config.proxy {
            let _ = write!(
                req,
                "GET http://{}:{}/{} HTTP/{}\r\nProxy-Connection: Keep-Alive\r\n",
                host, port, path, config.http_version
            );
            if let Some(ref auth) = proxy.auth {
                let _ = write!(req, "Proxy-Authorization: Basic {}\r\n", auth);
            }
        } else {
            let _ = write!(req, "GET /{} HTTP/{}\r\n", path, config.http_version);
        }

        let _ = write!(
            req,
            "Accept: */*\r\n\
             Accept-Encoding: identity\r\n\
             Accept-Ranges: bytes\r\n\
             Host: {}:{}\r\n",
            host, port
        );
        if let Some(ref auth) = config.auth {
            let _ = write!(req, "Authorization: Basic {}\r\n", auth);
        }
        if !config.is_android() {
            let _ = write!(
                req,
                "X-DrWeb-Validate: {}\r\nX-DrWeb-KeyNumber: {}\r\n",
                config.key_md5, config.user_id
            );
        }
        if let Some(ref syshash) = config.syshash {
            let _ = write!(req, "X-DrWeb-SysHash: {}\r\n", syshash);
        }
        if let Some(ref agent) = config.user_agent {
            let _ = write!(req, "User-Agent: {}\r\n", agent);
        }
        req.push_str("Connection: Keep-Alive\r\nCache-Control: no-cache\r\n\r\n");

        req
    }
}

fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(Error::Connection)?;
    let addr = match addrs.next() {
        Some(a) => a,
        None => {
            let err = io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}", host),
            );
            return Err(Error::Connection(err));
        }
    };

    debug!("Connecting to {} ({}:{})", addr, host, port);
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(Error::Connection)?;
    stream.set_read_timeout(Some(timeout)).map_err(Error::Connection)?;
    stream.set_write_timeout(Some(timeout)).map_err(Error::Connection)?;
    Ok(stream)
}

/// Read one CRLF-terminated line; `None` means the peer closed the stream.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).map_err(Error::Connection)?;
    if n == 0 {
        return Ok(None);
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn read_head<R: BufRead>(reader: &mut R) -> Result<(u16, Head)> {
    let status_line = match read_line(reader)? {
        Some(line) => line,
        None => {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the status line",
            );
            return Err(Error::Connection(err));
        }
    };

    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(Error::BadResponse("can't parse the response status line"))?;

    let mut head = Head::default();
    loop {
        let line = match read_line(reader)? {
            Some(line) => line,
            None => break,
        };
        if line.is_empty() {
            break;
        }
        parse_header_line(&line, &mut head)?;
    }

    Ok((status, head))
}

fn parse_header_line(line: &str, head: &mut Head) -> Result<()> {
    let (name, value) = match line.split_once(':') {
        Some(parts) => parts,
        None => return Ok(()),
    };
    let value = value.trim();

    if name.eq_ignore_ascii_case("Connection") {
        head.keep_alive = value.eq_ignore_ascii_case("keep-alive");
    } else if name.eq_ignore_ascii_case("Content-Length") {
        head.content_length = value.parse::<u64>().ok();
    } else if name.eq_ignore_ascii_case("Last-Modified") {
        head.last_modified = parse_last_modified(value);
    } else if name.eq_ignore_ascii_case("Transfer-Encoding") {
        if value.eq_ignore_ascii_case("chunked") {
            head.chunked = true;
        } else if value.eq_ignore_ascii_case("identity") {
            head.chunked = false;
        } else {
            return Err(Error::UnsupportedEncoding(value.to_string()));
        }
    } else if name.eq_ignore_ascii_case("Location") {
        head.location = Some(value.to_string());
    }

    Ok(())
}

/// Parse a `Last-Modified` value in any of the three formats HTTP allows
/// (RFC 1123, RFC 850, asctime). An unparsable value is ignored with a
/// warning; the file then keeps its download time.
fn parse_last_modified(value: &str) -> Option<SystemTime> {
    match httpdate::parse_http_date(value) {
        Ok(t) => Some(t),
        Err(..) => {
            warn!("Can't parse Last-Modified: {}", value);
            None
        }
    }
}

fn shift_mtime(mtime: SystemTime, tzshift: i64) -> SystemTime {
    if tzshift >= 0 {
        mtime + Duration::from_secs(tzshift as u64)
    } else {
        mtime - Duration::from_secs(tzshift.unsigned_abs())
    }
}

/// Parse `scheme://host[:port]/path` from a Location header. The returned
/// path carries no leading slash; an absent port means 80.
pub fn parse_location(location: &str) -> Option<(String, u16, String)> {
    let rest = location.split_once("://")?.1;
    let (host_port, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };
    let (host, port) = match host_port.rsplit_once(':') {
        Some((h, p)) => (h, p.parse::<u16>().ok()?),
        None => (host_port, 80),
    };
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port, path.to_string()))
}

enum BodyError {
    Read(io::Error),
    Write(io::Error),
    BadChunk,
}

/// Stream the response body into `out`. Returns whether the body was framed
/// (chunked or an explicit Content-Length): an EOF-delimited body consumes
/// the connection, so it must not be reused afterwards.
fn copy_body<R: BufRead>(
    reader: &mut R,
    head: &Head,
    out: &mut dyn Write,
) -> std::result::Result<bool, BodyError> {
    if head.chunked {
        loop {
            let size_line = match read_body_line(reader)? {
                Some(line) => line,
                None => return Err(BodyError::BadChunk),
            };
            let size_hex = size_line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_hex, 16).map_err(|_| BodyError::BadChunk)?;
            if size == 0 {
                // Consume optional trailers up to the blank line.
                loop {
                    match read_body_line(reader)? {
                        Some(ref line) if !line.is_empty() => continue,
                        _ => break,
                    }
                }
                return Ok(true);
            }
            copy_exact(reader, out, size as u64)?;
            match read_body_line(reader)? {
                Some(ref line) if line.is_empty() => {}
                _ => return Err(BodyError::BadChunk),
            }
        }
    }

    match head.content_length {
        Some(len) => {
            copy_exact(reader, out, len)?;
            Ok(true)
        }
        None => {
            copy_to_eof(reader, out)?;
            Ok(false)
        }
    }
}

fn read_body_line<R: BufRead>(reader: &mut R) -> std::result::Result<Option<String>, BodyError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).map_err(BodyError::Read)?;
    if n == 0 {
        return Ok(None);
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn copy_exact<R: Read>(
    reader: &mut R,
    out: &mut dyn Write,
    mut remaining: u64,
) -> std::result::Result<(), BodyError> {
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).map_err(BodyError::Read)?;
        if n == 0 {
            let err = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed in the middle of the body",
            );
            return Err(BodyError::Read(err));
        }
        out.write_all(&buf[..n]).map_err(BodyError::Write)?;
        remaining -= n as u64;
    }
    Ok(())
}

fn copy_to_eof<R: Read>(reader: &mut R, out: &mut dyn Write) -> std::result::Result<(), BodyError> {
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).map_err(BodyError::Read)?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&buf[..n]).map_err(BodyError::Write)?;
    }
}

/// Write the body into `dest`, creating or truncating it.
fn write_body<R: BufRead>(reader: &mut R, head: &Head, dest: &Path) -> Result<bool> {
    let f = fs::File::create(dest).map_err(|e| Error::File(dest.to_path_buf(), e))?;
    let mut writer = BufWriter::new(f);
    let framed = copy_body(reader, head, &mut writer).map_err(|e| match e {
        BodyError::Read(err) => Error::Connection(err),
        BodyError::Write(err) => Error::File(dest.to_path_buf(), err),
        BodyError::BadChunk => Error::BadResponse("malformed chunked transfer coding"),
    })?;
    writer
        .flush()
        .map_err(|e| Error::File(dest.to_path_buf(), e))?;
    Ok(framed)
}

/// Consume a body we don't care about. Returns whether the socket is clean
/// enough to reuse.
fn drain_body<R: BufRead>(reader: &mut R, head: &Head) -> Result<bool> {
    if !head.chunked && head.content_length.is_none() {
        // No framing: reading to EOF could block on a kept-alive connection
        // that simply has no body, so give the socket up instead.
        return Ok(false);
    }
    copy_body(reader, head, &mut io::sink()).map_err(|e| match e {
        BodyError::Read(err) | BodyError::Write(err) => Error::Connection(err),
        BodyError::BadChunk => Error::BadResponse("malformed chunked transfer coding"),
    })
}
