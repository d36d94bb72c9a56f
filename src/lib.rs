// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Vdbmirror synchronizes a local directory tree with a remote HTTP
//! repository publishing antivirus update bundles. The repository publishes
//! a manifest enumerating files, digests, sizes, and operations; the engine
//! in [`sync`] brings the local tree into conformance and guarantees every
//! mirrored file matches its manifest digest.

pub mod cache;
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod fsutil;
pub mod http;
pub mod keyfile;
pub mod manifest;
pub mod sync;
