// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! License keyfile reader.
//!
//! The keyfile is an INI-style text file. Only two things are consumed from
//! it: the value of the `Number` field inside the `[User]` section, which
//! becomes the UserID sent in `X-DrWeb-KeyNumber`, and the MD5 digest of the
//! raw keyfile bytes, which becomes the `X-DrWeb-Validate` token.

use std::fs;
use std::io;
use std::io::BufRead;
use std::path::Path;

use crate::digest;
use crate::error::{Error, Result};

/// Extract `(user_id, keyfile_md5)` from a keyfile.
pub fn read(path: &Path) -> Result<(String, String)> {
    let f = fs::File::open(path).map_err(|e| Error::File(path.to_path_buf(), e))?;
    let reader = io::BufReader::new(f);

    let mut in_user = false;
    let mut user_id = None;
    for line in reader.lines() {
        let line = line.map_err(|e| Error::File(path.to_path_buf(), e))?;
        let line = line.trim_end_matches('\r');
        if !in_user {
            if line == "[User]" {
                in_user = true;
            }
            continue;
        }
        if line.contains("Number") {
            match line.split_once('=') {
                Some((_, value)) => {
                    user_id = Some(value.trim().to_string());
                    break;
                }
                None => {
                    let msg = "'Number' line has no '=' separator";
                    return Err(Error::Keyfile(path.to_path_buf(), msg));
                }
            }
        }
    }

    let user_id = match user_id {
        Some(id) if !id.is_empty() => id,
        Some(..) => {
            let msg = "'Number' field in [User] section is empty";
            return Err(Error::Keyfile(path.to_path_buf(), msg));
        }
        None if in_user => {
            let msg = "no 'Number' field in [User] section";
            return Err(Error::Keyfile(path.to_path_buf(), msg));
        }
        None => {
            let msg = "no [User] section";
            return Err(Error::Keyfile(path.to_path_buf(), msg));
        }
    };

    let md5 = digest::md5_file(path)?;
    Ok((user_id, md5))
}
