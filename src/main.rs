// Vdbmirror -- Mirror antivirus update repositories.
// Copyright 2026 The Vdbmirror Authors.

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

use std::env;
use std::process;

use log::LevelFilter;

use vdbmirror::cli;
use vdbmirror::cli::Cmd;
use vdbmirror::config::Config;
use vdbmirror::sync;

fn init_logging(verbosity: u32) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() {
    let args = env::args().collect();
    let opts = match cli::parse(args) {
        Ok(Cmd::Sync(opts)) => opts,
        Ok(Cmd::Help) => {
            cli::print_usage();
            return;
        }
        Ok(Cmd::Version) => {
            cli::print_version();
            return;
        }
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };

    init_logging(opts.verbosity);

    let config = match Config::from_options(*opts) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    match sync::run(&config) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}
