// Copyright 2017 Nico Madysa.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! User-facing reporting, kept deliberately small.
//!
//! This is distinct from the `log`/`env_logger` diagnostics used
//! elsewhere in the crate: those are for developers debugging the test
//! runner itself and go to stderr gated by `RUST_LOG`. This logger is
//! for the final test report every user sees, and has no levels, no
//! timestamps, and no config file to read.

use std::io::{self, Write};

use failure::Error;

pub struct Logger<'a> {
    /// The name of the application.
    name: &'a str,
}

impl Logger<'static> {
    /// Creates a logger with the default name [`crate_name!`].
    ///
    /// [`crate_name!`]: ../../clap/macro.crate_name.html
    pub fn new() -> Self {
        Logger::with_name(crate_name!())
    }
}

impl<'a> Logger<'a> {
    /// Creates a logger with a custom name.
    pub fn with_name(name: &'a str) -> Self {
        Logger { name }
    }

    /// Acquire exclusive access to the output stream and write to it.
    pub fn with_lock<F>(&self, mut func: F)
    where
        F: FnMut(&mut io::StderrLock),
    {
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        func(&mut lock)
    }

    /// First logs an error, then all its causes.
    pub fn log_error_chain(&self, error: &Error) {
        self.with_lock(|lock| {
            let mut error = error.as_fail();
            writeln!(lock, "{}: error: {}", self.name, error).unwrap();
            while let Some(cause) = error.cause() {
                writeln!(lock, "{}:   -> reason: {}", self.name, cause).unwrap();
                error = cause;
            }
        })
    }

    /// Prints the final pass/fail/skip summary and, unless suppressed,
    /// each failure's reason.
    pub fn report_summary(
        &self,
        passed: usize,
        failed: usize,
        skipped: usize,
        reasons: &Option<std::collections::HashMap<std::path::PathBuf, crate::classify::FailureReason>>,
    ) {
        if let Some(reasons) = reasons {
            let mut entries: Vec<_> = reasons.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (path, reason) in entries {
                println!("[ FAIL ] {}: {}", path.display(), reason);
            }
        }
        println!("{} passed, {} failed, {} skipped, {} total", passed, failed, skipped, passed + failed + skipped);
    }
}
