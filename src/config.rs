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

//! Resolves parsed command-line arguments into the values the
//! scheduler and build orchestrator need. There is no config file --
//! everything here comes from flags and built-in defaults.

use std::env;
use std::path::PathBuf;

use clap::ArgMatches;

const DEFAULT_CPP_COMPILER: &str = "clang++";
const DEFAULT_TARGET_TRIPLE: &str = "x86_64-unknown-linux-gnu";

#[derive(Debug, Clone)]
pub struct Config {
    pub build_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub cpp_compiler: String,
    pub cpp_include: String,
    pub target_triple: String,
    pub jobs: usize,
    pub collect_reasons: bool,
    pub build_only: bool,
}

impl Config {
    pub fn from_args(args: &ArgMatches) -> Self {
        Config {
            build_dir: args.value_of("build_dir").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("build")),
            temp_dir: args.value_of("temp_dir").map(PathBuf::from).unwrap_or_else(env::temp_dir),
            cpp_compiler: args.value_of("cpp_compiler").unwrap_or(DEFAULT_CPP_COMPILER).to_string(),
            cpp_include: args.value_of("cpp_include").unwrap_or("").to_string(),
            target_triple: args.value_of("target_triple").unwrap_or(DEFAULT_TARGET_TRIPLE).to_string(),
            jobs: jobs_from_args(args),
            collect_reasons: !args.is_present("hide_reasons"),
            build_only: args.is_present("build_only"),
        }
    }
}

/// Interprets `-j`/`--jobs`: omitted means `1`, present with no value
/// means the detected core count, an explicit value means exactly
/// that many.
fn jobs_from_args(args: &ArgMatches) -> usize {
    if let Some(n) = args.value_of("jobs") {
        // clap validates this is a valid usize for us.
        n.parse().expect("--jobs validated by clap")
    } else if args.is_present("jobs") {
        num_cpus::get()
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app;

    fn parse<'a>(app: clap::App<'a, 'a>, argv: &[&str]) -> ArgMatches<'a> {
        app.get_matches_from(argv)
    }

    #[test]
    fn defaults_to_serial_execution() {
        let args = parse(app::get_app(), &["jakttest", "tests/"]);
        assert_eq!(Config::from_args(&args).jobs, 1);
    }

    #[test]
    fn bare_jobs_flag_uses_core_count() {
        let args = parse(app::get_app(), &["jakttest", "-j", "tests/"]);
        assert_eq!(Config::from_args(&args).jobs, num_cpus::get());
    }

    #[test]
    fn explicit_jobs_count_is_honored() {
        let args = parse(app::get_app(), &["jakttest", "-j", "4", "tests/"]);
        assert_eq!(Config::from_args(&args).jobs, 4);
    }

    #[test]
    fn hide_reasons_disables_collection() {
        let args = parse(app::get_app(), &["jakttest", "--hide-reasons", "tests/"]);
        assert!(!Config::from_args(&args).collect_reasons);
    }
}
