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

//! Contains all calls to `clap` so it doesn't clutter `main()`.

use clap::{self, App, AppSettings, Arg};

/// Returns an [`App`] instance.
///
/// [`App`]: ../../clap/struct.App.html
pub fn get_app() -> clap::App<'static, 'static> {
    App::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!())
        .about(crate_description!())
        .usage("jakttest [FLAGS] [OPTIONS] <PATHS>...")
        .setting(AppSettings::DeriveDisplayOrder)
        // General args.
        // We create our own --help so that the arguments are correctly
        // ordered.
        .arg(Arg::with_name("long_help").long("help").help("Print detailed help information."))
        .arg(Arg::with_name("short_help").short("h").help("Print short help information."))
        // Main options.
        .arg(
            Arg::with_name("jobs")
                .short("j")
                .long("jobs")
                .takes_value(true)
                .min_values(0)
                .max_values(1)
                .value_name("N")
                .validator(|v| v.parse::<usize>().map(|_| ()).map_err(|err| err.to_string()))
                .help("The number of tests to run in parallel.")
                .long_help(
                    "The number of tests to run in parallel. If no number is \
                     passed, the detected number of CPUs on this machine is \
                     used. If the flag is omitted entirely, tests run one at \
                     a time.",
                ),
        )
        .arg(
            Arg::with_name("build_dir")
                .short("b")
                .long("build-dir")
                .takes_value(true)
                .value_name("PATH")
                .help("Directory containing the built jakt compiler and runtime library.")
                .long_help(
                    "Directory containing the built jakt compiler and \
                     runtime library, passed through to the driver as \
                     --jakt-binary and --jakt-lib-dir. [default: build]",
                ),
        )
        .arg(
            Arg::with_name("temp_dir")
                .long("temp-dir")
                .takes_value(true)
                .value_name("PATH")
                .help("Directory to create scratch directories in. [default: system temp dir]"),
        )
        .arg(
            Arg::with_name("cpp_compiler")
                .short("C")
                .long("cpp-compiler")
                .takes_value(true)
                .value_name("PATH")
                .help("The C++ compiler the driver should use. [default: clang++]"),
        )
        .arg(
            Arg::with_name("target_triple")
                .long("target-triple")
                .takes_value(true)
                .value_name("TRIPLE")
                .help("The target triple passed to the driver."),
        )
        .arg(
            Arg::with_name("cpp_include")
                .long("cpp-include")
                .takes_value(true)
                .value_name("STRING")
                .help("An extra #include line to pass to every test's driver invocation."),
        )
        .arg(
            Arg::with_name("hide_reasons")
                .long("hide-reasons")
                .help("Don't collect or print failure reasons, only pass/fail counts."),
        )
        .arg(
            Arg::with_name("build_only")
                .long("build-only")
                .help("Only compile the given C++ sources to object files, skipping test execution."),
        )
        // Input control.
        .arg(
            Arg::with_name("input")
                .takes_value(true)
                .multiple(true)
                .required(true)
                .value_name("PATHS")
                .help("The .jakt files or directories to test.")
                .long_help(
                    "The .jakt files or directories to test. Directories are \
                     walked recursively for files ending in .jakt.",
                ),
        )
}

/// Prints the information given by the `-h` argument.
pub fn print_short_help(app: clap::App) {
    app.after_help("").print_help().unwrap();
    println!();
}

/// Prints the information given by the `--help` argument.
pub fn print_long_help(app: clap::App) {
    app.after_help(LONG_EXPLANATION).print_long_help().unwrap();
    print!("\n\n");
}

#[cfg_attr(rustfmt, rustfmt_skip)]
static LONG_EXPLANATION: &str = "\
This program takes one or more .jakt files or directories and runs each \
through the external driver, which transpiles it to C++, compiles the \
result, and runs the produced binary. Each file's outcome is compared \
against the \"Expect:\" directive found in a comment near the top of the \
file.

If you pass a directory, it is walked recursively and every file ending \
in .jakt is treated as a test.

Tests run with bounded concurrency controlled by --jobs; by default they \
run one at a time. Each concurrent worker gets its own scratch directory \
so drivers never collide on output files.
";

#[cfg(test)]
mod tests {
    use super::get_app;
    use clap::{AppSettings, ArgMatches, Result as ClapResult};

    fn get_matches(args: &[&str]) -> ClapResult<ArgMatches<'static>> {
        get_app().setting(AppSettings::NoBinaryName).get_matches_from_safe(args)
    }

    #[test]
    fn input_is_required() {
        assert!(get_matches(&[]).is_err());
        let matches = get_matches(&["a.jakt", "b.jakt"]).unwrap();
        assert_eq!(matches.values_of("input").unwrap().collect::<Vec<_>>(), &["a.jakt", "b.jakt"]);
    }

    #[test]
    fn jobs_no_arg_required() {
        let matches = get_matches(&["-j", "a.jakt"]).unwrap();
        assert!(matches.is_present("jobs"));
        assert!(matches.value_of("jobs").is_none());
    }

    #[test]
    fn jobs_with_explicit_count() {
        let matches = get_matches(&["-j", "4", "a.jakt"]).unwrap();
        assert_eq!(matches.value_of("jobs"), Some("4"));
    }

    #[test]
    fn jobs_rejects_non_numeric_value() {
        assert!(get_matches(&["-j", "nope", "a.jakt"]).is_err());
    }

    #[test]
    fn build_only_is_a_bare_flag() {
        let matches = get_matches(&["--build-only", "a.jakt"]).unwrap();
        assert!(matches.is_present("build_only"));
    }

    #[test]
    fn hide_reasons_is_a_bare_flag() {
        let matches = get_matches(&["--hide-reasons", "a.jakt"]).unwrap();
        assert!(matches.is_present("hide_reasons"));
    }
}
