#![allow(dead_code)]

#[macro_use]
extern crate clap;
extern crate num_cpus;
#[macro_use]
extern crate quick_error;

mod app;
mod builder;
mod classify;
mod config;
mod directive;
mod discovery;
mod errors;
mod logger;
mod pool;
mod process;
mod scheduler;
mod signal;

use std::path::PathBuf;

use config::Config;
use errors::Error;
use logger::Logger;
use pool::Pool;
use scheduler::{PendingTest, Scheduler};

/// The entry point and wrapper around `try_main`.
fn main() {
    env_logger::init();

    // Get clap::App instance.
    let app = app::get_app();
    // We clone `app` here because `get_matches` consumes it -- but we
    // might still need it when handling -h and --help.
    let args = app.clone().get_matches();
    // Handle -h (short help) and --help (long help).
    if args.is_present("short_help") {
        app::print_short_help(app);
        return;
    } else if args.is_present("long_help") {
        app::print_long_help(app);
        return;
    }

    let logger = Logger::new();
    match try_main(&args) {
        Ok(all_passed) => {
            if !all_passed {
                std::process::exit(1);
            }
        }
        Err(err) => {
            let err: failure::Error = err.into();
            logger.log_error_chain(&err);
            std::process::exit(1);
        }
    }
}

/// The actual main function.
///
/// Returns `Ok(true)` if every test passed (or `--build-only` was
/// given and every object file compiled cleanly).
fn try_main(args: &clap::ArgMatches) -> Result<bool, Error> {
    let config = Config::from_args(args);
    let roots: Vec<PathBuf> = args.values_of("input").expect("required by clap").map(PathBuf::from).collect();

    if config.build_only {
        return run_build_only(&config, &roots);
    }
    run_tests(&config, &roots)
}

fn run_build_only(config: &Config, roots: &[PathBuf]) -> Result<bool, Error> {
    let sources = discovery::discover_cpp_files(roots)?;
    std::fs::create_dir_all(&config.build_dir).map_err(|err| discovery::Error::Io(config.build_dir.clone(), err))?;
    let mut pool = Pool::new(config.jobs.max(1));
    let report = builder::build_objects(&sources, &mut pool, &config.cpp_compiler, &config.build_dir)?;
    for source in &report.failed {
        eprintln!("jakttest: error: failed to compile {}", source.display());
    }
    println!("{} compiled, {} failed", report.succeeded.len(), report.failed.len());
    Ok(report.failed.is_empty())
}

fn run_tests(config: &Config, roots: &[PathBuf]) -> Result<bool, Error> {
    let jakt_files = discovery::discover_jakt_files(roots)?;
    if jakt_files.is_empty() {
        return Err(Error::NoTestsFound);
    }

    let mut pending = Vec::with_capacity(jakt_files.len());
    let mut skipped_count = 0;
    let mut starting_failed_tests = 0;
    for path in &jakt_files {
        let parsed = match directive::parse(path) {
            Ok(parsed) => parsed,
            Err(err) => {
                // A file that fails to parse is counted as a failure,
                // not a reason to abort the whole run -- it is folded
                // into the scheduler's failed_count via
                // starting_failed_tests below.
                eprintln!("\x1b[K[ FAIL ] {}: {}", path.display(), err);
                starting_failed_tests += 1;
                continue;
            }
        };
        if parsed.skip {
            skipped_count += 1;
            continue;
        }
        pending.push(PendingTest {
            expected: parsed.expected,
            file_name: parsed.path,
            cpp_includes: parsed.cpp_includes,
        });
    }
    let total_test_count = pending.len() + starting_failed_tests;

    let num_workers = config.jobs.max(1);
    let directories = discovery::allocate_scratch_directories(&config.temp_dir, num_workers)?;

    let scheduler = Scheduler::new(
        directories.clone(),
        config.collect_reasons,
        starting_failed_tests,
        &config.build_dir,
        &config.cpp_compiler,
        &config.target_triple,
        &config.cpp_include,
        skipped_count,
    );
    let result = scheduler.run_tests(pending, total_test_count)?;
    discovery::cleanup_scratch_directories(&directories);

    let logger = Logger::new();
    logger.report_summary(result.passed_count, result.failed_count, result.skipped_count, &result.failed_reasons);

    Ok(result.failed_count == 0)
}
