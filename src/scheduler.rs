use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::classify::{self, FailureReason, Outcome, ReadStageOutput};
use crate::directive::ExpectedResult;
use crate::discovery;
use crate::process::{self, ProcessHandle};
use crate::signal;

/// A test still waiting to be dispatched; it has not yet been assigned
/// a scratch directory.
#[derive(Debug, Clone)]
pub struct PendingTest {
    pub expected: ExpectedResult,
    pub file_name: PathBuf,
    pub cpp_includes: String,
}

/// A test that has been dispatched and is running (or has just
/// finished) in a given scratch directory.
#[derive(Debug, Clone)]
struct Test {
    expected: ExpectedResult,
    file_name: PathBuf,
    directory_index: usize,
}

pub struct TestsRunResult {
    pub passed_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub failed_reasons: Option<HashMap<PathBuf, FailureReason>>,
}

struct DirOutputs<'a>(&'a Path);

impl<'a> ReadStageOutput for DirOutputs<'a> {
    fn read(&self, file_name: &str) -> String {
        String::from_utf8_lossy(&discovery::read_stage_output(self.0, file_name)).into_owned()
    }
}

/// Drives the three-stage pipeline over a set of tests with bounded
/// concurrency, one scratch directory per concurrent worker.
pub struct Scheduler {
    directories: Vec<PathBuf>,
    free_directories: Vec<usize>,
    running_tests: HashMap<ProcessHandle, Test>,
    argv_template: Vec<String>,
    passed_count: usize,
    failed_count: usize,
    skipped_count: usize,
    failed_reasons: Option<HashMap<PathBuf, FailureReason>>,
}

impl Scheduler {
    /// `directories` is fixed for the lifetime of the scheduler; its
    /// length is the maximum number of tests run concurrently.
    ///
    /// `starting_failed_tests` seeds `failed_count` (spec's `run_tests`
    /// parameter of the same name): tests that never reach dispatch at
    /// all -- files that failed to parse -- are counted as failures by
    /// the caller before constructing the scheduler, and folded in
    /// here so the final report's failed count includes them.
    pub fn new(
        directories: Vec<PathBuf>,
        collect_reasons: bool,
        starting_failed_tests: usize,
        build_dir: &Path,
        cpp_compiler_path: &str,
        target_triple: &str,
        default_cpp_include: &str,
        skipped_count: usize,
    ) -> Self {
        assert!(!directories.is_empty(), "need at least one scratch directory");
        let free_directories = (0..directories.len()).rev().collect();
        let argv_template = build_argv_template(build_dir, cpp_compiler_path, target_triple, default_cpp_include);
        Scheduler {
            directories,
            free_directories,
            running_tests: HashMap::new(),
            argv_template,
            passed_count: 0,
            failed_count: starting_failed_tests,
            skipped_count,
            failed_reasons: if collect_reasons { Some(HashMap::new()) } else { None },
        }
    }

    /// Runs every test in `tests`, dispatching through the fixed pool
    /// of scratch directories, until the queue is drained and every
    /// dispatched driver has been reaped.
    pub fn run_tests(mut self, mut tests: Vec<PendingTest>, total_test_count: usize) -> Result<TestsRunResult, Error> {
        signal::install_handler().map_err(Error::Signal)?;

        while let Some(test) = tests.pop() {
            let dir_index = self.wait_for_free_directory()?;
            self.dispatch(test, dir_index, total_test_count)?;
        }

        while !self.running_tests.is_empty() {
            signal::wait_for_sigchld().map_err(Error::Signal)?;
            self.poll_running_tests()?;
        }

        print!("\r\x1b[K");
        io::stdout().flush().ok();

        Ok(TestsRunResult {
            passed_count: self.passed_count,
            failed_count: self.failed_count,
            skipped_count: self.skipped_count,
            failed_reasons: self.failed_reasons,
        })
    }

    fn wait_for_free_directory(&mut self) -> Result<usize, Error> {
        loop {
            if let Some(index) = self.free_directories.pop() {
                return Ok(index);
            }
            signal::wait_for_sigchld().map_err(Error::Signal)?;
            self.poll_running_tests()?;
        }
    }

    fn dispatch(&mut self, test: PendingTest, dir_index: usize, total_test_count: usize) -> Result<(), Error> {
        let dir = self.directories[dir_index].clone();
        let len = self.argv_template.len();
        self.argv_template[len - 3] = if test.cpp_includes.is_empty() {
            "None".to_string()
        } else {
            test.cpp_includes.clone()
        };
        self.argv_template[len - 2] = dir.to_string_lossy().into_owned();
        self.argv_template[len - 1] = test.file_name.to_string_lossy().into_owned();

        let handle = process::spawn(&self.argv_template).map_err(Error::Process)?;
        print!(
            "\r\x1b[K({}/{}/{}) Testing {}",
            self.failed_count,
            self.passed_count,
            total_test_count,
            test.file_name.display()
        );
        io::stdout().flush().ok();
        self.running_tests.insert(
            handle,
            Test {
                expected: test.expected,
                file_name: test.file_name,
                directory_index: dir_index,
            },
        );
        Ok(())
    }

    fn poll_running_tests(&mut self) -> Result<(), Error> {
        loop {
            let handles: Vec<ProcessHandle> = self.running_tests.keys().cloned().collect();
            let mut any_exited = false;
            for handle in handles {
                if let Some(exit) = process::poll_exit(handle).map_err(Error::Process)? {
                    self.on_test_exited(handle, exit.exit_code);
                    any_exited = true;
                }
            }
            if !any_exited {
                return Ok(());
            }
        }
    }

    fn on_test_exited(&mut self, handle: ProcessHandle, exit_code: i32) {
        let test = match self.running_tests.remove(&handle) {
            Some(test) => test,
            None => return,
        };
        self.free_directories.push(test.directory_index);
        let dir = &self.directories[test.directory_index];
        let outcome = classify::classify(exit_code, &test.expected, &DirOutputs(dir));
        match outcome {
            Outcome::Passed => self.passed_count += 1,
            Outcome::Failed(reason) => {
                self.failed_count += 1;
                eprintln!("\r\x1b[K[ FAIL ] {}", test.file_name.display());
                if let Some(reasons) = self.failed_reasons.as_mut() {
                    reasons.insert(test.file_name, reason);
                }
            }
        }
    }
}

/// Builds the fixed prefix of the driver argv. The last three elements
/// are placeholders overwritten before each dispatch.
fn build_argv_template(build_dir: &Path, cpp_compiler_path: &str, target_triple: &str, default_cpp_include: &str) -> Vec<String> {
    vec![
        "python3".to_string(),
        "jakttest/run_one.py".to_string(),
        "--jakt-binary".to_string(),
        build_dir.join("bin").join("jakt").to_string_lossy().into_owned(),
        "--jakt-lib-dir".to_string(),
        build_dir.join("lib").to_string_lossy().into_owned(),
        "--target-triple".to_string(),
        target_triple.to_string(),
        "--cpp-compiler".to_string(),
        cpp_compiler_path.to_string(),
        "--cpp-include".to_string(),
        if default_cpp_include.is_empty() {
            "None".to_string()
        } else {
            default_cpp_include.to_string()
        },
        String::new(), // overwritten with cpp_includes
        String::new(), // overwritten with the scratch directory
        String::new(), // overwritten with the source file name
    ]
}

#[derive(Debug)]
pub enum Error {
    Process(process::Error),
    Signal(nix::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Process(err) => write!(f, "{}", err),
            Error::Signal(err) => write!(f, "signal error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::ExpectedKind;
    use std::fs;

    fn dirs(tmp: &tempfile::TempDir, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let p = tmp.path().join(format!("worker-{}", i));
                fs::create_dir_all(&p).unwrap();
                p
            })
            .collect()
    }

    fn fake_driver_argv_template(script: &Path) -> Vec<String> {
        vec![
            "/bin/sh".to_string(),
            script.to_string_lossy().into_owned(),
            String::new(),
            String::new(),
            String::new(),
        ]
    }

    /// Stands in for the driver contract: `$2` is the scratch
    /// directory, `$3` is the source file path (`$1` is the
    /// `--cpp-include` sentinel). Writes `hi\n` to `runtest.out` and
    /// exits 0.
    fn write_passing_driver(path: &Path) {
        fs::write(
            path,
            "#!/bin/sh\nprintf 'hi\\n' > \"$2/runtest.out\"\nexit 0\n",
        )
        .unwrap();
    }

    #[test]
    fn dispatches_and_classifies_a_single_passing_test() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("driver.sh");
        write_passing_driver(&script);

        let directories = dirs(&tmp, 1);
        let mut scheduler = Scheduler::new(directories, true, 0, Path::new("/build"), "clang++", "x86_64", "", 0);
        scheduler.argv_template = fake_driver_argv_template(&script);

        let tests = vec![PendingTest {
            expected: ExpectedResult { kind: ExpectedKind::Okay, output: "hi\n".into() },
            file_name: PathBuf::from("t.jakt"),
            cpp_includes: String::new(),
        }];
        let result = scheduler.run_tests(tests, 1).unwrap();
        assert_eq!(result.passed_count, 1);
        assert_eq!(result.failed_count, 0);
        assert!(result.failed_reasons.unwrap().is_empty());
    }

    #[test]
    fn classifies_an_abrupt_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("driver.sh");
        fs::write(&script, "#!/bin/sh\nexit 9\n").unwrap();

        let directories = dirs(&tmp, 1);
        let mut scheduler = Scheduler::new(directories, true, 0, Path::new("/build"), "clang++", "x86_64", "", 0);
        scheduler.argv_template = fake_driver_argv_template(&script);

        let tests = vec![PendingTest {
            expected: ExpectedResult { kind: ExpectedKind::Okay, output: "hi\n".into() },
            file_name: PathBuf::from("t.jakt"),
            cpp_includes: String::new(),
        }];
        let result = scheduler.run_tests(tests, 1).unwrap();
        assert_eq!(result.failed_count, 1);
        let reasons = result.failed_reasons.unwrap();
        match reasons.get(Path::new("t.jakt")).unwrap() {
            FailureReason::AbruptExit(9) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn max_concurrent_one_runs_serially() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("driver.sh");
        write_passing_driver(&script);

        let directories = dirs(&tmp, 1);
        let mut scheduler = Scheduler::new(directories, false, 0, Path::new("/build"), "clang++", "x86_64", "", 0);
        scheduler.argv_template = fake_driver_argv_template(&script);

        let tests: Vec<PendingTest> = (0..5)
            .map(|i| PendingTest {
                expected: ExpectedResult { kind: ExpectedKind::Okay, output: "hi\n".into() },
                file_name: PathBuf::from(format!("t{}.jakt", i)),
                cpp_includes: String::new(),
            })
            .collect();
        let result = scheduler.run_tests(tests, 5).unwrap();
        assert_eq!(result.passed_count, 5);
        assert_eq!(result.failed_count, 0);
    }
}
