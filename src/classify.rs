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

//! Maps a driver's exit code and captured output back to a pass/fail
//! verdict, per the three-stage pipeline contract.

use std::fmt::{self, Display};

use crate::directive::{ExpectedKind, ExpectedResult};

/// One of the three stages of the transpile/compile/run pipeline.
/// Ordered: `TranspileJakt < CompileCpp < TestRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    TranspileJakt = 1,
    CompileCpp = 2,
    TestRun = 3,
}

impl Stage {
    /// The file names the driver is expected to have written this
    /// stage's captured stdout/stderr to, relative to the scratch
    /// directory.
    pub fn output_filenames(self) -> (&'static str, &'static str) {
        match self {
            Stage::TranspileJakt => ("compile_jakt.out", "compile_jakt.err"),
            Stage::CompileCpp => ("compile_cpp.out", "compile_cpp.err"),
            Stage::TestRun => ("runtest.out", "runtest.err"),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::TranspileJakt => "Jakt transpilation to C++",
            Stage::CompileCpp => "Clang++ compilation of generated C++ source",
            Stage::TestRun => "execution of the compiled test binary",
        }
    }

    fn from_exit_code(code: i32) -> Option<Stage> {
        match code {
            0 | 1 => Some(Stage::TestRun),
            2 => Some(Stage::CompileCpp),
            3 => Some(Stage::TranspileJakt),
            _ => None,
        }
    }
}

/// The verdict of comparing a driver's observed outputs against a
/// test's expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    CompilerErrorUnmatched { had: String, expected: String },
    StdoutUnmatched { had: String, expected: String },
    StderrUnmatched { had: String, expected: String },
    ExpectedError { had: String, expected: String },
    ErroredAtEarlierStage { had: String, expected: String, failed_stage: Stage },
    ErroredAtLaterStage { had: String, expected: String, failed_stage: Stage },
    AbruptExit(i32),
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FailureReason::CompilerErrorUnmatched { had, expected } => write!(
                f,
                "expected compiler error containing {:?}, but got:\n{}",
                expected, had
            ),
            FailureReason::StdoutUnmatched { had, expected } => {
                write!(f, "expected stdout {:?}, but got:\n{}", expected, had)
            }
            FailureReason::StderrUnmatched { had, expected } => write!(
                f,
                "expected stderr containing {:?}, but got:\n{}",
                expected, had
            ),
            FailureReason::ExpectedError { had, expected } => write!(
                f,
                "expected an error containing {:?}, but the test ran and produced:\n{}",
                expected, had
            ),
            FailureReason::ErroredAtEarlierStage { had, failed_stage, .. } => write!(
                f,
                "failed during {} before reaching the expected stage:\n{}",
                failed_stage.description(),
                had
            ),
            FailureReason::ErroredAtLaterStage { had, failed_stage, .. } => write!(
                f,
                "failed during {}, later than the stage the test expected to fail at:\n{}",
                failed_stage.description(),
                had
            ),
            FailureReason::AbruptExit(code) => {
                write!(f, "driver exited with unrecognized status code {}", code)
            }
        }
    }
}

/// Reads stage output; per the driver contract, a missing file means
/// the stage never ran and is reported as an empty buffer, not an
/// error.
pub trait ReadStageOutput {
    fn read(&self, file_name: &str) -> String;
}

pub fn classify(exit_code: i32, expected: &ExpectedResult, outputs: &dyn ReadStageOutput) -> Outcome {
    let stage = match Stage::from_exit_code(exit_code) {
        None => return Outcome::Failed(FailureReason::AbruptExit(exit_code)),
        Some(stage) => stage,
    };
    let (out_name, err_name) = stage.output_filenames();
    let result_output = outputs.read(out_name);
    let error_output = outputs.read(err_name);
    let expected_stage = expected.kind.to_stage();

    let passed = match expected.kind {
        ExpectedKind::Okay => strip_cr(&result_output) == expected.output,
        ExpectedKind::CompileError | ExpectedKind::RuntimeError => {
            normalize(&error_output).contains(&normalize(&expected.output))
        }
    };
    if passed {
        return Outcome::Passed;
    }

    if stage != expected_stage {
        if stage < expected_stage {
            return Outcome::Failed(FailureReason::ErroredAtEarlierStage {
                had: error_output,
                expected: expected.output.clone(),
                failed_stage: stage,
            });
        }
        if stage == Stage::TestRun && !result_output.is_empty() {
            return Outcome::Failed(FailureReason::ExpectedError {
                had: result_output,
                expected: expected.output.clone(),
            });
        }
        return Outcome::Failed(FailureReason::ErroredAtLaterStage {
            had: error_output,
            expected: expected.output.clone(),
            failed_stage: stage,
        });
    }

    Outcome::Failed(match expected.kind {
        ExpectedKind::Okay => FailureReason::StdoutUnmatched {
            had: result_output,
            expected: expected.output.clone(),
        },
        ExpectedKind::RuntimeError => FailureReason::StderrUnmatched {
            had: error_output,
            expected: expected.output.clone(),
        },
        ExpectedKind::CompileError => FailureReason::CompilerErrorUnmatched {
            had: error_output,
            expected: expected.output.clone(),
        },
    })
}

fn strip_cr(s: &str) -> String {
    s.chars().filter(|&c| c != '\r').collect()
}

/// Drops `\r` and widens bare `\n` to the two-character sequence
/// `\n`, matching the observed substring-comparison rule for
/// stderr-based expectations.
fn normalize(s: &str) -> String {
    strip_cr(s).replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeOutputs(HashMap<&'static str, String>);

    impl ReadStageOutput for FakeOutputs {
        fn read(&self, file_name: &str) -> String {
            self.0.get(file_name).cloned().unwrap_or_default()
        }
    }

    fn outputs(pairs: &[(&'static str, &str)]) -> FakeOutputs {
        FakeOutputs(pairs.iter().map(|&(k, v)| (k, v.to_string())).collect())
    }

    #[test]
    fn scenario_1_passing_okay() {
        let expected = ExpectedResult { kind: ExpectedKind::Okay, output: "hi\n".into() };
        let files = outputs(&[("runtest.out", "hi\n")]);
        assert_eq!(classify(0, &expected, &files), Outcome::Passed);
    }

    #[test]
    fn scenario_2_compile_error_substring_match() {
        let expected = ExpectedResult { kind: ExpectedKind::CompileError, output: "undefined name".into() };
        let files = outputs(&[("compile_jakt.err", "error: undefined name foo\n")]);
        assert_eq!(classify(3, &expected, &files), Outcome::Passed);
    }

    #[test]
    fn scenario_3_errored_at_earlier_stage() {
        let expected = ExpectedResult { kind: ExpectedKind::Okay, output: "a".into() };
        let files = outputs(&[("compile_cpp.err", "oops")]);
        match classify(2, &expected, &files) {
            Outcome::Failed(FailureReason::ErroredAtEarlierStage { had, failed_stage, .. }) => {
                assert_eq!(had, "oops");
                assert_eq!(failed_stage, Stage::CompileCpp);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn scenario_4_expected_error_but_ran() {
        let expected = ExpectedResult { kind: ExpectedKind::CompileError, output: "X".into() };
        let files = outputs(&[("runtest.out", "ok")]);
        match classify(0, &expected, &files) {
            Outcome::Failed(FailureReason::ExpectedError { had, .. }) => assert_eq!(had, "ok"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn scenario_5_stdout_unmatched() {
        let expected = ExpectedResult { kind: ExpectedKind::Okay, output: "hi\n".into() };
        let files = outputs(&[("runtest.out", "bye\n")]);
        match classify(0, &expected, &files) {
            Outcome::Failed(FailureReason::StdoutUnmatched { had, .. }) => assert_eq!(had, "bye\n"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn abrupt_exit_for_unknown_code() {
        let expected = ExpectedResult { kind: ExpectedKind::Okay, output: "a".into() };
        let files = outputs(&[]);
        assert_eq!(classify(7, &expected, &files), Outcome::Failed(FailureReason::AbruptExit(7)));
    }

    #[test]
    fn missing_files_are_treated_as_empty_buffers() {
        let expected = ExpectedResult { kind: ExpectedKind::Okay, output: "".into() };
        let files = outputs(&[]);
        assert_eq!(classify(0, &expected, &files), Outcome::Passed);
    }

    #[test]
    fn okay_comparison_ignores_carriage_returns() {
        let expected = ExpectedResult { kind: ExpectedKind::Okay, output: "a\nb\n".into() };
        let files = outputs(&[("runtest.out", "a\r\nb\r\n")]);
        assert_eq!(classify(0, &expected, &files), Outcome::Passed);
    }

    #[test]
    fn normalize_is_idempotent() {
        let s = "line one\r\nline two\n";
        assert_eq!(normalize(&normalize(s)), normalize(s));
    }
}
