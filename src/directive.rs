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

//! Extracts `Expect:` directives from the leading doc-comment block of
//! a Jakt source file.

use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};

use crate::classify::Stage;

/// The kind of outcome a test directive declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedKind {
    Okay,
    CompileError,
    RuntimeError,
}

impl ExpectedKind {
    pub fn to_stage(self) -> Stage {
        match self {
            ExpectedKind::Okay | ExpectedKind::RuntimeError => Stage::TestRun,
            ExpectedKind::CompileError => Stage::TranspileJakt,
        }
    }
}

/// The directive-derived oracle for a test: a kind plus the expected
/// string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedResult {
    pub kind: ExpectedKind,
    pub output: String,
}

/// The result of parsing one source file's directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub expected: ExpectedResult,
    pub cpp_includes: String,
    pub skip: bool,
}

const EXPECT_HEADER: &str = "Expect:";
const OUTPUT_PREFIX: &str = "- output:";
const ERROR_PREFIX: &str = "- error:";
const SKIP_MARKER: &str = "Skip";
const INCLUDES_PREFIX: &str = "cpp_includes:";

pub fn parse(path: &Path) -> Result<ParsedFile, ParseError> {
    let contents = fs::read_to_string(path).map_err(|err| ParseError::Io(path.to_owned(), err))?;
    parse_str(path, &contents)
}

fn parse_str(path: &Path, contents: &str) -> Result<ParsedFile, ParseError> {
    let mut skip = false;
    let mut cpp_includes = String::new();
    let mut expected: Option<ExpectedResult> = None;
    let mut in_expect_block = false;

    for raw_line in contents.lines() {
        let line = strip_comment_prefix(raw_line);
        let Some(line) = line else {
            // The leading doc-comment preamble ended; directives only
            // live in that block.
            if expected.is_some() || skip {
                break;
            }
            continue;
        };
        let trimmed = line.trim();
        if trimmed == SKIP_MARKER {
            skip = true;
        } else if trimmed == EXPECT_HEADER {
            in_expect_block = true;
        } else if let Some(rest) = trimmed.strip_prefix(INCLUDES_PREFIX) {
            cpp_includes = unquote(rest.trim(), path)?;
        } else if in_expect_block {
            if let Some(rest) = trimmed.strip_prefix(OUTPUT_PREFIX) {
                expected = Some(ExpectedResult {
                    kind: ExpectedKind::Okay,
                    output: unquote(rest.trim(), path)?,
                });
            } else if let Some(rest) = trimmed.strip_prefix(ERROR_PREFIX) {
                expected = Some(ExpectedResult {
                    kind: ExpectedKind::CompileError,
                    output: unquote(rest.trim(), path)?,
                });
            }
        }
    }

    if skip {
        return Ok(ParsedFile {
            path: path.to_owned(),
            expected: ExpectedResult {
                kind: ExpectedKind::Okay,
                output: String::new(),
            },
            cpp_includes,
            skip: true,
        });
    }
    match expected {
        Some(expected) => Ok(ParsedFile {
            path: path.to_owned(),
            expected,
            cpp_includes,
            skip: false,
        }),
        None => Err(ParseError::NoDirectives(path.to_owned())),
    }
}

/// Strips a leading `///` doc-comment marker, returning `None` once a
/// line no longer looks like part of the comment preamble.
fn strip_comment_prefix(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed.strip_prefix("///")
}

/// Unescapes a `"..."`-quoted directive string.
fn unquote(raw: &str, path: &Path) -> Result<String, ParseError> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| ParseError::BadQuote(path.to_owned(), raw.to_owned()))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(ParseError::BadQuote(path.to_owned(), format!("\\{}", other))),
            None => return Err(ParseError::BadQuote(path.to_owned(), raw.to_owned())),
        }
    }
    Ok(out)
}

#[derive(Debug)]
pub enum ParseError {
    Io(PathBuf, std::io::Error),
    NoDirectives(PathBuf),
    BadQuote(PathBuf, String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Io(path, err) => write!(f, "{}: {}", path.display(), err),
            ParseError::NoDirectives(path) => {
                write!(f, "{}: no `Expect:` directive and no `Skip` marker found", path.display())
            }
            ParseError::BadQuote(path, raw) => {
                write!(f, "{}: malformed quoted string: {}", path.display(), raw)
            }
        }
    }
}

impl std::error::Error for ParseError {}
