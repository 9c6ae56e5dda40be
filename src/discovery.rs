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

//! Filesystem helpers: discovering `.jakt` files, allocating and
//! cleaning up scratch directories, and reading a driver's per-stage
//! output.

use std::fmt::{self, Display};
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

const JAKT_EXTENSION: &str = "jakt";
const CPP_EXTENSION: &str = "cpp";

/// Finds every `.jakt` file reachable from `roots`. A root that is
/// itself a file is taken as-is (regardless of extension); a root
/// that is a directory is walked depth-first.
pub fn discover_jakt_files(roots: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    discover_files_with_extension(roots, JAKT_EXTENSION)
}

/// Like [`discover_jakt_files`], but for the `.cpp` sources the build
/// orchestrator compiles when run with `--build-only`.
pub fn discover_cpp_files(roots: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    discover_files_with_extension(roots, CPP_EXTENSION)
}

fn discover_files_with_extension(roots: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for root in roots {
        let metadata = fs::metadata(root).map_err(|err| Error::Io(root.clone(), err))?;
        if metadata.is_file() {
            files.push(root.clone());
            continue;
        }
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|err| Error::Walk(root.clone(), err))?;
            if entry.file_type().is_file() && entry.path().extension().map(|ext| ext == extension).unwrap_or(false) {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Creates `count` scratch directories under `temp_dir`, reusing any
/// that already exist.
pub fn allocate_scratch_directories(temp_dir: &Path, count: usize) -> Result<Vec<PathBuf>, Error> {
    (0..count)
        .map(|i| {
            let dir = temp_dir.join(format!("jakttest-tmp-{}", i));
            fs::create_dir_all(&dir).map_err(|err| Error::Io(dir.clone(), err))?;
            Ok(dir)
        })
        .collect()
}

/// Best-effort recursive removal; failures are logged, not propagated,
/// since this runs during shutdown and shouldn't mask the test report.
pub fn cleanup_scratch_directories(dirs: &[PathBuf]) {
    for dir in dirs {
        if let Err(err) = fs::remove_dir_all(dir) {
            log::warn!("could not remove scratch directory {}: {}", dir.display(), err);
        }
    }
}

/// Reads a stage output file from a scratch directory. A missing file
/// is not an error -- it means that stage never produced output --
/// and yields an empty buffer.
pub fn read_stage_output(dir: &Path, file_name: &str) -> Vec<u8> {
    match fs::read(dir.join(file_name)) {
        Ok(bytes) => bytes,
        Err(ref err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => {
            log::warn!("could not read {} in {}: {}", file_name, dir.display(), err);
            Vec::new()
        }
    }
}

#[derive(Debug)]
pub enum Error {
    Io(PathBuf, std::io::Error),
    Walk(PathBuf, walkdir::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(path, err) => write!(f, "{}: {}", path.display(), err),
            Error::Walk(path, err) => write!(f, "{}: {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_nested_jakt_files() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(tmp.path().join("a.jakt"), "").unwrap();
        fs::write(sub.join("b.jakt"), "").unwrap();
        fs::write(sub.join("c.txt"), "").unwrap();

        let mut found = discover_jakt_files(&[tmp.path().to_path_buf()]).unwrap();
        found.sort();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.extension().unwrap() == "jakt"));
    }

    #[test]
    fn allocate_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = allocate_scratch_directories(tmp.path(), 3).unwrap();
        assert_eq!(dirs.len(), 3);
        // Running it again must not fail even though the directories
        // already exist.
        let dirs_again = allocate_scratch_directories(tmp.path(), 3).unwrap();
        assert_eq!(dirs, dirs_again);
    }

    #[test]
    fn missing_stage_output_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(read_stage_output(tmp.path(), "runtest.out"), Vec::<u8>::new());
    }

    #[test]
    fn cleanup_removes_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = allocate_scratch_directories(tmp.path(), 2).unwrap();
        cleanup_scratch_directories(&dirs);
        for dir in &dirs {
            assert!(!dir.exists());
        }
    }
}
