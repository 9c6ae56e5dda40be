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

//! Compiles a list of C++ source files into object files using the
//! same bounded worker pool as the test scheduler. Unlike the
//! scheduler, there is no scratch-directory allocator and no result
//! classifier: a job's only expected outcome is exit code zero.

use std::path::{Path, PathBuf};

use crate::pool::Pool;

pub struct BuildReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Compiles every file in `sources` to a `.o` object file in
/// `build_dir`, running up to `pool`'s concurrency limit at once.
pub fn build_objects(
    sources: &[PathBuf],
    pool: &mut Pool,
    compiler: &str,
    build_dir: &Path,
) -> Result<BuildReport, crate::pool::Error> {
    let mut job_for_source = Vec::with_capacity(sources.len());
    for source in sources {
        let object = object_path(build_dir, source);
        let argv = vec![
            compiler.to_string(),
            "-c".to_string(),
            source.to_string_lossy().into_owned(),
            "-o".to_string(),
            object.to_string_lossy().into_owned(),
        ];
        let id = pool.run(&argv)?;
        job_for_source.push((id, source.clone()));
    }
    pool.wait_for_all_jobs_to_complete()?;

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (id, source) in job_for_source {
        match pool.status(id) {
            Some(exit) if exit.exit_code == 0 => succeeded.push(source),
            _ => failed.push(source),
        }
    }
    Ok(BuildReport { succeeded, failed })
}

fn object_path(build_dir: &Path, source: &Path) -> PathBuf {
    let stem = source.file_stem().unwrap_or_default();
    build_dir.join(stem).with_extension("o")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_failures_without_aborting_the_batch() {
        // Use /bin/sh as a stand-in "compiler": argv[2] ("-c") decides
        // success, everything else fails, exercising both branches of
        // the report without needing a real C++ toolchain.
        let mut pool = Pool::new(2);
        let sources = vec![PathBuf::from("ok.cpp"), PathBuf::from("bad.cpp")];
        let build_dir = tempfile::tempdir().unwrap();

        // Swap in a fake compiler: a shell one-liner that succeeds for
        // "ok.cpp" and fails otherwise.
        let fake_compiler = build_dir.path().join("fake-cc.sh");
        std::fs::write(
            &fake_compiler,
            "#!/bin/sh\ncase \"$2\" in ok.cpp) exit 0;; *) exit 1;; esac\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&fake_compiler).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&fake_compiler, perms).unwrap();

        let report = build_objects(&sources, &mut pool, fake_compiler.to_str().unwrap(), build_dir.path()).unwrap();
        assert_eq!(report.succeeded, vec![PathBuf::from("ok.cpp")]);
        assert_eq!(report.failed, vec![PathBuf::from("bad.cpp")]);
    }
}
