use std::ffi::CString;
use std::fmt::{self, Display};

use libc::c_int;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, execvp, fork, pipe2, read, write, ForkResult, Pid};

/// A handle to a live child process.
///
/// This wraps a raw pid. There is no shared ownership: whoever holds a
/// `ProcessHandle` is responsible for eventually reaping it via
/// [`wait_any`] or [`poll_exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(Pid);

impl ProcessHandle {
    fn raw(self) -> Pid {
        self.0
    }
}

/// The outcome of a terminated child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitResult {
    /// The decoded exit status. For a process killed by a signal, this
    /// follows the host OS's standard `128 + signal` convention.
    pub exit_code: i32,
    pub process: ProcessHandle,
}

/// Spawns `argv[0]` with the remaining elements as arguments.
///
/// The child inherits the parent's file descriptors; the driver is
/// expected to redirect its own output by opening files, not by us
/// wiring up pipes here.
///
/// Uses a self-pipe so that a failure to exec in the child (a bad
/// program name, permission denied, ...) is reported to the caller as
/// `Error::Exec` rather than being silently swallowed or surfacing only
/// as an opaque non-zero exit code.
pub fn spawn(argv: &[String]) -> Result<ProcessHandle, Error> {
    // O_CLOEXEC on both ends: a successful execvp in the child must
    // close its copy of write_fd automatically, or the parent's read
    // loop below never sees EOF and blocks until the driver exits,
    // serializing the whole pool regardless of --jobs.
    let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC).map_err(Error::Spawn)?;
    match unsafe { fork() }.map_err(Error::Spawn)? {
        ForkResult::Parent { child, .. } => {
            let _ = close(write_fd);
            let mut buf = [0u8; 4];
            let mut filled = 0;
            while filled < buf.len() {
                match read(read_fd, &mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(Errno::EINTR) => continue,
                    Err(_) => break,
                }
            }
            let _ = close(read_fd);
            if filled == buf.len() {
                // The child reported an exec failure before replacing its
                // image; reap it so it doesn't linger as a zombie.
                let _ = waitpid(child, None);
                let errno = i32::from_ne_bytes(buf);
                Err(Error::Exec(Errno::from_i32(errno)))
            } else {
                Ok(ProcessHandle(child))
            }
        }
        ForkResult::Child => {
            let _ = close(read_fd);
            if let Err(errno) = exec_argv(argv) {
                eprintln!("jakttest: exec failed for {}: {}", argv[0], errno);
                let bytes = (errno as c_int).to_ne_bytes();
                let _ = write(write_fd, &bytes);
            }
            // We must never unwind or run destructors past a failed exec in
            // the forked child; _exit bypasses all of that.
            unsafe { libc::_exit(127) }
        }
    }
}

fn exec_argv(argv: &[String]) -> Result<std::convert::Infallible, Errno> {
    let cargs: Vec<CString> = argv
        .iter()
        .map(|s| CString::new(s.as_str()).expect("argv element contains NUL"))
        .collect();
    execvp(&cargs[0], &cargs)
}

/// Non-blocking check for whether `handle` has exited.
pub fn poll_exit(handle: ProcessHandle) -> Result<Option<ExitResult>, Error> {
    match waitpid(handle.raw(), Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => Ok(None),
        Ok(status) => Ok(decode(handle, status)),
        Err(Errno::ECHILD) => Ok(None),
        Err(err) => Err(Error::Wait(err)),
    }
}

/// Blocks until some child of this process terminates.
///
/// `at_least` must be non-empty (`Error::EmptyWaitSet` otherwise); its
/// contents are not used to filter which child is waited for -- this
/// waits for *any* child, as documented in the design notes on
/// `wait_for_some_set_of_processes_that_at_least_includes`. The caller
/// recovers the job identity of the reaped child by looking up the
/// returned `process` handle.
pub fn wait_any(at_least: &[ProcessHandle]) -> Result<(Option<usize>, ExitResult), Error> {
    if at_least.is_empty() {
        return Err(Error::EmptyWaitSet);
    }
    loop {
        match waitpid(None::<Pid>, None) {
            Ok(status) => {
                if let Some(pid) = status_pid(&status) {
                    let handle = ProcessHandle(pid);
                    if let Some(exit) = decode(handle, status) {
                        let matched_key = at_least.iter().position(|h| *h == handle);
                        return Ok((matched_key, exit));
                    }
                }
                // Stopped/continued notifications don't terminate anything;
                // keep waiting.
            }
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(Error::Wait(err)),
        }
    }
}

/// Sends the strongest available termination signal. Does not wait.
pub fn kill(handle: ProcessHandle) {
    let _ = nix::sys::signal::kill(handle.raw(), nix::sys::signal::Signal::SIGKILL);
}

fn status_pid(status: &WaitStatus) -> Option<Pid> {
    status.pid()
}

fn decode(handle: ProcessHandle, status: WaitStatus) -> Option<ExitResult> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitResult {
            exit_code: code,
            process: handle,
        }),
        WaitStatus::Signaled(_, signal, _core_dumped) => Some(ExitResult {
            exit_code: 128 + signal as i32,
            process: handle,
        }),
        _ => None,
    }
}

#[derive(Debug)]
pub enum Error {
    /// `fork()` itself failed.
    Spawn(Errno),
    /// The forked child failed to replace its image via `execvp`.
    Exec(Errno),
    /// An unexpected failure from `waitpid`.
    Wait(Errno),
    /// `wait_any` was called with an empty wait set.
    EmptyWaitSet,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Spawn(err) => write!(f, "could not spawn child process: {}", err),
            Error::Exec(err) => write!(f, "could not execute program: {}", err),
            Error::Wait(err) => write!(f, "error while waiting for child process: {}", err),
            Error::EmptyWaitSet => write!(f, "wait_any called with no processes to wait for"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn spawn_and_reap_true() {
        let handle = spawn(&argv(&["/bin/true"])).expect("spawn failed");
        let (_, exit) = wait_any(&[handle]).expect("wait_any failed");
        assert_eq!(exit.exit_code, 0);
        assert_eq!(exit.process, handle);
    }

    #[test]
    fn spawn_and_reap_false() {
        let handle = spawn(&argv(&["/bin/false"])).expect("spawn failed");
        let (_, exit) = wait_any(&[handle]).expect("wait_any failed");
        assert_eq!(exit.exit_code, 1);
    }

    #[test]
    fn poll_exit_before_and_after_termination() {
        let handle = spawn(&argv(&["/bin/sh", "-c", "exit 7"])).expect("spawn failed");
        loop {
            if let Some(exit) = poll_exit(handle).expect("poll_exit failed") {
                assert_eq!(exit.exit_code, 7);
                break;
            }
        }
    }

    #[test]
    fn spawn_bad_program_reports_exec_error() {
        let err = spawn(&argv(&["/no/such/program-jakttest-test"])).unwrap_err();
        match err {
            Error::Exec(_) => {}
            other => panic!("expected Error::Exec, got {:?}", other),
        }
    }

    #[test]
    fn wait_any_rejects_empty_set() {
        let err = wait_any(&[]).unwrap_err();
        match err {
            Error::EmptyWaitSet => {}
            other => panic!("expected Error::EmptyWaitSet, got {:?}", other),
        }
    }

    #[test]
    fn kill_terminates_a_sleeping_child() {
        let handle = spawn(&argv(&["/bin/sh", "-c", "sleep 30"])).expect("spawn failed");
        kill(handle);
        let (_, exit) = wait_any(&[handle]).expect("wait_any failed");
        assert_ne!(exit.exit_code, 0);
    }

    /// Guards against the self-pipe's write end leaking into a
    /// successfully exec'd child: if it did, `spawn` would block
    /// reading from the pipe until the long sleep finishes instead of
    /// returning immediately after `execvp` replaces the child's image.
    #[test]
    fn spawn_returns_before_a_long_running_child_exits() {
        let start = std::time::Instant::now();
        let handle = spawn(&argv(&["/bin/sh", "-c", "sleep 5"])).expect("spawn failed");
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        kill(handle);
        wait_any(&[handle]).expect("wait_any failed");
    }
}
