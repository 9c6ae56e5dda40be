use std::collections::HashMap;
use std::fmt::{self, Display};

use crate::process::{self, ExitResult, ProcessHandle};

/// Opaque, monotonically increasing identifier for a job accepted by a
/// [`Pool`]. Never reused for the lifetime of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

/// A bounded-concurrency job queue over [`crate::process`].
///
/// `completed` is additive: once a job finishes, its result stays
/// available until the pool itself is dropped, so callers can query
/// outcomes lazily instead of having to collect them eagerly at reap
/// time.
pub struct Pool {
    running: HashMap<JobId, ProcessHandle>,
    completed: HashMap<JobId, ExitResult>,
    next_id: u64,
    max_concurrent: usize,
}

impl Pool {
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be at least 1");
        Pool {
            running: HashMap::new(),
            completed: HashMap::new(),
            next_id: 0,
            max_concurrent,
        }
    }

    pub fn num_running(&self) -> usize {
        self.running.len()
    }

    /// Spawns `argv`, blocking for a slot to free up if the pool is
    /// already at `max_concurrent`.
    pub fn run(&mut self, argv: &[String]) -> Result<JobId, Error> {
        if self.running.len() >= self.max_concurrent {
            self.wait_for_any_job_to_complete()?;
        }
        let handle = process::spawn(argv)?;
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.running.insert(id, handle);
        Ok(id)
    }

    /// Blocks until at least one running job terminates, moving it (and
    /// opportunistically any other job that has since terminated) from
    /// `running` to `completed`.
    pub fn wait_for_any_job_to_complete(&mut self) -> Result<(), Error> {
        if self.running.is_empty() {
            return Err(Error::EmptyWaitSet);
        }
        let initial_exit = loop {
            let at_least: Vec<ProcessHandle> = self.running.values().cloned().collect();
            let (_matched_key, exit) = process::wait_any(&at_least)?;
            if let Some(id) = self.find_running(exit.process) {
                self.running.remove(&id);
                self.completed.insert(id, exit);
                break exit;
            }
            // The reaped pid belongs to some other subsystem's child;
            // discard it and keep waiting for one of ours.
        };
        let remaining: Vec<JobId> = self.running.keys().cloned().collect();
        for id in remaining {
            let handle = self.running[&id];
            match process::poll_exit(handle) {
                Ok(Some(exit)) => {
                    self.running.remove(&id);
                    self.completed.insert(id, exit);
                }
                Ok(None) => {}
                Err(_) => {
                    // Mirrors the reference behavior: a poll failure during
                    // opportunistic reaping is treated as terminal
                    // completion with the last exit result we actually
                    // observed, rather than surfaced as an error. This can
                    // duplicate an exit record across two job ids; see
                    // DESIGN.md.
                    self.running.remove(&id);
                    self.completed.insert(id, initial_exit);
                }
            }
        }
        Ok(())
    }

    /// Loops [`Self::wait_for_any_job_to_complete`] until `running` is
    /// empty.
    pub fn wait_for_all_jobs_to_complete(&mut self) -> Result<(), Error> {
        while !self.running.is_empty() {
            self.wait_for_any_job_to_complete()?;
        }
        Ok(())
    }

    pub fn status(&self, id: JobId) -> Option<ExitResult> {
        self.completed.get(&id).cloned()
    }

    pub fn completed(&self) -> impl Iterator<Item = (JobId, ExitResult)> + '_ {
        self.completed.iter().map(|(&id, &exit)| (id, exit))
    }

    /// Sends a kill signal to every still-running job. Does not wait;
    /// the caller is expected to reap via
    /// [`Self::wait_for_all_jobs_to_complete`].
    pub fn kill_all(&mut self) {
        for &handle in self.running.values() {
            process::kill(handle);
        }
    }

    fn find_running(&self, handle: ProcessHandle) -> Option<JobId> {
        self.running
            .iter()
            .find(|&(_, &h)| h == handle)
            .map(|(&id, _)| id)
    }
}

#[derive(Debug)]
pub enum Error {
    EmptyWaitSet,
    Process(process::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::EmptyWaitSet => write!(f, "wait_for_any_job_to_complete called on an empty pool"),
            Error::Process(ref err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::EmptyWaitSet => None,
            Error::Process(ref err) => Some(err),
        }
    }
}

impl From<process::Error> for Error {
    fn from(err: process::Error) -> Self {
        match err {
            process::Error::EmptyWaitSet => Error::EmptyWaitSet,
            other => Error::Process(other),
        }
    }
}
