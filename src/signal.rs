use nix::sys::signal::{self, SigHandler, SigSet, Signal};

extern "C" fn ignore_sigchld(_: libc::c_int) {}

/// Installs an empty SIGCHLD handler and blocks the signal.
///
/// On most platforms, the default disposition of SIGCHLD is to be
/// ignored, which means the kernel never queues it for delivery -- a
/// subsequent blocking `sigwait` would hang forever. Installing any
/// handler (even a no-op one) switches the disposition so the signal is
/// queued once blocked, letting [`wait_for_sigchld`] observe it
/// synchronously instead of busy-polling.
///
/// Must be called once, before the first child is dispatched.
pub fn install_handler() -> nix::Result<()> {
    let action = signal::SigAction::new(
        SigHandler::Handler(ignore_sigchld),
        signal::SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGCHLD, &action) }?;
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set.thread_block()?;
    Ok(())
}

/// Blocks until SIGCHLD is pending, then consumes it.
///
/// Requires [`install_handler`] to have been called first.
pub fn wait_for_sigchld() -> nix::Result<()> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    loop {
        match set.wait() {
            Ok(_) => return Ok(()),
            Err(nix::errno::Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }
}
