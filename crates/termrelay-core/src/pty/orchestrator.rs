//! Owns the child process and its PTY master: startup sizing, SIGWINCH
//! propagation, and the three-step shutdown sequence.

use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Duration;

use nix::libc;
use nix::pty::Winsize;
use nix::sys::signal::{self, Signal};
use nix::sys::termios::{FlushArg, tcflush};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tokio::signal::unix::{SignalKind, signal as tokio_signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::PtyError;

use super::child::{spawn_child, wait_for_exit};
use super::restore::restore_terminal;

/// Time allowed after SIGHUP before escalating to SIGTERM, and after
/// SIGTERM before escalating to SIGKILL.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
/// Settling delay before `tcflush`, so the child's in-flight mouse
/// tracking disable sequences have landed before we discard input.
const TCFLUSH_SETTLE: Duration = Duration::from_millis(50);

pub struct PtyOrchestrator {
    master: OwnedFd,
    child_pid: Pid,
    shutdown: CancellationToken,
}

impl PtyOrchestrator {
    /// Run the startup sequence: size the PTY to the host terminal, fork
    /// and exec `command` onto it.
    pub fn spawn(command: &[String]) -> Result<Self, PtyError> {
        let winsize = host_terminal_size();
        let child = spawn_child(command, &winsize)?;
        info!(event = "pty.orchestrator.spawned", pid = child.pid.as_raw(), ?command);
        Ok(Self {
            master: child.master,
            child_pid: child.pid,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn master(&self) -> &OwnedFd {
        &self.master
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Write `data` to the PTY master, retrying on `EINTR`/`EAGAIN`.
    pub fn write_input(&self, data: &[u8]) -> Result<(), PtyError> {
        nix_write_all(self.master.as_raw_fd(), data)
    }

    fn apply_winsize(&self) -> Result<(), PtyError> {
        let winsize = host_terminal_size();
        let fd = self.master.as_raw_fd();
        if unsafe { libc::ioctl(fd, libc::TIOCSWINSZ, &winsize) } < 0 {
            return Err(PtyError::ResizeFailed {
                source: nix::Error::last(),
            });
        }
        Ok(())
    }

    fn forward_signal(&self, sig: Signal) -> Result<(), PtyError> {
        // Negative pid targets the child's whole process group.
        signal::kill(Pid::from_raw(-self.child_pid.as_raw()), sig)
            .map_err(|source| PtyError::Wait { source })
    }

    /// Install SIGWINCH/SIGINT/SIGTERM handlers and run until the
    /// shutdown token is cancelled (by a signal, or by the caller on
    /// `/quit` or child exit). SIGWINCH re-reads the host size, applies
    /// it to the PTY, and forwards it to the child; SIGINT/SIGTERM just
    /// set the shutdown flag — the supervisor runs the actual sequence.
    pub async fn run_signal_loop(&self) -> Result<(), PtyError> {
        let mut sig_winch = tokio_signal(SignalKind::window_change()).map_err(io_to_wait)?;
        let mut sig_int = tokio_signal(SignalKind::interrupt()).map_err(io_to_wait)?;
        let mut sig_term = tokio_signal(SignalKind::terminate()).map_err(io_to_wait)?;

        loop {
            tokio::select! {
                _ = sig_winch.recv() => {
                    if let Err(e) = self.apply_winsize() {
                        warn!(event = "pty.orchestrator.resize_failed", error = %e);
                    }
                    if let Err(e) = self.forward_signal(Signal::SIGWINCH) {
                        warn!(event = "pty.orchestrator.winch_forward_failed", error = %e);
                    }
                }
                _ = sig_int.recv() => {
                    info!(event = "pty.orchestrator.sigint_received");
                    self.shutdown.cancel();
                }
                _ = sig_term.recv() => {
                    info!(event = "pty.orchestrator.sigterm_received");
                    self.shutdown.cancel();
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
        Ok(())
    }

    /// Wait for the child to exit on its own (PTY EOF already observed by
    /// the router) and report its code.
    pub fn reap(&self) -> Result<i32, PtyError> {
        wait_for_exit(self.child_pid).map_err(|source| PtyError::Wait { source })
    }

    fn is_alive(&self) -> bool {
        matches!(
            waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG)),
            Ok(WaitStatus::StillAlive)
        )
    }

    /// Run the shutdown sequence exactly once: SIGHUP, grace, SIGTERM,
    /// grace, SIGKILL if still alive; flush pending terminal input; then
    /// emit the fixed restoration sequence. Returns the child's exit code.
    pub async fn shutdown(&self) -> Result<i32, PtyError> {
        if self.is_alive() {
            let _ = self.forward_signal(Signal::SIGHUP);
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
        if self.is_alive() {
            let _ = self.forward_signal(Signal::SIGTERM);
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        }
        if self.is_alive() {
            let _ = self.forward_signal(Signal::SIGKILL);
        }

        tokio::time::sleep(TCFLUSH_SETTLE).await;
        let stdin_fd = unsafe { std::os::fd::BorrowedFd::borrow_raw(0) };
        let _ = tcflush(stdin_fd, FlushArg::TCIFLUSH);

        let exit_code = self.reap()?;
        restore_terminal();
        info!(event = "pty.orchestrator.shutdown_complete", exit_code);
        Ok(exit_code)
    }
}

/// Query the host terminal's size via `TIOCGWINSZ` on stdout; default to
/// 24x80 if the ioctl fails (e.g. output is redirected).
fn host_terminal_size() -> Winsize {
    let mut winsize = Winsize {
        ws_row: 24,
        ws_col: 80,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let ok = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut winsize) == 0 };
    if !ok || winsize.ws_row == 0 || winsize.ws_col == 0 {
        winsize.ws_row = 24;
        winsize.ws_col = 80;
    }
    winsize
}

fn nix_write_all(fd: std::os::fd::RawFd, mut data: &[u8]) -> Result<(), PtyError> {
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    while !data.is_empty() {
        match nix::unistd::write(borrowed, data) {
            Ok(n) => data = &data[n..],
            Err(nix::Error::EINTR) => continue,
            Err(nix::Error::EAGAIN) => std::thread::yield_now(),
            Err(source) => return Err(PtyError::Write {
                source: std::io::Error::from_raw_os_error(source as i32),
            }),
        }
    }
    Ok(())
}

fn io_to_wait(source: std::io::Error) -> PtyError {
    PtyError::Wait {
        source: nix::Error::from_i32(source.raw_os_error().unwrap_or(libc::EIO)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn winsize_24x80() -> Winsize {
        Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }

    #[tokio::test]
    async fn shutdown_reaps_already_exited_child() {
        let orch = PtyOrchestrator::spawn(&["true".to_string()]).unwrap();
        // Give the child a moment to exit on its own.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let code = orch.shutdown().await.unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn host_terminal_size_has_sane_defaults() {
        let ws = host_terminal_size();
        assert!(ws.ws_row > 0 && ws.ws_col > 0);
        let _ = winsize_24x80();
    }
}
