//! PTY allocation and child process spawning.
//!
//! Isolates the `unsafe` fork/exec code from the rest of the bridge.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::Path;

use nix::libc;
use nix::pty::{Winsize, openpty};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, execv, fork, setsid};

use crate::errors::SpawnError;

/// A spawned child process with its PTY master fd.
pub struct ChildProcess {
    pub pid: Pid,
    pub master: OwnedFd,
}

/// Spawn `command` on a new PTY sized to `winsize`.
///
/// Allocates a PTY pair, forks, makes the slave the child's controlling
/// terminal, and execs the command. The master fd comes back non-blocking
/// for use with `tokio::io::unix::AsyncFd`.
///
/// # Safety
///
/// Uses `fork()` internally. Only async-signal-safe operations run in the
/// child branch between fork and exec/exit.
pub fn spawn_child(command: &[String], winsize: &Winsize) -> Result<ChildProcess, SpawnError> {
    if command.is_empty() {
        return Err(SpawnError::NotFound {
            program: String::new(),
        });
    }

    let resolved = resolve_program(&command[0])?;

    let c_args: Vec<CString> = command
        .iter()
        .enumerate()
        .map(|(i, s)| CString::new(s.as_bytes()).map_err(|_| SpawnError::NulArgument { index: i }))
        .collect::<Result<Vec<_>, _>>()?;

    let pty = openpty(Some(winsize), None).map_err(|source| SpawnError::OpenPty { source })?;
    let master = pty.master;
    let slave = pty.slave;

    nix::fcntl::fcntl(
        &master,
        nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK),
    )
    .map_err(|source| SpawnError::OpenPty { source })?;

    // SAFETY: between fork() and exec()/_exit(), only async-signal-safe
    // calls run. Everything that allocates happens before fork.
    match unsafe { fork() }.map_err(|source| SpawnError::Fork { source })? {
        ForkResult::Parent { child } => {
            drop(slave);
            Ok(ChildProcess { pid: child, master })
        }
        ForkResult::Child => {
            drop(master);

            if setsid().is_err() {
                unsafe { libc::_exit(1) };
            }

            let slave_fd = slave.as_raw_fd();
            if unsafe { libc::ioctl(slave_fd, libc::TIOCSCTTY, 0) } < 0 {
                unsafe { libc::_exit(1) };
            }

            if unsafe { libc::dup2(slave_fd, 0) } < 0
                || unsafe { libc::dup2(slave_fd, 1) } < 0
                || unsafe { libc::dup2(slave_fd, 2) } < 0
            {
                unsafe { libc::_exit(1) };
            }

            if slave_fd > 2 {
                drop(slave);
            } else {
                std::mem::forget(slave);
            }

            for fd in 3..1024 {
                unsafe { libc::close(fd) };
            }

            let _ = execv(&resolved, &c_args);
            unsafe { libc::_exit(127) };
        }
    }
}

/// Resolve `program` to an executable path. Names containing a `/` are used
/// as-is. Bare names are searched on `PATH` plus the current working
/// directory, since a target program is often a local script the caller
/// just built; `which_in` covers both in one search list.
fn resolve_program(program: &str) -> Result<CString, SpawnError> {
    if program.contains('/') {
        return CString::new(program.as_bytes()).map_err(|_| SpawnError::NulArgument { index: 0 });
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf());
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let mut search_dirs: Vec<_> = std::env::split_paths(&path_var).collect();
    search_dirs.push(cwd.clone());
    let search_path =
        std::env::join_paths(&search_dirs).map_err(|_| SpawnError::NotFound {
            program: program.to_string(),
        })?;

    let resolved = which::which_in(program, Some(search_path), &cwd).map_err(|_| SpawnError::NotFound {
        program: program.to_string(),
    })?;

    path_to_cstring(&resolved)
}

fn path_to_cstring(path: &Path) -> Result<CString, SpawnError> {
    CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| SpawnError::NulArgument { index: 0 })
}

/// Wait for the child to exit, blocking. Signal-terminated children report
/// `128 + signal` per shell convention.
pub fn wait_for_exit(pid: Pid) -> Result<i32, nix::Error> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG))? {
            WaitStatus::Exited(_, code) => return Ok(code),
            WaitStatus::Signaled(_, sig, _) => return Ok(128 + sig as i32),
            _ => std::thread::sleep(std::time::Duration::from_millis(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_winsize() -> Winsize {
        Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        }
    }

    #[test]
    fn empty_command_rejected() {
        let err = spawn_child(&[], &test_winsize()).unwrap_err();
        assert!(matches!(err, SpawnError::NotFound { .. }));
    }

    #[test]
    fn nul_byte_in_argument_rejected() {
        let cmd = vec!["echo".into(), "hello\0world".into()];
        let err = spawn_child(&cmd, &test_winsize()).unwrap_err();
        assert!(matches!(err, SpawnError::NulArgument { index: 1 }));
    }

    #[test]
    fn unresolvable_bare_name_rejected_before_fork() {
        let cmd = vec!["__termrelay_nonexistent_cmd_12345__".into()];
        let err = spawn_child(&cmd, &test_winsize()).unwrap_err();
        assert!(matches!(err, SpawnError::NotFound { .. }));
    }

    #[test]
    fn spawn_true_exits_zero() {
        let child = spawn_child(&["true".into()], &test_winsize()).unwrap();
        let code = wait_for_exit(child.pid).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn spawn_false_exits_nonzero() {
        let child = spawn_child(&["false".into()], &test_winsize()).unwrap();
        let code = wait_for_exit(child.pid).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn spawn_preserves_arguments() {
        let child = spawn_child(
            &[
                "sh".into(),
                "-c".into(),
                "echo $#".into(),
                "--".into(),
                "a".into(),
                "b".into(),
                "c".into(),
            ],
            &test_winsize(),
        )
        .unwrap();

        let mut buf = [0u8; 256];
        let mut output = Vec::new();
        loop {
            match nix::unistd::read(&child.master, &mut buf) {
                Ok(0) => break,
                Ok(n) => output.extend_from_slice(&buf[..n]),
                Err(nix::Error::EAGAIN) => {
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    if let Ok(WaitStatus::Exited(..)) =
                        waitpid(child.pid, Some(WaitPidFlag::WNOHANG))
                    {
                        while let Ok(n) = nix::unistd::read(&child.master, &mut buf) {
                            if n == 0 {
                                break;
                            }
                            output.extend_from_slice(&buf[..n]);
                        }
                        break;
                    }
                }
                Err(nix::Error::EIO) => break,
                Err(e) => panic!("read error: {e}"),
            }
        }

        let text = String::from_utf8_lossy(&output);
        assert!(text.contains('3'), "expected '3' in output, got {text:?}");
    }

    #[test]
    fn resolves_bare_name_on_path() {
        let resolved = resolve_program("true").unwrap();
        assert!(resolved.to_str().unwrap().ends_with("true"));
    }

    #[test]
    fn resolves_path_with_slash_unchanged() {
        let resolved = resolve_program("/bin/true").unwrap();
        assert_eq!(resolved.to_str().unwrap(), "/bin/true");
    }
}
