//! Wires the PTY orchestrator, output router, input translator, and chat
//! transport into the bridge's four long-lived tasks: output reader and
//! router, chat inbound handling, the aggregator's own flush timer (driven
//! inside the router), and the supervisor that watches for child exit or
//! the shutdown flag.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::{ChatTransport, InboundMessage};
use crate::errors::{BridgeError, PtyError};
use crate::input::{TranslateOutcome, translate};
use crate::output::{FileTailer, OutputRouter, OutputSource, PtyReader, RouterState};
use crate::pty::restore::{RawModeGuard, enable_raw_mode, install_panic_restore_hook};
use crate::pty::{PtyOrchestrator, restore_terminal};

const HELP_TEXT: &str = "\
termrelay commands:
  /quit                stop the target program and end the session
  /help                show this message
  /c /a /s <token>      stack Control/Alt/Shift onto the next token
  /enter /esc /t /b /d  Enter, Escape, Tab, Backspace, Delete
  /up /down /left /right  arrow keys
  /home /end /pageup /pagedown /insert
  /f1 .. /f12           function keys
anything else is sent as literal text, followed by Enter unless disabled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    ChildExited(i32),
    Quit,
}

pub struct Session {
    orchestrator: Arc<PtyOrchestrator>,
    router: OutputRouter,
    transport: Arc<dyn ChatTransport>,
    authorized_chat_id: i64,
    inject_enter: bool,
    _raw_guard: RawModeGuard,
    mirror_drain: Option<tokio::task::JoinHandle<()>>,
}

impl Session {
    pub fn new(
        program: &[String],
        output_stream: Option<PathBuf>,
        mirror_enabled: bool,
        inject_enter: bool,
        authorized_chat_id: i64,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, BridgeError> {
        install_panic_restore_hook();

        let orchestrator = Arc::new(PtyOrchestrator::spawn(program)?);
        let raw_guard = enable_raw_mode()?;

        let (source, router_mirror, mirror_drain) = match output_stream {
            Some(path) => {
                let source = OutputSource::File(FileTailer::new(path));
                let handle = spawn_mirror_drain(
                    Arc::clone(&orchestrator),
                    mirror_enabled,
                    orchestrator.shutdown_token(),
                );
                (source, false, Some(handle))
            }
            None => {
                let reader = PtyReader::new(orchestrator.master())
                    .map_err(|source| PtyError::Read { source })?;
                (OutputSource::Pty(reader), mirror_enabled, None)
            }
        };

        let router = OutputRouter::new(source, router_mirror);

        Ok(Self {
            orchestrator,
            router,
            transport,
            authorized_chat_id,
            inject_enter,
            _raw_guard: raw_guard,
            mirror_drain,
        })
    }

    pub async fn run(mut self) -> Result<SessionOutcome, BridgeError> {
        let shutdown = self.orchestrator.shutdown_token();
        let signal_orch = Arc::clone(&self.orchestrator);
        let signal_task = tokio::spawn(async move {
            if let Err(e) = signal_orch.run_signal_loop().await {
                warn!(event = "session.signal_loop_failed", error = %e);
            }
        });

        let mut quit_requested = false;

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match self.router.state() {
                RouterState::Running => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = self.router.tick(self.transport.as_ref()) => {
                            if let Err(e) = result {
                                warn!(event = "session.router_tick_failed", error = %e);
                                shutdown.cancel();
                            }
                            if self.router.state() != RouterState::Running {
                                // PTY EOF with no -o: that is the child exiting normally.
                                shutdown.cancel();
                            }
                        }
                        inbound = self.transport.recv() => {
                            self.handle_inbound(inbound, &shutdown, &mut quit_requested).await;
                            if quit_requested {
                                break;
                            }
                        }
                    }
                }
                _ => break,
            }
        }

        self.router.drain(self.transport.as_ref()).await;
        signal_task.abort();
        if let Some(handle) = self.mirror_drain.take() {
            handle.abort();
        }

        let exit_code = self.orchestrator.shutdown().await?;

        let goodbye = if quit_requested {
            "Session stopped by /quit.".to_string()
        } else {
            format!("Session ended (exit code {exit_code}).")
        };
        if let Err(e) = self.transport.send(&goodbye).await {
            debug!(event = "session.goodbye_send_failed", error = %e);
        }

        info!(event = "session.ended", exit_code, quit_requested);
        if quit_requested {
            Ok(SessionOutcome::Quit)
        } else {
            Ok(SessionOutcome::ChildExited(exit_code))
        }
    }

    async fn handle_inbound(
        &self,
        inbound: Result<Option<InboundMessage>, crate::errors::ChatError>,
        shutdown: &CancellationToken,
        quit_requested: &mut bool,
    ) {
        let msg = match inbound {
            Ok(Some(msg)) => msg,
            Ok(None) => return,
            Err(e) => {
                warn!(event = "session.chat_recv_failed", error = %e);
                shutdown.cancel();
                return;
            }
        };

        if msg.chat_id != self.authorized_chat_id {
            debug!(event = "session.unauthorized_sender", chat_id = msg.chat_id);
            return;
        }

        match translate(&msg.text, self.inject_enter) {
            TranslateOutcome::Quit => {
                *quit_requested = true;
                shutdown.cancel();
            }
            TranslateOutcome::Help => {
                if let Err(e) = self.transport.send(HELP_TEXT).await {
                    debug!(event = "session.help_send_failed", error = %e);
                }
            }
            TranslateOutcome::Keystrokes { writes } => {
                for write in writes {
                    if write.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.orchestrator.write_input(&write) {
                        warn!(event = "session.pty_write_failed", error = %e);
                        shutdown.cancel();
                        break;
                    }
                }
            }
        }
    }
}

fn spawn_mirror_drain(
    orchestrator: Arc<PtyOrchestrator>,
    mirror_enabled: bool,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut source = match PtyReader::new(orchestrator.master()) {
            Ok(reader) => OutputSource::Pty(reader),
            Err(e) => {
                warn!(event = "session.mirror_drain_setup_failed", error = %e);
                return;
            }
        };
        let mut buf = [0u8; 8192];
        loop {
            match source.read_next(&mut buf).await {
                Ok(0) => {
                    shutdown.cancel();
                    return;
                }
                Ok(n) => {
                    if mirror_enabled {
                        let mut stdout = std::io::stdout();
                        if stdout.write_all(&buf[..n]).is_err() || stdout.flush().is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(event = "session.mirror_drain_read_failed", error = %e);
                    shutdown.cancel();
                    return;
                }
            }
        }
    })
}

impl Drop for Session {
    fn drop(&mut self) {
        restore_terminal();
    }
}
