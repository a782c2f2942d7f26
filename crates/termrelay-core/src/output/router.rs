use std::io::{self, Write};
use std::time::Duration;

use tracing::debug;

use crate::chat::{ChatTransport, trim_for_chat};

use super::aggregator::DebouncedAggregator;
use super::chunker::AnsiSafeChunker;
use super::source::OutputSource;
use super::stripper::strip_ansi;

const READ_BUF_SIZE: usize = 8192;
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
const DEFAULT_MAX_BUFFERED: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Running,
    Draining,
    Stopped,
}

/// Drives an `OutputSource`: forks bytes to the local mirror and to a
/// sanitization pipeline that feeds the Debounced Aggregator and, on
/// flush, sends one chat message per batch.
pub struct OutputRouter {
    source: OutputSource,
    chunker: AnsiSafeChunker,
    aggregator: DebouncedAggregator<String>,
    mirror_enabled: bool,
    line_buffer: String,
    state: RouterState,
}

impl OutputRouter {
    pub fn new(source: OutputSource, mirror_enabled: bool) -> Self {
        Self {
            source,
            chunker: AnsiSafeChunker::new(),
            aggregator: DebouncedAggregator::new(DEFAULT_DEBOUNCE, DEFAULT_MAX_BUFFERED),
            mirror_enabled,
            line_buffer: String::new(),
            state: RouterState::Running,
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    /// Race a source read against the aggregator's debounce timer, whichever
    /// fires first, and handle it. The read future borrows only `self.source`
    /// (via the destructure below) so it can run concurrently with the
    /// flush future borrowing `self.aggregator` — callers just await this
    /// once per loop iteration rather than selecting two `&mut self` futures
    /// themselves.
    pub async fn tick(&mut self, transport: &dyn ChatTransport) -> io::Result<()> {
        let Self {
            source, aggregator, ..
        } = self;

        enum Event {
            Read(io::Result<([u8; READ_BUF_SIZE], usize)>),
            Flush(Vec<String>),
        }

        let event = tokio::select! {
            result = async {
                let mut buf = [0u8; READ_BUF_SIZE];
                let n = source.read_next(&mut buf).await?;
                Ok::<_, io::Error>((buf, n))
            } => Event::Read(result),
            batch = aggregator.wait_for_flush() => Event::Flush(batch),
        };

        match event {
            Event::Read(result) => {
                let (buf, n) = result?;
                self.handle_read(&buf[..n], transport).await?;
            }
            Event::Flush(batch) => {
                self.send_batch(batch, transport).await;
            }
        }

        Ok(())
    }

    async fn handle_read(&mut self, raw: &[u8], transport: &dyn ChatTransport) -> io::Result<()> {
        if raw.is_empty() {
            self.state = RouterState::Draining;
            self.flush_trailing_line();
            return Ok(());
        }

        if self.mirror_enabled {
            let mut stdout = io::stdout();
            stdout.write_all(raw)?;
            stdout.flush()?;
        }

        let safe_chunk = self.chunker.feed(raw);
        let stripped = strip_ansi(&safe_chunk);
        let text = String::from_utf8_lossy(&stripped);
        self.line_buffer.push_str(&text);

        let mut preempted_batch = None;
        while let Some(pos) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            let size = line.chars().count();
            if let Some(batch) = self.aggregator.push(line, size) {
                preempted_batch = Some(batch);
            }
        }

        if let Some(batch) = preempted_batch {
            self.send_batch(batch, transport).await;
        }

        Ok(())
    }

    fn flush_trailing_line(&mut self) {
        if !self.line_buffer.is_empty() {
            let size = self.line_buffer.chars().count();
            let line = std::mem::take(&mut self.line_buffer);
            self.aggregator.push(line, size);
        }
    }

    /// Best-effort final flush on cancellation or shutdown.
    pub async fn drain(&mut self, transport: &dyn ChatTransport) {
        self.flush_trailing_line();
        let batch = self.aggregator.drain();
        if !batch.is_empty() {
            self.send_batch(batch, transport).await;
        }
    }

    async fn send_batch(&mut self, batch: Vec<String>, transport: &dyn ChatTransport) {
        if batch.is_empty() {
            return;
        }
        let joined = batch.join("\n");
        let Some(message) = trim_for_chat(&joined) else {
            return;
        };
        if let Err(e) = transport.send(&message).await {
            debug!(event = "output.router.send_failed", error = %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatError;
    use std::sync::Mutex;

    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send(&self, text: &str) -> Result<(), ChatError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn recv(&self) -> Result<Option<crate::chat::InboundMessage>, ChatError> {
            Ok(None)
        }
    }

    fn file_source(path: &std::path::Path) -> OutputSource {
        OutputSource::File(super::super::source::FileTailer::new(path.to_path_buf()))
    }

    #[tokio::test]
    async fn draining_on_eof_flushes_trailing_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        std::fs::write(&path, b"no newline at all").unwrap();

        let transport = RecordingTransport {
            sent: Mutex::new(Vec::new()),
        };
        let mut router = OutputRouter::new(file_source(&path), false);
        router.tick(&transport).await.unwrap();

        // Wait long enough for the file tailer's internal poll to observe EOF.
        tokio::time::sleep(Duration::from_millis(250)).await;
        router.tick(&transport).await.unwrap();

        router.drain(&transport).await;
        let sent = transport.sent.lock().unwrap();
        assert!(sent.iter().any(|m| m.contains("no newline at all")));
    }
}
