use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

const FILE_TAIL_READ_SIZE: usize = 8192;
const FILE_TAIL_FALLBACK_POLL: Duration = Duration::from_millis(200);

/// Non-owning wrapper so the PTY master fd can be handed to `AsyncFd`
/// without `AsyncFd` taking ownership (the orchestrator needs the raw fd
/// for writes and signal-driven resizes too).
struct BorrowedRawFd(RawFd);

impl AsRawFd for BorrowedRawFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Async wrapper around the PTY master descriptor.
pub struct PtyReader {
    async_fd: AsyncFd<BorrowedRawFd>,
}

impl PtyReader {
    pub fn new(master: &OwnedFd) -> io::Result<Self> {
        Ok(Self {
            async_fd: AsyncFd::new(BorrowedRawFd(master.as_raw_fd()))?,
        })
    }

    async fn read_next(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.async_fd.readable().await?;
            match guard.try_io(|inner| nix_read(inner.as_raw_fd(), buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

fn nix_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: fd is the PTY master, owned by the orchestrator for the
    // lifetime of the session and outliving this borrow.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    match nix::unistd::read(borrowed, buf) {
        Ok(n) => Ok(n),
        Err(nix::Error::EIO) => Ok(0), // child exited; treat like EOF
        Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
    }
}

/// Tails an external log file: seeks to end on start, then watches for
/// appends, truncation, and rotation.
pub struct FileTailer {
    path: PathBuf,
    position: u64,
    inode: u64,
    _watcher: Option<RecommendedWatcher>,
    events_rx: Option<std::sync::mpsc::Receiver<notify::Result<notify::Event>>>,
}

impl FileTailer {
    pub fn new(path: PathBuf) -> Self {
        let (tx, events_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .ok();

        if let Some(w) = watcher.as_mut() {
            if let Err(e) = w.watch(&path, RecursiveMode::NonRecursive) {
                warn!(
                    event = "output.file_tailer.watch_failed",
                    path = %path.display(),
                    error = %e,
                    "falling back to periodic polling",
                );
                watcher = None;
            }
        }

        let (position, inode) = match std::fs::metadata(&path) {
            Ok(metadata) => (metadata.len(), metadata.ino()),
            Err(_) => (0, 0),
        };

        let events_rx = if watcher.is_some() { Some(events_rx) } else { None };

        Self {
            path,
            position,
            inode,
            _watcher: watcher,
            events_rx,
        }
    }

    async fn read_next(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wait_for_activity().await;

        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(_) => return Ok(0), // missing file yields empty reads
        };

        let current_inode = metadata.ino();
        let current_size = metadata.len();

        if current_inode != self.inode || current_size < self.position {
            debug!(
                event = "output.file_tailer.rotation_detected",
                path = %self.path.display(),
            );
            self.inode = current_inode;
            self.position = 0;
        }

        if current_size <= self.position {
            return Ok(0);
        }

        let mut file = std::fs::File::open(&self.path)?;
        use std::io::{Read, Seek, SeekFrom};
        file.seek(SeekFrom::Start(self.position))?;

        let to_read = buf.len().min(FILE_TAIL_READ_SIZE).min((current_size - self.position) as usize);
        let n = file.read(&mut buf[..to_read])?;
        self.position += n as u64;
        Ok(n)
    }

    async fn wait_for_activity(&mut self) {
        let deadline = tokio::time::Instant::now() + FILE_TAIL_FALLBACK_POLL;
        loop {
            if let Some(rx) = &self.events_rx
                && rx.try_recv().is_ok()
            {
                while rx.try_recv().is_ok() {}
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// A uniform producer of output bytes, realized as a tagged variant rather
/// than a class hierarchy, per the design's "polymorphic Output Source"
/// note.
pub enum OutputSource {
    Pty(PtyReader),
    File(FileTailer),
}

impl OutputSource {
    pub async fn read_next(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            OutputSource::Pty(reader) => reader.read_next(buf).await,
            OutputSource::File(tailer) => tailer.read_next(buf).await,
        }
    }
}
