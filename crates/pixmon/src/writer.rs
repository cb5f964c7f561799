//! Background writer for the append-only performance log
//!
//! All file I/O happens on one dedicated thread fed by a bounded queue.
//! Callers enqueue fully formatted lines and return immediately; a full
//! queue drops the line instead of blocking.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use chrono::Local;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};

/// Marker written when the log is first created
pub(crate) const STARTED_MARKER: &str = "=== Performance Log started ===";

/// Marker written after the log has been cleared
pub(crate) const CLEARED_MARKER: &str = "=== Log Cleared ===";

enum LogCommand {
    Append(String),
    Clear(String),
    Flush(oneshot::Sender<()>),
}

/// Prefix a message with the `[yyyy-MM-dd HH:mm:ss.mmm]` timestamp.
pub(crate) fn format_line(message: &str) -> String {
    format!(
        "[{}] {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        message
    )
}

/// Create a fresh log file named after `stem` in `dir`
///
/// Uses `stem.log`, or `stem_1.log`, `stem_2.log`, ... if that name is taken.
pub(crate) fn claim_log_file(dir: &Path, stem: &str) -> Result<PathBuf> {
    for attempt in 0u32.. {
        let name = if attempt == 0 {
            format!("{}.log", stem)
        } else {
            format!("{}_{}.log", stem, attempt)
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free performance log name",
    )))
}

/// Handle to the writer thread
pub(crate) struct LogWriter {
    tx: mpsc::Sender<LogCommand>,
    path: PathBuf,
    dropped: AtomicU64,
}

impl LogWriter {
    /// Start the writer thread for `path`
    pub fn spawn(path: PathBuf, capacity: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel(capacity);
        let worker_path = path.clone();

        thread::Builder::new()
            .name("pixmon-log".to_string())
            .spawn(move || run(worker_path, rx))?;

        Ok(Self {
            tx,
            path,
            dropped: AtomicU64::new(0),
        })
    }

    /// Writer whose queue is never drained, for exercising back pressure
    #[cfg(test)]
    fn undrained(path: PathBuf, capacity: usize) -> (Self, mpsc::Receiver<LogCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        let writer = Self {
            tx,
            path,
            dropped: AtomicU64::new(0),
        };
        (writer, rx)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a message. Never blocks; drops the line if the queue is full.
    pub fn append(&self, message: &str) {
        if let Err(e) = self.tx.try_send(LogCommand::Append(format_line(message))) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if let TrySendError::Closed(_) = e {
                debug!("Performance log writer closed, dropping line");
            }
        }
    }

    /// Queue a clear. Earlier lines are written before the file is removed.
    pub fn clear(&self) -> Result<()> {
        self.tx
            .try_send(LogCommand::Clear(format_line(CLEARED_MARKER)))
            .map_err(|e| match e {
                TrySendError::Full(_) => Error::QueueFull,
                TrySendError::Closed(_) => Error::Closed,
            })
    }

    /// Wait until every line queued before this call has been written
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(LogCommand::Flush(done_tx))
            .await
            .map_err(|_| Error::Closed)?;
        done_rx.await.map_err(|_| Error::Closed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn run(path: PathBuf, mut rx: mpsc::Receiver<LogCommand>) {
    let mut file: Option<File> = None;

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            LogCommand::Append(line) => write_line(&path, &mut file, &line),
            LogCommand::Clear(marker) => {
                file = None;
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => debug!("Failed to remove performance log {:?}: {}", path, e),
                }
                write_line(&path, &mut file, &marker);
            }
            LogCommand::Flush(done) => {
                if let Some(f) = file.as_mut() {
                    if let Err(e) = f.flush() {
                        debug!("Failed to flush performance log: {}", e);
                    }
                }
                let _ = done.send(());
            }
        }
    }
}

// Opens lazily so a deleted file is recreated on the next write.
fn write_line(path: &Path, file: &mut Option<File>, line: &str) {
    if file.is_none() {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => *file = Some(f),
            Err(e) => {
                debug!("Failed to open performance log {:?}: {}", path, e);
                return;
            }
        }
    }

    if let Some(f) = file.as_mut() {
        if let Err(e) = f.write_all(line.as_bytes()) {
            debug!("Failed to write performance log: {}", e);
            *file = None;
        }
    }
}
