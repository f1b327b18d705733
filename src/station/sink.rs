use std::path::Path;

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{Error, Result};

/// Append-only event log fed from the slot loop
///
/// Lines go through one bounded channel to a single writer task, so they land
/// in the order they were fed. Feeding never waits: when the buffer is full
/// the line is dropped and counted.
pub struct EventSink<W> {
    /// Sending half, `None` once stopped
    tx: Option<mpsc::Sender<String>>,
    /// Writer task, `None` once stopped
    task: Option<JoinHandle<std::io::Result<W>>>,
    /// Writer handed back by the stopped task
    writer: Option<W>,
    /// Lines lost to a full buffer
    dropped: u64,
}

impl EventSink<File> {
    /// Opens `sink-{team}-{station}.log` in `dir` for appending
    pub async fn open(dir: &Path, team: u32, station: u32, capacity: usize) -> Result<Self> {
        fs::create_dir_all(dir).await?;

        let path = dir.join(format!("sink-{}-{}.log", team, station));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "event sink opened");

        Ok(Self::start(file, capacity))
    }
}

impl<W> EventSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Spawns the writer task
    pub fn start(writer: W, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(write_lines(rx, writer));

        EventSink {
            tx: Some(tx),
            task: Some(task),
            writer: None,
            dropped: 0,
        }
    }

    /// Queues one line without waiting
    pub fn feed(&mut self, line: impl Into<String>) {
        let Some(tx) = &self.tx else {
            warn!("event sink fed after stop");
            return;
        };

        match tx.try_send(line.into()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                warn!(dropped = self.dropped, "event sink full, line dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
                warn!("event sink writer is gone, line dropped");
            }
        }
    }

    /// Lines dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether the sink still accepts lines
    pub fn is_running(&self) -> bool {
        self.tx.is_some()
    }

    /// Writes out every queued line and releases the writer
    ///
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        drop(self.tx.take());

        if let Some(task) = self.task.take() {
            let writer = task
                .await
                .map_err(|e| Error::sink(format!("writer task failed: {}", e)))??;
            self.writer = Some(writer);
        }

        Ok(())
    }

    /// Writer, once the sink has been stopped
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }
}

async fn write_lines<W>(mut rx: mpsc::Receiver<String>, mut writer: W) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    writer.flush().await?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_lines_written_in_order() {
        let mut sink = EventSink::start(Vec::new(), 8);
        for i in 0..5 {
            sink.feed(format!("line {}", i));
        }

        assert_ok!(sink.stop().await);
        assert!(!sink.is_running());

        let written = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(written, "line 0\nline 1\nline 2\nline 3\nline 4\n");
    }

    #[tokio::test]
    async fn test_full_buffer_drops() {
        // Current-thread runtime: the writer cannot run until we yield
        let mut sink = EventSink::start(Vec::new(), 2);
        for i in 0..5 {
            sink.feed(format!("line {}", i));
        }
        assert_eq!(sink.dropped(), 3);

        assert_ok!(sink.stop().await);
        let written = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(written, "line 0\nline 1\n");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut sink = EventSink::start(Vec::new(), 4);
        sink.feed("only");
        assert_ok!(sink.stop().await);
        assert_ok!(sink.stop().await);

        sink.feed("late");
        assert_eq!(sink.dropped(), 0);
        assert_eq!(sink.into_inner().unwrap(), b"only\n");
    }

    #[tokio::test]
    async fn test_open_appends_to_file() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("tdma-sink-{}", nanos));

        for round in 0..2 {
            let mut sink = EventSink::open(&dir, 17, 3, 4).await.unwrap();
            sink.feed(format!("round {}", round));
            sink.stop().await.unwrap();
        }

        let content = tokio::fs::read_to_string(dir.join("sink-17-3.log")).await.unwrap();
        assert_eq!(content, "round 0\nround 1\n");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
