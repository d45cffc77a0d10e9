//! sink.rs
//! Destinations a channel publisher forwards to.
//! - `VisualizationChannel` (transport.rs): live clients
//! - `LogSink`: append-only CSV log on disk, one file per topic

use std::{
    fs::{File, OpenOptions, create_dir_all},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use csv::{Writer, WriterBuilder};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::publish::queue::OutboundMessage;

/// Rows written between explicit flushes of a log file.
const FLUSH_EVERY_ROWS: usize = 64;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("log write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink closed")]
    Closed,
}

pub trait Sink: Send {
    /// Human-readable destination, used in log lines.
    fn describe(&self) -> String;

    fn publish(&mut self, msg: &OutboundMessage) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn publish(&mut self, msg: &OutboundMessage) -> Result<(), SinkError> {
        (**self).publish(msg)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// One row of a persisted channel log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub log_time_ns: u64,
    pub topic: String,
    pub payload_b64: String,
}

impl LogRow {
    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.payload_b64)
    }
}

pub struct LogSink {
    topic: String,
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
    rows_since_flush: usize,
}

impl LogSink {
    /// Create `<dir>/<session>_<topic>.csv`, appending if it already exists.
    pub fn create(dir: &Path, session: &str, topic: &str) -> Result<Self, SinkError> {
        create_dir_all(dir)?;
        let path = dir.join(format!("{}_{}.csv", session, sanitize_topic(topic)));
        let fresh = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(BufWriter::new(file));

        debug!("[LogSink] {} -> {}", topic, path.display());
        Ok(Self {
            topic: topic.to_string(),
            path,
            writer,
            rows_since_flush: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for LogSink {
    fn describe(&self) -> String {
        format!("log:{}", self.path.display())
    }

    fn publish(&mut self, msg: &OutboundMessage) -> Result<(), SinkError> {
        self.writer.serialize(LogRow {
            log_time_ns: msg.log_time_ns,
            topic: self.topic.clone(),
            payload_b64: BASE64.encode(&msg.payload),
        })?;

        self.rows_since_flush += 1;
        // Batch flushing keeps syscall jitter off the publisher thread.
        if self.rows_since_flush >= FLUSH_EVERY_ROWS {
            self.writer.flush()?;
            self.rows_since_flush = 0;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.rows_since_flush = 0;
        Ok(())
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Read back every row of a channel log.
pub fn read_log(path: &Path) -> Result<Vec<LogRow>, SinkError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// "/TOM/location" -> "TOM_location"
pub fn sanitize_topic(topic: &str) -> String {
    topic
        .trim_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
