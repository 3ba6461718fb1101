//! Sink that writes batches as JSON lines.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use super::{OutboundBatch, OutboundRecord, Sink, SinkError};

enum Output {
    Writer(Box<dyn Write + Send>),
    Buffer(Arc<Mutex<Vec<String>>>),
}

#[derive(Serialize)]
struct LogLine<'a> {
    stream: &'a str,
    batch: u64,
    #[serde(flatten)]
    record: &'a OutboundRecord,
}

/// A sink that writes every record as one JSON line to stdout, stderr, a
/// file, or an in-memory buffer.
///
/// Connection strings: `stdout://`, `stderr://`, `file://<path>` (appends).
pub struct LogSink {
    name: String,
    max_batch_bytes: usize,
    output: Output,
    batches_sent: u64,
}

impl LogSink {
    pub fn with_writer(
        name: impl Into<String>,
        max_batch_bytes: usize,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            name: name.into(),
            max_batch_bytes,
            output: Output::Writer(writer),
            batches_sent: 0,
        }
    }

    /// Collect lines into a shared buffer instead of writing them out.
    pub fn with_buffer(
        name: impl Into<String>,
        max_batch_bytes: usize,
        buffer: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            name: name.into(),
            max_batch_bytes,
            output: Output::Buffer(buffer),
            batches_sent: 0,
        }
    }

    /// Open the output named by a sink connection string.
    pub fn from_connection_string(
        connection: &str,
        name: impl Into<String>,
        max_batch_bytes: usize,
    ) -> Result<Self, SinkError> {
        let connection = connection.trim();
        let writer: Box<dyn Write + Send> = match connection {
            "stdout" | "stdout://" | "-" => Box::new(io::stdout()),
            "stderr" | "stderr://" => Box::new(io::stderr()),
            other => match other.strip_prefix("file://") {
                Some(path) if !path.is_empty() => Box::new(
                    OpenOptions::new().create(true).append(true).open(path)?,
                ),
                _ => return Err(SinkError::UnsupportedConnection(other.to_string())),
            },
        };
        Ok(Self::with_writer(name, max_batch_bytes, writer))
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }
}

impl Sink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_batch(&self) -> Result<OutboundBatch, SinkError> {
        Ok(OutboundBatch::new(self.max_batch_bytes))
    }

    fn send_batch(&mut self, batch: OutboundBatch) -> Result<(), SinkError> {
        let seq = self.batches_sent + 1;
        let lines = batch
            .records()
            .iter()
            .map(|record| {
                serde_json::to_string(&LogLine {
                    stream: &self.name,
                    batch: seq,
                    record,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        match &mut self.output {
            Output::Writer(writer) => {
                for line in &lines {
                    writeln!(writer, "{line}")?;
                }
                writer.flush()?;
            }
            Output::Buffer(buffer) => {
                buffer
                    .lock()
                    .map_err(|_| SinkError::BufferPoisoned)?
                    .extend(lines);
            }
        }

        self.batches_sent = seq;
        debug!(stream = %self.name, batch = seq, records = batch.count(), "batch written");
        Ok(())
    }
}
