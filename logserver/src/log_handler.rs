use log::warn;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;

use stampede_net::buffer::SegmentedBuffer;
use stampede_net::framing::{LOG_TERMINATOR, RECORD_TERMINATOR};

use crate::config::ServerConfig;
use crate::protocol::ProtocolHandler;

/// Accumulates XML log records streamed by a client and appends each
/// completed record to the log file. The protocol is write-only from the
/// client's perspective, so the response phase does nothing.
pub struct LogRecordHandler {
    config: Arc<ServerConfig>,
    buffer: SegmentedBuffer,
    flush_buffer: Vec<u8>,
}

impl LogRecordHandler {
    pub fn new(config: &Arc<ServerConfig>) -> Self {
        Self {
            buffer: SegmentedBuffer::new(config.buffer_size),
            flush_buffer: Vec::new(),
            config: config.clone(),
        }
    }

    /// Appends the accumulated record to the destination file and resets the
    /// buffer. The file is opened, written, flushed, and closed once per
    /// record; no open handle outlives the flush. A write failure discards
    /// the record rather than retrying, since retrying against a persistently
    /// failing disk would grow memory without bound.
    fn flush_record(&mut self) {
        let size = self.buffer.len();
        if self.flush_buffer.len() < size {
            // Sized past the immediate need so the next record of similar
            // size fits without reallocating.
            self.flush_buffer.resize(size + size / 4, 0);
        }
        self.buffer.copy_to_slice(0, &mut self.flush_buffer[..size]);

        let path = self.config.flush_path();
        match OpenOptions::new().append(true).create(true).open(&path) {
            Ok(mut file) => {
                let written = file
                    .write_all(&self.flush_buffer[..size])
                    .and_then(|_| file.flush());
                if let Err(e) = written {
                    warn!("Failed writing log record to {}: {}", path.display(), e);
                }
            }
            Err(e) => {
                warn!("Failed opening log file {}: {}", path.display(), e);
            }
        }

        self.buffer.clear();
    }
}

impl ProtocolHandler for LogRecordHandler {
    fn process_request(&mut self, data: &[u8]) -> io::Result<bool> {
        if !data.is_empty() {
            self.buffer.append(data);

            if !self.buffer.ends_with(RECORD_TERMINATOR) && !self.buffer.ends_with(LOG_TERMINATOR)
            {
                // Record not closed yet.
                return Ok(true);
            }
            self.flush_record();
        }
        Ok(false)
    }

    fn process_response(&mut self, _channel: &mut dyn Write) -> io::Result<bool> {
        Ok(false)
    }

    fn continue_response(&mut self, _channel: &mut dyn Write) -> io::Result<bool> {
        Ok(false)
    }

    fn request_pending(&self) -> bool {
        false
    }
}
