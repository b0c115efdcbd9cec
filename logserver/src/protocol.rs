use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use stampede_net::framing::{max_header_len, HEADERS};

use crate::config::ServerConfig;
use crate::log_handler::LogRecordHandler;

/// Stream-based protocol handlers all follow the same per-turn lifecycle:
/// `process_request` one or more times, then `process_response`,
/// `continue_response` zero or more times, and finally `request_pending`.
/// This allows a handler to perform multiple read-write exchanges before the
/// whole interaction is done. One handler instance is attached to each
/// connection for its entire lifetime.
pub trait ProtocolHandler: Send {
    /// Consumes newly read bytes. Returns true while the current unit of
    /// work is incomplete and more reads are needed.
    fn process_request(&mut self, data: &[u8]) -> io::Result<bool>;

    /// Creates and writes the response. Returns true if and only if the
    /// non-blocking channel could not take the whole response.
    fn process_response(&mut self, channel: &mut dyn Write) -> io::Result<bool>;

    /// Continues an incomplete response write. Returns true while response
    /// bytes remain unwritten.
    fn continue_response(&mut self, channel: &mut dyn Write) -> io::Result<bool>;

    /// Whether the handler expects another request within this turn.
    fn request_pending(&self) -> bool;
}

/// Outcome of sniffing the first bytes of a connection.
#[derive(Debug, PartialEq, Eq)]
pub enum Detection {
    /// Too few bytes to tell the candidate headers apart yet.
    Insufficient,
    /// Index into [`HEADERS`] of the uniquely surviving candidate.
    Match(usize),
}

/// No candidate header matches the connection's first bytes. The connection
/// is closed as speaking an unsupported protocol.
#[derive(Debug, PartialEq, Eq)]
pub struct UnsupportedProtocol;

impl fmt::Display for UnsupportedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data does not match any protocol header")
    }
}

/// Simultaneous prefix elimination over the candidate headers: every
/// candidate is compared position by position against the bytes seen so far
/// and eliminated at its first mismatch. Detection succeeds as soon as
/// exactly one candidate survives, which can happen well before its full
/// header has been consumed.
pub fn detect(data: &[u8]) -> Result<Detection, UnsupportedProtocol> {
    let mut alive = [true; HEADERS.len()];
    let relevant = data.len().min(max_header_len());
    for (pos, &byte) in data[..relevant].iter().enumerate() {
        for (candidate, header) in HEADERS.iter().enumerate() {
            if alive[candidate] && pos < header.len() && header[pos] != byte {
                alive[candidate] = false;
            }
        }
    }

    let mut survivor = None;
    let mut survivors = 0;
    for (candidate, &is_alive) in alive.iter().enumerate() {
        if is_alive {
            survivor = Some(candidate);
            survivors += 1;
        }
    }

    match (survivors, survivor) {
        (0, _) => Err(UnsupportedProtocol),
        (1, Some(index)) => Ok(Detection::Match(index)),
        _ => Ok(Detection::Insufficient),
    }
}

/// Builds the handler for a detected header. Every recognized header is
/// currently served by the log record handler.
pub fn create_handler(
    _header_index: usize,
    config: &Arc<ServerConfig>,
) -> Box<dyn ProtocolHandler> {
    Box::new(LogRecordHandler::new(config))
}
