/*
Log records travel over TCP as a stream of XML fragments. There is no
length prefix; a record is complete when its last bytes are one of the
closing markers below, line feed included. The opening patterns are what
the server sniffs on a new connection to pick a protocol handler.
*/

/// Start of a plain log record.
pub const RECORD_OPEN: &[u8] = b"<record>";

/// Start of a full XML document, sent by clients that open with a declaration.
pub const XML_DECLARATION: &[u8] = b"<?xml";

/// A bare log-close tag, sent when a client finishes its log stream.
pub const LOG_CLOSE: &[u8] = b"</log>";

/// Marks the end of one complete record. Byte exact, including the line feed.
pub const RECORD_TERMINATOR: &[u8] = b"</record>\n";

/// Marks the end of the whole log stream. Byte exact, including the line feed.
pub const LOG_TERMINATOR: &[u8] = b"</log>\n";

/// All recognized connection-opening patterns, in handler order.
pub const HEADERS: [&[u8]; 3] = [RECORD_OPEN, XML_DECLARATION, LOG_CLOSE];

/// Length of the longest recognized header.
pub fn max_header_len() -> usize {
    HEADERS.iter().fold(0, |max, header| max.max(header.len()))
}
