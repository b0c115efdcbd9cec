/// Expandable chunked byte buffer for accumulating partial socket reads
pub mod buffer;

/// Byte sequences that delimit XML-framed log records on the wire
pub mod framing;
