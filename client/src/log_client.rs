use std::fmt;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{SystemTime, UNIX_EPOCH};

use stampede_net::framing::{LOG_TERMINATOR, RECORD_TERMINATOR};

const STREAM_HEAD: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<log>\n";

/// Severity of a log record, mirroring the levels log consumers expect to
/// find in the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Severe,
    Warning,
    Info,
    Fine,
    Finer,
    Finest,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Severe => "SEVERE",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
            Level::Fine => "FINE",
            Level::Finer => "FINER",
            Level::Finest => "FINEST",
        };
        f.write_str(name)
    }
}

/// One log record to be sent to the server.
pub struct LogRecord<'a> {
    pub level: Level,
    pub logger: &'a str,
    pub message: &'a str,
}

impl<'a> LogRecord<'a> {
    pub fn new(level: Level, logger: &'a str, message: &'a str) -> Self {
        Self {
            level,
            logger,
            message,
        }
    }
}

/// A connection to the log server. The stream opens with the XML prologue,
/// carries one `<record>` element per log record, and ends with the closing
/// `</log>` tag.
pub struct LogClient {
    stream: TcpStream,
    sequence: u64,
}

impl LogClient {
    /// Connects and writes the stream head.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let mut stream = TcpStream::connect(addr)?;
        stream.write_all(STREAM_HEAD)?;
        Ok(Self {
            stream,
            sequence: 0,
        })
    }

    /// Formats and sends one record.
    pub fn send_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let formatted = self.format_record(record);
        self.sequence += 1;
        self.stream.write_all(formatted.as_bytes())?;
        self.stream.flush()
    }

    /// Sends bytes as-is. The caller is responsible for well-formed
    /// records; the server frames on the record terminator.
    pub fn send_raw(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()
    }

    /// Closes the log stream with the `</log>` tag and shuts the
    /// connection down.
    pub fn finish(mut self) -> io::Result<()> {
        self.stream.write_all(LOG_TERMINATOR)?;
        self.stream.flush()?;
        self.stream.shutdown(std::net::Shutdown::Write)
    }

    fn format_record(&self, record: &LogRecord) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut out = String::with_capacity(record.message.len() + 128);
        out.push_str("<record>\n");
        out.push_str(&format!("  <millis>{millis}</millis>\n"));
        out.push_str(&format!("  <sequence>{}</sequence>\n", self.sequence));
        out.push_str(&format!("  <logger>{}</logger>\n", escape(record.logger)));
        out.push_str(&format!("  <level>{}</level>\n", record.level));
        out.push_str(&format!("  <message>{}</message>\n", escape(record.message)));
        out.push_str("</record>\n");
        debug_assert!(out.as_bytes().ends_with(RECORD_TERMINATOR));
        out
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_escape_markup_in_messages() {
        assert_eq!(escape("a < b & c > \"d\""), "a &lt; b &amp; c &gt; &quot;d&quot;");
    }
}
