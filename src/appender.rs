use std::io::{self, Write};
use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::log_event::LogEventHeader;

/// A destination for rendered log events.
///
/// Appenders are moved into the background writer and are only ever touched
/// from that thread. Errors and panics are contained by the writer: a failing
/// appender is reported through `tracing` and counted, and the other
/// appenders keep receiving events.
pub trait Appender: Send {
    /// Name used in diagnostics and shutdown errors.
    fn name(&self) -> &str;

    /// Writes one event. `message` is the rendered UTF-8 message text without
    /// prefix or line terminator.
    fn write_event(&mut self, header: &LogEventHeader, message: &[u8]) -> io::Result<()>;

    /// Called whenever the writer runs out of events to process.
    fn flush(&mut self) -> io::Result<()>;

    /// Called once during shutdown, after the final flush.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes the standard line layout:
///
/// `<yyyy-mm-dd> <HH:MM:SS.ffffff> - <thread id> - <LEVEL> - <logger> || <message>`
///
/// followed by a newline.
pub fn write_line<W: Write + ?Sized>(
    out: &mut W,
    header: &LogEventHeader,
    message: &[u8],
) -> io::Result<()> {
    let datetime = header.timestamp.to_datetime();
    write!(
        out,
        "{} - {} - {:<5} - {} || ",
        datetime.format("%Y-%m-%d %H:%M:%S%.6f"),
        header.thread_id,
        header.level,
        header.logger_name
    )?;
    out.write_all(message)?;
    out.write_all(b"\n")
}

/// Appender writing to standard output.
#[derive(Debug)]
pub struct ConsoleAppender {
    line: Vec<u8>,
}

impl ConsoleAppender {
    pub fn new() -> Self {
        Self {
            line: Vec::with_capacity(256),
        }
    }
}

impl Default for ConsoleAppender {
    fn default() -> Self {
        Self::new()
    }
}

impl Appender for ConsoleAppender {
    fn name(&self) -> &str {
        "console"
    }

    fn write_event(&mut self, header: &LogEventHeader, message: &[u8]) -> io::Result<()> {
        // One write per line so concurrent stdout users never split it.
        self.line.clear();
        write_line(&mut self.line, header, message)?;
        io::stdout().lock().write_all(&self.line)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Appender writing to a file that rolls over daily.
///
/// Files are named `<prefix>.<yyyy-mm-dd>.log` inside the given directory.
pub struct FileAppender {
    name: String,
    writer: RollingFileAppender,
}

impl FileAppender {
    /// Opens (or creates) today's file under `directory`.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created or the file cannot be
    /// opened.
    pub fn daily(directory: impl AsRef<Path>, prefix: &str) -> io::Result<Self> {
        let writer = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .build(directory.as_ref())
            .map_err(io::Error::other)?;
        Ok(Self {
            name: format!("file:{}", prefix),
            writer,
        })
    }
}

impl Appender for FileAppender {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_event(&mut self, header: &LogEventHeader, message: &[u8]) -> io::Result<()> {
        write_line(&mut self.writer, header, message)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efficient_clock::EventClock;
    use crate::level::Level;
    use crate::string_registry::intern;

    #[test]
    fn test_line_layout() {
        let header = LogEventHeader::new(EventClock::new().now(), Level::Warn, intern("app.net"), 7);
        let mut out = Vec::new();
        write_line(&mut out, &header, b"connection lost").unwrap();
        let line = String::from_utf8(out).unwrap();

        assert!(line.ends_with(" - 7 - WARN  - app.net || connection lost\n"));
        let (date, rest) = line.split_once(' ').unwrap();
        assert_eq!(date.len(), 10);
        assert_eq!(&date[4..5], "-");
        let time = rest.split(' ').next().unwrap();
        assert_eq!(time.len(), "HH:MM:SS.ffffff".len());
    }
}
