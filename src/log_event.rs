use crate::argument::TypeTag;
use crate::decoder::ArgumentDecoder;
use crate::efficient_clock::Timestamp;
use crate::encoder::ArgumentEncoder;
use crate::level::Level;
use crate::string_registry::LoggerName;

/// Metadata describing one log event.
///
/// Written by the producer when it claims a slot and immutable once the event
/// is published. Appenders receive it alongside the rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEventHeader {
    pub timestamp: Timestamp,
    pub level: Level,
    /// Interned logger id; see [`string_registry`](crate::string_registry).
    pub logger_id: u32,
    pub logger_name: &'static str,
    pub thread_id: u64,
    /// Set when at least one argument did not fit in the event buffer.
    pub truncated: bool,
}

impl LogEventHeader {
    pub fn new(timestamp: Timestamp, level: Level, logger: LoggerName, thread_id: u64) -> Self {
        Self {
            timestamp,
            level,
            logger_id: logger.id,
            logger_name: logger.name,
            thread_id,
            truncated: false,
        }
    }

    fn empty() -> Self {
        Self {
            timestamp: Timestamp::default(),
            level: Level::Trace,
            logger_id: 0,
            logger_name: "",
            thread_id: 0,
            truncated: false,
        }
    }
}

/// A pooled, reusable log record.
///
/// The byte buffer is allocated once, when the event pool is created, with
/// one byte more than the configured capacity so the `End` terminator always
/// fits after a completely full argument list.
#[derive(Debug)]
pub struct LogEvent {
    header: LogEventHeader,
    template: Option<&'static str>,
    buffer: Box<[u8]>,
    len: usize,
    abandoned: bool,
}

impl LogEvent {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut buffer = vec![0u8; capacity + 1].into_boxed_slice();
        buffer[0] = TypeTag::End as u8;
        Self {
            header: LogEventHeader::empty(),
            template: None,
            buffer,
            len: 0,
            abandoned: false,
        }
    }

    /// Prepares a recycled event for a new log call.
    pub(crate) fn reset(&mut self, header: LogEventHeader, template: Option<&'static str>) {
        self.header = header;
        self.template = template;
        self.len = 0;
        self.abandoned = false;
    }

    /// Runs `encode` against the argument area, continuing from the current
    /// cursor.
    pub(crate) fn append<F>(&mut self, encode: F)
    where
        F: FnOnce(&mut ArgumentEncoder<'_>),
    {
        let capacity = self.capacity();
        let mut encoder =
            ArgumentEncoder::resume(&mut self.buffer[..capacity], self.len, self.header.truncated);
        encode(&mut encoder);
        let (len, truncated) = encoder.finish();
        self.len = len;
        self.header.truncated = truncated;
    }

    /// Writes the terminator. Called right before the event is published.
    pub(crate) fn seal(&mut self, abandoned: bool) {
        self.buffer[self.len] = TypeTag::End as u8;
        self.abandoned = abandoned;
    }

    pub fn header(&self) -> &LogEventHeader {
        &self.header
    }

    pub fn template(&self) -> Option<&'static str> {
        self.template
    }

    /// Encoded arguments including the trailing `End` tag.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..=self.len]
    }

    /// Encoded argument bytes, excluding the terminator.
    pub fn encoded_len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }

    pub fn is_truncated(&self) -> bool {
        self.header.truncated
    }

    /// True when the producer dropped its builder without logging it.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn arguments(&self) -> ArgumentDecoder<'_> {
        ArgumentDecoder::new(self.payload())
    }
}
