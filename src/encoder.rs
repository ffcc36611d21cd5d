use std::fmt::{self, Write as _};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::argument::{LogArg, TypeTag};
use crate::type_registry::{type_id_of, unmanaged_bytes, LogEnum, Unmanaged};

/// Producer-side encoding of log arguments into a fixed-capacity buffer.
///
/// Every argument is written as a `(TypeTag, payload)` pair at the cursor.
/// Nothing here allocates: the buffer belongs to a pooled log event and type
/// ids are computed from `TypeId`.
///
/// # Overflow
///
/// An argument that does not fit entirely in the remaining capacity is not
/// written. The encoder is marked truncated and every later append is
/// ignored, so the bytes already written always form a complete, decodable
/// argument list. The one exception is [`append_fmt`](Self::append_fmt),
/// whose length is not known up front: it keeps as much text as fits.
///
/// # Examples
///
/// ```
/// # use zero_alloc_logger::encoder::ArgumentEncoder;
/// let mut buffer = [0u8; 10];
/// let mut encoder = ArgumentEncoder::new(&mut buffer);
/// encoder.append_i32(1);
/// encoder.append_i32(2);
/// assert_eq!(encoder.position(), 10);
/// assert!(!encoder.is_truncated());
///
/// encoder.append_bool(true);
/// assert!(encoder.is_truncated());
/// assert_eq!(encoder.position(), 10);
/// ```
pub struct ArgumentEncoder<'a> {
    buffer: &'a mut [u8],
    pos: usize,
    truncated: bool,
}

macro_rules! fixed_appenders {
    ($($method:ident($ty:ty) => $tag:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $method(&mut self, value: $ty) {
                self.put_fixed(TypeTag::$tag, value.to_le_bytes());
            }
        )*
    };
}

impl<'a> ArgumentEncoder<'a> {
    /// Creates an encoder writing from the start of `buffer`. The buffer
    /// length is the encoding capacity.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self::resume(buffer, 0, false)
    }

    /// Continues encoding into `buffer` from a previously saved cursor.
    pub fn resume(buffer: &'a mut [u8], pos: usize, truncated: bool) -> Self {
        let pos = pos.min(buffer.len());
        Self {
            buffer,
            pos,
            truncated,
        }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The encoded bytes so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }

    /// Reserves `len` bytes at the cursor, or marks the encoder truncated.
    fn reserve(&mut self, len: usize) -> Option<&mut [u8]> {
        if self.truncated {
            return None;
        }
        match self.pos.checked_add(len) {
            Some(end) if end <= self.buffer.len() => {
                let start = self.pos;
                self.pos = end;
                Some(&mut self.buffer[start..end])
            }
            _ => {
                self.truncated = true;
                None
            }
        }
    }

    #[inline]
    fn put_fixed<const N: usize>(&mut self, tag: TypeTag, payload: [u8; N]) {
        if let Some(dst) = self.reserve(1 + N) {
            dst[0] = tag as u8;
            dst[1..].copy_from_slice(&payload);
        }
    }

    fixed_appenders! {
        append_u8(u8) => U8,
        append_i8(i8) => I8,
        append_u16(u16) => U16,
        append_i16(i16) => I16,
        append_u32(u32) => U32,
        append_i32(i32) => I32,
        append_u64(u64) => U64,
        append_i64(i64) => I64,
        append_u128(u128) => U128,
        append_i128(i128) => I128,
        append_f32(f32) => F32,
        append_f64(f64) => F64,
    }

    #[inline]
    pub fn append_bool(&mut self, value: bool) {
        self.put_fixed(TypeTag::Bool, [value as u8]);
    }

    #[inline]
    pub fn append_char(&mut self, value: char) {
        self.put_fixed(TypeTag::Char, (value as u32).to_le_bytes());
    }

    /// Copies a string inline behind a u32 length prefix.
    pub fn append_str(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let len = match u32::try_from(bytes.len()) {
            Ok(len) => len,
            Err(_) => {
                self.truncated = true;
                return;
            }
        };
        if let Some(dst) = self.reserve(1 + 4 + bytes.len()) {
            dst[0] = TypeTag::Str as u8;
            dst[1..5].copy_from_slice(&len.to_le_bytes());
            dst[5..].copy_from_slice(bytes);
        }
    }

    /// Formats `args` straight into the buffer as a string argument.
    ///
    /// Text that does not fit is cut at a character boundary and the encoder
    /// is marked truncated.
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) {
        let header_at = self.pos;
        if self.reserve(1 + 4).is_none() {
            return;
        }

        let mut sink = InlineText {
            buffer: &mut *self.buffer,
            pos: self.pos,
            overflowed: false,
        };
        // `InlineText` never reports an error; a user `Display` impl may, in
        // which case whatever it wrote so far is kept.
        let _ = sink.write_fmt(args);
        let (end, overflowed) = (sink.pos, sink.overflowed);

        let len = (end - header_at - 5) as u32;
        self.buffer[header_at] = TypeTag::Str as u8;
        self.buffer[header_at + 1..header_at + 5].copy_from_slice(&len.to_le_bytes());
        self.pos = end;
        if overflowed {
            self.truncated = true;
        }
    }

    pub fn append_uuid(&mut self, value: &Uuid) {
        self.put_fixed(TypeTag::Uuid, *value.as_bytes());
    }

    pub fn append_duration(&mut self, value: Duration) {
        let mut payload = [0u8; 12];
        payload[..8].copy_from_slice(&value.as_secs().to_le_bytes());
        payload[8..].copy_from_slice(&value.subsec_nanos().to_le_bytes());
        self.put_fixed(TypeTag::Duration, payload);
    }

    /// Appends a UTC instant given as seconds and nanoseconds since the epoch.
    pub fn append_datetime_parts(&mut self, secs: i64, nanos: u32) {
        let mut payload = [0u8; 12];
        payload[..8].copy_from_slice(&secs.to_le_bytes());
        payload[8..].copy_from_slice(&nanos.to_le_bytes());
        self.put_fixed(TypeTag::DateTime, payload);
    }

    pub fn append_datetime(&mut self, value: &DateTime<Utc>) {
        self.append_datetime_parts(value.timestamp(), value.timestamp_subsec_nanos());
    }

    pub fn append_system_time(&mut self, value: SystemTime) {
        match value.duration_since(UNIX_EPOCH) {
            Ok(after) => self.append_datetime_parts(after.as_secs() as i64, after.subsec_nanos()),
            Err(err) => {
                let before = err.duration();
                let mut secs = -(before.as_secs() as i64);
                let mut nanos = before.subsec_nanos();
                if nanos > 0 {
                    secs -= 1;
                    nanos = 1_000_000_000 - nanos;
                }
                self.append_datetime_parts(secs, nanos);
            }
        }
    }

    pub fn append_enum<E: LogEnum>(&mut self, value: E) {
        let mut payload = [0u8; 16];
        payload[..8].copy_from_slice(&type_id_of::<E>().to_le_bytes());
        payload[8..].copy_from_slice(&value.to_i64().to_le_bytes());
        self.put_fixed(TypeTag::Enum, payload);
    }

    pub fn append_unmanaged<T: Unmanaged>(&mut self, value: &T) {
        let bytes = unmanaged_bytes(value);
        let width = match u32::try_from(bytes.len()) {
            Ok(width) => width,
            Err(_) => {
                self.truncated = true;
                return;
            }
        };
        if let Some(dst) = self.reserve(1 + 8 + 4 + bytes.len()) {
            dst[0] = TypeTag::Unmanaged as u8;
            dst[1..9].copy_from_slice(&type_id_of::<T>().to_le_bytes());
            dst[9..13].copy_from_slice(&width.to_le_bytes());
            dst[13..].copy_from_slice(bytes);
        }
    }

    /// Appends the absent case of a nullable argument.
    pub fn append_null(&mut self) {
        self.put_fixed(TypeTag::Nullable, [0u8]);
    }

    /// Appends the present case of a nullable argument; `inner` encodes the
    /// wrapped value. If the inner value does not fit, the nullable header is
    /// rolled back too.
    ///
    /// Nested nullables collapse into one: when `inner` itself writes a
    /// nullable (`Some(None)`, `Some(Some(x))`), its encoding replaces this
    /// header. An `inner` that writes nothing is encoded as null.
    pub fn append_present<F>(&mut self, inner: F)
    where
        F: FnOnce(&mut Self),
    {
        let start = self.pos;
        self.put_fixed(TypeTag::Nullable, [1u8]);
        if self.truncated {
            return;
        }
        let value_at = self.pos;
        inner(self);
        if self.truncated {
            self.pos = start;
        } else if self.pos == value_at {
            self.pos = start;
            self.append_null();
        } else if self.buffer[value_at] == TypeTag::Nullable as u8 {
            self.buffer.copy_within(value_at..self.pos, start);
            self.pos -= value_at - start;
        }
    }

    pub fn append_arg(&mut self, arg: &dyn LogArg) {
        arg.encode(self);
    }

    /// Consumes the encoder, returning the cursor and truncation flag.
    pub fn finish(self) -> (usize, bool) {
        (self.pos, self.truncated)
    }
}

/// `fmt::Write` sink that copies into the tail of an event buffer and
/// silently stops at the end of it.
struct InlineText<'b> {
    buffer: &'b mut [u8],
    pos: usize,
    overflowed: bool,
}

impl fmt::Write for InlineText<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.overflowed {
            return Ok(());
        }
        let room = self.buffer.len() - self.pos;
        let mut take = s.len().min(room);
        if take < s.len() {
            self.overflowed = true;
            while !s.is_char_boundary(take) {
                take -= 1;
            }
        }
        self.buffer[self.pos..self.pos + take].copy_from_slice(&s.as_bytes()[..take]);
        self.pos += take;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_layout() {
        let mut buffer = [0u8; 32];
        let mut encoder = ArgumentEncoder::new(&mut buffer);
        encoder.append_u16(0x0102);
        encoder.append_bool(true);
        let (len, truncated) = encoder.finish();
        assert_eq!(len, 5);
        assert!(!truncated);
        assert_eq!(&buffer[..5], &[TypeTag::U16 as u8, 0x02, 0x01, TypeTag::Bool as u8, 1]);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let mut buffer = [0u8; 16];
        let mut encoder = ArgumentEncoder::new(&mut buffer);
        encoder.append_str("abc");
        assert_eq!(encoder.as_bytes(), &[TypeTag::Str as u8, 3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_truncation_stops_later_appends() {
        let mut buffer = [0u8; 8];
        let mut encoder = ArgumentEncoder::new(&mut buffer);
        encoder.append_str("too long for this buffer");
        assert!(encoder.is_truncated());
        encoder.append_bool(true);
        assert_eq!(encoder.position(), 0);
    }

    #[test]
    fn test_present_nullable_rolls_back_when_inner_overflows() {
        let mut buffer = [0u8; 6];
        let mut encoder = ArgumentEncoder::new(&mut buffer);
        encoder.append_bool(false);
        encoder.append_present(|encoder| encoder.append_i32(7));
        assert!(encoder.is_truncated());
        assert_eq!(encoder.position(), 2);
    }

    #[test]
    fn test_append_fmt_cuts_on_char_boundary() {
        let mut buffer = [0u8; 8];
        let mut encoder = ArgumentEncoder::new(&mut buffer);
        encoder.append_fmt(format_args!("a{}", "éé"));
        let (len, truncated) = encoder.finish();
        assert!(truncated);
        // header (5) + "a" (1) + one two-byte char (2)
        assert_eq!(len, 8);
        assert_eq!(&buffer[1..5], &3u32.to_le_bytes());
        assert_eq!(std::str::from_utf8(&buffer[5..8]).unwrap(), "aé");
    }

    #[test]
    fn test_resume_keeps_cursor() {
        let mut buffer = [0u8; 16];
        let (pos, truncated) = {
            let mut encoder = ArgumentEncoder::new(&mut buffer);
            encoder.append_u8(1);
            encoder.finish()
        };
        let mut encoder = ArgumentEncoder::resume(&mut buffer, pos, truncated);
        encoder.append_u8(2);
        assert_eq!(encoder.as_bytes(), &[TypeTag::U8 as u8, 1, TypeTag::U8 as u8, 2]);
    }
}
