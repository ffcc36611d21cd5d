use std::time::Duration;

use uuid::Uuid;

use crate::argument::TypeTag;

/// One decoded argument, borrowing from the event buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    U128(u128),
    I128(i128),
    F32(f32),
    F64(f64),
    Char(char),
    Str(&'a str),
    Uuid(Uuid),
    Duration(Duration),
    DateTime { secs: i64, nanos: u32 },
    Enum { type_id: u64, value: i64 },
    Unmanaged { type_id: u64, bytes: &'a [u8] },
    /// The absent case of a nullable argument.
    Null,
    /// Bytes that could not be decoded. Always the last field produced.
    Invalid,
}

/// Lazy, in-order decoding of an event's argument bytes.
///
/// Each step consumes one `(TypeTag, payload)` pair. Iteration ends at the
/// `End` tag or at the end of the slice. Malformed input yields a single
/// [`Field::Invalid`] and then ends; it never panics. To start over, create a
/// new decoder over the same bytes.
///
/// # Examples
///
/// ```
/// # use zero_alloc_logger::encoder::ArgumentEncoder;
/// # use zero_alloc_logger::decoder::{ArgumentDecoder, Field};
/// let mut buffer = [0u8; 32];
/// let mut encoder = ArgumentEncoder::new(&mut buffer);
/// encoder.append_i32(42);
/// encoder.append_str("ok");
/// let (len, _) = encoder.finish();
///
/// let fields: Vec<_> = ArgumentDecoder::new(&buffer[..len]).collect();
/// assert_eq!(fields, vec![Field::I32(42), Field::Str("ok")]);
/// ```
#[derive(Debug, Clone)]
pub struct ArgumentDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> ArgumentDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            done: false,
        }
    }

    /// Offset of the next tag.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N).and_then(|slice| slice.try_into().ok())
    }

    fn take_u32(&mut self) -> Option<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    fn take_u64(&mut self) -> Option<u64> {
        self.take_array().map(u64::from_le_bytes)
    }

    fn take_i64(&mut self) -> Option<i64> {
        self.take_array().map(i64::from_le_bytes)
    }

    /// Decodes the payload for `tag`. `None` means malformed input.
    fn field(&mut self, tag: TypeTag) -> Option<Field<'a>> {
        let field = match tag {
            TypeTag::End => return None,
            TypeTag::Bool => Field::Bool(self.take_array::<1>()?[0] != 0),
            TypeTag::U8 => Field::U8(self.take_array::<1>()?[0]),
            TypeTag::I8 => Field::I8(i8::from_le_bytes(self.take_array()?)),
            TypeTag::U16 => Field::U16(u16::from_le_bytes(self.take_array()?)),
            TypeTag::I16 => Field::I16(i16::from_le_bytes(self.take_array()?)),
            TypeTag::U32 => Field::U32(self.take_u32()?),
            TypeTag::I32 => Field::I32(i32::from_le_bytes(self.take_array()?)),
            TypeTag::U64 => Field::U64(self.take_u64()?),
            TypeTag::I64 => Field::I64(self.take_i64()?),
            TypeTag::U128 => Field::U128(u128::from_le_bytes(self.take_array()?)),
            TypeTag::I128 => Field::I128(i128::from_le_bytes(self.take_array()?)),
            TypeTag::F32 => Field::F32(f32::from_le_bytes(self.take_array()?)),
            TypeTag::F64 => Field::F64(f64::from_le_bytes(self.take_array()?)),
            TypeTag::Char => Field::Char(char::from_u32(self.take_u32()?)?),
            TypeTag::Str => {
                let len = self.take_u32()? as usize;
                Field::Str(std::str::from_utf8(self.take(len)?).ok()?)
            }
            TypeTag::Uuid => Field::Uuid(Uuid::from_bytes(self.take_array()?)),
            TypeTag::Duration => {
                let secs = self.take_u64()?;
                let nanos = self.take_u32()?;
                if nanos >= 1_000_000_000 {
                    return None;
                }
                Field::Duration(Duration::new(secs, nanos))
            }
            TypeTag::DateTime => {
                let secs = self.take_i64()?;
                let nanos = self.take_u32()?;
                Field::DateTime { secs, nanos }
            }
            TypeTag::Enum => {
                let type_id = self.take_u64()?;
                let value = self.take_i64()?;
                Field::Enum { type_id, value }
            }
            TypeTag::Unmanaged => {
                let type_id = self.take_u64()?;
                let width = self.take_u32()? as usize;
                Field::Unmanaged {
                    type_id,
                    bytes: self.take(width)?,
                }
            }
            TypeTag::Nullable => match self.take_array::<1>()?[0] {
                0 => Field::Null,
                1 => {
                    let inner = TypeTag::from_u8(self.take_array::<1>()?[0])?;
                    if matches!(inner, TypeTag::Nullable | TypeTag::End) {
                        return None;
                    }
                    self.field(inner)?
                }
                _ => return None,
            },
        };
        Some(field)
    }
}

impl<'a> Iterator for ArgumentDecoder<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Field<'a>> {
        if self.done {
            return None;
        }
        let tag = match self.bytes.get(self.pos) {
            Some(&raw) => {
                self.pos += 1;
                TypeTag::from_u8(raw)
            }
            None => {
                self.done = true;
                return None;
            }
        };
        match tag {
            Some(TypeTag::End) => {
                self.done = true;
                None
            }
            Some(tag) => match self.field(tag) {
                Some(field) => Some(field),
                None => {
                    self.done = true;
                    Some(Field::Invalid)
                }
            },
            None => {
                self.done = true;
                Some(Field::Invalid)
            }
        }
    }
}
