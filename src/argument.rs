use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::encoder::ArgumentEncoder;
use crate::type_registry::{LogEnum, Unmanaged};

/// Discriminant written before every encoded argument.
///
/// Payload layouts (all integers little-endian):
///
/// | tag | payload |
/// |-----|---------|
/// | `End` | none, terminates the argument list |
/// | `Bool`, `U8`, `I8` | 1 byte |
/// | `U16`, `I16` | 2 bytes |
/// | `U32`, `I32`, `F32`, `Char` | 4 bytes |
/// | `U64`, `I64`, `F64` | 8 bytes |
/// | `U128`, `I128`, `Uuid` | 16 bytes |
/// | `Str` | u32 length + UTF-8 bytes |
/// | `Duration` | u64 seconds + u32 nanoseconds |
/// | `DateTime` | i64 seconds + u32 nanoseconds since the Unix epoch |
/// | `Enum` | u64 type id + i64 value |
/// | `Unmanaged` | u64 type id + u32 width + raw bytes |
/// | `Nullable` | presence byte, then the inner argument when present |
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    End = 0,
    Bool = 1,
    U8 = 2,
    I8 = 3,
    U16 = 4,
    I16 = 5,
    U32 = 6,
    I32 = 7,
    U64 = 8,
    I64 = 9,
    U128 = 10,
    I128 = 11,
    F32 = 12,
    F64 = 13,
    Char = 14,
    Str = 15,
    Uuid = 16,
    Duration = 17,
    DateTime = 18,
    Enum = 19,
    Unmanaged = 20,
    Nullable = 21,
}

impl TypeTag {
    pub fn from_u8(value: u8) -> Option<TypeTag> {
        use TypeTag::*;
        const TAGS: [TypeTag; 22] = [
            End, Bool, U8, I8, U16, I16, U32, I32, U64, I64, U128, I128, F32, F64, Char, Str,
            Uuid, Duration, DateTime, Enum, Unmanaged, Nullable,
        ];
        TAGS.get(value as usize).copied()
    }
}

/// A value that can be encoded as one log argument.
///
/// Implemented for the primitive types, strings, [`Uuid`], [`Duration`],
/// [`SystemTime`], `chrono::DateTime<Utc>`, `Option<T>` (the nullable
/// wrapper), references to any of these, enums declared with
/// [`log_enum!`](crate::log_enum), and the [`EnumArg`] and [`UnmanagedArg`]
/// wrappers. The trait is object safe so template calls can take
/// `&[&dyn LogArg]`.
pub trait LogArg {
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>);
}

macro_rules! impl_log_arg {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl LogArg for $ty {
                #[inline]
                fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
                    encoder.$method(*self);
                }
            }
        )*
    };
}

impl_log_arg! {
    bool => append_bool,
    u8 => append_u8,
    i8 => append_i8,
    u16 => append_u16,
    i16 => append_i16,
    u32 => append_u32,
    i32 => append_i32,
    u64 => append_u64,
    i64 => append_i64,
    u128 => append_u128,
    i128 => append_i128,
    f32 => append_f32,
    f64 => append_f64,
    char => append_char,
    Duration => append_duration,
    SystemTime => append_system_time,
}

impl LogArg for usize {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_u64(*self as u64);
    }
}

impl LogArg for isize {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_i64(*self as i64);
    }
}

impl LogArg for str {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_str(self);
    }
}

impl LogArg for String {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_str(self);
    }
}

impl LogArg for Uuid {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_uuid(self);
    }
}

impl LogArg for DateTime<Utc> {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_datetime(self);
    }
}

impl<T: LogArg + ?Sized> LogArg for &T {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        (**self).encode(encoder);
    }
}

impl<T: LogArg> LogArg for Option<T> {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        match self {
            Some(value) => encoder.append_present(|encoder| value.encode(encoder)),
            None => encoder.append_null(),
        }
    }
}

/// Logs any [`LogEnum`] by type id and value.
///
/// Enums declared with [`log_enum!`](crate::log_enum) implement [`LogArg`]
/// directly; this wrapper covers hand-written `LogEnum` impls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumArg<E>(pub E);

impl<E: LogEnum> LogArg for EnumArg<E> {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_enum(self.0);
    }
}

/// Logs an [`Unmanaged`] value by copying its raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct UnmanagedArg<T>(pub T);

impl<T: Unmanaged> LogArg for UnmanagedArg<T> {
    #[inline]
    fn encode(&self, encoder: &mut ArgumentEncoder<'_>) {
        encoder.append_unmanaged(&self.0);
    }
}
