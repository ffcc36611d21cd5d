use std::time::{Duration, UNIX_EPOCH};

use uuid::Uuid;

use zero_alloc_logger::decoder::{ArgumentDecoder, Field};
use zero_alloc_logger::encoder::ArgumentEncoder;
use zero_alloc_logger::type_registry::type_id_of;
use zero_alloc_logger::{log_enum, EnumArg, LogArg, LogEnum, TypeTag, Unmanaged, UnmanagedArg};

log_enum! {
    #[repr(i16)]
    enum Mode { Idle = -1, Running = 10 }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Manual {
    On,
    Off,
}

impl LogEnum for Manual {
    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Manual::On),
            1 => Some(Manual::Off),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    id: u32,
    value: f32,
}

unsafe impl Unmanaged for Sample {}

fn decode(bytes: &[u8]) -> Vec<Field<'_>> {
    ArgumentDecoder::new(bytes).collect()
}

#[test]
fn test_every_kind_decodes_back() {
    let id = Uuid::new_v4();
    let sample = Sample { id: 7, value: 0.5 };
    let mut buffer = [0u8; 256];
    let mut encoder = ArgumentEncoder::new(&mut buffer);
    let args: [&dyn LogArg; 12] = [
        &true,
        &-3i8,
        &u64::MAX,
        &1.25f32,
        &'λ',
        &"text",
        &id,
        &Duration::new(5, 6),
        &(UNIX_EPOCH + Duration::new(10, 20)),
        &Mode::Idle,
        &EnumArg(Manual::Off),
        &UnmanagedArg(sample),
    ];
    for arg in args {
        encoder.append_arg(arg);
    }
    let (len, truncated) = encoder.finish();
    assert!(!truncated);

    let fields = decode(&buffer[..len]);
    assert_eq!(fields.len(), 12);
    assert_eq!(fields[0], Field::Bool(true));
    assert_eq!(fields[1], Field::I8(-3));
    assert_eq!(fields[2], Field::U64(u64::MAX));
    assert_eq!(fields[3], Field::F32(1.25));
    assert_eq!(fields[4], Field::Char('λ'));
    assert_eq!(fields[5], Field::Str("text"));
    assert_eq!(fields[6], Field::Uuid(id));
    assert_eq!(fields[7], Field::Duration(Duration::new(5, 6)));
    assert_eq!(fields[8], Field::DateTime { secs: 10, nanos: 20 });
    assert_eq!(
        fields[9],
        Field::Enum {
            type_id: type_id_of::<Mode>(),
            value: -1
        }
    );
    assert_eq!(
        fields[10],
        Field::Enum {
            type_id: type_id_of::<Manual>(),
            value: 1
        }
    );
    match fields[11] {
        Field::Unmanaged { type_id, bytes } => {
            assert_eq!(type_id, type_id_of::<Sample>());
            assert_eq!(bytes.len(), std::mem::size_of::<Sample>());
            let decoded = zero_alloc_logger::type_registry::read_unmanaged::<Sample>(bytes);
            assert_eq!(decoded, Some(sample));
        }
        ref other => panic!("expected unmanaged field, got {:?}", other),
    }
}

#[test]
fn test_dynamic_and_typed_appends_are_byte_identical() {
    let sample = Sample { id: 1, value: 2.0 };
    let maybe: Option<u16> = Some(9);

    let mut dynamic = [0u8; 128];
    let mut encoder = ArgumentEncoder::new(&mut dynamic);
    let args: [&dyn LogArg; 5] = [&42i32, &"abc", &Mode::Running, &UnmanagedArg(sample), &maybe];
    for arg in args {
        encoder.append_arg(arg);
    }
    let dynamic_len = encoder.finish().0;

    let mut typed = [0u8; 128];
    let mut encoder = ArgumentEncoder::new(&mut typed);
    encoder.append_i32(42);
    encoder.append_str("abc");
    encoder.append_enum(Mode::Running);
    encoder.append_unmanaged(&sample);
    encoder.append_present(|inner| inner.append_u16(9));
    let typed_len = encoder.finish().0;

    assert_eq!(&dynamic[..dynamic_len], &typed[..typed_len]);
}

#[test]
fn test_exact_fit_succeeds_and_one_byte_over_truncates() {
    // i64 (9 bytes) + str "abcd" (9 bytes)
    let mut exact = [0u8; 18];
    let mut encoder = ArgumentEncoder::new(&mut exact);
    encoder.append_i64(-1);
    encoder.append_str("abcd");
    assert_eq!(encoder.finish(), (18, false));

    let mut short = [0u8; 17];
    let mut encoder = ArgumentEncoder::new(&mut short);
    encoder.append_i64(-1);
    encoder.append_str("abcd");
    let (len, truncated) = encoder.finish();
    assert!(truncated);
    assert_eq!(len, 9, "The argument that did not fit must not be written");
    assert_eq!(decode(&short[..len]), vec![Field::I64(-1)]);
}

#[test]
fn test_nullable_layout() {
    let mut buffer = [0u8; 16];
    let mut encoder = ArgumentEncoder::new(&mut buffer);
    encoder.append_arg(&None::<u32>);
    encoder.append_arg(&Some(3u8));
    let (len, _) = encoder.finish();
    assert_eq!(
        &buffer[..len],
        &[
            TypeTag::Nullable as u8,
            0,
            TypeTag::Nullable as u8,
            1,
            TypeTag::U8 as u8,
            3
        ]
    );
    assert_eq!(decode(&buffer[..len]), vec![Field::Null, Field::U8(3)]);
}

#[test]
fn test_nested_options_collapse_to_one_nullable() {
    let mut buffer = [0u8; 32];
    let mut encoder = ArgumentEncoder::new(&mut buffer);
    encoder.append_arg(&Some(Some(3u32)));
    encoder.append_arg(&Some(None::<u32>));
    encoder.append_arg(&Some(Some(Some(7u8))));
    encoder.append_arg(&" tail");
    let (len, truncated) = encoder.finish();
    assert!(!truncated);
    assert_eq!(
        &buffer[..8],
        &[TypeTag::Nullable as u8, 1, TypeTag::U32 as u8, 3, 0, 0, 0, TypeTag::Nullable as u8]
    );
    assert_eq!(
        decode(&buffer[..len]),
        vec![Field::U32(3), Field::Null, Field::U8(7), Field::Str(" tail")]
    );
}

#[test]
fn test_nested_option_that_does_not_fit_is_rolled_back() {
    let mut buffer = [0u8; 5];
    let mut encoder = ArgumentEncoder::new(&mut buffer);
    encoder.append_arg(&Some(Some(9u32)));
    let (len, truncated) = encoder.finish();
    assert!(truncated);
    assert_eq!(len, 0);
}

#[test]
fn test_system_time_before_epoch() {
    let mut buffer = [0u8; 16];
    let mut encoder = ArgumentEncoder::new(&mut buffer);
    encoder.append_system_time(UNIX_EPOCH - Duration::new(1, 250_000_000));
    let (len, _) = encoder.finish();
    assert_eq!(
        decode(&buffer[..len]),
        vec![Field::DateTime {
            secs: -2,
            nanos: 750_000_000
        }]
    );
}

#[test]
fn test_append_fmt_is_a_string_field() {
    let mut buffer = [0u8; 64];
    let mut encoder = ArgumentEncoder::new(&mut buffer);
    encoder.append_fmt(format_args!("{}-{:03}", "id", 7));
    let (len, truncated) = encoder.finish();
    assert!(!truncated);
    assert_eq!(decode(&buffer[..len]), vec![Field::Str("id-007")]);
}
