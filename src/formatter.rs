use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::decoder::{ArgumentDecoder, Field};
use crate::log_event::LogEvent;
use crate::type_registry::{RenderOutcome, TypeRegistry};

/// Rendered in place of a placeholder whose index has no argument.
pub const MISSING_MARKER: &str = "{MISSING}";
/// Rendered in place of a malformed placeholder or undecodable argument.
pub const INVALID_MARKER: &str = "{INVALID}";

/// Per-placeholder formatting option: `{:.3}`, `{:x}` or `{:X}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatSpec {
    #[default]
    Plain,
    /// Digits after the decimal point; applies to floats.
    Precision(usize),
    /// Hexadecimal; applies to integers.
    LowerHex,
    UpperHex,
}

impl FormatSpec {
    pub fn parse(spec: &str) -> Option<FormatSpec> {
        match spec {
            "" => Some(FormatSpec::Plain),
            "x" => Some(FormatSpec::LowerHex),
            "X" => Some(FormatSpec::UpperHex),
            _ => spec
                .strip_prefix('.')
                .and_then(|digits| digits.parse().ok())
                .map(FormatSpec::Precision),
        }
    }
}

/// Settings shared by every rendered field.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub registry: &'a TypeRegistry,
    /// Text for an absent nullable argument.
    pub null_display: &'a str,
}

/// Splits the text between `{` and `}` into an argument index and spec.
///
/// `{}` and `{:spec}` take the next implicit index; `{N}` and `{N:spec}` name
/// one explicitly without advancing the implicit counter.
fn parse_placeholder(inner: &str, next_implicit: &mut usize) -> Option<(usize, FormatSpec)> {
    let (index, spec) = match inner.split_once(':') {
        Some((index, spec)) => (index, spec),
        None => (inner, ""),
    };
    let spec = FormatSpec::parse(spec)?;
    let index = if index.is_empty() {
        let index = *next_implicit;
        *next_implicit += 1;
        index
    } else {
        index.trim().parse().ok()?
    };
    Some((index, spec))
}

macro_rules! render_integer {
    ($out:expr, $value:expr, $spec:expr) => {
        match $spec {
            FormatSpec::LowerHex => write!($out, "{:x}", $value),
            FormatSpec::UpperHex => write!($out, "{:X}", $value),
            _ => write!($out, "{}", $value),
        }
    };
}

macro_rules! render_float {
    ($out:expr, $value:expr, $spec:expr) => {
        match $spec {
            FormatSpec::Precision(precision) => write!($out, "{:.*}", precision, $value),
            _ => write!($out, "{}", $value),
        }
    };
}

fn render_duration(duration: Duration, out: &mut String) {
    let secs = duration.as_secs();
    let _ = write!(
        out,
        "{:02}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        duration.subsec_micros()
    );
}

fn render_hex(bytes: &[u8], out: &mut String) {
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
}

fn render_unmanaged_fallback(type_id: u64, bytes: &[u8], out: &mut String) {
    let _ = write!(out, "Unmanaged#{:016x}(0x", type_id);
    render_hex(bytes, out);
    out.push(')');
}

/// Appends the text for one decoded field.
///
/// Enum and unmanaged values are rendered through the registry when their
/// type is registered. Otherwise a fallback is written:
///
/// - enum: `Enum#<type id in hex>(<value>)`
/// - unmanaged: `Unmanaged#<type id in hex>(0x<raw bytes in hex>)`
///
/// A registered enum holding a value that names no variant renders as the
/// plain integer. If a registered type's own `Debug` or `Display` code panics
/// or fails, the field renders as [`INVALID_MARKER`].
pub fn render_field(field: &Field<'_>, spec: FormatSpec, ctx: &RenderContext<'_>, out: &mut String) {
    let _ = match *field {
        Field::Bool(value) => {
            out.push_str(if value { "true" } else { "false" });
            Ok(())
        }
        Field::U8(value) => render_integer!(out, value, spec),
        Field::I8(value) => render_integer!(out, value, spec),
        Field::U16(value) => render_integer!(out, value, spec),
        Field::I16(value) => render_integer!(out, value, spec),
        Field::U32(value) => render_integer!(out, value, spec),
        Field::I32(value) => render_integer!(out, value, spec),
        Field::U64(value) => render_integer!(out, value, spec),
        Field::I64(value) => render_integer!(out, value, spec),
        Field::U128(value) => render_integer!(out, value, spec),
        Field::I128(value) => render_integer!(out, value, spec),
        Field::F32(value) => render_float!(out, value, spec),
        Field::F64(value) => render_float!(out, value, spec),
        Field::Char(value) => {
            out.push(value);
            Ok(())
        }
        Field::Str(value) => {
            out.push_str(value);
            Ok(())
        }
        Field::Uuid(value) => write!(out, "{}", value.hyphenated()),
        Field::Duration(value) => {
            render_duration(value, out);
            Ok(())
        }
        Field::DateTime { secs, nanos } => match DateTime::<Utc>::from_timestamp(secs, nanos) {
            Some(datetime) => write!(out, "{}", datetime.format("%Y-%m-%d %H:%M:%S%.6f")),
            None => {
                out.push_str(INVALID_MARKER);
                Ok(())
            }
        },
        Field::Enum { type_id, value } => match ctx.registry.lookup(type_id) {
            Some(entry) => match entry.render_enum(value, out) {
                RenderOutcome::Written => Ok(()),
                RenderOutcome::Declined => write!(out, "{}", value),
                RenderOutcome::Failed => {
                    out.push_str(INVALID_MARKER);
                    Ok(())
                }
            },
            None => write!(out, "Enum#{:016x}({})", type_id, value),
        },
        Field::Unmanaged { type_id, bytes } => {
            match ctx.registry.lookup(type_id).map(|entry| entry.render_unmanaged(bytes, out)) {
                Some(RenderOutcome::Written) => {}
                Some(RenderOutcome::Failed) => out.push_str(INVALID_MARKER),
                Some(RenderOutcome::Declined) | None => {
                    render_unmanaged_fallback(type_id, bytes, out)
                }
            }
            Ok(())
        }
        Field::Null => {
            out.push_str(ctx.null_display);
            Ok(())
        }
        Field::Invalid => {
            out.push_str(INVALID_MARKER);
            Ok(())
        }
    };
}

/// Renders a template, substituting placeholders with decoded arguments.
///
/// Each placeholder re-scans the payload from the start, so arguments may be
/// referenced in any order and more than once. Errors are rendered inline and
/// never affect the rest of the message: an index past the last argument
/// gives [`MISSING_MARKER`], an unparsable placeholder gives
/// [`INVALID_MARKER`], and an unclosed `{` gives [`INVALID_MARKER`] followed
/// by the remaining text. `{{` and `}}` are literal braces; a lone `}` is
/// kept as is.
pub fn render_template(template: &str, payload: &[u8], ctx: &RenderContext<'_>, out: &mut String) {
    let mut next_implicit = 0;
    let mut rest = template;

    while let Some(at) = rest.find(['{', '}']) {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
        } else {
            let Some(close) = tail.find('}') else {
                out.push_str(INVALID_MARKER);
                out.push_str(&tail[1..]);
                return;
            };
            match parse_placeholder(&tail[1..close], &mut next_implicit) {
                Some((index, spec)) => match ArgumentDecoder::new(payload).nth(index) {
                    Some(field) => render_field(&field, spec, ctx, out),
                    None => out.push_str(MISSING_MARKER),
                },
                None => out.push_str(INVALID_MARKER),
            }
            rest = &tail[close + 1..];
        }
    }
    out.push_str(rest);
}

/// Renders every argument in order with no separators. This is the message
/// text of a builder-style event.
pub fn render_fields(payload: &[u8], ctx: &RenderContext<'_>, out: &mut String) {
    for field in ArgumentDecoder::new(payload) {
        render_field(&field, FormatSpec::Plain, ctx, out);
    }
}

/// Turns events into message text using one reusable output buffer.
///
/// The background writer owns a single formatter; the buffer is cleared, not
/// reallocated, between events and only grows when a message is longer than
/// any seen before.
#[derive(Debug)]
pub struct MessageFormatter {
    output: String,
    null_display: String,
    truncated_suffix: String,
}

impl MessageFormatter {
    pub fn new(null_display: impl Into<String>, truncated_suffix: impl Into<String>) -> Self {
        Self {
            output: String::with_capacity(256),
            null_display: null_display.into(),
            truncated_suffix: truncated_suffix.into(),
        }
    }

    /// Renders an event's message and returns it.
    pub fn format(&mut self, event: &LogEvent, registry: &TypeRegistry) -> &str {
        self.format_parts(event.template(), event.payload(), event.is_truncated(), registry)
    }

    /// Renders a message from its parts: template calls interleave the
    /// template with arguments, builder calls concatenate arguments. A
    /// truncated message ends with the configured suffix.
    pub fn format_parts(
        &mut self,
        template: Option<&str>,
        payload: &[u8],
        truncated: bool,
        registry: &TypeRegistry,
    ) -> &str {
        self.output.clear();
        let ctx = RenderContext {
            registry,
            null_display: &self.null_display,
        };
        match template {
            Some(template) => render_template(template, payload, &ctx, &mut self.output),
            None => render_fields(payload, &ctx, &mut self.output),
        }
        if truncated {
            self.output.push_str(&self.truncated_suffix);
        }
        &self.output
    }

    /// Replaces the buffer contents with arbitrary text, for messages the
    /// writer produces itself.
    pub fn format_text(&mut self, args: std::fmt::Arguments<'_>) -> &str {
        self.output.clear();
        let _ = self.output.write_fmt(args);
        &self.output
    }

    /// The most recently rendered message.
    pub fn output(&self) -> &str {
        &self.output
    }
}
