//! Registration of enum and fixed-layout ("unmanaged") types.
//!
//! Producers encode these values by type id and raw bytes; they never consult
//! the registry. Only the background writer looks entries up, to turn the raw
//! bytes back into text. Types that were never registered are still encoded
//! and are rendered through a deterministic fallback.
//!
//! The registry is filled before the manager is configured and then moved
//! into it, so it cannot change once logging is live.

use std::any::{type_name, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::hash::{Hash, Hasher};
use std::mem;
use std::panic::{self, AssertUnwindSafe};

/// Stable numeric id of a Rust type within this process.
///
/// Derived from [`TypeId`] with a fixed-key hasher, so producer and consumer
/// compute the same value without any shared table.
pub fn type_id_of<T: ?Sized + 'static>() -> u64 {
    let mut hasher = DefaultHasher::new();
    TypeId::of::<T>().hash(&mut hasher);
    hasher.finish()
}

/// A field-less enum that can be logged by its underlying integer value.
///
/// Usually implemented through the [`log_enum!`](crate::log_enum) macro.
pub trait LogEnum: Copy + 'static {
    fn to_i64(self) -> i64;

    fn from_i64(value: i64) -> Option<Self>;
}

/// Plain-old-data value type whose raw bytes can be copied into a log event.
///
/// # Safety
///
/// Implementors must have no padding bytes, no pointers or references, and
/// every bit pattern produced by a valid value must be readable back as the
/// same value. A `#[repr(C)]` struct of integer and float fields laid out
/// without gaps satisfies this.
pub unsafe trait Unmanaged: Copy + Send + 'static {}

/// Views an unmanaged value as its raw bytes.
pub fn unmanaged_bytes<T: Unmanaged>(value: &T) -> &[u8] {
    // SAFETY: `Unmanaged` guarantees a padding-free plain-old-data layout, so
    // every byte of the value is initialized.
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, mem::size_of::<T>()) }
}

/// Reads an unmanaged value back from raw bytes of exactly its size.
pub fn read_unmanaged<T: Unmanaged>(bytes: &[u8]) -> Option<T> {
    if bytes.len() != mem::size_of::<T>() {
        return None;
    }
    // SAFETY: length checked above; `read_unaligned` tolerates any alignment
    // and `Unmanaged` guarantees the bytes form a valid value.
    Some(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Enum,
    Unmanaged { width: usize },
}

/// What happened when a registry entry was asked to render a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Written,
    /// The entry does not apply: wrong kind, unknown variant or width
    /// mismatch. Nothing was written.
    Declined,
    /// The type's own formatting code panicked or returned an error. Any
    /// partial output was removed.
    Failed,
}

#[derive(Clone, Copy)]
enum Render {
    Enum(fn(i64, &mut String) -> RenderOutcome),
    Unmanaged(fn(&[u8], &mut String) -> RenderOutcome),
}

/// Runs user formatting code against `out`, rolling `out` back to its
/// previous length unless the value was written in full.
fn contained<F>(out: &mut String, render: F) -> RenderOutcome
where
    F: FnOnce(&mut String) -> RenderOutcome,
{
    let mark = out.len();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| render(&mut *out)))
        .unwrap_or(RenderOutcome::Failed);
    if outcome != RenderOutcome::Written {
        out.truncate(mark);
    }
    outcome
}

/// Formatting behavior recorded for one registered type.
#[derive(Clone, Copy)]
pub struct TypeRegistryEntry {
    type_id: u64,
    type_name: &'static str,
    kind: TypeKind,
    render: Render,
}

impl TypeRegistryEntry {
    pub fn type_id(&self) -> u64 {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Renders an enum value through the type's `Debug` impl. A panic inside
    /// that impl is caught and reported as [`RenderOutcome::Failed`].
    pub fn render_enum(&self, value: i64, out: &mut String) -> RenderOutcome {
        match self.render {
            Render::Enum(render) => contained(out, |out| render(value, out)),
            Render::Unmanaged(_) => RenderOutcome::Declined,
        }
    }

    /// Renders an unmanaged value through the type's `Display` impl. A panic
    /// inside that impl is caught and reported as [`RenderOutcome::Failed`].
    pub fn render_unmanaged(&self, bytes: &[u8], out: &mut String) -> RenderOutcome {
        match self.render {
            Render::Unmanaged(render) => contained(out, |out| render(bytes, out)),
            Render::Enum(_) => RenderOutcome::Declined,
        }
    }
}

impl fmt::Debug for TypeRegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistryEntry")
            .field("type_id", &format_args!("{:016x}", self.type_id))
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .finish()
    }
}

fn written(result: fmt::Result) -> RenderOutcome {
    match result {
        Ok(()) => RenderOutcome::Written,
        Err(_) => RenderOutcome::Failed,
    }
}

fn render_enum<E: LogEnum + fmt::Debug>(value: i64, out: &mut String) -> RenderOutcome {
    match E::from_i64(value) {
        Some(variant) => written(write!(out, "{:?}", variant)),
        None => RenderOutcome::Declined,
    }
}

fn render_unmanaged<T: Unmanaged + fmt::Display>(bytes: &[u8], out: &mut String) -> RenderOutcome {
    match read_unmanaged::<T>(bytes) {
        Some(value) => written(write!(out, "{}", value)),
        None => RenderOutcome::Declined,
    }
}

/// Table of registered enum and unmanaged types, keyed by [`type_id_of`].
///
/// # Examples
///
/// ```
/// # use zero_alloc_logger::log_enum;
/// # use zero_alloc_logger::type_registry::{RenderOutcome, TypeRegistry, type_id_of};
/// log_enum! {
///     pub enum Side { Buy, Sell }
/// }
///
/// let mut registry = TypeRegistry::new();
/// registry.register_enum::<Side>();
/// let entry = registry.lookup(type_id_of::<Side>()).unwrap();
///
/// let mut out = String::new();
/// assert_eq!(entry.render_enum(1, &mut out), RenderOutcome::Written);
/// assert_eq!(out, "Sell");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: HashMap<u64, TypeRegistryEntry>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enum, rendered through its `Debug` output (the variant
    /// name for derived impls). Registering the same type twice is a no-op.
    pub fn register_enum<E: LogEnum + fmt::Debug>(&mut self) -> &mut Self {
        let type_id = type_id_of::<E>();
        self.entries.entry(type_id).or_insert(TypeRegistryEntry {
            type_id,
            type_name: type_name::<E>(),
            kind: TypeKind::Enum,
            render: Render::Enum(render_enum::<E>),
        });
        self
    }

    /// Registers an unmanaged type, rendered through its `Display` impl.
    /// Registering the same type twice is a no-op.
    pub fn register_unmanaged<T: Unmanaged + fmt::Display>(&mut self) -> &mut Self {
        let type_id = type_id_of::<T>();
        self.entries.entry(type_id).or_insert(TypeRegistryEntry {
            type_id,
            type_name: type_name::<T>(),
            kind: TypeKind::Unmanaged {
                width: mem::size_of::<T>(),
            },
            render: Render::Unmanaged(render_unmanaged::<T>),
        });
        self
    }

    pub fn lookup(&self, type_id: u64) -> Option<&TypeRegistryEntry> {
        self.entries.get(&type_id)
    }

    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        self.entries.contains_key(&type_id_of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Declares a field-less enum that can be logged.
///
/// The macro emits the enum itself with `Debug, Clone, Copy, PartialEq, Eq,
/// Hash` derived, implements [`LogEnum`] for it, and implements
/// [`LogArg`](crate::argument::LogArg) so values can be passed directly to
/// template calls and builders. Explicit discriminants are supported.
///
/// ```
/// # use zero_alloc_logger::log_enum;
/// log_enum! {
///     #[repr(u8)]
///     pub enum DayOfWeek {
///         Sunday = 0,
///         Monday,
///         Tuesday,
///     }
/// }
/// # use zero_alloc_logger::type_registry::LogEnum;
/// assert_eq!(DayOfWeek::from_i64(1), Some(DayOfWeek::Monday));
/// ```
#[macro_export]
macro_rules! log_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident $(= $value:expr)? ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant $(= $value)? ),+
        }

        impl $crate::type_registry::LogEnum for $name {
            fn to_i64(self) -> i64 {
                self as i64
            }

            fn from_i64(value: i64) -> Option<Self> {
                $(
                    if value == $name::$variant as i64 {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }

        impl $crate::argument::LogArg for $name {
            fn encode(&self, encoder: &mut $crate::encoder::ArgumentEncoder<'_>) {
                encoder.append_enum(*self);
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::log_enum! {
        enum Color { Red, Green = 5, Blue }
    }

    crate::log_enum! {
        enum Other { Only }
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct Point {
        x: i32,
        y: i32,
    }

    unsafe impl Unmanaged for Point {}

    impl fmt::Display for Point {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "({}, {})", self.x, self.y)
        }
    }

    #[test]
    fn test_type_ids_are_stable_and_distinct() {
        assert_eq!(type_id_of::<Color>(), type_id_of::<Color>());
        assert_ne!(type_id_of::<Color>(), type_id_of::<Other>());
        assert_ne!(type_id_of::<Point>(), type_id_of::<Color>());
    }

    #[test]
    fn test_enum_discriminants_round_trip() {
        assert_eq!(Color::Green.to_i64(), 5);
        assert_eq!(Color::Blue.to_i64(), 6);
        assert_eq!(Color::from_i64(6), Some(Color::Blue));
        assert_eq!(Color::from_i64(1), None);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = TypeRegistry::new();
        registry.register_enum::<Color>().register_enum::<Color>();
        registry.register_unmanaged::<Point>();
        assert_eq!(registry.len(), 2);
        assert!(registry.is_registered::<Color>());
        assert!(!registry.is_registered::<Other>());
    }

    #[test]
    fn test_render_registered_values() {
        let mut registry = TypeRegistry::new();
        registry.register_enum::<Color>().register_unmanaged::<Point>();

        let mut out = String::new();
        let color = registry.lookup(type_id_of::<Color>()).unwrap();
        assert_eq!(color.render_enum(5, &mut out), RenderOutcome::Written);
        assert_eq!(out, "Green");
        assert_eq!(color.render_enum(42, &mut out), RenderOutcome::Declined);
        assert_eq!(color.render_unmanaged(&[0; 8], &mut out), RenderOutcome::Declined);

        out.clear();
        let point = registry.lookup(type_id_of::<Point>()).unwrap();
        let bytes = unmanaged_bytes(&Point { x: 3, y: -4 }).to_vec();
        assert_eq!(point.render_unmanaged(&bytes, &mut out), RenderOutcome::Written);
        assert_eq!(out, "(3, -4)");
        assert_eq!(point.render_unmanaged(&bytes[..4], &mut out), RenderOutcome::Declined);
        assert_eq!(point.kind(), TypeKind::Unmanaged { width: 8 });
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct HalfWritten(u32);

    unsafe impl Unmanaged for HalfWritten {}

    impl fmt::Display for HalfWritten {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("par")?;
            Err(fmt::Error)
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct Exploding(u32);

    unsafe impl Unmanaged for Exploding {}

    impl fmt::Display for Exploding {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boo")?;
            panic!("display of {} failed", self.0)
        }
    }

    #[test]
    fn test_display_error_leaves_no_partial_text() {
        let mut registry = TypeRegistry::new();
        registry.register_unmanaged::<HalfWritten>();
        let entry = registry.lookup(type_id_of::<HalfWritten>()).unwrap();

        let mut out = String::from("before ");
        let bytes = unmanaged_bytes(&HalfWritten(1)).to_vec();
        assert_eq!(entry.render_unmanaged(&bytes, &mut out), RenderOutcome::Failed);
        assert_eq!(out, "before ");
    }

    #[test]
    fn test_display_panic_is_caught() {
        let mut registry = TypeRegistry::new();
        registry.register_unmanaged::<Exploding>();
        let entry = registry.lookup(type_id_of::<Exploding>()).unwrap();

        let mut out = String::from("before ");
        let bytes = unmanaged_bytes(&Exploding(7)).to_vec();
        assert_eq!(entry.render_unmanaged(&bytes, &mut out), RenderOutcome::Failed);
        assert_eq!(out, "before ");

        // The entry keeps working after a caught panic.
        assert_eq!(entry.render_unmanaged(&bytes, &mut out), RenderOutcome::Failed);
        assert_eq!(out, "before ");
    }
}
