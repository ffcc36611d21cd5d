//! Process-wide interning of logger names.
//!
//! Log event headers carry a logger identity as a compact numeric id plus a
//! `&'static str`, so a producer never copies the name into an event. Names
//! are interned once, when a logger handle is created, which is the only
//! place the registry lock is taken. Interned names live for the rest of the
//! process and survive manager reconfiguration.

use std::collections::HashMap;

use lazy_static::lazy_static;
use parking_lot::Mutex;

/// An interned logger name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoggerName {
    pub id: u32,
    pub name: &'static str,
}

struct NameTable {
    by_name: HashMap<&'static str, u32>,
    by_id: Vec<&'static str>,
}

lazy_static! {
    /// Maps each distinct logger name to its id.
    ///
    /// Id 0 is reserved and never handed out; `by_id[0]` is a placeholder.
    static ref LOGGER_NAMES: Mutex<NameTable> = Mutex::new(NameTable {
        by_name: HashMap::new(),
        by_id: vec![""],
    });
}

/// Interns `name` and returns its id and static copy.
///
/// The first call for a given name leaks one boxed copy of it; later calls
/// return the same id and pointer.
///
/// # Examples
///
/// ```
/// # use zero_alloc_logger::string_registry::intern;
/// let first = intern("orders");
/// let second = intern("orders");
/// assert_eq!(first, second);
/// assert_ne!(first.id, intern("fills").id);
/// ```
pub fn intern(name: &str) -> LoggerName {
    let mut table = LOGGER_NAMES.lock();
    if let Some((&stored, &id)) = table.by_name.get_key_value(name) {
        return LoggerName { id, name: stored };
    }

    let stored: &'static str = Box::leak(name.to_owned().into_boxed_str());
    let id = table.by_id.len() as u32;
    table.by_id.push(stored);
    table.by_name.insert(stored, id);
    LoggerName { id, name: stored }
}

/// Looks up a previously interned name by id.
///
/// Returns `None` for id 0 and for ids that were never handed out.
pub fn get_name(id: u32) -> Option<&'static str> {
    if id == 0 {
        return None;
    }
    LOGGER_NAMES.lock().by_id.get(id as usize).copied()
}
