use std::thread;

use zero_alloc_logger::string_registry::{get_name, intern};

#[test]
fn test_name_registration() {
    let name = intern("registry.test");
    assert_eq!(name.name, "registry.test");
    assert_eq!(get_name(name.id), Some("registry.test"));
}

#[test]
fn test_duplicate_registration() {
    let first = intern("registry.duplicate");
    let second = intern(&String::from("registry.duplicate"));
    assert_eq!(first.id, second.id, "Same name should get same ID");
    assert!(std::ptr::eq(first.name, second.name), "Same name should share storage");
}

#[test]
fn test_multiple_names() {
    let names = ["registry.first", "registry.second", "registry.third"];
    let ids: Vec<_> = names.iter().map(|name| intern(name).id).collect();

    for i in 0..ids.len() {
        for j in i + 1..ids.len() {
            assert_ne!(ids[i], ids[j], "Different names should get different IDs");
        }
    }
    for (name, id) in names.iter().zip(ids.iter()) {
        assert_eq!(get_name(*id), Some(*name));
    }
}

#[test]
fn test_invalid_id() {
    assert!(get_name(0).is_none(), "ID 0 is reserved");
    assert!(get_name(u32::MAX).is_none(), "Unknown ID should return None");
}

#[test]
fn test_concurrent_registration() {
    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(|| intern("registry.concurrent")))
        .collect();
    let expected = intern("registry.concurrent");
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected, "Concurrent interning should agree");
    }
}

#[test]
fn test_unicode_and_empty_names() {
    let unicode = intern("registry.Hello, 世界! 🌍");
    assert_eq!(get_name(unicode.id), Some("registry.Hello, 世界! 🌍"));

    let empty = intern("");
    assert_ne!(empty.id, 0);
    assert_eq!(get_name(empty.id), Some(""));
}

#[test]
fn test_many_registrations() {
    let names: Vec<String> = (0..1000).map(|i| format!("registry.many.{}", i)).collect();
    let interned: Vec<_> = names.iter().map(|name| intern(name)).collect();
    for (name, logger_name) in names.iter().zip(interned) {
        assert_eq!(get_name(logger_name.id), Some(name.as_str()));
    }
}
