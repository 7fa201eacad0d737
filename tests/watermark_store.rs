// tests/watermark_store.rs
use std::fs;

use discord_x_notifier::state::{per_handle_path, temp_path, StoreScope, WatermarkStore};
use discord_x_notifier::types::PostId;

#[test]
fn persisted_ids_are_decimal_strings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last-seen.json");
    let mut s = WatermarkStore::empty(&path);
    s.set("alice", PostId::new(1_790_000_000_000_000_001));
    s.persist().unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["alice"], serde_json::json!("1790000000000000001"));
}

#[test]
fn reload_sees_last_persisted_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let scope = StoreScope::Shared {
        path: dir.path().join("last-seen.json"),
    };
    let mut s = WatermarkStore::load(&scope);
    assert!(s.entries().is_empty());
    s.advance("alice", PostId::new(10));
    s.advance("bob", PostId::new(20));
    s.persist().unwrap();

    let again = WatermarkStore::load(&scope);
    assert_eq!(again.get("alice"), Some(PostId::new(10)));
    assert_eq!(again.get("bob"), Some(PostId::new(20)));
}

#[test]
fn stale_temp_file_does_not_shadow_durable_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last-seen.json");
    let mut s = WatermarkStore::empty(&path);
    s.set("alice", PostId::new(5));
    s.persist().unwrap();

    // Crash mid-write leaves a half-written temp file behind.
    fs::write(temp_path(&path), br#"{"alice":"9"#).unwrap();

    let reloaded = WatermarkStore::load(&StoreScope::Shared { path: path.clone() });
    assert_eq!(reloaded.get("alice"), Some(PostId::new(5)));

    // The next write replaces the leftover.
    let mut s = reloaded;
    s.advance("alice", PostId::new(6));
    s.persist().unwrap();
    assert!(!temp_path(&path).exists());
    let reloaded = WatermarkStore::load(&StoreScope::Shared { path });
    assert_eq!(reloaded.get("alice"), Some(PostId::new(6)));
}

#[test]
fn malformed_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last-seen.json");
    fs::write(&path, "not json at all").unwrap();
    let s = WatermarkStore::load(&StoreScope::Shared { path });
    assert!(s.entries().is_empty());
}

#[test]
fn per_handle_store_migrates_from_legacy_file() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("last-seen.json");
    fs::write(&legacy, r#"{"alice":"42","bob":"7"}"#).unwrap();

    let scope = StoreScope::PerHandle {
        handle: "alice".into(),
        dir: dir.path().join("state"),
        legacy_path: Some(legacy.clone()),
    };
    let s = WatermarkStore::load(&scope);
    assert_eq!(s.get("alice"), Some(PostId::new(42)));
    assert_eq!(s.get("bob"), None);
    assert_eq!(s.path(), per_handle_path(&dir.path().join("state"), "alice"));

    s.persist().unwrap();
    assert!(dir.path().join("state/last-seen-alice.json").exists());
    // Legacy file is left alone.
    assert!(fs::read_to_string(&legacy).unwrap().contains("bob"));
}

#[test]
fn existing_per_handle_file_wins_over_legacy() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("last-seen.json");
    fs::write(&legacy, r#"{"alice":"42"}"#).unwrap();
    let state_dir = dir.path().join("state");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(per_handle_path(&state_dir, "alice"), r#"{"alice":"50"}"#).unwrap();

    let s = WatermarkStore::load(&StoreScope::PerHandle {
        handle: "alice".into(),
        dir: state_dir,
        legacy_path: Some(legacy),
    });
    assert_eq!(s.get("alice"), Some(PostId::new(50)));
}

#[test]
fn missing_legacy_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let s = WatermarkStore::load(&StoreScope::PerHandle {
        handle: "alice".into(),
        dir: dir.path().to_path_buf(),
        legacy_path: Some(dir.path().join("nope.json")),
    });
    assert_eq!(s.get("alice"), None);
}
