//! Integration tests for the setting registry contract.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::sync::Arc;

use tandem_core::{
    CollectingSink, QuoteMode, RawRule, Role, SelectPath, SelectionFactory, SettingError,
    SettingRegistry, SettingValue, SettingsHandle,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_registry() -> (SettingRegistry, CollectingSink) {
    let sink = CollectingSink::new();
    let registry = SettingRegistry::with_defaults(Arc::new(sink.clone()));
    (registry, sink)
}

fn occurrences(log: &[String], name: &str) -> usize {
    log.iter().filter(|entry| *entry == name).count()
}

// ============================================================================
// Set / Get / Change Log
// ============================================================================

#[test]
fn test_set_adds_exactly_one_log_entry() {
    let (mut reg, _) = create_registry();
    let values = [
        ("blocksize", SettingValue::from(65536)),
        ("time_separator", SettingValue::from("_")),
        ("server", SettingValue::from(true)),
        ("blocksize", SettingValue::from(4096)),
    ];

    for (name, value) in values {
        let before = occurrences(reg.change_log(), name);
        reg.set(name, value.clone());
        assert_eq!(reg.get(name).unwrap(), &value);
        assert_eq!(occurrences(reg.change_log(), name), before + 1);
    }

    let drained = reg.drain_change_log();
    assert_eq!(
        drained,
        vec!["blocksize", "time_separator", "server", "blocksize"]
    );
}

#[test]
fn test_drain_is_idempotent_without_sets() {
    let (mut reg, _) = create_registry();
    reg.set("resume", false);
    assert_eq!(reg.drain_change_log().len(), 1);
    assert!(reg.drain_change_log().is_empty());
    assert!(reg.drain_change_log().is_empty());
}

#[test]
fn test_set_integer_stores_integer() {
    let (mut reg, sink) = create_registry();
    reg.set_integer("checkpoint_interval", "12").unwrap();
    assert_eq!(
        reg.get("checkpoint_interval").unwrap(),
        &SettingValue::Integer(12)
    );
    assert_eq!(reg.change_log(), ["checkpoint_interval"]);
    assert!(sink.is_empty());
}

#[test]
fn test_set_integer_failure_routes_to_fatal_sink() {
    let (mut reg, sink) = create_registry();
    reg.set("resume_window", 10);
    let value_before = reg.get("resume_window").unwrap().clone();
    let log_before = reg.change_log().to_vec();

    let result = reg.set_integer("resume_window", "abc");

    assert_eq!(
        result,
        Err(SettingError::FatalConfiguration {
            name: "resume_window".to_string(),
            value: "abc".to_string(),
        })
    );
    assert_eq!(reg.get("resume_window").unwrap(), &value_before);
    assert_eq!(reg.change_log(), log_before.as_slice());

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    let (name, message) = &reports[0];
    assert_eq!(name, "resume_window");
    assert!(message.contains("resume_window"));
    assert!(message.contains("abc"));
}

#[test]
fn test_set_integer_on_unset_name_failure_leaves_it_unset() {
    let (mut reg, _) = create_registry();
    assert!(reg.set_integer("fresh", "1.5").is_err());
    assert!(!reg.contains("fresh"));
    assert!(reg.change_log().is_empty());
}

// ============================================================================
// Mapping settings
// ============================================================================

#[test]
fn test_mapping_round_trip_through_handle() {
    let (reg, _) = create_registry();
    let settings = SettingsHandle::new(reg);
    settings.set("uid_map", SettingValue::empty_map());

    settings
        .with(|reg| reg.set_map_entry("uid_map", "1000", 2000))
        .unwrap();

    let entry = settings.with(|reg| reg.get_map_entry("uid_map", "1000").cloned());
    assert_eq!(entry.unwrap(), SettingValue::Integer(2000));
    assert_eq!(settings.drain_change_log(), vec!["uid_map"]);
}

// ============================================================================
// Selection slots
// ============================================================================

#[test]
fn test_selection_slots_are_independent() {
    let (mut reg, _) = create_registry();
    let factory = SelectionFactory::standard();
    let quote_mode = QuoteMode::from_registry(&reg);

    factory
        .build_and_install(
            &mut reg,
            &SelectPath::source("/home"),
            &[RawRule::new("--exclude", "/home/*/.cache")],
            quote_mode.clone(),
            &[],
        )
        .unwrap();
    let source = reg.selection(Role::Source).cloned().unwrap();
    assert!(reg.selection(Role::Mirror).is_none());

    factory
        .build_and_install(
            &mut reg,
            &SelectPath::mirror("/backup"),
            &[RawRule::new("--include", "/backup")],
            quote_mode,
            &[],
        )
        .unwrap();

    assert_eq!(reg.selection(Role::Source), Some(&source));
    assert_eq!(reg.selection(Role::Mirror).unwrap().role(), Role::Mirror);
}
