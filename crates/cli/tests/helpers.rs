use std::fs;

use drvgraph::commands::{template_config, ConfigOverrides};
use drvgraph::{canonicalize_or_current, parse_log_level};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");
    assert_eq!(result, expected);

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn canonicalize_or_current_keeps_missing_paths_absolute() {
    let tmp = tempdir().expect("tempdir");
    let existing = tmp.path().join("nested");
    fs::create_dir_all(&existing).expect("create nested");

    let resolved = canonicalize_or_current(existing.to_str().expect("utf8")).expect("resolve");
    assert_eq!(resolved, existing.canonicalize().expect("canon"));

    let missing = canonicalize_or_current("does-not-exist-yet").expect("resolve missing");
    assert!(missing.is_absolute());
    assert!(missing.ends_with("does-not-exist-yet"));
}

#[test]
fn log_levels_map_with_info_fallback() {
    assert_eq!(parse_log_level("debug"), log::LevelFilter::Debug);
    assert_eq!(parse_log_level("WARN"), log::LevelFilter::Warn);
    assert_eq!(parse_log_level("off"), log::LevelFilter::Off);
    assert_eq!(parse_log_level("chatty"), log::LevelFilter::Info);
}

#[test]
fn template_config_has_valid_pattern_and_default_tool() {
    let config = template_config();
    assert!(drvgraph_core::analysis::disasm::EntryMatcher::new(&config.entry_pattern).is_ok());
    assert_eq!(config.objdump, drvgraph_core::config::DEFAULT_OBJDUMP);
    assert!(config.driver_path.starts_with(&config.build_path));
}

#[test]
fn overrides_default_to_none() {
    let overrides = ConfigOverrides::default();
    assert!(overrides.build_path.is_none());
    assert!(overrides.entry_pattern.is_none());
}
