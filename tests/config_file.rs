// tests/config_file.rs

use std::path::Path;

use spc_notifier::config::{load_config, load_config_from, LogFormat};
use spc_notifier::SummaryMode;

const EXAMPLE: &str = "config/spc_notifier.example.toml";

#[serial_test::serial]
#[test]
fn example_config_loads_with_env_webhook() {
    std::env::set_var("SPC_WATCHES_WEBHOOK", "https://discord.test/watches");
    let cfg = load_config_from(Path::new(EXAMPLE)).expect("example config parses");
    std::env::remove_var("SPC_WATCHES_WEBHOOK");

    assert!(cfg.mapserver.enabled);
    assert!(!cfg.summarizer.enabled);
    assert_eq!(cfg.log_format, LogFormat::Compact);
    assert_eq!(cfg.webhooks.len(), 2);

    let midwest = &cfg.webhooks[0];
    assert_eq!(midwest.summary_mode, SummaryMode::Generated);
    assert_eq!(midwest.filters.summary_must_include_one.len(), 4);

    let watches = &cfg.webhooks[1];
    assert_eq!(watches.url, "https://discord.test/watches");
    assert!(watches.mention_id.is_empty());
    assert_eq!(watches.filters.title_must_include_one, vec!["Watch".to_string()]);
}

#[serial_test::serial]
#[test]
fn example_config_without_env_webhook_fails() {
    std::env::remove_var("SPC_WATCHES_WEBHOOK");
    let err = load_config_from(Path::new(EXAMPLE)).unwrap_err();
    assert!(format!("{err:#}").contains("SPC_WATCHES_WEBHOOK"));
}

#[serial_test::serial]
#[test]
fn enabled_summarizer_requires_api_key() {
    std::env::remove_var("ANTHROPIC_API_KEY");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notifier.toml");
    std::fs::write(
        &path,
        "[summarizer]\nenabled = true\n\n[[webhooks]]\nurl = \"https://discord.test/a\"\n",
    )
    .unwrap();

    let err = load_config(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("ANTHROPIC_API_KEY"));

    std::env::set_var("ANTHROPIC_API_KEY", "sk-test");
    let cfg = load_config(Some(&path)).unwrap();
    assert_eq!(cfg.summarizer.api_key, "sk-test");
    std::env::remove_var("ANTHROPIC_API_KEY");
}

#[test]
fn missing_explicit_file_is_an_error() {
    let err = load_config(Some(Path::new("does/not/exist.toml"))).unwrap_err();
    assert!(format!("{err:#}").contains("does/not/exist.toml"));
}
