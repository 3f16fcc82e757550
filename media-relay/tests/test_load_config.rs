use media_relay::load_config::load_config;
use media_relay_core::config::CaptionPolicy;
use media_relay_core::source::SourceAction;
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

/// A config naming only the source gets every other section from defaults.
#[test]
#[serial]
fn test_load_config_minimal_uses_defaults() {
    env::remove_var("MAX_RESULTS");
    let file = config_file(
        r#"
source:
  type: instagram
  profile_url: "https://www.instagram.com/example/"
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    match &config.source {
        SourceAction::Instagram(ig) => {
            assert_eq!(ig.profile_url, "https://www.instagram.com/example/")
        }
        other => panic!("Unexpected source {other:?}"),
    }
    assert_eq!(config.relay.batch_limit, 5);
    assert_eq!(config.relay.ledger_path, PathBuf::from("posted_cache.json"));
    assert_eq!(config.fetch.retries, 2);
    assert_eq!(config.fetch.backoff_secs, 3);
    assert_eq!(config.yt_dlp.program, "yt-dlp");
    assert_eq!(config.publish.caption, CaptionPolicy::Always);
    assert_eq!(config.publish.privacy.as_deref(), Some("EVERYONE"));
}

#[test]
#[serial]
fn test_load_config_full_telegram() {
    env::remove_var("MAX_RESULTS");
    let file = config_file(
        r#"
source:
  type: telegram
  chat: "@relaychan"
  api_base: "http://localhost:9000"
relay:
  batch_limit: 10
  work_dir: /var/tmp/relay
  ledger_path: /var/lib/relay/posted.json
fetch:
  retries: 4
  backoff_secs: 1
  timeout_secs: 60
publish:
  graph_version: v22.0
  caption: omit_when_empty
  published: false
  privacy: null
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    match &config.source {
        SourceAction::Telegram(t) => {
            assert_eq!(t.chat, "@relaychan");
            assert_eq!(t.api_base.as_deref(), Some("http://localhost:9000"));
        }
        other => panic!("Unexpected source {other:?}"),
    }
    assert_eq!(config.relay.batch_limit, 10);
    assert_eq!(config.relay.work_dir, PathBuf::from("/var/tmp/relay"));
    assert_eq!(config.fetch.retries, 4);
    assert_eq!(config.fetch.timeout_secs, 60);
    assert_eq!(config.publish.graph_version, "v22.0");
    assert_eq!(config.publish.caption, CaptionPolicy::OmitWhenEmpty);
    assert!(!config.publish.published);
    assert_eq!(config.publish.privacy, None);
}

#[test]
#[serial]
fn test_max_results_overrides_batch_limit() {
    env::set_var("MAX_RESULTS", "3");
    let file = config_file(
        r#"
source:
  type: youtube
  channel_url: "https://www.youtube.com/@example/videos"
relay:
  batch_limit: 10
"#,
    );

    let config = load_config(file.path());
    env::remove_var("MAX_RESULTS");

    assert_eq!(config.expect("Config should load").relay.batch_limit, 3);
}

#[test]
#[serial]
fn test_invalid_max_results_is_rejected() {
    env::set_var("MAX_RESULTS", "lots");
    let file = config_file(
        r#"
source:
  type: youtube
  channel_url: "https://www.youtube.com/@example/videos"
"#,
    );

    let result = load_config(file.path());
    env::remove_var("MAX_RESULTS");

    let msg = result.unwrap_err().to_string();
    assert!(msg.contains("MAX_RESULTS"), "got: {msg}");
}

#[test]
#[serial]
fn test_load_config_errors_for_unknown_source_type() {
    env::remove_var("MAX_RESULTS");
    let file = config_file(
        r#"
source:
  type: tiktok
  profile_url: "https://example.invalid"
"#,
    );

    let msg = load_config(file.path()).unwrap_err().to_string();
    assert!(msg.contains("parse") || msg.contains("YAML"), "got: {msg}");
}

#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    let file = config_file("not-yaml: [:::");
    let msg = load_config(file.path()).unwrap_err().to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
fn test_load_config_errors_for_missing_file() {
    let msg = load_config("/definitely/not/here/relay.yaml")
        .unwrap_err()
        .to_string();
    assert!(msg.contains("Failed to read config file"), "got: {msg}");
}
