//! Configuration loading from `PUSHNOTIF_CONFIG_DIR` with env overrides.

use pushnotif::Config;
use std::env;
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

// Global lock to prevent env var pollution between tests
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn setup_test_env() -> (TempDir, std::sync::MutexGuard<'static, ()>) {
    let guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let temp_dir = TempDir::new().unwrap();

    env::remove_var("PUSHNOTIF_API_BASE");
    env::remove_var("PUSHNOTIF_SCOPE");
    env::remove_var("PUSHNOTIF_TIMEOUT_SECS");
    env::set_var("PUSHNOTIF_CONFIG_DIR", temp_dir.path());

    (temp_dir, guard)
}

#[test]
fn test_missing_file_gives_defaults() {
    let (_dir, _guard) = setup_test_env();
    assert_eq!(Config::load().unwrap(), Config::default());
}

#[test]
fn test_file_values_are_loaded() {
    let (dir, _guard) = setup_test_env();
    fs::write(
        dir.path().join("config.json"),
        r#"{"api_base": "https://push.example.com", "start_url": "/inbox"}"#,
    )
    .unwrap();

    let config = Config::load().unwrap();
    assert_eq!(config.api_base, "https://push.example.com");
    assert_eq!(config.start_url, "/inbox");
    assert_eq!(config.scope, Config::default().scope);
}

#[test]
fn test_env_overrides_file() {
    let (dir, _guard) = setup_test_env();
    let saved = Config {
        api_base: "https://from-file.example.com".to_string(),
        ..Config::default()
    };
    saved.save_to(&dir.path().join("config.json")).unwrap();

    env::set_var("PUSHNOTIF_API_BASE", "https://from-env.example.com");
    env::set_var("PUSHNOTIF_TIMEOUT_SECS", "3");
    let config = Config::load().unwrap();
    env::remove_var("PUSHNOTIF_API_BASE");
    env::remove_var("PUSHNOTIF_TIMEOUT_SECS");

    assert_eq!(config.api_base, "https://from-env.example.com");
    assert_eq!(config.request_timeout().as_secs(), 3);
}

#[test]
fn test_invalid_timeout_override_is_ignored() {
    let (_dir, _guard) = setup_test_env();
    env::set_var("PUSHNOTIF_TIMEOUT_SECS", "soon");
    let config = Config::load().unwrap();
    env::remove_var("PUSHNOTIF_TIMEOUT_SECS");

    assert_eq!(config.request_timeout_secs, Config::default().request_timeout_secs);
}
