#![allow(clippy::unwrap_used)]
// File-backed tests for config loading and persisted preferences.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use beacon_config::{
    Config, ConfigError, Profile, SoundPreference, load_config_from, profile_to_engine_config,
    save_config_to,
};
use beacon_core::Priority;

const SAMPLE: &str = r#"
default_profile = "north"

[defaults]
timeout = 15

[profiles.north]
server = "https://north.dispatch.example"
user = "dispatcher-7"
resync_interval = 20
token = "plain-token"

[profiles.north.filter]
priorities = ["CRITICAL", "high"]
types = ["FIRE"]

[profiles.north.alerts.low]
playSound = true
toastDurationMs = 2000
loopSound = false
"#;

fn write(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.default_profile.as_deref(), Some("default"));
    assert_eq!(cfg.defaults.timeout, 30);
    assert!(cfg.profiles.is_empty());
}

#[test]
fn profile_translates_to_engine_config() {
    let dir = TempDir::new().unwrap();
    let cfg = load_config_from(&write(&dir, SAMPLE)).unwrap();
    let (name, profile) = cfg.profile(None).unwrap();
    assert_eq!(name, "north");

    let engine = profile_to_engine_config(profile, &name, &cfg.defaults).unwrap();
    assert_eq!(engine.timeout, Duration::from_secs(15));
    assert_eq!(engine.resync.interval, Duration::from_secs(20));
    assert!(engine.initial_filter.priorities.contains(&Priority::High));
    assert!(engine.initial_filter.types.contains("FIRE"));
    assert!(engine.alerts.low.play_sound);
    assert!(engine.token.is_some());
}

#[test]
fn unknown_profile_is_reported() {
    let dir = TempDir::new().unwrap();
    let cfg = load_config_from(&write(&dir, SAMPLE)).unwrap();
    let err = cfg.profile(Some("south")).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownProfile { ref name } if name == "south"));
}

#[test]
fn invalid_server_url_is_a_validation_error() {
    let profile = Profile {
        server: "not a url".into(),
        ..Profile::default()
    };
    let err = profile_to_engine_config(&profile, "bad", &Config::default().defaults).unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "server"));
}

#[test]
fn saved_config_reloads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.profiles.insert(
        "ops".into(),
        Profile {
            server: "https://ops.example".into(),
            push: Some(false),
            ..Profile::default()
        },
    );
    save_config_to(&cfg, &path).unwrap();

    let reloaded = load_config_from(&path).unwrap();
    let (_, ops) = reloaded.profile(Some("ops")).unwrap();
    assert_eq!(ops.server, "https://ops.example");
    assert_eq!(ops.push, Some(false));
}

#[test]
fn sound_preference_defaults_on_and_is_scoped_per_user() {
    let dir = TempDir::new().unwrap();
    let prefs = SoundPreference::at(dir.path().join("state").join("state.toml"));

    assert!(prefs.load("dispatcher-7").unwrap());

    prefs.save("dispatcher-7", false).unwrap();
    assert!(!prefs.load("dispatcher-7").unwrap());
    assert!(prefs.load("supervisor").unwrap());

    // A fresh handle over the same file sees the saved value.
    let reopened = SoundPreference::at(prefs.path().to_path_buf());
    assert!(!reopened.load("dispatcher-7").unwrap());
}

#[test]
fn corrupt_state_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.toml");
    std::fs::write(&path, "sound = [").unwrap();
    let prefs = SoundPreference::at(path);
    assert!(matches!(prefs.load("anyone"), Err(ConfigError::State(_))));
}
