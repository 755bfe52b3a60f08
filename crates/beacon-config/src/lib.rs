//! Shared configuration for the beacon CLI.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), the
//! persisted sound preference, and translation to
//! `beacon_core::EngineConfig`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use beacon_core::{AlertConfig, EngineConfig, IncidentFilter, IncidentStatus, Priority};

const KEYRING_SERVICE: &str = "beacon";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse state file: {0}")]
    State(#[from] toml::de::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, falling back to the configured default profile.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|p| (name.clone(), p))
            .ok_or(ConfigError::UnknownProfile { name })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Steady resync interval in seconds.
    #[serde(default = "default_resync_interval")]
    pub resync_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            resync_interval: default_resync_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_resync_interval() -> u64 {
    30
}

/// A named dispatch server profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "https://dispatch.example").
    pub server: String,

    /// Push endpoint path relative to the server URL.
    pub push_path: Option<String>,

    /// Disable the push channel and run pull-only.
    pub push: Option<bool>,

    /// Operator name; scopes the sound preference and notification session.
    pub user: Option<String>,

    /// Bearer token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override steady resync interval (seconds).
    pub resync_interval: Option<u64>,

    /// Resync backoff base (seconds).
    pub backoff_base: Option<u64>,

    /// Resync backoff cap (seconds).
    pub backoff_max: Option<u64>,

    /// Upper bound of random jitter added to each retry (milliseconds).
    pub jitter_max_ms: Option<u64>,

    /// Liveness probe timeout (seconds).
    pub health_timeout: Option<u64>,

    /// Push reconnect attempts before giving up. 0 retries forever.
    pub reconnect_attempts: Option<u32>,

    /// Notification center history bound.
    pub notification_history: Option<usize>,

    /// Per-priority alert tiers.
    pub alerts: Option<AlertConfig>,

    /// Initial view filter.
    #[serde(default)]
    pub filter: FilterSpec,
}

/// Filter as written in TOML, using wire spellings.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub priorities: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub include_closed: bool,
}

impl FilterSpec {
    pub fn to_filter(&self) -> Result<IncidentFilter, ConfigError> {
        let statuses = parse_all::<IncidentStatus>("filter.statuses", &self.statuses)?;
        let priorities = parse_all::<Priority>("filter.priorities", &self.priorities)?;
        Ok(IncidentFilter::default()
            .with_statuses(statuses)
            .with_priorities(priorities)
            .with_types(self.types.iter().cloned())
            .include_closed(self.include_closed))
    }
}

fn parse_all<T: FromStr>(field: &str, values: &[String]) -> Result<Vec<T>, ConfigError> {
    values
        .iter()
        .map(|v| {
            T::from_str(v).map_err(|_| ConfigError::Validation {
                field: field.into(),
                reason: format!("unknown value '{v}'"),
            })
        })
        .collect()
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "beacon", "beacon")
}

fn dirs_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("beacon");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Resolve the state file holding persisted preferences.
pub fn state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join("state.toml"),
        |dirs| dirs.data_dir().join("state.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. Defaults, then the file, then
/// `BEACON_`-prefixed env vars (`__` separates nested keys).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("BEACON_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: profile's `token_env` → `BEACON_TOKEN` →
/// system keyring → plaintext. `None` means connect unauthenticated.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_token_with(
        profile,
        |name| std::env::var(name).ok(),
        || {
            keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_token_with(
    profile: &Profile,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(token) = profile.token_env.as_deref().and_then(&env) {
        return Some(SecretString::from(token));
    }

    // 2. Global env var
    if let Some(token) = env("BEACON_TOKEN") {
        return Some(SecretString::from(token));
    }

    // 3. System keyring
    if let Some(token) = keyring() {
        return Some(SecretString::from(token));
    }

    // 4. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Validation {
            field: "token".into(),
            reason: format!("keyring unavailable: {e}"),
        })
}

// ── EngineConfig translation ────────────────────────────────────────

/// Build an `EngineConfig` from a profile.
pub fn profile_to_engine_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<EngineConfig, ConfigError> {
    let url: url::Url = profile
        .server
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "server".into(),
            reason: format!("invalid URL: {}", profile.server),
        })?;

    let mut config = EngineConfig::new(url);
    config.token = resolve_token(profile, profile_name);
    apply_profile(&mut config, profile, defaults)?;
    Ok(config)
}

fn apply_profile(
    config: &mut EngineConfig,
    profile: &Profile,
    defaults: &Defaults,
) -> Result<(), ConfigError> {
    if let Some(ref path) = profile.push_path {
        config.push_path.clone_from(path);
    }
    config.push_enabled = profile.push.unwrap_or(true);
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.resync.interval = Duration::from_secs(
        profile
            .resync_interval
            .unwrap_or(defaults.resync_interval)
            .max(1),
    );
    if let Some(secs) = profile.backoff_base {
        config.resync.backoff.base = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.backoff_max {
        config.resync.backoff.max = Duration::from_secs(secs);
    }
    if config.resync.backoff.max < config.resync.backoff.base {
        return Err(ConfigError::Validation {
            field: "backoff_max".into(),
            reason: "must not be smaller than backoff_base".into(),
        });
    }
    if let Some(ms) = profile.jitter_max_ms {
        config.resync.backoff.jitter_max = Duration::from_millis(ms);
    }
    if let Some(secs) = profile.health_timeout {
        config.health_timeout = Duration::from_secs(secs);
    }
    if let Some(attempts) = profile.reconnect_attempts {
        config.reconnect.max_retries = (attempts > 0).then_some(attempts);
    }
    if let Some(history) = profile.notification_history {
        config.notification_history = history;
    }
    if let Some(ref alerts) = profile.alerts {
        config.alerts = alerts.clone();
    }
    config.initial_filter = profile.filter.to_filter()?;
    Ok(())
}

// ── Persisted preferences ───────────────────────────────────────────

#[derive(Debug, Default, Deserialize, Serialize)]
struct StateFile {
    /// Sound enabled, keyed by user.
    #[serde(default)]
    sound: BTreeMap<String, bool>,
}

/// Per-user "sound enabled" flag that survives restarts.
#[derive(Debug, Clone)]
pub struct SoundPreference {
    path: PathBuf,
}

impl Default for SoundPreference {
    fn default() -> Self {
        Self::at(state_path())
    }
}

impl SoundPreference {
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults to enabled when nothing was saved.
    pub fn load(&self, user: &str) -> Result<bool, ConfigError> {
        Ok(self.read()?.sound.get(user).copied().unwrap_or(true))
    }

    pub fn save(&self, user: &str, enabled: bool) -> Result<(), ConfigError> {
        let mut state = self.read()?;
        state.sound.insert(user.to_owned(), enabled);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(&state)?)?;
        Ok(())
    }

    fn read(&self) -> Result<StateFile, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateFile::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn token_chain_prefers_profile_env_then_global_then_keyring() {
        let profile = Profile {
            token_env: Some("DISPATCH_TOKEN".into()),
            token: Some("plain".into()),
            ..Profile::default()
        };

        let env = |name: &str| (name == "DISPATCH_TOKEN").then(|| "from-env".to_owned());
        let token = resolve_token_with(&profile, env, || Some("from-keyring".into())).unwrap();
        assert_eq!(token.expose_secret(), "from-env");

        let global = |name: &str| (name == "BEACON_TOKEN").then(|| "global".to_owned());
        let token = resolve_token_with(&profile, global, || None).unwrap();
        assert_eq!(token.expose_secret(), "global");

        let token = resolve_token_with(&profile, |_| None, || Some("from-keyring".into())).unwrap();
        assert_eq!(token.expose_secret(), "from-keyring");

        let token = resolve_token_with(&profile, |_| None, || None).unwrap();
        assert_eq!(token.expose_secret(), "plain");
    }

    #[test]
    fn missing_token_is_not_an_error() {
        assert!(resolve_token_with(&Profile::default(), |_| None, || None).is_none());
    }

    #[test]
    fn profile_overrides_apply() {
        let profile = Profile {
            server: "https://dispatch.example".into(),
            resync_interval: Some(45),
            backoff_base: Some(10),
            backoff_max: Some(120),
            reconnect_attempts: Some(0),
            push: Some(false),
            filter: FilterSpec {
                priorities: vec!["critical".into(), "HIGH".into()],
                ..FilterSpec::default()
            },
            ..Profile::default()
        };
        let mut config = EngineConfig::new("https://dispatch.example".parse().unwrap());
        apply_profile(&mut config, &profile, &Defaults::default()).unwrap();

        assert_eq!(config.resync.interval, Duration::from_secs(45));
        assert_eq!(config.resync.backoff.base, Duration::from_secs(10));
        assert_eq!(config.reconnect.max_retries, None);
        assert!(!config.push_enabled);
        assert_eq!(config.initial_filter.priorities.len(), 2);
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        let profile = Profile {
            backoff_base: Some(600),
            ..Profile::default()
        };
        let mut config = EngineConfig::new("https://dispatch.example".parse().unwrap());
        let err = apply_profile(&mut config, &profile, &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "backoff_max"));
    }

    #[test]
    fn unknown_filter_value_is_rejected() {
        let spec = FilterSpec {
            statuses: vec!["PENDING".into()],
            ..FilterSpec::default()
        };
        assert!(matches!(spec.to_filter(), Err(ConfigError::Validation { .. })));
    }
}
