//! Configuration for the pairgate server and CLI.
//!
//! Layering, lowest to highest priority: built-in defaults, the TOML file,
//! `PAIRGATE__SECTION__KEY` environment variables, then the bare `PORT` and
//! `ADMIN_NUMBER` variables. The result is validated and translated into
//! `pairgate_core::SessionConfig` and `pairgate_api::BridgeConfig`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use pairgate_api::BridgeConfig;
use pairgate_core::{ReconnectPolicy, SessionConfig, normalize_phone_number};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of layered environment variables; `__` separates sections.
pub const ENV_PREFIX: &str = "PAIRGATE__";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {path}")]
    MissingFile { path: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Config {
    /// Number handed group admin rights by the `!quit` chat command.
    #[serde(
        default,
        deserialize_with = "digits_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub admin_number: Option<String>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionSection,
}

/// Environment values that look numeric arrive as numbers.
fn digits_or_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    }))
}

/// `[server]`: the HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Static frontend served at `/`.
    pub public_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            public_dir: PathBuf::from("public"),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// `[session]`: credential location, protocol bridge and every timing knob.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSection {
    pub auth_dir: PathBuf,
    pub bridge_url: String,
    pub cooldown_secs: u64,
    pub pairing_code_ttl_secs: u64,
    pub reconnect_delay_secs: u64,
    /// Upper bound for reconnect backoff. Equal to `reconnect_delay_secs`
    /// when unset, which keeps the delay fixed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_max_delay_secs: Option<u64>,
    pub teardown_pause_ms: u64,
    pub connect_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub settle_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub resume_on_start: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            auth_dir: PathBuf::from("./auth_info"),
            bridge_url: pairgate_api::bridge::DEFAULT_BRIDGE_URL.into(),
            cooldown_secs: 120,
            pairing_code_ttl_secs: 60,
            reconnect_delay_secs: 5,
            reconnect_max_delay_secs: None,
            teardown_pause_ms: 2_000,
            connect_timeout_secs: 30,
            ready_timeout_secs: 30,
            settle_delay_secs: 3,
            request_timeout_secs: 30,
            resume_on_start: true,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "pairgate", "pairgate").map_or_else(
        || PathBuf::from(".").join("pairgate").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered figment. `path` overrides the platform config file.
pub fn figment(path: Option<&Path>) -> Figment {
    let file = path.map_or_else(config_path, Path::to_path_buf);

    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
        .merge(Env::raw().only(&["ADMIN_NUMBER"]))
}

/// Load and validate the configuration.
///
/// An explicitly given `path` must exist; the platform default may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::MissingFile {
                path: path.display().to_string(),
            });
        }
    }
    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(number) = &self.admin_number {
            normalize_phone_number(number).map_err(|e| invalid("admin_number", e.to_string()))?;
        }

        let session = &self.session;
        self.bridge_url()?;
        for (field, value) in [
            ("session.cooldown_secs", session.cooldown_secs),
            ("session.pairing_code_ttl_secs", session.pairing_code_ttl_secs),
            ("session.reconnect_delay_secs", session.reconnect_delay_secs),
            ("session.connect_timeout_secs", session.connect_timeout_secs),
            ("session.ready_timeout_secs", session.ready_timeout_secs),
            ("session.request_timeout_secs", session.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if let Some(max) = session.reconnect_max_delay_secs {
            if max < session.reconnect_delay_secs {
                return Err(invalid(
                    "session.reconnect_max_delay_secs",
                    format!("must be at least reconnect_delay_secs ({})", session.reconnect_delay_secs),
                ));
            }
        }
        Ok(())
    }

    fn bridge_url(&self) -> Result<url::Url, ConfigError> {
        let raw = &self.session.bridge_url;
        let url = url::Url::parse(raw)
            .map_err(|e| invalid("session.bridge_url", format!("{raw}: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(invalid(
                "session.bridge_url",
                format!("expected a ws:// or wss:// URL, got '{other}'"),
            )),
        }
    }

    /// Build the controller's runtime configuration.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        self.validate()?;
        let s = &self.session;
        let initial_delay = Duration::from_secs(s.reconnect_delay_secs);

        Ok(SessionConfig {
            auth_dir: s.auth_dir.clone(),
            admin_number: self
                .admin_number
                .as_deref()
                .map(normalize_phone_number)
                .transpose()
                .map_err(|e| invalid("admin_number", e.to_string()))?,
            cooldown: Duration::from_secs(s.cooldown_secs),
            pairing_code_ttl: Duration::from_secs(s.pairing_code_ttl_secs),
            reconnect: ReconnectPolicy {
                initial_delay,
                max_delay: s
                    .reconnect_max_delay_secs
                    .map_or(initial_delay, Duration::from_secs),
            },
            teardown_pause: Duration::from_millis(s.teardown_pause_ms),
            connect_timeout: Duration::from_secs(s.connect_timeout_secs),
            ready_timeout: Duration::from_secs(s.ready_timeout_secs),
            settle_delay: Duration::from_secs(s.settle_delay_secs),
            request_timeout: Duration::from_secs(s.request_timeout_secs),
            resume_on_start: s.resume_on_start,
        })
    }

    /// Build the protocol bridge configuration.
    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        Ok(BridgeConfig {
            url: self.bridge_url()?,
            request_timeout: Duration::from_secs(self.session.request_timeout_secs),
        })
    }
}
