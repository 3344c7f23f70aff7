use crate::net::game::ProtocolFeatures;
use crate::world::viewport::AwareRange;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LOGIN_ADDR: &str = "127.0.0.1:7171";
pub const DEFAULT_CLIENT_VERSION: u16 = 772;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("usage: tibia-client <config.yaml>")]
    Usage,
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid address '{0}', expected host:port")]
    Address(String),
    #[error("invalid value for {key}: '{value}'")]
    Value { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    #[serde(alias = "ws")]
    WebSocket,
}

/// Everything the headless client needs to log in and play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Directory receiving `log/`; console-only logging when unset.
    pub root: Option<PathBuf>,
    pub log_level: String,
    pub login_addr: String,
    /// Replaces the address the character list names.
    pub game_addr: Option<String>,
    pub account: String,
    pub password: String,
    pub character: String,
    pub client_os: u16,
    pub client_version: u16,
    pub transport: TransportKind,
    pub ws_path: String,
    pub frame_interval_ms: u64,
    /// `objects.srv` describing item types; an empty table is used without it.
    pub item_types: Option<PathBuf>,
    pub aware_range: AwareRange,
    pub features: ProtocolFeatures,
    /// Stop after this long; runs until disconnected when unset.
    pub run_seconds: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root: None,
            log_level: "info".to_string(),
            login_addr: DEFAULT_LOGIN_ADDR.to_string(),
            game_addr: None,
            account: String::new(),
            password: String::new(),
            character: String::new(),
            client_os: 2,
            client_version: DEFAULT_CLIENT_VERSION,
            transport: TransportKind::Tcp,
            ws_path: "/".to_string(),
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            item_types: None,
            aware_range: AwareRange::default(),
            features: ProtocolFeatures::legacy(),
            run_seconds: None,
        }
    }
}

impl ClientConfig {
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let path = args.get(1).ok_or(ConfigError::Usage)?;
        let mut config = Self::load(Path::new(path))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Applies `TIBIA_*` overrides; blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key).and_then(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };
        if let Some(addr) = value("TIBIA_LOGIN_ADDR") {
            self.login_addr = addr;
        }
        if let Some(addr) = value("TIBIA_GAME_ADDR") {
            self.game_addr = Some(addr);
        }
        if let Some(account) = value("TIBIA_ACCOUNT") {
            self.account = account;
        }
        if let Some(password) = value("TIBIA_PASSWORD") {
            self.password = password;
        }
        if let Some(character) = value("TIBIA_CHARACTER") {
            self.character = character;
        }
        if let Some(transport) = value("TIBIA_TRANSPORT") {
            self.transport = match transport.to_ascii_lowercase().as_str() {
                "tcp" => TransportKind::Tcp,
                "ws" | "websocket" => TransportKind::WebSocket,
                _ => {
                    return Err(ConfigError::Value {
                        key: "TIBIA_TRANSPORT",
                        value: transport,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn login_endpoint(&self) -> Result<(String, u16), ConfigError> {
        split_addr(&self.login_addr)
    }

    pub fn game_endpoint(&self) -> Result<Option<(String, u16)>, ConfigError> {
        self.game_addr.as_deref().map(split_addr).transpose()
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

pub fn split_addr(addr: &str) -> Result<(String, u16), ConfigError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::Address(addr.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::Address(addr.to_string()))?;
    if host.is_empty() {
        return Err(ConfigError::Address(addr.to_string()));
    }
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gives_classic_defaults() {
        let config = ClientConfig::from_yaml("").expect("parse");
        assert_eq!(config.login_endpoint().expect("addr"), ("127.0.0.1".to_string(), 7171));
        assert_eq!(config.client_version, 772);
        assert_eq!(config.frame_interval(), Duration::from_millis(50));
        assert_eq!(config.aware_range, AwareRange::default());
        assert_eq!(config.features, ProtocolFeatures::legacy());
        assert_eq!(config.game_endpoint().expect("addr"), None);
    }

    #[test]
    fn yaml_fields_and_nested_features() {
        let config = ClientConfig::from_yaml(
            "account: \"111111\"\n\
             password: tibia\n\
             character: Knight\n\
             transport: ws\n\
             game_addr: 10.0.0.2:7172\n\
             features:\n  xtea: true\n  creature_unpassable: true\n\
             aware_range:\n  left: 9\n",
        )
        .expect("parse");
        assert_eq!(config.account, "111111");
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert!(config.features.xtea);
        assert!(config.features.creature_unpassable);
        assert!(!config.features.container_pagination);
        assert_eq!(config.aware_range.left, 9);
        assert_eq!(config.aware_range.bottom, 7);
        assert_eq!(
            config.game_endpoint().expect("addr"),
            Some(("10.0.0.2".to_string(), 7172))
        );
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TIBIA_LOGIN_ADDR", "login.example:7171"),
            ("TIBIA_CHARACTER", " Druid "),
            ("TIBIA_PASSWORD", "   "),
            ("TIBIA_TRANSPORT", "TCP"),
        ]);
        let mut config = ClientConfig::from_yaml("password: kept\ntransport: websocket\n")
            .expect("parse");
        config
            .apply_env(|key| env.get(key).map(|value| value.to_string()))
            .expect("env");
        assert_eq!(config.login_addr, "login.example:7171");
        assert_eq!(config.character, "Druid");
        assert_eq!(config.password, "kept");
        assert_eq!(config.transport, TransportKind::Tcp);
    }

    #[test]
    fn bad_values_are_reported() {
        let mut config = ClientConfig::default();
        let err = config
            .apply_env(|key| (key == "TIBIA_TRANSPORT").then(|| "carrier-pigeon".to_string()))
            .expect_err("bad transport");
        assert!(matches!(err, ConfigError::Value { key: "TIBIA_TRANSPORT", .. }));
        assert!(matches!(split_addr("nohost"), Err(ConfigError::Address(_))));
        assert!(matches!(split_addr(":7171"), Err(ConfigError::Address(_))));
        assert!(matches!(split_addr("host:99999"), Err(ConfigError::Address(_))));
        assert!(matches!(ClientConfig::from_yaml("login_addr: [1, 2"), Err(ConfigError::Parse(_))));
        assert!(matches!(ClientConfig::from_args(&["tibia-client".to_string()]), Err(ConfigError::Usage)));
    }
}
