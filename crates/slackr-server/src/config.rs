//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with no configuration
//! for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use slackr_api::AppConfig;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `SLACKR_HOST`. Default: `0.0.0.0`
    pub host: String,

    /// Env: `SLACKR_PORT`. Default: `5011`
    pub port: u16,

    /// Directory holding the collection snapshots.
    /// Env: `SLACKR_DATA_DIR`. Default: `./data`
    pub data_dir: PathBuf,

    /// Env: `SLACKR_JWT_SECRET`. Default: a development secret.
    pub jwt_secret: String,

    /// Env: `SLACKR_TOKEN_EXPIRY_DAYS`. Default: `30`
    pub token_expiry_days: i64,

    /// Where profile photos are written.
    /// Env: `SLACKR_IMG_DIR`. Default: `./imgs`
    pub img_dir: PathBuf,

    /// Snapshot every collection on shutdown.
    /// Env: `SLACKR_SAVE_ON_SHUTDOWN` (true/false). Default: `true`
    pub save_on_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5011,
            data_dir: PathBuf::from("./data"),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_expiry_days: 30,
            img_dir: PathBuf::from("./imgs"),
            save_on_shutdown: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let config = Self {
            host: lookup("SLACKR_HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "SLACKR_PORT", defaults.port),
            data_dir: lookup("SLACKR_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            jwt_secret: lookup("SLACKR_JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_expiry_days: parsed(&lookup, "SLACKR_TOKEN_EXPIRY_DAYS", defaults.token_expiry_days),
            img_dir: lookup("SLACKR_IMG_DIR").map_or(defaults.img_dir, PathBuf::from),
            save_on_shutdown: parsed(&lookup, "SLACKR_SAVE_ON_SHUTDOWN", defaults.save_on_shutdown),
        };
        if config.jwt_secret == DEV_JWT_SECRET {
            warn!("SLACKR_JWT_SECRET not set, using the development secret");
        }
        config
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            jwt_secret: self.jwt_secret.clone(),
            token_expiry_days: self.token_expiry_days,
            img_dir: self.img_dir.clone(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable {}={:?}", key, raw);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.port, 5011);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert!(config.save_on_shutdown);
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:5011");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SLACKR_PORT", "8080"),
            ("SLACKR_DATA_DIR", "/var/lib/slackr"),
            ("SLACKR_SAVE_ON_SHUTDOWN", "false"),
            ("SLACKR_TOKEN_EXPIRY_DAYS", "7"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/slackr"));
        assert!(!config.save_on_shutdown);
        assert_eq!(config.app_config().token_expiry_days, 7);
    }

    #[test]
    fn test_bad_value_falls_back() {
        assert_eq!(config(&[("SLACKR_PORT", "not-a-port")]).port, 5011);
    }
}
