// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "RELAY_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/relay.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub source: SourceConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    /// Usernames allowed to run /stop and /terminate.
    #[serde(default)]
    pub admins: Vec<String>,
    /// When set, /start works only from this chat.
    #[serde(default)]
    pub allowed_chat_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub bearer_token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval_secs: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fetch_interval_secs: default_fetch_interval(),
            dispatch_interval_secs: default_dispatch_interval(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.twitter.com/1.1".to_string()
}
fn default_fetch_interval() -> u64 {
    70
}
fn default_dispatch_interval() -> u64 {
    20
}
fn default_send_timeout() -> u64 {
    5
}

/// Load config from $RELAY_CONFIG_PATH, falling back to config/relay.toml.
/// Missing or malformed config is fatal; the process should not start.
pub fn load_default() -> Result<Config> {
    let path = match std::env::var(ENV_PATH) {
        Ok(p) => {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            pb
        }
        Err(_) => PathBuf::from(DEFAULT_PATH),
    };
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [telegram]
        token = "123:abc"
        admins = ["alice"]
        allowed_chat_id = -1001

        [source]
        bearer_token = "tok"
        user_id = "42"

        [store]
        path = "state/relay.db"
    "#;

    #[test]
    fn minimal_config_gets_schedule_defaults() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.schedule.fetch_interval_secs, 70);
        assert_eq!(cfg.schedule.dispatch_interval_secs, 20);
        assert_eq!(cfg.source.base_url, "https://api.twitter.com/1.1");
        assert_eq!(cfg.telegram.allowed_chat_id, Some(-1001));
    }

    #[test]
    fn missing_token_is_an_error() {
        let broken = SAMPLE.replace("token = \"123:abc\"", "");
        assert!(toml::from_str::<Config>(&broken).is_err());
    }

    #[test]
    fn load_from_missing_file_fails_with_path_in_context() {
        let err = load_from(Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/relay.toml"));
    }
}
