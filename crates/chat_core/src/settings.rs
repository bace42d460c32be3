use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use shared::domain::{Role, UserId};
use url::Url;

use crate::error::{ChatError, Result};

const DEFAULT_SETTINGS_PATH: &str = "chat.toml";
const ENV_PREFIX: &str = "APP";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatSettings {
    pub server_url: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub role: Role,
    pub log_level: String,
    pub request_timeout_ms: u64,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub outbox_capacity: usize,
    pub event_buffer: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            user_id: None,
            role: Role::Client,
            log_level: "info".into(),
            request_timeout_ms: 10_000,
            reconnect_initial_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            outbox_capacity: 64,
            event_buffer: 1024,
        }
    }
}

impl ChatSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms.max(self.reconnect_initial_delay_ms))
    }

    /// Base URL for REST calls, without a trailing slash.
    pub fn http_base(&self) -> Result<String> {
        let url = self.parsed_server_url()?;
        Ok(url.as_str().trim_end_matches('/').to_owned())
    }

    /// WebSocket endpoint carrying the user id as connection context.
    pub fn ws_url(&self, user_id: &UserId) -> Result<Url> {
        let mut url = self.parsed_server_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ChatError::InvalidServerUrl(self.server_url.clone()))?;
        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("user_id", user_id.as_str());
        Ok(url)
    }

    fn parsed_server_url(&self) -> Result<Url> {
        let url = Url::parse(self.server_url.trim())
            .map_err(|_| ChatError::InvalidServerUrl(self.server_url.clone()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ChatError::InvalidServerUrl(self.server_url.clone())),
        }
    }
}

/// Defaults, then the TOML file (`chat.toml` unless `path` is given), then `APP__*` variables.
pub fn load_settings(path: Option<&Path>) -> Result<ChatSettings> {
    load_settings_with_prefix(path, ENV_PREFIX)
}

fn load_settings_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<ChatSettings> {
    let defaults = ChatSettings::default();
    let file_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));

    let settings = Config::builder()
        .set_default("server_url", defaults.server_url)?
        .set_default("role", "client")?
        .set_default("log_level", defaults.log_level)?
        .set_default("request_timeout_ms", defaults.request_timeout_ms)?
        .set_default(
            "reconnect_initial_delay_ms",
            defaults.reconnect_initial_delay_ms,
        )?
        .set_default("reconnect_max_delay_ms", defaults.reconnect_max_delay_ms)?
        .set_default("outbox_capacity", defaults.outbox_capacity as u64)?
        .set_default("event_buffer", defaults.event_buffer as u64)?
        .add_source(
            File::from(file_path)
                .format(FileFormat::Toml)
                .required(path.is_some()),
        )
        .add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
