use std::{fs, time::Duration};

use anyhow::Context;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub orchestrator_url: String,
    pub obs_state_url: String,
    pub http_timeout_ms: u64,
    pub obs_retry_delay_ms: u64,
    pub sync_debounce_ms: u64,
    pub sync_on_startup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8919".into(),
            database_url: "sqlite://./data/mappings.db".into(),
            orchestrator_url: "http://127.0.0.1:8080/app-state".into(),
            obs_state_url: "http://127.0.0.1:8090/obsState".into(),
            http_timeout_ms: 2000,
            obs_retry_delay_ms: 100,
            sync_debounce_ms: 0,
            sync_on_startup: true,
        }
    }
}

/// `server.toml` key, then the plain and the `APP__` environment names.
/// Later sources win.
const KEYS: &[(&str, &str, &str)] = &[
    ("bind_addr", "SERVER_BIND", "APP__BIND_ADDR"),
    ("database_url", "DATABASE_URL", "APP__DATABASE_URL"),
    ("orchestrator_url", "ORCHESTRATOR_URL", "APP__ORCHESTRATOR_URL"),
    ("obs_state_url", "OBS_STATE_URL", "APP__OBS_STATE_URL"),
    ("http_timeout_ms", "HTTP_TIMEOUT_MS", "APP__HTTP_TIMEOUT_MS"),
    ("obs_retry_delay_ms", "OBS_RETRY_DELAY_MS", "APP__OBS_RETRY_DELAY_MS"),
    ("sync_debounce_ms", "SYNC_DEBOUNCE_MS", "APP__SYNC_DEBOUNCE_MS"),
    ("sync_on_startup", "SYNC_ON_STARTUP", "APP__SYNC_ON_STARTUP"),
];

impl Settings {
    pub fn orchestrator_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.orchestrator_url)
            .with_context(|| format!("invalid orchestrator_url '{}'", self.orchestrator_url))
    }

    pub fn obs_state_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.obs_state_url)
            .with_context(|| format!("invalid obs_state_url '{}'", self.obs_state_url))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn obs_retry_delay(&self) -> Duration {
        Duration::from_millis(self.obs_retry_delay_ms)
    }

    pub fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }

    fn apply_file(&mut self, raw: &str) {
        let table = match toml::from_str::<toml::Table>(raw) {
            Ok(table) => table,
            Err(error) => {
                warn!(%error, "ignoring unreadable server.toml");
                return;
            }
        };
        for (key, _, _) in KEYS {
            let value = match table.get(*key) {
                Some(toml::Value::String(v)) => v.clone(),
                Some(toml::Value::Integer(v)) => v.to_string(),
                Some(toml::Value::Boolean(v)) => v.to_string(),
                Some(other) => {
                    warn!(key, value = %other, "unsupported value type in server.toml");
                    continue;
                }
                None => continue,
            };
            self.set(key, &value);
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (key, plain, prefixed) in KEYS {
            if let Some(v) = lookup(plain) {
                self.set(key, &v);
            }
            if let Some(v) = lookup(prefixed) {
                self.set(key, &v);
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "bind_addr" => self.server_bind = value.to_string(),
            "database_url" => self.database_url = value.to_string(),
            "orchestrator_url" => self.orchestrator_url = value.to_string(),
            "obs_state_url" => self.obs_state_url = value.to_string(),
            "http_timeout_ms" => set_parsed(&mut self.http_timeout_ms, key, value),
            "obs_retry_delay_ms" => set_parsed(&mut self.obs_retry_delay_ms, key, value),
            "sync_debounce_ms" => set_parsed(&mut self.sync_debounce_ms, key, value),
            "sync_on_startup" => set_parsed(&mut self.sync_on_startup, key, value),
            _ => {}
        }
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "ignoring unparsable setting"),
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string("server.toml") {
        settings.apply_file(&raw);
    }
    settings.apply_env(|name| std::env::var(name).ok());
    settings
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
