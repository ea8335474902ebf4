use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::query_session::{Delivery, QueryOptions, DEFAULT_TOP_K};

pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub top_k: u32,
    pub use_reranker: bool,
    pub stream: bool,
    pub request_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".into(),
            top_k: DEFAULT_TOP_K,
            use_reranker: true,
            stream: false,
            request_timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn base_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.server_url.trim())
            .with_context(|| format!("invalid server url: {}", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("server url must use http or https: {}", self.server_url);
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            top_k: self.top_k,
            use_reranker: self.use_reranker,
            delivery: if self.stream {
                Delivery::Streamed
            } else {
                Delivery::Complete
            },
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file if present, then environment.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<Settings>(&raw) {
            Ok(file_cfg) => settings = file_cfg,
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("RAG_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("APP__TOP_K") {
        match v.parse::<u32>() {
            Ok(parsed) if parsed > 0 => settings.top_k = parsed,
            _ => warn!(value = %v, "ignoring invalid APP__TOP_K"),
        }
    }

    if let Some(v) = env("APP__USE_RERANKER") {
        if let Some(parsed) = parse_flag(&v) {
            settings.use_reranker = parsed;
        }
    }
    if let Some(v) = env("APP__STREAM") {
        if let Some(parsed) = parse_flag(&v) {
            settings.stream = parsed;
        }
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = Some(parsed);
        }
    }

    settings
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
