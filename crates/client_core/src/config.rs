use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5171/api";
pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/documentos/estado";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const SETTINGS_FILE: &str = "arkive.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub webhook_url: String,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            webhook_url: DEFAULT_WEBHOOK_URL.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Defaults, then `arkive.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(Path::new(SETTINGS_FILE), |name| std::env::var(name).ok())
}

pub fn load_settings_from(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(file) {
        let file_cfg = toml::from_str::<HashMap<String, toml::Value>>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", file.display()))?;
        if let Some(v) = file_cfg.get("api_base_url").and_then(toml::Value::as_str) {
            settings.api_base_url = v.to_string();
        }
        if let Some(v) = file_cfg.get("webhook_url").and_then(toml::Value::as_str) {
            settings.webhook_url = v.to_string();
        }
        if let Some(v) = file_cfg
            .get("request_timeout_secs")
            .and_then(toml::Value::as_integer)
        {
            settings.request_timeout = timeout_from_secs(v)?;
        }
    }

    if let Some(v) = env("VITE_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("ARKIVE_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("ARKIVE_WEBHOOK_URL") {
        settings.webhook_url = v;
    }
    if let Some(v) = env("ARKIVE_REQUEST_TIMEOUT_SECS") {
        let secs = v
            .trim()
            .parse::<i64>()
            .with_context(|| format!("ARKIVE_REQUEST_TIMEOUT_SECS is not a number: '{v}'"))?;
        settings.request_timeout = timeout_from_secs(secs)?;
    }

    settings.validate()?;
    Ok(settings)
}

fn timeout_from_secs(secs: i64) -> anyhow::Result<Duration> {
    let secs = u64::try_from(secs)
        .ok()
        .filter(|secs| *secs > 0)
        .with_context(|| format!("request timeout must be a positive number of seconds, got {secs}"))?;
    Ok(Duration::from_secs(secs))
}

impl ClientSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("api_base_url", &self.api_base_url),
            ("webhook_url", &self.webhook_url),
        ] {
            let parsed =
                Url::parse(value).with_context(|| format!("{name} is not a valid url: '{value}'"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("{name} must use http or https, got '{value}'");
            }
        }
        Ok(())
    }
}
