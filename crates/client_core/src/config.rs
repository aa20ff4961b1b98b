use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::domain::{ModeTags, DEFAULT_MODE_TAG};
use tracing::warn;

pub const CONFIG_FILE: &str = "faceswap.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub space: String,
    pub api_name: String,
    pub mode_tags: ModeTags,
    pub request_timeout_secs: u64,
    pub hf_token: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            space: "felixrosberg/face-swap".into(),
            api_name: "/run_inference".into(),
            mode_tags: ModeTags::from([DEFAULT_MODE_TAG.to_string()]),
            request_timeout_secs: 300,
            hf_token: None,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    space: Option<String>,
    api_name: Option<String>,
    mode_tags: Option<Vec<String>>,
    request_timeout_secs: Option<u64>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_with(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it exists, then environment variables.
pub fn load_settings_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = lookup(&env, &["FACESWAP_SPACE", "APP__SPACE"]) {
        settings.space = v;
    }
    if let Some(v) = lookup(&env, &["FACESWAP_API_NAME", "APP__API_NAME"]) {
        settings.api_name = v;
    }
    if let Some(v) = lookup(&env, &["FACESWAP_MODE_TAGS", "APP__MODE_TAGS"]) {
        settings.mode_tags = parse_mode_tags(&v);
    }
    if let Some(v) = lookup(&env, &["FACESWAP_TIMEOUT_SECS", "APP__REQUEST_TIMEOUT_SECS"]) {
        match v.parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = parsed,
            _ => warn!(value = %v, "ignoring invalid request timeout"),
        }
    }
    if let Some(v) = lookup(&env, &["HF_TOKEN", "APP__HF_TOKEN"]) {
        settings.hf_token = Some(v);
    }

    settings
}

fn apply_file(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.space {
        settings.space = v;
    }
    if let Some(v) = file_cfg.api_name {
        settings.api_name = v;
    }
    if let Some(v) = file_cfg.mode_tags {
        settings.mode_tags = v.into_iter().collect();
    }
    if let Some(v) = file_cfg.request_timeout_secs.filter(|secs| *secs > 0) {
        settings.request_timeout_secs = v;
    }
}

// Later keys win, so `APP__*` aliases override the plain names.
fn lookup(env: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env(key))
        .filter(|v| !v.trim().is_empty())
        .last()
}

pub fn parse_mode_tags(raw: &str) -> ModeTags {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
