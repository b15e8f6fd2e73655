use std::{fs, io, path::Path, time::Duration};

use anyhow::Context;
use client_core::{hosted::DEFAULT_IMAGE_BUCKET, HostedConfig, SubmissionOptions};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub backend_url: String,
    pub backend_anon_key: String,
    pub image_bucket: String,
    pub remove_orphaned_images: bool,
    pub request_timeout_secs: u64,
    pub recent_reviews_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            backend_url: "http://127.0.0.1:54321".into(),
            backend_anon_key: String::new(),
            image_bucket: DEFAULT_IMAGE_BUCKET.into(),
            remove_orphaned_images: false,
            request_timeout_secs: 30,
            recent_reviews_limit: 20,
        }
    }
}

impl Settings {
    pub fn hosted_config(&self) -> HostedConfig {
        HostedConfig {
            base_url: self.backend_url.clone(),
            anon_key: self.backend_anon_key.clone(),
            image_bucket: self.image_bucket.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn submission_options(&self) -> SubmissionOptions {
        SubmissionOptions {
            remove_orphaned_images: self.remove_orphaned_images,
        }
    }
}

/// Keys accepted in `server.toml`. Anything left out keeps its default.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    #[serde(alias = "bind_addr")]
    server_bind: Option<String>,
    backend_url: Option<String>,
    backend_anon_key: Option<String>,
    image_bucket: Option<String>,
    remove_orphaned_images: Option<bool>,
    request_timeout_secs: Option<u64>,
    recent_reviews_limit: Option<usize>,
}

/// Defaults, then `server.toml`, then the process environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new(DEFAULT_SETTINGS_FILE))?;
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, path: &Path) -> anyhow::Result<()> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    apply_toml(settings, &raw).with_context(|| format!("invalid settings in '{}'", path.display()))
}

fn apply_toml(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file_cfg.server_bind {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.backend_anon_key {
        settings.backend_anon_key = v;
    }
    if let Some(v) = file_cfg.image_bucket {
        settings.image_bucket = v;
    }
    if let Some(v) = file_cfg.remove_orphaned_images {
        settings.remove_orphaned_images = v;
    }
    match file_cfg.request_timeout_secs {
        Some(0) => warn!("config: ignoring request_timeout_secs = 0"),
        Some(v) => settings.request_timeout_secs = v,
        None => {}
    }
    if let Some(v) = file_cfg.recent_reviews_limit {
        settings.recent_reviews_limit = v;
    }
    Ok(())
}

/// Plain names first, `APP__` prefixed names win when both are set.
fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(&format!("APP__{name}")).or_else(|| lookup(name));

    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(v) = var("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = var("BACKEND_ANON_KEY") {
        settings.backend_anon_key = v;
    }
    if let Some(v) = var("IMAGE_BUCKET") {
        settings.image_bucket = v;
    }
    if let Some(v) = var("REMOVE_ORPHANED_IMAGES") {
        match parse_flag(&v) {
            Some(flag) => settings.remove_orphaned_images = flag,
            None => warn!(value = %v, "config: ignoring REMOVE_ORPHANED_IMAGES"),
        }
    }
    if let Some(v) = var("REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = parsed,
            _ => warn!(value = %v, "config: ignoring REQUEST_TIMEOUT_SECS"),
        }
    }
    if let Some(v) = var("RECENT_REVIEWS_LIMIT") {
        match v.parse::<usize>() {
            Ok(parsed) => settings.recent_reviews_limit = parsed,
            Err(_) => warn!(value = %v, "config: ignoring RECENT_REVIEWS_LIMIT"),
        }
    }
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
