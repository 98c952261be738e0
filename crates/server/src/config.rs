use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use server_api::{auth::DEFAULT_SESSION_TTL_SECONDS, cache::DEFAULT_MAX_MEDIA_BYTES};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub media_root: String,
    pub media_public_base: String,
    pub auth_jwt_secret: String,
    pub session_ttl_seconds: i64,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: u64,
    pub cache_max_media_bytes: u64,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8443".into(),
            database_url: "sqlite://./data/gallery.db".into(),
            media_root: "./data/media".into(),
            media_public_base: "http://127.0.0.1:8443/media/".into(),
            auth_jwt_secret: "devsecret".into(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cache_ttl_seconds: 30 * 60,
            cache_max_entries: 512,
            cache_max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let file_cfg = fs::read_to_string("server.toml")
        .ok()
        .and_then(|raw| toml::from_str::<HashMap<String, String>>(&raw).ok())
        .unwrap_or_default();
    settings_from(&file_cfg, |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml` keys, then environment variables.
fn settings_from(file_cfg: &HashMap<String, String>, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();
    let lookup = |file_key: &str, env_keys: &[&str]| {
        env_keys
            .iter()
            .rev()
            .find_map(|key| env(key))
            .or_else(|| file_cfg.get(file_key).cloned())
    };

    if let Some(v) = lookup("bind_addr", &["SERVER_BIND", "APP__BIND_ADDR"]) {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("database_url", &["DATABASE_URL", "APP__DATABASE_URL"]) {
        settings.database_url = v;
    }
    if let Some(v) = lookup("media_root", &["APP__MEDIA_ROOT"]) {
        settings.media_root = v;
    }
    if let Some(v) = lookup("media_public_base", &["APP__MEDIA_PUBLIC_BASE"]) {
        settings.media_public_base = v;
    }
    if let Some(v) = lookup("auth_jwt_secret", &["APP__AUTH_JWT_SECRET"]) {
        settings.auth_jwt_secret = v;
    }
    if let Some(parsed) = lookup("session_ttl_seconds", &["APP__SESSION_TTL_SECONDS"])
        .and_then(|v| v.parse::<i64>().ok())
    {
        settings.session_ttl_seconds = parsed;
    }
    if let Some(parsed) = lookup("cache_ttl_seconds", &["APP__CACHE_TTL_SECONDS"])
        .and_then(|v| v.parse::<u64>().ok())
    {
        settings.cache_ttl_seconds = parsed;
    }
    if let Some(parsed) = lookup("cache_max_entries", &["APP__CACHE_MAX_ENTRIES"])
        .and_then(|v| v.parse::<u64>().ok())
    {
        settings.cache_max_entries = parsed;
    }
    if let Some(parsed) = lookup("cache_max_media_bytes", &["APP__CACHE_MAX_MEDIA_BYTES"])
        .and_then(|v| v.parse::<u64>().ok())
    {
        settings.cache_max_media_bytes = parsed;
    }
    if let Some(parsed) = lookup("max_upload_bytes", &["APP__MAX_UPLOAD_BYTES"])
        .and_then(|v| v.parse::<usize>().ok())
    {
        settings.max_upload_bytes = parsed;
    }

    settings
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
