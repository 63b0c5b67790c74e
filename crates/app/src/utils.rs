//! Settings persistence and small helpers for the Code Assistant app.

use anyhow::{Context, Result};
use shared::settings::AppSettings;
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

/// Settings file location: `<config dir>/code_assistant/settings.json`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("code_assistant");
        p.push("settings.json");
        p
    })
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or unreadable. The flag reports whether a saved file was used.
pub fn load_settings_from(path: &Path) -> (AppSettings, bool) {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => (settings, true),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt settings file");
                (AppSettings::default(), false)
            }
        },
        Err(_) => (AppSettings::default(), false),
    }
}

/// Load settings from the default location, then apply environment overrides.
pub fn load_settings_or_default() -> (AppSettings, bool) {
    let (mut settings, loaded) = match config_path() {
        Some(path) => load_settings_from(&path),
        None => (AppSettings::default(), false),
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    (settings, loaded)
}

/// `GEMINI_API_KEY` fills a missing key; `CODE_ASSIST_BACKEND_URL` replaces the backend.
pub fn apply_env_overrides(settings: &mut AppSettings, var: impl Fn(&str) -> Option<String>) {
    if settings.api_key().is_none() {
        if let Some(key) = var("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            settings.api_key = Some(key);
        }
    }
    if let Some(url) = var("CODE_ASSIST_BACKEND_URL").filter(|u| !u.trim().is_empty()) {
        settings.backend_url = url;
    }
}

pub fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn save_settings(settings: &AppSettings) -> Result<()> {
    let path = config_path().context("No config directory on this system")?;
    save_settings_to(settings, &path)
}

/// Replace the stored API key, wiping the old one from memory.
pub fn set_api_key(settings: &mut AppSettings, key: &str) {
    if let Some(mut old) = settings.api_key.take() {
        old.zeroize();
    }
    let key = key.trim();
    if !key.is_empty() {
        settings.api_key = Some(key.to_string());
    }
}

/// Show only the last four characters of a key.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
