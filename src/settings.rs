use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::profile::CharacterProfile;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_PROMPT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_HQ_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_RETRY_BASE_MS: u64 = 1000;
/// Roughly what a browser grants a single origin's local storage.
const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub text_model: Option<String>,
    pub prompt_model: Option<String>,
    pub image_model: Option<String>,
    pub hq_image_model: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub retry_base_delay_ms: Option<u64>,
    pub storage_quota_bytes: Option<usize>,
    pub default_character: Option<CharacterProfile>,
}

impl Settings {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.gemini_api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    pub fn text_model(&self) -> &str {
        self.text_model.as_deref().unwrap_or(DEFAULT_TEXT_MODEL)
    }

    pub fn prompt_model(&self) -> &str {
        self.prompt_model.as_deref().unwrap_or(DEFAULT_PROMPT_MODEL)
    }

    pub fn image_model(&self) -> &str {
        self.image_model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL)
    }

    pub fn hq_image_model(&self) -> &str {
        self.hq_image_model.as_deref().unwrap_or(DEFAULT_HQ_IMAGE_MODEL)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_MS))
    }

    pub fn storage_quota_bytes(&self) -> usize {
        self.storage_quota_bytes.unwrap_or(DEFAULT_STORAGE_QUOTA)
    }
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

pub fn load_settings_from_dir(data_dir: &Path) -> Settings {
    let path = settings_path(data_dir);
    if let Ok(bytes) = fs::read(&path) {
        if let Ok(s) = serde_json::from_slice::<Settings>(&bytes) {
            return s;
        }
        tracing::warn!(path = %path.display(), "settings file unreadable, using defaults");
    }
    Settings::default()
}

pub fn save_settings_to_dir(data_dir: &Path, s: &Settings) -> Result<()> {
    let path = settings_path(data_dir);
    let json = serde_json::to_vec_pretty(s)?;
    fs::write(path, json).context("write settings")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Occupation;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from_dir(dir.path());
        assert_eq!(s.text_model(), DEFAULT_TEXT_MODEL);
        assert_eq!(s.hq_image_model(), DEFAULT_HQ_IMAGE_MODEL);
        assert_eq!(s.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(s.storage_quota_bytes(), DEFAULT_STORAGE_QUOTA);
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings {
            text_model: Some("gemini-test".into()),
            storage_quota_bytes: Some(1024),
            default_character: Some(CharacterProfile {
                occupation: Occupation::Politician,
                ..CharacterProfile::default()
            }),
            ..Settings::default()
        };
        save_settings_to_dir(dir.path(), &s).unwrap();

        let loaded = load_settings_from_dir(dir.path());
        assert_eq!(loaded.text_model(), "gemini-test");
        assert_eq!(loaded.storage_quota_bytes(), 1024);
        assert_eq!(
            loaded.default_character.map(|c| c.occupation),
            Some(Occupation::Politician)
        );
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(settings_path(dir.path()), b"{not json").unwrap();
        let s = load_settings_from_dir(dir.path());
        assert!(s.gemini_api_key.is_none());
    }
}
