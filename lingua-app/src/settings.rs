use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lingua_core::{GeminiConfig, SessionConfig};
use serde::{Deserialize, Serialize};

/// Env vars checked, in order, before the stored API key.
pub const API_KEY_ENV_VARS: [&str; 2] = ["LINGUA_GEMINI_API_KEY", "GEMINI_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub tts_model: String,
    pub voice: String,
    pub scenario: String,
    pub language: String,
    pub export_dir: Option<String>,
    pub reply_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    pub lookup_timeout_secs: u64,
    pub audio_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        let gemini = GeminiConfig::default();
        let session = SessionConfig::default();
        Self {
            gemini_api_key: None,
            chat_model: gemini.chat_model,
            tts_model: gemini.tts_model,
            voice: gemini.voice,
            scenario: "cafe".into(),
            language: lingua_core::capture::DEFAULT_LANGUAGE.into(),
            export_dir: None,
            reply_timeout_secs: session.reply_timeout.as_secs(),
            synthesis_timeout_secs: session.synthesis_timeout.as_secs(),
            lookup_timeout_secs: session.lookup_timeout.as_secs(),
            audio_enabled: true,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        let defaults = AppSettings::default();

        self.gemini_api_key = normalize_optional(self.gemini_api_key.take());
        self.export_dir = normalize_optional(self.export_dir.take());
        self.chat_model = normalize_required(&self.chat_model, &defaults.chat_model);
        self.tts_model = normalize_required(&self.tts_model, &defaults.tts_model);
        self.voice = normalize_required(&self.voice, &defaults.voice);
        self.scenario = normalize_required(&self.scenario, &defaults.scenario).to_ascii_lowercase();
        self.language = normalize_required(&self.language, &defaults.language);

        self.reply_timeout_secs = self.reply_timeout_secs.clamp(5, 300);
        self.synthesis_timeout_secs = self.synthesis_timeout_secs.clamp(5, 300);
        self.lookup_timeout_secs = self.lookup_timeout_secs.clamp(5, 120);
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reply_timeout: Duration::from_secs(self.reply_timeout_secs),
            synthesis_timeout: Duration::from_secs(self.synthesis_timeout_secs),
            lookup_timeout: Duration::from_secs(self.lookup_timeout_secs),
        }
    }

    /// Gemini configuration with the key resolved from the environment first.
    pub fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: resolve_api_key(self.gemini_api_key.as_deref()).unwrap_or_default(),
            chat_model: self.chat_model.clone(),
            tts_model: self.tts_model.clone(),
            voice: self.voice.clone(),
            ..GeminiConfig::default()
        }
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_export_dir)
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_required(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn resolve_api_key(stored: Option<&str>) -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .chain(stored.map(str::to_string))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lingua")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("lingua")
    }
}

pub fn default_settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn default_export_dir() -> PathBuf {
    data_dir().join("exports")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("absent.json"));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.voice, "Kore");
        assert_eq!(settings.scenario, "cafe");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"scenario":" Airport ","replyTimeoutSecs":1}"#).unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.scenario, "airport");
        assert_eq!(settings.reply_timeout_secs, 5);
        assert_eq!(settings.chat_model, AppSettings::default().chat_model);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(load_settings(&path), AppSettings::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = AppSettings::default();
        settings.voice = "Puck".into();
        settings.export_dir = Some("/tmp/lingua".into());
        settings.audio_enabled = false;

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn blank_strings_normalize() {
        let mut settings = AppSettings {
            gemini_api_key: Some("   ".into()),
            voice: " ".into(),
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.gemini_api_key, None);
        assert_eq!(settings.voice, "Kore");
    }

    #[test]
    fn session_config_uses_configured_timeouts() {
        let settings = AppSettings {
            reply_timeout_secs: 12,
            ..AppSettings::default()
        };
        assert_eq!(settings.session_config().reply_timeout, Duration::from_secs(12));
    }
}
