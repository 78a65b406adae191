use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use capture_core::CameraSettings;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "walkthrough.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub capture_cadence_ms: u64,
    pub upload_delay_ms: u64,
    pub network_probe_url: Option<String>,
    pub network_poll_secs: u64,
    pub camera: CameraSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/walkthrough.db".into(),
            capture_cadence_ms: 2_000,
            upload_delay_ms: 2_000,
            network_probe_url: None,
            network_poll_secs: 30,
            camera: CameraSettings::default(),
        }
    }
}

impl Settings {
    pub fn capture_cadence(&self) -> Duration {
        Duration::from_millis(self.capture_cadence_ms)
    }

    pub fn upload_delay(&self) -> Duration {
        Duration::from_millis(self.upload_delay_ms)
    }

    pub fn network_poll_period(&self) -> Duration {
        Duration::from_secs(self.network_poll_secs.max(1))
    }
}

/// Shape of `walkthrough.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    capture_cadence_ms: Option<u64>,
    upload_delay_ms: Option<u64>,
    network_probe_url: Option<String>,
    network_poll_secs: Option<u64>,
    camera: Option<CameraSettings>,
}

/// Defaults, then the config file (if present), then the environment.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!("config: ignoring unreadable {}: {err}", path.display()),
        }
    } else if config_path.is_some() {
        warn!("config: {} not found, using defaults", path.display());
    }

    apply_env(&mut settings, |name| std::env::var(name).ok());
    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.capture_cadence_ms {
        settings.capture_cadence_ms = v;
    }
    if let Some(v) = file_cfg.upload_delay_ms {
        settings.upload_delay_ms = v;
    }
    if let Some(v) = file_cfg.network_probe_url {
        settings.network_probe_url = Some(v);
    }
    if let Some(v) = file_cfg.network_poll_secs {
        settings.network_poll_secs = v;
    }
    if let Some(v) = file_cfg.camera {
        settings.camera = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("WALKTHROUGH_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = var("APP__CAPTURE_CADENCE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.capture_cadence_ms = parsed;
        }
    }
    if let Some(v) = var("APP__UPLOAD_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.upload_delay_ms = parsed;
        }
    }

    if let Some(v) = var("APP__NETWORK_PROBE_URL") {
        let v = v.trim();
        settings.network_probe_url = (!v.is_empty()).then(|| v.to_string());
    }
    if let Some(v) = var("APP__NETWORK_POLL_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.network_poll_secs = parsed;
        }
    }

    if let Some(v) = var("APP__CAMERA_COMMAND") {
        let mut parts = v.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            settings.camera = CameraSettings::Command {
                program,
                args: parts.collect(),
                mime_type: var("APP__CAMERA_MIME_TYPE").unwrap_or_else(|| "image/jpeg".into()),
                timeout_ms: 10_000,
            };
        }
    }
}

/// A blank url falls back to the default location before normalization.
pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let raw_database_url = if raw_database_url.trim().is_empty() {
        Settings::default().database_url
    } else {
        raw_database_url.to_string()
    };
    storage::prepare_database_url(&raw_database_url)
        .with_context(|| format!("failed to prepare database url '{raw_database_url}'"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
