use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::recoil::{DEFAULT_POLL_INTERVAL, DEFAULT_WINDOW};

pub const DEFAULT_CROSSHAIR_COLOR: u32 = 0xFFFFFF;
const DEFAULT_CROSSHAIR_IMAGE: &str = "resources/images/crosshair.png";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Settings for one light gun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GunConSettings {
    pub use_recoil: bool,
    pub suppress_recoil_offscreen: bool,
    pub x_scale: f32,
    pub crosshair_image_path: Option<PathBuf>,
    pub crosshair_scale: f32,
    pub crosshair_color: String,
    pub relative_left: Option<String>,
    pub relative_right: Option<String>,
    pub relative_up: Option<String>,
    pub relative_down: Option<String>,
    pub recoil_poll_interval_ms: u64,
    pub recoil_window_ms: u64,
}

impl Default for GunConSettings {
    fn default() -> Self {
        Self {
            use_recoil: false,
            suppress_recoil_offscreen: false,
            x_scale: 1.0,
            crosshair_image_path: None,
            crosshair_scale: 1.0,
            crosshair_color: "#ffffff".to_string(),
            relative_left: None,
            relative_right: None,
            relative_up: None,
            relative_down: None,
            recoil_poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            recoil_window_ms: DEFAULT_WINDOW.as_millis() as u64,
        }
    }
}

impl GunConSettings {
    /// Relative mode is on as soon as any relative axis is bound at all.
    pub fn has_relative_binds(&self) -> bool {
        [
            &self.relative_left,
            &self.relative_right,
            &self.relative_up,
            &self.relative_down,
        ]
        .iter()
        .any(|b| b.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    pub fn crosshair_image(&self) -> PathBuf {
        match &self.crosshair_image_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => PathBuf::from(DEFAULT_CROSSHAIR_IMAGE),
        }
    }

    pub fn cursor_color(&self) -> u32 {
        if self.crosshair_color.trim().is_empty() {
            return DEFAULT_CROSSHAIR_COLOR;
        }
        parse_color(&self.crosshair_color).unwrap_or_else(|| {
            warn!(
                "GunCon: invalid crosshair color '{}'; using #ffffff",
                self.crosshair_color
            );
            DEFAULT_CROSSHAIR_COLOR
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.recoil_poll_interval_ms.max(1))
    }

    pub fn recoil_window(&self) -> Duration {
        Duration::from_millis(self.recoil_window_ms.max(1))
    }
}

/// Parse an HTML/CSS style `#rrggbb` color (the hash is optional).
pub fn parse_color(text: &str) -> Option<u32> {
    let text = text.trim();
    let hex = text.strip_prefix('#').unwrap_or(text);
    if hex.is_empty() || hex.len() > 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Settings for both controller ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SettingsFile {
    pub port1: GunConSettings,
    pub port2: GunConSettings,
}

impl SettingsFile {
    pub fn port(&self, port: u32) -> Option<&GunConSettings> {
        match port {
            0 => Some(&self.port1),
            1 => Some(&self.port2),
            _ => None,
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("guncon").join("guncon.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("guncon").join("guncon.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("guncon")
            .join("guncon.toml");
    }

    PathBuf::from("guncon.toml")
}

pub fn load_from_file(path: &Path) -> SettingsFile {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return SettingsFile::default(),
    };

    match toml::from_str::<SettingsFile>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse GunCon settings {}: {e}; using defaults",
                path.display()
            );
            SettingsFile::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &SettingsFile) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg)?;
    std::fs::write(path, text)?;
    Ok(())
}
