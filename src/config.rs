use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::Coordinate;

/// Requested color scheme, persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

/// Application preferences, loaded once at startup from
/// `waypost/waypost.toml` under the XDG config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the location service.
    pub service_url: String,
    /// One-shot position lookup endpoint.
    pub geolocation_url: String,
    /// Identity of the viewing user. The session subsystem that would
    /// normally supply this is out of scope, so it lives here.
    pub viewer_id: String,
    pub viewer_username: String,
    /// Used when the position lookup fails or is denied.
    pub fallback_latitude: f64,
    pub fallback_longitude: f64,
    pub default_radius_km: f64,
    pub theme: ThemePreference,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "https://api.waypost.app".to_string(),
            geolocation_url: "https://ipapi.co/json".to_string(),
            viewer_id: String::new(),
            viewer_username: String::new(),
            fallback_latitude: 40.7128,
            fallback_longitude: -74.0060,
            default_radius_km: 25.0,
            theme: ThemePreference::System,
        }
    }
}

impl Config {
    fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("waypost").join("waypost.toml"))
    }

    /// Read the config file, falling back to defaults when it is
    /// missing or unreadable. Never fails the startup path.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            warn!("no config directory available, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("could not parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path().context("no config directory available")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(&path, text)?;
        Ok(())
    }

    pub fn fallback_position(&self) -> Coordinate {
        Coordinate::new(self.fallback_latitude, self.fallback_longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = Config::default();

        assert!(config.service_url.starts_with("https://"));
        assert_eq!(config.theme, ThemePreference::System);
        assert!(config.default_radius_km > 0.0);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let config: Config =
            toml::from_str("service_url = \"http://localhost:8080\"\ntheme = \"dark\"").unwrap();

        assert_eq!(config.service_url, "http://localhost:8080");
        assert_eq!(config.theme, ThemePreference::Dark);
        assert_eq!(config.fallback_position().latitude, 40.7128);
    }
}
