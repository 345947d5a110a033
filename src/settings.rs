//! Game settings and preferences
//!
//! Persisted as JSON next to the binary. Missing fields fall back to their
//! defaults so older files keep loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_STARTING_BALLS;
use crate::error::SettingsError;
use crate::sim::powers::Character;

/// Game settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Gameplay ===
    /// Seed for every gameplay roll; `None` gives an unrepeatable run
    pub seed: Option<u64>,
    pub character: Character,
    pub starting_balls: u32,
    /// Render less often when the frame rate drops
    pub adaptive_frame_skip: bool,
    /// Level file; the built-in demo board when unset
    pub level_path: Option<PathBuf>,

    // === Audio ===
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    /// Sound effects volume (0.0 - 1.0)
    pub sfx_volume: f32,
    /// Music volume (0.0 - 1.0)
    pub music_volume: f32,
    pub muted: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: None,
            character: Character::default(),
            starting_balls: DEFAULT_STARTING_BALLS,
            adaptive_frame_skip: true,
            level_path: None,

            master_volume: 0.8,
            sfx_volume: 1.0,
            music_volume: 0.7,
            muted: false,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path.as_ref())?;
        let mut settings: Settings = serde_json::from_str(&json)?;
        settings.clamp_volumes();
        Ok(settings)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("settings saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Load settings, falling back to defaults on any failure
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => {
                log::info!("loaded settings from {}", path.display());
                settings
            }
            Err(SettingsError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => {
                log::warn!("ignoring settings at {}: {err}", path.display());
                Self::default()
            }
        }
    }

    fn clamp_volumes(&mut self) {
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        self.sfx_volume = self.sfx_volume.clamp(0.0, 1.0);
        self.music_volume = self.music_volume.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pegfall-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "seed": 7, "character": "rocket" }"#).unwrap();
        assert_eq!(settings.seed, Some(7));
        assert_eq!(settings.character, Character::Rocket);
        assert_eq!(settings.starting_balls, DEFAULT_STARTING_BALLS);
        assert!(settings.adaptive_frame_skip);
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let settings = Settings {
            seed: Some(99),
            character: Character::Breaker,
            sfx_volume: 0.5,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_out_of_range_volume_is_clamped() {
        let path = temp_path("clamp");
        fs::write(&path, r#"{ "master_volume": 3.0, "sfx_volume": -1.0 }"#).unwrap();
        let loaded = Settings::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.master_volume, 1.0);
        assert_eq!(loaded.sfx_volume, 0.0);
    }

    #[test]
    fn test_missing_or_broken_file_falls_back() {
        let missing = temp_path("missing");
        assert_eq!(Settings::load_or_default(&missing), Settings::default());

        let broken = temp_path("broken");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(Settings::load(&broken), Err(SettingsError::Parse(_))));
        assert_eq!(Settings::load_or_default(&broken), Settings::default());
        let _ = fs::remove_file(&broken);
    }
}
