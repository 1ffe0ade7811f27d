use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::gamma::{ColorSettings, PresetColors};

const APP_DIR_NAME: &str = "gammakey";
const SETTINGS_FILE_NAME: &str = "settings.json";
const PRESETS_FILE_NAME: &str = "presets.json";

/// Hotkey installed on first run
pub const DEFAULT_HOTKEY: &str = "ctrl+f10";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Color values applied when the filter is switched on.
    #[serde(flatten)]
    pub color: ColorSettings,

    /// Combination that toggles the filter. `null` disables it.
    pub hotkey: Option<String>,

    /// Start with the desktop session (XDG autostart entry).
    pub autostart: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            color: ColorSettings::default(),
            hotkey: Some(DEFAULT_HOTKEY.to_string()),
            autostart: false,
        }
    }
}

/// A named snapshot of color values with its own optional hotkey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(flatten)]
    pub color: PresetColors,
    #[serde(default)]
    pub hotkey: Option<String>,
}

/// Default settings directory: ~/.config/gammakey/
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Live settings and presets plus their on-disk location.
///
/// Shared as `Arc<Mutex<ConfigManager>>` between the input manager and the
/// effect runner; in-memory values are the source of truth, the files are
/// rewritten on every `save_*`.
#[derive(Debug)]
pub struct ConfigManager {
    dir: PathBuf,
    settings: AppSettings,
    presets: BTreeMap<String, Preset>,
}

impl ConfigManager {
    /// Load from `dir`, creating settings.json with defaults if missing.
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let settings_path = dir.join(SETTINGS_FILE_NAME);
        let settings_exists = settings_path.exists();

        let manager = Self {
            settings: load_settings(&settings_path),
            presets: load_presets(&dir.join(PRESETS_FILE_NAME)),
            dir,
        };

        if !settings_exists {
            if let Err(e) = manager.save_settings() {
                log::warn!("Settings: {}", e);
            }
        }
        manager
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut AppSettings {
        &mut self.settings
    }

    pub fn presets(&self) -> &BTreeMap<String, Preset> {
        &self.presets
    }

    pub fn save_settings(&self) -> Result<(), String> {
        write_json_atomic(&self.dir.join(SETTINGS_FILE_NAME), &self.settings)
    }

    pub fn save_presets(&self) -> Result<(), String> {
        write_json_atomic(&self.dir.join(PRESETS_FILE_NAME), &self.presets)
    }

    pub fn main_hotkey(&self) -> Option<&str> {
        self.settings.hotkey.as_deref()
    }

    pub fn set_main_hotkey(&mut self, hotkey: &str) {
        self.settings.hotkey = Some(hotkey.to_string());
    }

    /// Every preset with its hotkey, in name order
    pub fn preset_hotkeys(&self) -> Vec<(String, Option<String>)> {
        self.presets
            .iter()
            .map(|(name, preset)| (name.clone(), preset.hotkey.clone()))
            .collect()
    }

    /// Returns false if the preset does not exist.
    pub fn set_preset_hotkey(&mut self, name: &str, hotkey: &str) -> bool {
        match self.presets.get_mut(name) {
            Some(preset) => {
                preset.hotkey = Some(hotkey.to_string());
                true
            }
            None => false,
        }
    }

    /// Store the current color values under `name` and persist.
    ///
    /// An existing preset keeps its hotkey; the global hotkey is never copied.
    pub fn save_preset(&mut self, name: &str) -> Result<(), String> {
        let hotkey = self.presets.get(name).and_then(|p| p.hotkey.clone());
        self.presets.insert(
            name.to_string(),
            Preset {
                color: self.settings.color.into(),
                hotkey,
            },
        );
        self.save_presets()
    }

    pub fn delete_preset(&mut self, name: &str) -> Result<bool, String> {
        if self.presets.remove(name).is_none() {
            return Ok(false);
        }
        self.save_presets()?;
        Ok(true)
    }

    /// Fails (returns false) if `old` is missing or `new` already exists.
    pub fn rename_preset(&mut self, old: &str, new: &str) -> Result<bool, String> {
        if self.presets.contains_key(new) {
            return Ok(false);
        }
        let Some(preset) = self.presets.remove(old) else {
            return Ok(false);
        };
        self.presets.insert(new.to_string(), preset);
        self.save_presets()?;
        Ok(true)
    }

    pub fn preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    /// Copy a preset's color values into the current settings (not persisted).
    ///
    /// Values the preset does not carry keep their current setting.
    pub fn load_preset(&mut self, name: &str) -> bool {
        match self.presets.get(name) {
            Some(preset) => {
                preset.color.apply_to(&mut self.settings.color);
                true
            }
            None => false,
        }
    }
}

fn load_settings(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(value) => settings_from_value(&value),
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

/// Merge a parsed settings file over the defaults one field at a time.
///
/// A field with the wrong type or an out-of-range value is logged and keeps
/// its default; every other field still loads.
fn settings_from_value(value: &serde_json::Value) -> AppSettings {
    let mut settings = AppSettings::default();
    let Some(fields) = value.as_object() else {
        log::warn!("Settings: expected a JSON object, using defaults");
        return settings;
    };

    for (key, raw) in fields {
        match key.as_str() {
            "hotkey" => match raw {
                serde_json::Value::Null => settings.hotkey = None,
                serde_json::Value::String(s) => settings.hotkey = Some(s.clone()),
                other => log::warn!("Settings: ignoring hotkey {}", other),
            },
            "autostart" => match raw.as_bool() {
                Some(enabled) => settings.autostart = enabled,
                None => log::warn!("Settings: ignoring autostart {}", raw),
            },
            _ if settings.color.get(key).is_some() => {
                let result = match raw.as_f64() {
                    Some(v) => settings.color.set(key, v),
                    None => Err(format!("{} is not a number", raw)),
                };
                if let Err(e) = result {
                    log::warn!("Settings: ignoring {}: {}", key, e);
                }
            }
            // Keys from older versions (window position etc.)
            _ => {}
        }
    }
    settings
}

fn load_presets(path: &Path) -> BTreeMap<String, Preset> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            log::warn!("Presets: failed to read {:?}: {}", path, e);
            return BTreeMap::new();
        }
    };

    let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&contents) {
        Ok(map) => map,
        Err(e) => {
            log::warn!("Presets: failed to parse {:?}: {}", path, e);
            return BTreeMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(name, value)| {
            if !value.is_object() {
                log::warn!("Presets: skipping '{}' (not an object)", name);
                return None;
            }
            match serde_json::from_value::<Preset>(value) {
                Ok(preset) => Some((name, preset)),
                Err(e) => {
                    log::warn!("Presets: skipping '{}': {}", name, e);
                    None
                }
            }
        })
        .collect()
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(value).map_err(|e| format!("Serialize {:?}: {}", path, e))?;

    // Write to a temp file in the same directory, then rename over the target
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp file {:?}: {}", tmp_path, e))?;

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp file {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigManager::load(dir.path());

        assert_eq!(config.settings(), &AppSettings::default());
        assert_eq!(config.main_hotkey(), Some(DEFAULT_HOTKEY));
        assert!(dir.path().join(SETTINGS_FILE_NAME).exists());
        assert!(config.presets().is_empty());
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE_NAME),
            r#"{"gamma": 1.8, "hotkey": null, "always_on_top": true}"#,
        )
        .unwrap();

        let config = ConfigManager::load(dir.path());
        assert_eq!(config.settings().color.gamma, 1.8);
        assert_eq!(config.settings().color.contrast, 0.85);
        assert_eq!(config.main_hotkey(), None);
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE_NAME), "{not json").unwrap();

        let config = ConfigManager::load(dir.path());
        assert_eq!(config.settings(), &AppSettings::default());
    }

    #[test]
    fn test_mistyped_field_keeps_the_rest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE_NAME),
            r#"{"gamma": 1.8, "hotkey": "alt+f9", "autostart": "yes", "contrast": 7.0}"#,
        )
        .unwrap();

        let config = ConfigManager::load(dir.path());
        assert_eq!(config.settings().color.gamma, 1.8);
        assert_eq!(config.main_hotkey(), Some("alt+f9"));
        assert!(!config.settings().autostart);
        assert_eq!(config.settings().color.contrast, 0.85);
    }

    #[test]
    fn test_presets_skip_non_objects() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(PRESETS_FILE_NAME),
            r#"{"night": {"brightness": 0.3, "hotkey": "ctrl+f11"}, "junk": 5}"#,
        )
        .unwrap();

        let config = ConfigManager::load(dir.path());
        assert_eq!(config.preset_names(), vec!["night".to_string()]);
        assert_eq!(
            config.preset_hotkeys(),
            vec![("night".to_string(), Some("ctrl+f11".to_string()))]
        );
        assert_eq!(config.presets()["night"].color.brightness, Some(0.3));
    }

    #[test]
    fn test_save_preset_preserves_hotkey_not_global() {
        let dir = TempDir::new().unwrap();
        let mut config = ConfigManager::load(dir.path());

        config.save_preset("day").unwrap();
        assert_eq!(config.presets()["day"].hotkey, None);

        assert!(config.set_preset_hotkey("day", "ctrl+f12"));
        config.settings_mut().color.brightness = 0.9;
        config.save_preset("day").unwrap();

        let preset = &config.presets()["day"];
        assert_eq!(preset.hotkey.as_deref(), Some("ctrl+f12"));
        assert_eq!(preset.color.brightness, Some(0.9));

        let reloaded = ConfigManager::load(dir.path());
        assert_eq!(reloaded.presets()["day"], *preset);
    }

    #[test]
    fn test_rename_and_delete() {
        let dir = TempDir::new().unwrap();
        let mut config = ConfigManager::load(dir.path());
        config.save_preset("a").unwrap();
        config.save_preset("b").unwrap();

        assert!(!config.rename_preset("a", "b").unwrap());
        assert!(config.rename_preset("a", "c").unwrap());
        assert_eq!(config.preset_names(), vec!["b".to_string(), "c".to_string()]);

        assert!(config.delete_preset("b").unwrap());
        assert!(!config.delete_preset("b").unwrap());
        assert!(!config.set_preset_hotkey("b", "ctrl+x"));
    }

    #[test]
    fn test_load_preset_copies_colors() {
        let dir = TempDir::new().unwrap();
        let mut config = ConfigManager::load(dir.path());
        config.settings_mut().color.red_scale = 0.4;
        config.save_preset("warm").unwrap();
        config.settings_mut().color.red_scale = 1.0;

        assert!(config.load_preset("warm"));
        assert_eq!(config.settings().color.red_scale, 0.4);
        assert!(!config.load_preset("missing"));
    }

    #[test]
    fn test_load_partial_preset_keeps_current_values() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(PRESETS_FILE_NAME),
            r#"{"dim": {"brightness": 0.3}}"#,
        )
        .unwrap();
        let mut config = ConfigManager::load(dir.path());
        config.settings_mut().color.gamma = 1.8;

        assert!(config.load_preset("dim"));
        assert_eq!(config.settings().color.brightness, 0.3);
        assert_eq!(config.settings().color.gamma, 1.8);
    }
}
