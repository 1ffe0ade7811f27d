//! Display color ramp: curve math and the backend that pushes it to the display
//!
//! The curve is computed as a 256-entry, 16-bit per-channel gamma ramp (the
//! classic `SetDeviceGammaRamp` layout). Backends approximate it as closely as
//! their display API allows.

mod xrandr;

pub use xrandr::XrandrRamp;

use serde::{Deserialize, Serialize};

/// Number of entries per channel
pub const RAMP_SIZE: usize = 256;

/// User-adjustable color parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSettings {
    /// 0.5 is neutral
    pub brightness: f64,
    /// 0.5 is neutral
    pub contrast: f64,
    /// 1.0 is neutral
    pub gamma: f64,
    pub red_scale: f64,
    pub green_scale: f64,
    pub blue_scale: f64,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            brightness: 0.53,
            contrast: 0.85,
            gamma: 2.4,
            red_scale: 1.0,
            green_scale: 1.0,
            blue_scale: 1.0,
        }
    }
}

impl ColorSettings {
    /// Adjustable keys with their allowed ranges
    pub const KEYS: [(&'static str, f64, f64); 6] = [
        ("brightness", 0.0, 1.0),
        ("contrast", 0.0, 1.0),
        ("gamma", 0.1, 5.0),
        ("red_scale", 0.0, 2.0),
        ("green_scale", 0.0, 2.0),
        ("blue_scale", 0.0, 2.0),
    ];

    /// Settings that leave the display unchanged
    pub fn neutral() -> Self {
        Self {
            brightness: 0.5,
            contrast: 0.5,
            gamma: 1.0,
            red_scale: 1.0,
            green_scale: 1.0,
            blue_scale: 1.0,
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        match key {
            "brightness" => Some(self.brightness),
            "contrast" => Some(self.contrast),
            "gamma" => Some(self.gamma),
            "red_scale" => Some(self.red_scale),
            "green_scale" => Some(self.green_scale),
            "blue_scale" => Some(self.blue_scale),
            _ => None,
        }
    }

    /// Set one parameter by name, rejecting unknown keys and out-of-range values.
    pub fn set(&mut self, key: &str, value: f64) -> Result<(), String> {
        let (_, min, max) = Self::KEYS
            .iter()
            .find(|(name, _, _)| *name == key)
            .ok_or_else(|| format!("Unknown setting '{}'", key))?;
        if !value.is_finite() || value < *min || value > *max {
            return Err(format!(
                "{} must be between {} and {} (got {})",
                key, min, max, value
            ));
        }

        let slot = match key {
            "brightness" => &mut self.brightness,
            "contrast" => &mut self.contrast,
            "gamma" => &mut self.gamma,
            "red_scale" => &mut self.red_scale,
            "green_scale" => &mut self.green_scale,
            _ => &mut self.blue_scale,
        };
        *slot = value;
        Ok(())
    }
}

/// Color values stored in a preset.
///
/// Keys missing from the preset file stay `None` and leave the current
/// value untouched when the preset is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetColors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub green_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_scale: Option<f64>,
}

impl PresetColors {
    /// Overwrite the values this preset carries
    pub fn apply_to(&self, target: &mut ColorSettings) {
        let pairs = [
            (self.brightness, &mut target.brightness),
            (self.contrast, &mut target.contrast),
            (self.gamma, &mut target.gamma),
            (self.red_scale, &mut target.red_scale),
            (self.green_scale, &mut target.green_scale),
            (self.blue_scale, &mut target.blue_scale),
        ];
        for (value, slot) in pairs {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

impl From<ColorSettings> for PresetColors {
    fn from(settings: ColorSettings) -> Self {
        Self {
            brightness: Some(settings.brightness),
            contrast: Some(settings.contrast),
            gamma: Some(settings.gamma),
            red_scale: Some(settings.red_scale),
            green_scale: Some(settings.green_scale),
            blue_scale: Some(settings.blue_scale),
        }
    }
}

/// One 16-bit lookup table per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaRamp {
    pub red: Vec<u16>,
    pub green: Vec<u16>,
    pub blue: Vec<u16>,
}

impl GammaRamp {
    /// Identity ramp
    pub fn linear() -> Self {
        let channel: Vec<u16> = (0..RAMP_SIZE)
            .map(|i| ((i as f64 / 255.0) * 65535.0) as u16)
            .collect();
        Self {
            red: channel.clone(),
            green: channel.clone(),
            blue: channel,
        }
    }

    /// Build the ramp for the given settings.
    ///
    /// Per entry: gamma curve, brightness offset, contrast gain around the
    /// midpoint, clamp, then per-channel scale.
    pub fn from_settings(settings: &ColorSettings) -> Self {
        let gamma = settings.gamma.max(0.1);
        let brightness_offset = settings.brightness - 0.5;
        let contrast_gain = settings.contrast * 2.0;

        let mut ramp = Self {
            red: Vec::with_capacity(RAMP_SIZE),
            green: Vec::with_capacity(RAMP_SIZE),
            blue: Vec::with_capacity(RAMP_SIZE),
        };

        for i in 0..RAMP_SIZE {
            let mut val = (i as f64 / 255.0).powf(1.0 / gamma);
            val += brightness_offset;
            val = (val - 0.5) * contrast_gain + 0.5;
            let val = val.clamp(0.0, 1.0);

            ramp.red.push(scale_entry(val, settings.red_scale));
            ramp.green.push(scale_entry(val, settings.green_scale));
            ramp.blue.push(scale_entry(val, settings.blue_scale));
        }

        ramp
    }
}

fn scale_entry(val: f64, scale: f64) -> u16 {
    (val * 65535.0 * scale).clamp(0.0, 65535.0) as u16
}

/// Errors from pushing a ramp to the display.
#[derive(Debug, Clone)]
pub enum RampError {
    NoOutput,
    CommandFailed(String),
    Io(String),
}

impl std::fmt::Display for RampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RampError::NoOutput => write!(f, "No connected display output found"),
            RampError::CommandFailed(e) => write!(f, "Display command failed: {}", e),
            RampError::Io(e) => write!(f, "Failed to run display command: {}", e),
        }
    }
}

impl std::error::Error for RampError {}

/// The display's color ramp.
pub trait ColorRamp: Send + 'static {
    fn apply(&mut self, settings: &ColorSettings) -> Result<(), RampError>;

    /// Put back the ramp that was in place before the first `apply`.
    fn restore(&mut self) -> Result<(), RampError>;

    fn is_active(&self) -> bool;
}

/// Used when no display backend could be set up; every apply fails.
pub struct UnavailableRamp {
    reason: String,
}

impl UnavailableRamp {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ColorRamp for UnavailableRamp {
    fn apply(&mut self, _settings: &ColorSettings) -> Result<(), RampError> {
        Err(RampError::CommandFailed(self.reason.clone()))
    }

    fn restore(&mut self) -> Result<(), RampError> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_settings_are_identity() {
        let ramp = GammaRamp::from_settings(&ColorSettings::neutral());
        let linear = GammaRamp::linear();
        for (a, b) in ramp.red.iter().zip(linear.red.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_ramp_is_monotonic_and_bounded() {
        let ramp = GammaRamp::from_settings(&ColorSettings::default());
        assert_eq!(ramp.red.len(), RAMP_SIZE);
        assert!(ramp.red.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_channel_scale() {
        let settings = ColorSettings {
            red_scale: 0.0,
            blue_scale: 2.0,
            ..ColorSettings::neutral()
        };
        let ramp = GammaRamp::from_settings(&settings);
        assert!(ramp.red.iter().all(|v| *v == 0));
        assert_eq!(ramp.blue[255], 65535);
        assert_eq!(ramp.blue[128], 65535);
        assert!(ramp.blue[32] < 65535);
    }

    #[test]
    fn test_gamma_floor() {
        let tiny = ColorSettings {
            gamma: 0.0,
            ..ColorSettings::neutral()
        };
        let floor = ColorSettings {
            gamma: 0.1,
            ..ColorSettings::neutral()
        };
        assert_eq!(GammaRamp::from_settings(&tiny), GammaRamp::from_settings(&floor));
    }

    #[test]
    fn test_unavailable_ramp_refuses_apply() {
        let mut ramp = UnavailableRamp::new("no X display");
        assert!(ramp.apply(&ColorSettings::default()).is_err());
        assert!(ramp.restore().is_ok());
        assert!(!ramp.is_active());
    }

    #[test]
    fn test_preset_colors_only_touch_present_keys() {
        let preset: PresetColors = serde_json::from_str(r#"{"brightness": 0.3}"#).unwrap();
        let mut current = ColorSettings {
            gamma: 1.8,
            ..ColorSettings::default()
        };
        preset.apply_to(&mut current);

        assert_eq!(current.brightness, 0.3);
        assert_eq!(current.gamma, 1.8);
        assert_eq!(
            serde_json::to_string(&preset).unwrap(),
            r#"{"brightness":0.3}"#
        );
    }

    #[test]
    fn test_set_validates_range_and_key() {
        let mut settings = ColorSettings::default();
        settings.set("brightness", 0.7).unwrap();
        assert_eq!(settings.get("brightness"), Some(0.7));

        assert!(settings.set("gamma", 9.0).is_err());
        assert!(settings.set("saturation", 0.5).is_err());
        assert!(settings.set("contrast", f64::NAN).is_err());
    }
}
