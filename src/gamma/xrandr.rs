//! X11 backend driving `xrandr`
//!
//! xrandr cannot load an arbitrary lookup table, only a per-channel power
//! curve and a global brightness, so the computed ramp is fitted to that
//! shape: brightness from the brightest channel's top entry, each channel's
//! exponent from its midpoint.

use std::process::Command;

use super::{ColorRamp, ColorSettings, GammaRamp, RampError};

/// Ramp index used to fit the exponent
const FIT_INDEX: usize = 128;

/// Gamma/brightness of one output as xrandr reports and accepts them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputGamma {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub brightness: f64,
}

impl Default for OutputGamma {
    fn default() -> Self {
        Self {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
            brightness: 1.0,
        }
    }
}

impl OutputGamma {
    /// Fit a computed ramp to xrandr's `value^(1/gamma) * brightness` model
    pub fn fit(ramp: &GammaRamp) -> Self {
        let top = |c: &[u16]| c[c.len() - 1] as f64 / 65535.0;
        let brightness = top(&ramp.red)
            .max(top(&ramp.green))
            .max(top(&ramp.blue))
            .clamp(0.1, 1.0);

        let x = FIT_INDEX as f64 / 255.0;
        let exponent = |c: &[u16]| {
            let mid = c[FIT_INDEX] as f64 / 65535.0 / brightness;
            if mid <= 0.0 {
                0.1
            } else if mid >= 1.0 {
                10.0
            } else {
                (x.ln() / mid.ln()).clamp(0.1, 10.0)
            }
        };

        Self {
            red: exponent(&ramp.red),
            green: exponent(&ramp.green),
            blue: exponent(&ramp.blue),
            brightness,
        }
    }

    fn gamma_arg(&self) -> String {
        format!("{:.3}:{:.3}:{:.3}", self.red, self.green, self.blue)
    }

    fn brightness_arg(&self) -> String {
        format!("{:.3}", self.brightness)
    }
}

/// One connected output from `xrandr --verbose`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputInfo {
    pub name: String,
    pub primary: bool,
    pub gamma: OutputGamma,
}

/// Parse connected outputs (with their current gamma) from `xrandr --verbose`
pub fn parse_verbose(text: &str) -> Vec<OutputInfo> {
    let mut outputs: Vec<OutputInfo> = Vec::new();
    let mut in_connected = false;

    for line in text.lines() {
        if !line.starts_with(char::is_whitespace) {
            let mut tokens = line.split_whitespace();
            let name = tokens.next().unwrap_or_default();
            in_connected = tokens.next() == Some("connected");
            if in_connected {
                outputs.push(OutputInfo {
                    name: name.to_string(),
                    primary: tokens.next() == Some("primary"),
                    gamma: OutputGamma::default(),
                });
            }
            continue;
        }

        if !in_connected {
            continue;
        }
        let Some(current) = outputs.last_mut() else {
            continue;
        };

        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Gamma:") {
            // --verbose prints the curve exponent, the reciprocal of what --gamma takes
            let values: Vec<f64> = rest
                .trim()
                .split(':')
                .filter_map(|v| v.trim().parse::<f64>().ok())
                .filter(|v| *v > 0.0)
                .map(|v| 1.0 / v)
                .collect();
            if let [red, green, blue] = values.as_slice() {
                current.gamma.red = *red;
                current.gamma.green = *green;
                current.gamma.blue = *blue;
            }
        } else if let Some(rest) = trimmed.strip_prefix("Brightness:") {
            if let Ok(b) = rest.trim().parse() {
                current.gamma.brightness = b;
            }
        }
    }

    outputs
}

/// Prefer the primary output, else the first connected one
pub fn pick_output(outputs: &[OutputInfo]) -> Option<&OutputInfo> {
    outputs
        .iter()
        .find(|o| o.primary)
        .or_else(|| outputs.first())
}

fn run_xrandr(args: &[&str]) -> Result<String, RampError> {
    let output = Command::new("xrandr")
        .args(args)
        .output()
        .map_err(|e| RampError::Io(e.to_string()))?;

    if !output.status.success() {
        return Err(RampError::CommandFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Color ramp on one X11 output
pub struct XrandrRamp {
    output: String,
    original: OutputGamma,
    active: bool,
}

impl XrandrRamp {
    /// Find the primary output and remember its current gamma for `restore`
    pub fn detect() -> Result<Self, RampError> {
        let verbose = run_xrandr(&["--verbose"])?;
        let outputs = parse_verbose(&verbose);
        let chosen = pick_output(&outputs).ok_or(RampError::NoOutput)?;

        log::info!(
            "Using display output {} (original gamma {}, brightness {})",
            chosen.name,
            chosen.gamma.gamma_arg(),
            chosen.gamma.brightness_arg()
        );

        Ok(Self {
            output: chosen.name.clone(),
            original: chosen.gamma,
            active: false,
        })
    }

    fn set(&self, gamma: &OutputGamma) -> Result<(), RampError> {
        run_xrandr(&[
            "--output",
            &self.output,
            "--gamma",
            &gamma.gamma_arg(),
            "--brightness",
            &gamma.brightness_arg(),
        ])
        .map(|_| ())
    }
}

impl ColorRamp for XrandrRamp {
    fn apply(&mut self, settings: &ColorSettings) -> Result<(), RampError> {
        let fitted = OutputGamma::fit(&GammaRamp::from_settings(settings));
        log::debug!(
            "Applying ramp to {}: gamma {}, brightness {}",
            self.output,
            fitted.gamma_arg(),
            fitted.brightness_arg()
        );
        self.set(&fitted)?;
        self.active = true;
        Ok(())
    }

    fn restore(&mut self) -> Result<(), RampError> {
        let result = self.set(&self.original);
        self.active = false;
        result
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERBOSE: &str = "\
Screen 0: minimum 320 x 200, current 3840 x 1080, maximum 16384 x 16384
HDMI-1 connected 1920x1080+1920+0 (0x4a) normal (normal left inverted right x axis y axis) 527mm x 296mm
\tIdentifier: 0x43
\tGamma:      1.0:1.0:1.0
\tBrightness: 1.0
eDP-1 connected primary 1920x1080+0+0 (0x47) normal (normal left inverted right x axis y axis) 344mm x 193mm
\tIdentifier: 0x42
\tGamma:      1.0:0.5:2.0
\tBrightness: 0.75
DP-1 disconnected (normal left inverted right x axis y axis)
\tIdentifier: 0x44
\tGamma:      0.0:0.0:0.0
";

    #[test]
    fn test_parse_verbose_outputs() {
        let outputs = parse_verbose(VERBOSE);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].name, "HDMI-1");
        assert!(!outputs[0].primary);
        assert_eq!(
            outputs[1].gamma,
            OutputGamma {
                red: 1.0,
                green: 2.0,
                blue: 0.5,
                brightness: 0.75
            }
        );
    }

    #[test]
    fn test_restore_args_invert_reported_exponent() {
        // After `xrandr --gamma 0.5:1.0:1.25`, --verbose reports 2.0:1.0:0.8
        let text = "\
DP-2 connected primary 2560x1440+0+0 (0x50) normal 597mm x 336mm
\tGamma:      2.0:1.0:0.8
\tBrightness: 1.0
";
        let outputs = parse_verbose(text);
        assert_eq!(outputs[0].gamma.gamma_arg(), "0.500:1.000:1.250");
    }

    #[test]
    fn test_pick_prefers_primary() {
        let outputs = parse_verbose(VERBOSE);
        assert_eq!(pick_output(&outputs).map(|o| o.name.as_str()), Some("eDP-1"));
        assert!(pick_output(&[]).is_none());
    }

    #[test]
    fn test_fit_identity_ramp() {
        let fitted = OutputGamma::fit(&GammaRamp::linear());
        assert!((fitted.brightness - 1.0).abs() < 1e-6);
        assert!((fitted.red - 1.0).abs() < 0.01);
        assert!((fitted.blue - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_fit_dimmed_red_channel() {
        let settings = ColorSettings {
            red_scale: 0.5,
            ..ColorSettings::neutral()
        };
        let fitted = OutputGamma::fit(&GammaRamp::from_settings(&settings));
        assert!((fitted.brightness - 1.0).abs() < 1e-6);
        // Halving red pulls its midpoint down, i.e. a smaller exponent
        assert!(fitted.red < fitted.green);
    }
}
