//! Score calibration
//!
//! The three cascade tiers score candidates on unrelated scales (softmax
//! probability, correlation peak, histogram agreement). Every tier's raw
//! score goes through its method's [`Calibration`] before it is compared
//! against the shared cascade thresholds.

use serde::{Deserialize, Serialize};

/// Mapping from a raw detector score onto the shared `[0, 1]` confidence scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calibration {
    /// `clamp(raw, 0, 1)`
    Identity,
    /// `clamp(scale * raw + offset, 0, 1)`
    Linear { scale: f64, offset: f64 },
    /// `1 / (1 + exp(-steepness * (raw - midpoint)))`
    Logistic { midpoint: f64, steepness: f64 },
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration::Identity
    }
}

impl Calibration {
    /// Map a raw score to a confidence in `[0, 1]`. Non-finite scores map to 0.
    pub fn apply(&self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return 0.0;
        }

        let calibrated = match *self {
            Calibration::Identity => raw,
            Calibration::Linear { scale, offset } => scale * raw + offset,
            Calibration::Logistic {
                midpoint,
                steepness,
            } => 1.0 / (1.0 + (-steepness * (raw - midpoint)).exp()),
        };
        calibrated.clamp(0.0, 1.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Calibration::Identity => Ok(()),
            Calibration::Linear { scale, offset } => {
                if !scale.is_finite() || !offset.is_finite() {
                    return Err(format!(
                        "linear calibration needs finite parameters, got scale={} offset={}",
                        scale, offset
                    ));
                }
                if scale < 0.0 {
                    return Err(format!(
                        "linear calibration must be monotonic, got scale={}",
                        scale
                    ));
                }
                Ok(())
            }
            Calibration::Logistic {
                midpoint,
                steepness,
            } => {
                if !midpoint.is_finite() || !steepness.is_finite() || steepness <= 0.0 {
                    return Err(format!(
                        "logistic calibration needs finite midpoint and positive steepness, got midpoint={} steepness={}",
                        midpoint, steepness
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Per-method calibration used by the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Primary artifact scores are softmax probabilities already
    pub primary: Calibration,
    /// Template correlation peaks are already mapped into `[0, 1]`
    pub template: Calibration,
    /// Heuristic agreement is discounted: it is the least accurate tier
    pub heuristic: Calibration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            primary: Calibration::Identity,
            template: Calibration::Identity,
            heuristic: Calibration::Linear {
                scale: 0.9,
                offset: 0.0,
            },
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.primary.validate().map_err(|e| format!("primary: {}", e))?;
        self.template.validate().map_err(|e| format!("template: {}", e))?;
        self.heuristic.validate().map_err(|e| format!("heuristic: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_clamps() {
        let calibration = Calibration::Identity;
        assert_eq!(calibration.apply(0.9), 0.9);
        assert_eq!(calibration.apply(1.4), 1.0);
        assert_eq!(calibration.apply(-0.2), 0.0);
        assert_eq!(calibration.apply(f64::NAN), 0.0);
    }

    #[test]
    fn test_linear_and_logistic() {
        let linear = Calibration::Linear {
            scale: 0.9,
            offset: 0.0,
        };
        assert_relative_eq!(linear.apply(0.8), 0.72, epsilon = 1e-12);

        let logistic = Calibration::Logistic {
            midpoint: 0.5,
            steepness: 10.0,
        };
        assert_relative_eq!(logistic.apply(0.5), 0.5, epsilon = 1e-12);
        assert!(logistic.apply(0.9) > 0.95);
        assert!(logistic.apply(0.1) < 0.05);
    }

    #[test]
    fn test_calibration_is_monotonic() {
        let calibrations = [
            Calibration::Identity,
            CalibrationConfig::default().heuristic,
            Calibration::Logistic {
                midpoint: 0.4,
                steepness: 6.0,
            },
        ];
        for calibration in calibrations {
            let mut previous = calibration.apply(0.0);
            for step in 1..=100 {
                let value = calibration.apply(step as f64 / 100.0);
                assert!(value >= previous, "{:?} not monotonic at {}", calibration, step);
                previous = value;
            }
        }
    }

    #[test]
    fn test_invalid_calibration() {
        assert!(Calibration::Linear { scale: -1.0, offset: 0.0 }.validate().is_err());
        assert!(Calibration::Logistic { midpoint: 0.5, steepness: 0.0 }.validate().is_err());
        assert!(CalibrationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&Calibration::Linear {
            scale: 0.9,
            offset: 0.0,
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"linear","scale":0.9,"offset":0.0}"#);
    }
}
