//! Simulation and deconfliction parameters.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Airspace, clock and detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// (min_x, max_x, min_y, max_y) in meters
    pub area_bounds: (f64, f64, f64, f64),
    /// (min, max) operating altitude in meters
    pub altitude_limits: (f64, f64),
    /// Tick duration in seconds
    pub time_step: f64,
    /// Minimum separation given to UAVs added without an explicit value
    pub default_separation: f64,
    /// Lookahead window for conflict prediction in seconds
    pub conflict_detection_horizon: f64,
    /// Spacing between prediction samples in seconds
    pub detection_sample_step: f64,
    pub max_uav_speed: f64,
    /// Percent per minute of flight
    pub fuel_consumption_rate: f64,
    /// Percent per minute of flight
    pub battery_consumption_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            area_bounds: (-2000.0, 2000.0, -2000.0, 2000.0),
            altitude_limits: (50.0, 500.0),
            time_step: 1.0,
            default_separation: 50.0,
            conflict_detection_horizon: 60.0,
            detection_sample_step: 1.0,
            max_uav_speed: 15.0,
            fuel_consumption_rate: 1.0,
            battery_consumption_rate: 1.5,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_positive(self.time_step) {
            return Err(ConfigError::NonPositiveTimeStep(self.time_step));
        }
        if !is_positive(self.default_separation) {
            return Err(ConfigError::NonPositiveSeparation(self.default_separation));
        }
        if !is_positive(self.conflict_detection_horizon) {
            return Err(ConfigError::NonPositiveHorizon(self.conflict_detection_horizon));
        }
        if !is_positive(self.detection_sample_step) {
            return Err(ConfigError::NonPositiveSampleStep(self.detection_sample_step));
        }
        if !is_positive(self.max_uav_speed) {
            return Err(ConfigError::NonPositiveSpeed(self.max_uav_speed));
        }
        let (min_alt, max_alt) = self.altitude_limits;
        if min_alt > max_alt {
            return Err(ConfigError::InvertedAltitudeLimits {
                min: min_alt,
                max: max_alt,
            });
        }
        let (min_x, max_x, min_y, max_y) = self.area_bounds;
        if min_x > max_x {
            return Err(ConfigError::InvertedAreaBounds { axis: 'x' });
        }
        if min_y > max_y {
            return Err(ConfigError::InvertedAreaBounds { axis: 'y' });
        }
        if self.fuel_consumption_rate < 0.0 {
            return Err(ConfigError::Negative {
                field: "fuel_consumption_rate",
                value: self.fuel_consumption_rate,
            });
        }
        if self.battery_consumption_rate < 0.0 {
            return Err(ConfigError::Negative {
                field: "battery_consumption_rate",
                value: self.battery_consumption_rate,
            });
        }
        Ok(())
    }
}

/// False for zero, negatives and NaN.
fn is_positive(value: f64) -> bool {
    value > 0.0
}

/// Resolution strategy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeconflictionConfig {
    pub enable_priority_based: bool,
    pub enable_altitude_layering: bool,
    pub enable_geometric_separation: bool,
    pub enable_velocity_adjustment: bool,
    pub enable_cooperative_pathfinding: bool,

    /// Multiplier applied to separation minima when sizing maneuvers
    pub safety_margin_multiplier: f64,
    /// Largest altitude step a single priority maneuver may take (meters)
    pub max_altitude_change: f64,
    /// Largest speed cut as a fraction of current speed
    pub max_speed_reduction: f64,
    /// How long an avoidance velocity is held before mission tracking resumes
    pub override_duration: f64,
}

impl Default for DeconflictionConfig {
    fn default() -> Self {
        Self {
            enable_priority_based: true,
            enable_altitude_layering: true,
            enable_geometric_separation: true,
            enable_velocity_adjustment: true,
            enable_cooperative_pathfinding: true,
            safety_margin_multiplier: 1.5,
            max_altitude_change: 100.0,
            max_speed_reduction: 0.5,
            override_duration: 15.0,
        }
    }
}

impl DeconflictionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.safety_margin_multiplier.is_nan() || self.safety_margin_multiplier < 1.0 {
            return Err(ConfigError::SafetyMarginTooSmall(
                self.safety_margin_multiplier,
            ));
        }
        if !(0.0..=1.0).contains(&self.max_speed_reduction) {
            return Err(ConfigError::SpeedReductionOutOfRange(
                self.max_speed_reduction,
            ));
        }
        for (field, value) in [
            ("max_altitude_change", self.max_altitude_change),
            ("override_duration", self.override_duration),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(DeconflictionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_positive_time_step() {
        let config = SimulationConfig {
            time_step: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveTimeStep(0.0)));
    }

    #[test]
    fn test_rejects_negative_separation() {
        let config = SimulationConfig {
            default_separation: -5.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveSeparation(-5.0))
        );
    }

    #[test]
    fn test_rejects_small_safety_margin() {
        let config = DeconflictionConfig {
            safety_margin_multiplier: 0.9,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SafetyMarginTooSmall(0.9))
        );
    }

    #[test]
    fn test_rejects_nan_margin() {
        let config = DeconflictionConfig {
            safety_margin_multiplier: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"time_step": 2.0}"#).unwrap();
        assert_eq!(config.time_step, 2.0);
        assert_eq!(config.default_separation, 50.0);
    }

    #[test]
    fn test_serialized_fields_are_all_consumed() {
        let value = serde_json::to_value(DeconflictionConfig::default()).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        for retired in ["loiter_radius", "critical_time_threshold", "emergency_stop_distance"] {
            assert!(!keys.contains(&retired), "{retired} still serialized");
        }
        let value = serde_json::to_value(SimulationConfig::default()).unwrap();
        assert!(value.get("emergency_separation").is_none());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result: Result<DeconflictionConfig, _> = serde_json::from_str(
            r#"{"critical_time_threshold": 30.0, "override_duration": 20.0}"#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("critical_time_threshold"));

        let result: Result<SimulationConfig, _> =
            serde_json::from_str(r#"{"emergency_separation": 30.0}"#);
        assert!(result.is_err());
    }
}
