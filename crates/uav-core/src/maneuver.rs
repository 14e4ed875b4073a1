//! Single-UAV avoidance maneuvers used by priority-based resolution.

use crate::conflict::Conflict;
use crate::models::Uav;
use crate::rules::DeconflictionConfig;
use crate::vector::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pairs closer than this in altitude dodge sideways instead of vertically.
const LATERAL_ALTITUDE_BAND_M: f64 = 20.0;
/// Lateral offset as a multiple of the avoiding UAV's own minimum separation.
const LATERAL_SEPARATION_FACTOR: f64 = 1.5;
const ALTITUDE_STEP_M: f64 = 50.0;
const MIN_MANEUVER_DURATION_S: f64 = 10.0;
/// Velocity deltas are capped at this fraction of max speed.
pub const MAX_DELTA_FRACTION: f64 = 0.5;
/// Speed reductions never go below this fraction of current speed.
const MIN_SPEED_FACTOR: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    LateralLeft,
    LateralRight,
    AltitudeUp,
    AltitudeDown,
    SpeedReduction,
    Loiter,
    EmergencyStop,
}

impl fmt::Display for ManeuverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManeuverType::LateralLeft => "lateral_left",
            ManeuverType::LateralRight => "lateral_right",
            ManeuverType::AltitudeUp => "altitude_up",
            ManeuverType::AltitudeDown => "altitude_down",
            ManeuverType::SpeedReduction => "speed_reduction",
            ManeuverType::Loiter => "loiter",
            ManeuverType::EmergencyStop => "emergency_stop",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    #[serde(rename = "type")]
    pub kind: ManeuverType,
    /// Meters for lateral/altitude maneuvers, m/s for speed reduction
    pub magnitude: f64,
    pub duration_s: f64,
    /// Lower is cheaper
    pub cost: f64,
}

impl Maneuver {
    pub fn new(kind: ManeuverType, magnitude: f64, duration_s: f64, priority: u8) -> Self {
        Self {
            kind,
            magnitude,
            duration_s,
            cost: maneuver_cost(magnitude, duration_s, priority),
        }
    }
}

/// Deviation plus time, weighted so important UAVs pay less for a maneuver.
pub fn maneuver_cost(magnitude: f64, duration_s: f64, priority: u8) -> f64 {
    (magnitude / 100.0 + duration_s / 60.0) * (priority as f64 / 5.0)
}

/// Pick the maneuver the yielding UAV flies to clear `priority_uav`.
pub fn plan_avoidance(
    avoiding: &Uav,
    priority_uav: &Uav,
    conflict: &Conflict,
    config: &DeconflictionConfig,
) -> Maneuver {
    let rel_pos = priority_uav.position - avoiding.position;
    let duration_s = conflict.time_to_conflict.max(MIN_MANEUVER_DURATION_S);

    let (kind, magnitude) = if rel_pos.z.abs() < LATERAL_ALTITUDE_BAND_M {
        let kind = if rel_pos.x > 0.0 {
            ManeuverType::LateralLeft
        } else {
            ManeuverType::LateralRight
        };
        (kind, avoiding.min_separation * LATERAL_SEPARATION_FACTOR)
    } else {
        let kind = if avoiding.position.z < priority_uav.position.z {
            ManeuverType::AltitudeDown
        } else {
            ManeuverType::AltitudeUp
        };
        (kind, ALTITUDE_STEP_M.min(config.max_altitude_change))
    };

    Maneuver::new(kind, magnitude, duration_s, avoiding.priority())
}

/// Apply a maneuver and pin the result with a conflict-resolution override.
pub fn execute(
    uav: &mut Uav,
    maneuver: &Maneuver,
    altitude_limits: (f64, f64),
    override_duration_s: f64,
) {
    let (min_alt, max_alt) = altitude_limits;
    let max_delta = uav.max_speed * MAX_DELTA_FRACTION;
    let duration_s = maneuver.duration_s.max(f64::EPSILON);

    match maneuver.kind {
        ManeuverType::LateralLeft | ManeuverType::LateralRight => {
            let sign = if maneuver.kind == ManeuverType::LateralLeft {
                -1.0
            } else {
                1.0
            };
            let delta = (sign * maneuver.magnitude / duration_s).clamp(-max_delta, max_delta);
            let velocity = uav.velocity + Vec3::new(0.0, delta, 0.0);
            uav.enter_conflict_resolution(velocity, override_duration_s);
        }
        ManeuverType::AltitudeUp | ManeuverType::AltitudeDown => {
            let sign = if maneuver.kind == ManeuverType::AltitudeUp {
                1.0
            } else {
                -1.0
            };
            uav.position.z = (uav.position.z + sign * maneuver.magnitude).clamp(min_alt, max_alt);
            uav.enter_conflict_resolution(uav.velocity, override_duration_s);
        }
        ManeuverType::SpeedReduction => {
            let speed = uav.speed();
            if speed > 0.0 {
                let factor = (1.0 - maneuver.magnitude / speed).max(MIN_SPEED_FACTOR);
                uav.enter_conflict_resolution(uav.velocity * factor, override_duration_s);
            }
        }
        ManeuverType::Loiter => {
            let hold = Vec3::new(0.0, 0.0, uav.velocity.z);
            uav.enter_conflict_resolution(hold, maneuver.duration_s);
        }
        ManeuverType::EmergencyStop => uav.emergency_stop(),
    }
}
