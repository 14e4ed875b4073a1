//! Error types for the UAV core.
//!
//! Nothing here is fatal to a running simulation: configuration errors are
//! raised at construction, everything else is reported per call.

use thiserror::Error;

/// Rejected configuration values. Raised at construction, never clamped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("time step must be positive (got {0})")]
    NonPositiveTimeStep(f64),

    #[error("separation distance must be positive (got {0})")]
    NonPositiveSeparation(f64),

    #[error("safety margin multiplier must be >= 1.0 (got {0})")]
    SafetyMarginTooSmall(f64),

    #[error("max speed reduction must be within [0, 1] (got {0})")]
    SpeedReductionOutOfRange(f64),

    #[error("conflict detection horizon must be positive (got {0})")]
    NonPositiveHorizon(f64),

    #[error("detection sample step must be positive (got {0})")]
    NonPositiveSampleStep(f64),

    #[error("max UAV speed must be positive (got {0})")]
    NonPositiveSpeed(f64),

    #[error("altitude limits are inverted ({min} > {max})")]
    InvertedAltitudeLimits { min: f64, max: f64 },

    #[error("area bounds are inverted on the {axis} axis")]
    InvertedAreaBounds { axis: char },

    #[error("{field} must be non-negative (got {value})")]
    Negative { field: &'static str, value: f64 },
}

/// Mission assignment failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissionError {
    #[error("mission must contain at least one waypoint")]
    EmptyWaypoints,
}

/// Status changes that would break the UAV's invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("UAV {uav_id} is in an emergency and cannot leave it")]
    EmergencyIsTerminal { uav_id: String },

    #[error("UAV {uav_id} has no remaining waypoints to fly")]
    NoMission { uav_id: String },
}

/// Fleet-level lookups and mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    #[error("UAV {0} not found in fleet")]
    UnknownUav(String),

    #[error(transparent)]
    Mission(#[from] MissionError),
}

/// A single conflict resolution attempt that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("UAV {0} referenced by conflict is no longer in the fleet")]
    UnknownUav(String),

    #[error("resolution produced a non-finite state for UAV {uav_id}")]
    NonFiniteState { uav_id: String },
}
