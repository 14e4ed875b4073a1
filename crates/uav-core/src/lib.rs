pub mod conflict;
pub mod error;
pub mod fleet;
pub mod maneuver;
pub mod models;
pub mod priority;
pub mod resolution;
pub mod rules;
pub mod vector;

pub use conflict::{sort_for_resolution, Conflict, ConflictDetector, ConflictSeverity};
pub use error::{ConfigError, FleetError, MissionError, ResolutionError, StatusError};
pub use fleet::{ConflictSnapshot, Fleet, FleetCounters, FleetStatus};
pub use maneuver::{plan_avoidance, Maneuver, ManeuverType};
pub use models::{ControlMode, Uav, UavInfo, UavKind, UavStatus};
pub use priority::{
    EscalationReason, MissionType, PriorityChange, PriorityChangeReason, PriorityLevel,
    PriorityManager, PriorityMatrix, PrioritySummary, Situation,
};
pub use resolution::{
    ActionKind, DeconflictionEngine, ResolutionAction, ResolutionRecord, Strategy,
};
pub use rules::{DeconflictionConfig, SimulationConfig};
pub use vector::Vec3;
