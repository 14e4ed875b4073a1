//! Conflict resolution engine.
//!
//! Picks one of six strategies per conflict, applies it to the two UAVs and
//! records the attempt. A strategy that leaves either UAV in a non-finite
//! state is rolled back and recorded as failed.

use crate::conflict::{Conflict, ConflictSeverity};
use crate::error::ResolutionError;
use crate::maneuver::{self, Maneuver, MAX_DELTA_FRACTION};
use crate::models::{ControlMode, Uav};
use crate::rules::DeconflictionConfig;
use crate::vector::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Conflicts breaching sooner than this get geometric separation.
const URGENT_TIME_S: f64 = 10.0;
/// Pairs closer than this in altitude can be layered vertically.
const LAYERING_ALTITUDE_BAND_M: f64 = 30.0;
const MIN_SEPARATION_TIME_S: f64 = 10.0;
/// Extra time past closest approach spent opening the gap.
const CPA_PADDING_S: f64 = 5.0;
/// Relative speeds below this are treated as parallel flight.
const PARALLEL_SPEED_MPS: f64 = 0.1;
/// Never slow below this fraction of max speed.
const MIN_SAFE_SPEED_FRACTION: f64 = 0.2;
const SPEED_ADJUSTMENT_PADDING_S: f64 = 10.0;
/// Fraction of max speed used when flying apart in an emergency.
const EMERGENCY_SEPARATION_INTENSITY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PriorityBased,
    AltitudeLayering,
    GeometricSeparation,
    VelocityAdjustment,
    CooperativePathfinding,
    /// Always available, cannot be disabled
    EmergencyAvoidance,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::PriorityBased => "priority_based",
            Strategy::AltitudeLayering => "altitude_layering",
            Strategy::GeometricSeparation => "geometric_separation",
            Strategy::VelocityAdjustment => "velocity_adjustment",
            Strategy::CooperativePathfinding => "cooperative_pathfinding",
            Strategy::EmergencyAvoidance => "emergency_avoidance",
        }
    }

    pub fn is_enabled(self, config: &DeconflictionConfig) -> bool {
        match self {
            Strategy::PriorityBased => config.enable_priority_based,
            Strategy::AltitudeLayering => config.enable_altitude_layering,
            Strategy::GeometricSeparation => config.enable_geometric_separation,
            Strategy::VelocityAdjustment => config.enable_velocity_adjustment,
            Strategy::CooperativePathfinding => config.enable_cooperative_pathfinding,
            Strategy::EmergencyAvoidance => true,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was done to one UAV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    PriorityAvoidance {
        maneuver: Maneuver,
        priority_uav: String,
    },
    AltitudeChange {
        new_altitude: f64,
        change: f64,
    },
    GeometricSeparation {
        velocity_delta: Vec3,
        duration_s: f64,
    },
    SpeedReduction {
        reduction: f64,
        new_speed: f64,
        duration_s: f64,
    },
    CooperativeWaypoint {
        waypoint: Vec3,
        mission_index: usize,
    },
    EmergencyStop,
    EmergencySeparation {
        direction: Vec3,
        intensity: f64,
        target_separation: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub uav_id: String,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl ResolutionAction {
    fn new(uav: &Uav, kind: ActionKind) -> Self {
        Self {
            uav_id: uav.id().to_string(),
            kind,
        }
    }
}

/// One resolution attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub conflict_id: String,
    /// Strategy chosen by the selection policy
    pub strategy: Strategy,
    /// Strategy that actually ran after internal fallbacks
    pub applied: Strategy,
    pub severity: ConflictSeverity,
    pub actions: Vec<ResolutionAction>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Applies resolution strategies and keeps the per-instance attempt history.
#[derive(Debug, Clone)]
pub struct DeconflictionEngine {
    config: DeconflictionConfig,
    altitude_limits: (f64, f64),
    history: Vec<ResolutionRecord>,
}

impl DeconflictionEngine {
    pub fn new(config: DeconflictionConfig, altitude_limits: (f64, f64)) -> Self {
        Self {
            config,
            altitude_limits,
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &DeconflictionConfig {
        &self.config
    }

    pub fn altitude_limits(&self) -> (f64, f64) {
        self.altitude_limits
    }

    /// Choose a strategy. First matching rule wins; a disabled choice falls
    /// back to geometric separation, then to emergency avoidance.
    pub fn select_strategy(&self, conflict: &Conflict, uav1: &Uav, uav2: &Uav) -> Strategy {
        let preferred = if conflict.severity == ConflictSeverity::Critical {
            Strategy::EmergencyAvoidance
        } else if conflict.time_to_conflict < URGENT_TIME_S {
            Strategy::GeometricSeparation
        } else if uav1.priority().abs_diff(uav2.priority()) > 1 {
            Strategy::PriorityBased
        } else if (uav1.position.z - uav2.position.z).abs() < LAYERING_ALTITUDE_BAND_M {
            Strategy::AltitudeLayering
        } else if uav1.current_target().is_some() && uav2.current_target().is_some() {
            Strategy::CooperativePathfinding
        } else {
            Strategy::VelocityAdjustment
        };

        if preferred.is_enabled(&self.config) {
            preferred
        } else if Strategy::GeometricSeparation.is_enabled(&self.config) {
            Strategy::GeometricSeparation
        } else {
            Strategy::EmergencyAvoidance
        }
    }

    /// Select a strategy and apply it. `uav1`/`uav2` must be the UAVs named
    /// by the conflict, in the same order.
    pub fn resolve(&mut self, conflict: &Conflict, uav1: &mut Uav, uav2: &mut Uav) -> ResolutionRecord {
        let strategy = self.select_strategy(conflict, uav1, uav2);
        self.resolve_with(strategy, conflict, uav1, uav2)
    }

    /// Apply a specific strategy, rolling both UAVs back if it fails.
    pub fn resolve_with(
        &mut self,
        strategy: Strategy,
        conflict: &Conflict,
        uav1: &mut Uav,
        uav2: &mut Uav,
    ) -> ResolutionRecord {
        debug_assert_eq!(uav1.id(), conflict.uav1_id);
        debug_assert_eq!(uav2.id(), conflict.uav2_id);

        let snapshot = (uav1.clone(), uav2.clone());
        let mut actions = Vec::new();

        let applied = self.apply(strategy, conflict, uav1, uav2, &mut actions);
        let outcome = check_finite(uav1)
            .and_then(|()| check_finite(uav2))
            .map(|()| applied);

        let record = match outcome {
            Ok(applied) => {
                tracing::debug!(
                    "Resolved conflict {} ({}) with {}",
                    conflict.pair_id(),
                    conflict.severity,
                    applied
                );
                ResolutionRecord {
                    conflict_id: conflict.pair_id(),
                    strategy,
                    applied,
                    severity: conflict.severity,
                    actions,
                    success: true,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!("Failed to resolve conflict {}: {}", conflict.pair_id(), err);
                *uav1 = snapshot.0;
                *uav2 = snapshot.1;
                ResolutionRecord {
                    conflict_id: conflict.pair_id(),
                    strategy,
                    applied: strategy,
                    severity: conflict.severity,
                    actions: Vec::new(),
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        };

        self.history.push(record.clone());
        record
    }

    /// Record a conflict that could not be attempted at all.
    pub fn record_failure(&mut self, conflict: &Conflict, err: &ResolutionError) -> ResolutionRecord {
        tracing::warn!("Failed to resolve conflict {}: {}", conflict.pair_id(), err);
        let record = ResolutionRecord {
            conflict_id: conflict.pair_id(),
            strategy: Strategy::EmergencyAvoidance,
            applied: Strategy::EmergencyAvoidance,
            severity: conflict.severity,
            actions: Vec::new(),
            success: false,
            error: Some(err.to_string()),
        };
        self.history.push(record.clone());
        record
    }

    pub fn history(&self) -> &[ResolutionRecord] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Number of successful resolutions per applied strategy.
    pub fn strategy_counts(&self) -> BTreeMap<Strategy, usize> {
        let mut counts = BTreeMap::new();
        for record in self.history.iter().filter(|r| r.success) {
            *counts.entry(record.applied).or_insert(0) += 1;
        }
        counts
    }

    fn apply(
        &self,
        strategy: Strategy,
        conflict: &Conflict,
        uav1: &mut Uav,
        uav2: &mut Uav,
        actions: &mut Vec<ResolutionAction>,
    ) -> Strategy {
        match strategy {
            Strategy::PriorityBased => self.priority_based(conflict, uav1, uav2, actions),
            Strategy::AltitudeLayering => self.altitude_layering(uav1, uav2, actions),
            Strategy::GeometricSeparation => self.geometric_separation(uav1, uav2, actions),
            Strategy::VelocityAdjustment => self.velocity_adjustment(conflict, uav1, uav2, actions),
            Strategy::CooperativePathfinding => self.cooperative_pathfinding(uav1, uav2, actions),
            Strategy::EmergencyAvoidance => self.emergency_avoidance(conflict, uav1, uav2, actions),
        }
    }

    fn padded_separation(&self, uav1: &Uav, uav2: &Uav) -> f64 {
        uav1.required_separation(uav2) * self.config.safety_margin_multiplier
    }

    fn priority_based(
        &self,
        conflict: &Conflict,
        uav1: &mut Uav,
        uav2: &mut Uav,
        actions: &mut Vec<ResolutionAction>,
    ) -> Strategy {
        let (avoiding, priority_uav) = match uav1.priority().cmp(&uav2.priority()) {
            std::cmp::Ordering::Less => (uav2, uav1),
            std::cmp::Ordering::Greater => (uav1, uav2),
            std::cmp::Ordering::Equal => return self.geometric_separation(uav1, uav2, actions),
        };

        let maneuver = maneuver::plan_avoidance(avoiding, priority_uav, conflict, &self.config);
        maneuver::execute(
            avoiding,
            &maneuver,
            self.altitude_limits,
            self.config.override_duration,
        );
        actions.push(ResolutionAction::new(
            avoiding,
            ActionKind::PriorityAvoidance {
                maneuver,
                priority_uav: priority_uav.id().to_string(),
            },
        ));
        Strategy::PriorityBased
    }

    /// Split vertically by the padded separation. The higher UAV climbs;
    /// at equal altitude the lexicographically smaller id descends.
    fn altitude_layering(
        &self,
        uav1: &mut Uav,
        uav2: &mut Uav,
        actions: &mut Vec<ResolutionAction>,
    ) -> Strategy {
        let half = self.padded_separation(uav1, uav2) / 2.0;
        let uav1_climbs = if uav1.position.z != uav2.position.z {
            uav1.position.z > uav2.position.z
        } else {
            uav1.id() > uav2.id()
        };
        let (change1, change2) = if uav1_climbs {
            (half, -half)
        } else {
            (-half, half)
        };

        for (uav, change) in [(uav1, change1), (uav2, change2)] {
            let (min_alt, max_alt) = self.altitude_limits;
            let old = uav.position.z;
            uav.position.z = (old + change).clamp(min_alt, max_alt);
            actions.push(ResolutionAction::new(
                uav,
                ActionKind::AltitudeChange {
                    new_altitude: uav.position.z,
                    change: uav.position.z - old,
                },
            ));
        }
        Strategy::AltitudeLayering
    }

    /// Push the pair apart perpendicular to their relative position at
    /// closest approach.
    fn geometric_separation(
        &self,
        uav1: &mut Uav,
        uav2: &mut Uav,
        actions: &mut Vec<ResolutionAction>,
    ) -> Strategy {
        let rel_pos = uav2.position - uav1.position;
        let rel_vel = uav2.velocity - uav1.velocity;

        let time_to_cpa = if rel_vel.norm() > PARALLEL_SPEED_MPS {
            (-rel_pos.dot(rel_vel) / rel_vel.dot(rel_vel)).max(0.0)
        } else {
            0.0
        };
        let projected = rel_pos + rel_vel * time_to_cpa;

        let required = self.padded_separation(uav1, uav2);
        let separation = [projected, rel_pos, rel_vel]
            .into_iter()
            .find_map(|v| v.horizontal_perpendicular().with_length(required))
            .unwrap_or(Vec3::new(required, 0.0, 0.0));

        let separation_time = (time_to_cpa + CPA_PADDING_S).max(MIN_SEPARATION_TIME_S);
        let max_delta = uav1.max_speed.min(uav2.max_speed) * MAX_DELTA_FRACTION;

        for (uav, share) in [(uav1, separation / 2.0), (uav2, -separation / 2.0)] {
            let delta = (share / separation_time).clamp_length(max_delta);
            let velocity = uav.velocity + delta;
            uav.enter_conflict_resolution(velocity, separation_time);
            actions.push(ResolutionAction::new(
                uav,
                ActionKind::GeometricSeparation {
                    velocity_delta: delta,
                    duration_s: separation_time,
                },
            ));
        }
        Strategy::GeometricSeparation
    }

    /// Slow the lower-precedence UAV (uav2 on a tie).
    fn velocity_adjustment(
        &self,
        conflict: &Conflict,
        uav1: &mut Uav,
        uav2: &mut Uav,
        actions: &mut Vec<ResolutionAction>,
    ) -> Strategy {
        let uav1_adjusts = uav1.priority() > uav2.priority();
        let (speed, max_speed) = if uav1_adjusts {
            (uav1.speed(), uav1.max_speed)
        } else {
            (uav2.speed(), uav2.max_speed)
        };

        let min_safe = max_speed * MIN_SAFE_SPEED_FRACTION;
        let reduction = (speed * self.config.max_speed_reduction).min(speed - min_safe);
        if speed <= min_safe * 1.5 || reduction <= 0.0 {
            return self.geometric_separation(uav1, uav2, actions);
        }

        let adjusting = if uav1_adjusts { uav1 } else { uav2 };
        let new_speed = speed - reduction;
        let duration_s = conflict.time_to_conflict + SPEED_ADJUSTMENT_PADDING_S;
        let velocity = adjusting.velocity * (new_speed / speed);
        adjusting.enter_conflict_resolution(velocity, duration_s);
        actions.push(ResolutionAction::new(
            adjusting,
            ActionKind::SpeedReduction {
                reduction,
                new_speed,
                duration_s,
            },
        ));
        Strategy::VelocityAdjustment
    }

    /// Insert a detour waypoint for each UAV on either side of their midpoint.
    fn cooperative_pathfinding(
        &self,
        uav1: &mut Uav,
        uav2: &mut Uav,
        actions: &mut Vec<ResolutionAction>,
    ) -> Strategy {
        if uav1.current_target().is_none() || uav2.current_target().is_none() {
            return self.geometric_separation(uav1, uav2, actions);
        }
        let Some(unit) = (uav2.position - uav1.position).normalized() else {
            return self.altitude_layering(uav1, uav2, actions);
        };

        let required = self.padded_separation(uav1, uav2);
        let midpoint = uav1.position.midpoint(uav2.position);

        for (uav, waypoint) in [
            (uav1, midpoint - unit * required),
            (uav2, midpoint + unit * required),
        ] {
            let mission_index = uav.insert_waypoint_at_cursor(waypoint);
            actions.push(ResolutionAction::new(
                uav,
                ActionKind::CooperativeWaypoint {
                    waypoint,
                    mission_index,
                },
            ));
        }
        Strategy::CooperativePathfinding
    }

    /// Critical conflicts stop both UAVs; anything else flies them apart.
    fn emergency_avoidance(
        &self,
        conflict: &Conflict,
        uav1: &mut Uav,
        uav2: &mut Uav,
        actions: &mut Vec<ResolutionAction>,
    ) -> Strategy {
        if conflict.severity == ConflictSeverity::Critical {
            for uav in [uav1, uav2] {
                uav.emergency_stop();
                actions.push(ResolutionAction::new(uav, ActionKind::EmergencyStop));
            }
            return Strategy::EmergencyAvoidance;
        }

        let target_separation = uav1.required_separation(uav2) * 2.0;
        let unit = (uav2.position - uav1.position)
            .normalized()
            .unwrap_or(Vec3::new(1.0, 0.0, 0.0));

        for (uav, direction) in [(uav1, -unit), (uav2, unit)] {
            let velocity = direction * (uav.max_speed * EMERGENCY_SEPARATION_INTENSITY);
            uav.enter_conflict_resolution(velocity, self.config.override_duration);
            actions.push(ResolutionAction::new(
                uav,
                ActionKind::EmergencySeparation {
                    direction,
                    intensity: EMERGENCY_SEPARATION_INTENSITY,
                    target_separation,
                },
            ));
        }
        Strategy::EmergencyAvoidance
    }
}

fn check_finite(uav: &Uav) -> Result<(), ResolutionError> {
    let override_finite = match uav.control() {
        ControlMode::Normal => true,
        ControlMode::Overridden {
            velocity,
            remaining_s,
        } => velocity.is_finite() && remaining_s.is_finite(),
    };
    if uav.position.is_finite()
        && uav.velocity.is_finite()
        && override_finite
        && uav.waypoints().iter().all(|wp| wp.is_finite())
    {
        Ok(())
    } else {
        Err(ResolutionError::NonFiniteState {
            uav_id: uav.id().to_string(),
        })
    }
}
