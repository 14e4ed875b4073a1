//! Core data models: a single UAV and its kinematic update rule.

use crate::error::{MissionError, StatusError};
use crate::vector::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A waypoint closer than this counts as reached.
pub const WAYPOINT_REACHED_M: f64 = 1.0;
/// Heading is only recomputed above this horizontal speed.
const HEADING_MIN_SPEED_MPS: f64 = 0.1;

pub const DEFAULT_MAX_SPEED_MPS: f64 = 15.0;
pub const DEFAULT_MIN_SEPARATION_M: f64 = 50.0;

pub const HIGHEST_PRIORITY: u8 = 1;
pub const LOWEST_PRIORITY: u8 = 5;

/// Airframe type. Informational only, kinematics do not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UavKind {
    Quadcopter,
    FixedWing,
    Helicopter,
    /// Vertical take-off and landing
    Vtol,
}

impl fmt::Display for UavKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UavKind::Quadcopter => "quadcopter",
            UavKind::FixedWing => "fixed_wing",
            UavKind::Helicopter => "helicopter",
            UavKind::Vtol => "vtol",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UavStatus {
    Idle,
    Active,
    /// Flying a waypoint mission
    Mission,
    /// Stopped by an emergency; permanent in the core
    Emergency,
    Maintenance,
}

impl UavStatus {
    /// Whether a UAV in this status takes part in conflict detection.
    pub fn is_active(self) -> bool {
        matches!(self, UavStatus::Active | UavStatus::Mission)
    }
}

impl fmt::Display for UavStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UavStatus::Idle => "idle",
            UavStatus::Active => "active",
            UavStatus::Mission => "mission",
            UavStatus::Emergency => "emergency",
            UavStatus::Maintenance => "maintenance",
        };
        f.write_str(name)
    }
}

/// Who decides the velocity on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ControlMode {
    /// Mission tracking owns the velocity.
    #[default]
    Normal,
    /// A resolution maneuver pinned the velocity for a while.
    Overridden { velocity: Vec3, remaining_s: f64 },
}

/// A single simulated UAV.
#[derive(Debug, Clone)]
pub struct Uav {
    id: String,
    kind: UavKind,
    pub position: Vec3,
    pub velocity: Vec3,
    heading_deg: f64,
    pub max_speed: f64,
    /// Minimum distance this UAV requires from any other (meters)
    pub min_separation: f64,
    priority: u8,
    waypoints: Vec<Vec3>,
    current_waypoint_index: usize,
    mission_complete: bool,
    status: UavStatus,
    /// Percent, 0-100
    pub fuel_level: f64,
    /// Percent, 0-100
    pub battery_level: f64,
    emergency_landing: bool,
    control: ControlMode,
}

impl Uav {
    /// Create an idle UAV with default speed, separation and top priority.
    pub fn new(id: impl Into<String>, kind: UavKind, position: impl Into<Vec3>) -> Self {
        Self {
            id: id.into(),
            kind,
            position: position.into(),
            velocity: Vec3::ZERO,
            heading_deg: 0.0,
            max_speed: DEFAULT_MAX_SPEED_MPS,
            min_separation: DEFAULT_MIN_SEPARATION_M,
            priority: HIGHEST_PRIORITY,
            waypoints: Vec::new(),
            current_waypoint_index: 0,
            mission_complete: false,
            status: UavStatus::Idle,
            fuel_level: 100.0,
            battery_level: 100.0,
            emergency_landing: false,
            control: ControlMode::Normal,
        }
    }

    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub fn with_min_separation(mut self, min_separation: f64) -> Self {
        self.min_separation = min_separation;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.set_priority(priority);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> UavKind {
        self.kind
    }

    pub fn heading_deg(&self) -> f64 {
        self.heading_deg
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Set priority, clamped to `[1, 5]`.
    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.clamp(HIGHEST_PRIORITY, LOWEST_PRIORITY);
    }

    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    pub fn current_waypoint_index(&self) -> usize {
        self.current_waypoint_index
    }

    pub fn mission_complete(&self) -> bool {
        self.mission_complete
    }

    pub fn emergency_landing(&self) -> bool {
        self.emergency_landing
    }

    pub fn control(&self) -> ControlMode {
        self.control
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self.control, ControlMode::Overridden { .. })
    }

    pub fn status(&self) -> UavStatus {
        self.status
    }

    /// Change the operating status.
    ///
    /// `Emergency` goes through [`Uav::emergency_stop`] and is never left
    /// again. `Mission` needs a waypoint still to fly.
    pub fn set_status(&mut self, status: UavStatus) -> Result<(), StatusError> {
        if self.emergency_landing && status != UavStatus::Emergency {
            return Err(StatusError::EmergencyIsTerminal {
                uav_id: self.id.clone(),
            });
        }
        match status {
            UavStatus::Emergency => self.emergency_stop(),
            UavStatus::Mission if self.current_target().is_none() => {
                return Err(StatusError::NoMission {
                    uav_id: self.id.clone(),
                });
            }
            _ => self.status = status,
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Fuel or battery below 20%.
    pub fn is_power_critical(&self) -> bool {
        self.fuel_level < 20.0 || self.battery_level < 20.0
    }

    /// Replace the mission and start flying it.
    ///
    /// An empty waypoint list is rejected and the UAV is left untouched, so a
    /// UAV in `Mission` status always has somewhere to go.
    pub fn set_mission(&mut self, waypoints: Vec<Vec3>) -> Result<(), MissionError> {
        if waypoints.is_empty() {
            return Err(MissionError::EmptyWaypoints);
        }
        self.waypoints = waypoints;
        self.current_waypoint_index = 0;
        self.mission_complete = false;
        self.status = UavStatus::Mission;
        Ok(())
    }

    /// The waypoint currently being flown to.
    pub fn current_target(&self) -> Option<Vec3> {
        self.waypoints.get(self.current_waypoint_index).copied()
    }

    /// Insert a waypoint under the cursor so it is flown next.
    /// Returns the mission index it was inserted at.
    pub fn insert_waypoint_at_cursor(&mut self, waypoint: Vec3) -> usize {
        let index = self.current_waypoint_index.min(self.waypoints.len());
        self.waypoints.insert(index, waypoint);
        index
    }

    /// Advance the UAV by `dt` seconds.
    pub fn update_position(&mut self, dt: f64) {
        if dt.is_nan() || dt <= 0.0 {
            return;
        }

        match self.control {
            ControlMode::Overridden {
                velocity,
                remaining_s,
            } => {
                self.velocity = velocity;
                let remaining_s = remaining_s - dt;
                self.control = if remaining_s > 0.0 {
                    ControlMode::Overridden {
                        velocity,
                        remaining_s,
                    }
                } else {
                    ControlMode::Normal
                };
            }
            ControlMode::Normal => {
                if self.status == UavStatus::Mission && !self.emergency_landing {
                    self.track_mission(dt);
                }
            }
        }

        self.position += self.velocity * dt;

        if self.velocity.horizontal_norm() > HEADING_MIN_SPEED_MPS {
            self.heading_deg = self.velocity.heading_deg();
        }
    }

    fn track_mission(&mut self, dt: f64) {
        let Some(target) = self.current_target() else {
            self.complete_mission();
            return;
        };

        let to_target = target - self.position;
        let distance = to_target.norm();

        if distance > WAYPOINT_REACHED_M {
            // Never overshoot the waypoint on the last step.
            let speed = self.max_speed.min(distance / dt);
            self.velocity = to_target / distance * speed;
        } else {
            self.current_waypoint_index += 1;
            if self.current_waypoint_index >= self.waypoints.len() {
                self.complete_mission();
            }
        }
    }

    fn complete_mission(&mut self) {
        self.current_waypoint_index = self.waypoints.len();
        self.mission_complete = true;
        self.status = UavStatus::Idle;
        self.velocity = Vec3::ZERO;
        tracing::info!("UAV {} completed its mission", self.id);
    }

    /// Linear extrapolation of the current state.
    pub fn predicted_position(&self, t: f64) -> Vec3 {
        self.position + self.velocity * t
    }

    pub fn distance_to(&self, other: &Uav) -> f64 {
        self.position.distance_to(other.position)
    }

    /// Larger of the two UAVs' minimum separations.
    pub fn required_separation(&self, other: &Uav) -> f64 {
        self.min_separation.max(other.min_separation)
    }

    /// Quick check: separated now and at every whole second before `horizon_s`?
    pub fn is_conflict_with(&self, other: &Uav, horizon_s: f64) -> bool {
        let required = self.required_separation(other);
        if self.distance_to(other) < required {
            return true;
        }

        let mut t = 1.0;
        while t < horizon_s {
            let distance = self
                .predicted_position(t)
                .distance_to(other.predicted_position(t));
            if distance < required {
                return true;
            }
            t += 1.0;
        }
        false
    }

    /// Halt immediately. The emergency-landing flag is never cleared by the core.
    pub fn emergency_stop(&mut self) {
        self.velocity = Vec3::ZERO;
        self.status = UavStatus::Emergency;
        self.emergency_landing = true;
        self.control = ControlMode::Normal;
        tracing::warn!("UAV {} emergency stop", self.id);
    }

    /// Pin the velocity for `duration_s` seconds so mission tracking
    /// does not undo an avoidance maneuver.
    pub fn enter_conflict_resolution(&mut self, velocity: Vec3, duration_s: f64) {
        if self.emergency_landing {
            return;
        }
        self.velocity = velocity;
        if duration_s > 0.0 {
            self.control = ControlMode::Overridden {
                velocity,
                remaining_s: duration_s,
            };
        }
    }

    /// External velocity perturbation: add `wind`, then scale by `speed_factor`.
    pub fn apply_environment(&mut self, wind: Vec3, speed_factor: f64) {
        self.velocity = (self.velocity + wind) * speed_factor;
        if let ControlMode::Overridden {
            velocity,
            remaining_s,
        } = self.control
        {
            self.control = ControlMode::Overridden {
                velocity: (velocity + wind) * speed_factor,
                remaining_s,
            };
        }
    }

    /// Drain fuel and battery by the given percentages, floored at zero.
    pub fn consume_resources(&mut self, fuel_pct: f64, battery_pct: f64) {
        self.fuel_level = (self.fuel_level - fuel_pct).max(0.0);
        self.battery_level = (self.battery_level - battery_pct).max(0.0);
    }

    /// Snapshot for display and export.
    pub fn info(&self) -> UavInfo {
        UavInfo {
            id: self.id.clone(),
            kind: self.kind,
            position: self.position,
            velocity: self.velocity,
            heading_deg: self.heading_deg,
            status: self.status,
            priority: self.priority,
            fuel_level: self.fuel_level,
            battery_level: self.battery_level,
            mission_complete: self.mission_complete,
            emergency_landing: self.emergency_landing,
            current_waypoint: self.current_waypoint_index,
            total_waypoints: self.waypoints.len(),
            control: self.control,
        }
    }
}

impl fmt::Display for Uav {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UAV-{} ({}) at {} - Status: {}",
            self.id, self.kind, self.position, self.status
        )
    }
}

/// Serializable per-UAV state dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UavInfo {
    pub id: String,
    pub kind: UavKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub heading_deg: f64,
    pub status: UavStatus,
    pub priority: u8,
    pub fuel_level: f64,
    pub battery_level: f64,
    pub mission_complete: bool,
    pub emergency_landing: bool,
    pub current_waypoint: usize,
    pub total_waypoints: usize,
    #[serde(default)]
    pub control: ControlMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(id: &str, position: (f64, f64, f64)) -> Uav {
        Uav::new(id, UavKind::Quadcopter, position)
    }

    #[test]
    fn test_set_mission_starts_mission() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.set_mission(vec![Vec3::new(100.0, 0.0, 100.0)]).unwrap();
        assert_eq!(uav.status(), UavStatus::Mission);
        assert_eq!(uav.current_waypoint_index(), 0);
        assert!(!uav.mission_complete());
    }

    #[test]
    fn test_empty_mission_rejected_without_side_effects() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        assert_eq!(uav.set_mission(Vec::new()), Err(MissionError::EmptyWaypoints));
        assert_eq!(uav.status(), UavStatus::Idle);
        assert!(uav.waypoints().is_empty());
    }

    #[test]
    fn test_moves_toward_waypoint_at_max_speed() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.set_mission(vec![Vec3::new(100.0, 0.0, 100.0)]).unwrap();
        uav.update_position(1.0);
        assert!((uav.position.x - 15.0).abs() < 1e-9);
        assert!((uav.velocity.x - 15.0).abs() < 1e-9);
        assert!(uav.heading_deg().abs() < 1e-9);
    }

    #[test]
    fn test_final_approach_does_not_overshoot() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.set_mission(vec![Vec3::new(20.0, 0.0, 100.0)]).unwrap();
        uav.update_position(1.0);
        uav.update_position(1.0);
        assert!((uav.position.x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_waypoint_at_current_position_completes_next_tick() {
        let mut uav = quad("U1", (5.0, 5.0, 100.0));
        uav.set_mission(vec![Vec3::new(5.0, 5.0, 100.0)]).unwrap();
        uav.update_position(1.0);
        assert!(uav.mission_complete());
        assert_eq!(uav.status(), UavStatus::Idle);
        assert_eq!(uav.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_completed_mission_is_idempotent() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.set_mission(vec![Vec3::new(10.0, 0.0, 100.0)]).unwrap();
        for _ in 0..5 {
            uav.update_position(1.0);
        }
        assert!(uav.mission_complete());
        let position = uav.position;
        let index = uav.current_waypoint_index();
        for _ in 0..10 {
            uav.update_position(1.0);
        }
        assert_eq!(uav.position, position);
        assert_eq!(uav.status(), UavStatus::Idle);
        assert_eq!(uav.current_waypoint_index(), index);
    }

    #[test]
    fn test_override_suppresses_mission_tracking_then_expires() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.set_mission(vec![Vec3::new(1000.0, 0.0, 100.0)]).unwrap();
        uav.enter_conflict_resolution(Vec3::new(0.0, 5.0, 0.0), 2.0);

        uav.update_position(1.0);
        assert_eq!(uav.position, Vec3::new(0.0, 5.0, 100.0));
        assert!(uav.is_overridden());

        uav.update_position(1.0);
        assert_eq!(uav.position, Vec3::new(0.0, 10.0, 100.0));
        assert!(!uav.is_overridden());

        uav.update_position(1.0);
        assert!(uav.velocity.x > 14.0);
    }

    #[test]
    fn test_emergency_stop_is_terminal() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.set_mission(vec![Vec3::new(100.0, 0.0, 100.0)]).unwrap();
        uav.update_position(1.0);
        uav.emergency_stop();
        uav.enter_conflict_resolution(Vec3::new(10.0, 0.0, 0.0), 5.0);
        let position = uav.position;
        for _ in 0..3 {
            uav.update_position(1.0);
        }
        assert_eq!(uav.position, position);
        assert_eq!(uav.status(), UavStatus::Emergency);
        assert!(uav.emergency_landing());
    }

    #[test]
    fn test_heading_kept_when_hovering() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.velocity = Vec3::new(0.0, 10.0, 0.0);
        uav.update_position(1.0);
        assert!((uav.heading_deg() - 90.0).abs() < 1e-9);
        uav.velocity = Vec3::new(0.0, 0.0, 2.0);
        uav.update_position(1.0);
        assert!((uav.heading_deg() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_conflict_with_head_on() {
        let mut a = quad("A", (0.0, 0.0, 100.0));
        let mut b = quad("B", (400.0, 0.0, 100.0));
        a.velocity = Vec3::new(10.0, 0.0, 0.0);
        b.velocity = Vec3::new(-10.0, 0.0, 0.0);
        assert!(a.is_conflict_with(&b, 30.0));
        assert!(!a.is_conflict_with(&b, 10.0));
    }

    #[test]
    fn test_priority_is_clamped() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0)).with_priority(9);
        assert_eq!(uav.priority(), LOWEST_PRIORITY);
        uav.set_priority(0);
        assert_eq!(uav.priority(), HIGHEST_PRIORITY);
    }

    #[test]
    fn test_mission_status_needs_waypoints() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        assert_eq!(
            uav.set_status(UavStatus::Mission),
            Err(StatusError::NoMission {
                uav_id: "U1".to_string()
            })
        );
        assert_eq!(uav.status(), UavStatus::Idle);

        uav.set_mission(vec![Vec3::new(0.5, 0.0, 100.0)]).unwrap();
        uav.update_position(1.0);
        assert!(uav.mission_complete());
        assert!(uav.set_status(UavStatus::Mission).is_err());
        assert!(uav.set_status(UavStatus::Active).is_ok());
    }

    #[test]
    fn test_emergency_status_is_terminal() {
        let mut uav = quad("U1", (0.0, 0.0, 100.0));
        uav.velocity = Vec3::new(10.0, 0.0, 0.0);
        uav.set_status(UavStatus::Emergency).unwrap();
        assert!(uav.emergency_landing());
        assert_eq!(uav.velocity, Vec3::ZERO);

        for status in [UavStatus::Idle, UavStatus::Active, UavStatus::Maintenance] {
            assert!(matches!(
                uav.set_status(status),
                Err(StatusError::EmergencyIsTerminal { .. })
            ));
        }
        assert_eq!(uav.status(), UavStatus::Emergency);
    }
}
