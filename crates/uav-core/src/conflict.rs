//! Conflict detection module.
//!
//! Samples the linear extrapolation of every active pair over a fixed
//! lookahead window and reports pairs whose separation would be breached.

use crate::models::Uav;
use crate::vector::Vec3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const DEFAULT_HORIZON_S: f64 = 60.0;
pub const DEFAULT_SAMPLE_STEP_S: f64 = 1.0;

/// Severity levels for detected conflicts, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    /// Breach within seconds, or near-collision geometry
    Critical,
}

impl ConflictSeverity {
    /// Classify from time to breach and minimum projected distance.
    /// First matching row wins.
    pub fn classify(time_to_conflict_s: f64, min_distance_m: f64) -> Self {
        if time_to_conflict_s < 5.0 || min_distance_m < 20.0 {
            ConflictSeverity::Critical
        } else if time_to_conflict_s < 15.0 || min_distance_m < 40.0 {
            ConflictSeverity::High
        } else if time_to_conflict_s < 30.0 || min_distance_m < 60.0 {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictSeverity::Low => "LOW",
            ConflictSeverity::Medium => "MEDIUM",
            ConflictSeverity::High => "HIGH",
            ConflictSeverity::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Detected conflict between two UAVs. Valid for one detection cycle only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub uav1_id: String,
    pub uav2_id: String,
    pub severity: ConflictSeverity,
    /// Separation at detection time
    pub distance_m: f64,
    /// Seconds until the first sampled breach (0 if already breached)
    pub time_to_conflict: f64,
    /// Smallest sampled separation over the horizon
    pub min_distance_m: f64,
    /// Separation the pair must keep (larger of the two minima)
    pub required_separation_m: f64,
    /// Midpoint between the two UAVs at the sample of closest approach
    pub closest_point: Vec3,
}

impl Conflict {
    /// Stable identifier for logs: `"<uav1>-<uav2>"`.
    pub fn pair_id(&self) -> String {
        format!("{}-{}", self.uav1_id, self.uav2_id)
    }

    pub fn involves(&self, uav_id: &str) -> bool {
        self.uav1_id == uav_id || self.uav2_id == uav_id
    }
}

/// Sampled conflict detector.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    /// How far ahead to predict (seconds)
    pub horizon_s: f64,
    /// Spacing between samples (seconds)
    pub sample_step_s: f64,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_S, DEFAULT_SAMPLE_STEP_S)
    }
}

impl ConflictDetector {
    pub fn new(horizon_s: f64, sample_step_s: f64) -> Self {
        Self {
            horizon_s,
            sample_step_s,
        }
    }

    /// Check one pair. Sampled, not continuous: a breach that opens and
    /// closes between two samples is not reported.
    pub fn check_pair(&self, uav1: &Uav, uav2: &Uav) -> Option<Conflict> {
        let valid_window = self.sample_step_s > 0.0 && self.horizon_s >= 0.0;
        if !valid_window {
            return None;
        }

        let required = uav1.required_separation(uav2);
        let samples = (self.horizon_s / self.sample_step_s).floor() as u64;

        let mut min_distance = f64::INFINITY;
        let mut closest_point = uav1.position.midpoint(uav2.position);
        let mut time_to_conflict: Option<f64> = None;

        for i in 0..=samples {
            let t = i as f64 * self.sample_step_s;
            let pos1 = uav1.predicted_position(t);
            let pos2 = uav2.predicted_position(t);
            let distance = pos1.distance_to(pos2);

            if distance < min_distance {
                min_distance = distance;
                closest_point = pos1.midpoint(pos2);
            }
            if time_to_conflict.is_none() && distance < required {
                time_to_conflict = Some(t);
            }
        }

        let time_to_conflict = time_to_conflict?;
        Some(Conflict {
            uav1_id: uav1.id().to_string(),
            uav2_id: uav2.id().to_string(),
            severity: ConflictSeverity::classify(time_to_conflict, min_distance),
            distance_m: uav1.distance_to(uav2),
            time_to_conflict,
            min_distance_m: min_distance,
            required_separation_m: required,
            closest_point,
        })
    }

    /// Check every unordered pair of active UAVs, in the order given.
    pub fn detect<'a, I>(&self, uavs: I) -> Vec<Conflict>
    where
        I: IntoIterator<Item = &'a Uav>,
    {
        let active: Vec<&Uav> = uavs.into_iter().filter(|uav| uav.is_active()).collect();
        let mut conflicts = Vec::new();

        for i in 0..active.len() {
            for j in (i + 1)..active.len() {
                if let Some(conflict) = self.check_pair(active[i], active[j]) {
                    tracing::debug!(
                        "[{}] {} <-> {} breach in {:.0}s, min {:.1}m",
                        conflict.severity,
                        conflict.uav1_id,
                        conflict.uav2_id,
                        conflict.time_to_conflict,
                        conflict.min_distance_m
                    );
                    conflicts.push(conflict);
                }
            }
        }

        conflicts
    }
}

/// Order conflicts for resolution: critical first, then soonest breach.
///
/// Resolving one conflict can move a UAV that appears in a later record, so
/// this order decides which conflicts see fresh state.
pub fn sort_for_resolution(conflicts: &mut [Conflict]) {
    conflicts.sort_by(|a, b| {
        let a_rank = a.severity != ConflictSeverity::Critical;
        let b_rank = b.severity != ConflictSeverity::Critical;
        a_rank.cmp(&b_rank).then_with(|| {
            a.time_to_conflict
                .partial_cmp(&b.time_to_conflict)
                .unwrap_or(Ordering::Equal)
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UavKind, UavStatus};

    fn flying(id: &str, position: (f64, f64, f64), velocity: (f64, f64, f64)) -> Uav {
        let mut uav = Uav::new(id, UavKind::Quadcopter, position);
        uav.velocity = velocity.into();
        uav.set_status(UavStatus::Active).unwrap();
        uav
    }

    #[test]
    fn test_no_conflict_when_far_apart() {
        let detector = ConflictDetector::default();
        let a = flying("A", (0.0, 0.0, 100.0), (0.0, 0.0, 0.0));
        let b = flying("B", (5000.0, 0.0, 100.0), (0.0, 0.0, 0.0));
        assert!(detector.detect([&a, &b]).is_empty());
    }

    #[test]
    fn test_current_violation_has_zero_time_to_conflict() {
        let detector = ConflictDetector::default();
        let a = flying("A", (0.0, 0.0, 100.0), (0.0, 0.0, 0.0));
        let b = flying("B", (10.0, 0.0, 100.0), (0.0, 0.0, 0.0));
        let conflict = detector.check_pair(&a, &b).unwrap();
        assert_eq!(conflict.time_to_conflict, 0.0);
        assert_eq!(conflict.severity, ConflictSeverity::Critical);
        assert!((conflict.min_distance_m - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_head_on_conflict_time_and_distance() {
        let detector = ConflictDetector::default();
        let a = flying("A", (-85.0, 0.0, 100.0), (15.0, 0.0, 0.0));
        let b = flying("B", (85.0, 0.0, 100.0), (-15.0, 0.0, 0.0));
        let conflict = detector.check_pair(&a, &b).unwrap();
        // 170 - 30t < 50 first at t = 5
        assert_eq!(conflict.time_to_conflict, 5.0);
        assert!((conflict.min_distance_m - 10.0).abs() < 1e-9);
        assert_eq!(conflict.severity, ConflictSeverity::Critical);
        assert!((conflict.distance_m - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_required_separation_is_larger_minimum() {
        let detector = ConflictDetector::default();
        let a = flying("A", (0.0, 0.0, 100.0), (0.0, 0.0, 0.0)).with_min_separation(30.0);
        let b = flying("B", (70.0, 0.0, 100.0), (0.0, 0.0, 0.0)).with_min_separation(80.0);
        let conflict = detector.check_pair(&a, &b).unwrap();
        assert_eq!(conflict.required_separation_m, 80.0);
    }

    #[test]
    fn test_inactive_uavs_ignored() {
        let detector = ConflictDetector::default();
        let a = flying("A", (0.0, 0.0, 100.0), (0.0, 0.0, 0.0));
        let mut b = flying("B", (10.0, 0.0, 100.0), (0.0, 0.0, 0.0));
        b.set_status(UavStatus::Idle).unwrap();
        assert!(detector.detect([&a, &b]).is_empty());
    }

    #[test]
    fn test_breach_beyond_horizon_not_reported() {
        let detector = ConflictDetector::new(10.0, 1.0);
        let a = flying("A", (0.0, 0.0, 100.0), (10.0, 0.0, 0.0));
        let b = flying("B", (1000.0, 0.0, 100.0), (-10.0, 0.0, 0.0));
        assert!(detector.check_pair(&a, &b).is_none());
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(ConflictSeverity::classify(4.0, 100.0), ConflictSeverity::Critical);
        assert_eq!(ConflictSeverity::classify(50.0, 19.0), ConflictSeverity::Critical);
        assert_eq!(ConflictSeverity::classify(14.0, 100.0), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::classify(50.0, 39.0), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::classify(29.0, 100.0), ConflictSeverity::Medium);
        assert_eq!(ConflictSeverity::classify(50.0, 59.0), ConflictSeverity::Medium);
        assert_eq!(ConflictSeverity::classify(30.0, 60.0), ConflictSeverity::Low);
    }

    #[test]
    fn test_severity_monotonic_in_distance_and_time() {
        let grid = [0.0, 3.0, 5.0, 10.0, 15.0, 22.0, 30.0, 45.0, 60.0];
        for &fixed in &grid {
            for pair in grid.windows(2) {
                let (smaller, larger) = (pair[0], pair[1]);
                assert!(
                    ConflictSeverity::classify(fixed, smaller)
                        >= ConflictSeverity::classify(fixed, larger)
                );
                assert!(
                    ConflictSeverity::classify(smaller, fixed)
                        >= ConflictSeverity::classify(larger, fixed)
                );
            }
        }
    }

    fn record(id: &str, severity: ConflictSeverity, ttc: f64) -> Conflict {
        Conflict {
            uav1_id: id.to_string(),
            uav2_id: "X".to_string(),
            severity,
            distance_m: 100.0,
            time_to_conflict: ttc,
            min_distance_m: 30.0,
            required_separation_m: 50.0,
            closest_point: Vec3::ZERO,
        }
    }

    #[test]
    fn test_sort_puts_critical_first_then_soonest() {
        let mut conflicts = vec![
            record("a", ConflictSeverity::Low, 2.0),
            record("b", ConflictSeverity::Critical, 8.0),
            record("c", ConflictSeverity::High, 1.0),
            record("d", ConflictSeverity::Critical, 3.0),
        ];
        sort_for_resolution(&mut conflicts);
        let order: Vec<&str> = conflicts.iter().map(|c| c.uav1_id.as_str()).collect();
        assert_eq!(order, vec!["d", "b", "c", "a"]);
    }
}
