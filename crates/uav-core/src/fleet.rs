//! Fleet orchestrator.
//!
//! Owns every UAV and runs the per-tick pipeline: advance kinematics,
//! detect conflicts, resolve them in urgency order, update counters.

use crate::conflict::{sort_for_resolution, Conflict, ConflictDetector, ConflictSeverity};
use crate::error::{ConfigError, FleetError, ResolutionError};
use crate::models::{Uav, UavInfo, UavKind};
use crate::priority::{EscalationReason, MissionType, PriorityManager};
use crate::resolution::{DeconflictionEngine, ResolutionRecord};
use crate::rules::{DeconflictionConfig, SimulationConfig};
use crate::vector::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Cumulative conflict counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetCounters {
    pub total_conflicts_detected: u64,
    pub total_conflicts_resolved: u64,
    pub total_conflicts_failed: u64,
}

/// Read-only view of one conflict from the latest tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSnapshot {
    pub uav1_id: String,
    pub uav2_id: String,
    pub severity: ConflictSeverity,
    pub distance_m: f64,
    pub time_to_conflict: f64,
    pub min_distance_m: f64,
}

impl From<&Conflict> for ConflictSnapshot {
    fn from(conflict: &Conflict) -> Self {
        Self {
            uav1_id: conflict.uav1_id.clone(),
            uav2_id: conflict.uav2_id.clone(),
            severity: conflict.severity,
            distance_m: conflict.distance_m,
            time_to_conflict: conflict.time_to_conflict,
            min_distance_m: conflict.min_distance_m,
        }
    }
}

/// Fleet-wide status dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStatus {
    pub current_time: f64,
    pub total_uavs: usize,
    pub active_uavs: usize,
    pub current_conflicts: usize,
    #[serde(flatten)]
    pub counters: FleetCounters,
    pub uavs: Vec<UavInfo>,
}

impl FleetStatus {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Owns the UAVs and drives conflict detection and resolution.
#[derive(Debug, Clone)]
pub struct Fleet {
    config: SimulationConfig,
    /// Insertion order; iteration and pair checks follow it.
    uavs: Vec<Uav>,
    index: HashMap<String, usize>,
    /// Ids that were ever added. Never handed out twice.
    seen_ids: HashSet<String>,
    detector: ConflictDetector,
    engine: DeconflictionEngine,
    priorities: PriorityManager,
    current_conflicts: Vec<Conflict>,
    counters: FleetCounters,
    current_time: f64,
}

impl Fleet {
    /// Build a fleet, rejecting invalid configuration.
    pub fn new(
        config: SimulationConfig,
        deconfliction: DeconflictionConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        deconfliction.validate()?;

        let detector = ConflictDetector::new(
            config.conflict_detection_horizon,
            config.detection_sample_step,
        );
        let engine = DeconflictionEngine::new(deconfliction, config.altitude_limits);

        Ok(Self {
            config,
            uavs: Vec::new(),
            index: HashMap::new(),
            seen_ids: HashSet::new(),
            detector,
            engine,
            priorities: PriorityManager::new(),
            current_conflicts: Vec::new(),
            counters: FleetCounters::default(),
            current_time: 0.0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Add a UAV. Returns false, leaving the fleet unchanged, if the id was
    /// ever used in this fleet or the UAV's speed or separation is not positive.
    pub fn add_uav(&mut self, uav: Uav) -> bool {
        if self.seen_ids.contains(uav.id()) {
            tracing::warn!("UAV {} already exists in fleet", uav.id());
            return false;
        }
        if !(uav.max_speed > 0.0 && uav.min_separation > 0.0) {
            tracing::warn!(
                "UAV {} rejected: max speed {} and min separation {} must be positive",
                uav.id(),
                uav.max_speed,
                uav.min_separation
            );
            return false;
        }

        tracing::info!("Added UAV {} to fleet", uav.id());
        self.seen_ids.insert(uav.id().to_string());
        self.index.insert(uav.id().to_string(), self.uavs.len());
        self.uavs.push(uav);
        true
    }

    /// Build and add a UAV in one call.
    pub fn spawn(
        &mut self,
        id: &str,
        kind: UavKind,
        position: impl Into<Vec3>,
        max_speed: f64,
        min_separation: f64,
        priority: u8,
    ) -> bool {
        let uav = Uav::new(id, kind, position)
            .with_max_speed(max_speed)
            .with_min_separation(min_separation)
            .with_priority(priority);
        self.add_uav(uav)
    }

    pub fn remove_uav(&mut self, uav_id: &str) -> bool {
        let Some(idx) = self.index.remove(uav_id) else {
            return false;
        };
        self.uavs.remove(idx);
        for (i, uav) in self.uavs.iter().enumerate().skip(idx) {
            self.index.insert(uav.id().to_string(), i);
        }
        self.current_conflicts.retain(|c| !c.involves(uav_id));
        tracing::info!("Removed UAV {} from fleet", uav_id);
        true
    }

    pub fn get(&self, uav_id: &str) -> Option<&Uav> {
        self.index.get(uav_id).map(|&i| &self.uavs[i])
    }

    pub fn get_mut(&mut self, uav_id: &str) -> Option<&mut Uav> {
        self.index.get(uav_id).map(|&i| &mut self.uavs[i])
    }

    /// All UAVs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Uav> {
        self.uavs.iter()
    }

    pub fn len(&self) -> usize {
        self.uavs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uavs.is_empty()
    }

    pub fn set_mission(&mut self, uav_id: &str, waypoints: Vec<Vec3>) -> Result<(), FleetError> {
        let uav = self
            .get_mut(uav_id)
            .ok_or_else(|| FleetError::UnknownUav(uav_id.to_string()))?;
        uav.set_mission(waypoints)?;
        tracing::info!("UAV {} assigned mission", uav_id);
        Ok(())
    }

    /// Assign several missions at once. Each id gets its own outcome.
    pub fn set_fleet_mission(
        &mut self,
        missions: BTreeMap<String, Vec<Vec3>>,
    ) -> BTreeMap<String, Result<(), FleetError>> {
        missions
            .into_iter()
            .map(|(id, waypoints)| {
                let outcome = self.set_mission(&id, waypoints);
                (id, outcome)
            })
            .collect()
    }

    /// Raise a UAV's priority. `None` if the id is unknown.
    pub fn escalate_priority(&mut self, uav_id: &str, reason: EscalationReason) -> Option<u8> {
        let &idx = self.index.get(uav_id)?;
        Some(self.priorities.escalate(&mut self.uavs[idx], reason))
    }

    /// Set a UAV's priority from its mission type. `None` if the id is unknown.
    pub fn assign_mission_priority(
        &mut self,
        uav_id: &str,
        mission_type: MissionType,
        urgency_factor: f64,
    ) -> Option<u8> {
        let &idx = self.index.get(uav_id)?;
        Some(
            self.priorities
                .assign(&mut self.uavs[idx], mission_type, urgency_factor),
        )
    }

    pub fn normalize_priorities(&mut self) -> BTreeMap<String, u8> {
        self.priorities.normalize(self.uavs.iter_mut())
    }

    pub fn priorities(&self) -> &PriorityManager {
        &self.priorities
    }

    pub fn priorities_mut(&mut self) -> &mut PriorityManager {
        &mut self.priorities
    }

    pub fn engine(&self) -> &DeconflictionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DeconflictionEngine {
        &mut self.engine
    }

    /// Advance one configured time step.
    pub fn step(&mut self) -> Vec<ResolutionRecord> {
        self.update(self.config.time_step)
    }

    /// Run one tick of `dt` seconds. Returns this tick's resolution records.
    ///
    /// A non-positive or NaN `dt` is ignored.
    pub fn update(&mut self, dt: f64) -> Vec<ResolutionRecord> {
        if dt.is_nan() || dt <= 0.0 {
            tracing::warn!("Ignoring fleet update with non-positive dt {}", dt);
            return Vec::new();
        }

        self.current_time += dt;
        for uav in &mut self.uavs {
            uav.update_position(dt);
        }

        let mut conflicts = self.detector.detect(&self.uavs);
        sort_for_resolution(&mut conflicts);
        self.counters.total_conflicts_detected += conflicts.len() as u64;

        let mut records = Vec::with_capacity(conflicts.len());
        for conflict in &conflicts {
            tracing::warn!(
                "[{}] conflict {} <-> {} in {:.0}s (min {:.1}m)",
                conflict.severity,
                conflict.uav1_id,
                conflict.uav2_id,
                conflict.time_to_conflict,
                conflict.min_distance_m
            );

            let record = self.resolve(conflict);
            if record.success {
                self.counters.total_conflicts_resolved += 1;
            } else {
                self.counters.total_conflicts_failed += 1;
            }
            records.push(record);
        }

        self.current_conflicts = conflicts;
        records
    }

    /// Hand the engine exactly the two UAVs named by the conflict.
    fn resolve(&mut self, conflict: &Conflict) -> ResolutionRecord {
        let lookup = |id: &str| {
            self.index
                .get(id)
                .copied()
                .ok_or_else(|| ResolutionError::UnknownUav(id.to_string()))
        };
        let indices = lookup(&conflict.uav1_id)
            .and_then(|i| lookup(&conflict.uav2_id).map(|j| (i, j)));

        match indices {
            Ok((i, j)) => match pair_mut(&mut self.uavs, i, j) {
                Some((uav1, uav2)) => self.engine.resolve(conflict, uav1, uav2),
                None => self
                    .engine
                    .record_failure(conflict, &ResolutionError::UnknownUav(conflict.uav2_id.clone())),
            },
            Err(err) => self.engine.record_failure(conflict, &err),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn counters(&self) -> FleetCounters {
        self.counters
    }

    /// Conflicts from the latest tick, in resolution order.
    pub fn current_conflicts(&self) -> &[Conflict] {
        &self.current_conflicts
    }

    pub fn current_tick_conflicts(&self) -> Vec<ConflictSnapshot> {
        self.current_conflicts.iter().map(ConflictSnapshot::from).collect()
    }

    pub fn active_uavs(&self) -> impl Iterator<Item = &Uav> {
        self.uavs.iter().filter(|uav| uav.is_active())
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.active_uavs().map(|uav| uav.id().to_string()).collect()
    }

    pub fn status(&self) -> FleetStatus {
        FleetStatus {
            current_time: self.current_time,
            total_uavs: self.uavs.len(),
            active_uavs: self.active_uavs().count(),
            current_conflicts: self.current_conflicts.len(),
            counters: self.counters,
            uavs: self.uavs.iter().map(Uav::info).collect(),
        }
    }

    /// Numbered, one line per current conflict.
    pub fn conflict_summary(&self) -> String {
        if self.current_conflicts.is_empty() {
            return "No conflicts detected".to_string();
        }

        let mut lines = vec![format!("Current conflicts: {}", self.current_conflicts.len())];
        for (n, conflict) in self.current_conflicts.iter().enumerate() {
            lines.push(format!(
                "  {}. UAV-{} <-> UAV-{} [{}] distance {:.1}m, conflict in {:.1}s, min {:.1}m",
                n + 1,
                conflict.uav1_id,
                conflict.uav2_id,
                conflict.severity,
                conflict.distance_m,
                conflict.time_to_conflict,
                conflict.min_distance_m
            ));
        }
        lines.join("\n")
    }

    /// Emergency-stop every UAV in the fleet.
    pub fn emergency_land_all(&mut self) {
        tracing::warn!("Emergency landing all {} UAVs", self.uavs.len());
        for uav in &mut self.uavs {
            uav.emergency_stop();
        }
    }
}

impl fmt::Display for Fleet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fleet: {} UAVs ({} active), {} conflicts at t={:.1}s",
            self.uavs.len(),
            self.active_uavs().count(),
            self.current_conflicts.len(),
            self.current_time
        )
    }
}

/// Two distinct mutable elements of a slice, in the order asked for.
fn pair_mut(uavs: &mut [Uav], i: usize, j: usize) -> Option<(&mut Uav, &mut Uav)> {
    if i == j || i.max(j) >= uavs.len() {
        return None;
    }
    if i < j {
        let (left, right) = uavs.split_at_mut(j);
        Some((&mut left[i], &mut right[0]))
    } else {
        let (left, right) = uavs.split_at_mut(i);
        Some((&mut right[0], &mut left[j]))
    }
}
