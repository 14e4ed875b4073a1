//! Mission-based priority assignment, escalation and fleet normalization.
//!
//! Priority 1 is the most important and 5 the least; every comparison in
//! the crate keeps that convention (`<` means "takes precedence").

use crate::models::{Uav, UavStatus, HIGHEST_PRIORITY, LOWEST_PRIORITY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mission categories, each with a fixed base priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    EmergencyResponse,
    MedicalDelivery,
    SearchRescue,
    Surveillance,
    CargoDelivery,
    Patrol,
    Training,
    Testing,
}

impl MissionType {
    pub fn base_priority(self) -> PriorityLevel {
        match self {
            MissionType::EmergencyResponse | MissionType::MedicalDelivery => {
                PriorityLevel::Critical
            }
            MissionType::SearchRescue | MissionType::Surveillance => PriorityLevel::High,
            MissionType::CargoDelivery | MissionType::Patrol => PriorityLevel::Medium,
            MissionType::Training => PriorityLevel::Low,
            MissionType::Testing => PriorityLevel::Minimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    /// Life-threatening situations
    Critical = 1,
    High = 2,
    Medium = 3,
    Low = 4,
    /// Training and testing
    Minimal = 5,
}

impl PriorityLevel {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Why a UAV's priority is being escalated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    FuelCritical,
    BatteryCritical,
    WeatherEmergency,
    AirspaceViolation,
    EquipmentFailure,
    /// Anything not in the table escalates by one level.
    Other(String),
}

impl EscalationReason {
    /// How many levels this reason raises priority by.
    pub fn boost(&self) -> u8 {
        match self {
            EscalationReason::AirspaceViolation => 2,
            EscalationReason::FuelCritical
            | EscalationReason::BatteryCritical
            | EscalationReason::WeatherEmergency
            | EscalationReason::EquipmentFailure
            | EscalationReason::Other(_) => 1,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EscalationReason::FuelCritical => "fuel_critical",
            EscalationReason::BatteryCritical => "battery_critical",
            EscalationReason::WeatherEmergency => "weather_emergency",
            EscalationReason::AirspaceViolation => "airspace_violation",
            EscalationReason::EquipmentFailure => "equipment_failure",
            EscalationReason::Other(reason) => reason,
        }
    }
}

impl From<&str> for EscalationReason {
    fn from(reason: &str) -> Self {
        match reason {
            "fuel_critical" => EscalationReason::FuelCritical,
            "battery_critical" => EscalationReason::BatteryCritical,
            "weather_emergency" => EscalationReason::WeatherEmergency,
            "airspace_violation" => EscalationReason::AirspaceViolation,
            "equipment_failure" => EscalationReason::EquipmentFailure,
            other => EscalationReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PriorityChangeReason {
    Assignment {
        mission_type: MissionType,
        urgency_factor: f64,
    },
    Escalation {
        reason: EscalationReason,
    },
    Normalization,
}

/// One entry of the append-only priority history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityChange {
    pub uav_id: String,
    pub old_priority: u8,
    pub new_priority: u8,
    pub reason: PriorityChangeReason,
    pub timestamp: DateTime<Utc>,
}

/// Situational inputs for [`PriorityManager::dynamic_priority`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Situation {
    pub severe_weather: bool,
    /// 0.0 (empty) to 1.0 (saturated)
    pub traffic_density: f64,
    /// 0.0 (just started) to 1.0 (done)
    pub mission_progress: f64,
    pub in_emergency_zone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritySummary {
    pub current: u8,
    pub status: UavStatus,
    pub fuel: f64,
    pub battery: f64,
    pub remaining_waypoints: usize,
}

/// Fleet-wide priority analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityMatrix {
    pub priorities: BTreeMap<String, PrioritySummary>,
    pub distribution: BTreeMap<u8, usize>,
    pub conflicts: Vec<(String, String)>,
    pub recommendations: Vec<String>,
}

/// Assigns and adjusts priorities, keeping its own change history.
#[derive(Debug, Clone, Default)]
pub struct PriorityManager {
    history: Vec<PriorityChange>,
}

fn raise(priority: u8, levels: u8) -> u8 {
    priority.saturating_sub(levels).max(HIGHEST_PRIORITY)
}

fn lower(priority: u8, levels: u8) -> u8 {
    priority.saturating_add(levels).min(LOWEST_PRIORITY)
}

fn normalization_key(uav: &Uav) -> (u8, bool, bool, bool) {
    (
        uav.priority(),
        uav.fuel_level < 20.0,
        uav.battery_level < 20.0,
        uav.status() == UavStatus::Emergency,
    )
}

impl PriorityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a priority from the mission type, urgency and the UAV's own
    /// condition. Returns the new priority.
    pub fn assign(&mut self, uav: &mut Uav, mission_type: MissionType, urgency_factor: f64) -> u8 {
        let mut priority = mission_type.base_priority().value();

        if urgency_factor > 1.5 {
            priority = raise(priority, 1);
        } else if urgency_factor < 0.5 {
            priority = lower(priority, 1);
        }

        let priority = Self::apply_uav_factors(uav, priority);
        self.record(
            uav,
            priority,
            PriorityChangeReason::Assignment {
                mission_type,
                urgency_factor,
            },
        );
        priority
    }

    fn apply_uav_factors(uav: &Uav, base_priority: u8) -> u8 {
        let mut priority = base_priority;
        if uav.is_power_critical() {
            priority = raise(priority, 1);
        }
        if uav.emergency_landing() {
            priority = HIGHEST_PRIORITY;
        }
        if uav.status() == UavStatus::Emergency {
            priority = raise(priority, 1);
        }
        priority.clamp(HIGHEST_PRIORITY, LOWEST_PRIORITY)
    }

    /// Raise priority by the reason's boost, never above 1.
    pub fn escalate(&mut self, uav: &mut Uav, reason: EscalationReason) -> u8 {
        let priority = raise(uav.priority(), reason.boost());
        tracing::debug!(
            "Escalating UAV {} priority {} -> {} ({})",
            uav.id(),
            uav.priority(),
            priority,
            reason
        );
        self.record(uav, priority, PriorityChangeReason::Escalation { reason });
        priority
    }

    /// Reassign priorities so non-emergency UAVs do not share a level.
    ///
    /// UAVs are ranked by (priority, fuel critical, battery critical,
    /// emergency status, id) and numbered from 1. UAVs in an emergency are
    /// pinned to 1 and do not consume a rank. Ranks past 5 are clamped to 5.
    pub fn normalize<'a, I>(&mut self, uavs: I) -> BTreeMap<String, u8>
    where
        I: IntoIterator<Item = &'a mut Uav>,
    {
        let mut ranked: Vec<&mut Uav> = uavs.into_iter().collect();
        ranked.sort_by(|a, b| {
            normalization_key(a)
                .cmp(&normalization_key(b))
                .then_with(|| a.id().cmp(b.id()))
        });

        let mut assigned = BTreeMap::new();
        let mut next_rank: u8 = HIGHEST_PRIORITY;

        for uav in ranked {
            let priority = if uav.emergency_landing() || uav.status() == UavStatus::Emergency {
                HIGHEST_PRIORITY
            } else {
                let rank = next_rank.min(LOWEST_PRIORITY);
                next_rank = next_rank.saturating_add(1);
                rank
            };

            if uav.priority() != priority {
                self.record(uav, priority, PriorityChangeReason::Normalization);
            }
            assigned.insert(uav.id().to_string(), priority);
        }

        assigned
    }

    fn record(&mut self, uav: &mut Uav, new_priority: u8, reason: PriorityChangeReason) {
        let old_priority = uav.priority();
        uav.set_priority(new_priority);
        tracing::debug!(
            "UAV {} priority {} -> {}",
            uav.id(),
            old_priority,
            uav.priority()
        );
        self.history.push(PriorityChange {
            uav_id: uav.id().to_string(),
            old_priority,
            new_priority: uav.priority(),
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Pairs of UAVs sharing a priority level, grouped by level.
    pub fn priority_conflicts<'a, I>(&self, uavs: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = &'a Uav>,
    {
        let mut groups: BTreeMap<u8, Vec<&Uav>> = BTreeMap::new();
        for uav in uavs {
            groups.entry(uav.priority()).or_default().push(uav);
        }

        let mut pairs = Vec::new();
        for group in groups.values() {
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    pairs.push((group[i].id().to_string(), group[j].id().to_string()));
                }
            }
        }
        pairs
    }

    /// Situational priority. Does not modify the UAV or the history.
    pub fn dynamic_priority(&self, uav: &Uav, situation: &Situation) -> u8 {
        let mut boost: u8 = 0;
        if situation.severe_weather {
            boost += 1;
        }
        if situation.traffic_density > 0.8 {
            boost += 1;
        }
        if situation.mission_progress > 0.8 {
            boost += 1;
        }
        if uav.fuel_level < 30.0 || uav.battery_level < 30.0 {
            boost += 1;
        }
        if situation.in_emergency_zone {
            boost += 2;
        }
        raise(uav.priority(), boost)
    }

    pub fn priority_matrix<'a, I>(&self, uavs: I) -> PriorityMatrix
    where
        I: IntoIterator<Item = &'a Uav>,
    {
        let uavs: Vec<&Uav> = uavs.into_iter().collect();
        let mut priorities = BTreeMap::new();
        let mut distribution: BTreeMap<u8, usize> =
            (HIGHEST_PRIORITY..=LOWEST_PRIORITY).map(|p| (p, 0)).collect();

        for uav in &uavs {
            priorities.insert(
                uav.id().to_string(),
                PrioritySummary {
                    current: uav.priority(),
                    status: uav.status(),
                    fuel: uav.fuel_level,
                    battery: uav.battery_level,
                    remaining_waypoints: uav
                        .waypoints()
                        .len()
                        .saturating_sub(uav.current_waypoint_index()),
                },
            );
            *distribution.entry(uav.priority()).or_default() += 1;
        }

        let conflicts = self.priority_conflicts(uavs.iter().copied());
        let mut recommendations = Vec::new();
        if !conflicts.is_empty() {
            recommendations.push("Consider priority normalization".to_string());
        }
        if distribution[&HIGHEST_PRIORITY] > 3 {
            recommendations.push("Too many critical priority UAVs".to_string());
        }
        if distribution[&LOWEST_PRIORITY] as f64 > uavs.len() as f64 * 0.5 {
            recommendations.push("Consider increasing some priorities".to_string());
        }

        PriorityMatrix {
            priorities,
            distribution,
            conflicts,
            recommendations,
        }
    }

    /// Change history, newest first, optionally for one UAV.
    pub fn history(&self, uav_id: Option<&str>, limit: usize) -> Vec<&PriorityChange> {
        self.history
            .iter()
            .rev()
            .filter(|change| uav_id.map_or(true, |id| change.uav_id == id))
            .take(limit)
            .collect()
    }

    pub fn all_history(&self) -> &[PriorityChange] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

impl fmt::Display for PriorityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PriorityManager: {} priority changes tracked",
            self.history.len()
        )
    }
}
