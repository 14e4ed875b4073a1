//! Simulation environment around the fleet.
//!
//! Adds what the core leaves to its caller: weather, airspace zones,
//! resource decay, metrics and an event log. Each tick runs to completion
//! before anything else can observe the fleet; real-time pacing only ever
//! sleeps between ticks.

use crate::config::Config;
use crate::error::SimError;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use uav_core::{
    ConfigError, EscalationReason, Fleet, FleetStatus, MissionType, ResolutionRecord,
    SimulationConfig, Strategy, Uav, UavInfo, UavKind, Vec3,
};

/// Share of the wind vector added to each UAV's velocity per tick.
pub const WIND_EFFECT_FRACTION: f64 = 0.1;
const STORM_EMERGENCY_PROBABILITY: f64 = 0.01;
/// Fuel or battery percentage below which a UAV is low on power.
const LOW_POWER_PCT: f64 = 20.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    #[default]
    Clear,
    LightWind,
    ModerateWind,
    HeavyWind,
    Rain,
    /// Halves speed and can ground UAVs
    Storm,
}

impl Weather {
    /// Multiplier applied to every active UAV's velocity each tick.
    pub fn speed_factor(self) -> f64 {
        match self {
            Weather::HeavyWind | Weather::Rain => 0.8,
            Weather::Storm => 0.5,
            Weather::Clear | Weather::LightWind | Weather::ModerateWind => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weather::Clear => "clear",
            Weather::LightWind => "light_wind",
            Weather::ModerateWind => "moderate_wind",
            Weather::HeavyWind => "heavy_wind",
            Weather::Rain => "rain",
            Weather::Storm => "storm",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherState {
    pub condition: Weather,
    /// m/s
    pub wind_speed: f64,
    /// Degrees, 0 = north, 90 = east
    pub wind_direction_deg: f64,
    pub wind: Vec3,
}

impl WeatherState {
    pub fn new(condition: Weather, wind_speed: f64, wind_direction_deg: f64) -> Self {
        let rad = wind_direction_deg.to_radians();
        Self {
            condition,
            wind_speed,
            wind_direction_deg,
            wind: Vec3::new(wind_speed * rad.sin(), wind_speed * rad.cos(), 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Unrestricted,
    Controlled,
    Restricted,
    NoFly,
    Emergency,
}

impl ZoneKind {
    /// Being inside counts as a violation.
    pub fn is_prohibited(self) -> bool {
        matches!(self, ZoneKind::Restricted | ZoneKind::NoFly)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirspaceZone {
    pub id: String,
    pub kind: ZoneKind,
    /// (min_x, max_x, min_y, max_y)
    pub bounds: (f64, f64, f64, f64),
    /// (min, max) altitude
    pub altitude_range: (f64, f64),
    pub violations: u64,
}

impl AirspaceZone {
    /// Inclusive box test.
    pub fn contains(&self, position: Vec3) -> bool {
        let (min_x, max_x, min_y, max_y) = self.bounds;
        let (min_alt, max_alt) = self.altitude_range;
        (min_x..=max_x).contains(&position.x)
            && (min_y..=max_y).contains(&position.y)
            && (min_alt..=max_alt).contains(&position.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    WeatherChange {
        weather: Weather,
        wind_speed: f64,
        wind_direction: f64,
    },
    UavAdded {
        uav_id: String,
        kind: UavKind,
        position: Vec3,
        mission_type: MissionType,
        priority: u8,
        waypoints: usize,
    },
    SimulationStart {
        duration: f64,
        uav_count: usize,
        real_time: bool,
    },
    SimulationEnd {
        metrics: Metrics,
    },
    SimulationStopped {
        time: f64,
    },
    ConflictResolution {
        conflict_id: String,
        strategy: Strategy,
        success: bool,
        actions: usize,
    },
    AirspaceViolation {
        uav_id: String,
        zone_id: String,
        zone_kind: ZoneKind,
        position: Vec3,
    },
    MissionComplete {
        uav_id: String,
        completion_time: f64,
    },
    LowPower {
        uav_id: String,
        fuel_level: f64,
        battery_level: f64,
    },
    WeatherEmergency {
        uav_id: String,
        weather: Weather,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Simulated seconds
    pub timestamp: f64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_conflicts: u64,
    pub resolved_conflicts: u64,
    pub failed_resolutions: u64,
    pub total_distance_flown: f64,
    pub fuel_consumed: f64,
    /// Completed missions over UAVs that were given one
    pub mission_completion_rate: f64,
    pub safety_violations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub weather: Weather,
    pub wind_vector: Vec3,
    pub airspace_zones: usize,
    pub total_violations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    #[serde(flatten)]
    pub metrics: Metrics,
    pub conflict_resolution_rate: f64,
    /// Successful resolutions per strategy
    pub strategy_usage: BTreeMap<Strategy, usize>,
    pub simulated_duration: f64,
    pub wall_time_s: f64,
    pub fleet_status: FleetStatus,
    pub environment: EnvironmentSummary,
}

/// Monitoring snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub time: f64,
    pub running: bool,
    pub uav_count: usize,
    pub active_uavs: usize,
    pub current_conflicts: usize,
    pub weather: Weather,
    pub wind: Vec3,
    pub metrics: Metrics,
}

#[derive(Serialize)]
struct RunExport<'a> {
    generated_at: DateTime<Utc>,
    simulation_config: &'a SimulationConfig,
    total_time: f64,
    final_metrics: SimulationResults,
    event_log: &'a [Event],
    uav_final_states: Vec<UavInfo>,
}

/// A fleet plus its surroundings, stepped with a fixed time step.
pub struct Simulation {
    config: Config,
    fleet: Fleet,
    weather: WeatherState,
    zones: Vec<AirspaceZone>,
    metrics: Metrics,
    events: Vec<Event>,
    completion_logged: HashSet<String>,
    low_power_logged: HashSet<String>,
    running: bool,
    wall_time: Duration,
    rng: StdRng,
}

impl Simulation {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let fleet = Fleet::new(config.simulation.clone(), config.deconfliction.clone())?;
        let rng = StdRng::seed_from_u64(config.seed());
        Ok(Self {
            config,
            fleet,
            weather: WeatherState::default(),
            zones: Vec::new(),
            metrics: Metrics::default(),
            events: Vec::new(),
            completion_logged: HashSet::new(),
            low_power_logged: HashSet::new(),
            running: false,
            wall_time: Duration::ZERO,
            rng,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut Fleet {
        &mut self.fleet
    }

    pub fn current_time(&self) -> f64 {
        self.fleet.current_time()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn weather(&self) -> &WeatherState {
        &self.weather
    }

    pub fn zones(&self) -> &[AirspaceZone] {
        &self.zones
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// `wind_direction_deg` is a compass bearing: 0 = north, 90 = east.
    pub fn set_weather(&mut self, condition: Weather, wind_speed: f64, wind_direction_deg: f64) {
        self.weather = WeatherState::new(condition, wind_speed, wind_direction_deg);
        tracing::info!(
            "Weather set to {} (wind {:.1} m/s from {:.0} deg)",
            condition,
            wind_speed,
            wind_direction_deg
        );
        self.log(EventKind::WeatherChange {
            weather: condition,
            wind_speed,
            wind_direction: wind_direction_deg,
        });
    }

    /// Returns false if a zone with this id already exists.
    pub fn add_airspace_zone(
        &mut self,
        id: &str,
        kind: ZoneKind,
        bounds: (f64, f64, f64, f64),
        altitude_range: (f64, f64),
    ) -> bool {
        if self.zones.iter().any(|zone| zone.id == id) {
            return false;
        }
        self.zones.push(AirspaceZone {
            id: id.to_string(),
            kind,
            bounds,
            altitude_range,
            violations: 0,
        });
        true
    }

    /// Add a UAV with the configured speed and separation, prioritised from
    /// its mission type and already flying `waypoints`.
    pub fn add_uav(
        &mut self,
        id: &str,
        kind: UavKind,
        position: impl Into<Vec3>,
        mission_type: MissionType,
        waypoints: Vec<Vec3>,
    ) -> bool {
        let mut uav = Uav::new(id, kind, position)
            .with_max_speed(self.config.simulation.max_uav_speed)
            .with_min_separation(self.config.simulation.default_separation);
        let waypoint_count = waypoints.len();
        if let Err(err) = uav.set_mission(waypoints) {
            tracing::warn!("UAV {} not added: {}", id, err);
            return false;
        }
        let position = uav.position;
        if !self.fleet.add_uav(uav) {
            return false;
        }

        let priority = self
            .fleet
            .assign_mission_priority(id, mission_type, 1.0)
            .unwrap_or_default();
        self.log(EventKind::UavAdded {
            uav_id: id.to_string(),
            kind,
            position,
            mission_type,
            priority,
            waypoints: waypoint_count,
        });
        true
    }

    /// Advance one time step.
    pub fn step(&mut self) -> Vec<ResolutionRecord> {
        let dt = self.config.simulation.time_step;

        self.apply_weather();
        let records = self.fleet.update(dt);
        for record in &records {
            self.log(EventKind::ConflictResolution {
                conflict_id: record.conflict_id.clone(),
                strategy: record.applied,
                success: record.success,
                actions: record.actions.len(),
            });
        }
        self.consume_resources(dt);
        self.check_airspace();
        self.update_metrics(dt);
        self.check_mission_completions();

        records
    }

    /// Run for `duration` simulated seconds as fast as possible.
    pub fn run(&mut self, duration: f64) -> SimulationResults {
        let started = Instant::now();
        let ticks = self.begin(duration, false);
        for _ in 0..ticks {
            if !self.running {
                break;
            }
            self.step();
        }
        self.finish(started)
    }

    /// Run for `duration` simulated seconds, sleeping one time step between
    /// ticks. Dropping the future between ticks leaves the simulation in a
    /// consistent state; call [`Simulation::stop`] afterwards.
    pub async fn run_paced(&mut self, duration: f64) -> SimulationResults {
        let started = Instant::now();
        let ticks = self.begin(duration, true);
        let period = Duration::try_from_secs_f64(self.config.simulation.time_step)
            .unwrap_or(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        for tick in 0..ticks {
            if !self.running {
                break;
            }
            self.step();
            if tick + 1 < ticks {
                ticker.tick().await;
            }
        }
        self.finish(started)
    }

    fn begin(&mut self, duration: f64, real_time: bool) -> u64 {
        self.running = true;
        let ticks = tick_count(duration, self.config.simulation.time_step);
        tracing::info!(
            "Simulation starting: {} UAVs, {:.1}s ({} ticks)",
            self.fleet.len(),
            duration,
            ticks
        );
        self.log(EventKind::SimulationStart {
            duration,
            uav_count: self.fleet.len(),
            real_time,
        });
        ticks
    }

    fn finish(&mut self, started: Instant) -> SimulationResults {
        self.wall_time += started.elapsed();
        let results = self.results();
        self.log(EventKind::SimulationEnd {
            metrics: self.metrics.clone(),
        });
        self.running = false;
        tracing::info!(
            "Simulation finished at t={:.1}s: {} conflicts, {} resolved, {} failed",
            self.current_time(),
            results.metrics.total_conflicts,
            results.metrics.resolved_conflicts,
            results.metrics.failed_resolutions
        );
        results
    }

    pub fn stop(&mut self) {
        self.running = false;
        tracing::info!("Simulation stopped at t={:.1}s", self.current_time());
        self.log(EventKind::SimulationStopped {
            time: self.current_time(),
        });
    }

    /// Back to an empty fleet, clear weather and a fresh RNG. Zones are kept,
    /// their violation counts cleared.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.fleet = Fleet::new(
            self.config.simulation.clone(),
            self.config.deconfliction.clone(),
        )?;
        self.weather = WeatherState::default();
        for zone in &mut self.zones {
            zone.violations = 0;
        }
        self.metrics = Metrics::default();
        self.events.clear();
        self.completion_logged.clear();
        self.low_power_logged.clear();
        self.running = false;
        self.wall_time = Duration::ZERO;
        self.rng = StdRng::seed_from_u64(self.config.seed());
        Ok(())
    }

    pub fn state(&self) -> SimulationState {
        SimulationState {
            time: self.current_time(),
            running: self.running,
            uav_count: self.fleet.len(),
            active_uavs: self.fleet.active_uavs().count(),
            current_conflicts: self.fleet.current_conflicts().len(),
            weather: self.weather.condition,
            wind: self.weather.wind,
            metrics: self.metrics.clone(),
        }
    }

    pub fn results(&self) -> SimulationResults {
        let conflict_resolution_rate = if self.metrics.total_conflicts > 0 {
            self.metrics.resolved_conflicts as f64 / self.metrics.total_conflicts as f64
        } else {
            1.0
        };
        SimulationResults {
            metrics: self.metrics.clone(),
            conflict_resolution_rate,
            strategy_usage: self.fleet.engine().strategy_counts(),
            simulated_duration: self.current_time(),
            wall_time_s: self.wall_time.as_secs_f64(),
            fleet_status: self.fleet.status(),
            environment: EnvironmentSummary {
                weather: self.weather.condition,
                wind_vector: self.weather.wind,
                airspace_zones: self.zones.len(),
                total_violations: self.zones.iter().map(|zone| zone.violations).sum(),
            },
        }
    }

    /// Write configuration, results, the event log and final UAV states as JSON.
    pub fn export_results(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let path = path.as_ref();
        let export = RunExport {
            generated_at: Utc::now(),
            simulation_config: &self.config.simulation,
            total_time: self.current_time(),
            final_metrics: self.results(),
            event_log: &self.events,
            uav_final_states: self.fleet.iter().map(Uav::info).collect(),
        };

        let write_err = |source| SimError::Write {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &export)?;
        writer.flush().map_err(write_err)?;
        tracing::info!("Results exported to {}", path.display());
        Ok(())
    }

    fn log(&mut self, kind: EventKind) {
        self.events.push(Event {
            timestamp: self.fleet.current_time(),
            kind,
        });
    }

    fn apply_weather(&mut self) {
        let wind = self.weather.wind * WIND_EFFECT_FRACTION;
        let factor = self.weather.condition.speed_factor();
        let storm = self.weather.condition == Weather::Storm;
        if wind == Vec3::ZERO && factor == 1.0 && !storm {
            return;
        }

        let mut grounded = Vec::new();
        for id in self.fleet.active_ids() {
            let Some(uav) = self.fleet.get_mut(&id) else {
                continue;
            };
            uav.apply_environment(wind, factor);
            if storm && self.rng.random_bool(STORM_EMERGENCY_PROBABILITY) {
                uav.emergency_stop();
                grounded.push(id);
            }
        }

        for uav_id in grounded {
            tracing::warn!("UAV {} grounded by {}", uav_id, self.weather.condition);
            self.log(EventKind::WeatherEmergency {
                uav_id,
                weather: self.weather.condition,
            });
        }
    }

    fn consume_resources(&mut self, dt: f64) {
        let fuel = self.config.simulation.fuel_consumption_rate * dt / 60.0;
        let battery = self.config.simulation.battery_consumption_rate * dt / 60.0;

        for id in self.fleet.active_ids() {
            if let Some(uav) = self.fleet.get_mut(&id) {
                let before = uav.fuel_level;
                uav.consume_resources(fuel, battery);
                self.metrics.fuel_consumed += before - uav.fuel_level;
            }
        }

        let low: Vec<(String, f64, f64)> = self
            .fleet
            .iter()
            .filter(|uav| uav.is_power_critical())
            .filter(|uav| !self.low_power_logged.contains(uav.id()))
            .map(|uav| (uav.id().to_string(), uav.fuel_level, uav.battery_level))
            .collect();

        for (uav_id, fuel_level, battery_level) in low {
            tracing::warn!(
                "UAV {} low on power (fuel {:.1}%, battery {:.1}%)",
                uav_id,
                fuel_level,
                battery_level
            );
            let reason = if fuel_level < LOW_POWER_PCT {
                EscalationReason::FuelCritical
            } else {
                EscalationReason::BatteryCritical
            };
            self.fleet.escalate_priority(&uav_id, reason);
            self.low_power_logged.insert(uav_id.clone());
            self.log(EventKind::LowPower {
                uav_id,
                fuel_level,
                battery_level,
            });
        }
    }

    fn check_airspace(&mut self) {
        let positions: Vec<(String, Vec3)> = self
            .fleet
            .iter()
            .map(|uav| (uav.id().to_string(), uav.position))
            .collect();

        let mut violations = Vec::new();
        for zone in self.zones.iter_mut().filter(|zone| zone.kind.is_prohibited()) {
            for (uav_id, position) in &positions {
                if zone.contains(*position) {
                    zone.violations += 1;
                    violations.push((uav_id.clone(), zone.id.clone(), zone.kind, *position));
                }
            }
        }

        for (uav_id, zone_id, zone_kind, position) in violations {
            tracing::warn!("UAV {} inside {:?} zone {}", uav_id, zone_kind, zone_id);
            self.metrics.safety_violations += 1;
            self.fleet
                .escalate_priority(&uav_id, EscalationReason::AirspaceViolation);
            self.log(EventKind::AirspaceViolation {
                uav_id,
                zone_id,
                zone_kind,
                position,
            });
        }
    }

    fn update_metrics(&mut self, dt: f64) {
        let counters = self.fleet.counters();
        self.metrics.total_conflicts = counters.total_conflicts_detected;
        self.metrics.resolved_conflicts = counters.total_conflicts_resolved;
        self.metrics.failed_resolutions = counters.total_conflicts_failed;

        self.metrics.total_distance_flown +=
            self.fleet.iter().map(|uav| uav.speed() * dt).sum::<f64>();

        let with_mission = self
            .fleet
            .iter()
            .filter(|uav| !uav.waypoints().is_empty())
            .count();
        if with_mission > 0 {
            let completed = self.fleet.iter().filter(|uav| uav.mission_complete()).count();
            self.metrics.mission_completion_rate = completed as f64 / with_mission as f64;
        }
    }

    fn check_mission_completions(&mut self) {
        let completed: Vec<String> = self
            .fleet
            .iter()
            .filter(|uav| uav.mission_complete())
            .filter(|uav| !self.completion_logged.contains(uav.id()))
            .map(|uav| uav.id().to_string())
            .collect();

        for uav_id in completed {
            self.completion_logged.insert(uav_id.clone());
            self.log(EventKind::MissionComplete {
                uav_id,
                completion_time: self.fleet.current_time(),
            });
        }
    }
}

impl fmt::Display for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UAV Simulation: {} UAVs, Time: {:.1}s, Weather: {}, Running: {}",
            self.fleet.len(),
            self.current_time(),
            self.weather.condition,
            self.running
        )
    }
}

/// Whole ticks needed to cover `duration`, robust to float drift.
fn tick_count(duration: f64, time_step: f64) -> u64 {
    if duration.is_nan() || time_step.is_nan() || duration <= 0.0 || time_step <= 0.0 {
        return 0;
    }
    (duration / time_step - 1e-9).ceil() as u64
}
