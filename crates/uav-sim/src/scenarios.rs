//! Pre-defined UAV scenarios for the simulator.

use crate::environment::{Simulation, Weather, ZoneKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uav_core::{MissionType, UavKind, Vec3};

const CRUISE_ALTITUDE_M: f64 = 100.0;

/// One UAV and the mission it flies.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioUav {
    pub id: String,
    pub kind: UavKind,
    pub start: Vec3,
    pub mission: MissionType,
    pub waypoints: Vec<Vec3>,
}

impl ScenarioUav {
    pub fn new(
        id: &str,
        kind: UavKind,
        start: impl Into<Vec3>,
        mission: MissionType,
        waypoints: Vec<Vec3>,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            start: start.into(),
            mission,
            waypoints,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioZone {
    pub id: String,
    pub kind: ZoneKind,
    pub bounds: (f64, f64, f64, f64),
    pub altitude_range: (f64, f64),
}

/// A named scenario consisting of UAVs with missions, plus optional
/// airspace zones and weather.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub uavs: Vec<ScenarioUav>,
    pub zones: Vec<ScenarioZone>,
    /// (condition, wind speed m/s, wind bearing deg)
    pub weather: Option<(Weather, f64, f64)>,
}

impl Scenario {
    fn new(name: &str, uavs: Vec<ScenarioUav>) -> Self {
        Self {
            name: name.to_string(),
            uavs,
            zones: Vec::new(),
            weather: None,
        }
    }

    /// Add zones, weather and UAVs to `sim`. Returns how many UAVs were added.
    pub fn load_into(&self, sim: &mut Simulation) -> usize {
        for zone in &self.zones {
            sim.add_airspace_zone(&zone.id, zone.kind, zone.bounds, zone.altitude_range);
        }
        if let Some((condition, speed, direction)) = self.weather {
            sim.set_weather(condition, speed, direction);
        }

        let added = self
            .uavs
            .iter()
            .filter(|uav| {
                sim.add_uav(
                    &uav.id,
                    uav.kind,
                    uav.start,
                    uav.mission,
                    uav.waypoints.clone(),
                )
            })
            .count();
        tracing::info!(
            "Loaded scenario '{}' with {}/{} UAVs",
            self.name,
            added,
            self.uavs.len()
        );
        added
    }
}

/// Two UAVs on the same line flying straight at each other.
pub fn create_head_on_scenario() -> Scenario {
    let offset_m = 100.0;
    Scenario::new(
        "head-on",
        vec![
            ScenarioUav::new(
                "UAV001",
                UavKind::Quadcopter,
                (-offset_m, 0.0, CRUISE_ALTITUDE_M),
                MissionType::CargoDelivery,
                vec![Vec3::new(offset_m, 0.0, CRUISE_ALTITUDE_M)],
            ),
            ScenarioUav::new(
                "UAV002",
                UavKind::Quadcopter,
                (offset_m, 0.0, CRUISE_ALTITUDE_M),
                MissionType::CargoDelivery,
                vec![Vec3::new(-offset_m, 0.0, CRUISE_ALTITUDE_M)],
            ),
        ],
    )
}

/// Create two UAVs crossing at the origin.
///
/// - UAV 1: West to East
/// - UAV 2: South to North
pub fn create_crossing_scenario() -> Scenario {
    let offset_m = 300.0;
    Scenario::new(
        "crossing",
        vec![
            ScenarioUav::new(
                "UAV001",
                UavKind::FixedWing,
                (-offset_m, 0.0, CRUISE_ALTITUDE_M),
                MissionType::Surveillance,
                vec![Vec3::new(offset_m, 0.0, CRUISE_ALTITUDE_M)],
            ),
            ScenarioUav::new(
                "UAV002",
                UavKind::Quadcopter,
                (0.0, -offset_m, CRUISE_ALTITUDE_M),
                MissionType::CargoDelivery,
                vec![Vec3::new(0.0, offset_m, CRUISE_ALTITUDE_M)],
            ),
        ],
    )
}

/// Two UAVs on parallel tracks 100 m apart (no conflict).
pub fn create_parallel_scenario() -> Scenario {
    let offset_m = 300.0;
    let separation_m = 100.0;
    Scenario::new(
        "parallel",
        vec![
            ScenarioUav::new(
                "UAV001",
                UavKind::FixedWing,
                (-offset_m, 0.0, CRUISE_ALTITUDE_M),
                MissionType::Patrol,
                vec![Vec3::new(offset_m, 0.0, CRUISE_ALTITUDE_M)],
            ),
            ScenarioUav::new(
                "UAV002",
                UavKind::FixedWing,
                (-offset_m, separation_m, CRUISE_ALTITUDE_M),
                MissionType::Patrol,
                vec![Vec3::new(offset_m, separation_m, CRUISE_ALTITUDE_M)],
            ),
        ],
    )
}

/// An emergency responder and a training flight on near-reciprocal tracks.
/// The lower-priority UAV is expected to yield.
pub fn create_priority_scenario() -> Scenario {
    let offset_m = 300.0;
    let lateral_m = 25.0;
    Scenario::new(
        "priority",
        vec![
            ScenarioUav::new(
                "EMS001",
                UavKind::Helicopter,
                (-offset_m, 0.0, CRUISE_ALTITUDE_M),
                MissionType::EmergencyResponse,
                vec![Vec3::new(offset_m, 0.0, CRUISE_ALTITUDE_M)],
            ),
            ScenarioUav::new(
                "TRN001",
                UavKind::Quadcopter,
                (offset_m, lateral_m, CRUISE_ALTITUDE_M),
                MissionType::Training,
                vec![Vec3::new(-offset_m, lateral_m, CRUISE_ALTITUDE_M)],
            ),
        ],
    )
}

/// Create multiple UAVs converging on the origin.
pub fn create_converging_scenario() -> Scenario {
    let offset_m = 300.0;
    let angles: [f64; 4] = [0.0, 90.0, 180.0, 270.0]; // 4 UAVs from cardinal directions

    let uavs = angles
        .iter()
        .enumerate()
        .map(|(i, &angle)| {
            let rad = angle.to_radians();
            ScenarioUav::new(
                &format!("UAV{:03}", i + 1),
                UavKind::Quadcopter,
                (offset_m * rad.sin(), offset_m * rad.cos(), CRUISE_ALTITUDE_M),
                MissionType::CargoDelivery,
                vec![Vec3::new(0.0, 0.0, CRUISE_ALTITUDE_M)],
            )
        })
        .collect();

    Scenario::new("converging", uavs)
}

/// Three mixed UAVs crossing a central no-fly zone in a light breeze.
pub fn create_sample_scenario() -> Scenario {
    let mut scenario = Scenario::new(
        "sample",
        vec![
            ScenarioUav::new(
                "UAV-1",
                UavKind::Quadcopter,
                (-600.0, -600.0, 100.0),
                MissionType::MedicalDelivery,
                vec![Vec3::new(600.0, 600.0, 100.0)],
            ),
            ScenarioUav::new(
                "UAV-2",
                UavKind::FixedWing,
                (600.0, -600.0, 120.0),
                MissionType::CargoDelivery,
                vec![Vec3::new(-600.0, 600.0, 120.0)],
            ),
            ScenarioUav::new(
                "UAV-3",
                UavKind::Helicopter,
                (0.0, -700.0, 150.0),
                MissionType::EmergencyResponse,
                vec![Vec3::new(0.0, 700.0, 150.0)],
            ),
        ],
    );
    scenario.zones.push(ScenarioZone {
        id: "NFZ-CENTER".to_string(),
        kind: ZoneKind::NoFly,
        bounds: (-150.0, 150.0, -150.0, 150.0),
        altitude_range: (0.0, 300.0),
    });
    scenario.weather = Some((Weather::Clear, 2.0, 45.0));
    scenario
}

/// `count` UAVs with random starts, kinds and missions inside a square of
/// half-width `extent_m`. The same seed always yields the same scenario.
pub fn create_random_scenario(count: usize, extent_m: f64, seed: u64) -> Scenario {
    const KINDS: [UavKind; 4] = [
        UavKind::Quadcopter,
        UavKind::FixedWing,
        UavKind::Helicopter,
        UavKind::Vtol,
    ];
    const MISSIONS: [MissionType; 8] = [
        MissionType::EmergencyResponse,
        MissionType::MedicalDelivery,
        MissionType::SearchRescue,
        MissionType::Surveillance,
        MissionType::CargoDelivery,
        MissionType::Patrol,
        MissionType::Training,
        MissionType::Testing,
    ];

    let mut rng = StdRng::seed_from_u64(seed);
    let extent_m = extent_m.abs().max(1.0);
    let point = |rng: &mut StdRng| {
        Vec3::new(
            rng.random_range(-extent_m..=extent_m),
            rng.random_range(-extent_m..=extent_m),
            rng.random_range(80.0..=200.0),
        )
    };

    let uavs = (0..count)
        .map(|i| {
            let start = point(&mut rng);
            let waypoints = (0..rng.random_range(1..=3)).map(|_| point(&mut rng)).collect();
            ScenarioUav::new(
                &format!("UAV{:03}", i + 1),
                KINDS[rng.random_range(0..KINDS.len())],
                start,
                MISSIONS[rng.random_range(0..MISSIONS.len())],
                waypoints,
            )
        })
        .collect();

    Scenario::new("random", uavs)
}
