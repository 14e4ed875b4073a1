//! Multi-tick deconfliction tests driving the public `Fleet` API.

use uav_core::{
    Conflict, ConflictSeverity, DeconflictionConfig, DeconflictionEngine, EscalationReason,
    Fleet, MissionType, PriorityManager, SimulationConfig, Strategy, Uav, UavKind, UavStatus,
    Vec3,
};

fn fleet() -> Fleet {
    Fleet::new(SimulationConfig::default(), DeconflictionConfig::default()).unwrap()
}

fn separation(fleet: &Fleet, a: &str, b: &str) -> f64 {
    fleet.get(a).unwrap().distance_to(fleet.get(b).unwrap())
}

/// Two UAVs flying straight at each other on the same line.
#[test]
fn test_head_on_conflict_is_caught_and_separation_kept() {
    let mut fleet = fleet();
    fleet.spawn("A", UavKind::Quadcopter, (-100.0, 0.0, 100.0), 15.0, 50.0, 3);
    fleet.spawn("B", UavKind::Quadcopter, (100.0, 0.0, 100.0), 15.0, 50.0, 3);
    fleet
        .set_mission("A", vec![Vec3::new(100.0, 0.0, 100.0)])
        .unwrap();
    fleet
        .set_mission("B", vec![Vec3::new(-100.0, 0.0, 100.0)])
        .unwrap();

    let mut first_detection = None;
    let mut min_separation = f64::INFINITY;
    for tick in 1..=60 {
        fleet.update(1.0);
        min_separation = min_separation.min(separation(&fleet, "A", "B"));
        if first_detection.is_none() && !fleet.current_conflicts().is_empty() {
            first_detection = Some((tick, fleet.current_conflicts()[0].severity));
        }
    }

    let (tick, severity) = first_detection.expect("conflict never detected");
    assert!(tick <= 8);
    assert!(severity >= ConflictSeverity::High);
    assert!(min_separation >= 50.0, "min separation {min_separation}");

    // Closing at 30 m/s with a 10 m miss distance classifies as critical.
    let first = &fleet.engine().history()[0];
    assert_eq!(first.strategy, Strategy::EmergencyAvoidance);
    assert!(first.success);
    assert_eq!(fleet.get("A").unwrap().status(), UavStatus::Emergency);
    assert!(fleet.active_ids().is_empty());
    assert_eq!(fleet.counters().total_conflicts_failed, 0);
}

/// Priority 1 keeps its course, priority 4 yields sideways.
#[test]
fn test_priority_precedence() {
    let mut fleet = fleet();
    fleet.spawn("EMS", UavKind::Helicopter, (-300.0, 0.0, 100.0), 15.0, 50.0, 1);
    fleet.spawn("TRAIN", UavKind::Quadcopter, (300.0, 25.0, 100.0), 15.0, 50.0, 4);
    fleet
        .set_mission("EMS", vec![Vec3::new(300.0, 0.0, 100.0)])
        .unwrap();
    fleet
        .set_mission("TRAIN", vec![Vec3::new(-300.0, 25.0, 100.0)])
        .unwrap();

    let records = fleet.update(1.0);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].strategy, Strategy::PriorityBased);
    assert_eq!(records[0].actions.len(), 1);
    assert_eq!(records[0].actions[0].uav_id, "TRAIN");

    let ems = fleet.get("EMS").unwrap();
    assert_eq!(ems.velocity, Vec3::new(15.0, 0.0, 0.0));
    assert!(!ems.is_overridden());
    let train = fleet.get("TRAIN").unwrap();
    assert!(train.is_overridden());
    assert!(train.velocity.y > 0.0);

    fleet.update(1.0);
    assert!(fleet.get("EMS").unwrap().heading_deg().abs() < 1e-9);
    let train_heading = fleet.get("TRAIN").unwrap().heading_deg();
    assert!((train_heading - 180.0).abs() > 1.0);

    let mut min_separation = separation(&fleet, "EMS", "TRAIN");
    for _ in 0..58 {
        fleet.update(1.0);
        min_separation = min_separation.min(separation(&fleet, "EMS", "TRAIN"));
        assert!(fleet.get("EMS").unwrap().heading_deg().abs() < 1e-9);
    }
    assert!(min_separation >= 50.0, "min separation {min_separation}");
    assert!(fleet.get("EMS").unwrap().mission_complete());
}

#[test]
fn test_mission_completion_is_idempotent() {
    let mut fleet = fleet();
    fleet.spawn("A", UavKind::FixedWing, (0.0, 0.0, 100.0), 15.0, 50.0, 3);
    fleet
        .set_mission("A", vec![Vec3::new(30.0, 0.0, 100.0), Vec3::new(30.0, 30.0, 100.0)])
        .unwrap();

    for _ in 0..10 {
        fleet.update(1.0);
    }
    let uav = fleet.get("A").unwrap();
    assert!(uav.mission_complete());
    assert_eq!(uav.status(), UavStatus::Idle);
    assert_eq!(uav.current_waypoint_index(), 2);
    let position = uav.position;

    for _ in 0..10 {
        fleet.update(1.0);
    }
    let uav = fleet.get("A").unwrap();
    assert_eq!(uav.position, position);
    assert_eq!(uav.status(), UavStatus::Idle);
    assert_eq!(uav.current_waypoint_index(), 2);
}

#[test]
fn test_failed_resolution_is_rolled_back_and_retried() {
    let deconfliction = DeconflictionConfig {
        enable_priority_based: false,
        enable_altitude_layering: false,
        enable_geometric_separation: false,
        enable_velocity_adjustment: false,
        enable_cooperative_pathfinding: false,
        ..Default::default()
    };
    let mut fleet = Fleet::new(SimulationConfig::default(), deconfliction).unwrap();
    fleet.spawn("A", UavKind::Quadcopter, (-300.0, 0.0, 100.0), 15.0, 50.0, 3);
    fleet.spawn("B", UavKind::Quadcopter, (300.0, 30.0, 100.0), 15.0, 50.0, 3);
    {
        let a = fleet.get_mut("A").unwrap();
        a.set_status(UavStatus::Active).unwrap();
        a.velocity = Vec3::new(10.0, 0.0, 0.0);
    }
    {
        let b = fleet.get_mut("B").unwrap();
        b.set_status(UavStatus::Active).unwrap();
        b.velocity = Vec3::new(-10.0, 0.0, 0.0);
        b.max_speed = f64::NAN;
    }

    let records = fleet.update(1.0);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, ConflictSeverity::High);
    assert_eq!(records[0].strategy, Strategy::EmergencyAvoidance);
    assert!(!records[0].success);

    let a = fleet.get("A").unwrap();
    assert_eq!(a.velocity, Vec3::new(10.0, 0.0, 0.0));
    assert!(!a.is_overridden());
    assert!(fleet.get("B").unwrap().velocity.is_finite());

    fleet.update(1.0);
    let counters = fleet.counters();
    assert_eq!(counters.total_conflicts_detected, 2);
    assert_eq!(counters.total_conflicts_failed, 2);
    assert_eq!(counters.total_conflicts_resolved, 0);
}

#[test]
fn test_altitude_layering_stays_within_limits() {
    let deconfliction = DeconflictionConfig {
        safety_margin_multiplier: 10.0,
        ..Default::default()
    };
    let mut engine = DeconflictionEngine::new(deconfliction, (50.0, 500.0));

    for z1 in [50.0, 120.0, 275.0, 430.0, 500.0] {
        for z2 in [50.0, 60.0, 275.0, 499.0, 500.0] {
            let mut a = Uav::new("A", UavKind::Quadcopter, (0.0, 0.0, z1)).with_min_separation(200.0);
            let mut b = Uav::new("B", UavKind::Quadcopter, (100.0, 0.0, z2));
            let conflict = Conflict {
                uav1_id: "A".to_string(),
                uav2_id: "B".to_string(),
                severity: ConflictSeverity::Medium,
                distance_m: a.distance_to(&b),
                time_to_conflict: 20.0,
                min_distance_m: 45.0,
                required_separation_m: 200.0,
                closest_point: Vec3::ZERO,
            };
            let record = engine.resolve_with(Strategy::AltitudeLayering, &conflict, &mut a, &mut b);
            assert!(record.success);
            for uav in [&a, &b] {
                assert!((50.0..=500.0).contains(&uav.position.z), "z = {}", uav.position.z);
            }
        }
    }
}

#[test]
fn test_priorities_stay_in_range() {
    let mut manager = PriorityManager::new();
    let mut uavs: Vec<Uav> = (0..8)
        .map(|i| Uav::new(format!("U{i}"), UavKind::Quadcopter, (i as f64 * 100.0, 0.0, 100.0)))
        .collect();

    for (i, uav) in uavs.iter_mut().enumerate() {
        let mission = if i % 2 == 0 {
            MissionType::Training
        } else {
            MissionType::EmergencyResponse
        };
        let priority = manager.assign(uav, mission, 0.1 + i as f64 * 0.4);
        assert!((1..=5).contains(&priority));
    }
    uavs[3].fuel_level = 5.0;
    for reason in [
        EscalationReason::FuelCritical,
        EscalationReason::AirspaceViolation,
        EscalationReason::from("solar_flare"),
    ] {
        for uav in uavs.iter_mut() {
            let priority = manager.escalate(uav, reason.clone());
            assert!((1..=5).contains(&priority));
        }
    }
    uavs[5].emergency_stop();

    let assigned = manager.normalize(uavs.iter_mut());
    assert_eq!(assigned.len(), 8);
    assert!(assigned.values().all(|p| (1..=5).contains(p)));
    assert_eq!(assigned["U5"], 1);
    assert!(uavs.iter().all(|uav| (1..=5).contains(&uav.priority())));
}

#[test]
fn test_configuration_errors_fail_fast() {
    for config in [
        SimulationConfig {
            time_step: 0.0,
            ..Default::default()
        },
        SimulationConfig {
            default_separation: -10.0,
            ..Default::default()
        },
        SimulationConfig {
            conflict_detection_horizon: f64::NAN,
            ..Default::default()
        },
    ] {
        assert!(Fleet::new(config, DeconflictionConfig::default()).is_err());
    }

    let margin = DeconflictionConfig {
        safety_margin_multiplier: 0.99,
        ..Default::default()
    };
    let err = Fleet::new(SimulationConfig::default(), margin).unwrap_err();
    assert!(err.to_string().contains("safety margin"));
}

#[test]
fn test_fleet_status_round_trips_through_json() {
    let mut fleet = fleet();
    fleet.spawn("A", UavKind::Vtol, (0.0, 0.0, 100.0), 12.0, 40.0, 2);
    fleet
        .set_mission("A", vec![Vec3::new(200.0, 0.0, 100.0)])
        .unwrap();
    fleet.update(1.0);

    let status = fleet.status();
    let json = status.to_json_pretty().unwrap();
    let parsed: uav_core::FleetStatus = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, status);
    assert_eq!(parsed.uavs[0].total_waypoints, 1);
}
