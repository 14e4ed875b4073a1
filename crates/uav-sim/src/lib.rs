//! UAV Sim - Simulation environment and scenarios for the deconfliction core.
//!
//! This crate provides:
//! - config: JSON file and `UAV_SIM_*` environment configuration
//! - environment: weather, airspace zones, resources, metrics and events
//! - scenarios: built-in and seeded random scenarios
//! - the `uav-sim` binary

pub mod config;
pub mod environment;
pub mod error;
pub mod scenarios;

pub use config::Config;
pub use environment::{
    AirspaceZone, Event, EventKind, Metrics, Simulation, SimulationResults, SimulationState,
    Weather, WeatherState, ZoneKind,
};
pub use error::SimError;
pub use scenarios::Scenario;
