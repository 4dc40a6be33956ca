//! Scenario loading for the floodplain basin.
//!
//! Scenarios describe stewards, discharge sources, river segments, the flow
//! edges between them, segment ownership, the basin configuration and the
//! policy to run. They are read from RON, TOML or JSON, either as one file
//! ([`load_scenario`]) or as a directory of per-section files
//! ([`load_scenario_dir`]).

pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, Scenario, build_basin, load_scenario, load_scenario_dir};
