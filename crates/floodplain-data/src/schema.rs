//! Serde data file structs for basin scenarios.
//!
//! A scenario names every steward, source and segment, the flow edges
//! between nodes, and who owns each segment. Names are resolved into
//! engine ids by the loader.

use floodplain_core::config::BasinConfig;
use floodplain_core::fixed::{Money, Ticks, Volume};
use floodplain_policy::Policy;
use serde::Deserialize;

// ===========================================================================
// Network
// ===========================================================================

/// A steward and its opening balance.
#[derive(Debug, Clone, Deserialize)]
pub struct StewardData {
    pub name: String,
    #[serde(default)]
    pub balance: Money,
}

/// A discharge source with a normally distributed yield per tick.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceData {
    pub name: String,
    pub mean: f64,
    #[serde(default)]
    pub stddev: f64,
}

/// A river segment. Unset fields take the scenario config's defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentData {
    pub name: String,
    #[serde(default = "default_length")]
    pub length_km: f64,
    pub dike_capacity: Volume,
    #[serde(default)]
    pub max_dike_capacity: Option<Volume>,
    #[serde(default)]
    pub retainable: Volume,
    #[serde(default)]
    pub min_discharge: Option<Volume>,
    #[serde(default)]
    pub natural_dike: bool,
    #[serde(default)]
    pub safety_factor: Option<f64>,
    /// Name of the owning steward.
    #[serde(default)]
    pub owner: Option<String>,
}

fn default_length() -> f64 {
    1.0
}

/// A flow edge, supporting both the short tuple form and named fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlowData {
    /// Short form: `("upstream", "downstream")`.
    Short(String, String),
    /// Full form: `(from: "upstream", to: "downstream")`.
    Full { from: String, to: String },
}

impl FlowData {
    pub fn endpoints(&self) -> (&str, &str) {
        match self {
            FlowData::Short(from, to) | FlowData::Full { from, to } => (from.as_str(), to.as_str()),
        }
    }
}

/// The whole flow network.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkData {
    pub stewards: Vec<StewardData>,
    pub sources: Vec<SourceData>,
    pub segments: Vec<SegmentData>,
    pub flows: Vec<FlowData>,
}

// ===========================================================================
// Run
// ===========================================================================

/// How long and with which seed the headless runner drives the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunData {
    pub seed: u64,
    pub ticks: Ticks,
}

impl Default for RunData {
    fn default() -> Self {
        Self {
            seed: 0,
            ticks: 100,
        }
    }
}

// ===========================================================================
// Scenario
// ===========================================================================

/// A complete scenario in a single file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioData {
    pub config: BasinConfig,
    pub policy: Policy,
    pub run: RunData,
    pub network: NetworkData,
}
