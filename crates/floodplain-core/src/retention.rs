//! Retention basins and the stochastic catalog that offers them.
//!
//! Each tick every segment asks the catalog for one offer. Most requests
//! return nothing; when an offer is made, capacity and unit cost are drawn
//! from a single standard-normal sample so that larger basins are also the
//! more expensive per unit.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fixed::{Fixed64, Money, Volume, f64_to_fixed64, round_wide, scale};
use crate::rng::RandomSource;

/// A retention basin that could be attached to a segment. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionBasin {
    capacity: Volume,
    cost_per_unit: Fixed64,
}

impl RetentionBasin {
    pub fn new(capacity: Volume, cost_per_unit: Fixed64) -> Result<Self, ConfigError> {
        if capacity <= 0 {
            return Err(ConfigError::NonPositiveCapacity(capacity));
        }
        if cost_per_unit < Fixed64::ZERO {
            return Err(ConfigError::NegativeRate("cost_per_unit"));
        }
        Ok(Self {
            capacity,
            cost_per_unit,
        })
    }

    pub fn capacity(&self) -> Volume {
        self.capacity
    }

    pub fn cost_per_unit(&self) -> Fixed64 {
        self.cost_per_unit
    }

    /// `round(capacity * cost_per_unit)`, computed in Q64.64.
    pub fn cost(&self) -> Money {
        round_wide(scale(self.capacity, self.cost_per_unit))
    }
}

/// Generation parameters for retention-basin offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionParams {
    /// Probability that a single request yields an offer.
    pub probability: f64,
    pub mean_capacity: f64,
    pub stddev_capacity: f64,
    pub mean_unit_cost: f64,
    pub stddev_unit_cost: f64,
}

impl Default for RetentionParams {
    fn default() -> Self {
        Self {
            probability: 0.05,
            mean_capacity: 100.0,
            stddev_capacity: 30.0,
            mean_unit_cost: 350.0,
            stddev_unit_cost: 50.0,
        }
    }
}

impl RetentionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(ConfigError::ProbabilityOutOfRange(self.probability.to_string()));
        }
        if self.mean_capacity <= 0.0 {
            return Err(ConfigError::NonPositiveCapacity(self.mean_capacity as Volume));
        }
        if self.stddev_capacity < 0.0 {
            return Err(ConfigError::NegativeRate("stddev_capacity"));
        }
        if self.mean_unit_cost < 0.0 {
            return Err(ConfigError::NegativeRate("mean_unit_cost"));
        }
        if self.stddev_unit_cost < 0.0 {
            return Err(ConfigError::NegativeRate("stddev_unit_cost"));
        }
        Ok(())
    }
}

/// Stochastic generator of [`RetentionBasin`] offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionBasinCatalog {
    params: RetentionParams,
}

impl RetentionBasinCatalog {
    pub fn new(params: RetentionParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &RetentionParams {
        &self.params
    }

    /// Draw one offer. Returns `None` when the probability check fails or
    /// the joint draw lands on a non-positive capacity or unit cost.
    pub fn offer(&self, rng: &mut dyn RandomSource) -> Option<RetentionBasin> {
        let p = &self.params;
        if !rng.chance(p.probability) {
            return None;
        }
        let z = rng.normal(0.0, 1.0);
        let capacity = (p.mean_capacity + z * p.stddev_capacity).round() as Volume;
        let unit_cost = p.mean_unit_cost + z * p.stddev_unit_cost;
        if capacity <= 0 || unit_cost <= 0.0 {
            return None;
        }
        RetentionBasin::new(capacity, f64_to_fixed64(unit_cost)).ok()
    }
}
