//! Run configuration.
//!
//! Values are stored as plain numbers so config files stay readable; rates
//! and factors are converted to [`Fixed64`] once, when the basin is built.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fixed::{Fixed64, Money, Volume, f64_to_fixed64};
use crate::retention::RetentionParams;

/// Which history statistic drives [`crate::segment::Segment::is_threatened`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatRule {
    /// Peak inflow over the rolling history.
    #[default]
    MaxOfHistory,
    /// Mean inflow over the rolling history.
    MovingAverage,
}

/// Every named value the core consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinConfig {
    /// Stipend paid to a segment's owner each tick.
    pub steward_payment: Money,
    /// Fixed dike cost per kilometer of bank (both banks are built).
    pub dike_base_cost_per_km: f64,
    /// Additional dike cost per cubic meter of capacity, per kilometer.
    pub dike_cost_per_cubic_meter: f64,
    pub retention: RetentionParams,
    /// Rolling inflow history length for threat detection.
    pub history_length: usize,
    /// Default fraction of dike capacity considered safe.
    pub safety_factor: f64,
    /// Default floor release for new segments.
    pub min_discharge: Volume,
    /// Default dike ceiling for new segments.
    pub max_dike_capacity: Volume,
    pub threat_rule: ThreatRule,
}

impl Default for BasinConfig {
    fn default() -> Self {
        Self {
            steward_payment: 1_000,
            dike_base_cost_per_km: 50_000.0,
            dike_cost_per_cubic_meter: 100.0,
            retention: RetentionParams::default(),
            history_length: 10,
            safety_factor: 0.9,
            min_discharge: 0,
            max_dike_capacity: 5_000,
            threat_rule: ThreatRule::MaxOfHistory,
        }
    }
}

impl BasinConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_length == 0 {
            return Err(ConfigError::InvalidHistoryLength(0));
        }
        if !(0.0..=1.0).contains(&self.safety_factor) {
            return Err(ConfigError::SafetyFactorOutOfRange(f64_to_fixed64(
                self.safety_factor,
            )));
        }
        if self.steward_payment < 0 {
            return Err(ConfigError::NegativeRate("steward_payment"));
        }
        if self.dike_base_cost_per_km < 0.0 {
            return Err(ConfigError::NegativeRate("dike_base_cost_per_km"));
        }
        if self.dike_cost_per_cubic_meter < 0.0 {
            return Err(ConfigError::NegativeRate("dike_cost_per_cubic_meter"));
        }
        if self.min_discharge < 0 {
            return Err(ConfigError::NegativeRate("min_discharge"));
        }
        if self.max_dike_capacity <= 0 {
            return Err(ConfigError::NonPositiveCapacity(self.max_dike_capacity));
        }
        self.retention.validate()
    }

    /// Dike pricing in fixed-point.
    pub fn cost_rates(&self) -> CostRates {
        CostRates {
            base_cost_per_km: f64_to_fixed64(self.dike_base_cost_per_km),
            cost_per_cubic_meter: f64_to_fixed64(self.dike_cost_per_cubic_meter),
        }
    }

    /// Segment parameters with this config's defaults filled in.
    pub fn segment_params(&self, length_km: f64, dike_capacity: Volume) -> SegmentParams {
        SegmentParams {
            length: f64_to_fixed64(length_km),
            dike_capacity,
            max_dike_capacity: self.max_dike_capacity.max(dike_capacity),
            retainable: 0,
            min_discharge: self.min_discharge,
            natural_dike: false,
            safety_factor: f64_to_fixed64(self.safety_factor),
        }
    }
}

/// Dike pricing constants, converted once from [`BasinConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRates {
    pub base_cost_per_km: Fixed64,
    pub cost_per_cubic_meter: Fixed64,
}

/// Static configuration of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentParams {
    /// Reach length in kilometers.
    pub length: Fixed64,
    pub dike_capacity: Volume,
    pub max_dike_capacity: Volume,
    pub retainable: Volume,
    pub min_discharge: Volume,
    /// Natural banks: overflow is reported but never cut from discharge.
    pub natural_dike: bool,
    pub safety_factor: Fixed64,
}

impl SegmentParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.length < Fixed64::ZERO {
            return Err(ConfigError::NegativeRate("length"));
        }
        if self.dike_capacity < 0 {
            return Err(ConfigError::NonPositiveCapacity(self.dike_capacity));
        }
        if self.dike_capacity > self.max_dike_capacity {
            return Err(ConfigError::DikeAboveMaximum {
                capacity: self.dike_capacity,
                max: self.max_dike_capacity,
            });
        }
        if self.retainable < 0 {
            return Err(ConfigError::NegativeRate("retainable"));
        }
        if self.min_discharge < 0 {
            return Err(ConfigError::NegativeRate("min_discharge"));
        }
        if self.safety_factor < Fixed64::ZERO || self.safety_factor > Fixed64::ONE {
            return Err(ConfigError::SafetyFactorOutOfRange(self.safety_factor));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BasinConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_history_rejected() {
        let config = BasinConfig {
            history_length: 0,
            ..BasinConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidHistoryLength(0)));
    }

    #[test]
    fn safety_factor_out_of_range_rejected() {
        let config = BasinConfig {
            safety_factor: 1.2,
            ..BasinConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SafetyFactorOutOfRange(_))
        ));
    }

    #[test]
    fn segment_params_take_defaults() {
        let config = BasinConfig {
            min_discharge: 400,
            max_dike_capacity: 3_000,
            ..BasinConfig::default()
        };
        let params = config.segment_params(12.5, 1_000);
        assert_eq!(params.min_discharge, 400);
        assert_eq!(params.max_dike_capacity, 3_000);
        assert_eq!(params.length, f64_to_fixed64(12.5));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn segment_params_ceiling_never_below_capacity() {
        let config = BasinConfig {
            max_dike_capacity: 500,
            ..BasinConfig::default()
        };
        let params = config.segment_params(1.0, 800);
        assert_eq!(params.max_dike_capacity, 800);
    }

    #[test]
    fn threat_rule_serde_names() {
        let json = serde_json::to_string(&ThreatRule::MovingAverage).unwrap();
        assert_eq!(json, "\"moving_average\"");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: BasinConfig = serde_json::from_str(r#"{"steward_payment": 250}"#).unwrap();
        assert_eq!(config.steward_payment, 250);
        assert_eq!(config.history_length, 10);
    }
}
