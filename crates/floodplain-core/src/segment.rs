//! Segment hydrology and headwater sources.
//!
//! A [`Segment`] turns the summed discharge of its upstream neighbours into
//! four derived values each tick:
//!
//! ```text
//! water_left = max(min_discharge, inflow - retainable)
//! retained   = inflow - water_left
//! overflow   = max(0, water_left - dike_capacity)
//! discharge  = water_left - (natural_dike ? 0 : overflow)
//! ```
//!
//! Inflow is also appended to a bounded rolling history that drives threat
//! detection. A [`Source`] has no upstream and draws its discharge from a
//! normal distribution.

use serde::{Deserialize, Serialize};

use crate::config::{SegmentParams, ThreatRule};
use crate::error::{ConfigError, EconomicError};
use crate::fixed::{Fixed64, Volume, Wide, scale, volume_to_wide};
use crate::observe::{Observers, SubscriptionId};
use crate::protection::FloodProtection;
use crate::retention::RetentionBasin;
use crate::ring::RingBuffer;
use crate::rng::RandomSource;

/// A segment stops accepting retention offers once it holds this many.
pub const MAX_RETENTION_OFFERS: usize = 4;

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// A per-tick derived field of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentField {
    Inflow,
    Retained,
    Overflow,
    Discharge,
}

/// Payload delivered to segment observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentChange {
    Renamed { old: String, new: String },
    Value { field: SegmentField, old: Volume, new: Volume },
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A river reach with dike, retention and rolling-history state.
#[derive(Debug, Serialize, Deserialize)]
pub struct Segment {
    name: String,
    params: SegmentParams,
    threat_rule: ThreatRule,

    // Derived each tick by `consume`.
    inflow: Volume,
    retained: Volume,
    overflow: Volume,
    discharge: Volume,

    history: RingBuffer<Volume>,
    /// Configured history length; the buffer is reallocated to match on the
    /// next `consume`.
    history_length: usize,

    possible_retention_basins: Vec<RetentionBasin>,
    #[serde(skip)]
    possible_actions: Vec<FloodProtection>,
    last_built: Option<FloodProtection>,

    #[serde(skip)]
    observers: Observers<SegmentChange>,
}

impl Segment {
    pub fn new(
        name: impl Into<String>,
        params: SegmentParams,
        history_length: usize,
        threat_rule: ThreatRule,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        if history_length == 0 {
            return Err(ConfigError::InvalidHistoryLength(0));
        }
        Ok(Self {
            name: name.into(),
            params,
            threat_rule,
            inflow: 0,
            retained: 0,
            overflow: 0,
            discharge: 0,
            history: RingBuffer::new(history_length),
            history_length,
            possible_retention_basins: Vec::new(),
            possible_actions: Vec::new(),
            last_built: None,
            observers: Observers::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Identity and observers
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let new = name.into();
        if new == self.name {
            return;
        }
        let old = std::mem::replace(&mut self.name, new.clone());
        self.observers.notify(&SegmentChange::Renamed { old, new });
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SegmentChange) + 'static) -> SubscriptionId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Static configuration
    // -----------------------------------------------------------------------

    pub fn params(&self) -> &SegmentParams {
        &self.params
    }

    pub fn length(&self) -> Fixed64 {
        self.params.length
    }

    pub fn dike_capacity(&self) -> Volume {
        self.params.dike_capacity
    }

    pub fn max_dike_capacity(&self) -> Volume {
        self.params.max_dike_capacity
    }

    pub fn retainable(&self) -> Volume {
        self.params.retainable
    }

    pub fn min_discharge(&self) -> Volume {
        self.params.min_discharge
    }

    pub fn natural_dike(&self) -> bool {
        self.params.natural_dike
    }

    pub fn safety_factor(&self) -> Fixed64 {
        self.params.safety_factor
    }

    pub fn threat_rule(&self) -> ThreatRule {
        self.threat_rule
    }

    pub fn set_threat_rule(&mut self, rule: ThreatRule) {
        self.threat_rule = rule;
    }

    /// `safety_factor * dike_capacity`.
    pub fn safe_dike_capacity(&self) -> Wide {
        scale(self.params.dike_capacity, self.params.safety_factor)
    }

    /// Raise the dike. Fails without mutating if the ceiling would be passed.
    pub(crate) fn raise_dike(&mut self, delta: Volume) -> Result<(), EconomicError> {
        let requested = self.params.dike_capacity.saturating_add(delta);
        if requested > self.params.max_dike_capacity {
            return Err(EconomicError::CapacityExceeded {
                requested,
                max: self.params.max_dike_capacity,
            });
        }
        self.params.dike_capacity = requested;
        Ok(())
    }

    pub(crate) fn add_retainable(&mut self, capacity: Volume) {
        self.params.retainable = self.params.retainable.saturating_add(capacity);
    }

    // -----------------------------------------------------------------------
    // Hydrology
    // -----------------------------------------------------------------------

    pub fn inflow(&self) -> Volume {
        self.inflow
    }

    pub fn retained(&self) -> Volume {
        self.retained
    }

    pub fn overflow(&self) -> Volume {
        self.overflow
    }

    pub fn discharge(&self) -> Volume {
        self.discharge
    }

    /// Water passed on before the dike cut: `inflow - retained`.
    pub fn water_left(&self) -> Volume {
        self.inflow - self.retained
    }

    fn set_field(&mut self, field: SegmentField, new: Volume) {
        let slot = match field {
            SegmentField::Inflow => &mut self.inflow,
            SegmentField::Retained => &mut self.retained,
            SegmentField::Overflow => &mut self.overflow,
            SegmentField::Discharge => &mut self.discharge,
        };
        let old = std::mem::replace(slot, new);
        if old != new {
            self.observers
                .notify(&SegmentChange::Value { field, old, new });
        }
    }

    /// Recompute this tick's water balance from the upstream discharges.
    pub fn consume(&mut self, upstream: &[Volume]) {
        for field in [
            SegmentField::Inflow,
            SegmentField::Retained,
            SegmentField::Overflow,
            SegmentField::Discharge,
        ] {
            self.set_field(field, 0);
        }

        let inflow: Volume = upstream.iter().copied().fold(0, Volume::saturating_add);
        self.set_field(SegmentField::Inflow, inflow);

        if self.history.capacity() != self.history_length {
            self.history.resize(self.history_length);
        }
        self.history.push(inflow);

        let p = &self.params;
        let water_left = p.min_discharge.max(inflow.saturating_sub(p.retainable));
        let retained = inflow - water_left;
        let overflow = (water_left - p.dike_capacity).max(0);
        let discharge = if p.natural_dike {
            water_left
        } else {
            water_left - overflow
        };

        self.set_field(SegmentField::Retained, retained);
        self.set_field(SegmentField::Overflow, overflow);
        self.set_field(SegmentField::Discharge, discharge);
    }

    // -----------------------------------------------------------------------
    // Rolling history and threat detection
    // -----------------------------------------------------------------------

    pub fn history(&self) -> &RingBuffer<Volume> {
        &self.history
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Change the rolling-history length. The buffer is reallocated on the
    /// next `consume`, keeping the most recent samples in order.
    pub fn set_history_length(&mut self, length: usize) -> Result<(), ConfigError> {
        if length == 0 {
            return Err(ConfigError::InvalidHistoryLength(length));
        }
        self.history_length = length;
        Ok(())
    }

    /// The history statistic selected by the threat rule, or `None` before
    /// the first `consume`.
    pub fn peak_pressure(&self) -> Option<Wide> {
        if self.history.is_empty() {
            return None;
        }
        match self.threat_rule {
            ThreatRule::MaxOfHistory => self.history.iter().copied().max().map(volume_to_wide),
            ThreatRule::MovingAverage => {
                let sum = self
                    .history
                    .iter()
                    .copied()
                    .fold(0, Volume::saturating_add);
                volume_to_wide(sum)
                    .checked_div(volume_to_wide(self.history.len() as Volume))
            }
        }
    }

    /// True if the dike overflowed this tick, or if the history statistic
    /// minus retention reaches the safe dike capacity.
    pub fn is_threatened(&self) -> bool {
        if self.overflow > 0 {
            return true;
        }
        let Some(pressure) = self.peak_pressure() else {
            return false;
        };
        pressure.saturating_sub(volume_to_wide(self.params.retainable))
            >= self.safe_dike_capacity()
    }

    // -----------------------------------------------------------------------
    // Retention offers and candidate actions
    // -----------------------------------------------------------------------

    pub fn retention_offers(&self) -> &[RetentionBasin] {
        &self.possible_retention_basins
    }

    /// Record a retention offer. Dropped (returns `false`) once
    /// [`MAX_RETENTION_OFFERS`] are held or the segment has natural banks.
    pub fn offer_retention_basin(&mut self, basin: RetentionBasin) -> bool {
        if self.params.natural_dike || self.possible_retention_basins.len() >= MAX_RETENTION_OFFERS
        {
            return false;
        }
        self.possible_retention_basins.push(basin);
        true
    }

    /// Remove the first offer equal to `basin`.
    pub(crate) fn withdraw_retention_offer(&mut self, basin: &RetentionBasin) -> bool {
        match self.possible_retention_basins.iter().position(|b| b == basin) {
            Some(idx) => {
                self.possible_retention_basins.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn add_possible_action(&mut self, action: FloodProtection) {
        self.possible_actions.push(action);
    }

    pub fn possible_actions(&self) -> &[FloodProtection] {
        &self.possible_actions
    }

    /// Take the candidate list, leaving it empty.
    pub fn take_possible_actions(&mut self) -> Vec<FloodProtection> {
        std::mem::take(&mut self.possible_actions)
    }

    pub fn clear_possible_actions(&mut self) {
        self.possible_actions.clear();
    }

    pub fn last_built(&self) -> Option<&FloodProtection> {
        self.last_built.as_ref()
    }

    pub(crate) fn set_last_built(&mut self, protection: FloodProtection) {
        self.last_built = Some(protection);
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A headwater. Its discharge is a fresh Normal(mean, stddev) draw each
/// tick, rounded and floored at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    name: String,
    mean: f64,
    stddev: f64,
    discharge: Volume,
}

impl Source {
    pub fn new(name: impl Into<String>, mean: f64, stddev: f64) -> Result<Self, ConfigError> {
        if stddev < 0.0 {
            return Err(ConfigError::NegativeRate("stddev"));
        }
        Ok(Self {
            name: name.into(),
            mean,
            stddev,
            discharge: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stddev(&self) -> f64 {
        self.stddev
    }

    pub fn discharge(&self) -> Volume {
        self.discharge
    }

    pub fn consume(&mut self, rng: &mut dyn RandomSource) {
        let draw = rng.normal(self.mean, self.stddev).round();
        self.discharge = (draw as Volume).max(0);
    }
}
