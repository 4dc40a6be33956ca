//! Priced flood-protection investments and their ranking metrics.
//!
//! A [`FloodProtection`] is proposed (priced at construction) and then
//! either executed once or discarded. `execute` takes `self` by value, so an
//! executed protection cannot be executed again; the consumed value is kept
//! on the segment as its `last_built` record.

use serde::{Deserialize, Serialize};

use crate::basin::BasinView;
use crate::config::CostRates;
use crate::error::{ConfigError, EconomicError, StructuralError};
use crate::fixed::{Fixed64, Money, Volume, Wide, round_wide, scale, volume_ratio, widen};
use crate::id::{NodeId, StewardId};
use crate::retention::RetentionBasin;
use crate::segment::Segment;
use crate::steward::Steward;

/// What a protection builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectionKind {
    /// Raise the segment's dikes by the protection's capacity.
    RaiseDike,
    /// Divert flow into the given offered basin.
    AddRetentionBasin(RetentionBasin),
}

/// Discriminant of [`ProtectionKind`], for events and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectionTag {
    RaiseDike,
    AddRetentionBasin,
}

/// A priced investment on one segment, paid for by one steward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloodProtection {
    segment: NodeId,
    payer: StewardId,
    capacity: Volume,
    cost: Money,
    kind: ProtectionKind,
}

impl FloodProtection {
    /// Propose raising `segment`'s dikes by `capacity`.
    ///
    /// Cost: `length * 2 * (base_cost_per_km + capacity * cost_per_cubic_meter)`,
    /// computed in Q64.64 and rounded to whole units.
    pub fn raise_dike(
        segment_id: NodeId,
        segment: &Segment,
        payer: StewardId,
        capacity: Volume,
        rates: &CostRates,
    ) -> Result<Self, ConfigError> {
        if capacity <= 0 {
            return Err(ConfigError::NonPositiveCapacity(capacity));
        }
        let per_km = widen(rates.base_cost_per_km)
            .saturating_add(scale(capacity, rates.cost_per_cubic_meter));
        let cost = widen(segment.length())
            .saturating_mul(Wide::from_num(2))
            .saturating_mul(per_km);
        Ok(Self {
            segment: segment_id,
            payer,
            capacity,
            cost: round_wide(cost),
            kind: ProtectionKind::RaiseDike,
        })
    }

    /// Propose building an offered retention basin on `segment`.
    pub fn add_retention_basin(segment: NodeId, payer: StewardId, basin: RetentionBasin) -> Self {
        Self {
            segment,
            payer,
            capacity: basin.capacity(),
            cost: basin.cost(),
            kind: ProtectionKind::AddRetentionBasin(basin),
        }
    }

    pub fn segment(&self) -> NodeId {
        self.segment
    }

    pub fn payer(&self) -> StewardId {
        self.payer
    }

    pub fn capacity(&self) -> Volume {
        self.capacity
    }

    pub fn cost(&self) -> Money {
        self.cost
    }

    pub fn kind(&self) -> &ProtectionKind {
        &self.kind
    }

    pub fn tag(&self) -> ProtectionTag {
        match self.kind {
            ProtectionKind::RaiseDike => ProtectionTag::RaiseDike,
            ProtectionKind::AddRetentionBasin(_) => ProtectionTag::AddRetentionBasin,
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Pay for and build this protection.
    ///
    /// `segment` and `payer` must be the entities named by
    /// [`Self::segment`] and [`Self::payer`]. A retention basin must still be
    /// on offer at the segment. On any error nothing is mutated.
    pub fn execute(self, segment: &mut Segment, payer: &mut Steward) -> Result<(), EconomicError> {
        match &self.kind {
            ProtectionKind::RaiseDike => {
                let requested = segment.dike_capacity().saturating_add(self.capacity);
                if requested > segment.max_dike_capacity() {
                    return Err(EconomicError::CapacityExceeded {
                        requested,
                        max: segment.max_dike_capacity(),
                    });
                }
                payer.withdraw_money(self.cost)?;
                segment.raise_dike(self.capacity)?;
            }
            ProtectionKind::AddRetentionBasin(basin) => {
                if !segment.retention_offers().contains(basin) {
                    return Err(EconomicError::OfferNotHeld {
                        capacity: basin.capacity(),
                    });
                }
                payer.withdraw_money(self.cost)?;
                segment.withdraw_retention_offer(basin);
                segment.add_retainable(basin.capacity());
            }
        }
        segment.set_last_built(self);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Metrics
    // -----------------------------------------------------------------------

    /// Capacity gained per unit of cost.
    pub fn cost_effectiveness(&self) -> Fixed64 {
        volume_ratio(self.capacity, self.cost)
    }

    /// Cost-effectiveness weighted by the share of the payer's downstream
    /// segments this protection helps.
    ///
    /// Raising a dike is credited with the segment's own length; a retention
    /// basin with the length of every threatened downstream segment.
    pub fn subbasin_cost_effectiveness(
        &self,
        view: &BasinView<'_>,
    ) -> Result<Fixed64, StructuralError> {
        self.weighted_effectiveness(view, Some(self.payer))
    }

    /// As [`Self::subbasin_cost_effectiveness`], over the whole downstream
    /// run regardless of ownership.
    pub fn whole_basin_cost_effectiveness(
        &self,
        view: &BasinView<'_>,
    ) -> Result<Fixed64, StructuralError> {
        self.weighted_effectiveness(view, None)
    }

    fn weighted_effectiveness(
        &self,
        view: &BasinView<'_>,
        owner: Option<StewardId>,
    ) -> Result<Fixed64, StructuralError> {
        let run = view.graph.downstream(self.segment)?;
        let mut total = Fixed64::ZERO;
        let mut credited = Fixed64::ZERO;

        for node in run {
            let Some(segment) = view.segments.get(node) else {
                continue;
            };
            if owner.is_some() && view.graph.owner_of(node) != owner {
                continue;
            }
            total = total.saturating_add(segment.length());
            let helps = match self.kind {
                ProtectionKind::RaiseDike => node == self.segment,
                ProtectionKind::AddRetentionBasin(_) => segment.is_threatened(),
            };
            if helps {
                credited = credited.saturating_add(segment.length());
            }
        }

        if total == Fixed64::ZERO {
            return Ok(Fixed64::ZERO);
        }
        let share = credited.checked_div(total).unwrap_or(Fixed64::ZERO);
        Ok(self.cost_effectiveness().saturating_mul(share))
    }
}
