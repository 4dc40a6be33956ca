//! Per-tick reports and the state hash.

use crate::error::EconomicError;
use crate::fixed::{Fixed64, Money, Ticks, Volume};
use crate::id::{NodeId, StewardId};
use crate::protection::ProtectionTag;

// ---------------------------------------------------------------------------
// Flow pass
// ---------------------------------------------------------------------------

/// Summary of one flow pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowReport {
    pub tick: Ticks,
    /// Nodes updated, in schedule order.
    pub nodes: usize,
    /// Stipends paid this pass.
    pub stipends: usize,
    pub stipend_total: Money,
    /// Retention offers accepted by a segment.
    pub offers_kept: usize,
    /// Offers drawn but refused (natural dike or offer list full).
    pub offers_dropped: usize,
    /// Segments that overflowed their dikes this pass.
    pub overflowing: Vec<NodeId>,
}

// ---------------------------------------------------------------------------
// Economic pass
// ---------------------------------------------------------------------------

/// What happened to one segment's candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Built {
        segment: NodeId,
        steward: StewardId,
        kind: ProtectionTag,
        capacity: Volume,
        cost: Money,
    },
    Failed {
        segment: NodeId,
        steward: StewardId,
        kind: ProtectionTag,
        error: EconomicError,
    },
    /// The evaluator selected none of the candidates.
    Declined { segment: NodeId, steward: StewardId },
}

impl ActionOutcome {
    pub fn segment(&self) -> NodeId {
        match self {
            ActionOutcome::Built { segment, .. }
            | ActionOutcome::Failed { segment, .. }
            | ActionOutcome::Declined { segment, .. } => *segment,
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self, ActionOutcome::Built { .. })
    }
}

/// Summary of one economic pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EconomicReport {
    pub tick: Ticks,
    /// Candidates attached to segments during generation.
    pub candidates: usize,
    /// Candidates refused for naming a segment or payer outside the steward.
    pub rejected: usize,
    pub outcomes: Vec<ActionOutcome>,
}

impl EconomicReport {
    pub fn built(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_built()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ActionOutcome::Failed { .. }))
            .count()
    }

    /// Total spent on protections that were built.
    pub fn spent(&self) -> Money {
        self.outcomes
            .iter()
            .map(|o| match o {
                ActionOutcome::Built { cost, .. } => *cost,
                _ => 0,
            })
            .sum()
    }
}

/// Result of [`crate::basin::Basin::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub flow: FlowReport,
    pub economy: EconomicReport,
    /// State hash after the tick.
    pub hash: u64,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of basin state for reproducibility checks.
///
/// Uses FNV-1a (64-bit). Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
