//! Error taxonomy for the flood-protection core.
//!
//! - [`StructuralError`]: the flow network itself is invalid. Fatal for the
//!   run; the caller must repair the network.
//! - [`EconomicError`]: a single protection could not be built. Local to one
//!   steward/segment pair and expected in steady state.
//! - [`ConfigError`]: a parameter is out of range. Raised where it is set.

use crate::fixed::{Fixed64, Money, Volume};
use crate::id::{NodeId, StewardId};

/// The flow network violates one of its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("cycle detected in flow network")]
    Cycle,
    #[error("node {node:?} has {successors} flow successors, expected at most one")]
    MultipleOutflows { node: NodeId, successors: usize },
    #[error("segment {segment:?} is already owned by steward {owner:?}")]
    MultipleOwners { segment: NodeId, owner: StewardId },
    #[error("node not found: {0:?}")]
    UnknownNode(NodeId),
    #[error("steward not found: {0:?}")]
    UnknownSteward(StewardId),
    #[error("node {0:?} is not a segment")]
    NotASegment(NodeId),
}

/// A protection could not be paid for or does not fit the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EconomicError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },
    #[error("dike capacity {requested} would exceed maximum {max}")]
    CapacityExceeded { requested: Volume, max: Volume },
    #[error("retention basin of capacity {capacity} is not on offer at this segment")]
    OfferNotHeld { capacity: Volume },
}

/// A configuration value is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("history length must be at least 1, got {0}")]
    InvalidHistoryLength(usize),
    #[error("capacity must be positive, got {0}")]
    NonPositiveCapacity(Volume),
    #[error("dike capacity {capacity} is above the maximum {max}")]
    DikeAboveMaximum { capacity: Volume, max: Volume },
    #[error("safety factor must lie in [0, 1], got {0}")]
    SafetyFactorOutOfRange(Fixed64),
    #[error("probability must lie in [0, 1], got {0}")]
    ProbabilityOutOfRange(String),
    #[error("{0} must not be negative")]
    NegativeRate(&'static str),
}

/// Any error the basin can surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BasinError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Economic(#[from] EconomicError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
