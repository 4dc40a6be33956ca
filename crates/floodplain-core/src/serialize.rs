//! Binary snapshots of a basin.
//!
//! Snapshots are encoded with `bitcode` behind a versioned header. They hold
//! the network, hydrology, stewards, configuration and tick counter.
//! Observers, event listeners, candidate lists and the cached order are not
//! stored; the order is recomputed on restore. The random source is owned by
//! the caller and snapshotted separately (see [`crate::rng::SimRng`]).

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

use crate::basin::Basin;
use crate::config::BasinConfig;
use crate::error::ConfigError;
use crate::fixed::Ticks;
use crate::graph::FlowGraph;
use crate::id::{NodeId, StewardId};
use crate::ring::RingBuffer;
use crate::segment::{Segment, Source};
use crate::steward::Steward;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a basin snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xF100_D001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("snapshot carries an invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("no snapshot at index {0}")]
    MissingSnapshot(usize),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick count at the time the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Decode a snapshot and return only its header.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: BasinSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

// ---------------------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------------------

/// Borrowed form written by [`Basin::serialize`]. Field order and types
/// must match [`BasinSnapshot`].
#[derive(Serialize)]
struct BasinSnapshotRef<'a> {
    header: SnapshotHeader,
    config: &'a BasinConfig,
    graph: &'a FlowGraph,
    segments: &'a SecondaryMap<NodeId, Segment>,
    sources: &'a SecondaryMap<NodeId, Source>,
    stewards: &'a SlotMap<StewardId, Steward>,
}

#[derive(Deserialize)]
struct BasinSnapshot {
    header: SnapshotHeader,
    config: BasinConfig,
    graph: FlowGraph,
    segments: SecondaryMap<NodeId, Segment>,
    sources: SecondaryMap<NodeId, Source>,
    stewards: SlotMap<StewardId, Steward>,
}

// ---------------------------------------------------------------------------
// Basin serialization
// ---------------------------------------------------------------------------

impl Basin {
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = BasinSnapshotRef {
            header: SnapshotHeader::new(self.tick),
            config: &self.config,
            graph: &self.graph,
            segments: &self.segments,
            sources: &self.sources,
            stewards: &self.stewards,
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Restore a basin. Validates the header before using the payload.
    ///
    /// The event log is recreated empty; listeners and segment observers
    /// must be registered again. A snapshot of a faulted network restores
    /// faulted.
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: BasinSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        let basin = Basin::from_parts(
            snapshot.config,
            snapshot.graph,
            snapshot.segments,
            snapshot.sources,
            snapshot.stewards,
            snapshot.header.tick,
        )?;
        Ok(basin)
    }

    /// Serialize and push into `history`, evicting the oldest if full.
    pub fn take_snapshot(&self, history: &mut SnapshotHistory) -> Result<(), SerializeError> {
        let data = self.serialize()?;
        history.push(SnapshotEntry {
            tick: self.tick,
            data,
        });
        Ok(())
    }

    /// Restore the snapshot at `index` (0 = oldest) of `history`.
    pub fn restore_snapshot(
        history: &SnapshotHistory,
        index: usize,
    ) -> Result<Self, DeserializeError> {
        let entry = history
            .iter()
            .nth(index)
            .ok_or(DeserializeError::MissingSnapshot(index))?;
        Self::deserialize(&entry.data)
    }
}

// ---------------------------------------------------------------------------
// Snapshot history
// ---------------------------------------------------------------------------

/// A serialized basin and the tick it was taken at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub tick: Ticks,
    pub data: Vec<u8>,
}

/// Fixed-capacity history of snapshots; the oldest is evicted when full.
pub type SnapshotHistory = RingBuffer<SnapshotEntry>;
