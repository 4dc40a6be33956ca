//! Floodplain Core -- an agent-based simulation of a river basin's
//! flood-protection economy.
//!
//! A directed network of river segments carries stochastic discharge
//! downstream. Stewards own segments, receive a stipend for each one every
//! tick, and invest in flood defences (raising dikes, adding retention
//! basins), trading construction cost against flood-risk reduction.
//!
//! # Tick Pipeline
//!
//! Each call to [`basin::Basin::step`] advances the basin by one tick:
//!
//! 1. **Flow** -- nodes are visited in cached topological order. Sources
//!    draw their discharge; segments sum their predecessors' discharge and
//!    recompute inflow, retained, overflow and discharge. Each segment then
//!    pays its owner and requests one retention-basin offer.
//! 2. **Generate** -- every steward's policy evaluator proposes candidate
//!    protections, attached to the segments they target.
//! 3. **Choose** -- once every steward has generated, each steward builds
//!    the selected candidate on each of its segments.
//! 4. **Bookkeeping** -- increment the tick counter and compute the state hash.
//!
//! # Key Types
//!
//! - [`basin::Basin`] -- Owning aggregate and pipeline orchestrator.
//! - [`graph::FlowGraph`] -- Directed segment network plus segment ownership.
//! - [`scheduler::TopologyScheduler`] -- Name-deterministic topological order.
//! - [`segment::Segment`] -- Water balance and rolling-history threat detection.
//! - [`protection::FloodProtection`] -- Priced investments and their ranking
//!   metrics.
//! - [`steward::Steward`] -- Economic agent with a balance.
//! - [`policy::PolicyEvaluator`] -- Boundary to candidate generation/selection.
//! - [`rng::RandomSource`] -- Boundary to uniform and normal draws.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`serialize`] -- Versioned snapshots via bitcode.

pub mod basin;
pub mod config;
pub mod economy;
pub mod error;
pub mod event;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod observe;
pub mod policy;
pub mod protection;
pub mod retention;
pub mod ring;
pub mod rng;
pub mod scheduler;
pub mod segment;
pub mod serialize;
pub mod sim;
pub mod steward;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
