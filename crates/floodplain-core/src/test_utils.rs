//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::basin::{Basin, BasinView};
use crate::config::{BasinConfig, SegmentParams};
use crate::error::StructuralError;
use crate::fixed::{Fixed64, Money, Volume, f64_to_fixed64};
use crate::id::{NodeId, StewardId};
use crate::policy::PolicyEvaluator;
use crate::protection::FloodProtection;
use crate::retention::{RetentionBasin, RetentionParams};
use crate::rng::RandomSource;

// ===========================================================================
// Values
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    f64_to_fixed64(v)
}

/// 1 km segment with a 0.9 safety factor and a 5000 dike ceiling.
pub fn segment_params(dike_capacity: Volume, min_discharge: Volume) -> SegmentParams {
    SegmentParams {
        length: Fixed64::ONE,
        dike_capacity,
        max_dike_capacity: dike_capacity.max(5_000),
        retainable: 0,
        min_discharge,
        natural_dike: false,
        safety_factor: fixed(0.9),
    }
}

pub fn retention_basin(capacity: Volume, cost_per_unit: f64) -> RetentionBasin {
    RetentionBasin::new(capacity, fixed(cost_per_unit)).unwrap()
}

/// Default config with retention offers switched off.
pub fn no_offers_config() -> BasinConfig {
    BasinConfig {
        retention: RetentionParams {
            probability: 0.0,
            ..RetentionParams::default()
        },
        ..BasinConfig::default()
    }
}

// ===========================================================================
// Basin builders
// ===========================================================================

/// A linear chain `names[0] -> names[1] -> ...` of 1 km segments with dike
/// capacity 1000, all owned by one steward named "steward" holding
/// `balance`. Retention offers are switched off.
pub fn chain_basin(names: &[&str], balance: Money) -> (Basin, Vec<NodeId>, StewardId) {
    let mut basin = Basin::new(no_offers_config()).unwrap();
    let steward = basin.add_steward("steward", balance);
    let nodes: Vec<NodeId> = names
        .iter()
        .map(|&name| basin.add_segment(name, segment_params(1_000, 0)).unwrap())
        .collect();
    for pair in nodes.windows(2) {
        basin.connect(pair[0], pair[1]).unwrap();
    }
    for &node in &nodes {
        basin.assign_owner(node, steward).unwrap();
    }
    (basin, nodes, steward)
}

/// A source feeding a chain of `length` segments, each owned by one of
/// `stewards` round-robin. Segments are named `s000`, `s001`, ...
pub fn river(length: usize, stewards: usize, config: BasinConfig) -> Basin {
    let mut basin = Basin::new(config).unwrap();
    let owners: Vec<StewardId> = (0..stewards.max(1))
        .map(|i| basin.add_steward(format!("steward-{i}"), 1_000_000))
        .collect();
    let mut upstream = basin.add_source("headwater", 600.0, 250.0).unwrap();
    for i in 0..length {
        let node = basin
            .add_segment(format!("s{i:03}"), segment_params(1_000, 100))
            .unwrap();
        basin.connect(upstream, node).unwrap();
        basin.assign_owner(node, owners[i % owners.len()]).unwrap();
        upstream = node;
    }
    basin
}

// ===========================================================================
// Random sources
// ===========================================================================

/// A [`RandomSource`] that replays scripted values, cycling when exhausted.
///
/// `uniform` returns the next scripted uniform; `normal(mean, stddev)`
/// returns `mean + stddev * z` for the next scripted `z`.
#[derive(Debug, Clone)]
pub struct ScriptedRng {
    uniforms: Vec<f64>,
    normals: Vec<f64>,
    next_uniform: usize,
    next_normal: usize,
}

impl ScriptedRng {
    pub fn new(uniforms: Vec<f64>, normals: Vec<f64>) -> Self {
        Self {
            uniforms,
            normals,
            next_uniform: 0,
            next_normal: 0,
        }
    }

    fn cycle(values: &[f64], cursor: &mut usize) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let v = values[*cursor % values.len()];
        *cursor += 1;
        v
    }
}

impl RandomSource for ScriptedRng {
    fn uniform(&mut self) -> f64 {
        Self::cycle(&self.uniforms, &mut self.next_uniform)
    }

    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let span = (hi - lo + 1) as f64;
        (lo + (self.uniform() * span) as i64).min(hi)
    }

    fn normal(&mut self, mean: f64, stddev: f64) -> f64 {
        mean + stddev * Self::cycle(&self.normals, &mut self.next_normal)
    }
}

// ===========================================================================
// Policies
// ===========================================================================

/// Proposes nothing; selects the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DoNothing;

impl PolicyEvaluator for DoNothing {
    fn generate(
        &mut self,
        _steward: StewardId,
        _segments: &[NodeId],
        _view: &BasinView<'_>,
    ) -> Result<Vec<FloodProtection>, StructuralError> {
        Ok(Vec::new())
    }
}

/// Proposes raising every owned segment's dike by a fixed amount.
#[derive(Debug, Clone)]
pub struct RaiseEverywhere {
    delta: Volume,
    decline: bool,
}

impl RaiseEverywhere {
    pub fn new(delta: Volume) -> Self {
        Self {
            delta,
            decline: false,
        }
    }

    /// Proposes as usual but never selects anything.
    pub fn declining(mut self) -> Self {
        self.decline = true;
        self
    }
}

impl PolicyEvaluator for RaiseEverywhere {
    fn generate(
        &mut self,
        steward: StewardId,
        segments: &[NodeId],
        view: &BasinView<'_>,
    ) -> Result<Vec<FloodProtection>, StructuralError> {
        Ok(segments
            .iter()
            .filter_map(|&node| {
                let segment = view.segment(node)?;
                FloodProtection::raise_dike(node, segment, steward, self.delta, &view.rates).ok()
            })
            .collect())
    }

    fn select(
        &mut self,
        _segment: NodeId,
        candidates: &[FloodProtection],
        _view: &BasinView<'_>,
    ) -> Option<usize> {
        if self.decline || candidates.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// Generates with a closure; selects the first candidate.
pub struct Scripted<F> {
    generate: F,
}

impl<F> Scripted<F>
where
    F: FnMut(StewardId, &[NodeId], &BasinView<'_>) -> Vec<FloodProtection>,
{
    pub fn new(generate: F) -> Self {
        Self { generate }
    }
}

impl<F> PolicyEvaluator for Scripted<F>
where
    F: FnMut(StewardId, &[NodeId], &BasinView<'_>) -> Vec<FloodProtection>,
{
    fn generate(
        &mut self,
        steward: StewardId,
        segments: &[NodeId],
        view: &BasinView<'_>,
    ) -> Result<Vec<FloodProtection>, StructuralError> {
        Ok((self.generate)(steward, segments, view))
    }
}
