//! Reference policies for the floodplain basin.
//!
//! The core only knows the [`PolicyEvaluator`] boundary. This crate supplies
//! two hand-written implementations:
//!
//! - [`PriorityRules`] proposes dike raises in configured increments and the
//!   retention basins currently on offer, then ranks candidates by one of the
//!   three cost-effectiveness metrics (see [`Ranking`]).
//! - [`Passive`] never proposes anything.
//!
//! [`Policy`] wraps both so a scenario file can name its policy.

use floodplain_core::basin::BasinView;
use floodplain_core::error::StructuralError;
use floodplain_core::fixed::{Fixed64, Volume};
use floodplain_core::id::{NodeId, StewardId};
use floodplain_core::policy::PolicyEvaluator;
use floodplain_core::protection::FloodProtection;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// The metric candidates are ranked by. Higher scores win; ties go to the
/// earlier candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    /// Capacity per unit of cost.
    CostEffectiveness,
    /// Weighted by the payer's own downstream segments.
    #[default]
    Subbasin,
    /// Weighted by every downstream segment.
    WholeBasin,
}

impl Ranking {
    pub fn score(
        self,
        candidate: &FloodProtection,
        view: &BasinView<'_>,
    ) -> Result<Fixed64, StructuralError> {
        match self {
            Ranking::CostEffectiveness => Ok(candidate.cost_effectiveness()),
            Ranking::Subbasin => candidate.subbasin_cost_effectiveness(view),
            Ranking::WholeBasin => candidate.whole_basin_cost_effectiveness(view),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("dike increment must be positive, got {0}")]
    NonPositiveIncrement(Volume),
    #[error("rules propose nothing: no dike increments and retention basins disabled")]
    Empty,
}

// ---------------------------------------------------------------------------
// Priority rules
// ---------------------------------------------------------------------------

/// Hand-written generation and ranking rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityRules {
    pub ranking: Ranking,
    /// Dike raises proposed for each segment.
    pub dike_increments: Vec<Volume>,
    /// Propose the retention basins offered on each segment.
    pub buy_retention: bool,
    /// Only propose for segments that are currently threatened.
    pub threatened_only: bool,
    /// Drop candidates the payer cannot afford, both when generating and
    /// again when selecting.
    pub affordable_only: bool,
}

impl Default for PriorityRules {
    fn default() -> Self {
        Self {
            ranking: Ranking::default(),
            dike_increments: vec![250, 500, 1_000],
            buy_retention: true,
            threatened_only: true,
            affordable_only: true,
        }
    }
}

impl PriorityRules {
    pub fn new(ranking: Ranking) -> Self {
        Self {
            ranking,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), RulesError> {
        if let Some(&bad) = self.dike_increments.iter().find(|&&d| d <= 0) {
            return Err(RulesError::NonPositiveIncrement(bad));
        }
        if self.dike_increments.is_empty() && !self.buy_retention {
            return Err(RulesError::Empty);
        }
        Ok(())
    }

    fn propose(
        &self,
        steward: StewardId,
        node: NodeId,
        view: &BasinView<'_>,
        out: &mut Vec<FloodProtection>,
    ) {
        let Some(segment) = view.segment(node) else {
            return;
        };
        if self.threatened_only && !segment.is_threatened() {
            return;
        }

        for &delta in &self.dike_increments {
            if segment.dike_capacity().saturating_add(delta) > segment.max_dike_capacity() {
                continue;
            }
            match FloodProtection::raise_dike(node, segment, steward, delta, &view.rates) {
                Ok(candidate) => out.push(candidate),
                Err(err) => debug!(%err, delta, "dike increment skipped"),
            }
        }

        if self.buy_retention {
            out.extend(
                segment
                    .retention_offers()
                    .iter()
                    .cloned()
                    .map(|basin| FloodProtection::add_retention_basin(node, steward, basin)),
            );
        }
    }

    fn affordable(&self, candidate: &FloodProtection, view: &BasinView<'_>) -> bool {
        !self.affordable_only
            || view
                .steward(candidate.payer())
                .is_some_and(|s| s.can_afford(candidate.cost()))
    }
}

impl PolicyEvaluator for PriorityRules {
    fn generate(
        &mut self,
        steward: StewardId,
        segments: &[NodeId],
        view: &BasinView<'_>,
    ) -> Result<Vec<FloodProtection>, StructuralError> {
        let mut candidates = Vec::new();
        for &node in segments {
            self.propose(steward, node, view, &mut candidates);
        }
        candidates.retain(|c| self.affordable(c, view));
        Ok(candidates)
    }

    fn select(
        &mut self,
        segment: NodeId,
        candidates: &[FloodProtection],
        view: &BasinView<'_>,
    ) -> Option<usize> {
        let mut best: Option<(usize, Fixed64)> = None;
        for (i, candidate) in candidates.iter().enumerate() {
            // Earlier purchases this tick may have drained the purse.
            if !self.affordable(candidate, view) {
                continue;
            }
            let score = match self.ranking.score(candidate, view) {
                Ok(score) => score,
                Err(err) => {
                    warn!(%err, ?segment, "candidate could not be ranked");
                    continue;
                }
            };
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| i)
    }
}

// ---------------------------------------------------------------------------
// Passive
// ---------------------------------------------------------------------------

/// Never proposes or builds anything.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passive;

impl PolicyEvaluator for Passive {
    fn generate(
        &mut self,
        _steward: StewardId,
        _segments: &[NodeId],
        _view: &BasinView<'_>,
    ) -> Result<Vec<FloodProtection>, StructuralError> {
        Ok(Vec::new())
    }

    fn select(
        &mut self,
        _segment: NodeId,
        _candidates: &[FloodProtection],
        _view: &BasinView<'_>,
    ) -> Option<usize> {
        None
    }
}

// ---------------------------------------------------------------------------
// Named policy
// ---------------------------------------------------------------------------

/// A policy chosen by name in a scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Passive,
    PriorityRules(PriorityRules),
}

impl Default for Policy {
    fn default() -> Self {
        Policy::PriorityRules(PriorityRules::default())
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), RulesError> {
        match self {
            Policy::Passive => Ok(()),
            Policy::PriorityRules(rules) => rules.validate(),
        }
    }
}

impl PolicyEvaluator for Policy {
    fn generate(
        &mut self,
        steward: StewardId,
        segments: &[NodeId],
        view: &BasinView<'_>,
    ) -> Result<Vec<FloodProtection>, StructuralError> {
        match self {
            Policy::Passive => Passive.generate(steward, segments, view),
            Policy::PriorityRules(rules) => rules.generate(steward, segments, view),
        }
    }

    fn select(
        &mut self,
        segment: NodeId,
        candidates: &[FloodProtection],
        view: &BasinView<'_>,
    ) -> Option<usize> {
        match self {
            Policy::Passive => Passive.select(segment, candidates, view),
            Policy::PriorityRules(rules) => rules.select(segment, candidates, view),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodplain_core::basin::Basin;
    use floodplain_core::config::BasinConfig;
    use floodplain_core::protection::ProtectionTag;
    use floodplain_core::rng::SimRng;
    use floodplain_core::test_utils::*;

    /// Push a reading above the 900 safe capacity of a 1000 dike.
    fn threaten(basin: &mut Basin, node: NodeId) {
        basin.segment_mut(node).unwrap().consume(&[950]);
    }

    fn calm(basin: &mut Basin, node: NodeId) {
        basin.segment_mut(node).unwrap().consume(&[100]);
    }

    fn tags(candidates: &[FloodProtection]) -> Vec<(ProtectionTag, Volume)> {
        candidates.iter().map(|c| (c.tag(), c.capacity())).collect()
    }

    #[test]
    fn proposes_only_for_threatened_segments() {
        let (mut basin, nodes, steward) = chain_basin(&["a", "b"], 10_000_000);
        threaten(&mut basin, nodes[0]);
        calm(&mut basin, nodes[1]);

        let mut rules = PriorityRules::default();
        let candidates = rules.generate(steward, &nodes, &basin.view()).unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.segment() == nodes[0]));

        rules.threatened_only = false;
        let candidates = rules.generate(steward, &nodes, &basin.view()).unwrap();
        assert_eq!(candidates.len(), 6);
    }

    #[test]
    fn increments_past_the_ceiling_are_skipped() {
        let (mut basin, nodes, steward) = chain_basin(&["a"], 10_000_000);
        threaten(&mut basin, nodes[0]);
        let rules = PriorityRules {
            dike_increments: vec![1_000, 4_000, 4_001],
            ..PriorityRules::default()
        };
        let candidates = rules
            .clone()
            .generate(steward, &nodes, &basin.view())
            .unwrap();
        assert_eq!(
            tags(&candidates),
            vec![(ProtectionTag::RaiseDike, 1_000), (ProtectionTag::RaiseDike, 4_000)]
        );
    }

    #[test]
    fn unaffordable_candidates_dropped() {
        // 1 km, both banks: 250 costs 150_000, 500 costs 200_000.
        let (mut basin, nodes, steward) = chain_basin(&["a"], 199_999);
        threaten(&mut basin, nodes[0]);
        let candidates = PriorityRules::default()
            .generate(steward, &nodes, &basin.view())
            .unwrap();
        assert_eq!(tags(&candidates), vec![(ProtectionTag::RaiseDike, 250)]);

        let lenient = PriorityRules {
            affordable_only: false,
            ..PriorityRules::default()
        };
        let candidates = lenient
            .clone()
            .generate(steward, &nodes, &basin.view())
            .unwrap();
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn retention_offers_become_candidates() {
        let (mut basin, nodes, steward) = chain_basin(&["a"], 10_000_000);
        threaten(&mut basin, nodes[0]);
        let segment = basin.segment_mut(nodes[0]).unwrap();
        segment.offer_retention_basin(retention_basin(400, 1.0));
        segment.offer_retention_basin(retention_basin(300, 2.0));

        let rules = PriorityRules {
            dike_increments: Vec::new(),
            ..PriorityRules::default()
        };
        let candidates = rules
            .clone()
            .generate(steward, &nodes, &basin.view())
            .unwrap();
        assert_eq!(
            tags(&candidates),
            vec![
                (ProtectionTag::AddRetentionBasin, 400),
                (ProtectionTag::AddRetentionBasin, 300)
            ]
        );
        assert_eq!(candidates[1].cost(), 600);
    }

    #[test]
    fn cost_effectiveness_prefers_cheap_capacity() {
        let (mut basin, nodes, steward) = chain_basin(&["a"], 10_000_000);
        threaten(&mut basin, nodes[0]);
        basin
            .segment_mut(nodes[0])
            .unwrap()
            .offer_retention_basin(retention_basin(400, 1.0));

        let mut rules = PriorityRules::new(Ranking::CostEffectiveness);
        let view = basin.view();
        let candidates = rules.generate(steward, &nodes, &view).unwrap();
        let chosen = rules.select(nodes[0], &candidates, &view).unwrap();
        assert_eq!(candidates[chosen].tag(), ProtectionTag::AddRetentionBasin);

        // Among dikes alone the fixed base cost favours the largest raise.
        let dikes: Vec<_> = candidates
            .iter()
            .filter(|c| c.tag() == ProtectionTag::RaiseDike)
            .cloned()
            .collect();
        let chosen = rules.select(nodes[0], &dikes, &view).unwrap();
        assert_eq!(dikes[chosen].capacity(), 1_000);
    }

    #[test]
    fn subbasin_ranking_weighs_threatened_reaches() {
        let (mut basin, nodes, steward) = chain_basin(&["a", "b", "c"], 10_000_000);
        threaten(&mut basin, nodes[0]);
        calm(&mut basin, nodes[1]);
        calm(&mut basin, nodes[2]);
        // 1000 m3 for 400_000; the 1000 dike costs 300_000.
        basin
            .segment_mut(nodes[0])
            .unwrap()
            .offer_retention_basin(retention_basin(1_000, 400.0));

        let rules = PriorityRules {
            dike_increments: vec![1_000],
            ..PriorityRules::new(Ranking::Subbasin)
        };
        let candidates = rules
            .clone()
            .generate(steward, &nodes[..1], &basin.view())
            .unwrap();
        assert_eq!(candidates.len(), 2);

        // Only "a" is threatened: both are credited a third of the run and
        // the dike is cheaper.
        let chosen = rules
            .clone()
            .select(nodes[0], &candidates, &basin.view())
            .unwrap();
        assert_eq!(candidates[chosen].tag(), ProtectionTag::RaiseDike);

        // With the whole run threatened the basin is credited three times.
        threaten(&mut basin, nodes[1]);
        threaten(&mut basin, nodes[2]);
        let chosen = rules
            .clone()
            .select(nodes[0], &candidates, &basin.view())
            .unwrap();
        assert_eq!(candidates[chosen].tag(), ProtectionTag::AddRetentionBasin);
    }

    #[test]
    fn select_declines_when_nothing_is_affordable() {
        let (mut basin, nodes, steward) = chain_basin(&["a"], 10_000_000);
        threaten(&mut basin, nodes[0]);
        let mut rules = PriorityRules::default();
        let candidates = rules.generate(steward, &nodes, &basin.view()).unwrap();
        assert!(!candidates.is_empty());

        basin
            .steward_mut(steward)
            .unwrap()
            .withdraw_money(10_000_000 - 1_000)
            .unwrap();
        assert_eq!(rules.select(nodes[0], &candidates, &basin.view()), None);
        assert_eq!(rules.select(nodes[0], &[], &basin.view()), None);
    }

    #[test]
    fn validation() {
        assert!(PriorityRules::default().validate().is_ok());
        let negative = PriorityRules {
            dike_increments: vec![100, -5],
            ..PriorityRules::default()
        };
        assert_eq!(negative.validate(), Err(RulesError::NonPositiveIncrement(-5)));
        let empty = PriorityRules {
            dike_increments: Vec::new(),
            buy_retention: false,
            ..PriorityRules::default()
        };
        assert_eq!(empty.validate(), Err(RulesError::Empty));
        assert!(Policy::Passive.validate().is_ok());
    }

    #[test]
    fn passive_builds_nothing() {
        let mut basin = river(4, 2, BasinConfig::default());
        let mut rng = SimRng::new(3);
        let mut policy = Policy::Passive;
        for _ in 0..10 {
            let report = basin.step(&mut rng, &mut policy).unwrap();
            assert_eq!(report.economy.candidates, 0);
            assert!(report.economy.outcomes.is_empty());
        }
    }

    #[test]
    fn rules_protect_a_flooding_river() {
        let mut basin = river(5, 2, BasinConfig::default());
        let mut rng = SimRng::new(99);
        let mut policy = Policy::default();
        let mut built = 0;
        for _ in 0..40 {
            let report = basin.step(&mut rng, &mut policy).unwrap();
            built += report.economy.built();
            assert!(report.economy.failed() == 0);
        }
        assert!(built > 0);
        assert!(basin.stewards().all(|(_, s)| s.balance() >= 0));
    }

    #[test]
    fn policy_reads_from_json() {
        let json = r#"{"priority_rules": {"ranking": "whole_basin", "dike_increments": [750]}}"#;
        let policy: Policy = serde_json::from_str(json).unwrap();
        let Policy::PriorityRules(rules) = policy else {
            panic!("expected priority rules");
        };
        assert_eq!(rules.ranking, Ranking::WholeBasin);
        assert_eq!(rules.dike_increments, vec![750]);
        assert!(rules.threatened_only);

        let passive: Policy = serde_json::from_str(r#""passive""#).unwrap();
        assert_eq!(passive, Policy::Passive);
    }
}
