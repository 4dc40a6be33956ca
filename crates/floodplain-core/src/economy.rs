//! The steward economic cycle.
//!
//! Each tick every steward runs two phases:
//!
//! 1. **Generate** -- the policy evaluator proposes candidates, which are
//!    attached to the segments they target.
//! 2. **Choose** -- for each owned segment with candidates, the evaluator
//!    selects one, it is executed, and the segment's list is cleared.
//!
//! [`EconomicScheduler`] runs phase 1 for every steward before any steward
//! starts phase 2. A failed execution only affects its own segment and
//! steward; the pass carries on.

use tracing::{info, warn};

use crate::basin::{Basin, BasinView};
use crate::error::StructuralError;
use crate::event::Event;
use crate::id::{NodeId, StewardId};
use crate::policy::PolicyEvaluator;
use crate::protection::FloodProtection;
use crate::sim::{ActionOutcome, EconomicReport};

/// Candidates attached and refused during one steward's generate phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generated {
    pub attached: usize,
    pub rejected: usize,
}

impl Basin {
    /// Phase 1 for one steward: ask `evaluator` for candidates and attach
    /// each to its segment.
    ///
    /// Candidates paid by another steward or targeting a segment the
    /// steward does not own are dropped with a `CandidateRejected` event.
    pub fn generate_possible_actions(
        &mut self,
        steward: StewardId,
        evaluator: &mut dyn PolicyEvaluator,
    ) -> Result<Generated, StructuralError> {
        if !self.stewards.contains_key(steward) {
            return Err(StructuralError::UnknownSteward(steward));
        }
        let owned = self.graph.segments_of(steward);
        let candidates = evaluator.generate(steward, &owned, &self.view())?;

        let mut generated = Generated::default();
        for candidate in candidates {
            let target = candidate.segment();
            let valid = candidate.payer() == steward && owned.contains(&target);
            let segment = if valid { self.segments.get_mut(target) } else { None };
            let Some(segment) = segment else {
                warn!(
                    ?steward,
                    segment = ?target,
                    payer = ?candidate.payer(),
                    "candidate outside the steward's segments rejected"
                );
                self.events.emit(Event::CandidateRejected {
                    segment: target,
                    steward,
                    tick: self.tick,
                });
                generated.rejected += 1;
                continue;
            };
            segment.add_possible_action(candidate);
            generated.attached += 1;
        }
        Ok(generated)
    }

    /// Phase 2 for one steward: for each owned segment with candidates,
    /// execute the one `evaluator` selects and clear the list.
    ///
    /// Economic failures are recorded as [`ActionOutcome::Failed`] and do
    /// not stop the remaining segments.
    pub fn choose_actions(
        &mut self,
        steward: StewardId,
        evaluator: &mut dyn PolicyEvaluator,
    ) -> Result<Vec<ActionOutcome>, StructuralError> {
        if !self.stewards.contains_key(steward) {
            return Err(StructuralError::UnknownSteward(steward));
        }
        let mut outcomes = Vec::new();
        for segment_id in self.graph.segments_of(steward) {
            let Some(segment) = self.segments.get_mut(segment_id) else {
                continue;
            };
            let candidates = segment.take_possible_actions();
            if candidates.is_empty() {
                continue;
            }

            let choice = evaluator.select(segment_id, &candidates, &self.view());
            let Some(protection) = choice.and_then(|i| candidates.into_iter().nth(i)) else {
                outcomes.push(ActionOutcome::Declined {
                    segment: segment_id,
                    steward,
                });
                continue;
            };

            outcomes.push(self.commit(segment_id, steward, protection));
        }
        Ok(outcomes)
    }

    fn commit(
        &mut self,
        segment_id: NodeId,
        steward: StewardId,
        protection: FloodProtection,
    ) -> ActionOutcome {
        let (kind, capacity, cost) = (protection.tag(), protection.capacity(), protection.cost());
        let tick = self.tick;
        let (Some(segment), Some(payer)) = (
            self.segments.get_mut(segment_id),
            self.stewards.get_mut(steward),
        ) else {
            return ActionOutcome::Declined {
                segment: segment_id,
                steward,
            };
        };

        match protection.execute(segment, payer) {
            Ok(()) => {
                info!(?steward, segment = ?segment_id, ?kind, capacity, cost, "protection built");
                self.events.emit(Event::ProtectionBuilt {
                    segment: segment_id,
                    steward,
                    kind,
                    capacity,
                    cost,
                    tick,
                });
                ActionOutcome::Built {
                    segment: segment_id,
                    steward,
                    kind,
                    capacity,
                    cost,
                }
            }
            Err(error) => {
                warn!(?steward, segment = ?segment_id, ?kind, %error, "protection not built");
                self.events.emit(Event::ProtectionFailed {
                    segment: segment_id,
                    steward,
                    kind,
                    error,
                    tick,
                });
                ActionOutcome::Failed {
                    segment: segment_id,
                    steward,
                    kind,
                    error,
                }
            }
        }
    }
}

/// Drives the two-phase cycle for every steward with a barrier between
/// the phases.
#[derive(Debug, Clone, Copy, Default)]
pub struct EconomicScheduler;

impl EconomicScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Stewards in processing order: by name, then by key.
    pub fn steward_order(view: &BasinView<'_>) -> Vec<StewardId> {
        let mut order: Vec<(&str, StewardId)> = view
            .stewards
            .iter()
            .map(|(id, steward)| (steward.name(), id))
            .collect();
        order.sort();
        order.into_iter().map(|(_, id)| id).collect()
    }

    pub fn run(
        &self,
        basin: &mut Basin,
        evaluator: &mut dyn PolicyEvaluator,
    ) -> Result<EconomicReport, StructuralError> {
        let stewards = Self::steward_order(&basin.view());
        let mut report = EconomicReport {
            tick: basin.tick(),
            ..EconomicReport::default()
        };

        for &steward in &stewards {
            let generated = basin.generate_possible_actions(steward, evaluator)?;
            report.candidates += generated.attached;
            report.rejected += generated.rejected;
        }
        for &steward in &stewards {
            report.outcomes.extend(basin.choose_actions(steward, evaluator)?);
        }
        Ok(report)
    }
}
