//! The boundary to whatever decides which protections stewards consider.

use crate::basin::BasinView;
use crate::error::StructuralError;
use crate::id::{NodeId, StewardId};
use crate::protection::FloodProtection;

/// Generates and ranks flood-protection candidates for stewards.
///
/// Any implementation satisfying these two calls is a valid policy, from a
/// fixed table to a full rule engine.
pub trait PolicyEvaluator {
    /// Propose candidates for `steward`, who owns `segments`.
    ///
    /// Each candidate names the segment it targets. Candidates for segments
    /// outside `segments`, or paid by anyone but `steward`, are discarded by
    /// the caller.
    fn generate(
        &mut self,
        steward: StewardId,
        segments: &[NodeId],
        view: &BasinView<'_>,
    ) -> Result<Vec<FloodProtection>, StructuralError>;

    /// Pick the candidate to build on `segment`, by index into
    /// `candidates`. `None` builds nothing. Defaults to the first.
    fn select(
        &mut self,
        segment: NodeId,
        candidates: &[FloodProtection],
        view: &BasinView<'_>,
    ) -> Option<usize> {
        let _ = (segment, view);
        if candidates.is_empty() { None } else { Some(0) }
    }
}
