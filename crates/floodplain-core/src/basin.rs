//! The basin aggregate and its per-tick pipeline.
//!
//! A [`Basin`] owns the flow network, per-node hydrology, stewards, the
//! retention catalog, configuration and the cached processing order. Each
//! call to [`Basin::step`] runs two passes that never interleave:
//!
//! 1. **Flow** -- every node, in topological order, consumes the discharge
//!    of its predecessors. Segments then pay their owner a stipend and
//!    request one retention-basin offer.
//! 2. **Economy** -- every steward generates candidates, then (after all
//!    stewards have generated) every steward commits at most one candidate
//!    per owned segment. See [`crate::economy`].
//!
//! The random source and policy evaluator are passed in per call.

use slotmap::{SecondaryMap, SlotMap};
use tracing::{debug, error};

use crate::config::{BasinConfig, CostRates, SegmentParams};
use crate::economy::EconomicScheduler;
use crate::error::{BasinError, ConfigError, StructuralError};
use crate::event::{Event, EventLog};
use crate::fixed::{Money, Ticks, Volume};
use crate::graph::{EdgeData, FlowGraph, NodeKind};
use crate::id::{EdgeId, NodeId, StewardId};
use crate::policy::PolicyEvaluator;
use crate::protection::FloodProtection;
use crate::retention::RetentionBasinCatalog;
use crate::rng::RandomSource;
use crate::scheduler::TopologyScheduler;
use crate::segment::{Segment, Source};
use crate::sim::{FlowReport, StateHash, TickReport};
use crate::steward::Steward;

// ---------------------------------------------------------------------------
// Read-only view
// ---------------------------------------------------------------------------

/// Borrowed, read-only view of everything ranking metrics and policies need.
#[derive(Debug, Clone, Copy)]
pub struct BasinView<'a> {
    pub graph: &'a FlowGraph,
    pub segments: &'a SecondaryMap<NodeId, Segment>,
    pub sources: &'a SecondaryMap<NodeId, Source>,
    pub stewards: &'a SlotMap<StewardId, Steward>,
    pub config: &'a BasinConfig,
    pub rates: CostRates,
}

impl<'a> BasinView<'a> {
    pub fn segment(&self, node: NodeId) -> Option<&'a Segment> {
        self.segments.get(node)
    }

    pub fn steward(&self, steward: StewardId) -> Option<&'a Steward> {
        self.stewards.get(steward)
    }

    pub fn segments_of(&self, steward: StewardId) -> Vec<NodeId> {
        self.graph.segments_of(steward)
    }

    pub fn name_of(&self, node: NodeId) -> &'a str {
        node_name(self.segments, self.sources, node)
    }
}

fn node_name<'a>(
    segments: &'a SecondaryMap<NodeId, Segment>,
    sources: &'a SecondaryMap<NodeId, Source>,
    node: NodeId,
) -> &'a str {
    segments
        .get(node)
        .map(Segment::name)
        .or_else(|| sources.get(node).map(Source::name))
        .unwrap_or("")
}

// ---------------------------------------------------------------------------
// Basin
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Basin {
    pub(crate) graph: FlowGraph,
    pub(crate) segments: SecondaryMap<NodeId, Segment>,
    pub(crate) sources: SecondaryMap<NodeId, Source>,
    pub(crate) stewards: SlotMap<StewardId, Steward>,
    catalog: RetentionBasinCatalog,
    pub(crate) config: BasinConfig,
    rates: CostRates,
    scheduler: TopologyScheduler,
    pub(crate) events: EventLog,
    pub(crate) tick: Ticks,
}

impl Basin {
    pub fn new(config: BasinConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            graph: FlowGraph::new(),
            segments: SecondaryMap::new(),
            sources: SecondaryMap::new(),
            stewards: SlotMap::with_key(),
            catalog: RetentionBasinCatalog::new(config.retention.clone())?,
            rates: config.cost_rates(),
            config,
            scheduler: TopologyScheduler::new(),
            events: EventLog::default(),
            tick: 0,
        })
    }

    /// Reassemble a basin from restored parts and recompute its order.
    pub(crate) fn from_parts(
        config: BasinConfig,
        graph: FlowGraph,
        segments: SecondaryMap<NodeId, Segment>,
        sources: SecondaryMap<NodeId, Source>,
        stewards: SlotMap<StewardId, Steward>,
        tick: Ticks,
    ) -> Result<Self, ConfigError> {
        let mut basin = Self::new(config)?;
        basin.graph = graph;
        basin.segments = segments;
        basin.sources = sources;
        basin.stewards = stewards;
        basin.tick = tick;
        if let Err(err) = basin.recompute_order() {
            error!(%err, "restored flow network is invalid");
        }
        Ok(basin)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &BasinConfig {
        &self.config
    }

    pub fn rates(&self) -> CostRates {
        self.rates
    }

    pub fn catalog(&self) -> &RetentionBasinCatalog {
        &self.catalog
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> Ticks {
        self.tick
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    pub fn scheduler(&self) -> &TopologyScheduler {
        &self.scheduler
    }

    /// The cached processing order, or the structural fault preventing one.
    pub fn order(&self) -> Result<&[NodeId], StructuralError> {
        self.scheduler.order()
    }

    pub fn view(&self) -> BasinView<'_> {
        BasinView {
            graph: &self.graph,
            segments: &self.segments,
            sources: &self.sources,
            stewards: &self.stewards,
            config: &self.config,
            rates: self.rates,
        }
    }

    pub fn segment(&self, node: NodeId) -> Option<&Segment> {
        self.segments.get(node)
    }

    pub fn segment_mut(&mut self, node: NodeId) -> Option<&mut Segment> {
        self.segments.get_mut(node)
    }

    pub fn source(&self, node: NodeId) -> Option<&Source> {
        self.sources.get(node)
    }

    pub fn source_mut(&mut self, node: NodeId) -> Option<&mut Source> {
        self.sources.get_mut(node)
    }

    pub fn steward(&self, steward: StewardId) -> Option<&Steward> {
        self.stewards.get(steward)
    }

    pub fn steward_mut(&mut self, steward: StewardId) -> Option<&mut Steward> {
        self.stewards.get_mut(steward)
    }

    pub fn segments(&self) -> impl Iterator<Item = (NodeId, &Segment)> {
        self.segments.iter()
    }

    pub fn sources(&self) -> impl Iterator<Item = (NodeId, &Source)> {
        self.sources.iter()
    }

    pub fn stewards(&self) -> impl Iterator<Item = (StewardId, &Steward)> {
        self.stewards.iter()
    }

    pub fn find_segment(&self, name: &str) -> Option<NodeId> {
        self.segments
            .iter()
            .find(|(_, s)| s.name() == name)
            .map(|(id, _)| id)
    }

    pub fn find_source(&self, name: &str) -> Option<NodeId> {
        self.sources
            .iter()
            .find(|(_, s)| s.name() == name)
            .map(|(id, _)| id)
    }

    pub fn find_steward(&self, name: &str) -> Option<StewardId> {
        self.stewards
            .iter()
            .find(|(_, s)| s.name() == name)
            .map(|(id, _)| id)
    }

    // -----------------------------------------------------------------------
    // Network construction
    // -----------------------------------------------------------------------

    pub fn add_segment(
        &mut self,
        name: impl Into<String>,
        params: SegmentParams,
    ) -> Result<NodeId, ConfigError> {
        let segment = Segment::new(
            name,
            params,
            self.config.history_length,
            self.config.threat_rule,
        )?;
        let node = self.graph.add_node(NodeKind::Segment);
        self.segments.insert(node, segment);
        self.refresh_after_node_change();
        Ok(node)
    }

    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        mean: f64,
        stddev: f64,
    ) -> Result<NodeId, ConfigError> {
        let source = Source::new(name, mean, stddev)?;
        let node = self.graph.add_node(NodeKind::Source);
        self.sources.insert(node, source);
        self.refresh_after_node_change();
        Ok(node)
    }

    pub fn add_steward(&mut self, name: impl Into<String>, balance: Money) -> StewardId {
        self.stewards.insert(Steward::new(name, balance))
    }

    /// Remove a segment or source with its edges and ownership.
    pub fn remove_node(&mut self, node: NodeId) -> Result<bool, StructuralError> {
        if !self.graph.remove_node(node) {
            return Ok(false);
        }
        self.segments.remove(node);
        self.sources.remove(node);
        self.recompute_order()?;
        Ok(true)
    }

    /// Add a flow edge `from -> to` and recompute the order.
    ///
    /// If the edge breaks the network (cycle or second outflow) the edge
    /// stays, the error is returned, and every tick fails with it until the
    /// edge is removed again.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, StructuralError> {
        let edge = self.graph.connect(from, to)?;
        self.recompute_order()?;
        Ok(edge)
    }

    /// Remove a flow edge and recompute the order. Returns the removed
    /// edge, or `None` if it did not exist.
    pub fn disconnect(&mut self, edge: EdgeId) -> Result<Option<EdgeData>, StructuralError> {
        let removed = self.graph.disconnect(edge);
        if removed.is_some() {
            self.recompute_order()?;
        }
        Ok(removed)
    }

    pub fn assign_owner(
        &mut self,
        segment: NodeId,
        steward: StewardId,
    ) -> Result<(), StructuralError> {
        if !self.stewards.contains_key(steward) {
            return Err(StructuralError::UnknownSteward(steward));
        }
        self.graph.assign_owner(segment, steward)
    }

    pub fn release_owner(&mut self, segment: NodeId) -> Option<StewardId> {
        self.graph.release_owner(segment)
    }

    /// Change the rolling-history length of every segment. Takes effect at
    /// each segment's next consume.
    pub fn set_history_length(&mut self, length: usize) -> Result<(), ConfigError> {
        if length == 0 {
            return Err(ConfigError::InvalidHistoryLength(length));
        }
        for (_, segment) in self.segments.iter_mut() {
            segment.set_history_length(length)?;
        }
        self.config.history_length = length;
        Ok(())
    }

    fn refresh_after_node_change(&mut self) {
        if let Err(err) = self.recompute_order() {
            debug!(%err, "flow network still invalid after adding a node");
        }
    }

    /// Drain pending graph changes and recompute the cached order.
    fn recompute_order(&mut self) -> Result<(), StructuralError> {
        let changes = self.graph.drain_changes();
        let segments = &self.segments;
        let sources = &self.sources;
        let result = self
            .scheduler
            .refresh(&self.graph, |node| node_name(segments, sources, node))
            .map(<[NodeId]>::len);
        match result {
            Ok(nodes) => {
                debug!(nodes, changes = changes.len(), "flow order recomputed");
                self.events.emit(Event::OrderRecomputed {
                    nodes,
                    tick: self.tick,
                });
                Ok(())
            }
            Err(err) => {
                error!(%err, "flow network is invalid");
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tick pipeline
    // -----------------------------------------------------------------------

    /// Run one full tick: the flow pass, then the economic pass.
    pub fn step(
        &mut self,
        rng: &mut dyn RandomSource,
        evaluator: &mut dyn PolicyEvaluator,
    ) -> Result<TickReport, StructuralError> {
        let flow = self.flow_tick(rng)?;
        let economy = EconomicScheduler::new().run(self, evaluator)?;
        self.tick += 1;
        Ok(TickReport {
            flow,
            economy,
            hash: self.state_hash(),
        })
    }

    /// Feed every node in topological order, then settle each segment's
    /// stipend and retention offer.
    ///
    /// Fails with the scheduler's fault if the network is invalid; nothing
    /// is mutated in that case.
    pub fn flow_tick(&mut self, rng: &mut dyn RandomSource) -> Result<FlowReport, StructuralError> {
        let order = match self.scheduler.take_order() {
            Ok(order) => order,
            Err(err) => {
                error!(%err, tick = self.tick, "flow pass aborted");
                return Err(err);
            }
        };

        let mut report = FlowReport {
            tick: self.tick,
            nodes: order.len(),
            ..FlowReport::default()
        };
        let mut upstream: Vec<Volume> = Vec::new();

        for &node in &order {
            upstream.clear();
            for pred in self.graph.predecessors(node) {
                if let Some(segment) = self.segments.get(pred) {
                    upstream.push(segment.discharge());
                } else if let Some(source) = self.sources.get(pred) {
                    upstream.push(source.discharge());
                }
            }

            if let Some(source) = self.sources.get_mut(node) {
                source.consume(rng);
                continue;
            }
            let Some(segment) = self.segments.get_mut(node) else {
                continue;
            };
            segment.consume(&upstream);
            if segment.overflow() > 0 {
                report.overflowing.push(node);
            }
            self.settle(node, rng, &mut report);
        }

        self.scheduler.restore_order(order);
        debug!(
            tick = report.tick,
            stipends = report.stipends,
            offers = report.offers_kept,
            overflowing = report.overflowing.len(),
            "flow pass settled"
        );
        Ok(report)
    }

    /// Pay the segment's owner and request one retention offer.
    fn settle(&mut self, node: NodeId, rng: &mut dyn RandomSource, report: &mut FlowReport) {
        if let Some(owner) = self.graph.owner_of(node) {
            if let Some(steward) = self.stewards.get_mut(owner) {
                let amount = self.config.steward_payment;
                steward.deposit_money(amount);
                report.stipends += 1;
                report.stipend_total += amount;
                self.events.emit(Event::StipendPaid {
                    steward: owner,
                    segment: node,
                    amount,
                    tick: self.tick,
                });
            }
        }

        let Some(offer) = self.catalog.offer(rng) else {
            return;
        };
        let (capacity, cost) = (offer.capacity(), offer.cost());
        let Some(segment) = self.segments.get_mut(node) else {
            return;
        };
        if segment.offer_retention_basin(offer) {
            report.offers_kept += 1;
            self.events.emit(Event::BasinOffered {
                segment: node,
                capacity,
                cost,
                tick: self.tick,
            });
        } else {
            report.offers_dropped += 1;
        }
    }

    /// Build a protection outside the economic pass.
    pub fn execute(&mut self, protection: FloodProtection) -> Result<(), BasinError> {
        let segment = self
            .segments
            .get_mut(protection.segment())
            .ok_or(StructuralError::UnknownNode(protection.segment()))?;
        let payer = self
            .stewards
            .get_mut(protection.payer())
            .ok_or(StructuralError::UnknownSteward(protection.payer()))?;
        protection.execute(segment, payer)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Digest of hydrology, protections and balances.
    pub fn state_hash(&self) -> u64 {
        let mut hash = StateHash::new();
        hash.write_u64(self.tick);
        for (_, segment) in self.segments.iter() {
            hash.write(segment.name().as_bytes());
            hash.write_i64(segment.inflow());
            hash.write_i64(segment.retained());
            hash.write_i64(segment.overflow());
            hash.write_i64(segment.discharge());
            hash.write_i64(segment.dike_capacity());
            hash.write_i64(segment.retainable());
            hash.write_u64(segment.retention_offers().len() as u64);
        }
        for (_, source) in self.sources.iter() {
            hash.write_i64(source.discharge());
        }
        for (_, steward) in self.stewards.iter() {
            hash.write_i64(steward.balance());
        }
        hash.finish()
    }
}
