//! Typed basin events with a bounded history.
//!
//! Events are recorded as they happen during a tick and delivered
//! synchronously to passive listeners. The log keeps the most recent events
//! in a ring buffer; older ones are dropped.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventLog::suppress`]. Suppressed
//! events are neither recorded nor delivered.

use crate::error::EconomicError;
use crate::fixed::{Money, Ticks, Volume};
use crate::id::{NodeId, StewardId};
use crate::protection::ProtectionTag;
use crate::ring::{RingBuffer, RingIter};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A basin event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Flow pass --
    StipendPaid {
        steward: StewardId,
        segment: NodeId,
        amount: Money,
        tick: Ticks,
    },
    BasinOffered {
        segment: NodeId,
        capacity: Volume,
        cost: Money,
        tick: Ticks,
    },

    // -- Economic pass --
    ProtectionBuilt {
        segment: NodeId,
        steward: StewardId,
        kind: ProtectionTag,
        capacity: Volume,
        cost: Money,
        tick: Ticks,
    },
    ProtectionFailed {
        segment: NodeId,
        steward: StewardId,
        kind: ProtectionTag,
        error: EconomicError,
        tick: Ticks,
    },
    CandidateRejected {
        segment: NodeId,
        steward: StewardId,
        tick: Ticks,
    },

    // -- Topology --
    OrderRecomputed {
        nodes: usize,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StipendPaid,
    BasinOffered,
    ProtectionBuilt,
    ProtectionFailed,
    CandidateRejected,
    OrderRecomputed,
}

const EVENT_KIND_COUNT: usize = 6;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StipendPaid { .. } => EventKind::StipendPaid,
            Event::BasinOffered { .. } => EventKind::BasinOffered,
            Event::ProtectionBuilt { .. } => EventKind::ProtectionBuilt,
            Event::ProtectionFailed { .. } => EventKind::ProtectionFailed,
            Event::CandidateRejected { .. } => EventKind::CandidateRejected,
            Event::OrderRecomputed { .. } => EventKind::OrderRecomputed,
        }
    }

    pub fn tick(&self) -> Ticks {
        match self {
            Event::StipendPaid { tick, .. }
            | Event::BasinOffered { tick, .. }
            | Event::ProtectionBuilt { tick, .. }
            | Event::ProtectionFailed { tick, .. }
            | Event::CandidateRejected { tick, .. }
            | Event::OrderRecomputed { tick, .. } => *tick,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

struct ListenerEntry {
    /// `None` listens to every kind.
    kind: Option<EventKind>,
    listener: PassiveListener,
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Default number of events kept in the history.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

pub struct EventLog {
    history: RingBuffer<Event>,
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: Vec<ListenerEntry>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("history", &self.history)
            .field("suppressed", &self.suppressed)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    /// Create a log keeping at most `capacity` events (0 is clamped to 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            history: RingBuffer::new(capacity),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Vec::new(),
        }
    }

    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event and deliver it to matching listeners in registration
    /// order. No-ops if the kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let kind = event.kind();
        if self.suppressed[kind.index()] {
            return;
        }
        for entry in &mut self.listeners {
            if entry.kind.is_none_or(|k| k == kind) {
                (entry.listener)(&event);
            }
        }
        self.history.push(event);
    }

    /// Register a listener for one event kind.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.listeners.push(ListenerEntry {
            kind: Some(kind),
            listener,
        });
    }

    /// Register a listener for every event kind.
    pub fn on_any(&mut self, listener: PassiveListener) {
        self.listeners.push(ListenerEntry {
            kind: None,
            listener,
        });
    }

    /// Iterate over recorded events, oldest first.
    pub fn iter(&self) -> RingIter<'_, Event> {
        self.history.iter()
    }

    /// Recorded events of one kind, oldest first.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.history.iter().filter(move |e| e.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Total events recorded since creation, including dropped ones.
    pub fn total_written(&self) -> u64 {
        self.history.total_written()
    }

    /// Change the history capacity, keeping the most recent events.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.history.resize(capacity);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ids() -> (NodeId, StewardId) {
        let mut nodes: SlotMap<NodeId, ()> = SlotMap::with_key();
        let mut stewards: SlotMap<StewardId, ()> = SlotMap::with_key();
        (nodes.insert(()), stewards.insert(()))
    }

    fn stipend(tick: Ticks) -> Event {
        let (segment, steward) = ids();
        Event::StipendPaid {
            steward,
            segment,
            amount: 100,
            tick,
        }
    }

    #[test]
    fn emit_records_in_order() {
        let mut log = EventLog::new(8);
        for tick in 0..3 {
            log.emit(stipend(tick));
        }
        let ticks: Vec<Ticks> = log.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![0, 1, 2]);
    }

    #[test]
    fn history_drops_oldest() {
        let mut log = EventLog::new(2);
        for tick in 0..5 {
            log.emit(stipend(tick));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.total_written(), 5);
        let ticks: Vec<Ticks> = log.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![3, 4]);
    }

    #[test]
    fn suppressed_kind_is_not_recorded_or_delivered() {
        let mut log = EventLog::new(8);
        let seen = Rc::new(RefCell::new(0));
        let counter = seen.clone();
        log.on_any(Box::new(move |_| *counter.borrow_mut() += 1));

        log.suppress(EventKind::StipendPaid);
        assert!(log.is_suppressed(EventKind::StipendPaid));
        log.emit(stipend(0));
        log.emit(Event::OrderRecomputed { nodes: 3, tick: 0 });

        assert_eq!(*seen.borrow(), 1);
        assert_eq!(log.len(), 1);

        log.unsuppress(EventKind::StipendPaid);
        log.emit(stipend(1));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn kind_listener_filters() {
        let mut log = EventLog::new(8);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        log.on_passive(
            EventKind::OrderRecomputed,
            Box::new(move |e| sink.borrow_mut().push(e.tick())),
        );

        log.emit(stipend(0));
        log.emit(Event::OrderRecomputed { nodes: 1, tick: 4 });

        assert_eq!(*seen.borrow(), vec![4]);
        assert_eq!(log.of_kind(EventKind::StipendPaid).count(), 1);
    }

    #[test]
    fn shrinking_keeps_latest() {
        let mut log = EventLog::new(4);
        for tick in 0..4 {
            log.emit(stipend(tick));
        }
        log.set_capacity(2);
        let ticks: Vec<Ticks> = log.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![2, 3]);
    }
}
