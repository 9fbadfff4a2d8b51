//! Result slots with submission-order supersession.
//!
//! Every submission for a target draws the next sequence number from
//! [`ResultSlot::begin`]. When a job settles, by publishing a value or by
//! failing, it is accepted only if no later-submitted job for the same target
//! has settled before it. The visible value therefore follows submission
//! order, whatever order the jobs finish in.

use crate::core::types::{Sequence, TargetId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct SlotState<T> {
    /// Highest sequence handed out by `begin`.
    issued: Sequence,
    /// Highest sequence that has settled.
    settled: Sequence,
    current: Option<(Sequence, Arc<T>)>,
}

impl<T> Default for SlotState<T> {
    fn default() -> Self {
        Self {
            issued: 0,
            settled: 0,
            current: None,
        }
    }
}

/// Per-target holder of the most recently submitted settled value.
#[derive(Debug)]
pub struct ResultSlot<T> {
    slots: Mutex<HashMap<TargetId, SlotState<T>>>,
}

impl<T> ResultSlot<T> {
    /// Create an empty set of slots.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Issue the next sequence number for `target`. The first is `1`.
    pub fn begin(&self, target: &TargetId) -> Sequence {
        let mut slots = self.slots.lock();
        let state = slots.entry(target.clone()).or_default();
        state.issued += 1;
        state.issued
    }

    /// Offer `value` as the result of submission `sequence`.
    ///
    /// Returns `false`, leaving the slot untouched, if a later submission
    /// has already settled.
    pub fn publish(&self, target: &TargetId, sequence: Sequence, value: Arc<T>) -> bool {
        let mut slots = self.slots.lock();
        let state = slots.entry(target.clone()).or_default();
        if sequence <= state.settled {
            return false;
        }
        state.settled = sequence;
        state.issued = state.issued.max(sequence);
        state.current = Some((sequence, value));
        true
    }

    /// Settle submission `sequence` without a value, e.g. because it failed.
    ///
    /// The current value is kept, but earlier submissions that finish later
    /// are now stale. Returns `false` if a later submission already settled.
    pub fn settle(&self, target: &TargetId, sequence: Sequence) -> bool {
        let mut slots = self.slots.lock();
        let state = slots.entry(target.clone()).or_default();
        if sequence <= state.settled {
            return false;
        }
        state.settled = sequence;
        state.issued = state.issued.max(sequence);
        true
    }

    /// The value currently held for `target`.
    pub fn current(&self, target: &TargetId) -> Option<Arc<T>> {
        self.slots
            .lock()
            .get(target)
            .and_then(|s| s.current.as_ref())
            .map(|(_, value)| Arc::clone(value))
    }

    /// Sequence number of the value currently held for `target`.
    pub fn current_sequence(&self, target: &TargetId) -> Option<Sequence> {
        self.slots
            .lock()
            .get(target)
            .and_then(|s| s.current.as_ref())
            .map(|(sequence, _)| *sequence)
    }

    /// Highest sequence issued for `target` so far (`0` if none).
    pub fn latest_issued(&self, target: &TargetId) -> Sequence {
        self.slots.lock().get(target).map_or(0, |s| s.issued)
    }

    /// Whether a submission later than `sequence` exists for `target`.
    pub fn is_superseded(&self, target: &TargetId, sequence: Sequence) -> bool {
        self.latest_issued(target) > sequence
    }

    /// Drop the value held for `target`. Sequence numbering continues.
    pub fn clear(&self, target: &TargetId) -> Option<Arc<T>> {
        self.slots
            .lock()
            .get_mut(target)
            .and_then(|s| s.current.take())
            .map(|(_, value)| value)
    }

    /// Targets that currently hold a value.
    pub fn targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<_> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, s)| s.current.is_some())
            .map(|(target, _)| target.clone())
            .collect();
        targets.sort();
        targets
    }
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
