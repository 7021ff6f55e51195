//! Bookkeeping for optimistic quantity edits.

use std::collections::HashMap;

use bitebox_core::LineId;

/// A quantity change applied locally but not yet confirmed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMutation {
    /// Quantity to restore if the remote update fails.
    pub snapshot: u32,
    /// Quantity to send.
    pub target: u32,
}

/// What to do with the mirror after a dispatched update failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollback {
    /// A newer edit is queued for the line and now owns the snapshot.
    Deferred,
    /// Put the line back to this quantity.
    Restore(u32),
}

/// Unconfirmed edits: at most one queued and one in flight per line.
#[derive(Debug, Default)]
pub struct PendingEdits {
    edits: HashMap<LineId, PendingMutation>,
    in_flight: HashMap<LineId, PendingMutation>,
}

impl PendingEdits {
    /// Record an edit from `current` to `target`.
    ///
    /// If an edit is already queued the target is replaced and the original
    /// snapshot is kept.
    pub fn record(&mut self, line_id: LineId, current: u32, target: u32) {
        self.edits
            .entry(line_id)
            .and_modify(|m| m.target = target)
            .or_insert(PendingMutation {
                snapshot: current,
                target,
            });
    }

    /// Move the queued edit in flight and return it for sending.
    pub fn dispatch(&mut self, line_id: LineId) -> Option<PendingMutation> {
        let edit = self.edits.remove(&line_id)?;
        self.in_flight.insert(line_id, edit);
        Some(edit)
    }

    /// The backend accepted the in-flight edit.
    pub fn settle(&mut self, line_id: LineId) -> Option<PendingMutation> {
        self.in_flight.remove(&line_id)
    }

    /// Forget the queued edit without sending it.
    pub fn discard(&mut self, line_id: LineId) -> Option<PendingMutation> {
        self.edits.remove(&line_id)
    }

    #[must_use]
    pub fn get(&self, line_id: LineId) -> Option<&PendingMutation> {
        self.edits.get(&line_id)
    }

    /// Decide the rollback for a failed dispatched edit.
    ///
    /// An edit queued while the failed one was in flight inherits its
    /// snapshot, so its own failure restores the last confirmed quantity.
    pub fn rollback(&mut self, line_id: LineId, failed: PendingMutation) -> Rollback {
        // A reload while in flight may have rebased the snapshot.
        let failed = self.in_flight.remove(&line_id).unwrap_or(failed);
        match self.edits.get_mut(&line_id) {
            Some(newer) => {
                newer.snapshot = failed.snapshot;
                Rollback::Deferred
            }
            None => Rollback::Restore(failed.snapshot),
        }
    }

    /// Keep only edits for lines that still exist, rebasing their snapshots.
    ///
    /// `confirmed` returns the backend's current quantity for a line, or
    /// `None` when the line is gone. Returns the line ids whose queued edit
    /// was dropped.
    pub fn rebase(&mut self, confirmed: impl Fn(LineId) -> Option<u32>) -> Vec<LineId> {
        self.in_flight.retain(|line_id, edit| match confirmed(*line_id) {
            Some(quantity) => {
                edit.snapshot = quantity;
                true
            }
            None => false,
        });

        let mut dropped = Vec::new();
        self.edits.retain(|line_id, edit| match confirmed(*line_id) {
            Some(quantity) => {
                edit.snapshot = quantity;
                true
            }
            None => {
                dropped.push(*line_id);
                false
            }
        });
        dropped
    }

    pub fn line_ids(&self) -> Vec<LineId> {
        self.edits.keys().copied().collect()
    }

    /// Quantities the mirror should show over confirmed backend state.
    ///
    /// A queued edit wins over the in-flight one for the same line.
    pub fn targets(&self) -> impl Iterator<Item = (LineId, u32)> {
        self.in_flight
            .iter()
            .filter(|(id, _)| !self.edits.contains_key(*id))
            .chain(&self.edits)
            .map(|(id, m)| (*id, m.target))
    }

    pub fn clear(&mut self) {
        self.edits.clear();
        self.in_flight.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}
