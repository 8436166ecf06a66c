//! Client-mirror reconciliation.
//!
//! A client marks a row "pending" the instant the user clicks, before the
//! server has even answered. That optimistic mark must survive the action
//! being queued behind another job, and must clear on the first poll that
//! shows the action is no longer pending anywhere — current key, queues or
//! the running flag. Clearing on request completion alone leaves stale
//! "processing" indicators whenever the server queued the action.

use std::collections::HashSet;

use shared::progress::Progress;
use shared::status::StatusSnapshot;
use shared::track::TrackRef;

use crate::keys;

/// Optimistic pending marks, keyed by primary identity key.
#[derive(Debug, Default)]
pub struct PendingSet {
    pending: HashSet<String>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a track pending the moment the user acts on it.
    pub fn mark(&mut self, track: &TrackRef) {
        self.pending
            .insert(keys::normalize_ref(track).primary().to_string());
    }

    pub fn is_pending(&self, track: &TrackRef) -> bool {
        self.pending
            .contains(keys::normalize_ref(track).primary())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply one poll response: a mark stays only while the server still
    /// knows the action as pending. Returns how many marks were cleared.
    pub fn reconcile(&mut self, progress: &Progress, status: &StatusSnapshot) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key| {
            let is_current =
                progress.running && progress.current_key.as_deref() == Some(key.as_str());
            is_current || status.queues.contains_key(key)
        });
        before - self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::job::{JobKind, QueueKind};
    use shared::status::QueueSnapshot;

    fn track() -> TrackRef {
        TrackRef::new("Moderat", "A New Error")
    }

    fn key() -> String {
        keys::normalize_ref(&track()).primary().to_string()
    }

    fn queued_status(key: &str) -> StatusSnapshot {
        let mut queues = QueueSnapshot::default();
        queues
            .entries
            .insert(QueueKind::Star, vec![key.to_string()]);
        StatusSnapshot {
            queues,
            ..StatusSnapshot::default()
        }
    }

    #[test]
    fn mark_survives_while_queued() {
        let mut pending = PendingSet::new();
        pending.mark(&track());

        // A rescan holds the slot; our star sits in the queue.
        let mut progress = Progress::default();
        progress.running = true;
        progress.mode = Some(JobKind::Rescan);

        pending.reconcile(&progress, &queued_status(&key()));
        assert!(pending.is_pending(&track()));
    }

    #[test]
    fn mark_survives_while_running() {
        let mut pending = PendingSet::new();
        pending.mark(&track());

        let mut progress = Progress::default();
        progress.running = true;
        progress.mode = Some(JobKind::StarOne);
        progress.current_key = Some(key());

        pending.reconcile(&progress, &StatusSnapshot::default());
        assert!(pending.is_pending(&track()));
    }

    #[test]
    fn mark_clears_once_absent_everywhere() {
        let mut pending = PendingSet::new();
        pending.mark(&track());

        let progress = Progress::default();
        let cleared = pending.reconcile(&progress, &StatusSnapshot::default());
        assert_eq!(cleared, 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn running_false_transition_converges() {
        let mut pending = PendingSet::new();
        pending.mark(&track());

        // While running, the mark holds.
        let mut progress = Progress::default();
        progress.running = true;
        progress.current_key = Some(key());
        pending.reconcile(&progress, &StatusSnapshot::default());
        assert!(!pending.is_empty());

        // The job completed; the key is gone from current and queues.
        progress.running = false;
        progress.current_key = None;
        pending.reconcile(&progress, &StatusSnapshot::default());
        assert!(pending.is_empty());
    }
}
