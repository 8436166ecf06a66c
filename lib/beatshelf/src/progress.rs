//! The shared progress record and its observer channel.
//!
//! One `watch` channel holds the latest [`Progress`] snapshot: readers
//! never block and never see a partially updated record, writers overwrite
//! in place. The single active job's worker is the only writer.

use shared::job::JobKind;
use shared::progress::{JobOutcome, Progress};
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: watch::Sender<Progress>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Progress::idle());
        Self { tx }
    }

    /// Latest snapshot, non-blocking.
    pub fn read(&self) -> Progress {
        self.tx.borrow().clone()
    }

    /// Push-style observation; the receiver yields on every update.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.tx.subscribe()
    }

    /// Replace the whole record for a starting job. Nothing from the
    /// previous job survives.
    pub fn begin(&self, mode: JobKind, total: Option<u64>, current_key: Option<String>) {
        let mut p = Progress::begin(mode, total);
        p.current_key = current_key;
        self.tx.send_replace(p);
    }

    /// One unit of remote work finished; advance the counter and move the
    /// highlight to the next key.
    pub fn advance(&self, current_key: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|p| {
            if let Some(c) = p.current.as_mut() {
                *c += 1;
            }
            p.current_key = current_key.map(str::to_string);
            p.message = message;
        });
    }

    /// Re-aim the counters, used when a job switches phase (scan vs match).
    pub fn set_phase(&self, message: impl Into<String>, total: Option<u64>) {
        let message = message.into();
        self.tx.send_modify(|p| {
            p.message = message;
            p.total = total;
            p.current = total.map(|_| 0);
        });
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|p| p.message = message);
    }

    /// Highlight the unit about to be processed.
    pub fn set_current_key(&self, key: Option<&str>) {
        let key = key.map(str::to_string);
        self.tx.send_modify(|p| p.current_key = key);
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        let error = error.into();
        self.tx.send_modify(|p| {
            p.failed += 1;
            p.error = Some(error);
        });
    }

    // --- accumulators: grow monotonically while the job runs -------------

    pub fn note_url(&self, key: &str, url: &str) {
        self.tx.send_modify(|p| {
            p.urls.insert(key.to_string(), url.to_string());
        });
    }

    pub fn note_starred(&self, key: &str, starred: bool) {
        self.tx.send_modify(|p| {
            p.starred.insert(key.to_string(), starred);
        });
    }

    pub fn note_not_found(&self, key: &str) {
        self.tx.send_modify(|p| {
            p.not_found.insert(key.to_string(), true);
        });
    }

    pub fn note_display_title(&self, key: &str, title: &str) {
        self.tx.send_modify(|p| {
            p.display_titles.insert(key.to_string(), title.to_string());
        });
    }

    pub fn note_match_score(&self, key: &str, score: f64) {
        self.tx.send_modify(|p| {
            p.match_scores.insert(key.to_string(), score);
        });
    }

    /// Flip to a terminal state. The caller merges accumulators into the
    /// inventory *before* calling this: a poller that observes the
    /// running=false transition may immediately refresh the inventory.
    pub fn finish(&self, outcome: JobOutcome, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|p| {
            p.running = false;
            p.outcome = Some(outcome);
            p.current_key = None;
            p.message = message;
        });
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_overwrites_everything() {
        let ch = ProgressChannel::new();
        ch.begin(JobKind::SearchAll, Some(3), None);
        ch.note_url("a|one", "https://m/1");
        ch.advance(Some("a|one"), "searched");
        ch.finish(JobOutcome::Done, "done");

        ch.begin(JobKind::Rescan, None, None);
        let p = ch.read();
        assert!(p.running);
        assert_eq!(p.mode, Some(JobKind::Rescan));
        assert!(p.urls.is_empty());
        assert_eq!(p.failed, 0);
        assert!(p.outcome.is_none());
        assert!(p.current.is_none());
    }

    #[test]
    fn accumulators_grow_while_running() {
        let ch = ProgressChannel::new();
        ch.begin(JobKind::StarBatch, Some(2), None);
        ch.note_starred("a|one", true);
        ch.advance(Some("b|two"), "starring");
        ch.note_starred("b|two", true);
        ch.advance(None, "finishing");

        let p = ch.read();
        assert_eq!(p.current, Some(2));
        assert_eq!(p.starred.len(), 2);
    }

    #[test]
    fn finish_is_terminal_and_clears_current_key() {
        let ch = ProgressChannel::new();
        ch.begin(JobKind::SearchOne, Some(1), Some("a|one".into()));
        ch.finish(JobOutcome::Stopped, "stopped");
        let p = ch.read();
        assert!(!p.running);
        assert_eq!(p.outcome, Some(JobOutcome::Stopped));
        assert!(p.current_key.is_none());
    }

    #[tokio::test]
    async fn subscribers_observe_updates() {
        let ch = ProgressChannel::new();
        let mut rx = ch.subscribe();
        ch.begin(JobKind::Download, Some(1), None);
        rx.changed().await.unwrap();
        assert!(rx.borrow().running);
    }
}
