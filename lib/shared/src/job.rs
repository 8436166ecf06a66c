use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The unit kinds of remote work the scheduler admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    SearchOne,
    SearchAll,
    StarOne,
    StarBatch,
    UnstarOne,
    SyncFavorites,
    Download,
    Rescan,
}

impl JobKind {
    /// Single-track kinds queue per track; batch kinds wait in the batch line.
    pub fn is_single_track(self) -> bool {
        matches!(
            self,
            JobKind::SearchOne | JobKind::StarOne | JobKind::UnstarOne | JobKind::Download
        )
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobKind::SearchOne => "search-one",
            JobKind::SearchAll => "search-all",
            JobKind::StarOne => "star-one",
            JobKind::StarBatch => "star-batch",
            JobKind::UnstarOne => "unstar-one",
            JobKind::SyncFavorites => "sync-favorites",
            JobKind::Download => "download",
            JobKind::Rescan => "rescan",
        };
        f.write_str(s)
    }
}

/// One FIFO queue per single-track action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Star,
    Unstar,
    Search,
    Download,
}

impl QueueKind {
    /// Drain priority, star/unstar/search before download.
    pub const DRAIN_ORDER: [QueueKind; 4] = [
        QueueKind::Star,
        QueueKind::Unstar,
        QueueKind::Search,
        QueueKind::Download,
    ];

    pub fn for_kind(kind: JobKind) -> Option<QueueKind> {
        match kind {
            JobKind::SearchOne => Some(QueueKind::Search),
            JobKind::StarOne => Some(QueueKind::Star),
            JobKind::UnstarOne => Some(QueueKind::Unstar),
            JobKind::Download => Some(QueueKind::Download),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueKind::Star => "star",
            QueueKind::Unstar => "unstar",
            QueueKind::Search => "search",
            QueueKind::Download => "download",
        };
        f.write_str(s)
    }
}

/// Working-set selector for `search-all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Tracks never searched: no marketplace URL and no not-found flag.
    New,
    /// Tracks with a confirmed negative result, to retry.
    Unfound,
}

/// The scheduler's answer to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "admission", rename_all = "lowercase")]
pub enum Admission {
    /// The job started immediately; poll the progress channel to follow it.
    Accepted { job_id: Uuid },
    /// Another job holds the slot; this one waits in its queue. Also the
    /// idempotent answer when the same single-track request is already
    /// queued or running.
    Queued,
    /// Refused under `QueuePolicy::Reject`.
    Rejected { reason: String },
}
