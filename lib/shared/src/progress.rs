use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::JobKind;

/// How a job left the single-flight slot. `Stopped` is user cancellation,
/// distinct from both `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Done,
    Stopped,
    Failed,
}

/// The one shared progress record, entirely overwritten between jobs.
///
/// The accumulator maps grow monotonically while a job runs so a poller can
/// show partial results before completion; they are keyed by the track's
/// primary identity key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub running: bool,
    pub mode: Option<JobKind>,
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub current_key: Option<String>,
    pub message: String,
    pub outcome: Option<JobOutcome>,
    pub error: Option<String>,
    pub failed: u64,
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
    #[serde(default)]
    pub starred: BTreeMap<String, bool>,
    #[serde(default)]
    pub not_found: BTreeMap<String, bool>,
    #[serde(default)]
    pub display_titles: BTreeMap<String, String>,
    #[serde(default)]
    pub match_scores: BTreeMap<String, f64>,
}

impl Progress {
    /// The idle record published between jobs, with the last outcome kept
    /// visible until the next job overwrites everything.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Fresh record for a starting job.
    pub fn begin(mode: JobKind, total: Option<u64>) -> Self {
        Self {
            running: true,
            mode: Some(mode),
            current: total.map(|_| 0),
            total,
            ..Self::default()
        }
    }
}
