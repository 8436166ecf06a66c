use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::{JobKind, QueueKind};
use crate::track::Track;

/// One configured local music folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// Cached result of the last scan of one configured folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    pub path: String,
    pub scanned: u64,
    pub matched: u64,
}

/// Identity keys waiting in each queue, in FIFO order, plus the batch kinds
/// waiting behind them. Pollers need this to tell "queued behind another
/// job" apart from "no longer pending".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub entries: BTreeMap<QueueKind, Vec<String>>,
    #[serde(default)]
    pub batch: Vec<JobKind>,
}

impl QueueSnapshot {
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.values().any(|q| q.iter().any(|k| k == key))
    }
}

/// Full inventory snapshot answered by `getStatus`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub have: Vec<Track>,
    pub to_download: Vec<Track>,
    pub skipped: Vec<Track>,
    pub starred: BTreeMap<String, bool>,
    pub dismissed: BTreeMap<String, bool>,
    pub not_found: BTreeMap<String, bool>,
    pub folders: Vec<FolderStats>,
    pub queues: QueueSnapshot,
}
