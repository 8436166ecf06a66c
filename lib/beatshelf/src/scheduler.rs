//! Single-flight job scheduler with per-kind queues.
//!
//! At most one job runs at any instant. Additional requests wait in one
//! FIFO per action kind (or the batch line) and are drained in a fixed
//! kind-priority order when the slot frees up. The queue state sits behind
//! one narrow mutex; nothing is awaited while it is held.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use shared::job::{Admission, JobKind, QueueKind, SearchScope};
use shared::status::QueueSnapshot;
use shared::track::TrackRef;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineError;
use crate::keys;
use crate::runner::{self, RunnerContext};

/// What to do with a submission while another job holds the slot.
/// The reference behavior is queue-and-notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    #[default]
    QueueAndNotify,
    Reject,
}

/// A unit of remote work with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum JobSpec {
    SearchOne(TrackRef),
    SearchAll(SearchScope),
    StarOne(TrackRef),
    StarBatch(Vec<TrackRef>),
    UnstarOne {
        track: TrackRef,
        /// Apply the dismiss flags once the remote unstar confirms.
        dismiss: bool,
    },
    SyncFavorites,
    Download(TrackRef),
    Rescan(Option<String>),
}

impl JobSpec {
    pub fn kind(&self) -> JobKind {
        match self {
            JobSpec::SearchOne(_) => JobKind::SearchOne,
            JobSpec::SearchAll(_) => JobKind::SearchAll,
            JobSpec::StarOne(_) => JobKind::StarOne,
            JobSpec::StarBatch(_) => JobKind::StarBatch,
            JobSpec::UnstarOne { .. } => JobKind::UnstarOne,
            JobSpec::SyncFavorites => JobKind::SyncFavorites,
            JobSpec::Download(_) => JobKind::Download,
            JobSpec::Rescan(_) => JobKind::Rescan,
        }
    }

    /// The single track this job operates on, if it is a per-track kind.
    pub fn track(&self) -> Option<&TrackRef> {
        match self {
            JobSpec::SearchOne(t)
            | JobSpec::StarOne(t)
            | JobSpec::UnstarOne { track: t, .. }
            | JobSpec::Download(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct QueuedEntry {
    key: String,
    spec: JobSpec,
}

struct ActiveJob {
    id: Uuid,
    kind: JobKind,
    key: Option<String>,
    token: CancellationToken,
}

impl ActiveJob {
    fn new(kind: JobKind, key: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            key,
            token: CancellationToken::new(),
        }
    }
}

#[derive(Default)]
struct SchedState {
    active: Option<ActiveJob>,
    queues: BTreeMap<QueueKind, VecDeque<QueuedEntry>>,
    batch: VecDeque<JobSpec>,
}

pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    state: Mutex<SchedState>,
    ctx: RunnerContext,
    policy: QueuePolicy,
}

impl Scheduler {
    pub fn new(ctx: RunnerContext, policy: QueuePolicy) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedState::default()),
                ctx,
                policy,
            }),
        }
    }

    /// Admit a job: start it if the slot is free, otherwise queue it
    /// (coalescing duplicate single-track requests) or reject it under the
    /// reject policy.
    pub fn submit(&self, spec: JobSpec) -> Admission {
        let kind = spec.kind();
        let key = spec
            .track()
            .map(|t| keys::normalize_ref(t).primary().to_string());

        let mut state = self.inner.state.lock().unwrap();

        // Idempotence: the same single-track action already queued or
        // running absorbs the new request.
        if let (Some(k), Some(q)) = (key.as_deref(), QueueKind::for_kind(kind)) {
            let running_same = state
                .active
                .as_ref()
                .is_some_and(|a| a.kind == kind && a.key.as_deref() == Some(k));
            let queued_same = state
                .queues
                .get(&q)
                .is_some_and(|dq| dq.iter().any(|e| e.key == k));
            if running_same || queued_same {
                debug!("Coalesced duplicate {kind} request for {k}");
                return Admission::Queued;
            }
        }

        if state.active.is_none() {
            let job = ActiveJob::new(kind, key);
            let (id, token) = (job.id, job.token.clone());
            state.active = Some(job);
            drop(state);
            info!(job = %id, "Starting {kind} job");
            self.spawn_worker(spec, id, token);
            return Admission::Accepted { job_id: id };
        }

        let running = state
            .active
            .as_ref()
            .map(|a| a.kind)
            .unwrap_or(JobKind::Rescan);

        match self.inner.policy {
            QueuePolicy::Reject => Admission::Rejected {
                reason: EngineError::Busy { running }.to_string(),
            },
            QueuePolicy::QueueAndNotify => {
                match (key, QueueKind::for_kind(kind)) {
                    (Some(k), Some(q)) => {
                        info!("Queued {kind} for {k} behind the running {running} job");
                        state
                            .queues
                            .entry(q)
                            .or_default()
                            .push_back(QueuedEntry { key: k, spec });
                    }
                    _ => {
                        if state.batch.iter().any(|s| s.kind() == kind) {
                            debug!("Coalesced duplicate {kind} batch request");
                            return Admission::Queued;
                        }
                        info!("Queued {kind} behind the running {running} job");
                        state.batch.push_back(spec);
                    }
                }
                Admission::Queued
            }
        }
    }

    /// Withdraw a not-yet-started entry from a queue. Never affects the
    /// running job.
    pub fn withdraw(&self, queue: QueueKind, track: &TrackRef) -> bool {
        let key = keys::normalize_ref(track).primary().to_string();
        let mut state = self.inner.state.lock().unwrap();
        let Some(dq) = state.queues.get_mut(&queue) else {
            return false;
        };
        let before = dq.len();
        dq.retain(|e| e.key != key);
        let removed = dq.len() < before;
        if removed {
            info!("Withdrew {key} from the {queue} queue");
        }
        removed
    }

    /// Request cooperative cancellation of the running job, if any. The
    /// current unit of work finishes; no further units start.
    pub fn stop(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        match &state.active {
            Some(job) => {
                info!(job = %job.id, "Stop requested for the running {} job", job.kind);
                job.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn running_kind(&self) -> Option<JobKind> {
        self.inner.state.lock().unwrap().active.as_ref().map(|a| a.kind)
    }

    pub fn queues_snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock().unwrap();
        QueueSnapshot {
            entries: state
                .queues
                .iter()
                .filter(|(_, dq)| !dq.is_empty())
                .map(|(q, dq)| (*q, dq.iter().map(|e| e.key.clone()).collect()))
                .collect(),
            batch: state.batch.iter().map(JobSpec::kind).collect(),
        }
    }

    fn spawn_worker(&self, first: JobSpec, id: Uuid, token: CancellationToken) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut next = Some((first, id, token));
            while let Some((spec, id, token)) = next.take() {
                runner::execute(&inner.ctx, spec, id, token).await;
                next = inner.take_next();
            }
        });
    }
}

impl SchedulerInner {
    /// Free the slot and pick the next job: fixed kind priority
    /// (star, unstar, search, download), then the batch line, FIFO within
    /// each. This is the one section that races with `submit`.
    fn take_next(&self) -> Option<(JobSpec, Uuid, CancellationToken)> {
        let mut state = self.state.lock().unwrap();
        state.active = None;

        for q in QueueKind::DRAIN_ORDER {
            if let Some(entry) = state.queues.get_mut(&q).and_then(VecDeque::pop_front) {
                let job = ActiveJob::new(entry.spec.kind(), Some(entry.key));
                let (id, token) = (job.id, job.token.clone());
                state.active = Some(job);
                info!(job = %id, "Draining {} queue: starting {}", q, entry.spec.kind());
                return Some((entry.spec, id, token));
            }
        }

        if let Some(spec) = state.batch.pop_front() {
            let job = ActiveJob::new(spec.kind(), None);
            let (id, token) = (job.id, job.token.clone());
            state.active = Some(job);
            info!(job = %id, "Draining batch line: starting {}", spec.kind());
            return Some((spec, id, token));
        }

        debug!("All queues empty, scheduler idle");
        None
    }
}
