use shared::job::JobKind;
use shared::track::TrackState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A job of the required exclusivity is already running. Not a failure:
    /// callers under the queue-and-notify policy never see this, it exists
    /// for the reject policy and for structured logging.
    #[error("a {running} job is already running")]
    Busy { running: JobKind },

    /// The requested state-machine transition is not legal from the track's
    /// current state. Rejected synchronously, never queued.
    #[error("{op} is not valid from the {state} state")]
    InvalidTransition {
        op: &'static str,
        state: TrackState,
    },

    /// The operation needs a marketplace URL and none is known yet.
    #[error("no marketplace URL is known for this track")]
    MissingUrl,

    /// No inventory record matches the given (artist, title) under any
    /// normalized key form.
    #[error("unknown track")]
    UnknownTrack,

    /// The automation bridge answered with a non-success status.
    #[error("bridge error ({status}): {message}")]
    Bridge { status: u16, message: String },

    #[error("remote bridge is not configured")]
    NotConfigured,

    #[error("persistence error: {0}")]
    Store(String),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
