use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An (artist, title) pair naming one track across all three sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    pub artist: String,
    pub title: String,
}

impl TrackRef {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

impl std::fmt::Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

/// One reconciled track record.
///
/// A track is resolved locally if `local_path` is set and resolved remotely
/// if `marketplace_url` is set; neither implies the other. The four flags
/// are independent except that `dismissed` forces `starred` off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub artist: String,
    pub title: String,
    pub recognized_at: Option<DateTime<Utc>>,
    pub local_path: Option<String>,
    pub marketplace_url: Option<String>,
    pub display_title: Option<String>,
    pub match_score: Option<f64>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub dismissed: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub searched_not_found: bool,
}

impl Track {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            recognized_at: None,
            local_path: None,
            marketplace_url: None,
            display_title: None,
            match_score: None,
            starred: false,
            dismissed: false,
            skipped: false,
            searched_not_found: false,
        }
    }

    pub fn track_ref(&self) -> TrackRef {
        TrackRef::new(self.artist.clone(), self.title.clone())
    }

    /// Derive the observable state from the flags. Never stored.
    pub fn state(&self) -> TrackState {
        if self.local_path.is_some() {
            TrackState::Have
        } else if self.dismissed {
            TrackState::Dismissed
        } else if self.skipped {
            TrackState::Skipped
        } else if self.marketplace_url.is_some() {
            TrackState::ToDownload
        } else {
            TrackState::Unresolved
        }
    }
}

/// Observable track state, derived from the flags in [`Track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackState {
    Have,
    ToDownload,
    Skipped,
    Dismissed,
    Unresolved,
}

impl std::fmt::Display for TrackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrackState::Have => "have",
            TrackState::ToDownload => "to-download",
            TrackState::Skipped => "skipped",
            TrackState::Dismissed => "dismissed",
            TrackState::Unresolved => "unresolved",
        };
        f.write_str(s)
    }
}
