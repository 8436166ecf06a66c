use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::track::TrackRef;

use crate::error::Result;

/// A confirmed marketplace match for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub display_title: String,
    pub match_score: f64,
}

/// Result of a marketplace search. `NotFound` is a confirmed negative,
/// distinct from a transport error.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Found(SearchHit),
    NotFound,
}

/// What the marketplace reported after a successful star. Carries the URL
/// and display title the operator discovered when it had to search first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarConfirmation {
    pub url: String,
    pub display_title: Option<String>,
}

/// One entry of the marketplace favorites listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFavorite {
    pub artist: String,
    pub title: String,
    pub url: String,
    pub display_title: Option<String>,
}

/// Abstract capability performing marketplace actions. The concrete
/// browser automation lives behind the bridge sidecar; everything in this
/// crate talks to it only through this trait.
#[async_trait]
pub trait RemoteOperator: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;

    async fn search(&self, track: &TrackRef) -> Result<SearchOutcome>;

    /// Favorite a track. When `url` is `None` the operator resolves the
    /// track itself and reports what it found.
    async fn star(&self, track: &TrackRef, url: Option<&str>) -> Result<StarConfirmation>;

    async fn unstar(&self, url: &str) -> Result<()>;

    async fn favorites(&self) -> Result<Vec<RemoteFavorite>>;

    /// Fetch the file behind `url` into `dest`, returning the written path.
    async fn download(&self, track: &TrackRef, url: &str, dest: &Path) -> Result<PathBuf>;

    async fn health_check(&self) -> bool;
}
