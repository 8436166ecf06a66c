//! HTTP client for the automation bridge.
//!
//! The bridge is a sidecar wrapping the marketplace's web UI behind a small
//! REST API (search, favorites, downloads). This client is the reference
//! [`RemoteOperator`]; it owns rate limiting and error mapping so the rest
//! of the engine never sees HTTP.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::track::TrackRef;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::{EngineError, Result};
use crate::operator::{
    RemoteFavorite, RemoteOperator, SearchHit, SearchOutcome, StarConfirmation,
};

#[derive(Debug, Clone)]
pub struct BridgeClient {
    base_url: Url,
    api_key: Option<String>,
    client: Client,
    search_timestamps: Arc<Mutex<Vec<DateTime<Utc>>>>,
    max_searches_per_window: usize,
    rate_limit_window: Duration,
}

#[derive(Default)]
pub struct BridgeClientBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    max_searches_per_window: Option<usize>,
    rate_limit_window_seconds: Option<i64>,
}

impl BridgeClientBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn rate_limit(mut self, max_searches: usize, window_seconds: i64) -> Self {
        self.max_searches_per_window = Some(max_searches);
        self.rate_limit_window_seconds = Some(window_seconds);
        self
    }

    pub fn build(self) -> Result<BridgeClient> {
        let base_url_str = self.base_url.ok_or(EngineError::NotConfigured)?;
        let base_url = Url::parse(base_url_str.trim_end_matches('/'))?;

        Ok(BridgeClient {
            base_url,
            api_key: self.api_key,
            client: Client::new(),
            search_timestamps: Arc::new(Mutex::new(Vec::new())),
            max_searches_per_window: self.max_searches_per_window.unwrap_or(30),
            rate_limit_window: Duration::seconds(self.rate_limit_window_seconds.unwrap_or(180)),
        })
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    artist: &'a str,
    title: &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
    url: Option<String>,
    display_title: Option<String>,
    match_score: Option<f64>,
}

#[derive(Serialize)]
struct StarRequest<'a> {
    artist: &'a str,
    title: &'a str,
    url: Option<&'a str>,
}

#[derive(Serialize)]
struct UnstarRequest<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct DownloadRequest<'a> {
    url: &'a str,
}

impl BridgeClient {
    async fn make_request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<B>,
    ) -> Result<T> {
        let url = self.base_url.join(&format!("api/v1/{endpoint}"))?;
        debug!("Request: {} {}", method, url);
        let mut request = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }
        if let Some(b) = body {
            request = request.json(&b);
        }
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            let text = if text.trim().is_empty() { "null" } else { &text };
            serde_json::from_str(text).map_err(|e| EngineError::Bridge {
                status: status.as_u16(),
                message: format!("JSON parse error: {e}"),
            })
        } else {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            Err(EngineError::Bridge {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    /// Searches hammer the marketplace hardest, so only they count against
    /// the sliding window.
    async fn wait_for_rate_limit(&self) {
        let mut timestamps = self.search_timestamps.lock().await;
        let now = Utc::now();
        let window_start = now - self.rate_limit_window;
        timestamps.retain(|&ts| ts > window_start);
        if timestamps.len() >= self.max_searches_per_window {
            if let Some(&oldest) = timestamps.first() {
                let wait_duration = (oldest + self.rate_limit_window) - now;
                if !wait_duration.is_zero() {
                    info!(
                        "Rate limit reached ({}/{}), waiting for {:.1}s",
                        timestamps.len(),
                        self.max_searches_per_window,
                        wait_duration.as_seconds_f64()
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        wait_duration.num_milliseconds() as u64,
                    ))
                    .await;
                }
            }
        }
        timestamps.push(now);
    }

    fn download_file_name(track: &TrackRef, response: &Response) -> String {
        response
            .headers()
            .get("x-file-name")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let slug = format!("{} - {}", track.artist, track.title)
                    .replace(['/', '\\'], "_");
                format!("{slug}.mp3")
            })
    }
}

#[async_trait]
impl RemoteOperator for BridgeClient {
    fn id(&self) -> &'static str {
        "bridge"
    }

    fn name(&self) -> &'static str {
        "Automation bridge"
    }

    async fn search(&self, track: &TrackRef) -> Result<SearchOutcome> {
        self.wait_for_rate_limit().await;
        info!("Searching marketplace for '{}'", track);

        let resp: SearchResponse = self
            .make_request(
                Method::POST,
                "tracks/search",
                Some(SearchRequest {
                    artist: &track.artist,
                    title: &track.title,
                }),
            )
            .await?;

        match resp.url {
            Some(url) => Ok(SearchOutcome::Found(SearchHit {
                display_title: resp.display_title.unwrap_or_else(|| track.to_string()),
                match_score: resp.match_score.unwrap_or(0.0),
                url,
            })),
            None => Ok(SearchOutcome::NotFound),
        }
    }

    async fn star(&self, track: &TrackRef, url: Option<&str>) -> Result<StarConfirmation> {
        info!("Starring '{}'", track);
        self.make_request(
            Method::PUT,
            "favorites",
            Some(StarRequest {
                artist: &track.artist,
                title: &track.title,
                url,
            }),
        )
        .await
    }

    async fn unstar(&self, url: &str) -> Result<()> {
        info!("Unstarring {}", url);
        self.make_request::<(), _>(Method::DELETE, "favorites", Some(UnstarRequest { url }))
            .await
    }

    async fn favorites(&self) -> Result<Vec<RemoteFavorite>> {
        info!("Fetching marketplace favorites");
        self.make_request::<Vec<RemoteFavorite>, ()>(Method::GET, "favorites", None)
            .await
    }

    async fn download(&self, track: &TrackRef, url: &str, dest: &Path) -> Result<PathBuf> {
        info!("Downloading '{}' from {}", track, url);
        let endpoint = self.base_url.join("api/v1/downloads")?;
        let mut request = self
            .client
            .request(Method::POST, endpoint)
            .json(&DownloadRequest { url });
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(EngineError::Bridge {
                status: status.as_u16(),
                message: text,
            });
        }

        let file_name = Self::download_file_name(track, &response);
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(dest).await?;
        let path = dest.join(file_name);
        tokio::fs::write(&path, &bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    async fn health_check(&self) -> bool {
        self.make_request::<serde_json::Value, ()>(Method::GET, "session", None)
            .await
            .is_ok()
    }
}
