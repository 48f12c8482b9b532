// Where snapshots come from: the upstream GTFS-RT feed, or the JSON API of
// another running instance.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;

use crate::aggregate::aggregate_lines;
use crate::config::FeedSettings;
use crate::error::{FeedError, Result};
use crate::feed::{FeedTarget, ingest, normalize_event_time};
use crate::models::{ApiFailure, ArrivalSnapshot, ArrivalsResponse};

const PROTOBUF_ACCEPT: &str = "application/x-protobuf, application/octet-stream, */*";

#[async_trait]
pub trait ArrivalSource: Send + Sync {
    /// One poll. Returns a complete snapshot built at `now`.
    async fn fetch(&self, now: i64) -> Result<ArrivalSnapshot>;
}

fn create_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FeedError::Transport(format!("Failed to create HTTP client: {}", e)))
}

// ============================================================================
// Upstream GTFS-RT Feed
// ============================================================================

pub struct FeedSource {
    client: reqwest::Client,
    url: String,
    user_agent: String,
    target: FeedTarget,
    per_line_cap: usize,
}

impl FeedSource {
    pub fn new(settings: &FeedSettings, per_line_cap: usize) -> Result<Self> {
        Ok(FeedSource {
            client: create_http_client(settings.request_timeout)?,
            url: settings.url.clone(),
            user_agent: settings.user_agent.clone(),
            target: FeedTarget::new(settings.stop_id.clone(), settings.lines.iter().copied()),
            per_line_cap,
        })
    }

    async fn fetch_bytes(&self) -> Result<bytes::Bytes> {
        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, PROTOBUF_ACCEPT)
            .send()
            .await
            .map_err(|e| FeedError::Transport(format!("Failed to fetch trip updates: {}", e)))?;

        if !response.status().is_success() {
            return Err(FeedError::Transport(format!(
                "Upstream feed responded with status: {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| FeedError::Transport(format!("Failed to read trip updates response: {}", e)))
    }
}

#[async_trait]
impl ArrivalSource for FeedSource {
    async fn fetch(&self, now: i64) -> Result<ArrivalSnapshot> {
        let body = self.fetch_bytes().await?;
        let lines = ingest(&body, now, &self.target)?;

        Ok(ArrivalSnapshot {
            stop_id: self.target.stop_id.clone(),
            built_at: now,
            lines: aggregate_lines(lines, self.per_line_cap),
        })
    }
}

// ============================================================================
// Arrivals API of a running server
// ============================================================================

pub struct ApiSource {
    client: reqwest::Client,
    url: String,
    per_line_cap: usize,
}

impl ApiSource {
    pub fn new(url: impl Into<String>, timeout: Duration, per_line_cap: usize) -> Result<Self> {
        Ok(ApiSource {
            client: create_http_client(timeout)?,
            url: url.into(),
            per_line_cap,
        })
    }
}

#[async_trait]
impl ArrivalSource for ApiSource {
    async fn fetch(&self, now: i64) -> Result<ArrivalSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(format!("Failed to fetch arrivals: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::Transport(format!("Failed to read arrivals response: {}", e)))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ApiFailure>(&body)
                .map(|f| format!("{}: {}", f.error, f.message))
                .unwrap_or_else(|_| format!("status {}", status));
            return Err(FeedError::Transport(format!("Arrivals API failed: {}", detail)));
        }

        let parsed: ArrivalsResponse = serde_json::from_slice(&body)
            .map_err(|e| FeedError::Decode(format!("Failed to parse arrivals response: {}", e)))?;

        let mut snapshot = parsed.into_snapshot();
        for event in snapshot.lines.values().flatten() {
            normalize_event_time(event.predicted_epoch_seconds)?;
        }
        snapshot.lines = aggregate_lines(snapshot.lines, self.per_line_cap);
        // the local clock owns staleness
        snapshot.built_at = now;
        Ok(snapshot)
    }
}
