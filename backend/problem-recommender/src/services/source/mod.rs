//! Problem source client
//!
//! Read-only access to the Codeforces API: the problemset (with solve
//! statistics) and a user's submission history. Every call is a single
//! attempt; callers decide how to degrade on failure.

use crate::models::{ApiEnvelope, ProblemSet, Submission};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://codeforces.com/api";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProblemSource: Send + Sync {
    /// Fetch every problem with its solve statistics
    async fn fetch_problemset(&self) -> Result<ProblemSet>;

    /// Fetch all submissions of a user
    async fn fetch_user_status(&self, handle: &str) -> Result<Vec<Submission>>;
}

/// HTTP client for the public Codeforces API
pub struct CodeforcesClient {
    client: Client,
    base_url: String,
}

impl CodeforcesClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(url = %url, "Calling problem source");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        // The API reports failures as a FAILED envelope, often alongside a 4xx
        match serde_json::from_str::<ApiEnvelope<T>>(&body) {
            Ok(envelope) => unwrap_envelope(envelope),
            Err(_) if !status.is_success() => Err(SourceError::HttpStatus(status.as_u16())),
            Err(e) => Err(SourceError::Decode(e.to_string())),
        }
    }
}

/// Accept only `OK` envelopes that carry a result
pub fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T> {
    if envelope.status != "OK" {
        return Err(SourceError::Api(
            envelope
                .comment
                .unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }

    envelope
        .result
        .ok_or_else(|| SourceError::Decode("missing result".to_string()))
}

#[async_trait]
impl ProblemSource for CodeforcesClient {
    async fn fetch_problemset(&self) -> Result<ProblemSet> {
        let problemset: ProblemSet = self.call("problemset.problems", &[]).await?;
        info!(
            problems = problemset.problems.len(),
            statistics = problemset.problem_statistics.len(),
            "Fetched problemset"
        );
        Ok(problemset)
    }

    async fn fetch_user_status(&self, handle: &str) -> Result<Vec<Submission>> {
        let submissions: Vec<Submission> =
            self.call("user.status", &[("handle", handle)]).await?;
        debug!(
            handle = %handle,
            submissions = submissions.len(),
            "Fetched user submissions"
        );
        Ok(submissions)
    }
}
