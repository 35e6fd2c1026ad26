//! Upstream profile client
//!
//! Wraps the judge's GraphQL profile query behind `ProfileFetcher` and sorts
//! every failure into one of four classes. Only `Transient` and `Malformed`
//! are retried (linear backoff from the shared `resilience` crate); a
//! `RateLimited` or `NotFound` answer is returned on the first occurrence.

use async_trait::async_trait;
use reqwest::StatusCode;
use resilience::{with_retry, RetryConfig, RetryError, Retryable};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::metrics;
use crate::models::{DifficultyCounts, UserRecord};

const PROFILE_QUERY: &str = r#"
query userProfile($username: String!) {
  matchedUser(username: $username) {
    username
    profile { realName userAvatar }
    submitStats { acSubmissionNum { difficulty count submissions } }
    submissionCalendar
  }
}
"#;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("rate limited by upstream")]
    RateLimited,

    #[error("user not found upstream: {0}")]
    NotFound(String),

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Metric/log label for the failure class
    pub fn class(&self) -> &'static str {
        match self {
            FetchError::RateLimited => "rate_limited",
            FetchError::NotFound(_) => "not_found",
            FetchError::Transient(_) => "transient",
            FetchError::Malformed(_) => "malformed",
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Malformed(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}

/// One upstream lookup per username
#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch(&self, username: &str) -> Result<UserRecord, FetchError>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ProfileData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileData {
    matched_user: Option<MatchedUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchedUser {
    username: String,
    profile: Option<Profile>,
    submit_stats: SubmitStats,
    submission_calendar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    real_name: Option<String>,
    user_avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitStats {
    ac_submission_num: Vec<DifficultyStat>,
}

#[derive(Debug, Deserialize)]
struct DifficultyStat {
    difficulty: String,
    count: u32,
    submissions: u32,
}

/// HTTP implementation against the judge's GraphQL endpoint
#[derive(Clone)]
pub struct HttpProfileClient {
    http: reqwest::Client,
    graphql_url: String,
    retry: RetryConfig,
}

impl HttpProfileClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("leaderboard-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transient(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            graphql_url: config.graphql_url.clone(),
            retry: config.retry.clone(),
        })
    }

    async fn fetch_once(&self, username: &str) -> Result<UserRecord, FetchError> {
        let response = self
            .http
            .post(&self.graphql_url)
            .json(&json!({
                "query": PROFILE_QUERY,
                "variables": { "username": username },
            }))
            .send()
            .await?;

        let status = response.status();
        if let Some(err) = classify_status(status, username) {
            return Err(err);
        }

        let body = response.text().await?;
        parse_profile(username, &body)
    }
}

#[async_trait]
impl ProfileFetcher for HttpProfileClient {
    async fn fetch(&self, username: &str) -> Result<UserRecord, FetchError> {
        debug!(username = %username, "Fetching upstream profile");

        let result = with_retry(self.retry.clone(), || self.fetch_once(username))
            .await
            .map_err(RetryError::into_inner);

        match &result {
            Ok(_) => metrics::record_upstream_fetch("ok"),
            Err(e) => metrics::record_upstream_fetch(e.class()),
        }
        result
    }
}

fn classify_status(status: StatusCode, username: &str) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    let err = match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited,
        StatusCode::NOT_FOUND => FetchError::NotFound(username.to_string()),
        StatusCode::REQUEST_TIMEOUT => FetchError::Transient(format!("HTTP {}", status)),
        s if s.is_server_error() => FetchError::Transient(format!("HTTP {}", s)),
        s => FetchError::Malformed(format!("unexpected HTTP {}", s)),
    };
    Some(err)
}

/// Decode a GraphQL profile body into a record (streak left at zero).
pub fn parse_profile(username: &str, body: &str) -> Result<UserRecord, FetchError> {
    let response: GraphQlResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let matched = response.data.and_then(|data| data.matched_user);

    let user = match matched {
        Some(user) => user,
        None => {
            let message = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            let lowered = message.to_ascii_lowercase();

            if lowered.contains("too many requests") || lowered.contains("rate limit") {
                return Err(FetchError::RateLimited);
            }
            if message.is_empty() || lowered.contains("does not exist") {
                return Err(FetchError::NotFound(username.to_string()));
            }
            return Err(FetchError::Malformed(message));
        }
    };

    let mut counts = DifficultyCounts::default();
    let mut all_submissions: Option<u32> = None;
    let mut summed_submissions = 0u32;

    for stat in &user.submit_stats.ac_submission_num {
        match stat.difficulty.as_str() {
            "Easy" => counts.easy = stat.count,
            "Medium" => counts.medium = stat.count,
            "Hard" => counts.hard = stat.count,
            "All" => all_submissions = Some(stat.submissions),
            _ => continue,
        }
        if stat.difficulty != "All" {
            summed_submissions = summed_submissions.saturating_add(stat.submissions);
        }
    }

    let timestamps = match user.submission_calendar.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_calendar(raw)?,
        _ => Vec::new(),
    };

    let profile = user.profile.unwrap_or_default();
    let name = profile
        .real_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| user.username.clone());

    Ok(UserRecord::new(
        user.username,
        name,
        profile.user_avatar.unwrap_or_default(),
        counts,
        all_submissions.unwrap_or(summed_submissions),
        timestamps,
    ))
}

/// The calendar is a JSON string mapping epoch-second strings to counts.
fn parse_calendar(raw: &str) -> Result<Vec<i64>, FetchError> {
    let calendar: HashMap<String, u32> = serde_json::from_str(raw)
        .map_err(|e| FetchError::Malformed(format!("submission calendar: {}", e)))?;

    let mut timestamps = Vec::with_capacity(calendar.len());
    for (key, count) in calendar {
        let ts = key
            .trim()
            .parse::<i64>()
            .map_err(|_| FetchError::Malformed(format!("calendar key {:?}", key)))?;
        if count > 0 {
            timestamps.push(ts);
        }
    }
    timestamps.sort_unstable();
    Ok(timestamps)
}
