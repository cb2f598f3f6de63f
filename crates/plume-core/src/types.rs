//! Shared data model for publish requests, sessions and outcomes

use crate::error::{ErrorKind, PlumeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One fully prepared post handed to the publisher.
///
/// Content generation happens upstream; by the time a request reaches this
/// module every field is plain data. Malformed input is rejected here at the
/// boundary via [`PublishRequest::validate`] instead of probing shapes deep
/// inside the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Post title, filled into the title field (platform caps apply).
    pub title: String,
    /// Post body. Embedded line breaks are preserved verbatim through
    /// every injection technique.
    pub body: String,
    /// Hashtags appended to the body as `#tag` tokens, in order.
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Local media files to attach, in order.
    #[serde(default)]
    pub media_paths: Vec<PathBuf>,
    /// Account the post is published under.
    pub account_id: String,
}

impl PublishRequest {
    /// Reject malformed input before any browser work starts.
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(PlumeError::Config("account_id must not be empty".into()));
        }
        if self.title.trim().is_empty() && self.body.trim().is_empty() {
            return Err(PlumeError::Config(
                "request needs at least a title or a body".into(),
            ));
        }
        Ok(())
    }
}

/// Final status of a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Success,
    Failed,
}

/// Verified result of one publish request.
///
/// Created once per request and never mutated after it is returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub status: PublishStatus,
    /// Platform-assigned post identifier, when one could be extracted.
    pub post_id: Option<String>,
    /// Canonical URL of the published post, when known.
    pub post_url: Option<String>,
    /// Classification of the final failure, for failed outcomes.
    pub error_kind: Option<ErrorKind>,
    /// Number of attempts consumed, including the final one.
    pub attempts: u32,
}

impl PublishOutcome {
    pub fn success(post_id: Option<String>, post_url: Option<String>, attempts: u32) -> Self {
        Self {
            status: PublishStatus::Success,
            post_id,
            post_url,
            error_kind: None,
            attempts,
        }
    }

    pub fn failed(error_kind: ErrorKind, attempts: u32) -> Self {
        Self {
            status: PublishStatus::Failed,
            post_id: None,
            post_url: None,
            error_kind: Some(error_kind),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PublishStatus::Success
    }
}

/// Persistent session state for one account: where its cookie jar lives and
/// when a login signal was last confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSession {
    pub account_id: String,
    pub cookies_path: PathBuf,
    pub last_authenticated_at: Option<DateTime<Utc>>,
}

impl AccountSession {
    pub fn new(account_id: impl Into<String>, cookies_path: PathBuf) -> Self {
        Self {
            account_id: account_id.into(),
            cookies_path,
            last_authenticated_at: None,
        }
    }

    /// Record a confirmed login signal.
    pub fn touch(&mut self) {
        self.last_authenticated_at = Some(Utc::now());
    }

    /// Whether a cookie jar exists on disk. Absence is not an error; it
    /// just starts an unauthenticated session.
    pub fn has_cookie_jar(&self) -> bool {
        self.cookies_path.exists()
    }
}
