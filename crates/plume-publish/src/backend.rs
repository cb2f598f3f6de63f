//! Backend seam between the publish engine and the browser
//!
//! The engine's retry and sequencing logic is independent of Chrome: it
//! talks to a [`PublishBackend`] that opens attempts, and drives each
//! attempt through the pipeline steps. The production implementation
//! wraps the browser session; tests script the step results directly.

use async_trait::async_trait;
use plume_core::Result;
use std::path::PathBuf;

/// Evidence of a confirmed post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRef {
    pub post_id: Option<String>,
    pub post_url: Option<String>,
}

/// One publish attempt: a page on the platform's publish surface plus
/// whatever session state it needs.
///
/// Steps are called in pipeline order by the engine. [`close`] is always
/// called exactly once per opened attempt, success or not, and is where
/// session state (cookies) gets persisted.
#[async_trait]
pub trait AttemptHandle: Send {
    /// Verify login, waiting for a manual login when needed, then land
    /// on the publish form.
    async fn authenticate(&mut self) -> Result<()>;

    /// Attach media and wait for ingestion. Returns files attached.
    async fn upload_media(&mut self, paths: &[PathBuf]) -> Result<usize>;

    /// Fill title and body with verified injection.
    async fn fill_content(&mut self, title: &str, body: &str) -> Result<()>;

    /// Append normalized hashtags to the body.
    async fn append_hashtags(&mut self, tags: &[String]) -> Result<()>;

    /// Align the comment and cross-post toggles with configuration.
    async fn configure_options(&mut self) -> Result<()>;

    /// Click publish and wait for a confirmed outcome.
    async fn submit(&mut self) -> Result<PostRef>;

    /// Persist session state and release the page.
    async fn close(&mut self) -> Result<()>;
}

/// Source of publish attempts.
#[async_trait]
pub trait PublishBackend: Send + Sync {
    type Attempt: AttemptHandle;

    async fn open_attempt(&self, account_id: &str) -> Result<Self::Attempt>;
}
