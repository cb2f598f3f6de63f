//! Production backend: publish attempts over a real browser session

use crate::backend::{AttemptHandle, PostRef, PublishBackend};
use async_trait::async_trait;
use headless_chrome::Tab;
use plume_browser::{auth, inject, options, submit, upload, DiagnosticsSink, SessionManager};
use plume_core::{AccountSession, PlumeConfig, PlumeError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Opens attempts against one shared browser session.
pub struct BrowserBackend {
    session: Arc<Mutex<SessionManager>>,
    config: Arc<PlumeConfig>,
    sink: DiagnosticsSink,
}

impl BrowserBackend {
    pub fn new(config: Arc<PlumeConfig>) -> Self {
        let session = SessionManager::new(
            config.browser.clone(),
            config.publish.headless,
        );
        let sink = DiagnosticsSink::new(config.paths.diagnostics_dir.clone());
        Self {
            session: Arc::new(Mutex::new(session)),
            config,
            sink,
        }
    }
}

#[async_trait]
impl PublishBackend for BrowserBackend {
    type Attempt = BrowserAttempt;

    async fn open_attempt(&self, account_id: &str) -> Result<BrowserAttempt> {
        let tab = self.session.lock().await.tab().await?;
        Ok(BrowserAttempt {
            tab,
            session: Arc::clone(&self.session),
            config: Arc::clone(&self.config),
            sink: self.sink.clone(),
            account: AccountSession::new(account_id, self.config.cookies_path_for(account_id)),
        })
    }
}

/// One attempt: a tab on the publish surface plus the account's session
/// record.
pub struct BrowserAttempt {
    tab: Arc<Tab>,
    session: Arc<Mutex<SessionManager>>,
    config: Arc<PlumeConfig>,
    sink: DiagnosticsSink,
    account: AccountSession,
}

impl BrowserAttempt {
    fn capture_on<T>(&self, step: &str, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.sink.capture(&self.tab, step);
        }
        result
    }

    /// Record when this account last confirmed a login, next to its jar.
    fn write_session_record(&self) -> Result<()> {
        let path = self.account.cookies_path.with_extension("session.json");
        std::fs::write(&path, serde_json::to_string_pretty(&self.account)?)?;
        Ok(())
    }
}

#[async_trait]
impl AttemptHandle for BrowserAttempt {
    async fn authenticate(&mut self) -> Result<()> {
        {
            let session = self.session.lock().await;
            match session.load_cookies(&self.tab, &self.account.cookies_path) {
                Ok(true) => debug!("Session cookies restored"),
                Ok(false) => debug!("Starting without saved cookies"),
                Err(e) => warn!("Cookie restore failed, continuing logged out: {}", e),
            }
        }

        let verified = auth::ensure_authenticated(&self.tab, &self.config.platform.base_url).await;
        self.capture_on("auth", verified)?;
        self.account.touch();

        self.tab
            .navigate_to(&self.config.platform.publish_url)
            .map_err(|e| PlumeError::Session(format!("Failed to open publish form: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| PlumeError::Session(format!("Publish form did not load: {}", e)))?;
        Ok(())
    }

    async fn upload_media(&mut self, paths: &[PathBuf]) -> Result<usize> {
        let result = upload::upload_media(&self.tab, paths).await;
        self.capture_on("upload", result)
    }

    async fn fill_content(&mut self, title: &str, body: &str) -> Result<()> {
        // A missing or stubborn title field degrades the post; a missing
        // body fails it.
        if let Err(e) = inject::fill_title(&self.tab, title).await {
            warn!("Title fill failed, continuing with body: {}", e);
        }
        let result = inject::fill_body(&self.tab, body).await;
        self.capture_on("content", result)
    }

    async fn append_hashtags(&mut self, tags: &[String]) -> Result<()> {
        let result = inject::append_hashtags(&self.tab, tags).await;
        self.capture_on("tags", result)
    }

    async fn configure_options(&mut self) -> Result<()> {
        options::apply_publish_options(
            &self.tab,
            self.config.publish.enable_comments,
            self.config.publish.cross_post,
        )
        .await
    }

    async fn submit(&mut self) -> Result<PostRef> {
        let submission = submit::submit(&self.tab, &self.sink).await?;
        let post_url = submission
            .post_id
            .as_ref()
            .map(|id| self.config.post_url_for(id));
        Ok(PostRef {
            post_id: submission.post_id,
            post_url,
        })
    }

    async fn close(&mut self) -> Result<()> {
        // Persist whatever the session learned (fresh login cookies,
        // rotated tokens) before releasing the page.
        {
            let session = self.session.lock().await;
            if let Err(e) = session.persist_cookies(&self.tab, &self.account.cookies_path) {
                warn!("Cookie persist failed: {}", e);
            }
        }
        if let Err(e) = self.write_session_record() {
            warn!("Session record write failed: {}", e);
        }
        if let Err(e) = self.tab.close(false) {
            debug!("Tab close reported: {}", e);
        }
        Ok(())
    }
}
