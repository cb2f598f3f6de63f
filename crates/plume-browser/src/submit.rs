//! Publish submission and outcome verification
//!
//! Clicking "publish" proves nothing on this platform: the button can eat
//! the first click, the confirmation toast can race the navigation, and a
//! rejection banner can appear seconds later. Submission therefore runs a
//! ladder of click techniques, then watches the page for evidence either
//! way and only reports success on a positive signal.

use crate::diagnostics::DiagnosticsSink;
use crate::locator::ElementRole;
use crate::{dom, locator};
use headless_chrome::{Element, Tab};
use plume_core::{PlumeError, Result};
use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How often outcome signals are re-checked.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on waiting for a verdict after the click.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// During this opening window only high-confidence signals are accepted,
/// so a stale listing surface cannot masquerade as a fresh success.
const HIGH_CONFIDENCE_WINDOW: Duration = Duration::from_secs(5);

/// Toast and banner texts the platform shows on a successful publish.
const SUCCESS_TEXTS: &[&str] = &["发布成功", "已发布", "发布完成", "published successfully"];

/// Outcome evidence gathered after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Post id when one could be extracted from the page URL.
    pub post_id: Option<String>,
    /// URL the page landed on once the outcome was confirmed.
    pub landed_url: String,
}

/// Pull a post id out of a URL, either from a query parameter or a
/// path segment on a post-viewing route.
pub(crate) fn extract_post_id(url: &str) -> Option<String> {
    let by_param = Regex::new(r"(?:noteId|postId|itemId)=([A-Za-z0-9]+)").ok()?;
    if let Some(caps) = by_param.captures(url) {
        return Some(caps[1].to_string());
    }
    let by_path = Regex::new(r"/(?:note|post|explore|item)/([A-Za-z0-9]{6,})").ok()?;
    by_path.captures(url).map(|caps| caps[1].to_string())
}

/// Submit the post and wait for the platform's verdict.
pub async fn submit(tab: &Tab, sink: &DiagnosticsSink) -> Result<Submission> {
    let control = match locator::resolve(tab, ElementRole::SubmitControl)? {
        Some(el) => el,
        None => {
            sink.capture(tab, "submit-control-missing");
            return Err(PlumeError::ElementNotFound(
                "Submit control not found".to_string(),
            ));
        }
    };

    if control.scroll_into_view().is_err() {
        debug!("Submit control would not scroll into view");
    }

    let start_url = tab.get_url();
    if !click_ladder(tab, &control) {
        sink.capture(tab, "submit-click-failed");
        return Err(PlumeError::ElementNotFound(
            "Submit control would not accept activation".to_string(),
        ));
    }
    info!("Submit control activated, verifying outcome");

    match verify_outcome(tab, &start_url).await {
        Ok(submission) => Ok(submission),
        Err(e) => {
            sink.capture(tab, "submit-unverified");
            Err(e)
        }
    }
}

/// Escalate through click techniques until one reports delivery. A
/// delivered click still proves nothing about the outcome; the poll in
/// [`verify_outcome`] is the only arbiter.
fn click_ladder(tab: &Tab, control: &Element<'_>) -> bool {
    if control.click().is_ok() {
        return true;
    }
    debug!("Direct click failed, escalating");

    if control.scroll_into_view().is_ok() && control.click().is_ok() {
        return true;
    }

    if control
        .call_js_fn("function() { this.click(); }", vec![], false)
        .is_ok()
    {
        return true;
    }

    if control
        .call_js_fn(
            "function() { \
                this.dispatchEvent(new MouseEvent('dblclick', { bubbles: true })); \
            }",
            vec![],
            false,
        )
        .is_ok()
    {
        return true;
    }

    if control.focus().is_ok() && tab.press_key("Enter").is_ok() {
        return true;
    }
    warn!("Every click technique failed");
    false
}

/// Watch the page for a verdict.
///
/// Two phases: an opening window that accepts only high-confidence
/// evidence (success toast, post URL, success marker), then a broader
/// phase that also accepts the editor surface being replaced by the
/// listing surface. Rejection banners end the wait immediately.
async fn verify_outcome(tab: &Tab, start_url: &str) -> Result<Submission> {
    let started = Instant::now();
    let deadline = started + VERIFY_TIMEOUT;

    loop {
        if let Some(selector) = dom::first_visible(tab, locator::markers::SUBMIT_ERROR) {
            let message = dom::visible_text(tab, &selector)
                .unwrap_or_else(|| "Platform rejected the post".to_string());
            warn!(message = %message, "Platform rejected the submission");
            return Err(PlumeError::PlatformRejected(message));
        }

        let url = tab.get_url();
        if let Some(post_id) = extract_post_id(&url) {
            info!(post_id = %post_id, "Post URL observed");
            return Ok(Submission {
                post_id: Some(post_id),
                landed_url: url,
            });
        }

        if dom::first_visible(tab, locator::markers::SUCCESS).is_some() {
            info!("Success marker visible");
            return Ok(Submission {
                post_id: extract_post_id(&url),
                landed_url: url,
            });
        }

        if SUCCESS_TEXTS.iter().any(|t| dom::page_contains_text(tab, t)) {
            info!("Success text visible");
            return Ok(Submission {
                post_id: extract_post_id(&url),
                landed_url: url,
            });
        }

        // Weaker evidence: the editor went away and the listing surface
        // took its place. Only meaningful once the opening window passed.
        if started.elapsed() >= HIGH_CONFIDENCE_WINDOW
            && url != start_url
            && dom::first_visible(tab, locator::markers::EDITOR_SURFACE).is_none()
            && dom::first_visible(tab, locator::markers::LISTING_SURFACE).is_some()
        {
            info!("Editor replaced by listing surface");
            return Ok(Submission {
                post_id: None,
                landed_url: url,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PlumeError::SubmitTimeout(format!(
                "No publish outcome signal within {}s",
                VERIFY_TIMEOUT.as_secs()
            )));
        }
        tokio::time::sleep_until(std::cmp::min(now + POLL_INTERVAL, deadline)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_id_from_query_param() {
        assert_eq!(
            extract_post_id("https://example.com/success?noteId=65abc123"),
            Some("65abc123".to_string())
        );
        assert_eq!(
            extract_post_id("https://example.com/done?postId=XYZ999&src=pub"),
            Some("XYZ999".to_string())
        );
    }

    #[test]
    fn test_post_id_from_path_segment() {
        assert_eq!(
            extract_post_id("https://www.xiaohongshu.com/explore/65f0a1b2c3"),
            Some("65f0a1b2c3".to_string())
        );
        assert_eq!(
            extract_post_id("https://example.com/note/abcdef123456?share=1"),
            Some("abcdef123456".to_string())
        );
    }

    #[test]
    fn test_short_path_segments_are_not_post_ids() {
        assert_eq!(extract_post_id("https://example.com/note/ab"), None);
        assert_eq!(extract_post_id("https://example.com/publish/publish"), None);
        assert_eq!(extract_post_id("https://example.com/home"), None);
    }

    #[test]
    fn test_query_param_wins_over_path() {
        assert_eq!(
            extract_post_id("https://example.com/note/pathid123?noteId=paramid456"),
            Some("paramid456".to_string())
        );
    }
}
