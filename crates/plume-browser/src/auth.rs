//! Authentication verification
//!
//! Login state is never assumed from a restored cookie jar. The controller
//! navigates to the authenticated landing surface and polls independent
//! signals (avatar markers, URL shape, page title) until one confirms the
//! session, leaving room for a human to complete an interactive login in
//! the visible window.

use crate::{dom, locator};
use headless_chrome::Tab;
use plume_core::{PlumeError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How often login signals are re-checked.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on waiting for login, covering a manual QR-code scan.
const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Path fragments that mean the platform bounced us to a login surface.
const LOGIN_URL_KEYWORDS: &[&str] = &["login", "signin", "sign-in", "auth", "verify"];

/// Title fragments shown on login and verification pages.
const LOGIN_TITLE_KEYWORDS: &[&str] = &["登录", "login", "验证"];

/// Whether a URL looks like a login or verification surface.
pub(crate) fn url_indicates_login(url: &str) -> bool {
    let lower = url.to_lowercase();
    LOGIN_URL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Whether a URL is on the platform's own host.
pub(crate) fn url_on_platform(url: &str, base_url: &str) -> bool {
    host_of(base_url).map_or(false, |host| {
        host_of(url).map_or(false, |h| h == host || h.ends_with(&format!(".{}", host)))
    })
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split(['/', '?', '#']).next()?;
    Some(host.split(':').next().unwrap_or(host))
}

/// One synchronous snapshot of the login signals.
fn login_confirmed(tab: &Tab, base_url: &str) -> bool {
    // Strongest signal: a logged-in avatar or profile element.
    if dom::first_visible(tab, locator::markers::AUTHENTICATED).is_some() {
        debug!("Authenticated marker visible");
        return true;
    }

    // URL shape: on the platform host and not on a login surface.
    let url = tab.get_url();
    if url_on_platform(&url, base_url) && !url_indicates_login(&url) {
        // Confirm with the title so a slow login redirect does not pass.
        let title = tab.get_title().unwrap_or_default().to_lowercase();
        if !title.is_empty()
            && !LOGIN_TITLE_KEYWORDS
                .iter()
                .any(|kw| title.contains(&kw.to_lowercase()))
        {
            debug!(url = %url, "URL and title indicate an authenticated session");
            return true;
        }
    }

    false
}

/// Poll `check` at a fixed interval until it passes or the deadline
/// expires, then give `final_check` one last word.
///
/// The first check runs immediately and another runs exactly at the
/// deadline, so a signal that appears on the boundary still counts.
pub(crate) async fn wait_for_signal<C, F>(
    mut check: C,
    final_check: F,
    interval: Duration,
    timeout: Duration,
) -> bool
where
    C: FnMut() -> bool,
    F: FnOnce() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep_until(std::cmp::min(now + interval, deadline)).await;
    }
    final_check()
}

/// Verify the session is logged in, waiting for a manual login if needed.
///
/// Navigates to the landing surface first; signals are then polled without
/// reloading so an in-progress QR scan is not disturbed. When the window
/// closes without a signal, the page is reloaded once and re-checked in
/// case the platform stalled a redirect.
pub async fn ensure_authenticated(tab: &Tab, base_url: &str) -> Result<()> {
    info!(url = base_url, "Verifying login state");

    tab.navigate_to(base_url)
        .map_err(|e| PlumeError::Session(format!("Failed to open {}: {}", base_url, e)))?;
    tab.wait_until_navigated()
        .map_err(|e| PlumeError::Session(format!("Navigation to {} timed out: {}", base_url, e)))?;

    if login_confirmed(tab, base_url) {
        info!("Already authenticated");
        return Ok(());
    }

    info!(
        timeout_secs = AUTH_TIMEOUT.as_secs(),
        "Not logged in; waiting for login to complete"
    );

    let confirmed = wait_for_signal(
        || login_confirmed(tab, base_url),
        || {
            // One reload in case a redirect wedged after the scan.
            if tab.reload(false, None).is_err() {
                return false;
            }
            if tab.wait_until_navigated().is_err() {
                return false;
            }
            login_confirmed(tab, base_url)
        },
        POLL_INTERVAL,
        AUTH_TIMEOUT,
    )
    .await;

    if confirmed {
        info!("Login confirmed");
        Ok(())
    } else {
        warn!("Login window expired without a confirming signal");
        Err(PlumeError::AuthenticationTimeout(format!(
            "No login signal within {}s at {}",
            AUTH_TIMEOUT.as_secs(),
            base_url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_url_login_keywords() {
        assert!(url_indicates_login("https://creator.example.com/login"));
        assert!(url_indicates_login("https://example.com/passport/SignIn"));
        assert!(url_indicates_login("https://example.com/verify?code=1"));
        assert!(!url_indicates_login("https://creator.example.com/publish"));
    }

    #[test]
    fn test_url_on_platform_matches_host_and_subdomains() {
        let base = "https://creator.xiaohongshu.com";
        assert!(url_on_platform("https://creator.xiaohongshu.com/home", base));
        assert!(url_on_platform("https://app.creator.xiaohongshu.com/x", base));
        assert!(!url_on_platform("https://evil.com/creator.xiaohongshu.com", base));
        assert!(!url_on_platform("not a url", base));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_on_third_poll() {
        let polls = Cell::new(0u32);
        let confirmed = wait_for_signal(
            || {
                polls.set(polls.get() + 1);
                polls.get() >= 3
            },
            || panic!("final check must not run when polling succeeds"),
            Duration::from_secs(5),
            Duration::from_secs(120),
        )
        .await;
        assert!(confirmed);
        assert_eq!(polls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_exactly_at_deadline_counts() {
        let start = Instant::now();
        let confirmed = wait_for_signal(
            || start.elapsed() >= Duration::from_secs(120),
            || panic!("final check must not run when the deadline poll passes"),
            Duration::from_secs(5),
            Duration::from_secs(120),
        )
        .await;
        assert!(confirmed);
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_recheck_rescues_timeout() {
        let confirmed = wait_for_signal(
            || false,
            || true,
            Duration::from_secs(5),
            Duration::from_secs(120),
        )
        .await;
        assert!(confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_polls_the_full_window() {
        let polls = Cell::new(0u32);
        let confirmed = wait_for_signal(
            || {
                polls.set(polls.get() + 1);
                false
            },
            || false,
            Duration::from_secs(5),
            Duration::from_secs(120),
        )
        .await;
        assert!(!confirmed);
        // t = 0, 5, ..., 120 inclusive.
        assert_eq!(polls.get(), 25);
    }
}
