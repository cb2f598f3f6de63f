//! Browser session lifecycle using Chrome DevTools Protocol
//!
//! One [`SessionManager`] owns one Chrome process. Publish attempts borrow
//! tabs from it; the manager handles launch hardening, cookie jar load and
//! persist, and a single teardown-and-recreate recovery when the session
//! stops responding.

use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use plume_core::{BrowserSettings, PlumeError, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Launch flags that keep the platform's automation sniffers quiet.
const HARDENING_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-infobars",
];

/// Script installed before any page script runs, masking the webdriver
/// flag and restoring plugin/language shapes headless Chrome strips.
const FINGERPRINT_MASK: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
    window.chrome = window.chrome || { runtime: {} };
"#;

/// Owns the browser process and hands out configured tabs.
pub struct SessionManager {
    browser: Option<Browser>,
    settings: BrowserSettings,
    headless: bool,
    /// One recovery per manager; a second failure is surfaced.
    recovered: bool,
}

impl SessionManager {
    pub fn new(settings: BrowserSettings, headless: bool) -> Self {
        Self {
            browser: None,
            settings,
            headless,
            recovered: false,
        }
    }

    /// Get a fresh configured tab, launching the browser on first use.
    ///
    /// If the existing browser no longer responds, it is torn down and
    /// relaunched once. A second consecutive failure returns
    /// [`PlumeError::Session`].
    pub async fn tab(&mut self) -> Result<Arc<Tab>> {
        if self.browser.is_none() {
            self.browser = Some(self.launch()?);
        }

        match self.open_tab() {
            Ok(tab) => Ok(tab),
            Err(first) => {
                if self.recovered {
                    return Err(PlumeError::Session(format!(
                        "Browser unusable after recreation: {}",
                        first
                    )));
                }
                warn!("Browser session unresponsive, recreating: {}", first);
                self.recovered = true;
                self.teardown();
                self.browser = Some(self.launch()?);
                self.open_tab().map_err(|e| {
                    PlumeError::Session(format!("Browser unusable after recreation: {}", e))
                })
            }
        }
    }

    fn launch(&self) -> Result<Browser> {
        info!(
            headless = self.headless,
            width = self.settings.window_width,
            height = self.settings.window_height,
            "Launching browser"
        );

        let mut launch_options = LaunchOptions::default_builder()
            .headless(self.headless)
            .window_size(Some((
                self.settings.window_width,
                self.settings.window_height,
            )))
            .build()
            .map_err(|e| PlumeError::Session(format!("Failed to build launch options: {}", e)))?;

        for arg in HARDENING_ARGS {
            launch_options.args.push(OsStr::new(arg));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| PlumeError::Session(format!("Failed to launch browser: {}", e)))?;

        info!("Browser launched");
        Ok(browser)
    }

    /// Open a tab, apply fingerprint hardening, and verify the session
    /// actually executes script.
    fn open_tab(&self) -> Result<Arc<Tab>> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| PlumeError::Session("No browser available".to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| PlumeError::Session(format!("Failed to create tab: {}", e)))?;

        tab.set_default_timeout(Duration::from_secs(self.settings.nav_timeout_secs));

        if let Err(e) = tab.enable_stealth_mode() {
            warn!("Stealth mode unavailable: {}", e);
        }
        tab.set_user_agent(&self.settings.user_agent, Some("zh-CN,zh;q=0.9,en;q=0.8"), None)
            .map_err(|e| PlumeError::Session(format!("Failed to set user agent: {}", e)))?;
        if let Err(e) = tab.evaluate(FINGERPRINT_MASK, false) {
            warn!("Fingerprint mask failed: {}", e);
        }

        // Capability probe. A launched-but-wedged Chrome fails here rather
        // than mid-publish.
        let probe = tab
            .evaluate("1 + 1", false)
            .map_err(|e| PlumeError::Session(format!("Session capability check failed: {}", e)))?;
        if probe.value.and_then(|v| v.as_u64()) != Some(2) {
            return Err(PlumeError::Session(
                "Session capability check returned wrong result".to_string(),
            ));
        }

        debug!("Tab ready");
        Ok(tab)
    }

    /// Restore a saved cookie jar into the tab. A missing jar is not an
    /// error; the caller will go through interactive login instead.
    pub fn load_cookies(&self, tab: &Tab, jar_path: &Path) -> Result<bool> {
        let cookies = read_cookie_jar(jar_path)?;
        if cookies.is_empty() {
            debug!(path = %jar_path.display(), "No cookie jar on disk");
            return Ok(false);
        }

        let count = cookies.len();
        tab.set_cookies(cookies)
            .map_err(|e| PlumeError::Session(format!("Failed to restore cookies: {}", e)))?;

        info!(count, path = %jar_path.display(), "Cookie jar restored");
        Ok(true)
    }

    /// Save the tab's cookies to disk so the next run skips login.
    pub fn persist_cookies(&self, tab: &Tab, jar_path: &Path) -> Result<()> {
        let cookies = tab
            .get_cookies()
            .map_err(|e| PlumeError::Session(format!("Failed to read cookies: {}", e)))?;

        let params: Vec<CookieParam> = cookies
            .into_iter()
            .map(|c| CookieParam {
                name: c.name,
                value: c.value,
                url: None,
                domain: Some(c.domain),
                path: Some(c.path),
                secure: Some(c.secure),
                http_only: Some(c.http_only),
                same_site: c.same_site,
                expires: Some(c.expires),
                priority: Some(c.priority),
                same_party: None,
                source_scheme: None,
                source_port: None,
                partition_key: None,
            })
            .collect();

        write_cookie_jar(jar_path, &params)?;
        info!(count = params.len(), path = %jar_path.display(), "Cookie jar saved");
        Ok(())
    }

    /// Drop the browser process. The next [`tab`](Self::tab) call
    /// relaunches.
    pub fn teardown(&mut self) {
        if self.browser.take().is_some() {
            info!("Browser session torn down");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Read a cookie jar from disk. Missing file yields an empty list.
fn read_cookie_jar(path: &Path) -> Result<Vec<CookieParam>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a cookie jar, creating parent directories as needed.
fn write_cookie_jar(path: &Path, cookies: &[CookieParam]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(cookies)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cookie(name: &str) -> CookieParam {
        CookieParam {
            name: name.to_string(),
            value: "v".to_string(),
            url: None,
            domain: Some(".example.com".to_string()),
            path: Some("/".to_string()),
            secure: Some(true),
            http_only: Some(true),
            same_site: None,
            expires: Some(2_000_000_000.0),
            priority: None,
            same_party: None,
            source_scheme: None,
            source_port: None,
            partition_key: None,
        }
    }

    #[test]
    fn test_new_manager_has_no_browser() {
        let manager = SessionManager::new(BrowserSettings::default(), true);
        assert!(manager.browser.is_none());
        assert!(!manager.recovered);
    }

    #[test]
    fn test_missing_jar_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = read_cookie_jar(&dir.path().join("nobody.json")).unwrap();
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_jar_roundtrip_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("accounts/cookies/work.json");

        write_cookie_jar(&jar, &[sample_cookie("sid"), sample_cookie("token")]).unwrap();
        let cookies = read_cookie_jar(&jar).unwrap();

        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "sid");
        assert_eq!(cookies[1].name, "token");
    }

    #[test]
    fn test_corrupt_jar_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("broken.json");
        std::fs::write(&jar, "not json").unwrap();
        assert!(read_cookie_jar(&jar).is_err());
    }

    #[test]
    fn test_hardening_args_disable_automation_banner() {
        assert!(HARDENING_ARGS
            .iter()
            .any(|a| a.contains("AutomationControlled")));
    }
}
