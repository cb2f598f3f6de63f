//! Configuration management for Plume
//!
//! Loaded from `plume.toml`. All values are plain data; nothing in the
//! publish pipeline branches on how they were loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PlumeError, Result};

/// Top-level Plume configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlumeConfig {
    /// Publish loop behaviour
    #[serde(default)]
    pub publish: PublishSettings,

    /// Browser fingerprint and timing
    #[serde(default)]
    pub browser: BrowserSettings,

    /// On-disk locations
    #[serde(default)]
    pub paths: PathSettings,

    /// Platform entry points
    #[serde(default)]
    pub platform: PlatformSettings,
}

/// Publish loop behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishSettings {
    /// Account the cookie jar belongs to
    #[serde(default = "default_account_id")]
    pub account_id: String,

    /// Run the browser without a visible window
    #[serde(default)]
    pub headless: bool,

    /// Attempts per publish request
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Fixed delay between attempts, seconds
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Leave comments enabled on published posts
    #[serde(default = "default_true")]
    pub enable_comments: bool,

    /// Cross-post to linked platforms
    #[serde(default)]
    pub cross_post: bool,

    /// Delay between posts in a batch, seconds
    #[serde(default = "default_post_interval")]
    pub post_interval_secs: u64,

    /// Wall-clock bound for one whole publish call, seconds
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,
}

/// Browser fingerprint and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// User agent presented to the platform
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Navigation timeout, seconds
    #[serde(default = "default_nav_timeout")]
    pub nav_timeout_secs: u64,
}

/// On-disk locations for cookie jars and failure diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_cookies_dir")]
    pub cookies_dir: PathBuf,

    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: PathBuf,
}

/// Platform entry points. The element candidate tables live in code as
/// data; only the URLs a deployment may need to repoint live here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Authenticated landing surface
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Post-creation form
    #[serde(default = "default_publish_url")]
    pub publish_url: String,

    /// Template for rebuilding a post URL from an extracted id;
    /// `{post_id}` is substituted
    #[serde(default = "default_post_url_template")]
    pub post_url_template: String,
}

fn default_account_id() -> String {
    "default".to_string()
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_post_interval() -> u64 {
    60
}

fn default_overall_timeout() -> u64 {
    600
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36"
        .to_string()
}

fn default_nav_timeout() -> u64 {
    60
}

fn default_cookies_dir() -> PathBuf {
    PathBuf::from("accounts/cookies")
}

fn default_diagnostics_dir() -> PathBuf {
    PathBuf::from("diagnostics")
}

fn default_base_url() -> String {
    "https://creator.xiaohongshu.com".to_string()
}

fn default_publish_url() -> String {
    "https://creator.xiaohongshu.com/publish/publish?from=homepage&target=image".to_string()
}

fn default_post_url_template() -> String {
    "https://www.xiaohongshu.com/explore/{post_id}".to_string()
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            headless: false,
            retry_count: default_retry_count(),
            retry_interval_secs: default_retry_interval(),
            enable_comments: true,
            cross_post: false,
            post_interval_secs: default_post_interval(),
            overall_timeout_secs: default_overall_timeout(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: default_user_agent(),
            nav_timeout_secs: default_nav_timeout(),
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            cookies_dir: default_cookies_dir(),
            diagnostics_dir: default_diagnostics_dir(),
        }
    }
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            publish_url: default_publish_url(),
            post_url_template: default_post_url_template(),
        }
    }
}

impl PlumeConfig {
    /// Load configuration from the given path, or use defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| PlumeError::Config(format!("Invalid config at {:?}: {}", path, e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration to the given path.
    pub fn init(path: &Path) -> Result<Self> {
        let config = Self::default();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(&config)
            .map_err(|e| PlumeError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(config)
    }

    /// Cookie jar location for one account.
    pub fn cookies_path_for(&self, account_id: &str) -> PathBuf {
        self.paths.cookies_dir.join(format!("{}.json", account_id))
    }

    /// Expand the post URL template with an extracted post id.
    pub fn post_url_for(&self, post_id: &str) -> String {
        self.platform.post_url_template.replace("{post_id}", post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlumeConfig::default();
        assert_eq!(config.publish.account_id, "default");
        assert_eq!(config.publish.retry_count, 3);
        assert_eq!(config.publish.retry_interval_secs, 5);
        assert!(config.publish.enable_comments);
        assert!(!config.publish.cross_post);
        assert!(!config.publish.headless);
        assert_eq!(config.browser.window_width, 1920);
        assert_eq!(config.browser.window_height, 1080);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlumeConfig::load_or_default(&dir.path().join("plume.toml")).unwrap();
        assert_eq!(config.publish.retry_count, 3);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plume.toml");
        std::fs::write(&path, "[publish]\naccount_id = \"work\"\nheadless = true\n").unwrap();

        let config = PlumeConfig::load_or_default(&path).unwrap();
        assert_eq!(config.publish.account_id, "work");
        assert!(config.publish.headless);
        assert_eq!(config.publish.retry_count, 3);
        assert_eq!(config.paths.cookies_dir, PathBuf::from("accounts/cookies"));
    }

    #[test]
    fn test_init_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plume.toml");
        PlumeConfig::init(&path).unwrap();
        let config = PlumeConfig::load_or_default(&path).unwrap();
        assert_eq!(config.publish.post_interval_secs, 60);
    }

    #[test]
    fn test_cookies_path_per_account() {
        let config = PlumeConfig::default();
        assert_eq!(
            config.cookies_path_for("work"),
            PathBuf::from("accounts/cookies/work.json")
        );
    }

    #[test]
    fn test_post_url_template() {
        let config = PlumeConfig::default();
        let url = config.post_url_for("abc123");
        assert!(url.ends_with("/abc123"));
    }
}
