//! Failure diagnostics
//!
//! When a publish step fails, the page state that caused it is usually
//! gone by the time anyone looks. The sink captures a screenshot and the
//! page HTML at the moment of failure. Capture problems are logged and
//! swallowed; diagnostics must never turn a publish failure into a
//! different failure.

use chrono::Utc;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::Tab;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes failure artifacts into a per-deployment directory.
#[derive(Debug, Clone)]
pub struct DiagnosticsSink {
    dir: PathBuf,
}

impl DiagnosticsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Capture a screenshot and HTML snapshot, tagged with the failing
    /// step and a timestamp. Best effort on every path.
    pub fn capture(&self, tab: &Tab, step: &str) {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), "Cannot create diagnostics dir: {}", e);
            return;
        }

        let png_path = self.dir.join(format!("{}-{}.png", step, stamp));
        match tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true) {
            Ok(png) => {
                if let Err(e) = std::fs::write(&png_path, png) {
                    warn!("Failed to write screenshot: {}", e);
                } else {
                    info!(path = %png_path.display(), "Screenshot captured");
                }
            }
            Err(e) => warn!("Screenshot capture failed: {}", e),
        }

        let html_path = self.dir.join(format!("{}-{}.html", step, stamp));
        match tab.get_content() {
            Ok(html) => {
                if let Err(e) = std::fs::write(&html_path, html) {
                    warn!("Failed to write page snapshot: {}", e);
                } else {
                    info!(path = %html_path.display(), "Page snapshot captured");
                }
            }
            Err(e) => warn!("Page snapshot failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_remembers_directory() {
        let sink = DiagnosticsSink::new("diagnostics/run1");
        assert_eq!(sink.dir(), Path::new("diagnostics/run1"));
    }
}
