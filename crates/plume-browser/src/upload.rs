//! Media upload through the DevTools file-input channel
//!
//! Files are attached by setting them directly on the platform's file
//! input, which works whether or not the input is visible. Completion is
//! never inferred from the attach call: the page is watched for any of
//! several independent signals (preview thumbnails, an editor surface
//! appearing, a URL transition, a 100% progress readout) before the
//! upload counts as done.

use crate::locator::ElementRole;
use crate::{dom, locator};
use headless_chrome::protocol::cdp::DOM;
use headless_chrome::Tab;
use plume_core::{PlumeError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Image formats the platform accepts.
const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// How often completion signals are re-checked.
const POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Upper bound on waiting for the platform to ingest the files.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(90);

/// URL fragments that mean the platform moved on to its editor surface.
const EDITOR_URL_KEYWORDS: &[&str] = &["publish", "edit", "note"];

/// Filter media paths down to files the platform will accept. Rejected
/// entries are logged and skipped rather than failing the publish.
pub(crate) fn validate_media(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|p| {
            if !p.is_file() {
                warn!(path = %p.display(), "Media file missing, skipping");
                return false;
            }
            if !has_allowed_extension(p) {
                warn!(path = %p.display(), "Unsupported media format, skipping");
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

pub(crate) fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .map_or(false, |ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether the URL moved off the start page onto an editor surface.
pub(crate) fn url_reached_editor(start_url: &str, current_url: &str) -> bool {
    if current_url == start_url {
        return false;
    }
    let lower = current_url.to_lowercase();
    EDITOR_URL_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Attach media files and wait for the platform to finish ingesting them.
///
/// Returns the number of files attached. An empty or fully-rejected media
/// list is a no-op, not an error; text-only posts are legitimate.
pub async fn upload_media(tab: &Tab, paths: &[PathBuf]) -> Result<usize> {
    let valid = validate_media(paths);
    if valid.is_empty() {
        if !paths.is_empty() {
            warn!("No usable media files; continuing without upload");
        }
        return Ok(0);
    }

    let start_url = tab.get_url();

    // Some builds only render the file input after the trigger is pressed.
    // Failure here is fine as long as the input itself resolves.
    if let Ok(Some(trigger)) = locator::resolve(tab, ElementRole::UploadTrigger) {
        if trigger.click().is_err() {
            debug!("Upload trigger did not accept a click");
        }
    }

    let input = locator::resolve(tab, ElementRole::FileInput)?
        .ok_or_else(|| PlumeError::ElementNotFound("File input not found".to_string()))?;

    let files: Vec<String> = valid
        .iter()
        .map(|p| {
            p.canonicalize()
                .map(|abs| abs.to_string_lossy().into_owned())
                .map_err(|e| PlumeError::Upload(format!("Cannot resolve {}: {}", p.display(), e)))
        })
        .collect::<Result<_>>()?;

    info!(count = files.len(), "Attaching media files");
    tab.call_method(DOM::SetFileInputFiles {
        files,
        node_id: None,
        backend_node_id: Some(input.backend_node_id),
        object_id: None,
    })
    .map_err(|e| PlumeError::Upload(format!("Failed to set files on input: {}", e)))?;

    wait_for_completion(tab, valid.len(), &start_url).await?;
    info!(count = valid.len(), "Media upload complete");
    Ok(valid.len())
}

/// Poll the page until any completion signal fires.
///
/// The preview-count signal needs two consecutive confirming ticks, since
/// thumbnails can render before the platform has actually ingested the
/// file. Error markers fail fast with whatever message the page shows.
async fn wait_for_completion(tab: &Tab, expected: usize, start_url: &str) -> Result<()> {
    let deadline = Instant::now() + UPLOAD_TIMEOUT;
    let mut previews_confirmed_once = false;

    loop {
        if let Some(selector) = dom::first_visible(tab, locator::markers::UPLOAD_ERROR) {
            let message = dom::visible_text(tab, &selector)
                .unwrap_or_else(|| "Upload error shown by platform".to_string());
            return Err(PlumeError::Upload(message));
        }

        let previews = locator::markers::UPLOAD_PREVIEW
            .iter()
            .map(|s| dom::count_visible(tab, s))
            .max()
            .unwrap_or(0);
        if previews >= expected {
            if previews_confirmed_once {
                debug!(previews, "Preview count stable");
                return Ok(());
            }
            previews_confirmed_once = true;
        } else {
            previews_confirmed_once = false;
        }

        if dom::first_visible(tab, locator::markers::EDITOR_SURFACE).is_some() {
            debug!("Editor surface appeared");
            return Ok(());
        }

        if url_reached_editor(start_url, &tab.get_url()) {
            debug!("URL transitioned to an editor surface");
            return Ok(());
        }

        if let Some(selector) = dom::first_visible(tab, locator::markers::UPLOAD_PROGRESS) {
            if dom::visible_text(tab, &selector).map_or(false, |t| t.contains("100")) {
                debug!("Progress readout reports completion");
                return Ok(());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PlumeError::UploadTimeout(format!(
                "No upload completion signal within {}s for {} file(s)",
                UPLOAD_TIMEOUT.as_secs(),
                expected
            )));
        }
        tokio::time::sleep_until(std::cmp::min(now + POLL_INTERVAL, deadline)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_allow_list() {
        assert!(has_allowed_extension(Path::new("a.png")));
        assert!(has_allowed_extension(Path::new("a.JPG")));
        assert!(has_allowed_extension(Path::new("dir/photo.jpeg")));
        assert!(has_allowed_extension(Path::new("a.webp")));
        assert!(!has_allowed_extension(Path::new("a.bmp")));
        assert!(!has_allowed_extension(Path::new("a.mp4")));
        assert!(!has_allowed_extension(Path::new("noext")));
    }

    #[test]
    fn test_validate_media_drops_missing_and_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("photo.png");
        let wrong_format = dir.path().join("doc.pdf");
        std::fs::write(&good, b"fake png").unwrap();
        std::fs::write(&wrong_format, b"fake pdf").unwrap();
        let missing = dir.path().join("gone.jpg");

        let valid = validate_media(&[good.clone(), wrong_format, missing]);
        assert_eq!(valid, vec![good]);
    }

    #[test]
    fn test_url_transition_requires_a_change() {
        let start = "https://creator.example.com/publish/publish";
        assert!(!url_reached_editor(start, start));
        assert!(url_reached_editor(start, "https://creator.example.com/publish/edit?id=1"));
        assert!(url_reached_editor(start, "https://creator.example.com/note/abc"));
        assert!(!url_reached_editor(start, "https://creator.example.com/home"));
    }
}
