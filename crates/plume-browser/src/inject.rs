//! Layered content injection with verification
//!
//! Writing into the platform's editors is unreliable: framework-managed
//! inputs ignore plain DOM writes, contenteditable surfaces swallow
//! newlines, and some builds only accept real key events. Each field is
//! therefore filled through a ladder of techniques, cheapest first, and a
//! technique only counts if the page reads back the text we wrote.

use crate::locator::ElementRole;
use crate::{dom, locator};
use headless_chrome::{Element, Tab};
use plume_core::{PlumeError, Result};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Platform cap on title length, in characters.
const TITLE_MAX_CHARS: usize = 50;

/// Hashtag cap per post.
const MAX_TAGS: usize = 10;

/// Platform cap on a single tag, counting the `#`.
const TAG_MAX_CHARS: usize = 21;

/// Inter-keystroke delay bounds for the typing technique, milliseconds.
const TYPE_DELAY_MS: std::ops::RangeInclusive<u64> = 30..=100;

/// Fill the title field, truncating to the platform limit.
pub async fn fill_title(tab: &Tab, title: &str) -> Result<()> {
    let title = truncate_chars(title.trim(), TITLE_MAX_CHARS);
    if title.is_empty() {
        debug!("Empty title, skipping");
        return Ok(());
    }

    let element = locator::resolve(tab, ElementRole::Title)?
        .ok_or_else(|| PlumeError::ElementNotFound("Title field not found".to_string()))?;
    inject_verified(tab, &element, &title, "title").await?;
    info!(chars = title.chars().count(), "Title filled");
    Ok(())
}

/// Fill the body editor.
pub async fn fill_body(tab: &Tab, body: &str) -> Result<()> {
    if body.trim().is_empty() {
        debug!("Empty body, skipping");
        return Ok(());
    }

    let element = locator::resolve(tab, ElementRole::Body)?
        .ok_or_else(|| PlumeError::ElementNotFound("Body editor not found".to_string()))?;
    inject_verified(tab, &element, body, "body").await?;
    info!(chars = body.chars().count(), "Body filled");
    Ok(())
}

/// Append hashtags to the end of the body.
///
/// Tags are normalized first (see [`clean_tags`]); a body that already
/// carries the tag line is left alone so retried attempts do not stack
/// duplicate tags.
pub async fn append_hashtags(tab: &Tab, tags: &[String]) -> Result<()> {
    let cleaned = clean_tags(tags);
    if cleaned.is_empty() {
        debug!("No usable tags, skipping");
        return Ok(());
    }
    let suffix = tags_suffix(&cleaned);

    let element = locator::resolve(tab, ElementRole::Body)?
        .ok_or_else(|| PlumeError::ElementNotFound("Body editor not found".to_string()))?;

    let current = dom::normalize_line_breaks(&dom::read_content(&element)?);
    if current.trim_end().ends_with(suffix.trim()) {
        debug!("Tags already present, skipping");
        return Ok(());
    }

    let target = if current.trim().is_empty() {
        suffix.trim().to_string()
    } else {
        format!("{}\n{}", current.trim_end(), suffix.trim())
    };
    inject_verified(tab, &element, &target, "tags").await?;
    info!(count = cleaned.len(), "Hashtags appended");
    Ok(())
}

/// Normalize raw tags into platform-shaped hashtags: trimmed, `#`-prefixed,
/// capped at [`TAG_MAX_CHARS`] characters including the `#`, empty entries
/// dropped, at most [`MAX_TAGS`] kept.
pub(crate) fn clean_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim().trim_start_matches('#').trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", truncate_chars(t, TAG_MAX_CHARS - 1)))
        .take(MAX_TAGS)
        .collect()
}

/// The line of tags appended after the body text.
pub(crate) fn tags_suffix(cleaned: &[String]) -> String {
    cleaned.join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Whether the page's read-back is an acceptable echo of what we wrote.
///
/// Line breaks are load-bearing: a read-back that flattened them to
/// spaces is a failed write, not a cosmetic difference. Break
/// representations are normalized and only spacing within a line is
/// collapsed before comparing.
pub(crate) fn content_matches(read_back: &str, expected: &str) -> bool {
    let collapse = |s: &str| {
        dom::normalize_line_breaks(s)
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let read = collapse(read_back);
    let want = collapse(expected);
    !want.is_empty() && read.contains(&want)
}

/// Run the technique ladder until one injection verifies.
async fn inject_verified(tab: &Tab, element: &Element<'_>, text: &str, field: &str) -> Result<()> {
    let text = dom::normalize_line_breaks(text);

    if try_native_insert(tab, element, &text) && verify(element, &text) {
        debug!(field, technique = "native", "Injection verified");
        return Ok(());
    }
    warn!(field, "Native insert did not stick, trying scripted mutation");

    if try_scripted(element, &text) && verify(element, &text) {
        debug!(field, technique = "scripted", "Injection verified");
        return Ok(());
    }
    warn!(field, "Scripted injection did not stick, falling back to typing");

    if try_typing(tab, element, &text).await && verify(element, &text) {
        debug!(field, technique = "typing", "Injection verified");
        return Ok(());
    }

    Err(PlumeError::InjectionVerification(format!(
        "No injection technique produced a verifiable {} write",
        field
    )))
}

fn verify(element: &Element<'_>, expected: &str) -> bool {
    match dom::read_content(element) {
        Ok(read_back) => content_matches(&read_back, expected),
        Err(e) => {
            warn!("Read-back failed during verification: {}", e);
            false
        }
    }
}

/// Technique 2: write through the framework's own value setter (or
/// innerHTML for contenteditable) and fire the notification events.
fn try_scripted(element: &Element<'_>, text: &str) -> bool {
    let wrote = element
        .call_js_fn(
            r#"function(text) {
                const tag = this.tagName.toLowerCase();
                if (tag === 'input' || tag === 'textarea') {
                    const proto = tag === 'input'
                        ? HTMLInputElement.prototype
                        : HTMLTextAreaElement.prototype;
                    const desc = Object.getOwnPropertyDescriptor(proto, 'value');
                    if (desc && desc.set) { desc.set.call(this, text); }
                    else { this.value = text; }
                } else {
                    const esc = s => s
                        .replace(/&/g, '&amp;')
                        .replace(/</g, '&lt;')
                        .replace(/>/g, '&gt;');
                    this.innerHTML = text.split('\n').map(esc).join('<br>');
                }
                return true;
            }"#,
            vec![serde_json::Value::String(text.to_string())],
            false,
        )
        .is_ok();
    wrote && element.scroll_into_view().is_ok() && dom::dispatch_input_events(element).is_ok()
}

/// Technique 1: focus the element and insert the text through the input
/// pipeline, line by line with real Enter presses between them.
fn try_native_insert(tab: &Tab, element: &Element<'_>, text: &str) -> bool {
    if !clear(element) || element.click().is_err() {
        return false;
    }
    let mut lines = text.split('\n').peekable();
    while let Some(line) = lines.next() {
        if !line.is_empty() && tab.send_character(line).is_err() {
            return false;
        }
        if lines.peek().is_some() && tab.press_key("Enter").is_err() {
            return false;
        }
    }
    dom::dispatch_input_events(element).is_ok()
}

/// Technique 3: type character by character with human-paced delays.
/// Slowest, but survives editors that validate per keystroke.
async fn try_typing(tab: &Tab, element: &Element<'_>, text: &str) -> bool {
    if !clear(element) || element.click().is_err() {
        return false;
    }
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let ok = if ch == '\n' {
            tab.press_key("Enter").is_ok()
        } else {
            tab.send_character(ch.encode_utf8(&mut buf)).is_ok()
        };
        if !ok {
            return false;
        }
        let delay = rand::thread_rng().gen_range(TYPE_DELAY_MS);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    dom::dispatch_input_events(element).is_ok()
}

fn clear(element: &Element<'_>) -> bool {
    element
        .call_js_fn(
            r#"function() {
                const tag = this.tagName.toLowerCase();
                if (tag === 'input' || tag === 'textarea') { this.value = ''; }
                else { this.innerHTML = ''; }
            }"#,
            vec![],
            false,
        )
        .is_ok()
}
