//! Publish option toggles
//!
//! Comments and cross-posting are switches on the publish form. Setting
//! them is best effort: a platform build that hides or renames a toggle
//! should not sink the publish, so every miss is a warning, never an
//! error.

use crate::locator::{self, ElementRole};
use headless_chrome::{Element, Tab};
use plume_core::Result;
use tracing::{debug, warn};

/// Bring the publish-form toggles in line with the requested settings.
pub async fn apply_publish_options(tab: &Tab, enable_comments: bool, cross_post: bool) -> Result<()> {
    set_toggle(tab, ElementRole::CommentToggle, enable_comments, "comments");
    set_toggle(tab, ElementRole::SyncToggle, cross_post, "cross-post");
    Ok(())
}

fn set_toggle(tab: &Tab, role: ElementRole, desired: bool, name: &str) {
    let element = match locator::resolve(tab, role) {
        Ok(Some(el)) => el,
        Ok(None) => {
            warn!(toggle = name, "Toggle not found, leaving platform default");
            return;
        }
        Err(e) => {
            warn!(toggle = name, "Toggle resolution failed: {}", e);
            return;
        }
    };

    match toggle_state(&element) {
        Some(current) if current == desired => {
            debug!(toggle = name, desired, "Toggle already correct");
        }
        Some(_) => {
            if element.click().is_err() {
                warn!(toggle = name, "Toggle did not accept a click");
            } else if toggle_state(&element) != Some(desired) {
                warn!(toggle = name, "Toggle state did not change after click");
            } else {
                debug!(toggle = name, desired, "Toggle flipped");
            }
        }
        None => warn!(toggle = name, "Cannot read toggle state, leaving it alone"),
    }
}

/// Read a switch's on/off state, covering checkbox inputs and the usual
/// ARIA and class conventions for styled switches.
fn toggle_state(element: &Element<'_>) -> Option<bool> {
    element
        .call_js_fn(
            r#"function() {
                if (this.tagName.toLowerCase() === 'input') { return !!this.checked; }
                const aria = this.getAttribute('aria-checked');
                if (aria !== null) { return aria === 'true'; }
                const cls = this.classList;
                if (cls.contains('checked') || cls.contains('active') || cls.contains('on')
                    || cls.contains('is-checked')) { return true; }
                if (cls.contains('unchecked') || cls.contains('off')) { return false; }
                return null;
            }"#,
            vec![],
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_bool())
}
