//! Small JavaScript helpers over the CDP tab
//!
//! Everything that pokes at the page through `Runtime.evaluate` or a bound
//! `this` function call lives here, so the step modules stay free of inline
//! script-string plumbing.

use headless_chrome::{Element, Tab};
use plume_core::{PlumeError, Result};
use serde_json::Value;

/// Evaluate an expression in the page context and return its JSON value.
pub fn evaluate(tab: &Tab, expr: &str) -> Result<Value> {
    let result = tab
        .evaluate(expr, false)
        .map_err(|e| PlumeError::Other(format!("JavaScript evaluation failed: {}", e)))?;
    Ok(result.value.unwrap_or(Value::Null))
}

/// Quote a Rust string as a JavaScript string literal.
pub fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Whether the element is rendered: attached, displayed and not hidden.
pub fn is_visible(element: &Element) -> bool {
    element
        .call_js_fn(
            "function() { \
                const s = window.getComputedStyle(this); \
                return this.offsetParent !== null \
                    && s.display !== 'none' \
                    && s.visibility !== 'hidden'; \
            }",
            vec![],
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Whether the element accepts interaction (not disabled or read-only).
pub fn is_enabled(element: &Element) -> bool {
    element
        .call_js_fn(
            "function() { return !this.disabled && this.getAttribute('aria-disabled') !== 'true'; }",
            vec![],
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Read back the textual content of an input, textarea or editable element.
pub fn read_content(element: &Element) -> Result<String> {
    let value = element
        .call_js_fn(
            "function() { \
                const tag = this.tagName.toLowerCase(); \
                if (tag === 'input' || tag === 'textarea') { return this.value || ''; } \
                return this.innerText || this.textContent || ''; \
            }",
            vec![],
            false,
        )
        .map_err(|e| PlumeError::Other(format!("Content read-back failed: {}", e)))?;
    Ok(value
        .value
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default())
}

/// Dispatch the notification events frameworks listen for after a
/// programmatic mutation.
pub fn dispatch_input_events(element: &Element) -> Result<()> {
    element
        .call_js_fn(
            "function() { \
                this.dispatchEvent(new Event('input', { bubbles: true })); \
                this.dispatchEvent(new Event('change', { bubbles: true })); \
                this.dispatchEvent(new Event('blur', { bubbles: true })); \
            }",
            vec![],
            false,
        )
        .map_err(|e| PlumeError::Other(format!("Event dispatch failed: {}", e)))?;
    Ok(())
}

/// Count visible elements matching a selector.
pub fn count_visible(tab: &Tab, selector: &str) -> usize {
    let expr = format!(
        "Array.from(document.querySelectorAll({sel})).filter(el => \
            el.offsetParent !== null \
            && window.getComputedStyle(el).display !== 'none' \
            && window.getComputedStyle(el).visibility !== 'hidden').length",
        sel = js_string(selector)
    );
    evaluate(tab, &expr)
        .ok()
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize
}

/// First selector from the list whose match is visible on the page.
pub fn first_visible(tab: &Tab, selectors: &[&str]) -> Option<String> {
    selectors
        .iter()
        .find(|s| count_visible(tab, s) > 0)
        .map(|s| s.to_string())
}

/// Collect the visible text of elements matching a selector, joined with
/// newlines. Used for surfacing platform error messages.
pub fn visible_text(tab: &Tab, selector: &str) -> Option<String> {
    let expr = format!(
        "Array.from(document.querySelectorAll({sel})) \
            .filter(el => el.offsetParent !== null) \
            .map(el => (el.innerText || '').trim()) \
            .filter(t => t.length > 0) \
            .join('\\n')",
        sel = js_string(selector)
    );
    evaluate(tab, &expr)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|t| !t.is_empty())
}

/// Whether the page body currently shows the given text.
pub fn page_contains_text(tab: &Tab, text: &str) -> bool {
    let expr = format!(
        "(document.body && document.body.innerText || '').includes({})",
        js_string(text)
    );
    evaluate(tab, &expr)
        .ok()
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Normalize editor line-break representations back to `\n` so injected
/// text can be compared against what the page reports.
pub fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes_and_newlines() {
        assert_eq!(js_string("a'b"), "\"a'b\"");
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(js_string("a\nb"), "\"a\\nb\"");
    }

    #[test]
    fn test_normalize_line_breaks() {
        assert_eq!(normalize_line_breaks("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert_eq!(normalize_line_breaks("plain"), "plain");
    }
}
