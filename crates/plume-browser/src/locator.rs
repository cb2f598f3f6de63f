//! Selector-agnostic element resolution
//!
//! Every interactive element is addressed by a semantic [`ElementRole`].
//! A role maps to a ranked list of [`CandidateLocator`]s — plain data, so
//! the lists can grow when the platform redesigns its surface without any
//! control-flow changes. Resolution tries the ranked candidates under a
//! short per-candidate budget, then falls back to a scripted scan of every
//! input-capable element on the page, scored by role keywords.

use crate::dom;
use headless_chrome::{Element, Tab};
use plume_core::Result;
use std::time::Duration;
use tracing::{debug, trace};

/// Semantic purpose of a UI element, independent of any concrete selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Title,
    Body,
    UploadTrigger,
    FileInput,
    SubmitControl,
    CommentToggle,
    SyncToggle,
}

impl ElementRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementRole::Title => "Title",
            ElementRole::Body => "Body",
            ElementRole::UploadTrigger => "UploadTrigger",
            ElementRole::FileInput => "FileInput",
            ElementRole::SubmitControl => "SubmitControl",
            ElementRole::CommentToggle => "CommentToggle",
            ElementRole::SyncToggle => "SyncToggle",
        }
    }

    /// Selector for the tags this role is allowed to resolve to.
    fn expected_tags(&self) -> &'static str {
        match self {
            ElementRole::Title => "input",
            ElementRole::Body => "textarea, div[contenteditable], [role=\"textbox\"]",
            ElementRole::UploadTrigger => "button, [role=\"button\"]",
            ElementRole::FileInput => "input[type=\"file\"]",
            ElementRole::SubmitControl => "button, [role=\"button\"]",
            ElementRole::CommentToggle | ElementRole::SyncToggle => {
                "input[type=\"checkbox\"], [role=\"switch\"], .switch, .toggle"
            }
        }
    }

    /// Hidden elements are acceptable for file inputs; platforms routinely
    /// hide them behind styled triggers.
    fn requires_visibility(&self) -> bool {
        !matches!(self, ElementRole::FileInput)
    }
}

/// Strategy for one resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// A literal CSS selector tried as-is.
    StaticSelector,
    /// A keyword-scored scan over all candidate elements on the page;
    /// the pattern is a comma-separated keyword list.
    ScriptedScan,
    /// A regex matched against visible button/link text.
    VisibleTextMatch,
}

/// One (strategy, pattern) pair in a role's ranked list.
#[derive(Debug, Clone, Copy)]
pub struct CandidateLocator {
    pub strategy: StrategyKind,
    pub pattern: &'static str,
}

// Struct literals so the per-role arrays promote to 'static.
macro_rules! sel {
    ($pattern:literal) => {
        CandidateLocator {
            strategy: StrategyKind::StaticSelector,
            pattern: $pattern,
        }
    };
}

macro_rules! scan {
    ($pattern:literal) => {
        CandidateLocator {
            strategy: StrategyKind::ScriptedScan,
            pattern: $pattern,
        }
    };
}

macro_rules! text {
    ($pattern:literal) => {
        CandidateLocator {
            strategy: StrategyKind::VisibleTextMatch,
            pattern: $pattern,
        }
    };
}

/// Ranked candidate list for a role. Order matters: the first candidate
/// that yields a usable element wins.
pub fn candidates(role: ElementRole) -> &'static [CandidateLocator] {
    match role {
        ElementRole::Title => &[
            sel!("input[placeholder=\"添加标题\"]"),
            sel!("input[placeholder=\"输入标题\"]"),
            sel!("input[data-testid=\"title-input\"]"),
            sel!(".title-input input"),
            sel!(".editor-title input"),
            sel!(".publish-form input[name=\"title\"]"),
            sel!("input[id*=\"title\"]"),
            sel!("input[class*=\"title\"]"),
            sel!("[aria-label*=\"标题\"]"),
            scan!("title,标题"),
        ],
        ElementRole::Body => &[
            sel!("textarea[placeholder=\"输入正文内容\"]"),
            sel!("textarea[placeholder*=\"正文\"]"),
            sel!("textarea[placeholder*=\"内容\"]"),
            sel!("textarea[data-testid=\"content-input\"]"),
            sel!(".publish-content textarea"),
            sel!(".content-area textarea"),
            sel!(".editor-wrapper textarea"),
            sel!("textarea[class*=\"content\"]"),
            sel!("div[contenteditable=\"true\"]"),
            sel!("[role=\"textbox\"]"),
            sel!(".ql-editor"),
            sel!(".ProseMirror"),
            sel!("[aria-label*=\"正文\"]"),
            scan!("content,body,正文,内容"),
        ],
        ElementRole::UploadTrigger => &[
            sel!("[data-testid=\"upload-button\"]"),
            sel!(".upload-btn"),
            sel!(".btn-upload"),
            sel!(".image-upload-button"),
            sel!(".upload-section button"),
            sel!("[aria-label=\"上传图片\"]"),
            text!("上传图片|选择图片|上传照片|添加图片|upload"),
            scan!("upload,上传"),
        ],
        ElementRole::FileInput => &[
            sel!("input[type=\"file\"][accept*=\"image\"]"),
            sel!(".upload-input input[type=\"file\"]"),
            sel!("[data-testid=\"file-upload-input\"]"),
            sel!(".image-uploader input[type=\"file\"]"),
            sel!("input[type=\"file\"]"),
            scan!("file,image,upload"),
        ],
        ElementRole::SubmitControl => &[
            sel!("[data-testid=\"publish-button\"]"),
            sel!("button[type=\"button\"].publish-btn"),
            sel!(".publish-button"),
            sel!(".btn-publish"),
            sel!(".publish-footer .btn-primary"),
            sel!(".editor-footer .btn-primary"),
            sel!("button[class*=\"publish\"][class*=\"primary\"]"),
            sel!("button[aria-label*=\"发布\"]"),
            sel!("button[type=\"submit\"]"),
            text!("发布笔记|发布|提交|发送|publish|post"),
            scan!("publish,submit,发布"),
        ],
        ElementRole::CommentToggle => &[
            sel!("[data-testid=\"comment-toggle\"]"),
            sel!("input[name=\"allowComments\"]"),
            sel!(".comment-switch"),
            sel!("[class*=\"comment\"][class*=\"switch\"]"),
            sel!("[class*=\"comment\"][class*=\"toggle\"]"),
            scan!("comment,评论"),
        ],
        ElementRole::SyncToggle => &[
            sel!("[data-testid=\"sync-toggle\"]"),
            sel!("input[name=\"syncToOtherPlatforms\"]"),
            sel!(".sync-switch"),
            sel!("[class*=\"sync\"][class*=\"switch\"]"),
            sel!("[class*=\"sync\"][class*=\"toggle\"]"),
            scan!("sync,同步"),
        ],
    }
}

/// Role-tagged marker selector sets. These are observation signals, not
/// interaction targets, so they bypass [`resolve`] and are consumed as
/// plain lists by the auth/upload/submit steps.
pub mod markers {
    pub const AUTHENTICATED: &[&str] = &[
        ".user-avatar",
        ".login-success",
        "[class*=\"avatar\"][class*=\"user\"]",
        ".nav-user-avatar",
        ".profile-avatar",
        "[data-testid=\"user-avatar\"]",
        ".header-user-info",
        ".account-avatar",
        ".user-info",
        ".user-menu",
    ];

    pub const UPLOAD_PREVIEW: &[&str] = &[
        ".image-preview-item",
        "[data-testid=\"image-preview\"]",
        ".preview-image",
        ".uploaded-image",
        ".image-item",
    ];

    pub const UPLOAD_PROGRESS: &[&str] = &[
        ".upload-progress",
        ".progress-bar",
        ".uploading-indicator",
        ".progress-item",
    ];

    pub const UPLOAD_ERROR: &[&str] = &[
        ".upload-error",
        ".error-message",
        ".error-tip",
        "[data-testid=\"upload-error\"]",
        ".upload-fail",
        "[class*=\"error\"][class*=\"upload\"]",
    ];

    pub const EDITOR_SURFACE: &[&str] = &[
        ".publish-container",
        ".editor-container",
        ".note-editor",
        "[data-testid=\"publish-editor\"]",
        ".title-input",
        ".content-area",
        ".editor-wrapper",
    ];

    pub const SUCCESS: &[&str] = &[
        ".publish-success",
        "[data-testid=\"publish-success\"]",
        ".success-message",
        ".publish-success-modal",
        ".publish-success-toast",
        ".ant-message-success",
        ".el-message--success",
        ".toast-success",
        ".notification-success",
    ];

    pub const SUBMIT_ERROR: &[&str] = &[
        ".error-message",
        ".publish-error",
        ".error-tip",
        ".dialog-error",
        ".ant-message-error",
        ".el-message--error",
        ".toast-error",
        ".notification-error",
    ];

    pub const LISTING_SURFACE: &[&str] = &[
        ".note-list",
        ".note-grid",
        ".my-notes",
        ".notes-container",
        "[data-testid=\"note-list\"]",
        ".creator-center",
        ".content-management",
    ];
}

/// Budget for each individual candidate, so a long list never accumulates
/// minutes of waiting.
const PER_CANDIDATE_TIMEOUT: Duration = Duration::from_millis(800);

/// Try candidates in order against a probe, returning the first hit along
/// with its index. Pure sequencing logic, split out so fall-through order
/// is testable without a browser.
pub(crate) fn first_match<T>(
    cands: &[CandidateLocator],
    mut probe: impl FnMut(&CandidateLocator) -> Option<T>,
) -> Option<(usize, T)> {
    for (idx, cand) in cands.iter().enumerate() {
        if let Some(found) = probe(cand) {
            return Some((idx, found));
        }
    }
    None
}

/// Find a usable element for a role.
///
/// Three tiers: the role's ranked candidate list, then a keyword-scored
/// scripted scan, then the scan's first-visible-of-expected-tag fallback.
/// Returns `None` only when every tier comes up empty.
pub fn resolve<'a>(tab: &'a Tab, role: ElementRole) -> Result<Option<Element<'a>>> {
    let ranked = candidates(role);
    debug!(role = role.as_str(), candidates = ranked.len(), "Resolving element");

    if let Some((idx, element)) = first_match(ranked, |cand| try_candidate(tab, role, cand)) {
        debug!(
            role = role.as_str(),
            candidate = idx,
            pattern = ranked[idx].pattern,
            "Resolved via ranked candidate"
        );
        return Ok(Some(element));
    }

    // Last resort: score every input-capable element on the page.
    let keywords = scan_keywords(role);
    if let Some(selector) = scripted_scan(tab, role, keywords, true) {
        debug!(role = role.as_str(), selector = %selector, "Resolved via heuristic scan");
        if let Ok(element) = tab.find_element(&selector) {
            return Ok(Some(element));
        }
    }

    debug!(role = role.as_str(), "No element found by any strategy");
    Ok(None)
}

/// Keyword list used when the ranked candidates are exhausted.
fn scan_keywords(role: ElementRole) -> &'static str {
    match role {
        ElementRole::Title => "title,标题",
        ElementRole::Body => "content,body,正文,内容",
        ElementRole::UploadTrigger => "upload,上传",
        ElementRole::FileInput => "file,image,upload",
        ElementRole::SubmitControl => "publish,submit,发布,提交",
        ElementRole::CommentToggle => "comment,评论",
        ElementRole::SyncToggle => "sync,同步",
    }
}

fn try_candidate<'a>(
    tab: &'a Tab,
    role: ElementRole,
    cand: &CandidateLocator,
) -> Option<Element<'a>> {
    let found = match cand.strategy {
        StrategyKind::StaticSelector => tab
            .wait_for_element_with_custom_timeout(cand.pattern, PER_CANDIDATE_TIMEOUT)
            .ok(),
        StrategyKind::VisibleTextMatch => {
            let selector = text_match_scan(tab, role, cand.pattern)?;
            tab.find_element(&selector).ok()
        }
        StrategyKind::ScriptedScan => {
            let selector = scripted_scan(tab, role, cand.pattern, false)?;
            tab.find_element(&selector).ok()
        }
    };

    match found {
        Some(element) if usable(&element, role) => Some(element),
        Some(_) => {
            trace!(pattern = cand.pattern, "Candidate matched an unusable element");
            None
        }
        None => None,
    }
}

/// A usable element is enabled, visible (unless the role tolerates hidden
/// elements) and of an interaction-appropriate tag.
fn usable(element: &Element, role: ElementRole) -> bool {
    if !dom::is_enabled(element) {
        return false;
    }
    if role.requires_visibility() && !dom::is_visible(element) {
        return false;
    }
    element
        .call_js_fn(
            &format!(
                "function() {{ return this.matches({}); }}",
                dom::js_string(role.expected_tags())
            ),
            vec![],
            false,
        )
        .ok()
        .and_then(|r| r.value)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// JS fragment that builds a stable CSS path for an element, preferring
/// ids and test ids over positional paths.
const CSS_PATH_FN: &str = r#"
    const cssPath = (el) => {
        if (el.id) return '#' + CSS.escape(el.id);
        if (el.dataset && el.dataset.testid) return '[data-testid="' + el.dataset.testid + '"]';
        const parts = [];
        let cur = el;
        while (cur && cur.nodeType === 1 && parts.length < 8) {
            if (cur.id) { parts.unshift('#' + CSS.escape(cur.id)); break; }
            let part = cur.tagName.toLowerCase();
            const parent = cur.parentElement;
            if (parent) {
                const same = Array.from(parent.children).filter(c => c.tagName === cur.tagName);
                if (same.length > 1) part += ':nth-of-type(' + (same.indexOf(cur) + 1) + ')';
            }
            parts.unshift(part);
            cur = parent;
        }
        return parts.join(' > ');
    };
"#;

/// Scan all candidate-tag elements, score them by keyword hits over
/// placeholder/class/id/aria-label, and return a CSS path to the best.
/// With `allow_fallback`, an unscored first visible element of the
/// expected tag is accepted.
fn scripted_scan(
    tab: &Tab,
    role: ElementRole,
    keywords: &str,
    allow_fallback: bool,
) -> Option<String> {
    let keyword_list: Vec<&str> = keywords.split(',').map(str::trim).collect();
    let expr = format!(
        r#"(() => {{
            {css_path}
            const keywords = {keywords};
            const requireVisible = {require_visible};
            const visible = el => el.offsetParent !== null
                && window.getComputedStyle(el).display !== 'none'
                && window.getComputedStyle(el).visibility !== 'hidden';
            const els = Array.from(document.querySelectorAll({tags}))
                .filter(el => !el.disabled && (!requireVisible || visible(el)));
            let best = null, bestScore = 0;
            for (const el of els) {{
                const hay = ((el.placeholder || '') + ' ' + (el.className || '') + ' '
                    + (el.id || '') + ' ' + (el.getAttribute('aria-label') || '')).toLowerCase();
                let score = 0;
                for (const kw of keywords) {{ if (hay.includes(kw)) score += 1; }}
                if (score > bestScore) {{ best = el; bestScore = score; }}
            }}
            if (!best && {allow_fallback} && els.length > 0) best = els[0];
            return best ? cssPath(best) : null;
        }})()"#,
        css_path = CSS_PATH_FN,
        keywords = serde_json::Value::from(
            keyword_list
                .iter()
                .map(|k| serde_json::Value::String(k.to_lowercase()))
                .collect::<Vec<_>>()
        ),
        require_visible = role.requires_visibility(),
        tags = dom::js_string(role.expected_tags()),
        allow_fallback = allow_fallback,
    );
    dom::evaluate(tab, &expr)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
}

/// Find a visible control whose text matches the pattern.
fn text_match_scan(tab: &Tab, role: ElementRole, pattern: &str) -> Option<String> {
    let expr = format!(
        r#"(() => {{
            {css_path}
            const pattern = new RegExp({pattern});
            const els = Array.from(document.querySelectorAll({tags}));
            for (const el of els) {{
                if (el.offsetParent === null) continue;
                const text = (el.innerText || el.textContent || '').trim();
                const label = el.getAttribute('aria-label') || '';
                if (pattern.test(text) || pattern.test(label)) return cssPath(el);
            }}
            return null;
        }})()"#,
        css_path = CSS_PATH_FN,
        pattern = dom::js_string(pattern),
        tags = dom::js_string(role.expected_tags()),
    );
    dom::evaluate(tab, &expr)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_role_has_candidates() {
        for role in [
            ElementRole::Title,
            ElementRole::Body,
            ElementRole::UploadTrigger,
            ElementRole::FileInput,
            ElementRole::SubmitControl,
            ElementRole::CommentToggle,
            ElementRole::SyncToggle,
        ] {
            assert!(!candidates(role).is_empty(), "no candidates for {:?}", role);
        }
    }

    #[test]
    fn test_static_candidates_rank_before_scans() {
        // The ranked tiers must stay ordered: literal selectors first,
        // scripted scans last.
        for role in [ElementRole::Title, ElementRole::Body, ElementRole::SubmitControl] {
            let cands = candidates(role);
            assert_eq!(cands[0].strategy, StrategyKind::StaticSelector);
            assert_eq!(
                cands.last().unwrap().strategy,
                StrategyKind::ScriptedScan,
                "role {:?} should end with a scripted scan",
                role
            );
        }
    }

    #[test]
    fn test_first_match_falls_through_failed_candidates() {
        let cands = candidates(ElementRole::Title);
        let fail_first_n = 4;
        let mut probed = Vec::new();
        let hit = first_match(cands, |cand| {
            probed.push(cand.pattern);
            if probed.len() <= fail_first_n {
                None
            } else {
                Some(cand.pattern)
            }
        });

        let (idx, pattern) = hit.expect("candidate N+1 should be tried and accepted");
        assert_eq!(idx, fail_first_n);
        assert_eq!(pattern, cands[fail_first_n].pattern);
        assert_eq!(probed.len(), fail_first_n + 1);
    }

    #[test]
    fn test_first_match_exhausts_all_candidates() {
        let cands = candidates(ElementRole::SubmitControl);
        let mut probed = 0;
        let hit: Option<(usize, ())> = first_match(cands, |_| {
            probed += 1;
            None
        });
        assert!(hit.is_none());
        assert_eq!(probed, cands.len(), "every candidate must be tried before giving up");
    }

    #[test]
    fn test_file_input_tolerates_hidden_elements() {
        assert!(!ElementRole::FileInput.requires_visibility());
        assert!(ElementRole::SubmitControl.requires_visibility());
    }
}
