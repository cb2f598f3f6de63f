//! # plume-browser
//!
//! Browser automation layer for the Plume publisher, built on the Chrome
//! DevTools Protocol.
//!
//! The platform being driven ships frequent, unannounced UI changes, so
//! nothing in this crate trusts a single selector or a single signal:
//!
//! - [`locator`] resolves elements by semantic role through ranked
//!   candidate lists with scripted-scan fallbacks
//! - [`auth`] verifies login from independent signals instead of assuming
//!   restored cookies still work
//! - [`inject`] writes text through a ladder of techniques and only
//!   believes a write the page echoes back
//! - [`upload`] and [`submit`] wait for observable completion evidence
//!   rather than trusting the triggering call
//! - [`session`] owns the browser process, its anti-automation hardening,
//!   and the cookie jar
//! - [`diagnostics`] captures the page state when a step fails

pub mod auth;
pub mod diagnostics;
pub mod dom;
pub mod inject;
pub mod locator;
pub mod options;
pub mod session;
pub mod submit;
pub mod upload;

pub use diagnostics::DiagnosticsSink;
pub use locator::{CandidateLocator, ElementRole, StrategyKind};
pub use session::SessionManager;
pub use submit::Submission;
