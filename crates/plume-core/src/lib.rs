//! # plume-core
//!
//! Core types for the Plume publisher.
//!
//! Plume drives a content-management web surface it does not control: it
//! authenticates, fills a post-creation form, attaches media, submits, and
//! reports a verified outcome. This crate holds the data model, the unified
//! error type, and the configuration surface shared by the browser and
//! orchestration crates.
//!
//! ## Core paradigm
//!
//! - Requests are validated structs, not probed shapes
//! - UI elements are addressed by semantic role, never by a literal selector
//!   outside the resolution tables
//! - Every state transition (login, upload done, published) is evidenced by
//!   an independently observable signal, never assumed

mod config;
mod error;
mod types;

pub use config::{
    BrowserSettings, PathSettings, PlatformSettings, PlumeConfig, PublishSettings,
};
pub use error::{ErrorKind, PlumeError, Result};
pub use types::{AccountSession, PublishOutcome, PublishRequest, PublishStatus};
