//! # plume-publish
//!
//! Publish orchestration: a pure state machine for the step order, a
//! retrying engine around it, and the browser-backed implementation of
//! the attempt seam.
//!
//! The engine is generic over [`PublishBackend`], so every retry,
//! rejection-cap and serialization rule is tested against scripted
//! attempts with no browser involved.

pub mod backend;
pub mod browser_backend;
pub mod engine;
pub mod state;

pub use backend::{AttemptHandle, PostRef, PublishBackend};
pub use browser_backend::BrowserBackend;
pub use engine::PublishEngine;
pub use state::{transition, Event, State};
