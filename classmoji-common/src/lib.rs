//! # Classmoji Common Library
//!
//! Shared code for the Classmoji event-streaming services:
//! - Progress event types (`ProgressEvent`)
//! - In-memory progress channel store (`ProgressStreamManager`)
//! - SSE framing helpers
//! - Configuration loading and tracing setup
//! - Session token and identifier validation helpers

pub mod config;
pub mod error;
pub mod events;
pub mod progress;
pub mod session;
pub mod sse;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use events::ProgressEvent;
pub use progress::{ProgressConfig, ProgressStore, ProgressStreamManager, Subscriber, Subscription};
