//! Model residency and request dispatch
//!
//! This module provides the blend pipeline:
//! - Residency: keeps one model configuration loaded, reloads on change
//! - Dispatcher: validates blend requests and runs rank / fuse on the resident models

mod dispatcher;
mod residency;

pub use dispatcher::{BlendPayload, BlendRequest, Dispatcher, Envelope};
pub use residency::{ResidencyManager, ResidencyStatus};
