//! scormrelay - Cross-origin SCORM 1.2 relay.
//!
//! This crate bridges packaged SCORM 1.2 content to a client LMS across
//! an origin boundary: the LMS side discovers the real API, harvests the
//! CMI data model through a read allowlist, and the content side serves a
//! mock API that relays writes back upward and reports completion
//! out-of-band.
//!
//! # Architecture
//!
//! The session splits into two bridge objects joined by a message port:
//!
//! - **LmsBridge** - Wrapper-side proxy next to the real SCORM API
//! - **ContentBridge** - Content-side mock API owner and relay
//! - **MockApi** - In-memory SCORM API backed by a harvested CMI tree
//! - **CompletionNotifier** - Out-of-band completion HTTP side-channel
//!
//! # Modules
//!
//! - [`api`] - SCORM 1.2 API trait, discovery walk, mock implementation
//! - [`cmi`] - CMI tree model, dotted paths, allowlist, harvesting
//! - [`relay`] - Envelope codec, ports, the two bridges, completion
//! - [`config`] - Configuration loading/saving

// Rust guideline compliant 2026-04

// Library modules
pub mod api;
pub mod cmi;
pub mod relay;

pub mod commands;
pub mod config;
pub mod constants;
pub mod fixture;

// Re-export commonly used types
pub use api::{MockApi, Scorm12Api, SharedApi, WindowRef};
pub use cmi::{CmiNode, ReadAllowlist};
pub use config::RelayConfig;
pub use relay::{ContentBridge, Envelope, LmsBridge, Origin, Phase, SessionEvent};
