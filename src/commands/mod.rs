//! CLI subcommand implementations for scormrelay.
//!
//! This module contains the business logic for the CLI subcommands.
//! Commands are organized into submodules by domain:
//!
//! - [`harvest`] - One-shot data-model harvest against a fixture LMS
//! - [`simulate`] - Full two-bridge relay session simulation
//!
//! # Usage
//!
//! Commands are invoked from the main CLI dispatcher:
//!
//! ```ignore
//! use scormrelay::commands;
//!
//! commands::harvest::run(&fixture, &wrapper_url, &data_source)?;
//! commands::simulate::run(args)?;
//! ```

pub mod harvest;
pub mod simulate;

// Re-export commonly used entry points for convenience
#[doc(inline)]
pub use harvest::run as harvest_run;
#[doc(inline)]
pub use simulate::{run as simulate_run, SessionArgs};
