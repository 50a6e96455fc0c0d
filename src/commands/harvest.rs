//! Data-model harvest command.
//!
//! Mounts a fixture LMS behind an LMS-side bridge and prints the CMI tree
//! a live session would hand to content, allowlist filtering included.
//! Useful for checking what a given LMS exposes before pointing real
//! content at it.

// Rust guideline compliant 2026-04

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use url::Url;

use crate::api::{share, WindowRef};
use crate::config::RelayConfig;
use crate::fixture::FixtureApi;
use crate::relay::{InProcessPort, LmsBridge, Origin};

/// Harvest the data model from `fixture_path` and print it as JSON.
pub fn run(fixture_path: &Path, wrapper_url: &Url, data_source: &Url) -> Result<()> {
    let config = RelayConfig::load()?;
    let api = load_fixture(fixture_path)?;
    let window = WindowRef::with_api("client-lms", share(api));

    // The port goes unused here; harvesting never posts.
    let (lms_end, _content_end) =
        InProcessPort::pair(Origin::of_url(wrapper_url), Origin::of_url(data_source));
    let mut bridge = LmsBridge::new(
        window,
        Box::new(lms_end),
        wrapper_url.clone(),
        data_source.clone(),
    )
    .with_allowlist(config.allowlist());

    let tree = bridge.data_model();
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

/// Read and parse a fixture file: a flat JSON object of element-to-value
/// strings.
pub(crate) fn load_fixture(path: &Path) -> Result<FixtureApi> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    FixtureApi::from_json_str(&raw)
        .with_context(|| format!("Failed to parse {} as a fixture", path.display()))
}
