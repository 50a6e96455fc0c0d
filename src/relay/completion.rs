//! Out-of-band completion reporting.
//!
//! When content drives `cmi.core.lesson_status` to a terminal value, the
//! hosting server is told directly over HTTP rather than through the relay
//! chain, so a client LMS that drops the upward `LMSSetValue` cannot lose
//! the completion. The request is a bodyless POST, spawned fire-and-forget:
//! never retried, failures logged and otherwise unobserved.

// Rust guideline compliant 2026-04

use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use url::Url;

use crate::cmi::path;
use crate::constants::{CONTEXT_ID_PARAM, DEFAULT_COMPLETION_PATH, HTTP_REQUEST_TIMEOUT};

/// Pull the course context id out of a content page URL: the first purely
/// numeric path segment. Package file paths carry the serving context id in
/// that position.
pub fn extract_context_id(url: &Url) -> Option<u64> {
    url.path_segments()?
        .find(|segment| path::is_index_segment(segment))
        .and_then(|segment| segment.parse().ok())
}

/// Builds and fires completion POSTs for a content session.
#[derive(Debug)]
pub struct CompletionNotifier {
    client: reqwest::Client,
    endpoint_path: String,
    base_override: Option<Url>,
    context_override: Option<u64>,
}

impl CompletionNotifier {
    /// Notifier with the production endpoint path and request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(HTTP_REQUEST_TIMEOUT)
    }

    /// Notifier whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building completion HTTP client")?;
        Ok(Self {
            client,
            endpoint_path: DEFAULT_COMPLETION_PATH.to_owned(),
            base_override: None,
            context_override: None,
        })
    }

    /// Replace the server endpoint path the content URL is rewritten to.
    pub fn with_endpoint_path(mut self, endpoint_path: impl Into<String>) -> Self {
        self.endpoint_path = endpoint_path.into();
        self
    }

    /// Send to this base URL instead of the content page's own origin. A
    /// bare origin (path `/`) still gets the endpoint path applied.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base_override = Some(base);
        self
    }

    /// Use this context id instead of scanning the content path for one.
    pub fn with_context_override(mut self, context_id: u64) -> Self {
        self.context_override = Some(context_id);
        self
    }

    /// The URL a completion for `page_url` is reported to: the page's
    /// origin with the path rewritten to the server endpoint, the page's
    /// query carried over (it already holds the forwarded `lms_origin` and
    /// `student_id`), and `contextid` appended.
    pub fn completion_url(&self, page_url: &Url) -> Result<Url> {
        let context_id = match self.context_override {
            Some(id) => id,
            None => extract_context_id(page_url).with_context(|| {
                format!("no numeric context segment in content path {}", page_url.path())
            })?,
        };

        let mut url = match &self.base_override {
            Some(base) => {
                let mut url = base.clone();
                if url.path() == "/" {
                    url.set_path(&self.endpoint_path);
                }
                url
            }
            None => {
                let mut url = page_url.clone();
                url.set_path(&self.endpoint_path);
                url
            }
        };
        url.set_query(page_url.query());
        url.query_pairs_mut()
            .append_pair(CONTEXT_ID_PARAM, &context_id.to_string());
        Ok(url)
    }

    /// Fire the POST for `page_url` on a detached task.
    pub fn spawn_submit(&self, page_url: &Url) {
        let url = match self.completion_url(page_url) {
            Ok(url) => url,
            Err(err) => {
                warn!("cannot build completion URL: {err:#}");
                return;
            }
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            info!("reporting completion to {url}");
            match client.post(url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("completion endpoint acknowledged");
                }
                Ok(response) => {
                    warn!("completion endpoint returned {}", response.status());
                }
                Err(err) => {
                    warn!("completion request failed: {err}");
                }
            }
        });
    }
}
