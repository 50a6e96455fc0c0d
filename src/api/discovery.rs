//! SCORM API discovery by window-walk.
//!
//! The LMS-side bridge does not get handed an API object; it finds one the
//! way SCORM packages always have, by walking up the window hierarchy from
//! its own browsing context. [`WindowRef`] models the context graph (parent
//! and opener links plus an optional attached API) so the walk is the same
//! headless as it is in a browser: climb at most
//! [`FIND_API_MAX_DEPTH`](crate::constants::FIND_API_MAX_DEPTH) parent
//! levels, and if that chain has no API, retry once from the opener's chain.

// Rust guideline compliant 2026-03

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

use crate::api::SharedApi;
use crate::constants::FIND_API_MAX_DEPTH;

/// A browsing context: a labeled node with parent / opener links and an
/// optionally attached SCORM API. Cheap to clone; clones share the node.
#[derive(Clone)]
pub struct WindowRef {
    inner: Arc<WindowInner>,
}

struct WindowInner {
    label: String,
    api: Mutex<Option<SharedApi>>,
    parent: Mutex<Option<WindowRef>>,
    opener: Mutex<Option<WindowRef>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WindowRef {
    /// New detached window with no API and no links.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(WindowInner {
                label: label.into(),
                api: Mutex::new(None),
                parent: Mutex::new(None),
                opener: Mutex::new(None),
            }),
        }
    }

    /// New window with an API already attached.
    pub fn with_api(label: impl Into<String>, api: SharedApi) -> Self {
        let window = Self::new(label);
        window.set_api(api);
        window
    }

    /// Attach (or replace) the API object on this window.
    pub fn set_api(&self, api: SharedApi) {
        *locked(&self.inner.api) = Some(api);
    }

    /// Link this window below `parent`. A window may be its own parent, as a
    /// browser's top-level window is; the walk guards against that cycle.
    pub fn set_parent(&self, parent: &WindowRef) {
        *locked(&self.inner.parent) = Some(parent.clone());
    }

    /// Record the window that opened this one.
    pub fn set_opener(&self, opener: &WindowRef) {
        *locked(&self.inner.opener) = Some(opener.clone());
    }

    /// The attached API, if any.
    pub fn api(&self) -> Option<SharedApi> {
        locked(&self.inner.api).clone()
    }

    /// The parent window, if linked.
    pub fn parent(&self) -> Option<WindowRef> {
        locked(&self.inner.parent).clone()
    }

    /// The opener window, if recorded.
    pub fn opener(&self) -> Option<WindowRef> {
        locked(&self.inner.opener).clone()
    }

    /// Diagnostic label for log lines.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Identity comparison (same underlying context).
    pub fn ptr_eq(&self, other: &WindowRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for WindowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Parent links may form the browser's self-referential top cycle,
        // so print the label and flags only.
        f.debug_struct("WindowRef")
            .field("label", &self.inner.label)
            .field("has_api", &locked(&self.inner.api).is_some())
            .field("has_parent", &locked(&self.inner.parent).is_some())
            .field("has_opener", &locked(&self.inner.opener).is_some())
            .finish()
    }
}

/// Walk up the parent chain from `start` looking for an attached API.
///
/// Stops at the first window carrying an API, at the top of the chain, or
/// after [`FIND_API_MAX_DEPTH`] hops, whichever comes first.
pub fn find_api(start: &WindowRef) -> Option<SharedApi> {
    let mut tries = 0usize;
    let mut window = start.clone();
    loop {
        if let Some(api) = window.api() {
            return Some(api);
        }
        let Some(parent) = window.parent() else {
            return None;
        };
        if parent.ptr_eq(&window) {
            return None;
        }
        tries += 1;
        if tries > FIND_API_MAX_DEPTH {
            warn!(
                "error finding API from window '{}': too deeply nested (> {FIND_API_MAX_DEPTH} levels)",
                start.label()
            );
            return None;
        }
        window = parent;
    }
}

/// Full discovery: the parent chain first, then one retry from the opener's
/// chain. Logs when both come up empty.
pub fn locate_api(window: &WindowRef) -> Option<SharedApi> {
    if let Some(api) = find_api(window) {
        return Some(api);
    }
    let via_opener = window.opener().and_then(|opener| find_api(&opener));
    if via_opener.is_none() {
        warn!(
            "unable to find an API adapter from window '{}'",
            window.label()
        );
    }
    via_opener
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::api::share;

    fn chain(depth: usize, api_at_top: bool) -> WindowRef {
        let top = WindowRef::new("top");
        top.set_parent(&top);
        if api_at_top {
            top.set_api(share(MockApi::new()));
        }
        let mut below = top;
        for level in 0..depth {
            let window = WindowRef::new(format!("level-{level}"));
            window.set_parent(&below);
            below = window;
        }
        below
    }

    #[test]
    fn test_finds_api_within_depth_bound() {
        let start = chain(7, true);
        assert!(find_api(&start).is_some());
    }

    #[test]
    fn test_gives_up_past_depth_bound() {
        let start = chain(8, true);
        assert!(find_api(&start).is_none());
    }

    #[test]
    fn test_self_parent_terminates_walk() {
        let start = chain(3, false);
        assert!(find_api(&start).is_none());
    }

    #[test]
    fn test_api_on_start_window_needs_no_walk() {
        let window = WindowRef::with_api("lms", share(MockApi::new()));
        assert!(find_api(&window).is_some());
    }

    #[test]
    fn test_opener_chain_is_retried() {
        let popup = chain(2, false);
        let opener_side = chain(1, true);
        popup.set_opener(&opener_side);
        assert!(find_api(&popup).is_none());
        assert!(locate_api(&popup).is_some());
    }

    #[test]
    fn test_locate_fails_cleanly_without_any_api() {
        let lonely = WindowRef::new("detached");
        assert!(locate_api(&lonely).is_none());
    }
}
