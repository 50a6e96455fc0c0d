//! Dotted element path helpers.
//!
//! SCORM element names are dot-separated paths such as
//! `cmi.interactions.3.time`. Collection positions are purely numeric
//! segments; allowlist patterns stand in for them with `*`
//! (`cmi.interactions.*.time`).

use crate::constants::{CHILDREN_KEYWORD, COUNT_KEYWORD};

/// Split an element name into its dotted segments.
pub fn segments(element: &str) -> Vec<&str> {
    element.split('.').collect()
}

/// True for a non-empty, purely numeric segment (a collection index).
pub fn is_index_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// True for the `_count` / `_children` reserved leaves.
pub fn is_keyword_segment(segment: &str) -> bool {
    segment == COUNT_KEYWORD || segment == CHILDREN_KEYWORD
}

/// Collapse every collection index in an element name to `*`, yielding the
/// pattern form used by the read allowlist.
///
/// `cmi.objectives.12.score.raw` becomes `cmi.objectives.*.score.raw`;
/// names without indices pass through unchanged.
pub fn wildcard_pattern(element: &str) -> String {
    element
        .split('.')
        .map(|segment| {
            if is_index_segment(segment) {
                "*"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Split an element name into its parent path and final segment.
///
/// Returns `None` for a bare single-segment name such as `cmi`.
pub fn split_last(element: &str) -> Option<(&str, &str)> {
    element.rsplit_once('.')
}
