//! Recursive CMI data-model harvest.
//!
//! Runs once per session on the LMS side to copy the whole `cmi.*` tree
//! through the guarded read path. The walk only needs three primitives,
//! expressed as the [`CmiProbe`] capability, so the branch logic is testable
//! against fake probes without a bridge or an LMS.
//!
//! # Branch order
//!
//! For a node under harvest: probe `<path>._count` first; a reported count
//! makes it a [`CmiNode::Collection`] with entries `0..count`, each expanded
//! recursively against the same child-name list. Otherwise the node is a
//! [`CmiNode::Composite`] over its child names; each named child with a
//! non-empty `<child>._children` list recurses with that list as the new
//! name set, and a child without one is a [`CmiNode::Scalar`] read via
//! `value()`. This order must hold: treating a node as scalar when it has
//! children silently drops the whole subtree.

// Rust guideline compliant 2026-03

use crate::cmi::CmiNode;
use crate::constants::{CHILDREN_KEYWORD, CMI_ROOT, COUNT_KEYWORD, TOP_LEVEL_CHILDREN};

/// The three read primitives the harvest needs from the LMS side.
///
/// All three go through the guarded `LMSGetValue` path in production, so
/// allowlist refusals and lazy initialization shape the tree: a refused
/// `_count` or `_children` probe reads as "not reported" and the node
/// collapses to whatever the remaining branches yield.
pub trait CmiProbe {
    /// Reported entry count of `<path>._count`, or `None` when the probe
    /// yields an empty string.
    fn count(&mut self, path: &str) -> Option<u32>;

    /// Child names from `<path>._children`, or `None` when the probe yields
    /// an empty string.
    fn children(&mut self, path: &str) -> Option<Vec<String>>;

    /// Leaf value of `<path>` (possibly empty).
    fn value(&mut self, path: &str) -> String;
}

/// Interpret a raw `_count` reply.
///
/// An empty string means the element is not an indexed collection. A
/// non-empty reply is taken as its leading digit run, and a reply with no
/// leading digits counts as zero, so a malformed count still yields an
/// (empty) collection rather than a scalar.
pub fn parse_count(raw: &str) -> Option<u32> {
    if raw.is_empty() {
        return None;
    }
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    Some(digits.parse().unwrap_or(0))
}

/// Interpret a raw `_children` reply: comma-separated names, empty reply
/// meaning none. Segments are kept verbatim.
pub fn parse_children(raw: &str) -> Option<Vec<String>> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.split(',').map(str::to_owned).collect())
}

/// Harvest the subtree rooted at `parent`, whose candidate child names are
/// `children`.
///
/// Mirrors the production walk: the count branch reuses the caller's child
/// list for every indexed entry; the composite branch resolves each named
/// child's own `_children` before deciding between recursion and a scalar
/// leaf.
pub fn harvest(probe: &mut dyn CmiProbe, parent: &str, children: &[String]) -> CmiNode {
    if let Some(count) = probe.count(parent) {
        let items = (0..count)
            .map(|index| harvest(probe, &format!("{parent}.{index}"), children))
            .collect();
        return CmiNode::Collection(items);
    }

    let entries = children
        .iter()
        .map(|child| {
            let path = format!("{parent}.{child}");
            let node = match probe.children(&path) {
                Some(sub) => harvest(probe, &path, &sub),
                None => CmiNode::Scalar(probe.value(&path)),
            };
            (child.clone(), node)
        })
        .collect();
    CmiNode::Composite(entries)
}

/// Harvest the full data model from the fixed `cmi` top-level child list.
pub fn harvest_data_model(probe: &mut dyn CmiProbe) -> CmiNode {
    let top: Vec<String> = TOP_LEVEL_CHILDREN.iter().map(|c| (*c).to_owned()).collect();
    harvest(probe, CMI_ROOT, &top)
}

/// Reserved-leaf path for a node's `_count`.
pub fn count_path(parent: &str) -> String {
    format!("{parent}.{COUNT_KEYWORD}")
}

/// Reserved-leaf path for a node's `_children`.
pub fn children_path(parent: &str) -> String {
    format!("{parent}.{CHILDREN_KEYWORD}")
}
