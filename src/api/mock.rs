//! Content-side mock SCORM API.
//!
//! The content bridge hands its content a [`MockApi`] seeded from the
//! harvested CMI tree. Reads are answered from the local tree; writes land
//! in the local tree AND surface as [`ApiEvent`]s on the bridge's event
//! channel so they can be relayed upward. The mock speaks proper SCORM 1.2:
//! string booleans, string error codes, `_count` / `_children` reserved
//! leaves, and the standard error table.

// Rust guideline compliant 2026-04

use std::mem;

use log::debug;
use tokio::sync::mpsc::UnboundedSender;

use crate::api::error::codes;
use crate::api::{Scorm12Api, SCORM_FALSE, SCORM_TRUE};
use crate::cmi::{path, CmiNode};
use crate::constants::{CHILDREN_KEYWORD, CMI_ROOT, COUNT_KEYWORD};

/// A successful call against the mock, as seen by the owning bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiEvent {
    /// `LMSSetValue` stored a value. `previous` is the prior scalar at that
    /// element, `None` when the element did not exist yet.
    SetValue {
        /// Full dotted element name.
        element: String,
        /// The value just stored.
        value: String,
        /// Scalar previously stored at the element.
        previous: Option<String>,
    },
    /// `LMSCommit` was called.
    Commit,
    /// `LMSFinish` was called; the session is over.
    Finish,
}

/// Why a write into the tree was refused.
enum WriteRefusal {
    /// An intermediate segment could not be descended into.
    Descend,
    /// The final segment names a container, not a leaf.
    NotLeaf,
}

/// In-memory SCORM 1.2 API over a [`CmiNode`] tree.
#[derive(Debug)]
pub struct MockApi {
    initialized: bool,
    store: CmiNode,
    last_error: String,
    last_diagnostic: String,
    events: Option<UnboundedSender<ApiEvent>>,
}

impl MockApi {
    /// Empty mock: no data, not initialized, no event sink.
    pub fn new() -> Self {
        Self {
            initialized: false,
            store: CmiNode::Composite(Vec::new()),
            last_error: codes::NO_ERROR.to_owned(),
            last_diagnostic: String::new(),
            events: None,
        }
    }

    /// Attach the channel successful calls are reported on.
    pub fn with_event_sink(mut self, sink: UnboundedSender<ApiEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Replace the backing tree with a harvested data model.
    pub fn load_tree(&mut self, tree: CmiNode) {
        self.store = tree;
    }

    /// The current backing tree.
    pub fn tree(&self) -> &CmiNode {
        &self.store
    }

    /// Whether `LMSInitialize` has succeeded and `LMSFinish` has not.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Convenience read that bypasses the session state machine, for
    /// reports and assertions.
    pub fn peek(&self, element: &str) -> Option<&str> {
        let segments = path::segments(element);
        let (first, rest) = segments.split_first()?;
        if *first != CMI_ROOT {
            return None;
        }
        self.store.lookup(rest).and_then(CmiNode::as_scalar)
    }

    fn ok(&mut self) {
        self.last_error = codes::NO_ERROR.to_owned();
        self.last_diagnostic.clear();
    }

    fn fail(&mut self, code: &str, diagnostic: impl Into<String>) {
        self.last_error = code.to_owned();
        self.last_diagnostic = diagnostic.into();
    }

    fn emit(&self, event: ApiEvent) {
        if let Some(sink) = &self.events {
            // The bridge side may already be gone during teardown.
            let _ = sink.send(event);
        }
    }

    /// Split an element into its in-tree segments, rejecting names outside
    /// the `cmi` namespace.
    fn tree_segments<'a>(&mut self, element: &'a str) -> Result<Vec<&'a str>, ()> {
        let segments = path::segments(element);
        match segments.split_first() {
            Some((first, rest)) if *first == CMI_ROOT && !rest.is_empty() => Ok(rest.to_vec()),
            Some((first, _)) if *first == CMI_ROOT => {
                self.fail(codes::INVALID_ARGUMENT, format!("bare element {element}"));
                Err(())
            }
            _ => {
                self.fail(
                    codes::NOT_IMPLEMENTED,
                    format!("unsupported data model {element}"),
                );
                Err(())
            }
        }
    }

    fn read(&mut self, element: &str) -> String {
        let Ok(rest) = self.tree_segments(element) else {
            return String::new();
        };
        let Some((last, parent)) = rest.split_last() else {
            return String::new();
        };

        if *last == COUNT_KEYWORD {
            return match self.store.lookup(parent) {
                Some(CmiNode::Collection(items)) => {
                    let count = items.len().to_string();
                    self.ok();
                    count
                }
                Some(_) => {
                    self.fail(codes::NO_COUNT, format!("{element} is not an array"));
                    String::new()
                }
                None => {
                    self.fail(codes::INVALID_ARGUMENT, format!("unknown element {element}"));
                    String::new()
                }
            };
        }

        if *last == CHILDREN_KEYWORD {
            return match self.store.lookup(parent) {
                Some(node @ CmiNode::Composite(_)) => {
                    let names = node.child_names().join(",");
                    self.ok();
                    names
                }
                // A collection's member shape is taken from its first
                // entry; an empty collection has nothing to report.
                Some(CmiNode::Collection(items)) => match items.first() {
                    Some(first @ CmiNode::Composite(_)) => {
                        let names = first.child_names().join(",");
                        self.ok();
                        names
                    }
                    _ => {
                        self.fail(codes::NO_CHILDREN, format!("{element} has no children"));
                        String::new()
                    }
                },
                Some(CmiNode::Scalar(_)) => {
                    self.fail(codes::NO_CHILDREN, format!("{element} has no children"));
                    String::new()
                }
                None => {
                    self.fail(codes::INVALID_ARGUMENT, format!("unknown element {element}"));
                    String::new()
                }
            };
        }

        match self.store.lookup(&rest) {
            Some(CmiNode::Scalar(value)) => {
                let value = value.clone();
                self.ok();
                value
            }
            Some(_) => {
                self.fail(
                    codes::INVALID_ARGUMENT,
                    format!("{element} is not a leaf element"),
                );
                String::new()
            }
            None => {
                self.fail(codes::INVALID_ARGUMENT, format!("unknown element {element}"));
                String::new()
            }
        }
    }
}

/// Walk the tree and store `value` at `segments`, creating intermediate
/// nodes as needed. Returns the prior scalar at the slot, `None` when the
/// slot is new.
fn store_write(
    root: &mut CmiNode,
    segments: &[&str],
    value: &str,
) -> Result<Option<String>, WriteRefusal> {
    let Some((last, parents)) = segments.split_last() else {
        return Err(WriteRefusal::Descend);
    };
    let mut node = root;
    for segment in parents {
        node = descend_for_write(node, segment).ok_or(WriteRefusal::Descend)?;
    }
    write_slot(node, last, value)
}

/// Ready a node for a child lookup during a write walk: an empty scalar
/// placeholder upgrades to the container the next segment needs, and an
/// empty composite reached by a numeric segment becomes a collection.
fn upgrade_for_segment(node: &mut CmiNode, segment: &str) {
    let indexed = path::is_index_segment(segment);
    if matches!(node, CmiNode::Scalar(v) if v.is_empty()) {
        *node = if indexed {
            CmiNode::Collection(Vec::new())
        } else {
            CmiNode::Composite(Vec::new())
        };
    } else if indexed && matches!(node, CmiNode::Composite(entries) if entries.is_empty()) {
        *node = CmiNode::Collection(Vec::new());
    }
}

/// Resolve (creating if needed) an intermediate node for a write walk.
/// Writing through a non-empty scalar is refused.
fn descend_for_write<'a>(node: &'a mut CmiNode, segment: &str) -> Option<&'a mut CmiNode> {
    upgrade_for_segment(node, segment);
    match node {
        CmiNode::Collection(items) => {
            let index: usize = segment.parse().ok()?;
            while items.len() <= index {
                items.push(CmiNode::Composite(Vec::new()));
            }
            Some(&mut items[index])
        }
        CmiNode::Composite(entries) => {
            let position = match entries.iter().position(|(name, _)| name == segment) {
                Some(position) => position,
                None => {
                    entries.push((segment.to_owned(), CmiNode::Composite(Vec::new())));
                    entries.len() - 1
                }
            };
            Some(&mut entries[position].1)
        }
        CmiNode::Scalar(_) => None,
    }
}

/// Store `value` under the final segment of a write walk. The slot must be
/// a scalar or absent; pointing a write at a container is refused.
fn write_slot(
    node: &mut CmiNode,
    segment: &str,
    value: &str,
) -> Result<Option<String>, WriteRefusal> {
    upgrade_for_segment(node, segment);
    match node {
        CmiNode::Collection(items) => {
            let index: usize = segment.parse().map_err(|_| WriteRefusal::Descend)?;
            if index < items.len() {
                match &mut items[index] {
                    CmiNode::Scalar(old) => Ok(Some(mem::replace(old, value.to_owned()))),
                    _ => Err(WriteRefusal::NotLeaf),
                }
            } else {
                while items.len() < index {
                    items.push(CmiNode::Scalar(String::new()));
                }
                items.push(CmiNode::Scalar(value.to_owned()));
                Ok(None)
            }
        }
        CmiNode::Composite(entries) => {
            if let Some(position) = entries.iter().position(|(name, _)| name == segment) {
                match &mut entries[position].1 {
                    CmiNode::Scalar(old) => Ok(Some(mem::replace(old, value.to_owned()))),
                    _ => Err(WriteRefusal::NotLeaf),
                }
            } else {
                entries.push((segment.to_owned(), CmiNode::Scalar(value.to_owned())));
                Ok(None)
            }
        }
        CmiNode::Scalar(_) => Err(WriteRefusal::NotLeaf),
    }
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorm12Api for MockApi {
    fn initialize(&mut self, _parameter: &str) -> String {
        if self.initialized {
            self.fail(codes::GENERAL_EXCEPTION, "already initialized");
            return SCORM_FALSE.to_owned();
        }
        self.initialized = true;
        self.ok();
        debug!("mock API initialized");
        SCORM_TRUE.to_owned()
    }

    fn finish(&mut self, _parameter: &str) -> String {
        if !self.initialized {
            self.fail(codes::NOT_INITIALIZED, "finish before initialize");
            return SCORM_FALSE.to_owned();
        }
        self.initialized = false;
        self.ok();
        self.emit(ApiEvent::Finish);
        debug!("mock API finished");
        SCORM_TRUE.to_owned()
    }

    fn get_value(&mut self, element: &str) -> String {
        if !self.initialized {
            self.fail(
                codes::NOT_INITIALIZED,
                format!("get before initialize: {element}"),
            );
            return String::new();
        }
        self.read(element)
    }

    fn set_value(&mut self, element: &str, value: &str) -> String {
        if !self.initialized {
            self.fail(
                codes::NOT_INITIALIZED,
                format!("set before initialize: {element}"),
            );
            return SCORM_FALSE.to_owned();
        }
        let rest = match self.tree_segments(element) {
            Ok(rest) => rest,
            Err(()) => return SCORM_FALSE.to_owned(),
        };
        if rest.last().is_some_and(|last| path::is_keyword_segment(last)) {
            self.fail(codes::KEYWORD_SET, format!("{element} is a keyword"));
            return SCORM_FALSE.to_owned();
        }
        match store_write(&mut self.store, &rest, value) {
            Ok(previous) => {
                self.ok();
                self.emit(ApiEvent::SetValue {
                    element: element.to_owned(),
                    value: value.to_owned(),
                    previous,
                });
                SCORM_TRUE.to_owned()
            }
            Err(WriteRefusal::Descend) => {
                self.fail(
                    codes::INVALID_ARGUMENT,
                    format!("cannot reach element {element}"),
                );
                SCORM_FALSE.to_owned()
            }
            Err(WriteRefusal::NotLeaf) => {
                self.fail(
                    codes::INVALID_ARGUMENT,
                    format!("{element} is not a leaf element"),
                );
                SCORM_FALSE.to_owned()
            }
        }
    }

    fn commit(&mut self, _parameter: &str) -> String {
        if !self.initialized {
            self.fail(codes::NOT_INITIALIZED, "commit before initialize");
            return SCORM_FALSE.to_owned();
        }
        self.ok();
        self.emit(ApiEvent::Commit);
        SCORM_TRUE.to_owned()
    }

    fn last_error(&mut self) -> String {
        self.last_error.clone()
    }

    fn error_string(&mut self, code: &str) -> String {
        codes::describe(code).to_owned()
    }

    fn diagnostic(&mut self, code: &str) -> String {
        // An empty code asks about the most recent error.
        if code.is_empty() {
            return self.last_diagnostic.clone();
        }
        codes::describe(code).to_owned()
    }
}
