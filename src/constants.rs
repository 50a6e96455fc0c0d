//! Application-wide constants for scormrelay.
//!
//! This module centralizes the relay's fixed invariants so they are
//! discoverable in one place. Constants are grouped by domain with
//! documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Discovery**: bounds for the upstream API window walk
//! - **Data model**: the fixed CMI namespace roots and keywords
//! - **Lesson status**: elements and values the completion side-channel keys on
//! - **Timers**: default delays for autocommit and the data-model wait
//! - **Completion endpoint**: server path and query parameter names

use std::time::Duration;

// ============================================================================
// Discovery
// ============================================================================

/// Maximum number of parent levels the API discovery walk will climb.
///
/// Legitimate embeddings are shallow; a chain deeper than this is a
/// misconfigured page and the walk gives up rather than hang. The bound is
/// arbitrary but more than sufficient in practice.
pub const FIND_API_MAX_DEPTH: usize = 7;

// ============================================================================
// Data model
// ============================================================================

/// Root of the SCORM 1.2 data model namespace.
pub const CMI_ROOT: &str = "cmi";

/// Keyword suffix that reports how many indexed entries a category stores.
pub const COUNT_KEYWORD: &str = "_count";

/// Keyword suffix that reports the supported named children of a category.
pub const CHILDREN_KEYWORD: &str = "_children";

/// The fixed top-level children of `cmi` seeded into the harvest.
///
/// The LMS is never asked for `cmi._children`; SCORM 1.2 defines this list
/// and the harvest starts from it.
pub const TOP_LEVEL_CHILDREN: &[&str] = &[
    "core",
    "suspend_data",
    "launch_data",
    "comments",
    "comments_from_lms",
    "objectives",
    "student_data",
    "student_preference",
    "interactions",
];

/// Element holding the learner identifier injected into the launch URL.
pub const STUDENT_ID_ELEMENT: &str = "cmi.core.student_id";

/// Element holding the learner display name injected into the launch URL.
pub const STUDENT_NAME_ELEMENT: &str = "cmi.core.student_name";

// ============================================================================
// Lesson status
// ============================================================================

/// Element whose writes the completion side-channel watches.
pub const LESSON_STATUS_ELEMENT: &str = "cmi.core.lesson_status";

/// Element reporting the launch mode; `review` suppresses completion posts.
pub const LESSON_MODE_ELEMENT: &str = "cmi.core.lesson_mode";

/// Lesson-status values that count as terminal for completion tracking.
pub const TERMINAL_STATUSES: &[&str] = &["passed", "completed", "failed"];

/// Lesson mode in which completion must never be reported.
pub const REVIEW_MODE: &str = "review";

// ============================================================================
// Timers
// ============================================================================

/// Default delay between a mock-API set and the scheduled upstream commit.
///
/// Armed by the first set; later sets while a commit is pending do not push
/// the deadline out, so a burst of writes commits once.
pub const DEFAULT_AUTOCOMMIT_DELAY: Duration = Duration::from_secs(5);

/// Default bound on the content bridge's wait for the data model.
///
/// The request is sent exactly once; if no `LMSSetDataModel` arrives within
/// this window the bridge fails observably instead of hanging with content
/// never mounted.
pub const DEFAULT_DATA_MODEL_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client request timeout for the completion side-channel.
///
/// The POST is fire-and-forget; the timeout only caps how long the spawned
/// task lingers on an unresponsive server.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Completion endpoint
// ============================================================================

/// Fixed server path the completion URL is rewritten to.
pub const DEFAULT_COMPLETION_PATH: &str = "/mod/scormremote/submit_completion.php";

/// Query parameter carrying the numeric context id.
pub const CONTEXT_ID_PARAM: &str = "contextid";

/// Query parameter carrying the hosting page's host, forwarded down the
/// layer chain and ultimately consumed by the completion endpoint.
pub const LMS_ORIGIN_PARAM: &str = "lms_origin";

/// Query parameter carrying the learner identifier.
pub const STUDENT_ID_PARAM: &str = "student_id";

/// Query parameter carrying the learner display name.
pub const STUDENT_NAME_PARAM: &str = "student_name";
