//! Cross-origin relay between content and the hosting LMS.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  Client LMS window (client origin)                            |
//! |    real SCORM API  <--- discovery ---  LmsBridge              |
//! |                                          |  ^                 |
//! |           launch URL, LMSSetDataModel    |  |  postLMSDataModel,
//! |           ErrorHandler, message          v  |  LMSSetValue,   |
//! |  +---------------------------------------------------------+  |
//! |  |  Content page (LMS plugin origin)       LMSCommit,      |  |
//! |  |    ContentBridge + mock SCORM API       LMSFinish       |  |
//! |  |      |                                                  |  |
//! |  |      v  content URL (query forwarded)                   |  |
//! |  |  +---------------------------------------------------+  |  |
//! |  |  |  Packaged content (talks to the mock API)         |  |  |
//! |  |  +---------------------------------------------------+  |  |
//! |  +---------------------------------------------------------+  |
//! +---------------------------------------------------------------+
//! ```
//!
//! [`LmsBridge`](lms::LmsBridge) sits next to the real API and answers the
//! single data-model request; [`ContentBridge`](content::ContentBridge)
//! owns the mock API and relays mutating calls upward. Both ends validate
//! the transport-stamped peer origin before looking at a payload, and both
//! drop (with a log line) rather than fault on anything unexpected.

// Rust guideline compliant 2026-04

pub mod completion;
pub mod content;
pub mod envelope;
pub mod lms;
pub mod port;

pub use completion::CompletionNotifier;
pub use content::{ContentBridge, Phase, SessionEvent};
pub use envelope::{Envelope, EnvelopeError};
pub use lms::LmsBridge;
pub use port::{InProcessPort, MessagePort, Origin, PortError, PostedMessage};

/// Wire function names.
///
/// These are the exact strings carried in [`Envelope::function`]; both
/// dispatch tables are keyed on them.
pub mod wire {
    /// Content asks the LMS side for the harvested data model.
    pub const POST_LMS_DATA_MODEL: &str = "postLMSDataModel";
    /// LMS side delivers the data model tree.
    pub const LMS_SET_DATA_MODEL: &str = "LMSSetDataModel";
    /// Content reports a write; arguments are `[element, value]`.
    pub const LMS_SET_VALUE: &str = "LMSSetValue";
    /// Content asks for a persist pass.
    pub const LMS_COMMIT: &str = "LMSCommit";
    /// Content ends the session.
    pub const LMS_FINISH: &str = "LMSFinish";
    /// LMS side pushes an error record down for visibility.
    pub const ERROR_HANDLER: &str = "ErrorHandler";
    /// Free-text note, logged at the receiver.
    pub const MESSAGE: &str = "message";
}
