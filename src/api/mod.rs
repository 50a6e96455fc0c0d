//! SCORM 1.2 runtime API surface.
//!
//! Everything upstream of the relay is reached through the [`Scorm12Api`]
//! trait: the eight runtime calls of the SCORM 1.2 standard, strings in and
//! strings out, with `"true"` / `"false"` for booleans and numeric error
//! codes as strings. The LMS-side bridge consumes the trait; the
//! content-side mock ([`mock::MockApi`]) and the test fixture implement it.
//!
//! # Modules
//!
//! - [`error`] - the `{code, string, diagnostic}` error record and code table
//! - [`discovery`] - window-walk API discovery (`find_api` / `locate_api`)
//! - [`mock`] - the content-side in-memory API backed by a [`crate::cmi::CmiNode`] tree

pub mod discovery;
pub mod error;
pub mod mock;

use std::sync::{Arc, Mutex, PoisonError};

pub use discovery::{find_api, locate_api, WindowRef};
pub use error::ErrorRecord;
pub use mock::{ApiEvent, MockApi};

/// SCORM 1.2 boolean reply for success.
pub const SCORM_TRUE: &str = "true";

/// SCORM 1.2 boolean reply for failure.
pub const SCORM_FALSE: &str = "false";

/// Whether a SCORM string-boolean reply signals success.
pub fn is_true(reply: &str) -> bool {
    reply == SCORM_TRUE
}

/// The SCORM 1.2 runtime API as seen by a piece of content.
///
/// Method shapes follow the standard's IDL: `initialize`, `finish` and
/// `commit` take the mandatory (always empty) string parameter, and every
/// call may update the error state read back through [`Scorm12Api::last_error`].
pub trait Scorm12Api: Send {
    /// `LMSInitialize("")`, returns `"true"` / `"false"`.
    fn initialize(&mut self, parameter: &str) -> String;

    /// `LMSFinish("")`, returns `"true"` / `"false"`.
    fn finish(&mut self, parameter: &str) -> String;

    /// `LMSGetValue(element)`, returns the value or `""` on error.
    fn get_value(&mut self, element: &str) -> String;

    /// `LMSSetValue(element, value)`, returns `"true"` / `"false"`.
    fn set_value(&mut self, element: &str, value: &str) -> String;

    /// `LMSCommit("")`, returns `"true"` / `"false"`.
    fn commit(&mut self, parameter: &str) -> String;

    /// `LMSGetLastError()`, returns the current code as a string.
    fn last_error(&mut self) -> String;

    /// `LMSGetErrorString(code)`, human-readable text for a code.
    fn error_string(&mut self, code: &str) -> String;

    /// `LMSGetDiagnostic(code)`, vendor diagnostic text for a code (the
    /// empty string asks about the most recent error).
    fn diagnostic(&mut self, code: &str) -> String;
}

/// Shared handle to an API implementation, as held by a window and memoized
/// by the LMS-side bridge.
pub type SharedApi = Arc<Mutex<dyn Scorm12Api + Send>>;

/// Wrap an API implementation for sharing.
pub fn share<A: Scorm12Api + 'static>(api: A) -> SharedApi {
    Arc::new(Mutex::new(api))
}

/// Run `f` against the shared API. A poisoned lock is recovered rather than
/// propagated; the API types hold plain data and stay usable.
pub fn with_api<R>(api: &SharedApi, f: impl FnOnce(&mut dyn Scorm12Api) -> R) -> R {
    let mut guard = api.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut *guard)
}
