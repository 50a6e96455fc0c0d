//! Scripted upstream API for simulations and tests.
//!
//! [`FixtureApi`] plays the client LMS: it answers `LMSGetValue` from a
//! fixed element table, accepts writes, and records every call it sees in
//! a shareable [`CallLog`]. The `simulate` command mounts one as the
//! upstream API; bridge tests use the log to assert exactly what crossed
//! the boundary.

// Rust guideline compliant 2026-04

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;

use crate::api::error::codes;
use crate::api::{Scorm12Api, SCORM_FALSE, SCORM_TRUE};

/// One recorded upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `LMSInitialize("")`.
    Initialize,
    /// `LMSFinish("")`.
    Finish,
    /// `LMSGetValue(element)`.
    GetValue(String),
    /// `LMSSetValue(element, value)`.
    SetValue(String, String),
    /// `LMSCommit("")`.
    Commit,
    /// `LMSGetLastError()`.
    LastError,
    /// `LMSGetErrorString(code)`.
    ErrorString(String),
    /// `LMSGetDiagnostic(code)`.
    Diagnostic(String),
}

/// Shared, append-only record of upstream calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl CallLog {
    fn record(&self, call: ApiCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// How many recorded calls satisfy `predicate`.
    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    /// Copy of everything recorded so far, in call order.
    pub fn snapshot(&self) -> Vec<ApiCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A canned client-LMS API.
///
/// Reads consult session writes first, then the fixture table; an element
/// neither knows yields the empty string with error 201, which is exactly
/// the shape the harvester prunes on.
#[derive(Debug)]
pub struct FixtureApi {
    replies: HashMap<String, String>,
    store: HashMap<String, String>,
    calls: CallLog,
    initialized: bool,
    fail_initialize: bool,
    last_error: String,
    last_diagnostic: String,
}

impl Default for FixtureApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureApi {
    /// Empty fixture: no canned replies, every read misses.
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            store: HashMap::new(),
            calls: CallLog::default(),
            initialized: false,
            fail_initialize: false,
            last_error: codes::NO_ERROR.to_owned(),
            last_diagnostic: String::new(),
        }
    }

    /// Fixture from `(element, value)` pairs.
    pub fn from_entries(entries: &[(&str, &str)]) -> Self {
        let mut api = Self::new();
        for (element, value) in entries {
            api.replies
                .insert((*element).to_owned(), (*value).to_owned());
        }
        api
    }

    /// Fixture from a flat JSON object of element-to-value strings.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        let replies: HashMap<String, String> = serde_json::from_str(raw)?;
        let mut api = Self::new();
        api.replies = replies;
        Ok(api)
    }

    /// Make `LMSInitialize` refuse, for exercising the failure paths.
    pub fn with_initialize_failure(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Handle for asserting on recorded calls after the API moved away.
    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }

    /// Elements written during the session, for post-run assertions.
    pub fn written(&self) -> &HashMap<String, String> {
        &self.store
    }

    fn ok(&mut self, result: &str) -> String {
        self.last_error = codes::NO_ERROR.to_owned();
        result.to_owned()
    }

    fn fail(&mut self, code: &str, diagnostic: String) -> String {
        self.last_error = code.to_owned();
        self.last_diagnostic = diagnostic;
        SCORM_FALSE.to_owned()
    }
}

impl Scorm12Api for FixtureApi {
    fn initialize(&mut self, _parameter: &str) -> String {
        self.calls.record(ApiCall::Initialize);
        if self.fail_initialize {
            return self.fail(
                codes::GENERAL_EXCEPTION,
                "fixture refuses initialization".to_owned(),
            );
        }
        if self.initialized {
            return self.fail(
                codes::GENERAL_EXCEPTION,
                "session already initialized".to_owned(),
            );
        }
        self.initialized = true;
        self.ok(SCORM_TRUE)
    }

    fn finish(&mut self, _parameter: &str) -> String {
        self.calls.record(ApiCall::Finish);
        if !self.initialized {
            return self.fail(codes::NOT_INITIALIZED, "session never initialized".to_owned());
        }
        self.initialized = false;
        self.ok(SCORM_TRUE)
    }

    fn get_value(&mut self, element: &str) -> String {
        self.calls.record(ApiCall::GetValue(element.to_owned()));
        if !self.initialized {
            self.last_error = codes::NOT_INITIALIZED.to_owned();
            return String::new();
        }
        let known = self
            .store
            .get(element)
            .or_else(|| self.replies.get(element))
            .cloned();
        match known {
            Some(value) => self.ok(&value),
            None => {
                self.last_error = codes::INVALID_ARGUMENT.to_owned();
                self.last_diagnostic = format!("{element} is not in the fixture");
                String::new()
            }
        }
    }

    fn set_value(&mut self, element: &str, value: &str) -> String {
        self.calls
            .record(ApiCall::SetValue(element.to_owned(), value.to_owned()));
        if !self.initialized {
            return self.fail(codes::NOT_INITIALIZED, "session never initialized".to_owned());
        }
        self.store.insert(element.to_owned(), value.to_owned());
        self.ok(SCORM_TRUE)
    }

    fn commit(&mut self, _parameter: &str) -> String {
        self.calls.record(ApiCall::Commit);
        if !self.initialized {
            return self.fail(codes::NOT_INITIALIZED, "session never initialized".to_owned());
        }
        self.ok(SCORM_TRUE)
    }

    fn last_error(&mut self) -> String {
        self.calls.record(ApiCall::LastError);
        self.last_error.clone()
    }

    fn error_string(&mut self, code: &str) -> String {
        self.calls.record(ApiCall::ErrorString(code.to_owned()));
        codes::describe(code).to_owned()
    }

    fn diagnostic(&mut self, code: &str) -> String {
        self.calls.record(ApiCall::Diagnostic(code.to_owned()));
        if code.is_empty() {
            self.last_diagnostic.clone()
        } else {
            codes::describe(code).to_owned()
        }
    }
}

/// One step of a scripted content run, as read from a `--script` file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Call `LMSInitialize` on the mock.
    Initialize,
    /// Read an element and report it.
    GetValue {
        /// Full dotted element name.
        element: String,
    },
    /// Write an element.
    SetValue {
        /// Full dotted element name.
        element: String,
        /// Value to store.
        value: String,
    },
    /// Call `LMSCommit`.
    Commit,
    /// Call `LMSFinish`, ending the session.
    Finish,
    /// Pause the script, e.g. to let the autocommit timer run.
    WaitMs {
        /// Milliseconds to sleep.
        ms: u64,
    },
}

/// Parse a script file: a JSON array of steps.
pub fn parse_script(raw: &str) -> serde_json::Result<Vec<ScriptStep>> {
    serde_json::from_str(raw)
}
