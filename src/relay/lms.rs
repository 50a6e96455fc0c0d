//! LMS-side bridge.
//!
//! [`LmsBridge`] runs in the wrapper context next to the client LMS: it
//! discovers the real SCORM API by walking the window hierarchy, proxies
//! the SCORM 1.2 calls with a read allowlist in front of `LMSGetValue`,
//! harvests the CMI tree once per session, computes the content launch URL
//! with the forwarded identity parameters, and services envelopes arriving
//! from the content side.
//!
//! # Session lifecycle
//!
//! [`LmsBridge::start`] warms the upstream session (identity reads
//! implicitly initialize it), harvests the data model, builds the launch
//! URL and binds the expected peer origin from it. After that
//! [`LmsBridge::run`] services the port until the content side goes away.
//! Every proxied call is lazily initializing, so the bridge also behaves
//! when driven without `start`.

// Rust guideline compliant 2026-04

use std::fmt;

use anyhow::{Context, Result};
use log::{debug, warn};
use url::Url;

use crate::api::error::codes;
use crate::api::{is_true, locate_api, with_api, ErrorRecord, SharedApi, WindowRef};
use crate::api::{SCORM_FALSE, SCORM_TRUE};
use crate::cmi::harvest::{self, CmiProbe};
use crate::cmi::{CmiNode, ReadAllowlist};
use crate::constants::{
    LMS_ORIGIN_PARAM, STUDENT_ID_ELEMENT, STUDENT_ID_PARAM, STUDENT_NAME_ELEMENT,
    STUDENT_NAME_PARAM,
};
use crate::relay::envelope::Envelope;
use crate::relay::port::{MessagePort, Origin, PostedMessage};
use crate::relay::wire;

/// Envelope functions the LMS side accepts from the content side. Nothing
/// outside this table is ever dispatched, whatever the envelope names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LmsCommand {
    /// Content asks for the harvested data model.
    PostDataModel,
    /// Relayed `LMSSetValue(element, value)`.
    SetValue,
    /// Relayed `LMSCommit()`.
    Commit,
    /// Relayed `LMSFinish()`.
    Finish,
}

impl LmsCommand {
    fn from_wire(name: &str) -> Option<Self> {
        match name {
            wire::POST_LMS_DATA_MODEL => Some(Self::PostDataModel),
            wire::LMS_SET_VALUE => Some(Self::SetValue),
            wire::LMS_COMMIT => Some(Self::Commit),
            wire::LMS_FINISH => Some(Self::Finish),
            _ => None,
        }
    }
}

/// The layer-2 session object.
pub struct LmsBridge {
    window: WindowRef,
    port: Box<dyn MessagePort>,
    wrapper_url: Url,
    data_source: Url,
    allowlist: ReadAllowlist,
    api: Option<SharedApi>,
    initialized: bool,
    tree: Option<CmiNode>,
    peer_origin: Option<Origin>,
}

impl LmsBridge {
    /// Bridge for the wrapper page at `wrapper_url`, serving content from
    /// `data_source`, discovering its API from `window`.
    pub fn new(
        window: WindowRef,
        port: Box<dyn MessagePort>,
        wrapper_url: Url,
        data_source: Url,
    ) -> Self {
        Self {
            window,
            port,
            wrapper_url,
            data_source,
            allowlist: ReadAllowlist::scorm12(),
            api: None,
            initialized: false,
            tree: None,
            peer_origin: None,
        }
    }

    /// Replace the production read allowlist.
    pub fn with_allowlist(mut self, allowlist: ReadAllowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    /// The peer origin incoming messages are validated against, once bound.
    pub fn peer_origin(&self) -> Option<&Origin> {
        self.peer_origin.as_ref()
    }

    /// Mount the session: read the forwarded identity, harvest the data
    /// model, and compute the content launch URL. The launch URL's origin
    /// becomes the expected peer origin for everything received afterwards.
    pub fn start(&mut self) -> Result<Url> {
        let student_id = self.get_value(STUDENT_ID_ELEMENT);
        let student_name = self.get_value(STUDENT_NAME_ELEMENT);

        let host = self
            .wrapper_url
            .host_str()
            .context("wrapper URL has no host")?;
        let lms_host = match self.wrapper_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        let mut launch = self.data_source.clone();
        {
            let wrapper_query: Vec<(String, String)> = self
                .wrapper_url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let mut pairs = launch.query_pairs_mut();
            pairs.clear();
            for (key, value) in &wrapper_query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(LMS_ORIGIN_PARAM, &lms_host);
            pairs.append_pair(STUDENT_ID_PARAM, &student_id);
            pairs.append_pair(STUDENT_NAME_PARAM, &student_name);
        }

        self.peer_origin = Some(Origin::of_url(&launch));
        let tree = self.data_model();
        debug!(
            "session mounted: peer origin {}, {} top-level categories harvested",
            Origin::of_url(&launch),
            tree.len()
        );
        Ok(launch)
    }

    /// Service envelopes from the content side until it goes away.
    pub async fn run(mut self) {
        while let Some(delivery) = self.port.recv().await {
            self.handle_message(delivery);
        }
        debug!("content port closed; LMS bridge done");
    }

    fn handle_message(&mut self, delivery: PostedMessage) {
        let Some(expected) = self.peer_origin.clone() else {
            warn!("dropping message received before mount");
            return;
        };
        if delivery.origin != expected {
            warn!(
                "dropping message from origin {} (expected {expected})",
                delivery.origin
            );
            return;
        }
        let envelope = match Envelope::parse(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("dropping message from {expected}: {err}");
                return;
            }
        };
        let Some(command) = LmsCommand::from_wire(&envelope.function) else {
            warn!("dropping unknown function '{}'", envelope.function);
            return;
        };

        match command {
            LmsCommand::PostDataModel => self.post_data_model(),
            LmsCommand::SetValue => {
                let (Some(element), Some(value)) = (envelope.text_arg(0), envelope.text_arg(1))
                else {
                    warn!("dropping LMSSetValue with unusable arguments");
                    return;
                };
                self.set_value(&element, &value);
            }
            LmsCommand::Commit => {
                self.commit();
            }
            LmsCommand::Finish => {
                self.finish();
            }
        }
    }

    /// Reply to a data-model request with the whole harvested tree in one
    /// `LMSSetDataModel` envelope.
    fn post_data_model(&mut self) {
        let tree = self.data_model();
        let payload = match serde_json::to_value(&tree) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("cannot serialize data model: {err}");
                return;
            }
        };
        let reply = Envelope::new(wire::LMS_SET_DATA_MODEL, vec![payload]);
        match self.port.post(reply.to_value()) {
            Ok(()) => debug!("data model delivered to content side"),
            Err(err) => warn!("cannot deliver data model: {err}"),
        }
    }

    /// The harvested CMI tree, walking the upstream API on first use.
    pub fn data_model(&mut self) -> CmiNode {
        if let Some(tree) = &self.tree {
            return tree.clone();
        }
        let tree = harvest::harvest_data_model(self);
        self.tree = Some(tree.clone());
        tree
    }

    fn resolve_api(&mut self) -> Option<SharedApi> {
        if self.api.is_none() {
            self.api = locate_api(&self.window);
        }
        self.api.clone()
    }

    /// `LMSInitialize` against the upstream API. Idempotent: an already
    /// initialized session reports success without another upstream call.
    pub fn initialize(&mut self) -> String {
        if self.initialized {
            return SCORM_TRUE.to_owned();
        }
        let Some(api) = self.resolve_api() else {
            warn!("cannot initialize: no API adapter located");
            return SCORM_FALSE.to_owned();
        };
        let result = with_api(&api, |api| api.initialize(""));
        if !is_true(&result) {
            let record = self.error_handler();
            warn!("LMSInitialize refused upstream: {record}");
            return SCORM_FALSE.to_owned();
        }
        self.initialized = true;
        debug!("upstream session initialized");
        SCORM_TRUE.to_owned()
    }

    /// `LMSFinish`. A session that never initialized has nothing to close.
    pub fn finish(&mut self) -> String {
        if !self.initialized {
            return SCORM_TRUE.to_owned();
        }
        let Some(api) = self.api.clone() else {
            return SCORM_FALSE.to_owned();
        };
        let result = with_api(&api, |api| api.finish(""));
        if !is_true(&result) {
            let record = self.error_handler();
            warn!("LMSFinish refused upstream: {record}");
            return SCORM_FALSE.to_owned();
        }
        self.initialized = false;
        debug!("upstream session finished");
        SCORM_TRUE.to_owned()
    }

    /// Guarded `LMSGetValue`: lazily initializes, refuses non-allowlisted
    /// elements locally, and blanks results the upstream error state
    /// disowns.
    pub fn get_value(&mut self, element: &str) -> String {
        if !self.initialized && !is_true(&self.initialize()) {
            debug!("implicit initialize failed; {element} reads empty");
            return String::new();
        }
        if !self.allowlist.allows(element) {
            debug!("refusing read of {element}: not allowlisted");
            return String::new();
        }
        let Some(api) = self.api.clone() else {
            return String::new();
        };
        let value = with_api(&api, |api| api.get_value(element));
        let code = with_api(&api, |api| api.last_error());
        if code != codes::NO_ERROR {
            let record = self.error_handler();
            debug!("LMSGetValue({element}) reported {record}");
            return String::new();
        }
        value
    }

    /// `LMSSetValue`, lazily initializing. Writes carry no allowlist; the
    /// upstream result is returned as-is and failures are only logged.
    pub fn set_value(&mut self, element: &str, value: &str) -> String {
        if !self.initialized && !is_true(&self.initialize()) {
            debug!("implicit initialize failed; cannot set {element}");
            return SCORM_FALSE.to_owned();
        }
        let Some(api) = self.api.clone() else {
            return SCORM_FALSE.to_owned();
        };
        let result = with_api(&api, |api| api.set_value(element, value));
        if !is_true(&result) {
            let record = self.error_handler();
            warn!("LMSSetValue({element}) refused upstream: {record}");
        }
        result
    }

    /// `LMSCommit`, lazily initializing.
    pub fn commit(&mut self) -> String {
        if !self.initialized && !is_true(&self.initialize()) {
            debug!("implicit initialize failed; cannot commit");
            return SCORM_FALSE.to_owned();
        }
        let Some(api) = self.api.clone() else {
            return SCORM_FALSE.to_owned();
        };
        let result = with_api(&api, |api| api.commit(""));
        if !is_true(&result) {
            let record = self.error_handler();
            warn!("LMSCommit refused upstream: {record}");
        }
        result
    }

    /// `LMSGetLastError`: pure delegation, general-exception sentinel when
    /// no API was ever located.
    pub fn last_error(&mut self) -> String {
        match self.api.clone() {
            Some(api) => with_api(&api, |api| api.last_error()),
            None => ErrorRecord::general_exception().code,
        }
    }

    /// `LMSGetErrorString`: pure delegation with the sentinel fallback.
    pub fn error_string(&mut self, code: &str) -> String {
        match self.api.clone() {
            Some(api) => with_api(&api, |api| api.error_string(code)),
            None => ErrorRecord::general_exception().string,
        }
    }

    /// `LMSGetDiagnostic`: pure delegation with the sentinel fallback.
    pub fn diagnostic(&mut self, code: &str) -> String {
        match self.api.clone() {
            Some(api) => with_api(&api, |api| api.diagnostic(code)),
            None => ErrorRecord::general_exception().diagnostic,
        }
    }

    /// Compose the current error record: code first, then (only for real
    /// errors) the code's text and the diagnostic of the most recent error.
    pub fn error_handler(&mut self) -> ErrorRecord {
        let mut record = ErrorRecord {
            code: self.last_error(),
            string: String::new(),
            diagnostic: String::new(),
        };
        if record.code != codes::NO_ERROR {
            let code = record.code.clone();
            record.string = self.error_string(&code);
            record.diagnostic = self.diagnostic("");
        }
        record
    }
}

impl fmt::Debug for LmsBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmsBridge")
            .field("wrapper_url", &self.wrapper_url.as_str())
            .field("data_source", &self.data_source.as_str())
            .field("initialized", &self.initialized)
            .field("api", &self.api.is_some())
            .field("tree", &self.tree.is_some())
            .field("peer_origin", &self.peer_origin)
            .finish_non_exhaustive()
    }
}

impl CmiProbe for LmsBridge {
    fn count(&mut self, path: &str) -> Option<u32> {
        harvest::parse_count(&self.get_value(&harvest::count_path(path)))
    }

    fn children(&mut self, path: &str) -> Option<Vec<String>> {
        harvest::parse_children(&self.get_value(&harvest::children_path(path)))
    }

    fn value(&mut self, path: &str) -> String {
        self.get_value(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::share;
    use crate::fixture::{ApiCall, FixtureApi};
    use crate::relay::port::InProcessPort;
    use serde_json::json;
    use std::time::Duration;

    const WRAPPER: &str = "https://client.example/courses/launch?attempt=3";
    const DATA_SOURCE: &str =
        "https://moodle.example/pluginfile.php/481/mod_scormremote/content/0/index.html";

    fn fixture() -> FixtureApi {
        FixtureApi::from_entries(&[
            ("cmi.core._children", "student_id,student_name,lesson_status"),
            ("cmi.core.student_id", "u1"),
            ("cmi.core.student_name", "Lovelace, Ada"),
            ("cmi.core.lesson_status", "incomplete"),
            ("cmi.objectives._children", "id"),
            ("cmi.objectives._count", "2"),
            ("cmi.objectives.0.id", "obj-a"),
            ("cmi.objectives.1.id", "obj-b"),
        ])
    }

    fn bridge_with(api: FixtureApi) -> (LmsBridge, InProcessPort, crate::fixture::CallLog) {
        let log = api.call_log();
        let window = WindowRef::with_api("lms", share(api));
        let wrapper_url = Url::parse(WRAPPER).unwrap();
        let launch_origin = Origin::new("https://moodle.example");
        let (lms_end, content_end) =
            InProcessPort::pair(Origin::of_url(&wrapper_url), launch_origin);
        let bridge = LmsBridge::new(
            window,
            Box::new(lms_end),
            wrapper_url,
            Url::parse(DATA_SOURCE).unwrap(),
        );
        (bridge, content_end, log)
    }

    #[test]
    fn test_initialize_is_idempotent_per_session() {
        let (mut bridge, _content_end, log) = bridge_with(fixture());
        assert_eq!(bridge.initialize(), "true");
        assert_eq!(bridge.initialize(), "true");
        assert_eq!(log.count(|call| matches!(call, ApiCall::Initialize)), 1);
    }

    #[test]
    fn test_first_read_initializes_implicitly_once() {
        let (mut bridge, _content_end, log) = bridge_with(fixture());
        assert_eq!(bridge.get_value("cmi.core.student_id"), "u1");
        assert_eq!(bridge.get_value("cmi.core.lesson_status"), "incomplete");
        assert_eq!(log.count(|call| matches!(call, ApiCall::Initialize)), 1);
    }

    #[test]
    fn test_non_allowlisted_read_refused_locally() {
        let (mut bridge, _content_end, log) = bridge_with(fixture());
        assert_eq!(bridge.get_value("cmi.core.session_time"), "");
        // The refusal still warmed the session, but no read went upstream.
        assert_eq!(log.count(|call| matches!(call, ApiCall::Initialize)), 1);
        assert_eq!(
            log.count(|call| matches!(call, ApiCall::GetValue(e) if e == "cmi.core.session_time")),
            0
        );
    }

    #[test]
    fn test_upstream_error_blanks_value_via_triad() {
        let (mut bridge, _content_end, log) = bridge_with(fixture());
        // Allowlisted but absent from the fixture: upstream reports 201.
        assert_eq!(bridge.get_value("cmi.core.entry"), "");
        assert!(log.count(|call| matches!(call, ApiCall::ErrorString(_))) >= 1);
        assert!(log.count(|call| matches!(call, ApiCall::Diagnostic(_))) >= 1);
    }

    #[test]
    fn test_failed_initialize_yields_empty_reads() {
        let (mut bridge, _content_end, log) =
            bridge_with(fixture().with_initialize_failure());
        assert_eq!(bridge.initialize(), "false");
        assert_eq!(bridge.get_value("cmi.core.student_id"), "");
        assert_eq!(
            log.count(|call| matches!(call, ApiCall::GetValue(_))),
            0
        );
    }

    #[test]
    fn test_finish_without_initialize_is_trivially_true() {
        let (mut bridge, _content_end, log) = bridge_with(fixture());
        assert_eq!(bridge.finish(), "true");
        assert_eq!(log.count(|call| matches!(call, ApiCall::Finish)), 0);
    }

    #[test]
    fn test_start_builds_launch_url_and_binds_origin() {
        let (mut bridge, _content_end, _log) = bridge_with(fixture());
        let launch = bridge.start().unwrap();

        assert_eq!(launch.host_str(), Some("moodle.example"));
        assert_eq!(
            launch.path(),
            "/pluginfile.php/481/mod_scormremote/content/0/index.html"
        );
        let pairs: Vec<(String, String)> = launch
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("attempt".into(), "3".into())));
        assert!(pairs.contains(&("lms_origin".into(), "client.example".into())));
        assert!(pairs.contains(&("student_id".into(), "u1".into())));
        assert!(pairs.contains(&("student_name".into(), "Lovelace, Ada".into())));

        assert_eq!(
            bridge.peer_origin(),
            Some(&Origin::new("https://moodle.example"))
        );
    }

    #[test]
    fn test_harvest_shapes_through_allowlist() {
        let (mut bridge, _content_end, _log) = bridge_with(fixture());
        let tree = bridge.data_model();
        assert_eq!(
            tree.lookup(&["objectives", "1", "id"])
                .and_then(CmiNode::as_scalar),
            Some("obj-b")
        );
        // student_data._children is allowlisted but unanswered, so the
        // category collapses to an empty scalar leaf.
        assert_eq!(
            tree.lookup(&["student_data"]).and_then(CmiNode::as_scalar),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_dispatch_answers_data_model_requests() {
        let (mut bridge, mut content_end, _log) = bridge_with(fixture());
        bridge.start().unwrap();

        content_end
            .post(json!({"function": "postLMSDataModel", "arguments": []}))
            .unwrap();
        let request = bridge_recv(&mut bridge).await;
        bridge.handle_message(request);

        let reply = content_end.recv().await.unwrap();
        let envelope = Envelope::parse(&reply.payload).unwrap();
        assert_eq!(envelope.function, "LMSSetDataModel");
        let tree: CmiNode = serde_json::from_value(envelope.arg(0).unwrap().clone()).unwrap();
        assert_eq!(
            tree.lookup(&["core", "student_id"]).and_then(CmiNode::as_scalar),
            Some("u1")
        );
    }

    #[tokio::test]
    async fn test_dispatch_drops_bad_origin_shape_and_unknown_names() {
        let (mut bridge, mut content_end, log) = bridge_with(fixture());
        bridge.start().unwrap();

        // Forged origin: correctly shaped payload, wrong sender.
        let forged = PostedMessage {
            origin: Origin::new("https://evil.example"),
            payload: json!({"function": "LMSCommit", "arguments": []}),
        };
        bridge.handle_message(forged);

        // Right origin, malformed shapes and unknown names.
        for payload in [
            json!({"function": "LMSCommit"}),
            json!({"function": "LMSCommit", "arguments": "nope"}),
            json!({"function": "LMSGetValue", "arguments": ["cmi.core.student_id"]}),
            json!(["LMSCommit"]),
        ] {
            content_end.post(payload).unwrap();
            let delivery = bridge_recv(&mut bridge).await;
            bridge.handle_message(delivery);
        }

        assert_eq!(log.count(|call| matches!(call, ApiCall::Commit)), 0);
        assert_eq!(log.count(|call| matches!(call, ApiCall::GetValue(_))), 0);
    }

    #[tokio::test]
    async fn test_dispatch_relays_set_commit_finish() {
        let (mut bridge, mut content_end, log) = bridge_with(fixture());
        bridge.start().unwrap();

        for payload in [
            json!({"function": "LMSSetValue", "arguments": ["cmi.core.lesson_status", "passed"]}),
            json!({"function": "LMSCommit", "arguments": []}),
            json!({"function": "LMSFinish", "arguments": []}),
        ] {
            content_end.post(payload).unwrap();
            let delivery = bridge_recv(&mut bridge).await;
            bridge.handle_message(delivery);
        }

        assert_eq!(
            log.count(|call| {
                matches!(call, ApiCall::SetValue(e, v) if e == "cmi.core.lesson_status" && v == "passed")
            }),
            1
        );
        assert_eq!(log.count(|call| matches!(call, ApiCall::Commit)), 1);
        assert_eq!(log.count(|call| matches!(call, ApiCall::Finish)), 1);
    }

    async fn bridge_recv(bridge: &mut LmsBridge) -> PostedMessage {
        tokio::time::timeout(Duration::from_secs(1), bridge.port.recv())
            .await
            .expect("no delivery within timeout")
            .expect("port closed")
    }
}
