//! Content-side bridge.
//!
//! [`ContentBridge`] runs in the content wrapper context: it owns the mock
//! SCORM API the package talks to, requests the data model from the LMS
//! side exactly once, relays mutating calls upward, debounce-commits on the
//! content's behalf, and fires the completion side-channel on terminal
//! lesson-status transitions.
//!
//! # Phase machine
//!
//! ```text
//! Uninitialized -> AwaitingDataModel -> Initialized -> Terminated
//!                         |
//!                         v (bounded wait expired)
//!                       Failed
//! ```
//!
//! Content is only mountable once `Initialized` is reached; the bounded
//! data-model wait makes a lost request an observable failure instead of a
//! silent hang. Relay traffic outside `Initialized` is dropped with a log
//! line, including anything arriving after termination.

// Rust guideline compliant 2026-04

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use url::Url;
use uuid::Uuid;

use crate::api::mock::{ApiEvent, MockApi};
use crate::api::{ErrorRecord, SharedApi};
use crate::cmi::CmiNode;
use crate::constants::{
    DEFAULT_AUTOCOMMIT_DELAY, DEFAULT_DATA_MODEL_TIMEOUT, LESSON_MODE_ELEMENT,
    LESSON_STATUS_ELEMENT, REVIEW_MODE, TERMINAL_STATUSES,
};
use crate::relay::completion::CompletionNotifier;
use crate::relay::envelope::Envelope;
use crate::relay::port::{MessagePort, Origin, PostedMessage};
use crate::relay::wire;

/// Content session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed; nothing requested yet.
    Uninitialized,
    /// Data model requested, bounded wait running.
    AwaitingDataModel,
    /// Data model loaded; content mountable, relays live.
    Initialized,
    /// Content called `LMSFinish`; only drops from here on.
    Terminated,
    /// The data-model wait expired; content is never mounted.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingDataModel => "awaiting-data-model",
            Self::Initialized => "initialized",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a running content session reports to its embedder.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The data model arrived; content may be mounted at this URL.
    ContentReady {
        /// Content source with the page query forwarded.
        content_url: Url,
    },
    /// An envelope was relayed to the LMS side.
    Relayed {
        /// Wire function name.
        function: String,
    },
    /// A terminal lesson-status transition was reported out-of-band.
    CompletionFired {
        /// The terminal status value.
        status: String,
    },
    /// The session cannot proceed.
    Failed {
        /// Human-readable cause.
        reason: String,
    },
    /// Content called `LMSFinish`.
    Finished,
}

/// Envelope functions the content side accepts from its parent. Tighter
/// than the LMS side's table, intentionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentCommand {
    /// The one expected data-model delivery.
    SetDataModel,
    /// An error record pushed down for visibility.
    ErrorHandler,
    /// Free-text note, logged.
    Message,
}

impl ContentCommand {
    fn from_wire(name: &str) -> Option<Self> {
        match name {
            wire::LMS_SET_DATA_MODEL => Some(Self::SetDataModel),
            wire::ERROR_HANDLER => Some(Self::ErrorHandler),
            wire::MESSAGE => Some(Self::Message),
            _ => None,
        }
    }
}

/// The layer-3 session object.
pub struct ContentBridge {
    port: Box<dyn MessagePort>,
    parent_origin: Origin,
    page_url: Url,
    content_source: Url,
    autocommit: bool,
    autocommit_delay: Duration,
    data_model_timeout: Duration,
    notifier: Option<CompletionNotifier>,
    mock: Arc<Mutex<MockApi>>,
    api_events: UnboundedReceiver<ApiEvent>,
    phase: watch::Sender<Phase>,
    events: Option<UnboundedSender<SessionEvent>>,
    request_id: Option<Uuid>,
    autocommit_at: Option<Instant>,
}

impl ContentBridge {
    /// Bridge for the content page at `page_url` (the launch URL computed
    /// by the LMS side), serving the package entry point `content_source`,
    /// embedded by a parent at `parent_origin`.
    ///
    /// The parent origin is used both ways: incoming deliveries must carry
    /// it, and everything posted upward goes to that parent and nowhere
    /// else. There is no wildcard mode.
    pub fn new(
        port: Box<dyn MessagePort>,
        page_url: Url,
        content_source: Url,
        parent_origin: Origin,
    ) -> Self {
        let (api_tx, api_events) = mpsc::unbounded_channel();
        let mock = Arc::new(Mutex::new(MockApi::new().with_event_sink(api_tx)));
        let (phase, _) = watch::channel(Phase::Uninitialized);
        Self {
            port,
            parent_origin,
            page_url,
            content_source,
            autocommit: true,
            autocommit_delay: DEFAULT_AUTOCOMMIT_DELAY,
            data_model_timeout: DEFAULT_DATA_MODEL_TIMEOUT,
            notifier: None,
            mock,
            api_events,
            phase,
            events: None,
            request_id: None,
            autocommit_at: None,
        }
    }

    /// Configure the debounced auto-commit relay.
    pub fn with_autocommit(mut self, enabled: bool, delay: Duration) -> Self {
        self.autocommit = enabled;
        self.autocommit_delay = delay;
        self
    }

    /// Replace the bounded data-model wait.
    pub fn with_data_model_timeout(mut self, timeout: Duration) -> Self {
        self.data_model_timeout = timeout;
        self
    }

    /// Attach the completion side-channel.
    pub fn with_notifier(mut self, notifier: CompletionNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attach the channel session events are reported on.
    pub fn with_event_sink(mut self, sink: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    /// The API object content talks to. Clones share the session.
    pub fn api(&self) -> SharedApi {
        self.mock.clone()
    }

    /// Observe phase transitions.
    pub fn phase_watch(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Where content gets mounted: the package entry point with the page
    /// query forwarded down.
    pub fn content_url(&self) -> Url {
        let mut url = self.content_source.clone();
        url.set_query(self.page_url.query());
        url
    }

    /// Run the session: request the data model, then service the port, the
    /// mock's call events and the two timers until the parent goes away.
    pub async fn run(mut self) {
        self.request_data_model();
        let wait_deadline = Instant::now() + self.data_model_timeout;
        loop {
            let phase = self.phase_now();
            let autocommit_at = self.autocommit_at;
            tokio::select! {
                delivery = self.port.recv() => match delivery {
                    Some(delivery) => self.handle_message(delivery),
                    None => {
                        debug!("parent port closed; content bridge done");
                        break;
                    }
                },
                event = self.api_events.recv() => match event {
                    Some(event) => self.handle_api_event(event),
                    None => break,
                },
                _ = time::sleep_until(wait_deadline), if phase == Phase::AwaitingDataModel => {
                    self.data_model_wait_expired();
                }
                _ = sleep_until_opt(autocommit_at), if autocommit_at.is_some() => {
                    self.fire_autocommit();
                }
            }
        }
    }

    fn phase_now(&self) -> Phase {
        *self.phase.borrow()
    }

    fn set_phase(&self, next: Phase) {
        let previous = *self.phase.borrow();
        if previous != next {
            debug!("content session phase {previous} -> {next}");
            self.phase.send_replace(next);
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(sink) = &self.events {
            let _ = sink.send(event);
        }
    }

    fn with_mock<R>(&self, f: impl FnOnce(&mut MockApi) -> R) -> R {
        let mut guard = self.mock.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Send the one data-model request and arm the bounded wait.
    fn request_data_model(&mut self) {
        let request_id = Uuid::new_v4();
        self.request_id = Some(request_id);
        let request = Envelope::bare(wire::POST_LMS_DATA_MODEL);
        match self.port.post(request.to_value()) {
            Ok(()) => {
                debug!("data model request {request_id} sent to {}", self.parent_origin);
                self.set_phase(Phase::AwaitingDataModel);
            }
            Err(err) => {
                warn!("cannot request data model: {err}");
                self.set_phase(Phase::Failed);
                self.emit(SessionEvent::Failed {
                    reason: "parent context unreachable".to_owned(),
                });
            }
        }
    }

    fn handle_message(&mut self, delivery: PostedMessage) {
        if delivery.origin != self.parent_origin {
            warn!(
                "dropping message from origin {} (expected {})",
                delivery.origin, self.parent_origin
            );
            return;
        }
        let envelope = match Envelope::parse(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("dropping message from parent: {err}");
                return;
            }
        };
        let Some(command) = ContentCommand::from_wire(&envelope.function) else {
            warn!("dropping unknown function '{}'", envelope.function);
            return;
        };

        match command {
            ContentCommand::SetDataModel => self.load_data_model(&envelope),
            ContentCommand::ErrorHandler => {
                match envelope
                    .arg(0)
                    .cloned()
                    .map(serde_json::from_value::<ErrorRecord>)
                {
                    Some(Ok(record)) => warn!("LMS-side error pushed down: {record}"),
                    _ => warn!("dropping ErrorHandler with unusable arguments"),
                }
            }
            ContentCommand::Message => match envelope.text_arg(0) {
                Some(text) => info!("note from LMS side: {text}"),
                None => warn!("dropping message with unusable arguments"),
            },
        }
    }

    /// The one expected `LMSSetDataModel`: seed the mock, then (and only
    /// then) report the content as mountable.
    fn load_data_model(&mut self, envelope: &Envelope) {
        if self.phase_now() != Phase::AwaitingDataModel {
            warn!("dropping LMSSetDataModel in phase {}", self.phase_now());
            return;
        }
        let Some(raw) = envelope.arg(0) else {
            warn!("dropping LMSSetDataModel without a data model argument");
            return;
        };
        let tree: CmiNode = match serde_json::from_value(raw.clone()) {
            Ok(tree) => tree,
            Err(err) => {
                warn!("dropping undecodable data model: {err}");
                return;
            }
        };
        let categories = tree.len();
        self.with_mock(|mock| mock.load_tree(tree));
        if let Some(id) = self.request_id.take() {
            debug!("data model request {id} fulfilled ({categories} top-level categories)");
        }
        self.set_phase(Phase::Initialized);
        let content_url = self.content_url();
        info!("content ready at {content_url}");
        self.emit(SessionEvent::ContentReady { content_url });
    }

    fn handle_api_event(&mut self, event: ApiEvent) {
        match event {
            ApiEvent::SetValue {
                element,
                value,
                previous,
            } => self.on_set_value(&element, &value, previous.as_deref()),
            ApiEvent::Commit => self.relay_guarded(wire::LMS_COMMIT, Vec::new()),
            ApiEvent::Finish => self.on_finish(),
        }
    }

    fn on_set_value(&mut self, element: &str, value: &str, previous: Option<&str>) {
        self.relay_guarded(wire::LMS_SET_VALUE, vec![json!(element), json!(value)]);
        if self.phase_now() != Phase::Initialized {
            return;
        }
        if self.autocommit && self.autocommit_at.is_none() {
            self.autocommit_at = Some(Instant::now() + self.autocommit_delay);
            debug!("autocommit armed ({:?})", self.autocommit_delay);
        }
        if element == LESSON_STATUS_ELEMENT {
            self.consider_completion(value, previous);
        }
    }

    /// Fire the completion side-channel for a terminal status transition.
    /// Rewriting the same terminal value, and review-mode attempts, are
    /// not reported.
    fn consider_completion(&mut self, status: &str, previous: Option<&str>) {
        if !TERMINAL_STATUSES.contains(&status) {
            return;
        }
        if previous == Some(status) {
            debug!("lesson_status already {status}; completion not re-reported");
            return;
        }
        let mode = self.with_mock(|mock| {
            mock.peek(LESSON_MODE_ELEMENT).unwrap_or_default().to_owned()
        });
        if mode == REVIEW_MODE {
            debug!("review attempt; completion not reported");
            return;
        }
        match &self.notifier {
            Some(notifier) => notifier.spawn_submit(&self.page_url),
            None => info!("completion reached ({status}); no endpoint configured"),
        }
        self.emit(SessionEvent::CompletionFired {
            status: status.to_owned(),
        });
    }

    fn on_finish(&mut self) {
        if self.phase_now() != Phase::Initialized {
            warn!("dropping LMSFinish in phase {}", self.phase_now());
            return;
        }
        self.relay_upward(wire::LMS_FINISH, Vec::new());
        self.set_phase(Phase::Terminated);
        self.emit(SessionEvent::Finished);
        info!("content session terminated");
    }

    /// Relay only while the session is live; anything else is a drop.
    fn relay_guarded(&mut self, function: &str, arguments: Vec<Value>) {
        match self.phase_now() {
            Phase::Initialized => self.relay_upward(function, arguments),
            Phase::Terminated => warn!("dropping {function} after termination"),
            other => debug!("dropping {function} in phase {other}"),
        }
    }

    fn relay_upward(&mut self, function: &str, arguments: Vec<Value>) {
        let envelope = Envelope::new(function, arguments);
        match self.port.post(envelope.to_value()) {
            Ok(()) => {
                debug!("relayed {function} to {}", self.parent_origin);
                self.emit(SessionEvent::Relayed {
                    function: function.to_owned(),
                });
            }
            Err(err) => warn!("cannot relay {function}: {err}"),
        }
    }

    fn fire_autocommit(&mut self) {
        self.autocommit_at = None;
        if self.phase_now() != Phase::Initialized {
            return;
        }
        debug!("autocommit firing");
        self.relay_upward(wire::LMS_COMMIT, Vec::new());
    }

    fn data_model_wait_expired(&mut self) {
        if let Some(id) = self.request_id.take() {
            warn!(
                "data model request {id} unanswered after {:?}; content stays unmounted",
                self.data_model_timeout
            );
        }
        self.set_phase(Phase::Failed);
        self.emit(SessionEvent::Failed {
            reason: "data model request timed out".to_owned(),
        });
    }
}

impl fmt::Debug for ContentBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentBridge")
            .field("page_url", &self.page_url.as_str())
            .field("parent_origin", &self.parent_origin)
            .field("phase", &self.phase_now())
            .field("autocommit", &self.autocommit)
            .field("autocommit_armed", &self.autocommit_at.is_some())
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

fn sleep_until_opt(at: Option<Instant>) -> time::Sleep {
    // Disabled branches still construct their future; park it a day out.
    time::sleep_until(at.unwrap_or_else(|| Instant::now() + Duration::from_secs(24 * 60 * 60)))
}
