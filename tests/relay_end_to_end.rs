//! Integration tests for scormrelay
//!
//! These tests run both bridges as real tasks joined by an in-process port
//! pair, with a fixture LMS upstream and (where a test needs one) a live
//! HTTP server standing in for the completion endpoint.
//!
//! Architecture under test:
//! - LmsBridge harvests the fixture through the read allowlist
//! - ContentBridge seeds its mock API from the delivered tree
//! - Content-side calls relay upward and show up in the fixture call log
//! - Terminal lesson-status transitions POST to the completion endpoint

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use scormrelay::api::{share, with_api, Scorm12Api, SharedApi, WindowRef};
use scormrelay::fixture::{ApiCall, CallLog, FixtureApi};
use scormrelay::relay::{
    CompletionNotifier, ContentBridge, InProcessPort, LmsBridge, Origin, Phase, SessionEvent,
};

const WRAPPER: &str = "https://client.example/scormremote/launch?attempt=1";
const DATA_SOURCE: &str =
    "https://moodle.example/pluginfile.php/481/mod_scormremote/content/0/index.html";

fn fixture() -> FixtureApi {
    FixtureApi::from_entries(&[
        (
            "cmi.core._children",
            "student_id,student_name,lesson_location,lesson_status,lesson_mode,score",
        ),
        ("cmi.core.student_id", "u1"),
        ("cmi.core.student_name", "Lovelace, Ada"),
        ("cmi.core.lesson_location", "page-4"),
        ("cmi.core.lesson_status", "incomplete"),
        ("cmi.core.lesson_mode", "normal"),
        ("cmi.core.score._children", "raw,max,min"),
        ("cmi.core.score.raw", ""),
        ("cmi.core.score.max", "100"),
        ("cmi.core.score.min", "0"),
        ("cmi.suspend_data", "bookmark=4"),
        ("cmi.objectives._children", "id,status"),
        ("cmi.objectives._count", "2"),
        ("cmi.objectives.0.id", "obj-a"),
        ("cmi.objectives.0.status", "not attempted"),
        ("cmi.objectives.1.id", "obj-b"),
        ("cmi.objectives.1.status", "not attempted"),
    ])
}

fn review_fixture() -> FixtureApi {
    FixtureApi::from_entries(&[
        ("cmi.core._children", "student_id,lesson_status,lesson_mode"),
        ("cmi.core.student_id", "u1"),
        ("cmi.core.lesson_status", "completed"),
        ("cmi.core.lesson_mode", "review"),
    ])
}

/// Both bridges mounted and running, content initialized.
struct Harness {
    api: SharedApi,
    phase: watch::Receiver<Phase>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    log: CallLog,
    launch: Url,
    lms_task: JoinHandle<()>,
    content_task: JoinHandle<()>,
}

async fn mount(
    fixture: FixtureApi,
    configure: impl FnOnce(ContentBridge) -> ContentBridge,
) -> Harness {
    let log = fixture.call_log();
    let window = WindowRef::with_api("client-lms", share(fixture));
    let wrapper_url = Url::parse(WRAPPER).unwrap();
    let data_source = Url::parse(DATA_SOURCE).unwrap();

    let (lms_end, content_end) =
        InProcessPort::pair(Origin::of_url(&wrapper_url), Origin::of_url(&data_source));
    let mut lms = LmsBridge::new(
        window,
        Box::new(lms_end),
        wrapper_url.clone(),
        data_source.clone(),
    );
    let launch = lms.start().unwrap();

    let (events_tx, events) = mpsc::unbounded_channel();
    let content = configure(ContentBridge::new(
        Box::new(content_end),
        launch.clone(),
        data_source,
        Origin::of_url(&wrapper_url),
    ))
    .with_event_sink(events_tx);
    let api = content.api();
    let mut phase = content.phase_watch();

    let lms_task = tokio::spawn(lms.run());
    let content_task = tokio::spawn(content.run());

    tokio::time::timeout(
        Duration::from_secs(2),
        phase.wait_for(|phase| *phase == Phase::Initialized),
    )
    .await
    .expect("content never initialized")
    .expect("content bridge went away");

    Harness {
        api,
        phase,
        events,
        log,
        launch,
        lms_task,
        content_task,
    }
}

impl Harness {
    fn call(&self, f: impl FnOnce(&mut dyn Scorm12Api) -> String) -> String {
        with_api(&self.api, f)
    }

    async fn wait_phase(&mut self, want: Phase) {
        tokio::time::timeout(
            Duration::from_secs(2),
            self.phase.wait_for(|phase| *phase == want),
        )
        .await
        .expect("phase not reached within 2s")
        .expect("phase sender gone");
    }

    async fn wait_event(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), self.events.recv())
                .await
                .expect("no session event within 2s")
                .expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    }

    async fn shutdown(self) {
        self.lms_task.abort();
        let _ = self.lms_task.await;
        let _ = self.content_task.await;
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

async fn completion_endpoint() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn wait_for_requests(server: &MockServer, n: usize) -> Vec<wiremock::Request> {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= n {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("completion endpoint saw fewer than {n} requests within 2s");
}

fn notifier_for(server: &MockServer) -> CompletionNotifier {
    CompletionNotifier::new()
        .unwrap()
        .with_base(Url::parse(&server.uri()).unwrap())
}

#[tokio::test]
async fn test_harvested_data_model_reaches_the_content_api() {
    let mut harness = mount(fixture(), |content| content).await;

    let ready = harness
        .wait_event(|event| matches!(event, SessionEvent::ContentReady { .. }))
        .await;
    if let SessionEvent::ContentReady { content_url } = ready {
        // The content URL carries the launch query down, identity included.
        assert_eq!(content_url.query(), harness.launch.query());
        let query = content_url.query().unwrap_or_default();
        assert!(query.contains("attempt=1"));
        assert!(query.contains("lms_origin=client.example"));
        assert!(query.contains("student_id=u1"));
    }

    assert_eq!(harness.call(|api| api.initialize("")), "true");
    assert_eq!(harness.call(|api| api.get_value("cmi.core.student_name")), "Lovelace, Ada");
    assert_eq!(harness.call(|api| api.get_value("cmi.core.lesson_status")), "incomplete");
    assert_eq!(harness.call(|api| api.get_value("cmi.suspend_data")), "bookmark=4");
    assert_eq!(harness.call(|api| api.get_value("cmi.objectives._count")), "2");
    assert_eq!(harness.call(|api| api.get_value("cmi.objectives.1.id")), "obj-b");
    assert_eq!(harness.call(|api| api.get_value("cmi.core.score.max")), "100");
    // Absent from the harvest: reads as an error, not a crash.
    assert_eq!(harness.call(|api| api.get_value("cmi.core.exit")), "");
    assert_eq!(harness.call(|api| api.last_error()), "201");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_full_attempt_relays_upstream_and_posts_completion() {
    let server = completion_endpoint().await;
    let notifier = notifier_for(&server);
    let mut harness = mount(fixture(), move |content| content.with_notifier(notifier)).await;

    assert_eq!(harness.call(|api| api.initialize("")), "true");
    assert_eq!(
        harness.call(|api| api.set_value("cmi.core.lesson_status", "passed")),
        "true"
    );
    harness
        .wait_event(|event| matches!(event, SessionEvent::CompletionFired { status } if status == "passed"))
        .await;
    assert_eq!(harness.call(|api| api.commit("")), "true");
    assert_eq!(harness.call(|api| api.finish("")), "true");
    harness.wait_phase(Phase::Terminated).await;

    let log = harness.log.clone();
    wait_until(|| {
        log.count(|call| {
            matches!(call, ApiCall::SetValue(element, value)
                if element == "cmi.core.lesson_status" && value == "passed")
        }) == 1
            && log.count(|call| matches!(call, ApiCall::Commit)) >= 1
            && log.count(|call| matches!(call, ApiCall::Finish)) == 1
    })
    .await;

    let requests = wait_for_requests(&server, 1).await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url.path(), "/mod/scormremote/submit_completion.php");
    let query: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert!(query.contains(&("contextid".into(), "481".into())));
    assert!(query.contains(&("lms_origin".into(), "client.example".into())));
    assert!(query.contains(&("student_id".into(), "u1".into())));
    assert!(query.contains(&("attempt".into(), "1".into())));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_repeated_terminal_status_posts_completion_once() {
    let server = completion_endpoint().await;
    let notifier = notifier_for(&server);
    let mut harness = mount(fixture(), move |content| content.with_notifier(notifier)).await;

    harness.call(|api| api.initialize(""));
    harness.call(|api| api.set_value("cmi.core.lesson_status", "passed"));
    wait_for_requests(&server, 1).await;

    // Same terminal value again: still relayed, not re-reported.
    harness.call(|api| api.set_value("cmi.core.lesson_status", "passed"));
    harness.call(|api| api.finish(""));
    harness.wait_phase(Phase::Terminated).await;

    let log = harness.log.clone();
    wait_until(|| {
        log.count(|call| matches!(call, ApiCall::SetValue(element, _) if element == "cmi.core.lesson_status"))
            == 2
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_status_change_between_terminal_values_posts_again() {
    let server = completion_endpoint().await;
    let notifier = notifier_for(&server);
    let mut harness = mount(fixture(), move |content| content.with_notifier(notifier)).await;

    harness.call(|api| api.initialize(""));
    harness.call(|api| api.set_value("cmi.core.lesson_status", "failed"));
    wait_for_requests(&server, 1).await;
    harness.call(|api| api.set_value("cmi.core.lesson_status", "passed"));
    let requests = wait_for_requests(&server, 2).await;
    assert_eq!(requests.len(), 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_review_mode_attempt_never_posts_completion() {
    let server = completion_endpoint().await;
    let notifier = notifier_for(&server);
    let mut harness = mount(review_fixture(), move |content| {
        content.with_notifier(notifier)
    })
    .await;

    harness.call(|api| api.initialize(""));
    harness.call(|api| api.set_value("cmi.core.lesson_status", "passed"));
    harness
        .wait_event(
            |event| matches!(event, SessionEvent::Relayed { function } if function == "LMSSetValue"),
        )
        .await;
    harness.call(|api| api.finish(""));
    harness.wait_phase(Phase::Terminated).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap_or_default().is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_autocommit_relays_a_commit_without_content_asking() {
    let mut harness = mount(fixture(), |content| {
        content.with_autocommit(true, Duration::from_millis(100))
    })
    .await;

    harness.call(|api| api.initialize(""));
    harness.call(|api| api.set_value("cmi.core.score.raw", "85"));

    let log = harness.log.clone();
    wait_until(|| {
        log.count(|call| matches!(call, ApiCall::SetValue(element, _) if element == "cmi.core.score.raw"))
            == 1
            && log.count(|call| matches!(call, ApiCall::Commit)) == 1
    })
    .await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_finish_terminates_and_blocks_later_writes() {
    let mut harness = mount(fixture(), |content| content).await;

    harness.call(|api| api.initialize(""));
    assert_eq!(harness.call(|api| api.finish("")), "true");
    harness.wait_phase(Phase::Terminated).await;

    // The mock session is closed and the bridge drops post-termination
    // traffic, so nothing further reaches the fixture.
    assert_eq!(harness.call(|api| api.set_value("cmi.core.exit", "suspend")), "false");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let log = harness.log.clone();
    assert_eq!(log.count(|call| matches!(call, ApiCall::Finish)), 1);
    assert_eq!(
        log.count(|call| matches!(call, ApiCall::SetValue(element, _) if element == "cmi.core.exit")),
        0
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn test_unanswered_data_model_request_fails_the_session() {
    let wrapper_url = Url::parse(WRAPPER).unwrap();
    let data_source = Url::parse(DATA_SOURCE).unwrap();
    // The LMS end exists but nothing ever services it.
    let (lms_end, content_end) =
        InProcessPort::pair(Origin::of_url(&wrapper_url), Origin::of_url(&data_source));

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let content = ContentBridge::new(
        Box::new(content_end),
        data_source.clone(),
        data_source,
        Origin::of_url(&wrapper_url),
    )
    .with_data_model_timeout(Duration::from_millis(80))
    .with_event_sink(events_tx);
    let api = content.api();
    let mut phase = content.phase_watch();
    let content_task = tokio::spawn(content.run());

    tokio::time::timeout(
        Duration::from_secs(2),
        phase.wait_for(|phase| *phase == Phase::Failed),
    )
    .await
    .expect("session never failed")
    .expect("content bridge went away");

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if matches!(&event, SessionEvent::Failed { reason } if reason.contains("timed out")) {
            saw_failure = true;
        }
    }
    assert!(saw_failure, "expected a Failed session event");

    // Content that shows up anyway talks to a dead session.
    assert_eq!(with_api(&api, |api| api.initialize("")), "true");
    assert_eq!(with_api(&api, |api| api.get_value("cmi.core.student_id")), "");
    assert_eq!(with_api(&api, |api| api.last_error()), "201");

    drop(lms_end);
    let _ = content_task.await;
}
