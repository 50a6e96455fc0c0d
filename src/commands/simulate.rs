//! Full relay session simulation.
//!
//! Wires both bridges back-to-back over an in-process port pair, mounts a
//! fixture LMS behind the wrapper window, drives the content-side mock API
//! from a script, and prints what crosses each boundary along with a final
//! upstream call summary.

// Rust guideline compliant 2026-04

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::api::{share, with_api, Scorm12Api, SharedApi, WindowRef};
use crate::commands::harvest::load_fixture;
use crate::config::RelayConfig;
use crate::fixture::{parse_script, ApiCall, CallLog, ScriptStep};
use crate::relay::{
    CompletionNotifier, ContentBridge, InProcessPort, LmsBridge, Origin, Phase, SessionEvent,
};

/// Everything a simulated session needs from the command line.
#[derive(Debug)]
pub struct SessionArgs {
    /// Fixture file the upstream LMS answers from.
    pub fixture: PathBuf,
    /// Where completion POSTs go; unset leaves the side-channel log-only.
    pub completion_url: Option<Url>,
    /// Script file driving the content-side API; unset runs the default.
    pub script: Option<PathBuf>,
    /// URL of the wrapper page on the client origin.
    pub wrapper_url: Url,
    /// Package entry point on the serving origin.
    pub data_source: Url,
}

/// Run one simulated session to completion.
pub fn run(args: SessionArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(session(args))
}

async fn session(args: SessionArgs) -> Result<()> {
    let config = RelayConfig::load()?;
    let api = load_fixture(&args.fixture)?;
    let log = api.call_log();
    let script = match &args.script {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse_script(&raw)
                .with_context(|| format!("Failed to parse {} as a script", path.display()))?
        }
        None => default_script(),
    };

    let window = WindowRef::with_api("client-lms", share(api));
    let (lms_end, content_end) = InProcessPort::pair(
        Origin::of_url(&args.wrapper_url),
        Origin::of_url(&args.data_source),
    );

    let mut lms = LmsBridge::new(
        window,
        Box::new(lms_end),
        args.wrapper_url.clone(),
        args.data_source.clone(),
    )
    .with_allowlist(config.allowlist());
    let launch = lms.start().context("mounting the LMS side")?;
    report(&format!("launch URL: {launch}"));

    let mut content = ContentBridge::new(
        Box::new(content_end),
        launch,
        args.data_source.clone(),
        Origin::of_url(&args.wrapper_url),
    )
    .with_autocommit(config.autocommit, config.autocommit_delay())
    .with_data_model_timeout(config.data_model_timeout());
    if let Some(base) = args.completion_url.clone() {
        let mut notifier = CompletionNotifier::with_timeout(config.http_timeout())?
            .with_endpoint_path(&config.completion_path)
            .with_base(base);
        if let Some(context_id) = config.completion_context_id {
            notifier = notifier.with_context_override(context_id);
        }
        content = content.with_notifier(notifier);
    }
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    content = content.with_event_sink(events_tx);

    let api_handle = content.api();
    let mut phase_rx = content.phase_watch();

    let lms_task = tokio::spawn(lms.run());
    let content_task = tokio::spawn(content.run());
    let reporter = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            report_event(&event);
        }
    });

    let mounted = phase_rx
        .wait_for(|phase| matches!(phase, Phase::Initialized | Phase::Failed))
        .await
        .map(|phase| *phase);
    match mounted {
        Ok(Phase::Initialized) => {}
        Ok(_) => {
            lms_task.abort();
            let _ = content_task.await;
            let _ = reporter.await;
            bail!("session failed before content could mount");
        }
        Err(_) => bail!("content bridge went away during startup"),
    }

    drive_script(&api_handle, &script).await;

    // Let a trailing autocommit or finish settle before tearing down.
    let settle = config.autocommit_delay() + Duration::from_secs(1);
    let _ = tokio::time::timeout(
        settle,
        phase_rx.wait_for(|phase| matches!(phase, Phase::Terminated | Phase::Failed)),
    )
    .await;

    lms_task.abort();
    let _ = lms_task.await;
    let _ = content_task.await;
    let _ = reporter.await;

    print_summary(&log);
    Ok(())
}

/// What runs when no `--script` is given: a minimal complete attempt.
fn default_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::Initialize,
        ScriptStep::GetValue {
            element: "cmi.core.lesson_status".to_owned(),
        },
        ScriptStep::SetValue {
            element: "cmi.core.lesson_status".to_owned(),
            value: "completed".to_owned(),
        },
        ScriptStep::Commit,
        ScriptStep::Finish,
    ]
}

async fn drive_script(api: &SharedApi, steps: &[ScriptStep]) {
    for step in steps {
        match step {
            ScriptStep::Initialize => {
                let result = with_api(api, |api| api.initialize(""));
                report(&format!("LMSInitialize(\"\") -> {result}"));
            }
            ScriptStep::GetValue { element } => {
                let value = with_api(api, |api| api.get_value(element));
                report(&format!("LMSGetValue({element}) -> {value:?}"));
            }
            ScriptStep::SetValue { element, value } => {
                let result = with_api(api, |api| api.set_value(element, value));
                report(&format!("LMSSetValue({element}, {value:?}) -> {result}"));
            }
            ScriptStep::Commit => {
                let result = with_api(api, |api| api.commit(""));
                report(&format!("LMSCommit(\"\") -> {result}"));
            }
            ScriptStep::Finish => {
                let result = with_api(api, |api| api.finish(""));
                report(&format!("LMSFinish(\"\") -> {result}"));
            }
            ScriptStep::WaitMs { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
        }
        // Let the bridge drain the call's events before the next step so
        // the report reads in causal order.
        tokio::task::yield_now().await;
    }
}

fn report(line: &str) {
    println!("[{}] {line}", chrono::Local::now().format("%H:%M:%S%.3f"));
}

fn report_event(event: &SessionEvent) {
    match event {
        SessionEvent::ContentReady { content_url } => {
            report(&format!("content ready at {content_url}"));
        }
        SessionEvent::Relayed { function } => {
            report(&format!("relayed {function} to the LMS side"));
        }
        SessionEvent::CompletionFired { status } => {
            report(&format!("completion reported ({status})"));
        }
        SessionEvent::Failed { reason } => report(&format!("session failed: {reason}")),
        SessionEvent::Finished => report("content finished its session"),
    }
}

fn print_summary(log: &CallLog) {
    println!();
    println!("upstream calls:");
    println!(
        "  LMSInitialize: {}",
        log.count(|call| matches!(call, ApiCall::Initialize))
    );
    println!(
        "  LMSGetValue:   {}",
        log.count(|call| matches!(call, ApiCall::GetValue(_)))
    );
    println!(
        "  LMSSetValue:   {}",
        log.count(|call| matches!(call, ApiCall::SetValue(..)))
    );
    println!(
        "  LMSCommit:     {}",
        log.count(|call| matches!(call, ApiCall::Commit))
    );
    println!(
        "  LMSFinish:     {}",
        log.count(|call| matches!(call, ApiCall::Finish))
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_script_is_a_complete_attempt() {
        let script = default_script();
        assert!(matches!(script.first(), Some(ScriptStep::Initialize)));
        assert!(matches!(script.last(), Some(ScriptStep::Finish)));
        assert!(script.iter().any(|step| matches!(
            step,
            ScriptStep::SetValue { element, value }
                if element == "cmi.core.lesson_status" && value == "completed"
        )));
    }
}
