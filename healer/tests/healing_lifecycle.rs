//! Session-level tests for the self-healing loop.
//!
//! These drive `Healer::heal` over scripted collaborators to verify the
//! state machine end to end: remediation, early exit, backoff, safety
//! gating, cancellation, and memory persistence.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use healer::core::types::{ErrorType, RemediationAction};
use healer::io::config::HealerConfig;
use healer::io::inference::InferenceResponse;
use healer::io::memory::KnowledgeHit;
use healer::test_support::{
    RecordingMemory, ScriptedInference, ScriptedInstaller, ScriptedRunner, failure, success,
};
use healer::{CancelToken, HealError, HealRequest, HealStop, Healer};

const COMMIT_WAIT: Duration = Duration::from_secs(5);

fn config(initial_retry_delay_ms: u64) -> HealerConfig {
    HealerConfig {
        initial_retry_delay_ms,
        max_retry_delay_ms: 1_000,
        distro: Some("debian".to_string()),
        ..HealerConfig::default()
    }
}

/// Missing tool (exit 127) → installer succeeds → second attempt exits 0.
///
/// The original command is retried unchanged after the install, and the
/// success record names the remediation chain.
#[test]
fn missing_tool_is_installed_then_command_succeeds() {
    let runner = ScriptedRunner::new(vec![
        failure(127, "bash: testtool: command not found"),
        success("tool output"),
    ]);
    let commands = runner.commands_handle();
    let installer = ScriptedInstaller::succeeding();
    let installs = installer.installs_handle();
    let memory = Arc::new(RecordingMemory::new());

    let healer = Healer::new(config(10))
        .with_runner(runner)
        .with_installer(installer)
        .with_memory(memory.clone());
    let outcome = healer
        .heal(&HealRequest::new("testtool --version"), &CancelToken::new())
        .expect("heal");

    assert_eq!(outcome.stop, HealStop::Success);
    assert!(outcome.result.success);
    assert_eq!(outcome.result.retries, 1);
    assert_eq!(
        outcome.result.remediations_applied,
        vec![RemediationAction::InstallPackage]
    );
    assert_eq!(
        *installs.lock().expect("installs"),
        vec![("testtool".to_string(), "debian".to_string())]
    );
    assert_eq!(
        *commands.lock().expect("commands"),
        vec!["testtool --version", "testtool --version"]
    );

    assert_eq!(memory.wait_for_commits(1, COMMIT_WAIT), 1);
    let records = memory.records();
    assert_eq!(records[0].problem, "Execute: testtool --version");
    assert_eq!(
        records[0].solution,
        "testtool --version (after: install_package)"
    );
    assert_eq!(records[0].success_rate, 1.0);
}

/// Unknown failure with no inference provider stops at the first failure.
#[test]
fn unknown_error_without_provider_exits_early() {
    let runner = ScriptedRunner::new(vec![failure(42, "")]);
    let commands = runner.commands_handle();
    let memory = Arc::new(RecordingMemory::new());

    let outcome = Healer::new(config(10))
        .with_runner(runner)
        .with_memory(memory.clone())
        .heal(&HealRequest::new("./deploy.sh"), &CancelToken::new())
        .expect("heal");

    assert_eq!(
        outcome.stop,
        HealStop::CannotRemediate {
            error_type: ErrorType::Unknown
        }
    );
    assert!(!outcome.result.success);
    assert_eq!(outcome.result.retries, 0);
    assert!(outcome.result.remediations_applied.is_empty());
    assert_eq!(commands.lock().expect("commands").len(), 1);

    assert_eq!(memory.wait_for_commits(1, COMMIT_WAIT), 1);
    let records = memory.records();
    assert_eq!(records[0].problem, "Failed: ./deploy.sh");
    assert_eq!(records[0].success_rate, 0.0);
}

/// With a provider, an Unknown failure is rewritten to the suggested command.
#[test]
fn unknown_error_with_provider_runs_suggested_command() {
    let runner = ScriptedRunner::new(vec![
        failure(3, "deploy: lock file is stale"),
        success("deployed"),
    ]);
    let commands = runner.commands_handle();
    let provider = Arc::new(ScriptedInference::new(vec![Ok(InferenceResponse::ok(
        "Remove the stale lock first:\n```bash\nrm -f /tmp/deploy.lock && ./deploy.sh\n```",
    ))]));

    let outcome = Healer::new(config(1))
        .with_runner(runner)
        .with_inference(provider.clone())
        .heal(&HealRequest::new("./deploy.sh"), &CancelToken::new())
        .expect("heal");

    assert_eq!(outcome.stop, HealStop::Success);
    assert_eq!(outcome.result.retries, 1);
    assert_eq!(
        outcome.result.remediations_applied,
        vec![RemediationAction::AiSuggestedFix]
    );
    assert_eq!(
        *commands.lock().expect("commands"),
        vec!["./deploy.sh", "rm -f /tmp/deploy.lock && ./deploy.sh"]
    );
    assert!(provider.prompts()[0].contains("lock file is stale"));
}

/// A provider outage never fails the session; the loop keeps retrying the
/// same command because a provider is configured.
#[test]
fn provider_failure_falls_back_and_keeps_retrying() {
    let runner = ScriptedRunner::new(vec![failure(5, "weird"), failure(5, "weird")]);
    let commands = runner.commands_handle();
    let provider = Arc::new(ScriptedInference::new(vec![Err(anyhow::anyhow!(
        "all tiers exhausted"
    ))]));

    let outcome = Healer::new(config(1))
        .with_runner(runner)
        .with_inference(provider)
        .heal(
            &HealRequest::new("./flaky").with_max_retries(1),
            &CancelToken::new(),
        )
        .expect("heal");

    assert_eq!(outcome.stop, HealStop::ExceededRetries { max_retries: 1 });
    assert_eq!(
        outcome.result.remediations_applied,
        vec![RemediationAction::FallbackAnalysis]
    );
    assert_eq!(
        *commands.lock().expect("commands"),
        vec!["./flaky", "./flaky"]
    );
}

/// Three forced failures with a 10ms initial delay wait at least 10+20+40ms
/// between the first and the last attempt start.
#[test]
fn backoff_doubles_between_attempts() {
    let runner = ScriptedRunner::new(vec![
        failure(127, "bash: jq: command not found"),
        failure(127, "bash: jq: command not found"),
        failure(127, "bash: jq: command not found"),
        success(""),
    ]);
    let starts = runner.starts_handle();

    let outcome = Healer::new(config(10))
        .with_runner(runner)
        .with_installer(ScriptedInstaller::succeeding())
        .heal(&HealRequest::new("jq . data.json"), &CancelToken::new())
        .expect("heal");

    assert_eq!(outcome.stop, HealStop::Success);
    assert_eq!(outcome.result.retries, 3);

    let starts = starts.lock().expect("starts");
    assert_eq!(starts.len(), 4);
    assert!(starts[1] - starts[0] >= Duration::from_millis(10));
    assert!(starts[2] - starts[1] >= Duration::from_millis(20));
    assert!(starts[3] - starts[2] >= Duration::from_millis(40));
    assert!(starts[3] - starts[0] >= Duration::from_millis(70));
}

/// Retries run out: the session reports the last failure.
#[test]
fn retries_are_bounded() {
    let runner = ScriptedRunner::new(vec![
        failure(127, "bash: jq: command not found"),
        failure(127, "bash: jq: command not found"),
        failure(127, "bash: jq: command not found"),
    ]);
    let commands = runner.commands_handle();

    let outcome = Healer::new(config(1))
        .with_runner(runner)
        .with_installer(ScriptedInstaller::succeeding())
        .heal(
            &HealRequest::new("jq . data.json").with_max_retries(2),
            &CancelToken::new(),
        )
        .expect("heal");

    assert_eq!(outcome.stop, HealStop::ExceededRetries { max_retries: 2 });
    assert!(!outcome.result.success);
    assert_eq!(outcome.result.retries, 2);
    assert_eq!(
        outcome.result.remediations_applied,
        vec![
            RemediationAction::InstallPackage,
            RemediationAction::InstallPackage
        ]
    );
    assert_eq!(commands.lock().expect("commands").len(), 3);
}

/// Dangerous commands are rejected before the runner is ever invoked.
#[test]
fn dangerous_command_never_runs() {
    for command in ["rm -rf /", "dd if=/dev/zero of=/dev/sda", ":(){ :|:& };:"] {
        let runner = ScriptedRunner::new(vec![success("")]);
        let commands = runner.commands_handle();
        let healer = Healer::new(config(1)).with_runner(runner);

        let err = healer.execute_with_healing(command).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<HealError>(),
                Some(HealError::SafetyRejected { .. })
            ),
            "unexpected error for {command:?}: {err:#}"
        );
        let err = healer.execute(command).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HealError>(),
            Some(HealError::SafetyRejected { .. })
        ));
        assert!(commands.lock().expect("commands").is_empty());
    }
}

/// An AI rewrite that trips the safety gate is never executed.
#[test]
fn unsafe_rewrite_stops_the_session() {
    let runner = ScriptedRunner::new(vec![failure(9, "disk is corrupt")]);
    let commands = runner.commands_handle();
    let provider = Arc::new(ScriptedInference::new(vec![Ok(InferenceResponse::ok(
        "$ mkfs.ext4 /dev/sda1",
    ))]));

    let outcome = Healer::new(config(1))
        .with_runner(runner)
        .with_inference(provider)
        .heal(&HealRequest::new("mount /data"), &CancelToken::new())
        .expect("heal");

    assert_eq!(
        outcome.stop,
        HealStop::UnsafeRemediation {
            command: "mkfs.ext4 /dev/sda1".to_string()
        }
    );
    assert!(!outcome.result.success);
    assert_eq!(outcome.result.command, "mount /data");
    assert_eq!(*commands.lock().expect("commands"), vec!["mount /data"]);
}

/// Unsupported distro is a configuration error and escapes the loop.
#[test]
fn unsupported_distro_propagates() {
    let runner = ScriptedRunner::new(vec![failure(127, "bash: jq: command not found")]);
    let err = Healer::new(config(1))
        .with_runner(runner)
        .with_installer(ScriptedInstaller::succeeding())
        .heal(
            &HealRequest::new("jq .").with_distro("plan9"),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<HealError>(),
        Some(&HealError::UnsupportedDistro {
            distro: "plan9".to_string()
        })
    );
}

/// A refused or failed install is not applicable: the session stops early.
#[test]
fn unsafe_or_failed_install_cannot_remediate() {
    for installer in [ScriptedInstaller::refusing(), ScriptedInstaller::failing(100)] {
        let runner = ScriptedRunner::new(vec![failure(127, "bash: sometool: command not found")]);
        let outcome = Healer::new(config(1))
            .with_runner(runner)
            .with_installer(installer)
            .heal(&HealRequest::new("sometool"), &CancelToken::new())
            .expect("heal");
        assert_eq!(
            outcome.stop,
            HealStop::CannotRemediate {
                error_type: ErrorType::MissingTool
            }
        );
        assert_eq!(outcome.result.retries, 0);
    }
}

/// A dangerous-package refusal is absorbed like any failed install.
#[test]
fn dangerous_package_is_absorbed() {
    let runner = ScriptedRunner::new(vec![failure(127, "bash: rootkit: command not found")]);
    let outcome = Healer::new(config(1))
        .with_runner(runner)
        .with_installer(ScriptedInstaller::erroring(HealError::DangerousPackage {
            package: "rootkit".to_string(),
        }))
        .heal(&HealRequest::new("rootkit"), &CancelToken::new())
        .expect("heal");
    assert!(matches!(outcome.stop, HealStop::CannotRemediate { .. }));
}

/// Memory failures are logged and swallowed; the session still succeeds.
#[test]
fn memory_failure_does_not_fail_session() {
    let memory = Arc::new(RecordingMemory::failing());
    let outcome = Healer::new(config(1))
        .with_runner(ScriptedRunner::new(vec![success("ok")]))
        .with_memory(memory.clone())
        .heal(&HealRequest::new("true"), &CancelToken::new())
        .expect("heal");

    assert_eq!(outcome.stop, HealStop::Success);
    assert_eq!(memory.wait_for_commits(1, COMMIT_WAIT), 1);
    assert!(memory.records().is_empty());
    assert_eq!(memory.queries().len(), 1);
}

/// Prior solutions are looked up before the first attempt without changing
/// the command that runs.
#[test]
fn memory_search_precedes_first_attempt() {
    let memory = Arc::new(RecordingMemory::with_hits(vec![KnowledgeHit {
        problem: "Execute: uptime".to_string(),
        solution: "uptime -p".to_string(),
        score: 0.9,
        success_rate: 1.0,
    }]));
    let runner = ScriptedRunner::new(vec![success("up 3 days")]);
    let commands = runner.commands_handle();

    Healer::new(config(1))
        .with_runner(runner)
        .with_memory(memory.clone())
        .heal(&HealRequest::new("uptime"), &CancelToken::new())
        .expect("heal");

    let queries = memory.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].query, "uptime");
    assert_eq!(queries[0].limit, 3);
    assert_eq!(queries[0].distro.as_deref(), Some("debian"));
    assert_eq!(*commands.lock().expect("commands"), vec!["uptime"]);
}

/// A session cancelled before it starts never runs anything or succeeds.
#[test]
fn cancelled_session_runs_nothing() {
    let runner = ScriptedRunner::new(vec![success("")]);
    let commands = runner.commands_handle();
    let cancel = CancelToken::new();
    cancel.cancel();

    let outcome = Healer::new(config(1))
        .with_runner(runner)
        .heal(&HealRequest::new("true"), &cancel)
        .expect("heal");

    assert_eq!(outcome.stop, HealStop::Cancelled);
    assert!(!outcome.result.success);
    assert_eq!(outcome.result.exit_code, healer::exit_codes::CANCELLED);
    assert!(commands.lock().expect("commands").is_empty());
}

/// Cancelling during a long backoff wakes the session immediately.
#[test]
fn cancel_interrupts_backoff() {
    let runner = ScriptedRunner::new(vec![failure(1, "Permission denied"), success("")]);
    let commands = runner.commands_handle();
    let healer = Healer::new(HealerConfig {
        initial_retry_delay_ms: 60_000,
        max_retry_delay_ms: 60_000,
        ..config(1)
    })
    .with_runner(runner);

    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        remote.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = healer
        .heal(&HealRequest::new("cat /root/secret"), &cancel)
        .expect("heal");
    canceller.join().expect("join canceller");

    assert_eq!(outcome.stop, HealStop::Cancelled);
    assert!(!outcome.result.success);
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(commands.lock().expect("commands").len(), 1);
    // The rewrite never ran, so it is not reported as applied.
    assert_eq!(outcome.result.retries, 0);
    assert!(outcome.result.remediations_applied.is_empty());
    assert!(outcome.result.remediations_applied.len() <= outcome.result.retries as usize);
}

/// Cancelling while a package manager runs stops the install and the session.
#[test]
fn cancel_interrupts_tool_install() {
    let runner = ScriptedRunner::new(vec![failure(127, "bash: jq: command not found")]);
    let commands = runner.commands_handle();
    let installer = ScriptedInstaller::hanging();
    let installs = installer.installs_handle();
    let memory = Arc::new(RecordingMemory::new());
    let healer = Healer::new(config(1))
        .with_runner(runner)
        .with_installer(installer)
        .with_memory(memory.clone());

    let cancel = CancelToken::new();
    let remote = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        remote.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = healer
        .heal(&HealRequest::new("jq . data.json"), &cancel)
        .expect("heal");
    canceller.join().expect("join canceller");

    assert_eq!(outcome.stop, HealStop::Cancelled);
    assert!(!outcome.result.success);
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(installs.lock().expect("installs").len(), 1);
    assert_eq!(commands.lock().expect("commands").len(), 1);
    assert!(outcome.result.remediations_applied.is_empty());
    assert_eq!(memory.wait_for_commits(1, Duration::from_millis(200)), 0);
}
