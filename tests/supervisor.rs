// tests/supervisor.rs
use std::sync::Arc;

use discord_x_notifier::config::PollPolicy;
use discord_x_notifier::supervisor::Supervisor;
use discord_x_notifier::testing::{posts, RecordingSink, ScriptedSource};
use discord_x_notifier::types::FetchOutcome;

fn supervisor(threshold: u32, realert: u32, auth_every: u64) -> (Supervisor, Arc<ScriptedSource>, Arc<RecordingSink>) {
    let source = Arc::new(ScriptedSource::new());
    let sink = Arc::new(RecordingSink::new());
    let policy = PollPolicy {
        alert_threshold: threshold,
        realert_every: realert,
        auth_check_every: auth_every,
        ..PollPolicy::default()
    };
    (
        Supervisor::new(source.clone(), sink.clone(), &policy),
        source,
        sink,
    )
}

fn err() -> FetchOutcome {
    FetchOutcome::Error("status 503".into())
}

#[tokio::test]
async fn success_resets_counter() {
    let (mut sup, _, _) = supervisor(5, 20, 0);
    for _ in 0..3 {
        sup.record_outcome("alice", &err()).await;
    }
    assert_eq!(sup.consecutive_failures("alice"), 3);

    sup.record_outcome("alice", &FetchOutcome::Posts(posts(&[1]))).await;
    assert_eq!(sup.consecutive_failures("alice"), 0);

    sup.record_outcome("alice", &err()).await;
    sup.record_outcome("alice", &FetchOutcome::Empty).await;
    assert_eq!(sup.consecutive_failures("alice"), 0);
}

#[tokio::test]
async fn alert_at_threshold_then_every_realert_multiple() {
    let (mut sup, _, sink) = supervisor(5, 20, 0);
    let mut fired = Vec::new();
    for n in 1..=40u32 {
        if sup.record_outcome("alice", &err()).await {
            fired.push(n);
        }
    }
    assert_eq!(fired, vec![5, 20, 40]);

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 3);
    assert_eq!(alerts[0].0, "Polling failing for @alice");
    assert!(alerts[0].1.contains("5 consecutive"));
    assert!(alerts[0].1.contains("status 503"));
}

#[tokio::test]
async fn counters_are_per_handle() {
    let (mut sup, _, sink) = supervisor(2, 0, 0);
    sup.record_outcome("alice", &err()).await;
    sup.record_outcome("bob", &err()).await;
    assert!(sink.alerts().is_empty());
    sup.record_outcome("bob", &err()).await;
    assert_eq!(sink.alerts().len(), 1);
    assert_eq!(sup.consecutive_failures("alice"), 1);
}

#[tokio::test]
async fn failing_alert_is_swallowed() {
    let (mut sup, _, sink) = supervisor(1, 0, 0);
    sink.fail_alerts(true);
    assert!(sup.record_outcome("alice", &err()).await);
    assert_eq!(sup.consecutive_failures("alice"), 1);
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn auth_probe_runs_every_n_cycles() {
    let (mut sup, source, sink) = supervisor(5, 0, 3);
    assert_eq!(sup.finish_cycle().await, None);
    assert_eq!(sup.finish_cycle().await, None);
    assert_eq!(sup.finish_cycle().await, Some(true));
    assert_eq!(source.auth_checks(), 1);
    assert!(sink.alerts().is_empty());

    source.set_auth_ok(false);
    sup.finish_cycle().await;
    sup.finish_cycle().await;
    assert_eq!(sup.finish_cycle().await, Some(false));
    assert_eq!(sup.cycles(), 6);
    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].0, "X authentication degraded");
}

#[tokio::test]
async fn auth_probe_disabled_with_zero() {
    let (mut sup, source, _) = supervisor(5, 0, 0);
    for _ in 0..10 {
        assert_eq!(sup.finish_cycle().await, None);
    }
    assert_eq!(source.auth_checks(), 0);
}
