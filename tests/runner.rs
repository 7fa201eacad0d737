// tests/runner.rs
use std::sync::Arc;
use std::time::Duration;

use discord_x_notifier::config::PollPolicy;
use discord_x_notifier::engine::PollEngine;
use discord_x_notifier::scheduler::Runner;
use discord_x_notifier::state::{StoreScope, WatermarkStore};
use discord_x_notifier::testing::{RecordingSink, Scripted, ScriptedSource};
use discord_x_notifier::types::PostId;
use tokio_util::sync::CancellationToken;

fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(20),
        stagger: Duration::from_millis(1),
        fetch_timeout: Duration::from_millis(200),
        auth_check_every: 0,
        ..PollPolicy::default()
    }
}

fn runner(
    dir: &std::path::Path,
    handles: &[&str],
    policy: PollPolicy,
) -> (Runner, Arc<ScriptedSource>, Arc<RecordingSink>) {
    let source = Arc::new(ScriptedSource::new());
    let sink = Arc::new(RecordingSink::new());
    let store = WatermarkStore::empty(dir.join("last-seen.json"));
    let engine = PollEngine::new(source.clone(), sink.clone(), store, &policy);
    let handles = handles.iter().map(|h| h.to_string()).collect();
    (Runner::new(engine, handles, &policy), source, sink)
}

#[tokio::test]
async fn cycle_visits_handles_in_list_order() {
    let dir = tempfile::tempdir().unwrap();
    let (mut r, source, sink) = runner(dir.path(), &["carol", "alice", "bob"], fast_policy());
    source.push_posts("alice", &[2]);
    source.push_posts("bob", &[3]);
    source.push_posts("carol", &[1]);

    assert!(r.run_cycle(&CancellationToken::new()).await);

    let order: Vec<String> = source.calls().into_iter().map(|(h, _)| h).collect();
    assert_eq!(order, vec!["carol", "alice", "bob"]);
    assert_eq!(sink.delivered(), vec![1, 2, 3]);
}

#[tokio::test]
async fn one_failing_handle_does_not_stop_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let (mut r, source, sink) = runner(dir.path(), &["alice", "bob"], fast_policy());
    source.push_error("alice", "down");
    source.push_posts("bob", &[9]);

    assert!(r.run_cycle(&CancellationToken::new()).await);
    assert_eq!(sink.delivered(), vec![9]);
    assert_eq!(r.engine().supervisor().consecutive_failures("alice"), 1);
    assert_eq!(r.engine().supervisor().cycles(), 1);
}

#[tokio::test]
async fn cancelled_cycle_stops_early() {
    let dir = tempfile::tempdir().unwrap();
    let (mut r, source, _) = runner(dir.path(), &["alice", "bob"], fast_policy());
    let token = CancellationToken::new();
    token.cancel();
    assert!(!r.run_cycle(&token).await);
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn shutdown_during_hung_fetch_flushes_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let policy = PollPolicy {
        fetch_timeout: Duration::from_secs(60),
        ..fast_policy()
    };
    let (r, source, sink) = runner(dir.path(), &["alice"], policy);
    source.push_posts("alice", &[4]);
    source.push("alice", Scripted::Hang);

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let engine = tokio::time::timeout(Duration::from_secs(5), r.run(token))
        .await
        .expect("runner must stop on cancellation");

    assert_eq!(engine.store().get("alice"), Some(PostId::new(4)));
    assert!(sink.is_closed());
    let on_disk = WatermarkStore::load(&StoreScope::Shared {
        path: dir.path().join("last-seen.json"),
    });
    assert_eq!(on_disk.get("alice"), Some(PostId::new(4)));
}

#[tokio::test]
async fn shutdown_during_startup_offset_never_polls() {
    let dir = tempfile::tempdir().unwrap();
    let policy = PollPolicy {
        startup_offset: Duration::from_secs(3600),
        ..fast_policy()
    };
    let (r, source, sink) = runner(dir.path(), &["alice"], policy);

    let token = CancellationToken::new();
    token.cancel();
    r.run(token).await;

    assert!(source.calls().is_empty());
    assert!(sink.is_closed());
}

#[tokio::test]
async fn loop_keeps_polling_until_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let (r, source, sink) = runner(dir.path(), &["alice"], fast_policy());
    source.push_posts("alice", &[1]);
    source.push_posts("alice", &[1, 2]);

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });
    let engine = r.run(token).await;

    assert!(source.calls().len() >= 2);
    assert_eq!(sink.delivered(), vec![1, 2]);
    assert!(engine.supervisor().cycles() >= 2);
}
