use std::time::Duration;

use chat_tldr::worker::{Acquire, TriggerState, TriggerTable};

const STALE: Duration = Duration::from_secs(600);
const DEDUP: Duration = Duration::from_secs(300);

fn acquired(result: Acquire) -> chat_tldr::worker::TriggerGuard {
    match result {
        Acquire::Acquired(guard) => guard,
        other => panic!("expected Acquired, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_acquire_while_in_flight_is_refused() {
    let table = TriggerTable::new(STALE, DEDUP);

    let _guard = acquired(table.try_acquire("C1"));

    assert!(matches!(table.try_acquire("C1"), Acquire::AlreadyRunning));
    assert!(table.try_acquire_forced("C1").is_none());
    assert_eq!(table.in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_different_chats_do_not_block_each_other() {
    let table = TriggerTable::new(STALE, DEDUP);

    let _a = acquired(table.try_acquire("C1"));
    let _b = acquired(table.try_acquire("C2"));

    assert_eq!(table.in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_clears_marker() {
    let table = TriggerTable::new(STALE, DEDUP);

    let guard = acquired(table.try_acquire("C1"));
    drop(guard);

    assert_eq!(table.state("C1"), None);
    let _again = acquired(table.try_acquire("C1"));
}

#[tokio::test(start_paused = true)]
async fn test_successful_run_suppresses_repeats_within_window() {
    let table = TriggerTable::new(STALE, DEDUP);

    let mut guard = acquired(table.try_acquire("C1"));
    guard.mark_succeeded();
    drop(guard);

    assert!(matches!(
        table.state("C1"),
        Some(TriggerState::Completed { .. })
    ));
    assert!(matches!(table.try_acquire("C1"), Acquire::AlreadySummarized));

    // A forced run ignores the completion marker.
    drop(table.try_acquire_forced("C1").expect("forced claim"));

    tokio::time::advance(DEDUP + Duration::from_secs(1)).await;
    let _later = acquired(table.try_acquire("C1"));
}

#[tokio::test(start_paused = true)]
async fn test_zero_dedup_window_leaves_no_marker() {
    let table = TriggerTable::new(STALE, Duration::ZERO);

    let mut guard = acquired(table.try_acquire("C1"));
    guard.mark_succeeded();
    drop(guard);

    assert_eq!(table.state("C1"), None);
}

#[tokio::test(start_paused = true)]
async fn test_stale_marker_is_replaced() {
    let table = TriggerTable::new(STALE, DEDUP);

    let crashed = acquired(table.try_acquire("C1"));

    tokio::time::advance(STALE - Duration::from_secs(1)).await;
    assert!(matches!(table.try_acquire("C1"), Acquire::AlreadyRunning));

    tokio::time::advance(Duration::from_secs(2)).await;
    let takeover = acquired(table.try_acquire("C1"));
    assert_ne!(takeover.run_id(), crashed.run_id());

    // The stale run finishing late must not clear the new run's marker.
    drop(crashed);
    match table.state("C1") {
        Some(TriggerState::InFlight { run_id, .. }) => assert_eq!(run_id, takeover.run_id()),
        other => panic!("expected the takeover marker, got {other:?}"),
    }

    drop(takeover);
    assert_eq!(table.state("C1"), None);
}

#[tokio::test]
async fn test_concurrent_acquires_yield_exactly_one_winner() {
    let table = TriggerTable::new(STALE, DEDUP);

    let mut handles = Vec::new();
    for _ in 0..32 {
        let table = table.clone();
        handles.push(tokio::spawn(async move {
            match table.try_acquire("C1") {
                Acquire::Acquired(guard) => Some(guard),
                _ => None,
            }
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(guard) = handle.await.unwrap() {
            winners.push(guard);
        }
    }
    assert_eq!(winners.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_release_wakes_on_drop() {
    let table = TriggerTable::new(STALE, DEDUP);
    let guard = acquired(table.try_acquire("C1"));

    let waiter = {
        let table = table.clone();
        tokio::spawn(async move { table.wait_for_release(Duration::from_secs(3600)).await })
    };
    tokio::task::yield_now().await;

    let started = tokio::time::Instant::now();
    drop(guard);
    waiter.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3600));
}

#[tokio::test(start_paused = true)]
async fn test_expired_completion_markers_are_pruned() {
    let table = TriggerTable::new(STALE, DEDUP);

    for i in 0..1000 {
        let mut guard = acquired(table.try_acquire(&format!("C{i}")));
        guard.mark_succeeded();
    }
    let _running = acquired(table.try_acquire("live"));
    assert_eq!(table.len(), 1001);

    tokio::time::advance(DEDUP - Duration::from_secs(1)).await;
    assert_eq!(table.prune_expired(), 0);

    tokio::time::advance(Duration::from_secs(3600)).await;
    let _next = acquired(table.try_acquire("C-new"));

    // Only the two in-flight markers remain.
    assert_eq!(table.len(), 2);
    assert_eq!(table.in_flight(), 2);
    assert_eq!(table.state("C0"), None);
}
