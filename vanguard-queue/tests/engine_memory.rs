//! Lifecycle properties of the engine over the in-memory backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use vanguard_queue::{
    Clock, JobEvent, JobRecord, JobStatus, Lane, LeaseReaper, ManualClock, MemoryBackend,
    Promoter, QueueConfig, QueueEngine, QueueError, ReserveFrom, RetryPolicy,
};

struct Harness {
    engine: Arc<QueueEngine<MemoryBackend>>,
    clock: ManualClock,
    promoter: Promoter<MemoryBackend>,
    reaper: LeaseReaper<MemoryBackend>,
}

fn create_harness() -> Harness {
    let clock = ManualClock::new();
    let config = QueueConfig::new()
        .with_default_lease(Duration::from_secs(30))
        .with_retry_policy(RetryPolicy::immediate());
    let engine = Arc::new(
        QueueEngine::new(Arc::new(MemoryBackend::new()))
            .with_config(config)
            .with_clock(Arc::new(clock.clone())),
    );

    Harness {
        promoter: Promoter::new(engine.clone()),
        reaper: LeaseReaper::new(engine.clone()),
        engine,
        clock,
    }
}

fn job(lane: Lane) -> JobRecord {
    JobRecord::new(lane, br#"{"task":"send_email"}"#.to_vec())
}

#[tokio::test]
async fn retry_then_dead_letter_end_to_end() {
    let h = create_harness();
    let j1 = h
        .engine
        .enqueue(job(Lane::High).with_max_retries(1))
        .await
        .unwrap();

    let first = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    assert_eq!(first.id, j1.id);
    assert_eq!(first.status, JobStatus::Processing);

    h.engine
        .fail_with_retry(&first, h.clock.now(), "smtp timeout")
        .await
        .unwrap();
    assert_eq!(h.promoter.run_once().await.unwrap(), 1);

    let second = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    assert_eq!(second.id, j1.id);
    assert_eq!(second.retries, 1);

    let err = h
        .engine
        .fail_with_retry(&second, h.clock.now(), "smtp timeout")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        QueueError::RetryBudgetExceeded {
            id: j1.id.clone(),
            retries: 1,
            max_retries: 1
        }
    );

    h.engine.move_to_dead(&second, "smtp timeout").await.unwrap();
    let stored = h.engine.get(&j1.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Dead);
    assert_eq!(stored.error.as_deref(), Some("smtp timeout"));
    assert_eq!(h.engine.stats(Lane::High).await.unwrap().pending(), 0);
}

#[tokio::test]
async fn delayed_job_is_promoted_end_to_end() {
    let h = create_harness();
    let run_at = h.clock.now() + chrono::Duration::seconds(10);
    let j2 = h.engine.enqueue_delayed(job(Lane::Low), run_at).await.unwrap();
    assert_eq!(j2.status, JobStatus::Delayed);
    assert_eq!(j2.scheduled_at, Some(run_at));

    let err = h
        .engine
        .reserve(Lane::Low.into(), Duration::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err, QueueError::NoJobAvailable);

    h.clock.advance(chrono::Duration::seconds(10));
    h.promoter.run_once().await.unwrap();

    let reserved = h.engine.reserve(Lane::Low.into(), Duration::ZERO).await.unwrap();
    assert_eq!(reserved.id, j2.id);
}

#[tokio::test]
async fn future_jobs_are_never_reserved() {
    let h = create_harness();
    h.engine
        .enqueue_delayed(job(Lane::Default), h.clock.now() + chrono::Duration::minutes(1))
        .await
        .unwrap();
    h.engine
        .enqueue(job(Lane::Default).with_max_retries(5))
        .await
        .unwrap();
    let reserved = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    h.engine
        .fail_with_retry(&reserved, h.clock.now() + chrono::Duration::minutes(1), "later")
        .await
        .unwrap();

    assert_eq!(h.promoter.run_once().await.unwrap(), 0);
    assert_eq!(
        h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await,
        Err(QueueError::NoJobAvailable)
    );

    let stats = h.engine.stats(Lane::Default).await.unwrap();
    assert_eq!((stats.ready, stats.delayed, stats.retry), (0, 1, 1));
}

#[tokio::test]
async fn high_lane_is_reserved_before_low() {
    let h = create_harness();
    let low = h.engine.enqueue(job(Lane::Low)).await.unwrap();
    let default = h.engine.enqueue(job(Lane::Default)).await.unwrap();
    let high = h.engine.enqueue(job(Lane::High)).await.unwrap();

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap().id);
    }
    assert_eq!(order, vec![high.id, default.id, low.id]);
}

#[tokio::test]
async fn lane_is_fifo() {
    let h = create_harness();
    let mut enqueued = Vec::new();
    for _ in 0..4 {
        enqueued.push(h.engine.enqueue(job(Lane::Default)).await.unwrap().id);
    }

    let mut reserved = Vec::new();
    for _ in 0..4 {
        reserved.push(h.engine.reserve(Lane::Default.into(), Duration::ZERO).await.unwrap().id);
    }
    assert_eq!(reserved, enqueued);
}

#[tokio::test]
async fn ack_on_queued_job_is_rejected_without_mutation() {
    let h = create_harness();
    let queued = h.engine.enqueue(job(Lane::Default)).await.unwrap();

    let err = h.engine.ack(&queued).await.unwrap_err();
    assert_eq!(
        err,
        QueueError::NotInFlight {
            id: queued.id.clone(),
            status: JobStatus::Queued
        }
    );
    assert_eq!(h.engine.get(&queued.id).await.unwrap(), queued);
    assert_eq!(h.engine.stats(Lane::Default).await.unwrap().ready, 1);
}

#[tokio::test]
async fn retry_budget_exceeded_leaves_record_untouched() {
    let h = create_harness();
    h.engine.enqueue(job(Lane::High)).await.unwrap();
    let reserved = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();

    let err = h
        .engine
        .fail_with_retry(&reserved, h.clock.now(), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::RetryBudgetExceeded { retries: 0, max_retries: 0, .. }));
    assert_eq!(h.engine.get(&reserved.id).await.unwrap(), reserved);
    assert_eq!(h.engine.stats(Lane::High).await.unwrap().in_flight, 1);
}

#[tokio::test]
async fn fail_terminal_records_error() {
    let h = create_harness();
    h.engine.enqueue(job(Lane::Low)).await.unwrap();
    let reserved = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();

    let failed = h.engine.fail_terminal(&reserved, "bad address").await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.completed_at, Some(h.clock.now()));
    assert_eq!(h.engine.get(&reserved.id).await.unwrap(), failed);
    assert_eq!(h.engine.stats(Lane::Low).await.unwrap().in_flight, 0);
}

#[tokio::test]
async fn expired_lease_is_reclaimed_exactly_once() {
    let h = create_harness();
    h.engine
        .enqueue(job(Lane::Default).with_max_retries(1))
        .await
        .unwrap();
    let reserved = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    h.clock.advance(chrono::Duration::seconds(31));

    let (a, b) = tokio::join!(h.reaper.run_once(), h.reaper.run_once());
    assert_eq!(a.unwrap() + b.unwrap(), 1);

    let stored = h.engine.get(&reserved.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::RetryWait);
    assert_eq!(stored.retries, 1);
    assert_eq!(h.engine.stats(Lane::Default).await.unwrap().in_flight, 0);

    // Second expiry exhausts the budget.
    h.promoter.run_once().await.unwrap();
    h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    h.clock.advance(chrono::Duration::seconds(31));
    assert_eq!(h.reaper.run_once().await.unwrap(), 1);
    assert_eq!(
        h.engine.get(&reserved.id).await.unwrap().status,
        JobStatus::Dead
    );
}

#[tokio::test]
async fn huge_timeout_keeps_the_lease_instead_of_expiring_it() {
    let h = create_harness();
    let long = h
        .engine
        .enqueue(job(Lane::High).with_timeout_ms(u64::MAX))
        .await
        .unwrap();
    h.engine
        .enqueue(job(Lane::Low).with_timeout_ms(10_000_000_000_000_000))
        .await
        .unwrap();

    let first = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    let second = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    assert_eq!(first.id, long.id);

    h.clock.advance(chrono::Duration::days(1));
    assert_eq!(h.reaper.run_once().await.unwrap(), 0);
    assert_eq!(
        h.engine.get(&long.id).await.unwrap().status,
        JobStatus::Processing
    );

    h.clock.advance(chrono::Duration::days(7));
    assert_eq!(h.reaper.run_once().await.unwrap(), 2);
    assert_eq!(
        h.engine.get(&second.id).await.unwrap().status,
        JobStatus::Dead
    );
}

#[tokio::test]
async fn retried_job_succeeds_without_stale_error() {
    let h = create_harness();
    h.engine
        .enqueue(job(Lane::Default).with_max_retries(2))
        .await
        .unwrap();

    let first = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    let waiting = h
        .engine
        .fail_with_retry(&first, h.clock.now(), "transient")
        .await
        .unwrap();
    assert_eq!(waiting.error.as_deref(), Some("transient"));

    assert_eq!(h.promoter.run_once().await.unwrap(), 1);
    let queued = h.engine.get(&first.id).await.unwrap();
    assert_eq!(queued.status, JobStatus::Queued);
    assert_eq!(queued.error, None);

    let second = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    let done = h.engine.ack(&second).await.unwrap();
    assert_eq!(done.status, JobStatus::Success);
    assert_eq!(done.error, None);
    assert_eq!(h.engine.get(&first.id).await.unwrap().error, None);
}

#[tokio::test]
async fn stale_lease_holder_cannot_settle() {
    let h = create_harness();
    h.engine
        .enqueue(job(Lane::High).with_max_retries(2))
        .await
        .unwrap();
    let stale = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();

    h.clock.advance(chrono::Duration::seconds(31));
    h.reaper.run_once().await.unwrap();
    h.promoter.run_once().await.unwrap();
    let fresh = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    assert_eq!(fresh.id, stale.id);
    assert_ne!(fresh.started_at, stale.started_at);

    let err = h.engine.ack(&stale).await.unwrap_err();
    assert_eq!(
        err,
        QueueError::NotInFlight {
            id: stale.id.clone(),
            status: JobStatus::Processing
        }
    );
    assert_eq!(h.engine.ack(&fresh).await.unwrap().status, JobStatus::Success);
}

#[tokio::test]
async fn cancel_queued_and_processing() {
    let h = create_harness();
    let queued = h.engine.enqueue(job(Lane::Default)).await.unwrap();
    let cancelled = h.engine.cancel(&queued.id, Some(Lane::Default)).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(h.engine.stats(Lane::Default).await.unwrap().ready, 0);

    h.engine.enqueue(job(Lane::Default)).await.unwrap();
    let processing = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    let err = h.engine.cancel(&processing.id, None).await.unwrap_err();
    assert_eq!(
        err,
        QueueError::NotCancellable {
            id: processing.id.clone(),
            status: JobStatus::Processing
        }
    );

    let missing = h
        .engine
        .cancel(&"no-such-job".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(missing, QueueError::NotFound(_)));
}

#[tokio::test]
async fn retry_waiting_job_cannot_be_cancelled() {
    let h = create_harness();
    h.engine
        .enqueue(job(Lane::Low).with_max_retries(1))
        .await
        .unwrap();
    let reserved = h.engine.reserve(ReserveFrom::Any, Duration::ZERO).await.unwrap();
    h.engine
        .fail_with_retry(&reserved, h.clock.now(), "later")
        .await
        .unwrap();

    let err = h.engine.cancel(&reserved.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::NotCancellable {
            status: JobStatus::RetryWait,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_job_is_delivered_once_across_consumers() {
    let engine = Arc::new(QueueEngine::new(Arc::new(MemoryBackend::new())));
    let mut expected = HashSet::new();
    for n in 0..50u8 {
        let lane = Lane::all()[usize::from(n) % 3];
        expected.insert(engine.enqueue(JobRecord::new(lane, vec![b'0' + n % 10])).await.unwrap().id);
    }

    let consumers: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Ok(job) = engine.reserve(ReserveFrom::Any, Duration::ZERO).await {
                    seen.push(job.id);
                }
                seen
            })
        })
        .collect();

    let mut delivered = Vec::new();
    for consumer in consumers {
        delivered.extend(consumer.await.unwrap());
    }

    let unique: HashSet<_> = delivered.iter().cloned().collect();
    assert_eq!(delivered.len(), 50);
    assert_eq!(unique, expected);
}

#[tokio::test(start_paused = true)]
async fn blocking_reserve_times_out_no_earlier_than_block() {
    let engine = QueueEngine::new(Arc::new(MemoryBackend::new()));
    let started = tokio::time::Instant::now();

    let err = engine
        .reserve(ReserveFrom::Any, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(err, QueueError::NoJobAvailable);
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn blocking_reserve_wakes_on_enqueue() {
    let config = QueueConfig::new().with_poll_interval(Duration::from_secs(60));
    let engine = Arc::new(QueueEngine::new(Arc::new(MemoryBackend::new())).with_config(config));
    let started = tokio::time::Instant::now();

    let consumer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reserve(Lane::High.into(), Duration::from_secs(30)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let enqueued = engine.enqueue(job(Lane::High)).await.unwrap();

    let reserved = consumer.await.unwrap().unwrap();
    assert_eq!(reserved.id, enqueued.id);
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn unbounded_block_waits_until_a_job_arrives() {
    let config = QueueConfig::new().with_poll_interval(Duration::MAX);
    let engine = Arc::new(QueueEngine::new(Arc::new(MemoryBackend::new())).with_config(config));
    let ready = engine.enqueue(job(Lane::Default)).await.unwrap();

    let reserved = engine
        .reserve(ReserveFrom::Any, Duration::MAX)
        .await
        .unwrap();
    assert_eq!(reserved.id, ready.id);

    let consumer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reserve(ReserveFrom::Any, Duration::MAX).await })
    };
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(!consumer.is_finished());

    let late = engine.enqueue(job(Lane::Low)).await.unwrap();
    assert_eq!(consumer.await.unwrap().unwrap().id, late.id);
}

#[tokio::test]
async fn event_stream_reports_lifecycle() {
    let h = create_harness();
    let mut events = h.engine.event_stream();

    let queued = h.engine.enqueue(job(Lane::Default)).await.unwrap();
    h.engine.cancel(&queued.id, None).await.unwrap();

    let first = events.next().await.unwrap();
    let second = events.next().await.unwrap();
    assert!(matches!(first, JobEvent::Enqueued { queue: Lane::Default, .. }));
    assert!(matches!(second, JobEvent::Cancelled { ref job_id, .. } if *job_id == queued.id));
}
