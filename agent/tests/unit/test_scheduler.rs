//! Scheduler selection, retry and ledger tests

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;

use fleetagent::queue::scheduler::{SchedulerOptions, TaskScheduler, DEFAULT_SUCCESS_MESSAGE};
use fleetagent::queue::window::WorkWindow;
use openapi_client::models::{Command, InstalledApp, STATUS_FAILED, STATUS_SUCCESS};

use crate::support::{at, ConstJitter, FixedClock, NoJitter, RecordingExecutor, RecordingReporter};

fn command(task_id: i64, priority: i32) -> Command {
    Command {
        task_id,
        priority,
        app_id: task_id * 10,
        app_name: format!("app-{}", task_id),
        ..Default::default()
    }
}

fn scheduler(options: SchedulerOptions, clock: Arc<FixedClock>) -> TaskScheduler {
    TaskScheduler::new(options)
        .with_clock(clock)
        .with_jitter(Arc::new(NoJitter))
}

#[test]
fn test_add_commands_dedups_and_skips_zero_id() {
    let scheduler = TaskScheduler::new(SchedulerOptions::default());

    scheduler.add_commands(&[command(7, 1), command(0, 1)]);
    scheduler.add_commands(&[command(7, 3)]);

    assert_eq!(scheduler.pending_count(), 1);
}

#[tokio::test]
async fn test_priority_then_task_id_order() {
    let clock = FixedClock::new(at(10, 0));
    let scheduler = scheduler(SchedulerOptions::default(), clock);
    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();

    scheduler.add_commands(&[command(5, 2), command(2, 1), command(9, 1)]);
    while scheduler
        .process_one(at(10, 0), &executor, &reporter, &cancel)
        .await
    {}

    assert_eq!(executor.executed(), vec![2, 9, 5]);
    assert_eq!(scheduler.pending_count(), 0);
}

#[tokio::test]
async fn test_work_hours_gate_non_forced_tasks() {
    let clock = FixedClock::new(at(22, 0));
    let scheduler = scheduler(
        SchedulerOptions {
            work_hours: WorkWindow::parse("09:00", "18:00"),
            ..Default::default()
        },
        clock,
    );
    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();

    scheduler.add_commands(&[command(1, 1)]);
    assert!(!scheduler.process_one(at(22, 0), &executor, &reporter, &cancel).await);
    assert_eq!(scheduler.pending_count(), 1);

    let forced = Command {
        force_update: true,
        ..command(2, 5)
    };
    scheduler.add_commands(&[forced]);
    assert!(scheduler.process_one(at(22, 0), &executor, &reporter, &cancel).await);
    assert_eq!(executor.executed(), vec![2]);

    assert!(scheduler.process_one(at(10, 0), &executor, &reporter, &cancel).await);
    assert_eq!(executor.executed(), vec![2, 1]);
}

#[tokio::test]
async fn test_retry_backoff_then_drop() {
    let clock = FixedClock::new(at(10, 0));
    let scheduler = scheduler(
        SchedulerOptions {
            max_retries: 2,
            ..Default::default()
        },
        clock.clone(),
    );
    let executor = RecordingExecutor::failing();
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();

    scheduler.add_commands(&[command(3, 1)]);

    // first failure: stays queued, backs off 5 minutes
    assert!(scheduler.process_one(at(10, 0), &executor, &reporter, &cancel).await);
    assert_eq!(scheduler.pending_count(), 1);

    clock.set(at(10, 0) + ChronoDuration::minutes(4));
    assert!(!scheduler.process_one(at(10, 4), &executor, &reporter, &cancel).await);

    // second failure exhausts the budget
    clock.set(at(10, 0) + ChronoDuration::minutes(5));
    assert!(scheduler.process_one(at(10, 5), &executor, &reporter, &cancel).await);
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(executor.executed(), vec![3, 3]);

    let reports = reporter.reports();
    assert_eq!(reports.len(), 2);
    for (task_id, status) in reports {
        assert_eq!(task_id, 3);
        assert_eq!(status.status, STATUS_FAILED);
        assert_eq!(status.progress, 0);
        assert_eq!(status.exit_code, -1);
        assert_eq!(status.message, "download failed: connection reset");
        assert_eq!(status.error.as_deref(), Some("download failed: connection reset"));
    }
}

#[tokio::test]
async fn test_success_updates_ledger_once() {
    let clock = FixedClock::new(at(10, 0));
    let scheduler = scheduler(SchedulerOptions::default(), clock);
    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();

    scheduler.add_commands(&[Command {
        task_id: 11,
        app_id: 5,
        app_version: "1.2.3".to_string(),
        ..Default::default()
    }]);
    assert!(scheduler.process_one(at(10, 0), &executor, &reporter, &cancel).await);

    assert_eq!(
        scheduler.consume_apps_changed(),
        (
            true,
            vec![InstalledApp {
                app_id: 5,
                version: "1.2.3".to_string()
            }]
        )
    );
    assert_eq!(scheduler.consume_apps_changed(), (false, vec![]));

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    let (_, status) = &reports[0];
    assert_eq!(status.status, STATUS_SUCCESS);
    assert_eq!(status.progress, 100);
    assert_eq!(status.message, DEFAULT_SUCCESS_MESSAGE);
    assert_eq!(status.installed_version, "1.2.3");
    assert!(status.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_jitter_keeps_task_queued() {
    let clock = FixedClock::new(at(10, 0));
    let scheduler = TaskScheduler::new(SchedulerOptions::default())
        .with_clock(clock)
        .with_jitter(Arc::new(ConstJitter(Duration::from_secs(120))));
    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();

    scheduler.add_commands(&[command(4, 1)]);

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        canceller.cancel();
    });

    assert!(!scheduler.process_one(at(10, 0), &executor, &reporter, &cancel).await);
    assert!(executor.executed().is_empty());
    assert!(reporter.reports().is_empty());
    assert_eq!(scheduler.pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_forced_task_skips_jitter() {
    let clock = FixedClock::new(at(10, 0));
    let scheduler = TaskScheduler::new(SchedulerOptions::default())
        .with_clock(clock)
        .with_jitter(Arc::new(ConstJitter(Duration::from_secs(300))));
    let executor = RecordingExecutor::default();
    let reporter = RecordingReporter::default();
    let cancel = CancellationToken::new();

    scheduler.add_commands(&[Command {
        force_update: true,
        ..command(6, 1)
    }]);

    let started = tokio::time::Instant::now();
    assert!(scheduler.process_one(at(10, 0), &executor, &reporter, &cancel).await);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(executor.executed(), vec![6]);
}
