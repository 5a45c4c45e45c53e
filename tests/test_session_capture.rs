//! Capture loop behaviour against a scripted reader.

mod common;

use std::time::Duration;

use common::{ScriptedSource, drain, page_files};
use paged_capture::core::page_store::PageStore;
use paged_capture::{CaptureError, CaptureEvent, CaptureMode, CaptureSession, SessionOptions, SessionStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn options(mode: CaptureMode) -> SessionOptions {
    SessionOptions {
        mode,
        start_index: 1,
        delay: Duration::from_millis(500),
        countdown: Duration::ZERO,
    }
}

#[tokio::test(start_paused = true)]
async fn fixed_count_captures_exactly_n_pages() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::distinct(10);

    let mut session = CaptureSession::new(options(CaptureMode::FixedCount(5)));
    let report = session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.last_index, 5);
    assert_eq!(report.removed, 0);
    assert_eq!(report.pages.len(), 5);
    assert_eq!(session.captured(), 5);
    assert_eq!(source.captures, 5);
    assert_eq!(source.advances, 5);
    assert_eq!(page_files(dir.path()), vec![1, 2, 3, 4, 5]);

    let percents: Vec<f32> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            CaptureEvent::Progress { percent, .. } => percent,
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![20.0, 40.0, 60.0, 80.0, 100.0]);
}

#[tokio::test(start_paused = true)]
async fn fixed_count_does_not_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    // every frame identical: fixed-count mode never stops early
    let mut source = ScriptedSource::new(vec![7]);

    let mut session = CaptureSession::new(options(CaptureMode::FixedCount(6)));
    let report = session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.last_index, 6);
    assert_eq!(page_files(dir.path()).len(), 6);
}

#[tokio::test(start_paused = true)]
async fn auto_mode_stops_after_three_repeats_and_drops_them() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    // pages 1-6 differ, then the reader is stuck on page 6
    let mut source = ScriptedSource::distinct(6);

    let mut session = CaptureSession::new(options(CaptureMode::Auto));
    let report = session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.last_index, 6);
    assert_eq!(report.removed, 3);
    assert_eq!(source.captures, 9);
    assert_eq!(source.advances, 8);
    assert_eq!(session.current_index(), 7);
    assert_eq!(page_files(dir.path()), vec![1, 2, 3, 4, 5, 6]);

    let indexes: Vec<u32> = report.pages.iter().map(|page| page.index()).collect();
    assert_eq!(indexes, vec![1, 2, 3, 4, 5, 6]);

    let events = drain(&mut rx);
    assert!(events.contains(&CaptureEvent::EndDetected {
        last_page: 6,
        removed: 3
    }));
    assert!(events.contains(&CaptureEvent::Finished {
        status: SessionStatus::Completed,
        last_index: 6
    }));
    assert!(events.iter().any(|event| matches!(
        event,
        CaptureEvent::Progress {
            total: None,
            percent: None,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn auto_mode_ignores_short_repeat_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut source =
        ScriptedSource::new(vec![10, 20, 20, 30, 30, 40, 50]).cancelling_after(6, cancel.clone());

    let mut session = CaptureSession::new(options(CaptureMode::Auto));
    let report = session.run(&mut source, &store, &tx, &cancel).await.unwrap();

    assert_eq!(report.status, SessionStatus::Cancelled);
    assert_eq!(report.removed, 0);
    assert_eq!(report.last_index, 6);
    assert_eq!(page_files(dir.path()), vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test(start_paused = true)]
async fn cancel_keeps_pages_and_reports_resume_point() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut source = ScriptedSource::distinct(20).cancelling_after(3, cancel.clone());

    let mut session = CaptureSession::new(options(CaptureMode::Auto));
    let report = session.run(&mut source, &store, &tx, &cancel).await.unwrap();

    assert_eq!(report.status, SessionStatus::Cancelled);
    assert_eq!(session.status(), SessionStatus::Cancelled);
    assert_eq!(report.last_index, 3);
    assert_eq!(report.resume_from(), 4);
    assert_eq!(source.captures, 3);
    assert_eq!(page_files(dir.path()), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_countdown_captures_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut source = ScriptedSource::distinct(5);

    let mut session = CaptureSession::new(SessionOptions {
        countdown: Duration::from_secs(3),
        ..options(CaptureMode::FixedCount(5))
    });
    let report = session.run(&mut source, &store, &tx, &cancel).await.unwrap();

    assert_eq!(report.status, SessionStatus::Cancelled);
    assert_eq!(report.last_index, 0);
    assert_eq!(source.captures, 0);
    assert!(page_files(dir.path()).is_empty());

    let events = drain(&mut rx);
    assert!(events.contains(&CaptureEvent::Countdown { remaining_secs: 3 }));
    assert!(!events.contains(&CaptureEvent::Countdown { remaining_secs: 2 }));
}

#[tokio::test(start_paused = true)]
async fn countdown_ticks_every_second() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::distinct(2);

    let mut session = CaptureSession::new(SessionOptions {
        countdown: Duration::from_secs(3),
        ..options(CaptureMode::FixedCount(1))
    });
    session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap();

    let ticks: Vec<u64> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            CaptureEvent::Countdown { remaining_secs } => Some(remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![3, 2, 1]);
}

#[tokio::test(start_paused = true)]
async fn capture_failure_keeps_earlier_pages() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::distinct(10).failing_capture_at(4);

    let mut session = CaptureSession::new(options(CaptureMode::FixedCount(10)));
    let error = session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, CaptureError::CaptureFailure { last_index: 3, .. }));
    assert_eq!(error.resume_index(), Some(4));
    assert_eq!(session.status(), SessionStatus::Failed);
    assert_eq!(page_files(dir.path()), vec![1, 2, 3]);
    assert!(drain(&mut rx).contains(&CaptureEvent::Finished {
        status: SessionStatus::Failed,
        last_index: 3
    }));
}

#[tokio::test(start_paused = true)]
async fn advance_failure_reports_the_stored_page() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::distinct(10).failing_advance_at(2);

    let mut session = CaptureSession::new(options(CaptureMode::Auto));
    let error = session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, CaptureError::AdvanceFailure { last_index: 2, .. }));
    assert_eq!(page_files(dir.path()), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn missing_window_fails_before_capturing() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::distinct(3).without_window();

    let mut session = CaptureSession::new(options(CaptureMode::Auto));
    let error = session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, CaptureError::SourceUnavailable { .. }));
    assert_eq!(error.resume_index(), None);
    assert_eq!(source.captures, 0);
    assert!(page_files(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn resumed_session_numbers_from_start_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = PageStore::open(dir.path()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::distinct(10);

    let mut session = CaptureSession::new(SessionOptions {
        start_index: 4,
        ..options(CaptureMode::FixedCount(6))
    });
    let report = session
        .run(&mut source, &store, &tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.start_index, 4);
    assert_eq!(report.last_index, 6);
    assert_eq!(session.captured(), 3);
    assert_eq!(page_files(dir.path()), vec![4, 5, 6]);
}
