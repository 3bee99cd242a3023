mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rollcall_authority::Authority;
use rollcall_monitor::{
    MonitorConfig, MonitorError, PresenterEvent, PresenterView,
};
use rollcall_protocol::{CheckInStatus, SessionStatus};

use common::{advance, authority, check_in_with, params, settle, Flaky};

async fn open(authority: &Arc<Flaky>, minutes: u32) -> PresenterView<Flaky> {
    let config = MonitorConfig::default();
    PresenterView::open(authority.clone(), params(minutes), &config)
        .await
        .unwrap()
}

fn drain(view: &mut PresenterView<Flaky>) -> Vec<PresenterEvent> {
    let mut out = Vec::new();
    while let Some(event) = view.try_next_event() {
        out.push(event);
    }
    out
}

fn closed_events(events: &[PresenterEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PresenterEvent::Closed(_)))
        .count()
}

// =========================================================================
// open() / attach()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_open_shows_token_and_rotates() {
    let authority = authority().await;
    let mut view = open(&authority, 50).await;

    let first = view.token().unwrap();
    assert_eq!(view.snapshot().borrow().session.status, SessionStatus::Active);
    assert_eq!(view.live_count(), 0);
    // Presenter snapshots are redacted like every other read; the token
    // lives in the rotation display.
    assert!(view.snapshot().borrow().session.current_token.is_none());

    advance(Duration::from_millis(15_500)).await;

    let events = drain(&mut view);
    let second = view.token().unwrap();
    assert_ne!(first, second);
    assert!(events.contains(&PresenterEvent::Rotated(second)));
}

#[tokio::test(start_paused = true)]
async fn test_attach_resumes_with_fresh_token() {
    let authority = authority().await;
    let start = authority.create(params(50)).await.unwrap();

    let view = PresenterView::attach(
        authority.clone(),
        start.session.id,
        &MonitorConfig::default(),
    )
    .await
    .unwrap();

    let token = view.token().unwrap();
    assert_ne!(token, start.token);
    let verdict =
        check_in_with(&authority, start.session.id, &token.value).await;
    assert_eq!(verdict.status, CheckInStatus::Present);
}

#[tokio::test(start_paused = true)]
async fn test_attach_to_closed_session_fails() {
    let authority = authority().await;
    let start = authority.create(params(50)).await.unwrap();
    authority.close(start.session.id).await.unwrap();

    let err = PresenterView::attach(
        authority.clone(),
        start.session.id,
        &MonitorConfig::default(),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(
        err,
        MonitorError::AlreadyClosed(id) if id == start.session.id
    ));
    assert_eq!(authority.rotations(), 0);
}

// =========================================================================
// Live count
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_live_count_follows_check_ins() {
    let authority = authority().await;
    let mut view = open(&authority, 50).await;
    let token = view.token().unwrap();
    check_in_with(&authority, view.session_id(), &token.value).await;

    advance(Duration::from_millis(10_500)).await;

    assert_eq!(view.live_count(), 1);
    let events = drain(&mut view);
    assert_eq!(events.len(), 1);
    let PresenterEvent::CountChanged(counts) = &events[0] else {
        panic!("expected a count change, got {events:?}");
    };
    assert_eq!(counts.present, 1);

    let roster = view.roster().await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].subject_id, common::SUBJECT);

    // No change, no event.
    advance(Duration::from_secs(10)).await;
    assert!(
        !drain(&mut view)
            .iter()
            .any(|e| matches!(e, PresenterEvent::CountChanged(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_reported_and_count_kept() {
    let authority = authority().await;
    let mut view = open(&authority, 50).await;
    authority.fail_reads.store(true, Ordering::SeqCst);

    advance(Duration::from_millis(10_500)).await;

    let events = drain(&mut view);
    assert!(matches!(
        events.as_slice(),
        [PresenterEvent::PollFailed(e)] if e.is_network()
    ));
    assert_eq!(view.live_count(), 0);
    assert!(!view.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_rotation_failing_surfaces_as_event() {
    let authority = authority().await;
    authority.fail_rotations.store(3, Ordering::SeqCst);
    let mut view = open(&authority, 50).await;
    let first = view.token();

    advance(Duration::from_millis(45_500)).await;

    let events = drain(&mut view);
    assert!(events.iter().any(|e| matches!(
        e,
        PresenterEvent::RotationFailing {
            consecutive_failures: 3,
            ..
        }
    )));
    assert_eq!(view.token(), first);
}

// =========================================================================
// Closure
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_close_reports_once_and_stops_rotation() {
    let authority = authority().await;
    let mut view = open(&authority, 50).await;

    let closed = view.close().await.unwrap();
    let again = view.close().await.unwrap();
    assert_eq!(closed, again);
    assert_eq!(closed.status, SessionStatus::Closed);

    settle().await;
    assert!(view.is_closed());
    assert_eq!(view.token(), None);
    assert_eq!(view.snapshot().borrow().session.status, SessionStatus::Closed);

    advance(Duration::from_secs(60)).await;
    let events = drain(&mut view);
    assert_eq!(closed_events(&events), 1);
    assert_eq!(authority.rotations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_detected_and_reported_once() {
    let authority = authority().await;
    let mut view = open(&authority, 1).await;

    advance(Duration::from_secs(90)).await;

    let events = drain(&mut view);
    assert_eq!(closed_events(&events), 1);
    assert!(view.is_closed());
    assert_eq!(view.token(), None);

    // Rotation halted within one cadence of the closure being seen.
    let calls = authority.rotations();
    assert!(calls <= 5, "rotated {calls} times");
    advance(Duration::from_secs(60)).await;
    assert_eq!(authority.rotations(), calls);

    // A late explicit close is fine and still reports nothing new.
    view.close().await.unwrap();
    assert_eq!(closed_events(&drain(&mut view)), 0);
}
