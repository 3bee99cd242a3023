mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rollcall_authority::Authority;
use rollcall_monitor::{
    Affordance, MonitorConfig, SubjectEvent, SubjectView,
};
use rollcall_protocol::{CheckInStatus, Evidence, SessionStatus};

use common::{
    advance, authority, check_in_with, params, settle, Flaky, SUBJECT,
};

fn spawn(authority: &Arc<Flaky>) -> SubjectView<Flaky> {
    SubjectView::spawn(authority.clone(), SUBJECT, &MonitorConfig::default())
}

fn drain(view: &mut SubjectView<Flaky>) -> Vec<SubjectEvent> {
    let mut out = Vec::new();
    while let Some(event) = view.try_next_event() {
        out.push(event);
    }
    out
}

// =========================================================================
// Discovery
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_discovers_open_session_with_check_in_affordance() {
    let authority = authority().await;
    let start = authority.create(params(50)).await.unwrap();

    let mut view = spawn(&authority);
    settle().await;

    let card = view.card(start.session.id).unwrap();
    assert_eq!(card.affordance, Affordance::CheckIn);
    assert!(card.affordance.can_check_in());
    assert!(card.session.current_token.is_none());

    let events = drain(&mut view);
    assert!(matches!(
        events.as_slice(),
        [SubjectEvent::Discovered(c)] if *c == card
    ));
}

#[tokio::test(start_paused = true)]
async fn test_new_session_found_on_next_poll() {
    let authority = authority().await;
    let mut view = spawn(&authority);
    settle().await;
    assert!(view.cards().borrow().is_empty());

    let start = authority.create(params(50)).await.unwrap();
    advance(Duration::from_secs(29)).await;
    assert!(view.card(start.session.id).is_none());

    advance(Duration::from_secs(2)).await;
    assert!(view.card(start.session.id).is_some());
    assert_eq!(drain(&mut view).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_now_shows_recorded_status() {
    let authority = authority().await;
    let start = authority.create(params(50)).await.unwrap();
    let view = spawn(&authority);
    settle().await;

    check_in_with(&authority, start.session.id, &start.token.value).await;
    view.refresh_now();
    settle().await;

    let card = view.card(start.session.id).unwrap();
    assert_eq!(card.affordance, Affordance::Recorded(CheckInStatus::Present));
    assert!(!card.affordance.can_check_in());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_attempt_keeps_check_in_affordance() {
    let authority = authority().await;
    let start = authority.create(params(50)).await.unwrap();
    let view = spawn(&authority);

    let verdict = authority
        .check_in(
            start.session.id,
            SUBJECT,
            Evidence::Token {
                value: "not-a-token".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(verdict.status, CheckInStatus::Rejected);

    view.refresh_now();
    settle().await;

    let card = view.card(start.session.id).unwrap();
    assert_eq!(card.affordance, Affordance::CheckIn);
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_reported_and_cards_kept() {
    let authority = authority().await;
    let start = authority.create(params(50)).await.unwrap();
    let mut view = spawn(&authority);
    settle().await;
    drain(&mut view);

    authority.fail_reads.store(true, Ordering::SeqCst);
    view.refresh_now();
    settle().await;

    let events = drain(&mut view);
    assert!(matches!(
        events.as_slice(),
        [SubjectEvent::LoadFailed(e)] if e.is_network()
    ));
    assert!(view.card(start.session.id).is_some());
}

// =========================================================================
// Closure
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_closure_replaces_affordance_with_final_status() {
    let authority = authority().await;
    let start = authority.create(params(50)).await.unwrap();
    let mut view = spawn(&authority);
    settle().await;
    check_in_with(&authority, start.session.id, &start.token.value).await;
    drain(&mut view);

    authority.close(start.session.id).await.unwrap();
    // One closure period plus its jitter.
    advance(Duration::from_secs(12)).await;

    let card = view.card(start.session.id).unwrap();
    assert_eq!(
        card.affordance,
        Affordance::Closed {
            final_status: Some(CheckInStatus::Present)
        }
    );
    assert_eq!(card.session.status, SessionStatus::Closed);
    assert_eq!(
        drain(&mut view),
        vec![SubjectEvent::Closed {
            session_id: start.session.id,
            final_status: Some(CheckInStatus::Present),
        }]
    );

    // Terminal: later polls neither reopen nor re-report it.
    view.refresh_now();
    advance(Duration::from_secs(60)).await;
    assert!(view.card(start.session.id).unwrap().affordance.is_closed());
    assert!(drain(&mut view).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_without_record_closes_empty() {
    let authority = authority().await;
    let start = authority.create(params(1)).await.unwrap();
    let mut view = spawn(&authority);
    settle().await;
    drain(&mut view);

    advance(Duration::from_secs(75)).await;

    assert_eq!(
        view.card(start.session.id).unwrap().affordance,
        Affordance::Closed { final_status: None }
    );
    let closed = drain(&mut view)
        .into_iter()
        .filter(|e| matches!(e, SubjectEvent::Closed { .. }))
        .count();
    assert_eq!(closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_view_stops_polling() {
    let authority = authority().await;
    let view = spawn(&authority);
    settle().await;
    let calls = authority.lists();
    assert_eq!(calls, 1);

    drop(view);
    advance(Duration::from_secs(120)).await;

    assert_eq!(authority.lists(), calls);
}
