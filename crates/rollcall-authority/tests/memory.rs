//! Integration tests for `InMemoryAuthority` through the `Authority` trait.

use std::sync::Arc;
use std::time::Duration;

use rollcall_authority::{
    AdjudicationPolicy, Authority, AuthorityError, InMemoryAuthority,
    ManualClock,
};
use rollcall_protocol::{
    CheckInStatus, Coordinates, CreateSession, Evidence, LocationReading,
    RejectReason, SectionId, SessionStatus, SubjectId, Timestamp,
};

const SECTION: SectionId = SectionId(5);

fn anchor() -> Coordinates {
    Coordinates::new(41.0082, 28.9784).unwrap()
}

fn params(duration_minutes: u32) -> CreateSession {
    CreateSession {
        section_id: SECTION,
        duration_minutes,
        geofence_radius_m: 15.0,
        anchor: anchor(),
    }
}

async fn authority() -> (Arc<InMemoryAuthority<ManualClock>>, ManualClock) {
    let clock = ManualClock::starting_at(Timestamp(1_000_000));
    let authority = Arc::new(InMemoryAuthority::with_clock(
        AdjudicationPolicy::default(),
        clock.clone(),
    ));
    for id in 1..=20 {
        authority.enroll(SECTION, SubjectId(id)).await;
    }
    (authority, clock)
}

#[tokio::test]
async fn test_token_issued_at_t_refused_once_successor_exists() {
    let (authority, clock) = authority().await;
    let start = authority.create(params(30)).await.unwrap();
    let id = start.session.id;

    clock.advance(Duration::from_secs(15));
    let t2 = authority.regenerate_token(id).await.unwrap();

    let evidence = Evidence::Token {
        value: start.token.value,
    };
    let stale = authority
        .check_in(id, SubjectId(1), evidence)
        .await
        .unwrap();
    assert_eq!(stale.status, CheckInStatus::Rejected);
    assert_eq!(stale.rejection, Some(RejectReason::StaleToken));

    let fresh = authority
        .check_in(id, SubjectId(1), Evidence::Token { value: t2.value })
        .await
        .unwrap();
    assert_eq!(fresh.status, CheckInStatus::Present);
}

#[tokio::test]
async fn test_concurrent_duplicate_submissions_leave_one_record() {
    let (authority, clock) = authority().await;
    let start = authority.create(params(30)).await.unwrap();
    let id = start.session.id;
    let reading = LocationReading {
        coords: anchor(),
        accuracy_m: 5.0,
        captured_at: clock_now(&clock),
    };

    let mut handles = Vec::new();
    for _ in 0..8 {
        let authority = Arc::clone(&authority);
        handles.push(tokio::spawn(async move {
            authority
                .check_in(id, SubjectId(3), Evidence::Location { reading })
                .await
        }));
    }

    let mut fresh = 0;
    for handle in handles {
        let verdict = handle.await.unwrap().unwrap();
        assert_eq!(verdict.status, CheckInStatus::Present);
        if !verdict.duplicate {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1, "exactly one submission should be adjudicated");
    assert_eq!(authority.records(id).await.unwrap().len(), 1);
    assert_eq!(authority.get(id).await.unwrap().counts.present, 1);
}

#[tokio::test]
async fn test_session_closes_after_duration_and_refuses_rotation() {
    let (authority, clock) = authority().await;
    let start = authority.create(params(1)).await.unwrap();
    let id = start.session.id;

    clock.advance(Duration::from_secs(60));

    let overview = authority.get(id).await.unwrap();
    assert_eq!(overview.session.status, SessionStatus::Closed);
    assert_eq!(
        authority.regenerate_token(id).await,
        Err(AuthorityError::Closed(id))
    );
}

#[tokio::test]
async fn test_sweep_expired_reports_each_session_once() {
    let (authority, clock) = authority().await;
    let short = authority.create(params(1)).await.unwrap();
    authority.create(params(90)).await.unwrap();

    clock.advance(Duration::from_secs(61));

    assert_eq!(authority.sweep_expired().await, vec![short.session.id]);
    assert!(authority.sweep_expired().await.is_empty());
}

#[tokio::test]
async fn test_close_twice_returns_same_session() {
    let (authority, _clock) = authority().await;
    let start = authority.create(params(30)).await.unwrap();

    let first = authority.close(start.session.id).await.unwrap();
    let second = authority.close(start.session.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.status, SessionStatus::Closed);
}

#[tokio::test]
async fn test_list_active_for_subject_never_exposes_token() {
    let (authority, _clock) = authority().await;
    let start = authority.create(params(30)).await.unwrap();

    let entries = authority
        .list_active_for_subject(SubjectId(4))
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    let json = serde_json::to_string(&entries).unwrap();
    assert!(!json.contains(&start.token.value));
}

#[tokio::test]
async fn test_record_for_unknown_session_is_not_found() {
    let (authority, _clock) = authority().await;
    let result = authority
        .record_for(rollcall_protocol::SessionId(404), SubjectId(1))
        .await;
    assert!(matches!(result, Err(AuthorityError::NotFound(_))));
}

fn clock_now(clock: &ManualClock) -> Timestamp {
    use rollcall_authority::Clock;
    clock.now()
}
