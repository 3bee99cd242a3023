//! Integration tests for the hosted authority: server, handler and
//! `RemoteAuthority` over real loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rollcall::authority::Clock;
use rollcall::prelude::*;
use rollcall::protocol::{Evidence, LocationReading, RejectReason};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

const SECTION: SectionId = SectionId(5);
const SUBJECT: SubjectId = SubjectId(77);

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn params() -> CreateSession {
    CreateSession {
        section_id: SECTION,
        duration_minutes: 50,
        geofence_radius_m: 15.0,
        anchor: Coordinates {
            lat: 41.0082,
            lon: 28.9784,
        },
    }
}

async fn start_server_at(
    addr: &str,
    idle_timeout: Duration,
) -> (String, Arc<InMemoryAuthority>) {
    let authority =
        Arc::new(InMemoryAuthority::new(AdjudicationPolicy::default()));
    authority.enroll(SECTION, SUBJECT).await;

    let server = AuthorityServer::builder()
        .bind(addr)
        .idle_timeout(idle_timeout)
        .build(authority.clone())
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("should have local addr").to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, authority)
}

async fn start_server() -> (String, Arc<InMemoryAuthority>) {
    start_server_at("127.0.0.1:0", Duration::from_secs(30)).await
}

async fn connect_raw(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn recv_json(ws: &mut ClientWs) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("should answer in time")
        .expect("stream open")
        .expect("valid frame");
    serde_json::from_slice(&msg.into_data()).expect("json answer")
}

// =========================================================================
// RemoteAuthority round trips
// =========================================================================

#[tokio::test]
async fn test_remote_full_session_lifecycle() {
    let (addr, _authority) = start_server().await;
    let remote = RemoteAuthority::new(format!("ws://{addr}"));

    let start = remote.create(params()).await.unwrap();
    assert_eq!(start.token.value.len(), 32);
    assert!(start.session.current_token.is_none());

    let verdict = remote
        .check_in(
            start.session.id,
            SUBJECT,
            Evidence::Token {
                value: start.token.value.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(verdict.status, CheckInStatus::Present);

    let overview = remote.get(start.session.id).await.unwrap();
    assert_eq!(overview.counts.checked_in(), 1);

    let record = remote.record_for(start.session.id, SUBJECT).await.unwrap();
    assert_eq!(record.map(|r| r.status), Some(CheckInStatus::Present));

    let closed = remote.close(start.session.id).await.unwrap();
    assert!(closed.status.is_closed());

    let err = remote.regenerate_token(start.session.id).await.unwrap_err();
    assert_eq!(err, AuthorityError::Closed(start.session.id));
}

#[tokio::test]
async fn test_remote_stale_token_rejected_over_the_wire() {
    let (addr, _authority) = start_server().await;
    let remote = RemoteAuthority::new(format!("ws://{addr}"));

    let start = remote.create(params()).await.unwrap();
    remote.regenerate_token(start.session.id).await.unwrap();

    let verdict = remote
        .check_in(
            start.session.id,
            SUBJECT,
            Evidence::Token {
                value: start.token.value,
            },
        )
        .await
        .unwrap();

    assert_eq!(verdict.status, CheckInStatus::Rejected);
    assert_eq!(verdict.rejection, Some(RejectReason::StaleToken));
}

#[tokio::test]
async fn test_remote_errors_keep_their_class() {
    let (addr, _authority) = start_server().await;
    let remote = RemoteAuthority::new(format!("ws://{addr}"));

    let err = remote.get(SessionId(404)).await.unwrap_err();
    assert_eq!(err, AuthorityError::NotFound(SessionId(404)));

    let start = remote.create(params()).await.unwrap();
    let err = remote
        .check_in(
            start.session.id,
            SubjectId(1),
            Evidence::Token {
                value: start.token.value,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, AuthorityError::NotEnrolled(start.session.id));
}

#[tokio::test]
async fn test_remote_unreachable_is_network_error() {
    let remote = RemoteAuthority::new("ws://127.0.0.1:1");

    let err = remote.get(SessionId(1)).await.unwrap_err();

    assert!(err.is_network(), "got {err:?}");
}

#[tokio::test]
async fn test_remote_reconnects_after_failure() {
    // Reserve a port, release it, and fail against it first.
    let spare = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = spare.local_addr().unwrap().to_string();
    drop(spare);

    let remote = RemoteAuthority::new(format!("ws://{addr}"));
    assert!(remote.get(SessionId(1)).await.unwrap_err().is_network());

    start_server_at(&addr, Duration::from_secs(30)).await;

    let start = remote.create(params()).await.unwrap();
    assert_eq!(start.session.section_id, SECTION);
}

#[tokio::test]
async fn test_remote_first_call_after_idle_close_redials() {
    let (addr, _authority) =
        start_server_at("127.0.0.1:0", Duration::from_secs(1)).await;
    let remote = RemoteAuthority::new(format!("ws://{addr}"));
    let start = remote.create(params()).await.unwrap();

    // Let the server close the pooled connection.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let overview = remote.get(start.session.id).await;
    assert!(overview.is_ok(), "got {overview:?}");
    assert_eq!(overview.unwrap().session.id, start.session.id);
}

#[tokio::test]
async fn test_remote_undecodable_request_is_invalid_not_timeout() {
    let (addr, authority) = start_server().await;
    let remote = RemoteAuthority::new(format!("ws://{addr}"))
        .with_call_timeout(Duration::from_secs(5));
    let start = remote.create(params()).await.unwrap();

    // JSON has no NaN; the server cannot decode this frame.
    let reading = LocationReading {
        coords: Coordinates {
            lat: f64::NAN,
            lon: 28.9784,
        },
        accuracy_m: 5.0,
        captured_at: authority.clock().now(),
    };
    let began = tokio::time::Instant::now();
    let err = remote
        .check_in(start.session.id, SUBJECT, Evidence::Location { reading })
        .await
        .unwrap_err();

    assert!(matches!(err, AuthorityError::InvalidRequest(_)), "got {err:?}");
    assert!(!err.is_network());
    assert!(began.elapsed() < Duration::from_secs(2));

    // The connection is still usable.
    assert!(remote.get(start.session.id).await.is_ok());
}

#[tokio::test]
async fn test_remote_nan_accuracy_checks_in_like_in_process() {
    let (addr, authority) = start_server().await;
    let remote = RemoteAuthority::new(format!("ws://{addr}"))
        .with_call_timeout(Duration::from_secs(5));
    let start = remote.create(params()).await.unwrap();

    let reading = LocationReading {
        coords: params().anchor,
        accuracy_m: f64::NAN,
        captured_at: authority.clock().now(),
    };
    let verdict = remote
        .check_in(start.session.id, SUBJECT, Evidence::Location { reading })
        .await
        .unwrap();

    assert_eq!(verdict.status, CheckInStatus::Present);
}

// =========================================================================
// Raw wire behaviour
// =========================================================================

#[tokio::test]
async fn test_malformed_request_answers_error_and_keeps_connection() {
    let (addr, _authority) = start_server().await;
    let mut ws = connect_raw(&addr).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let answer = recv_json(&mut ws).await;
    assert_eq!(answer["type"], "error");
    assert_eq!(answer["data"]["code"], "invalid_request");

    ws.send(Message::Text(r#"{"id":9,"op":"get","session_id":1}"#.into()))
        .await
        .unwrap();
    let answer = recv_json(&mut ws).await;
    assert_eq!(answer["id"], 9);
    assert_eq!(answer["data"]["code"], "not_found");
}

#[tokio::test]
async fn test_list_for_presenter_over_raw_socket() {
    let (addr, authority) = start_server().await;
    authority.create(params()).await.unwrap();
    let mut ws = connect_raw(&addr).await;

    ws.send(Message::Text(
        r#"{"id":1,"op":"list_for_presenter","status":"active"}"#.into(),
    ))
    .await
    .unwrap();

    let answer = recv_json(&mut ws).await;
    assert_eq!(answer["type"], "sessions");
    assert_eq!(answer["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(answer["data"][0]["status"], "active");
}

#[tokio::test]
async fn test_idle_connection_closed_by_server() {
    let (addr, _authority) =
        start_server_at("127.0.0.1:0", Duration::from_secs(1)).await;
    let mut ws = connect_raw(&addr).await;

    let next = tokio::time::timeout(Duration::from_secs(3), ws.next())
        .await
        .expect("server should close the idle connection");

    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

// =========================================================================
// Views over the wire
// =========================================================================

#[tokio::test]
async fn test_presenter_and_subject_views_over_remote() {
    let (addr, _authority) = start_server().await;
    let url = format!("ws://{addr}");
    let presenter_side = Arc::new(RemoteAuthority::new(url.clone()));
    let subject_side = Arc::new(RemoteAuthority::new(url));

    let config = MonitorConfig::default();
    let presenter = PresenterView::open(presenter_side, params(), &config)
        .await
        .unwrap();
    let session_id = presenter.session_id();
    let token = presenter.token().unwrap();

    let mut subject =
        SubjectView::spawn(subject_side.clone(), SUBJECT, &config);
    let event =
        tokio::time::timeout(Duration::from_secs(2), subject.next_event())
            .await
            .expect("discovery should run at once");
    assert!(matches!(
        event,
        Some(SubjectEvent::Discovered(card)) if card.session.id == session_id
    ));

    let verdict = subject_side
        .check_in(session_id, SUBJECT, Evidence::Token { value: token.value })
        .await
        .unwrap();
    assert_eq!(verdict.status, CheckInStatus::Present);

    let closed = presenter.close().await.unwrap();
    assert!(closed.status.is_closed());
    assert!(presenter.is_closed());
    assert_eq!(presenter.token(), None);
}
