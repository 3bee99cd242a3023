use std::sync::Arc;

use rollcall::geo::EARTH_RADIUS_M;
use rollcall::prelude::*;
use rollcall::protocol::CheckInRecord;
use tracing::info;

const SECTION: SectionId = SectionId(301);
const ALICE: SubjectId = SubjectId(1);
const BOB: SubjectId = SubjectId(2);
const CAROL: SubjectId = SubjectId(3);

// ---------------------------------------------------------------------------
// Places
// ---------------------------------------------------------------------------

fn hall() -> Coordinates {
    Coordinates {
        lat: 41.0082,
        lon: 28.9784,
    }
}

fn north_of(origin: Coordinates, meters: f64) -> Coordinates {
    Coordinates {
        lat: origin.lat + (meters / EARTH_RADIUS_M).to_degrees(),
        lon: origin.lon,
    }
}

// ---------------------------------------------------------------------------
// One lecture
// ---------------------------------------------------------------------------

/// Opens a session, walks three students through check-in and closes it.
/// Returns the final roster.
async fn run_lecture<A: Authority>(
    authority: Arc<A>,
    config: &RollcallConfig,
) -> Result<Vec<CheckInRecord>, RollcallError> {
    let params = CreateSession {
        section_id: SECTION,
        duration_minutes: 50,
        geofence_radius_m: 15.0,
        anchor: hall(),
    };
    let mut presenter =
        PresenterView::open(authority.clone(), params, &config.monitor).await?;
    let session_id = presenter.session_id();
    let Some(first_code) = presenter.token() else {
        return Err(AuthorityError::Closed(session_id).into());
    };
    info!(%session_id, code = %first_code.value, "code on screen");

    let mut phone =
        SubjectView::spawn(authority.clone(), ALICE, &config.monitor);
    let card = match phone.next_event().await {
        Some(SubjectEvent::Discovered(card)) => card,
        Some(SubjectEvent::LoadFailed(e)) => return Err(e.into()),
        _ => return Err(AuthorityError::NotFound(session_id).into()),
    };
    let session = card.session;

    let flow = |subject, locator| {
        CheckInFlow::new(
            authority.clone(),
            Arc::new(locator),
            subject,
            &session,
            config.checkin.clone(),
        )
    };

    // Alice is in her seat.
    let mut alice = flow(ALICE, StaticLocator::at(hall(), 8.0));
    let verdict = alice.check_in_with_location().await?;
    info!(subject = %ALICE, status = %verdict.status(), "checked in");

    // Bob tries from the café across the street, then walks in and scans.
    let mut bob = flow(BOB, StaticLocator::at(north_of(hall(), 60.0), 5.0));
    if let Err(e) = bob.check_in_with_location().await {
        info!(subject = %BOB, reason = %e.user_message(), "check-in refused");
    }
    let verdict = bob.check_in_with_token(&first_code.value).await?;
    info!(subject = %BOB, status = %verdict.status(), "checked in");

    // Carol photographs the code but only submits after it rotated.
    while let Some(event) = presenter.next_event().await {
        if let PresenterEvent::Rotated(token) = event {
            info!(%session_id, code = %token.value, "code rotated");
            break;
        }
    }
    let mut carol = flow(CAROL, StaticLocator::at(hall(), 5.0));
    if let Err(e) = carol.check_in_with_token(&first_code.value).await {
        info!(subject = %CAROL, reason = %e.user_message(), "check-in refused");
    }
    let Some(current) = presenter.token() else {
        return Err(AuthorityError::Closed(session_id).into());
    };
    let verdict = carol.check_in_with_token(&current.value).await?;
    info!(subject = %CAROL, status = %verdict.status(), "checked in");

    let closed = presenter.close().await?;
    info!(%session_id, closed_at = ?closed.closed_at, "lecture over");

    while let Some(event) = phone.next_event().await {
        if let SubjectEvent::Closed { final_status, .. } = event {
            info!(
                subject = %ALICE,
                final_status = ?final_status,
                "phone shows session closed"
            );
            break;
        }
    }

    Ok(presenter.roster().await?)
}

#[tokio::main]
async fn main() -> Result<(), RollcallError> {
    let config = match std::env::args().nth(1) {
        Some(path) => RollcallConfig::load(path)?,
        None => RollcallConfig::default().validated(),
    };
    rollcall::logging::init(config.log_filter());

    let authority = Arc::new(InMemoryAuthority::new(config.policy.clone()));
    for subject in [ALICE, BOB, CAROL] {
        authority.enroll(SECTION, subject).await;
    }

    let server = AuthorityServer::builder()
        .config(&config.server)
        .build(authority)
        .await?;
    let url = format!("ws://{}", server.local_addr()?);
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "authority server stopped");
        }
    });

    let remote = Arc::new(RemoteAuthority::new(url));
    let roster = run_lecture(remote, &config).await?;
    for record in roster {
        info!(
            subject = %record.subject_id,
            status = %record.status,
            method = %record.method,
            "roster"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_lecture_ends_with_everyone_present() {
        let authority =
            Arc::new(InMemoryAuthority::new(AdjudicationPolicy::default()));
        for subject in [ALICE, BOB, CAROL] {
            authority.enroll(SECTION, subject).await;
        }

        let roster = run_lecture(authority, &RollcallConfig::default())
            .await
            .unwrap();

        assert_eq!(roster.len(), 3);
        assert!(roster.iter().all(|r| r.status == CheckInStatus::Present));
    }
}
