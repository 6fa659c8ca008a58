// src/handlers/violation.rs

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::Serialize;
use tokio_stream::{Stream, StreamExt, wrappers::WatchStream};
use validator::Validate;

use crate::{
    error::AppError,
    models::violation::{ReportViolationRequest, Violation, ViolationEvent},
    notifications::{FeedHub, FeedState},
    repository::NewViolation,
    state::AppState,
    utils::jwt::Claims,
};

/// Response body for the teacher's current alert list.
#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub state: FeedState,
    pub violations: Vec<Violation>,
    /// Set when history could not be loaded; live alerts still arrive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Records a violation reported by the proctoring layer and pushes it to
/// the owning teacher's live feed. Only participants of the quiz may report.
pub async fn report_violation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReportViolationRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let student_id = claims.user_id()?;

    if !state.quizzes.is_participant(student_id, req.quiz_id).await? {
        tracing::warn!(student_id, quiz_id = req.quiz_id, "Violation report from non-participant");
        return Err(AppError::Forbidden(
            "Only participants can report violations for this quiz".to_string(),
        ));
    }

    let recorded = state
        .violations
        .record_violation(NewViolation {
            quiz_id: req.quiz_id,
            student_id,
            student_name: req.student_name,
            violation_type: req.violation_type,
            occurred_at: state.clock.now(),
        })
        .await?;

    let delivered = state.channel.publish(ViolationEvent::from(&recorded));
    tracing::info!(
        quiz_id = req.quiz_id,
        teacher_id = recorded.teacher_id,
        delivered,
        "Violation reported"
    );

    Ok((StatusCode::CREATED, Json(recorded)))
}

/// Opens (or reuses) the caller's feed and returns the visible list.
pub async fn list_violations(
    State(hub): State<Arc<FeedHub>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.user_id()?;
    let (feed, gap) = hub.open(teacher_id).await?;

    Ok(Json(FeedResponse {
        state: feed.state(),
        violations: feed.visible(),
        warning: gap.map(|e| e.to_string()),
    }))
}

/// Server-sent events carrying the full visible list after every change.
pub async fn stream_violations(
    State(hub): State<Arc<FeedHub>>,
    Extension(claims): Extension<Claims>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let teacher_id = claims.user_id()?;
    let (feed, _) = hub.open(teacher_id).await?;

    let stream = WatchStream::new(feed.watch()).map(|violations| {
        let event = Event::default().event("violations");
        Ok(match event.json_data(&violations) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!("Failed to encode violation snapshot: {}", e);
                Event::default().event("error").data("encoding failed")
            }
        })
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Hides one violation for the caller.
pub async fn dismiss_violation(
    State(hub): State<Arc<FeedHub>>,
    Extension(claims): Extension<Claims>,
    Path(violation_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.user_id()?;
    let (feed, _) = hub.open(teacher_id).await?;

    let dismissed = feed.dismiss(&violation_id).await?;

    Ok(Json(serde_json::json!({
        "id": violation_id,
        "dismissed": dismissed,
        "visible": feed.visible().len(),
    })))
}

/// Tears down the caller's live feed.
pub async fn close_feed(
    State(hub): State<Arc<FeedHub>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let teacher_id = claims.user_id()?;
    if hub.close(teacher_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("No open feed".to_string()))
    }
}
