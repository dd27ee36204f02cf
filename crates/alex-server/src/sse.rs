//! SSE transport adapter: subscribes to the broadcaster and writes
//! `event: <event_type>\ndata: <json>\n\n` frames, with a leading
//! `connected` frame and a 10s heartbeat. Modeled on the
//! `querymt-service` SSE handler (`Sse::new(...).keep_alive(...)`), adapted
//! from a single aggregated completion stream to a long-lived, multi-event
//! session subscription.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::http::HeaderMap;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{extract_user_id, LegacyTokenQuery};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SseParams {
    pub session_id: String,
    #[serde(flatten)]
    pub legacy: LegacyTokenQuery,
}

pub async fn handle_sse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SseParams>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let legacy_query = Query(LegacyTokenQuery {
        access_token: params.legacy.access_token.clone(),
    });
    let user_id = extract_user_id(&headers, &legacy_query)?;
    // Verify the caller owns this session before handing them its event
    // stream — session_id is otherwise guessable/enumerable (spec §3: a
    // session is readable only under its owning user_id).
    state.coordinator.get_session(&user_id, &params.session_id).await?;

    let subscriber = state.coordinator.broadcaster().subscribe(&params.session_id);
    let replay = subscriber.replayed_count();

    let connected = SseEvent::default()
        .event("connected")
        .data(json!({ "session_id": params.session_id, "replay": replay }).to_string());

    let events = stream::unfold(subscriber, |subscriber| async move {
        let event = subscriber.recv().await?;
        let json_body = serde_json::to_string(&event).ok()?;
        let frame = SseEvent::default().event(event.event_type()).data(json_body);
        Some((Ok(frame), subscriber))
    });

    let body = stream::once(async move { Ok(connected) }).chain(events);

    Ok(Sse::new(body).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(10))
            .text("ping"),
    ))
}
