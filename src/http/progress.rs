//! Server-sent progress stream: `/register-progress/{request_id}`.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};

use crate::http::server::AppState;

/// Stream progress events for `request_id` until the work reports done.
pub async fn register_progress(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(request_id = %request_id, "Progress stream opened");
    let subscription = state.progress.subscribe(&request_id);

    let events = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next_event().await?;
        let frame = match Event::default().json_data(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    request_id = %subscription.request_id(),
                    error = %e,
                    "Dropping unserializable progress event"
                );
                Event::default().comment("unserializable event")
            }
        };
        Some((Ok(frame), subscription))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
