//! `GET /events`: bridges [`cortex_events::EventBus`] subscriptions into an
//! SSE stream, one frame per published [`cortex_events::Event`]. A lagged
//! subscriber's drop count is surfaced as a synthetic `dropped` frame rather
//! than silently swallowed.

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use std::convert::Infallible;

use crate::state::AppState;
use cortex_events::RecvOutcome;

pub async fn events(State(state): State<AppState>) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let mut subscription = state.events.subscribe();
    let stream = async_stream::stream! {
        loop {
            match subscription.recv().await {
                RecvOutcome::Event(event) => {
                    if let Ok(frame) = SseEvent::default().json_data(&event) {
                        yield Ok(frame);
                    }
                }
                RecvOutcome::Dropped(n) => {
                    yield Ok(SseEvent::default().event("dropped").data(n.to_string()));
                }
                RecvOutcome::Closed => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
