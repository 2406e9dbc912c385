//! Server-Sent Events push channel for the authenticated caller.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use futures_util::stream;
use order_store::OrderRepository;

use crate::auth::Authenticated;
use crate::routes::orders::AppState;

/// GET /notifications/stream
///
/// Registers a connection in the presence directory. The connection is
/// dropped from the directory once the client disconnects and the next
/// publish finds the channel closed.
pub async fn stream<R: OrderRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Authenticated(caller): Authenticated,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.presence.connect(caller.user_id);
    tracing::info!(user_id = %caller.user_id, "notification stream opened");

    let events = stream::unfold(receiver, |mut receiver| async move {
        let notification = receiver.recv().await?;
        let event = Event::default()
            .event(notification.kind.as_str())
            .json_data(&notification)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Some((Ok(event), receiver))
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
