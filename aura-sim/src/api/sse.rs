//! Server-Sent Events (SSE) stream
//!
//! Merges the host's and every client's event stream into one SSE feed.
//! Each event's data carries the emitting actor as `source`.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use super::server::AppContext;

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    let streams = ctx.event_sources().into_iter().map(|(source, rx)| {
        BroadcastStream::new(rx).filter_map(move |result| {
            let source = source.clone();
            async move {
                match result {
                    Ok(event) => {
                        let data = json!({ "source": source, "event": event });
                        Some(Ok::<_, Infallible>(Event::default()
                            .event(event.event_type())
                            .data(data.to_string())))
                    }
                    Err(e) => {
                        // Lagged receiver; the stream continues
                        warn!(source = %source, "SSE stream error: {:?}", e);
                        None
                    }
                }
            }
        })
    });

    let stream = stream::select_all(streams.map(Box::pin));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
