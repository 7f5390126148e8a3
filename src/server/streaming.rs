//! SSE (Server-Sent Events) framing for live mode.
//!
//! Each outbound frame becomes one named SSE event: `stream-data`,
//! `stream-end` or `stream-error`, with a JSON payload.

use axum::response::sse::Event;
use futures::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::relay::OutboundFrame;

/// Render a single frame as an SSE event.
pub fn frame_to_event(frame: &OutboundFrame) -> Event {
    Event::default()
        .event(frame.event_name())
        .data(frame.payload().to_string())
}

/// Convert the relay's frame receiver into an SSE stream.
///
/// The stream ends when the relay drops its sender, which happens right
/// after the terminal frame. Dropping this stream (the client went away)
/// is what the relay observes as a disconnect.
pub fn frames_to_sse_stream(
    rx: mpsc::Receiver<OutboundFrame>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    ReceiverStream::new(rx).map(|frame| Ok(frame_to_event(&frame)))
}
