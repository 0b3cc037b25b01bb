//! Server-sent event framing for relay streams.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt as _};
use relay_core::{Frame, StreamController};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Converts a relay frame into an SSE event.
pub fn frame_to_event(frame: Frame) -> Event {
    // SSE fields cannot carry carriage returns; newlines become extra data lines.
    let data = frame.data.replace("\r\n", "\n").replace('\r', "\n");
    let event = Event::default().data(data);
    match frame.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Wraps a controller as an SSE response body.
///
/// The body ends right after `[DONE]`; dropping it early cancels the controller.
pub fn stream_response(
    controller: StreamController,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = controller
        .into_frames()
        .map(|frame| Ok::<_, Infallible>(frame_to_event(frame)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
