use axum::response::sse::{Event, KeepAlive, Sse};
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use waypoint_types::{EventEnvelope, RunId};

use crate::state::AppState;

/// `GET /runs/{id}/stream` (spec.md §4.5/§6): a late subscriber first
/// sees every checkpoint's event tail up to the point it joined, then
/// the live tail. Same `initial.chain(live)` composition as
/// `tandem-server::http::sse_stream`, with the checkpoint store's
/// per-run `event_tail` standing in for the teacher's in-memory replay
/// buffer.
///
/// The live receiver subscribes before the history read so no event
/// published during that read is lost; an event landing in both the
/// tail and the live buffer is a harmless duplicate (clients can dedupe
/// on `event_id`, which is unique per event). A subscriber that falls
/// behind the broadcast channel's capacity (spec.md §5: "slow consumers
/// are dropped with a `lagged` marker and reconnect via replay") gets a
/// synthetic `lagged` event naming how many messages it missed, so it
/// knows to reconnect and replay from its last seen checkpoint rather
/// than silently resume mid-stream.
pub async fn run_event_stream(
    state: AppState,
    run_id: RunId,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    let live_rx = state.events.subscribe();

    let history = state.store.history(&run_id).await.unwrap_or_default();
    let replay: Vec<EventEnvelope> = history.into_iter().flat_map(|entry| entry.event_tail).collect();

    let run_id_for_live = run_id.clone();
    let live = BroadcastStream::new(live_rx).filter_map(move |msg| match msg {
        Ok(event) if event.run_id == run_id_for_live => Some(Ok(to_sse(&event))),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => Some(Ok(lagged_event(skipped))),
    });

    let initial = tokio_stream::iter(replay.iter().map(to_sse).map(Ok).collect::<Vec<_>>());
    initial.chain(live)
}

fn lagged_event(skipped: u64) -> Event {
    Event::default()
        .event("lagged")
        .data(serde_json::json!({ "skipped": skipped }).to_string())
}

fn to_sse(event: &EventEnvelope) -> Event {
    Event::default()
        .id(event.event_id.clone())
        .event(event.kind.as_str())
        .data(serde_json::to_string(&event.data).unwrap_or_default())
}

pub fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(Duration::from_secs(10))
}

pub type RunStream = Sse<std::pin::Pin<Box<dyn Stream<Item = Result<Event, std::convert::Infallible>> + Send>>>;
