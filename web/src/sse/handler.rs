use crate::extractors::resolved_principal::ResolvedPrincipal;
use crate::AppState;
use async_stream::stream;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::response::{IntoResponse, Response};
use broker::connection::ConnectionId;
use broker::envelope::HEARTBEAT_FRAME;
use broker::manager::Subscription;
use broker::Manager;
use bytes::Bytes;
use domain::access;
use log::*;
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::{interval_at, Instant};

/// Unregisters the connection when the response stream is dropped, which is
/// how a client disconnect manifests on the server side.
struct ConnectionGuard {
    broker: Arc<Manager>,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!("Log stream {} closed, cleaning up", self.connection_id);
        self.broker.unregister(&self.connection_id);
    }
}

/// Extract the requested channel names from the raw query string. The
/// `channels` parameter may be repeated, comma-separated, or both; empty
/// entries are dropped.
fn requested_channels(query: &str) -> Vec<String> {
    form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| name == "channels")
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// GET subscribe to one or more log channels over Server-Sent Events.
///
/// The connection's channel set is fixed at accept time: requested channels
/// the principal may not read are silently omitted, and the handshake record
/// announces the surviving set. The handler blocks on the per-connection
/// writer until the client disconnects or the server shuts down.
#[utoipa::path(
    get,
    path = "/api/logs/stream",
    params(
        ("channels" = String, Query, description = "Channel names, repeated or comma-separated (logs:<service>:<workspace>[:<resource>])")
    ),
    responses(
        (status = 200, description = "SSE stream established; first record announces the authorized channel set"),
        (status = 401, description = "Principal resolution failed")
    )
)]
pub async fn stream_logs(
    ResolvedPrincipal(principal): ResolvedPrincipal,
    State(app_state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let requested = requested_channels(query.as_deref().unwrap_or(""));
    let channels = access::subscribable_channels(&principal, requested);
    debug!(
        "Establishing log stream for user {} on {} channel(s)",
        principal.user_id,
        channels.len()
    );

    let Subscription {
        connection_id,
        channels: _,
        receiver: mut queue,
        messages_sent,
        mut shutdown,
    } = app_state.broker.subscribe(&principal.user_id, channels);

    let guard = ConnectionGuard {
        broker: Arc::clone(&app_state.broker),
        connection_id,
    };
    let heartbeat_interval = app_state.config.heartbeat_interval();

    // The per-connection writer: drains the send queue in FIFO order,
    // interleaves heartbeats while idle, and exits on disconnect (stream
    // drop), queue release, or server shutdown.
    let writer = stream! {
        let _guard = guard;
        let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        loop {
            tokio::select! {
                item = queue.recv() => match item {
                    Some(event) => {
                        if event.is_log() {
                            messages_sent.fetch_add(1, Ordering::Relaxed);
                        }
                        heartbeat.reset();
                        yield Ok::<Bytes, Infallible>(event.sse_frame());
                    }
                    // Queue released by unregistration.
                    None => break,
                },
                _ = heartbeat.tick() => {
                    yield Ok(Bytes::from_static(HEARTBEAT_FRAME));
                }
                _ = shutdown.changed() => break,
            }
        }
    };

    (
        [
            ("content-type", "text/event-stream"),
            ("cache-control", "no-cache, no-transform"),
            ("connection", "keep-alive"),
            ("x-accel-buffering", "no"),
        ],
        Body::from_stream(writer),
    )
        .into_response()
}
