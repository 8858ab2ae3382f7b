use crate::channel::Channel;
use crate::clock::now_millis;
use crate::envelope::{Envelope, StreamEvent};
use dashmap::DashMap;
use log::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

// Type alias for user IDs (the web layer hands principals over as strings)
pub type UserId = String;

/// Unique identifier for a connection (server-generated, never reused)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a non-blocking enqueue onto a connection's send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The envelope was queued for the connection's writer.
    Delivered,
    /// The queue was at capacity; the envelope was shed for this subscriber.
    DroppedFull,
    /// The connection is draining or closed.
    DroppedClosed,
}

/// The producer-side endpoint of one connection: the send queue plus the
/// bookkeeping shared with the connection's writer.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub user_id: UserId,
    pub connected_at: u64,
    sender: mpsc::Sender<StreamEvent>,
    closed: Arc<AtomicBool>,
    messages_sent: Arc<AtomicU64>,
}

impl ConnectionHandle {
    /// The one mutator exposed to publishers. Never blocks: a full queue or a
    /// draining/closed connection sheds the envelope for this subscriber.
    pub fn try_enqueue(&self, envelope: Arc<Envelope>) -> EnqueueOutcome {
        if self.closed.load(Ordering::Acquire) {
            return EnqueueOutcome::DroppedClosed;
        }
        match self.sender.try_send(StreamEvent::Log(envelope)) {
            Ok(()) => EnqueueOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueOutcome::DroppedFull,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::DroppedClosed,
        }
    }

    pub(crate) fn enqueue_handshake(&self, event: StreamEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub(crate) fn messages_sent_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.messages_sent)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Everything a new subscriber needs to run its writer.
pub struct Registration {
    pub connection_id: ConnectionId,
    pub receiver: mpsc::Receiver<StreamEvent>,
    pub handle: ConnectionHandle,
}

struct ConnectionEntry {
    handle: ConnectionHandle,
    /// Channel names this connection is indexed under; fixed for its lifetime.
    channels: Vec<String>,
}

/// Process-wide counters, updated atomically by the fan-out path and read as
/// a snapshot by the health and admin endpoints.
#[derive(Debug, Default)]
pub struct GlobalCounters {
    connections_accepted: AtomicU64,
    publishes_accepted: AtomicU64,
    envelopes_delivered: AtomicU64,
    envelopes_dropped: AtomicU64,
}

impl GlobalCounters {
    fn record_connection(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish(&self, delivered: u64, dropped: u64) {
        self.publishes_accepted.fetch_add(1, Ordering::Relaxed);
        self.envelopes_delivered.fetch_add(delivered, Ordering::Relaxed);
        self.envelopes_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            publishes_accepted: self.publishes_accepted.load(Ordering::Relaxed),
            envelopes_delivered: self.envelopes_delivered.load(Ordering::Relaxed),
            envelopes_dropped: self.envelopes_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountersSnapshot {
    pub connections_accepted: u64,
    pub publishes_accepted: u64,
    pub envelopes_delivered: u64,
    pub envelopes_dropped: u64,
}

/// Per-connection record in the admin statistics document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberStats {
    pub connection_id: String,
    pub user_id: String,
    pub connected_at: u64,
    pub logs_sent: u64,
}

/// Per-channel record in the admin statistics document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub channel: String,
    pub subscriber_count: usize,
    pub subscribers: Vec<SubscriberStats>,
}

/// Connection registry with dual indices: primary storage by connection id
/// for registration and cleanup, and a reverse index by channel name for
/// fan-out.
///
/// Mutation order keeps the reverse index a subset of the primary index at
/// every observable instant: register inserts primary first, unregister
/// removes the reverse entries first. Fan-out snapshots therefore resolve
/// every id they read unless the connection is already fully gone.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id - O(1)
    connections: DashMap<ConnectionId, ConnectionEntry>,

    /// Reverse index: channel name to subscriber set for fan-out - O(1)
    channel_index: DashMap<String, HashSet<ConnectionId>>,

    counters: GlobalCounters,
    started_at: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            channel_index: DashMap::new(),
            counters: GlobalCounters::default(),
            started_at: now_millis(),
        }
    }

    /// Register a new connection with a bounded send queue of `queue_capacity`
    /// and index it under each of `channels`.
    pub fn register(
        &self,
        user_id: UserId,
        channels: &[Channel],
        queue_capacity: usize,
    ) -> Registration {
        let connection_id = ConnectionId::new();
        // Capacity 1 at minimum so the handshake record always fits.
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));

        let handle = ConnectionHandle {
            user_id,
            connected_at: now_millis(),
            sender,
            closed: Arc::new(AtomicBool::new(false)),
            messages_sent: Arc::new(AtomicU64::new(0)),
        };

        let channel_names: Vec<String> =
            channels.iter().map(|c| c.name().to_string()).collect();

        // Primary index first so every id readable from the reverse index
        // resolves to a handle.
        self.connections.insert(
            connection_id.clone(),
            ConnectionEntry {
                handle: handle.clone(),
                channels: channel_names.clone(),
            },
        );
        for name in &channel_names {
            self.channel_index
                .entry(name.clone())
                .or_default()
                .insert(connection_id.clone());
        }

        self.counters.record_connection();

        Registration {
            connection_id,
            receiver,
            handle,
        }
    }

    /// Unregister a connection. Idempotent; safe to call from both the writer
    /// exit path and the shutdown path.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        let channels = match self.connections.get(connection_id) {
            Some(entry) => {
                // Flag first so fan-outs holding a snapshot of this handle
                // report dropped_closed from here on.
                entry.handle.mark_closed();
                entry.channels.clone()
            }
            None => return,
        };

        // Reverse index first, then primary.
        for name in &channels {
            if let Some(mut subscribers) = self.channel_index.get_mut(name) {
                subscribers.remove(connection_id);
                if subscribers.is_empty() {
                    drop(subscribers); // Release lock before removal
                    // The entry may have been repopulated since the lock was
                    // released; only remove it if it is still empty.
                    self.channel_index
                        .remove_if(name, |_, subscribers| subscribers.is_empty());
                }
            }
        }

        self.connections.remove(connection_id);
        debug!("Unregistered connection {connection_id}");
    }

    /// Snapshot the subscriber set for one channel. The id set is copied
    /// under the channel entry's lock and handles are resolved outside it, so
    /// the snapshot is stable for the duration of a fan-out.
    pub fn subscribers(&self, channel: &str) -> Vec<ConnectionHandle> {
        let ids: Vec<ConnectionId> = match self.channel_index.get(channel) {
            Some(subscribers) => subscribers.iter().cloned().collect(),
            None => return Vec::new(),
        };

        ids.iter()
            .filter_map(|id| self.connections.get(id).map(|entry| entry.handle.clone()))
            .collect()
    }

    pub fn counters(&self) -> &GlobalCounters {
        &self.counters
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channel_index.len()
    }

    pub fn uptime_millis(&self) -> u64 {
        now_millis().saturating_sub(self.started_at)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Per-channel statistics for the admin endpoint.
    pub fn channel_stats(&self) -> Vec<ChannelStats> {
        let mut stats: Vec<ChannelStats> = self
            .channel_index
            .iter()
            .map(|entry| {
                let subscribers: Vec<SubscriberStats> = entry
                    .value()
                    .iter()
                    .filter_map(|id| {
                        self.connections.get(id).map(|conn| SubscriberStats {
                            connection_id: id.as_str().to_string(),
                            user_id: conn.handle.user_id.clone(),
                            connected_at: conn.handle.connected_at,
                            logs_sent: conn.handle.messages_sent(),
                        })
                    })
                    .collect();
                ChannelStats {
                    channel: entry.key().clone(),
                    subscriber_count: subscribers.len(),
                    subscribers,
                }
            })
            .collect();

        // DashMap iteration order is arbitrary; stable output reads better.
        stats.sort_by(|a, b| a.channel.cmp(&b.channel));
        stats
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel(name: &str) -> Channel {
        name.parse().expect("test channel should parse")
    }

    fn envelope(channel_name: &str) -> Arc<Envelope> {
        Arc::new(Envelope::new(channel_name.to_string(), json!({"m": 1})))
    }

    #[test]
    fn test_register_indexes_every_channel() {
        let registry = ConnectionRegistry::new();
        let registration = registry.register(
            "user1".to_string(),
            &[channel("logs:etl:ws"), channel("logs:etl:ws:wf")],
            8,
        );

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.channel_count(), 2);
        assert_eq!(registry.subscribers("logs:etl:ws").len(), 1);
        assert_eq!(registry.subscribers("logs:etl:ws:wf").len(), 1);
        assert_eq!(registry.subscribers("logs:etl:other").len(), 0);

        drop(registration);
    }

    #[test]
    fn test_unregister_removes_both_indexes_and_empty_entries() {
        let registry = ConnectionRegistry::new();
        let registration =
            registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);

        registry.unregister(&registration.connection_id);

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.channel_count(), 0);
        assert!(registry.subscribers("logs:etl:ws").is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let registration =
            registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);

        registry.unregister(&registration.connection_id);
        registry.unregister(&registration.connection_id);

        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_unregister_keeps_other_subscribers_indexed() {
        let registry = ConnectionRegistry::new();
        let first = registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);
        let second = registry.register("user2".to_string(), &[channel("logs:etl:ws")], 8);

        registry.unregister(&first.connection_id);

        let remaining = registry.subscribers("logs:etl:ws");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "user2");

        drop(second);
    }

    #[tokio::test]
    async fn test_try_enqueue_reports_full_at_capacity() {
        let registry = ConnectionRegistry::new();
        let registration =
            registry.register("user1".to_string(), &[channel("logs:etl:ws")], 2);

        assert_eq!(
            registration.handle.try_enqueue(envelope("logs:etl:ws")),
            EnqueueOutcome::Delivered
        );
        assert_eq!(
            registration.handle.try_enqueue(envelope("logs:etl:ws")),
            EnqueueOutcome::Delivered
        );
        assert_eq!(
            registration.handle.try_enqueue(envelope("logs:etl:ws")),
            EnqueueOutcome::DroppedFull
        );
    }

    #[tokio::test]
    async fn test_try_enqueue_after_unregister_reports_closed() {
        let registry = ConnectionRegistry::new();
        let registration =
            registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);

        // A fan-out snapshot taken before unregistration.
        let snapshot = registry.subscribers("logs:etl:ws");
        registry.unregister(&registration.connection_id);

        assert_eq!(
            snapshot[0].try_enqueue(envelope("logs:etl:ws")),
            EnqueueOutcome::DroppedClosed
        );
    }

    #[tokio::test]
    async fn test_try_enqueue_after_receiver_drop_reports_closed() {
        let registry = ConnectionRegistry::new();
        let registration =
            registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);

        drop(registration.receiver);

        assert_eq!(
            registration.handle.try_enqueue(envelope("logs:etl:ws")),
            EnqueueOutcome::DroppedClosed
        );
    }

    #[test]
    fn test_connection_ids_are_unique_across_registrations() {
        let registry = ConnectionRegistry::new();
        let first = registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);
        registry.unregister(&first.connection_id);
        let second = registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);

        assert_ne!(first.connection_id, second.connection_id);
    }

    #[test]
    fn test_counters_track_publish_outcomes() {
        let counters = GlobalCounters::default();
        counters.record_publish(2, 1);
        counters.record_publish(0, 0);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.publishes_accepted, 2);
        assert_eq!(snapshot.envelopes_delivered, 2);
        assert_eq!(snapshot.envelopes_dropped, 1);
    }

    #[test]
    fn test_channel_stats_reflect_subscribers() {
        let registry = ConnectionRegistry::new();
        let _first = registry.register("user1".to_string(), &[channel("logs:etl:ws")], 8);
        let _second = registry.register(
            "user2".to_string(),
            &[channel("logs:etl:ws"), channel("logs:faas:ws2")],
            8,
        );

        let stats = registry.channel_stats();
        assert_eq!(stats.len(), 2);

        let etl = stats
            .iter()
            .find(|s| s.channel == "logs:etl:ws")
            .expect("channel stats present");
        assert_eq!(etl.subscriber_count, 2);

        let faas = stats
            .iter()
            .find(|s| s.channel == "logs:faas:ws2")
            .expect("channel stats present");
        assert_eq!(faas.subscriber_count, 1);
        assert_eq!(faas.subscribers[0].user_id, "user2");
    }
}
