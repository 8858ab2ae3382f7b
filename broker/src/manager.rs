use crate::channel::Channel;
use crate::connection::{
    ChannelStats, ConnectionId, ConnectionRegistry, CountersSnapshot, EnqueueOutcome,
};
use crate::envelope::{ConnectionAnnouncement, Envelope, StreamEvent};
use log::*;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Everything the subscribe handler needs to run one connection's writer:
/// the queue consumer, the shared `messages_sent` counter, and the shutdown
/// signal the writer selects on.
pub struct Subscription {
    pub connection_id: ConnectionId,
    /// Authorized channel names, in request order after deduplication.
    pub channels: Vec<String>,
    pub receiver: mpsc::Receiver<StreamEvent>,
    pub messages_sent: Arc<AtomicU64>,
    pub shutdown: watch::Receiver<bool>,
}

/// Result of one publish fan-out.
pub struct PublishReceipt {
    pub envelope: Arc<Envelope>,
    /// Subscribers whose queue accepted the envelope.
    pub delivered: usize,
    /// Subscribers shed because their queue was full or closed.
    pub dropped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub connections: usize,
    pub channels: usize,
    pub uptime: u64,
    pub stats: CountersSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub channels: Vec<ChannelStats>,
    pub stats: CountersSnapshot,
}

/// The broker facade over the connection registry. The only component that
/// mutates registry state; handlers and the server binary share one instance
/// behind an `Arc`.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
    queue_capacity: usize,
    shutdown_tx: watch::Sender<bool>,
}

impl Manager {
    pub fn new(queue_capacity: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            queue_capacity,
            shutdown_tx,
        }
    }

    /// Register a new subscriber over its authorized channel set and enqueue
    /// the handshake record announcing that set. The channel set is fixed for
    /// the connection's lifetime.
    pub fn subscribe(&self, user_id: &str, channels: Vec<Channel>) -> Subscription {
        let registration =
            self.registry
                .register(user_id.to_string(), &channels, self.queue_capacity);

        let channel_names: Vec<String> =
            channels.iter().map(|c| c.name().to_string()).collect();

        // The handshake bypasses the publish flow but rides the same queue,
        // so it is always the first record the writer emits.
        let announcement = ConnectionAnnouncement::new(
            channel_names.clone(),
            user_id.to_string(),
            registration.connection_id.as_str().to_string(),
        );
        if !registration
            .handle
            .enqueue_handshake(StreamEvent::Connected(announcement))
        {
            warn!(
                "Handshake enqueue failed for connection {}",
                registration.connection_id
            );
        }

        info!(
            "Registered log stream connection {} for user {} on {} channel(s)",
            registration.connection_id,
            user_id,
            channel_names.len()
        );

        Subscription {
            connection_id: registration.connection_id,
            channels: channel_names,
            receiver: registration.receiver,
            messages_sent: registration.handle.messages_sent_counter(),
            shutdown: self.shutdown_tx.subscribe(),
        }
    }

    /// Unregister a connection by id. Idempotent.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        self.registry.unregister(connection_id);
    }

    /// Fan one payload out to the current subscriber snapshot for `channel`.
    /// Never blocks on any subscriber: full or closed queues shed the
    /// envelope for that subscriber and the publish continues.
    pub fn publish(&self, channel: &Channel, payload: Value) -> PublishReceipt {
        let envelope = Arc::new(Envelope::new(channel.name().to_string(), payload));
        let subscribers = self.registry.subscribers(channel.name());

        let mut delivered = 0usize;
        let mut dropped = 0usize;
        for handle in &subscribers {
            match handle.try_enqueue(Arc::clone(&envelope)) {
                EnqueueOutcome::Delivered => delivered += 1,
                EnqueueOutcome::DroppedFull => {
                    dropped += 1;
                    trace!(
                        "Shed envelope {} for a slow subscriber of {}",
                        envelope.id,
                        channel
                    );
                }
                EnqueueOutcome::DroppedClosed => dropped += 1,
            }
        }

        self.registry
            .counters()
            .record_publish(delivered as u64, dropped as u64);

        debug!(
            "Published {} to {}: delivered={delivered} dropped={dropped}",
            envelope.id, channel
        );

        PublishReceipt {
            envelope,
            delivered,
            dropped,
        }
    }

    /// Signal every writer to exit and unregister every connection.
    /// In-flight publishes complete normally; their enqueues against closed
    /// connections are counted as drops.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let ids = self.registry.connection_ids();
        let count = ids.len();
        for id in &ids {
            self.registry.unregister(id);
        }
        if count > 0 {
            info!("Shut down {count} log stream connection(s)");
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "healthy",
            connections: self.registry.connection_count(),
            channels: self.registry.channel_count(),
            uptime: self.registry.uptime_millis(),
            stats: self.registry.counters().snapshot(),
        }
    }

    pub fn admin_stats(&self) -> AdminStats {
        AdminStats {
            channels: self.registry.channel_stats(),
            stats: self.registry.counters().snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel(name: &str) -> Channel {
        name.parse().expect("test channel should parse")
    }

    async fn next_log(subscription: &mut Subscription) -> Arc<Envelope> {
        match subscription.receiver.recv().await {
            Some(StreamEvent::Log(envelope)) => envelope,
            other => panic!("expected a log record, got {other:?}"),
        }
    }

    async fn drain_handshake(subscription: &mut Subscription) -> ConnectionAnnouncement {
        match subscription.receiver.recv().await {
            Some(StreamEvent::Connected(announcement)) => announcement,
            other => panic!("expected the handshake record first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handshake_is_first_and_announces_channel_set() {
        let manager = Manager::new(16);
        let mut subscription = manager.subscribe(
            "user123",
            vec![channel("logs:etl:ws:wf"), channel("logs:etl:ws")],
        );

        let announcement = drain_handshake(&mut subscription).await;
        assert_eq!(
            announcement.channels,
            vec!["logs:etl:ws:wf".to_string(), "logs:etl:ws".to_string()]
        );
        assert_eq!(announcement.user_id, "user123");
        assert_eq!(
            announcement.connection_id,
            subscription.connection_id.as_str()
        );
    }

    #[tokio::test]
    async fn test_empty_channel_set_still_subscribes() {
        let manager = Manager::new(16);
        let mut subscription = manager.subscribe("user123", Vec::new());

        let announcement = drain_handshake(&mut subscription).await;
        assert!(announcement.channels.is_empty());
        assert_eq!(manager.health().connections, 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber_with_one_envelope() {
        let manager = Manager::new(16);
        let mut first = manager.subscribe("user1", vec![channel("logs:etl:ws:wf")]);
        let mut second = manager.subscribe("user2", vec![channel("logs:etl:ws:wf")]);
        drain_handshake(&mut first).await;
        drain_handshake(&mut second).await;

        let receipt = manager.publish(&channel("logs:etl:ws:wf"), json!({"m": "hello"}));
        assert_eq!(receipt.delivered, 2);
        assert_eq!(receipt.dropped, 0);

        let to_first = next_log(&mut first).await;
        let to_second = next_log(&mut second).await;
        assert_eq!(to_first.id, receipt.envelope.id);
        assert_eq!(to_second.id, receipt.envelope.id);
        assert_eq!(to_first.payload, json!({"m": "hello"}));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_delivers_zero() {
        let manager = Manager::new(16);
        let receipt = manager.publish(&channel("logs:etl:ws"), json!({}));
        assert_eq!(receipt.delivered, 0);
        assert_eq!(receipt.dropped, 0);
    }

    #[tokio::test]
    async fn test_channel_match_is_exact_not_prefix() {
        let manager = Manager::new(16);
        let mut subscription = manager.subscribe("user1", vec![channel("logs:etl:ws")]);
        drain_handshake(&mut subscription).await;

        let receipt = manager.publish(&channel("logs:etl:ws:wf"), json!({}));
        assert_eq!(receipt.delivered, 0);
    }

    #[tokio::test]
    async fn test_fifo_order_per_subscriber() {
        let manager = Manager::new(16);
        let mut subscription = manager.subscribe("user1", vec![channel("logs:etl:ws")]);
        drain_handshake(&mut subscription).await;

        let target = channel("logs:etl:ws");
        let mut published = Vec::new();
        for i in 0..5 {
            published.push(manager.publish(&target, json!({"seq": i})).envelope.id.clone());
        }

        for id in published {
            assert_eq!(next_log(&mut subscription).await.id, id);
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_shed_without_affecting_fast_one() {
        let manager = Manager::new(4);
        let mut fast = manager.subscribe("fast", vec![channel("logs:etl:ws")]);
        let mut slow = manager.subscribe("slow", vec![channel("logs:etl:ws")]);
        drain_handshake(&mut fast).await;
        drain_handshake(&mut slow).await;

        let target = channel("logs:etl:ws");
        // The slow subscriber stops reading. Its queue holds 4 envelopes;
        // the rest are shed. The fast subscriber drains as we go.
        for i in 0..8 {
            let receipt = manager.publish(&target, json!({"seq": i}));
            if i < 4 {
                assert_eq!(receipt.delivered, 2, "publish {i} should reach both");
            } else {
                assert_eq!(receipt.delivered, 1, "publish {i} should reach only fast");
                assert_eq!(receipt.dropped, 1);
            }
            assert_eq!(next_log(&mut fast).await.payload, json!({"seq": i}));
        }

        // The slow subscriber still drains its first 4 in order.
        for i in 0..4 {
            assert_eq!(next_log(&mut slow).await.payload, json!({"seq": i}));
        }
    }

    #[tokio::test]
    async fn test_unregister_sheds_future_publishes() {
        let manager = Manager::new(16);
        let mut subscription = manager.subscribe("user1", vec![channel("logs:etl:ws")]);
        drain_handshake(&mut subscription).await;

        manager.unregister(&subscription.connection_id);

        let receipt = manager.publish(&channel("logs:etl:ws"), json!({}));
        assert_eq!(receipt.delivered, 0);
        assert_eq!(manager.health().connections, 0);
        assert_eq!(manager.health().channels, 0);
    }

    #[tokio::test]
    async fn test_shutdown_signals_writers_and_clears_registry() {
        let manager = Manager::new(16);
        let mut subscription = manager.subscribe("user1", vec![channel("logs:etl:ws")]);
        drain_handshake(&mut subscription).await;

        assert!(!*subscription.shutdown.borrow());
        manager.shutdown();

        subscription
            .shutdown
            .changed()
            .await
            .expect("shutdown signal should fire");
        assert!(*subscription.shutdown.borrow());
        assert_eq!(manager.health().connections, 0);

        // Publishes in flight after shutdown complete with zero deliveries.
        let receipt = manager.publish(&channel("logs:etl:ws"), json!({}));
        assert_eq!(receipt.delivered, 0);
    }

    #[tokio::test]
    async fn test_health_and_counters_reflect_activity() {
        let manager = Manager::new(16);
        let mut subscription = manager.subscribe("user1", vec![channel("logs:etl:ws")]);
        drain_handshake(&mut subscription).await;

        manager.publish(&channel("logs:etl:ws"), json!({}));
        manager.publish(&channel("logs:faas:other"), json!({}));

        let health = manager.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.connections, 1);
        assert_eq!(health.channels, 1);
        assert_eq!(health.stats.connections_accepted, 1);
        assert_eq!(health.stats.publishes_accepted, 2);
        assert_eq!(health.stats.envelopes_delivered, 1);

        let admin = manager.admin_stats();
        assert_eq!(admin.channels.len(), 1);
        assert_eq!(admin.channels[0].channel, "logs:etl:ws");
        assert_eq!(admin.channels[0].subscriber_count, 1);
    }
}
