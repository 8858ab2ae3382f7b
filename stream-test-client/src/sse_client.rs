use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Record {
    pub data: Value,
    pub timestamp: Instant,
}

pub struct Connection {
    pub label: String,
    record_rx: mpsc::UnboundedReceiver<Record>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Open a log stream as `user_id` over the given channels. Workspace
    /// memberships ride along in the header the reference resolver reads.
    pub async fn establish(
        base_url: &str,
        user_id: &str,
        workspaces: &str,
        channels: &str,
        label: String,
    ) -> Result<Self> {
        let url = format!("{}/api/logs/stream?channels={}", base_url, channels);
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?
            .header("X-User-Id", user_id)?
            .header("X-Workspaces", workspaces)?
            .build();

        let task_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        if let Ok(data) = serde_json::from_str(&event.data) {
                            let record = Record {
                                data,
                                timestamp: Instant::now(),
                            };
                            if tx.send(record).is_err() {
                                debug!("Record receiver dropped for {}", task_label);
                                break;
                            }
                        }
                    }
                    Some(Ok(es::SSE::Comment(_))) => {
                        // Heartbeats are ignored.
                    }
                    Some(Err(e)) => {
                        warn!("Stream error for {}: {}", task_label, e);
                    }
                    None => {
                        debug!("Stream ended for {}", task_label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            label,
            record_rx: rx,
            _handle: handle,
        })
    }

    /// Wait for the next record matching `predicate`, skipping others.
    pub async fn wait_for<F>(&mut self, predicate: F, timeout: Duration) -> Result<Record>
    where
        F: Fn(&Value) -> bool,
    {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!("Timeout waiting for a matching record on {}", self.label);
            }

            match tokio::time::timeout(remaining, self.record_rx.recv()).await {
                Ok(Some(record)) if predicate(&record.data) => return Ok(record),
                Ok(Some(_)) => continue,
                Ok(None) => anyhow::bail!("Stream connection closed for {}", self.label),
                Err(_) => {
                    anyhow::bail!("Timeout waiting for a matching record on {}", self.label)
                }
            }
        }
    }

    /// Wait for the handshake record that opens every stream.
    pub async fn wait_for_handshake(&mut self, timeout: Duration) -> Result<Record> {
        self.wait_for(|data| data["type"] == "connection", timeout).await
    }
}
