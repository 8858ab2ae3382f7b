use crate::clock::now_millis;
use bytes::Bytes;
use log::*;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Heartbeat comment frame, written when a connection's writer has been idle
/// for one heartbeat interval. A bare comment line keeps intermediaries from
/// closing the connection without dispatching a client-side event.
pub const HEARTBEAT_FRAME: &[u8] = b":ping\n\n";

/// The immutable unit fanned out to subscribers. Minted once per publish and
/// shared by reference across every send queue it lands in.
#[derive(Debug)]
pub struct Envelope {
    /// Canonical channel name the record was published to.
    pub channel: String,
    /// Publisher-supplied payload, passed through verbatim.
    pub payload: Value,
    /// Unique id generated at publish time.
    pub id: String,
    /// Milliseconds since epoch at publish time.
    pub published_at: u64,
}

impl Envelope {
    pub fn new(channel: String, payload: Value) -> Self {
        Self {
            channel,
            payload,
            id: Uuid::new_v4().to_string(),
            published_at: now_millis(),
        }
    }

    /// Render as an SSE data record:
    ///
    /// ```text
    /// id: <envelope-id>
    /// data: {"channel":...,"data":...,"timestamp":...,"id":...}
    ///
    /// ```
    pub fn sse_frame(&self) -> Bytes {
        let record = DataRecord {
            channel: &self.channel,
            data: &self.payload,
            timestamp: self.published_at,
            id: &self.id,
        };
        match serde_json::to_string(&record) {
            Ok(json) => Bytes::from(format!("id: {}\ndata: {}\n\n", self.id, json)),
            Err(e) => {
                error!("Failed to serialize envelope {}: {e}", self.id);
                Bytes::new()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct DataRecord<'a> {
    channel: &'a str,
    data: &'a Value,
    timestamp: u64,
    id: &'a str,
}

/// The synthetic record announcing the effective subscription, always the
/// first record a subscriber receives. Carries the authorized channel set so
/// the client can tell which of its requested channels survived filtering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAnnouncement {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    pub channels: Vec<String>,
    pub user_id: String,
    pub connection_id: String,
    pub timestamp: u64,
}

impl ConnectionAnnouncement {
    pub fn new(channels: Vec<String>, user_id: String, connection_id: String) -> Self {
        Self {
            kind: "connection",
            status: "connected",
            channels,
            user_id,
            connection_id,
            timestamp: now_millis(),
        }
    }

    /// Render as an SSE record. Unlike data records, the handshake carries no
    /// `id:` field.
    pub fn sse_frame(&self) -> Bytes {
        match serde_json::to_string(self) {
            Ok(json) => Bytes::from(format!("data: {json}\n\n")),
            Err(e) => {
                error!(
                    "Failed to serialize handshake for connection {}: {e}",
                    self.connection_id
                );
                Bytes::new()
            }
        }
    }
}

/// One item on a connection's send queue.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Subscription handshake, enqueued once at registration.
    Connected(ConnectionAnnouncement),
    /// A published log record.
    Log(Arc<Envelope>),
}

impl StreamEvent {
    pub fn sse_frame(&self) -> Bytes {
        match self {
            StreamEvent::Connected(announcement) => announcement.sse_frame(),
            StreamEvent::Log(envelope) => envelope.sse_frame(),
        }
    }

    /// Data records count toward a connection's `messages_sent`; the
    /// handshake does not.
    pub fn is_log(&self) -> bool {
        matches!(self, StreamEvent::Log(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_frame_carries_id_and_data_fields() {
        let envelope = Envelope::new(
            "logs:etl:ws:wf".to_string(),
            json!({"level": "INFO", "message": "hello"}),
        );
        let frame = String::from_utf8(envelope.sse_frame().to_vec()).unwrap();

        assert!(frame.starts_with(&format!("id: {}\ndata: ", envelope.id)));
        assert!(frame.ends_with("\n\n"));

        let json_part = frame
            .lines()
            .nth(1)
            .and_then(|line| line.strip_prefix("data: "))
            .unwrap();
        let parsed: Value = serde_json::from_str(json_part).unwrap();
        assert_eq!(parsed["channel"], "logs:etl:ws:wf");
        assert_eq!(parsed["data"], json!({"level": "INFO", "message": "hello"}));
        assert_eq!(parsed["id"], envelope.id.as_str());
        assert_eq!(parsed["timestamp"], envelope.published_at);
    }

    #[test]
    fn test_payload_round_trips_verbatim() {
        let payload = json!({"nested": {"a": [1, 2, 3]}, "b": null, "c": "x"});
        let envelope = Envelope::new("logs:etl:ws".to_string(), payload.clone());
        let frame = String::from_utf8(envelope.sse_frame().to_vec()).unwrap();

        let json_part = frame
            .lines()
            .nth(1)
            .and_then(|line| line.strip_prefix("data: "))
            .unwrap();
        let parsed: Value = serde_json::from_str(json_part).unwrap();
        assert_eq!(parsed["data"], payload);
    }

    #[test]
    fn test_handshake_frame_has_no_id_field() {
        let announcement = ConnectionAnnouncement::new(
            vec!["logs:etl:ws:wf".to_string()],
            "user123".to_string(),
            "conn-1".to_string(),
        );
        let frame = String::from_utf8(announcement.sse_frame().to_vec()).unwrap();

        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        assert!(!frame.contains("\nid:"));

        let parsed: Value =
            serde_json::from_str(frame.strip_prefix("data: ").unwrap().trim_end()).unwrap();
        assert_eq!(parsed["type"], "connection");
        assert_eq!(parsed["status"], "connected");
        assert_eq!(parsed["channels"], json!(["logs:etl:ws:wf"]));
        assert_eq!(parsed["userId"], "user123");
        assert_eq!(parsed["connectionId"], "conn-1");
    }

    #[test]
    fn test_handshake_with_empty_channel_set() {
        let announcement =
            ConnectionAnnouncement::new(Vec::new(), "user123".to_string(), "conn-1".to_string());
        let frame = String::from_utf8(announcement.sse_frame().to_vec()).unwrap();
        let parsed: Value =
            serde_json::from_str(frame.strip_prefix("data: ").unwrap().trim_end()).unwrap();
        assert_eq!(parsed["channels"], json!([]));
    }

    #[test]
    fn test_heartbeat_frame_is_a_comment_record() {
        assert_eq!(HEARTBEAT_FRAME, b":ping\n\n");
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let first = Envelope::new("logs:etl:ws".to_string(), json!({}));
        let second = Envelope::new("logs:etl:ws".to_string(), json!({}));
        assert_ne!(first.id, second.id);
    }
}
