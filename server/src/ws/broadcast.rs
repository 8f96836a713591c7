use axum::extract::ws::Message;
use tokio::sync::mpsc::error::TrySendError;

use super::protocol::ServerFrame;
use super::{ConnectionRegistry, ConnectionSender};

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Outbound queue is full (slow consumer); the frame is dropped.
    #[error("outbound queue full")]
    Full,
    /// Writer task is gone; the connection is closing.
    #[error("connection closed")]
    Closed,
}

/// Queue a message on one connection without waiting.
pub fn try_deliver(sender: &ConnectionSender, msg: Message) -> Result<(), DeliveryError> {
    sender.try_send(msg).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryError::Full,
        TrySendError::Closed(_) => DeliveryError::Closed,
    })
}

/// Encode a frame and queue it on one connection.
pub fn send_frame(sender: &ConnectionSender, frame: &ServerFrame) -> Result<(), DeliveryError> {
    match frame.to_ws_message() {
        Ok(msg) => try_deliver(sender, msg),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server frame");
            Err(DeliveryError::Closed)
        }
    }
}

/// Deliver `frame` to every connection bound to `room_id`, including the
/// sender's own.
///
/// The frame is encoded once. Each recipient is attempted independently: a
/// full or closed queue is logged and counted, never returned to the caller.
pub fn broadcast_to_room(
    registry: &ConnectionRegistry,
    room_id: &str,
    frame: &ServerFrame,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    let msg = match frame.to_ws_message() {
        Ok(msg) => msg,
        Err(e) => {
            tracing::error!(room_id = %room_id, error = %e, "Failed to encode broadcast frame");
            return report;
        }
    };

    registry.for_each_in_room(room_id, |entry| {
        match try_deliver(&entry.sender, msg.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                match e {
                    DeliveryError::Full => tracing::warn!(
                        conn_id = entry.conn_id,
                        user_id = %entry.user_id,
                        room_id = %room_id,
                        "Dropping broadcast for slow consumer"
                    ),
                    DeliveryError::Closed => tracing::debug!(
                        conn_id = entry.conn_id,
                        user_id = %entry.user_id,
                        room_id = %room_id,
                        "Broadcast raced with connection close"
                    ),
                }
            }
        }
    });

    tracing::debug!(
        room_id = %room_id,
        delivered = report.delivered,
        failed = report.failed,
        "Broadcast complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::RegistryEntry;
    use tokio::sync::mpsc;

    fn join(
        registry: &ConnectionRegistry,
        room_id: &str,
        capacity: usize,
    ) -> (u64, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn_id = registry.next_connection_id();
        registry.insert(RegistryEntry {
            conn_id,
            user_id: format!("user-{}", conn_id),
            display_name: format!("User {}", conn_id),
            room_id: None,
            sender: tx,
        });
        registry.update_room(conn_id, room_id);
        (conn_id, rx)
    }

    fn chat(text: &str) -> ServerFrame {
        ServerFrame::Message {
            user: "Alice".to_string(),
            text: text.to_string(),
            timestamp: "2026-10-14T09:30:00.000Z".to_string(),
        }
    }

    fn text_of(msg: Message) -> serde_json::Value {
        match msg {
            Message::Text(t) => serde_json::from_str(t.as_str()).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_delivers_only_to_room_members() {
        let registry = ConnectionRegistry::new();
        let (_, mut a) = join(&registry, "r1", 8);
        let (_, mut b) = join(&registry, "r1", 8);
        let (_, mut c) = join(&registry, "r2", 8);

        let report = broadcast_to_room(&registry, "r1", &chat("hello"));
        assert_eq!(report, DeliveryReport { delivered: 2, failed: 0 });

        assert_eq!(text_of(a.try_recv().unwrap())["text"], "hello");
        assert_eq!(text_of(b.try_recv().unwrap())["text"], "hello");
        assert!(c.try_recv().is_err());
    }

    #[test]
    fn test_failed_recipient_does_not_stop_fanout() {
        let registry = ConnectionRegistry::new();
        let (_, closed) = join(&registry, "r1", 8);
        let (_, mut full) = join(&registry, "r1", 1);
        let (_, mut healthy) = join(&registry, "r1", 8);
        drop(closed);

        // Fill the slow consumer's queue
        let first = broadcast_to_room(&registry, "r1", &chat("one"));
        assert_eq!(first, DeliveryReport { delivered: 2, failed: 1 });

        let second = broadcast_to_room(&registry, "r1", &chat("two"));
        assert_eq!(second, DeliveryReport { delivered: 1, failed: 2 });

        assert_eq!(text_of(healthy.try_recv().unwrap())["text"], "one");
        assert_eq!(text_of(healthy.try_recv().unwrap())["text"], "two");
        assert_eq!(text_of(full.try_recv().unwrap())["text"], "one");
        assert!(full.try_recv().is_err());
    }

    #[test]
    fn test_empty_room_is_a_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(
            broadcast_to_room(&registry, "nobody-here", &chat("hi")),
            DeliveryReport::default()
        );
    }

    #[test]
    fn test_send_frame_reports_closed_connection() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert_eq!(
            send_frame(&tx, &ServerFrame::error("x")),
            Err(DeliveryError::Closed)
        );
    }
}
