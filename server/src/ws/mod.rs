pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod session;

use tokio::sync::mpsc;

pub use registry::{ConnectionId, ConnectionRegistry, RegistryEntry};

/// Sender half of a WebSocket connection's outbound queue.
/// Bounded: a full queue means the recipient is too slow and the frame is dropped.
pub type ConnectionSender = mpsc::Sender<axum::extract::ws::Message>;
