use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::broadcast::try_deliver;
use crate::ws::session::{Flow, Session};

/// Ping interval: server sends a WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if no pong arrives within 10 seconds after a ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the writer may keep flushing queued frames after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run the actor-per-connection pattern for one WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from a bounded mpsc channel
/// - Ping task: sends periodic pings and closes on a missing pong
/// - Reader loop: feeds frames to the connection's [`Session`] one at a time
///
/// The mpsc sender is what the registry hands to the broadcast router.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let conn_id = state.registry.next_connection_id();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(state.limits.outbound_buffer);

    let mut session = Session::new(conn_id, tx.clone());

    tracing::info!(conn_id, "WebSocket connection opened (pending authentication)");

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).await.is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(conn_id, "Pong timeout, closing connection");
                    let _ = ping_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: 1001,
                            reason: "Pong timeout".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    loop {
        let msg = tokio::select! {
            msg = ws_receiver.next() => msg,
            // Writer is gone (pong timeout close, broken sink)
            _ = tx.closed() => break,
        };

        let flow = match msg {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => session.handle_text(&state, text.as_str()).await,
                Message::Binary(data) => {
                    // The protocol is JSON text; binary frames get the same parser
                    let text = String::from_utf8_lossy(&data);
                    session.handle_text(&state, &text).await
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                    Flow::Continue
                }
                Message::Ping(data) => {
                    let _ = try_deliver(&tx, Message::Pong(data));
                    Flow::Continue
                }
                Message::Close(frame) => {
                    tracing::info!(conn_id, reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(conn_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(conn_id, "WebSocket stream ended");
                break;
            }
        };

        if let Flow::Close { code, reason } = flow {
            let _ = try_deliver(
                &tx,
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
            );
            break;
        }
    }

    // Unregister first so no broadcast can target this connection any more
    session.close(&state);
    ping_handle.abort();
    let _ = ping_handle.await;

    // Let the writer flush queued frames (e.g. the auth error and its close)
    drop(session);
    drop(tx);
    let mut writer_handle = writer_handle;
    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer_handle).await.is_err() {
        tracing::debug!(conn_id, "Writer did not drain in time");
        writer_handle.abort();
    }

    tracing::info!(conn_id, "WebSocket connection closed");
}

/// Writer task: receives messages from the mpsc channel and forwards them to the WebSocket sink.
/// Stops after a Close frame or when every sender is gone.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
        if is_close {
            break;
        }
    }
    let _ = ws_sender.close().await;
}
