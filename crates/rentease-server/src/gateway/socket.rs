//! WebSocket transport for the gateway.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use rentease_shared::constants::HARD_MESSAGE_LIMIT;

use super::Gateway;

/// Room for the envelope around a payload at the hard limit.
const FRAME_SLACK: usize = 64 * 1024;

pub async fn ws_handler(ws: WebSocketUpgrade, State(gateway): State<Gateway>) -> Response {
    ws.max_message_size(HARD_MESSAGE_LIMIT + FRAME_SLACK)
        .max_frame_size(HARD_MESSAGE_LIMIT + FRAME_SLACK)
        .on_upgrade(move |socket| run_connection(gateway, socket))
}

async fn run_connection(gateway: Gateway, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (mut session, mut rx) = gateway.open().await;
    let connection = session.connection();

    // Outbound: drain the connection's queue into the socket until the hub
    // drops the sender or the peer goes away.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(conn = %connection, error = %e, "Failed to encode event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => break,
            Ok(frame) => match event_text(&frame) {
                Some(text) => gateway.handle_text(&mut session, text).await,
                None => debug!(conn = %connection, "Ignoring non-text frame"),
            },
            // Includes frames over the transport limit, which end the
            // connection without an `error` event.
            Err(e) => {
                debug!(conn = %connection, error = %e, "Socket read failed");
                break;
            }
        }
    }

    gateway.close(&mut session).await;
    if let Err(e) = writer.await {
        warn!(conn = %connection, error = %e, "Writer task failed");
    }
}

/// Only text frames carry events; binary, ping and pong frames do not.
fn event_text(frame: &WsMessage) -> Option<&str> {
    match frame {
        WsMessage::Text(text) => Some(text.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_text_frames_carry_events() {
        let join = r#"{"event":"join","data":"u1"}"#;
        assert_eq!(event_text(&WsMessage::Text(join.to_string())), Some(join));
        assert_eq!(event_text(&WsMessage::Binary(join.as_bytes().to_vec())), None);
        assert_eq!(event_text(&WsMessage::Ping(Vec::new())), None);
    }
}
