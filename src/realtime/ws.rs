//! WebSocket transport for the realtime channel.
//!
//! # Data Flow
//! ```text
//! client ── {userId, token} ──▶ hello ──▶ register connection
//! client ◀── {success, userId} ─┘
//! client ◀── {event, data} ──── pump loop (events from the broadcaster)
//! ```
//!
//! Close frames and transport errors unregister the connection; clients
//! re-register on reconnect.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use crate::realtime::broadcaster::Broadcaster;

/// First message a client must send after connecting.
#[derive(Debug, Deserialize)]
struct Hello {
    #[serde(rename = "userId")]
    user_id: String,
    token: String,
}

/// Drive one accepted WebSocket until it closes.
pub async fn serve_connection(socket: WebSocket, broadcaster: Broadcaster) {
    let (mut sink, mut stream) = socket.split();

    // Wait for the hello frame
    let hello = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<Hello>(&text) {
                Ok(hello) if !hello.user_id.is_empty() && !hello.token.is_empty() => break hello,
                _ => {
                    let _ = sink
                        .send(Message::Text(
                            json!({"success": false, "error": "invalid hello"}).to_string().into(),
                        ))
                        .await;
                    return;
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            _ => return,
        }
    };

    let (conn_id, mut events) = broadcaster.register(&hello.user_id);

    let ack = json!({"success": true, "userId": hello.user_id});
    if sink.send(Message::Text(ack.to_string().into())).await.is_err() {
        broadcaster.unregister(conn_id);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if sink.send(Message::Text(event.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    // Broadcaster dropped the sender (connection reaped)
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Clients only ever send the hello; ignore the rest
                    Some(Ok(_)) => continue,
                }
            }
        }
    }

    broadcaster.unregister(conn_id);
}
