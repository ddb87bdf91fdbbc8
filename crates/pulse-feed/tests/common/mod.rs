//! Mock data sources for feed integration tests.

use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Start a mock push channel. Each connection receives `greet` text frames,
/// then either a close frame with `close_code` or an open session that
/// answers heartbeat pings. Returns a `{key}`-templated endpoint.
pub async fn start_channel(greet: Vec<String>, close_code: Option<u16>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let greet = greet.clone();
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();

                for frame in greet {
                    if write.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }

                if let Some(code) = close_code {
                    let _ = write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: Cow::from("scripted close"),
                        })))
                        .await;
                    while let Some(Ok(_)) = read.next().await {}
                    return;
                }

                while let Some(Ok(msg)) = read.next().await {
                    match msg {
                        Message::Text(text) if text.contains("\"ping\"") => {
                            let beat = format!(
                                r#"{{"type":"heartbeat","timestamp":"{}"}}"#,
                                chrono::Utc::now().to_rfc3339()
                            );
                            if write.send(Message::Text(beat)).await.is_err() {
                                return;
                            }
                        }
                        Message::Ping(data) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Message::Close(_) => return,
                        _ => {}
                    }
                }
            });
        }
    });

    format!("ws://{addr}/{{key}}")
}

/// Start a mock channel that accepts TCP connections but never completes the
/// WebSocket handshake. Returns the endpoint and a connection-attempt counter.
pub async fn start_refusing_channel() -> (String, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    (format!("ws://{addr}/{{key}}"), attempts)
}

/// Start a mock poll endpoint serving `body` as JSON to every request.
/// Returns a `{key}`-templated endpoint.
pub async fn start_poll(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}/{{key}}")
}
