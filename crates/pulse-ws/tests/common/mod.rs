//! Mock channel server for integration tests.
//!
//! Accepts WebSocket connections and plays a per-connection script:
//! stay open and echo heartbeats, close with a chosen code, or drop the
//! socket before the handshake completes.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Per-connection behavior.
#[derive(Clone)]
pub enum ServerScript {
    /// Send the given text frames after the handshake, then stay open,
    /// answering transport pings and replying to client ping messages with a
    /// heartbeat frame.
    Stay { greet: Vec<String> },
    /// Accept the handshake then immediately close with the given code.
    CloseWith { code: u16, reason: &'static str },
    /// Drop the TCP socket before completing the handshake.
    RefuseHandshake,
    /// Accept the TCP connection but never answer the WebSocket upgrade,
    /// leaving the handshake to stall until the client gives up.
    StallHandshake,
}

pub struct MockChannelServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    total: Arc<AtomicU32>,
    active: Arc<AtomicU32>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockChannelServer {
    pub async fn start(script: ServerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let total: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let active: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let total_clone = total.clone();
        let active_clone = active.clone();
        let received_clone = received.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let script = script.clone();
                        let total = total_clone.clone();
                        let active = active_clone.clone();
                        let received = received_clone.clone();
                        tokio::spawn(handle_connection(stream, script, total, active, received));
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            total,
            active,
            received,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted since start (including refused handshakes).
    pub fn total_connections(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    /// Connections currently open past the handshake.
    pub fn active_connections(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: ServerScript,
    total: Arc<AtomicU32>,
    active: Arc<AtomicU32>,
    received: Arc<Mutex<Vec<String>>>,
) {
    total.fetch_add(1, Ordering::SeqCst);

    if matches!(script, ServerScript::RefuseHandshake) {
        drop(stream);
        return;
    }

    if matches!(script, ServerScript::StallHandshake) {
        // Swallow the upgrade request without replying; hold the socket open
        // until the client closes it.
        let mut stream = stream;
        let mut buf = [0u8; 512];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };

    active.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws_stream.split();

    match script {
        ServerScript::CloseWith { code, reason } => {
            let _ = write
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                })))
                .await;
            // Drain until the close handshake completes.
            while let Some(msg) = read.next().await {
                if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
        }
        ServerScript::Stay { greet } => {
            for frame in greet {
                let _ = write.send(Message::Text(frame)).await;
            }
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        received.lock().await.push(text.clone());
                        if text.contains("\"ping\"") {
                            let _ = write
                                .send(Message::Text(r#"{"type":"heartbeat"}"#.to_string()))
                                .await;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        }
        ServerScript::RefuseHandshake | ServerScript::StallHandshake => unreachable!(),
    }

    active.fetch_sub(1, Ordering::SeqCst);
}
