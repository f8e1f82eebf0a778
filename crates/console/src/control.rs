use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use turret_protocol::{ClientMessage, ServerMessage};

/// What the control channel reports to the console task.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Message(ServerMessage),
    /// The socket dropped; a reconnect is underway.
    Disconnected,
}

enum Closed {
    /// Server ended the connection; reconnect.
    ByServer,
    /// The console is shutting down.
    Shutdown,
}

pub struct ControlChannel {
    url: String,
    tls: Arc<rustls::ClientConfig>,
}

impl ControlChannel {
    pub fn new(url: impl Into<String>, tls: Arc<rustls::ClientConfig>) -> Self {
        Self {
            url: url.into(),
            tls,
        }
    }

    /// Keep the control socket up until the console goes away, reconnecting
    /// with exponential backoff.
    pub async fn run(
        self,
        mut outbound: mpsc::Receiver<ClientMessage>,
        events: mpsc::Sender<ControlEvent>,
    ) {
        let initial_backoff = Duration::from_secs(2);
        let max_backoff = Duration::from_secs(60);
        let mut backoff = initial_backoff;

        loop {
            info!(url = %self.url, "Connecting to turret control channel");

            match self.connect_and_handle(&mut outbound, &events).await {
                Ok(Closed::Shutdown) => {
                    info!("Control channel closed");
                    break;
                }
                Ok(Closed::ByServer) => {
                    info!("Control channel closed by server");
                    backoff = initial_backoff;
                }
                Err(e) => {
                    warn!("Control channel error: {e:#}");
                }
            }

            if events.send(ControlEvent::Disconnected).await.is_err() {
                break;
            }
            info!("Reconnecting in {} seconds...", backoff.as_secs());
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    async fn connect_and_handle(
        &self,
        outbound: &mut mpsc::Receiver<ClientMessage>,
        events: &mpsc::Sender<ControlEvent>,
    ) -> anyhow::Result<Closed> {
        let connector = tokio_tungstenite::Connector::Rustls(Arc::clone(&self.tls));
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(65_536);
        let (ws_stream, _) = tokio_tungstenite::connect_async_tls_with_config(
            self.url.as_str(),
            Some(ws_config),
            false,
            Some(connector),
        )
        .await
        .context("WebSocket connection failed")?;

        info!("Connected to turret control channel");

        // Intents queued while offline are stale now
        let mut stale = 0usize;
        while outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Discarded intents queued while disconnected");
        }

        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerMessage>(&text) {
                                Ok(msg) => {
                                    if events.send(ControlEvent::Message(msg)).await.is_err() {
                                        return Ok(Closed::Shutdown);
                                    }
                                }
                                Err(e) => {
                                    warn!("Invalid control message: {e}");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(Closed::ByServer);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_tx.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(e).context("WebSocket read failed");
                        }
                    }
                }
                intent = outbound.recv() => {
                    match intent {
                        Some(intent) => {
                            let text = serde_json::to_string(&intent)?;
                            debug!(%text, "Sending intent");
                            ws_tx.send(Message::Text(text.into())).await?;
                        }
                        None => {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            return Ok(Closed::Shutdown);
                        }
                    }
                }
            }
        }
    }
}
