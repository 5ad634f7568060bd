//! TCP client for the external optimization service.
//!
//! One persistent duplex connection. A spawned receiver task owns the
//! read half and drains frames into a channel; the request path writes
//! a frame and then blocks on that channel with a bounded wait-and-retry
//! loop. Correlation is implicit: the client takes `&mut self` for every
//! request, so exactly one request is outstanding at a time and replies
//! pair up by arrival order. Disconnecting shuts the socket down and
//! awaits the receiver task, guaranteeing no orphaned reads.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::{RemoteError, Result};
use super::protocol::{self, AlgorithmSpec, RemoteReply, RemoteRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub address: String,
    /// Wait per receive attempt before retrying.
    pub reply_timeout_ms: u64,
    /// Receive attempts before the call fails loudly.
    pub max_retries: usize,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:12111".to_string(),
            reply_timeout_ms: 1000,
            max_retries: 60,
        }
    }
}

pub struct RemoteAlgorithmClient {
    settings: RemoteSettings,
    writer: OwnedWriteHalf,
    replies: mpsc::UnboundedReceiver<RemoteReply>,
    receiver: JoinHandle<()>,
}

impl RemoteAlgorithmClient {
    /// Connect and spawn the background receiver.
    pub async fn connect(settings: RemoteSettings) -> Result<Self> {
        let stream = TcpStream::connect(&settings.address)
            .await
            .map_err(|source| RemoteError::Connect {
                address: settings.address.clone(),
                source,
            })?;
        let (read_half, writer) = stream.into_split();
        let (tx, replies) = mpsc::unbounded_channel();

        let receiver = tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                match protocol::read_frame(&mut reader).await {
                    Ok(Some(body)) => match serde_json::from_slice::<RemoteReply>(&body) {
                        Ok(reply) => {
                            if tx.send(reply).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Discarding undecodable reply frame");
                        }
                    },
                    Ok(None) => {
                        tracing::debug!("Optimization server closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Receive loop terminated");
                        break;
                    }
                }
            }
        });

        tracing::info!(address = %settings.address, "Connected to optimization server");
        Ok(Self {
            settings,
            writer,
            replies,
            receiver,
        })
    }

    /// Handshake: announce the algorithm and receive the server-chosen
    /// strategy descriptor, kept for provenance.
    pub async fn initialize(
        &mut self,
        hash: &str,
        algorithm: AlgorithmSpec,
    ) -> Result<serde_json::Value> {
        let request = RemoteRequest {
            hash: hash.to_string(),
            parameters: None,
            result: None,
            target: None,
            batch_size: 0,
            n_batches: 0,
            algorithm: Some(algorithm),
        };
        let reply = self.request(&request).await?;
        reply
            .strategy
            .ok_or_else(|| RemoteError::BadFrame("handshake reply without strategy".to_string()))
    }

    /// Send one request and wait for its correlated reply.
    pub async fn request(&mut self, request: &RemoteRequest) -> Result<RemoteReply> {
        let frame = protocol::encode(request)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        tracing::debug!(hash = %request.hash, bytes = frame.len(), "Request sent");

        let wait = Duration::from_millis(self.settings.reply_timeout_ms);
        for attempt in 1..=self.settings.max_retries.max(1) {
            match tokio::time::timeout(wait, self.replies.recv()).await {
                Ok(Some(reply)) => {
                    if let Some(message) = reply.exception {
                        return Err(RemoteError::ServerException(message));
                    }
                    return Ok(reply);
                }
                Ok(None) => return Err(RemoteError::Closed),
                Err(_) => {
                    tracing::debug!(attempt, "No reply yet, retrying");
                }
            }
        }
        Err(RemoteError::Timeout {
            attempts: self.settings.max_retries,
            wait_ms: self.settings.reply_timeout_ms,
        })
    }

    /// Close the socket and join the receiver task.
    pub async fn disconnect(mut self) -> Result<()> {
        self.writer.shutdown().await?;
        self.replies.close();
        if let Err(e) = self.receiver.await {
            tracing::warn!(error = %e, "Receiver task ended abnormally");
        }
        tracing::info!(address = %self.settings.address, "Disconnected from optimization server");
        Ok(())
    }
}
