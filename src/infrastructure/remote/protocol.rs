//! Wire protocol for the external optimization service.
//!
//! Messages are length-delimited text-encoded JSON: an ASCII decimal
//! byte count terminated by `\n`, followed by exactly that many bytes
//! of UTF-8 JSON. One message per frame, one frame per message.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;

use super::error::{RemoteError, Result};

/// Algorithm selection block exchanged during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

/// One request to the optimization server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRequest {
    /// Procedure hash identifying the experiment this data belongs to.
    pub hash: String,
    /// Per-parameter value arrays keyed by name, one entry per batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, Vec<f64>>>,
    /// Per-objective value arrays keyed by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<BTreeMap<String, Vec<f64>>>,
    /// Optimization target descriptor, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<serde_json::Value>,
    pub batch_size: usize,
    pub n_batches: i64,
    /// Present only on the handshake request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<AlgorithmSpec>,
}

/// One reply from the optimization server: either a strategy/setup
/// payload or an exception message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteReply {
    /// Server-chosen strategy descriptor, persisted for provenance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Updated setup: per-parameter arrays keyed by name.
    #[serde(flatten)]
    pub setup: BTreeMap<String, Vec<f64>>,
}

/// Encode one message as a length-delimited frame.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("{}\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one frame. Returns `None` on a clean end of stream.
pub async fn read_frame(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<Vec<u8>>> {
    let mut header = String::new();
    let n = reader.read_line(&mut header).await?;
    if n == 0 {
        return Ok(None);
    }
    let len: usize = header
        .trim()
        .parse()
        .map_err(|_| RemoteError::BadFrame(format!("invalid length header {header:?}")))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_empty_fields() {
        let request = RemoteRequest {
            hash: "abc123".to_string(),
            parameters: None,
            result: None,
            target: None,
            batch_size: 1,
            n_batches: 1,
            algorithm: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("parameters"));
        assert!(!json.contains("exception"));
    }

    #[test]
    fn reply_flattens_setup_arrays() {
        let json = r#"{"strategy": {"name": "tpe"}, "param_a": [1.5], "param_b": [2.5]}"#;
        let reply: RemoteReply = serde_json::from_str(json).unwrap();
        assert!(reply.exception.is_none());
        assert_eq!(reply.setup["param_a"], vec![1.5]);
        assert_eq!(reply.setup["param_b"], vec![2.5]);
    }

    #[test]
    fn frame_carries_length_then_body() {
        let reply = RemoteReply {
            strategy: None,
            exception: Some("boom".to_string()),
            setup: Default::default(),
        };
        let frame = encode(&reply).unwrap();
        let newline = frame.iter().position(|&b| b == b'\n').unwrap();
        let len: usize = std::str::from_utf8(&frame[..newline])
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(frame.len(), newline + 1 + len);
    }
}
