//! Remote optimization service integration.

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{RemoteAlgorithmClient, RemoteSettings};
pub use error::RemoteError;
pub use protocol::{AlgorithmSpec, RemoteReply, RemoteRequest};
