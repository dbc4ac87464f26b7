//! Wire protocol between workers and the master
//!
//! Every message is a MessagePack document inside a 4-byte big-endian length
//! prefixed frame. A connection carries any number of request/response pairs;
//! the server answers each request with exactly one response, in order.

use crate::value::{Map, Value};
use crate::Result;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

/// Largest frame either side accepts (file payloads travel inline)
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Client to master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Run `fire_hook(event, **kwargs)` on the master
    FireHook {
        event: String,
        #[serde(default)]
        kwargs: Map,
        /// Wait for the dispatch and return its event-local data
        #[serde(default)]
        want_result: bool,
    },
    /// Liveness probe
    Ping,
    /// Stop the master once queued dispatches have drained
    Shutdown,
}

impl Request {
    pub fn fire(event: impl Into<String>, kwargs: Map, want_result: bool) -> Self {
        Request::FireHook {
            event: event.into(),
            kwargs,
            want_result,
        }
    }

    /// Short label for logging
    pub fn label(&self) -> &str {
        match self {
            Request::FireHook { event, .. } => event,
            Request::Ping => "ping",
            Request::Shutdown => "shutdown",
        }
    }
}

/// Master to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Request accepted
    Ack,
    /// Result of a dispatch the client asked to wait for
    Value(Value),
    Pong,
    /// The request could not be decoded or the dispatch failed
    Error(String),
}

/// Frame codec shared by the server and the client
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Serialize a message into a frame payload
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    Ok(Bytes::from(rmp_serde::to_vec_named(message)?))
}

/// Deserialize a frame payload
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(frame)?)
}
