//! Payload codecs: turn a message's raw bytes into a domain value.
//!
//! The engine never interprets payloads.  A caller registers one
//! [`PayloadCodec`] per schema under a type tag, and the tag is resolved to
//! a codec once, when a trace is opened.  An unregistered tag fails with
//! [`TraceError::UnknownTypeTag`]; there is no fallback codec.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tracedex::codec::{CodecRegistry, JsonCodec};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct GroundTruth { timestamp: u64 }
//!
//! let mut registry = CodecRegistry::new();
//! registry.register("GroundTruth", JsonCodec::<GroundTruth>::new());
//! let gt = registry.decode("GroundTruth", br#"{"timestamp":7}"#)?;
//! assert_eq!(gt, GroundTruth { timestamp: 7 });
//! # Ok::<(), tracedex::TraceError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::error::{Result, TraceError};

/// Tag under which [`CodecRegistry::raw`] registers [`RawCodec`].
pub const RAW_TAG: &str = "raw";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait PayloadCodec<M>: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> std::result::Result<M, CodecError>;
    fn encode(&self, message: &M) -> std::result::Result<Vec<u8>, CodecError>;
}

// ── Built-in codecs ──────────────────────────────────────────────────────────

/// Payload bytes passed through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl PayloadCodec<Vec<u8>> for RawCodec {
    fn decode(&self, bytes: &[u8]) -> std::result::Result<Vec<u8>, CodecError> { Ok(bytes.to_vec()) }
    fn encode(&self, message: &Vec<u8>) -> std::result::Result<Vec<u8>, CodecError> { Ok(message.clone()) }
}

/// UTF-8 JSON payloads mapped onto any `serde` type.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonCodec<{}>", std::any::type_name::<T>())
    }
}

impl<T: Serialize + DeserializeOwned> PayloadCodec<T> for JsonCodec<T> {
    fn decode(&self, bytes: &[u8]) -> std::result::Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
    fn encode(&self, message: &T) -> std::result::Result<Vec<u8>, CodecError> {
        serde_json::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Type tag → codec lookup for one domain message type `M`.
pub struct CodecRegistry<M> {
    codecs: HashMap<String, Arc<dyn PayloadCodec<M>>>,
}

impl<M> CodecRegistry<M> {
    pub fn new() -> Self {
        Self { codecs: HashMap::new() }
    }

    /// Register `codec` under `tag`, replacing any previous entry.
    pub fn register<C>(&mut self, tag: impl Into<String>, codec: C) -> &mut Self
    where
        C: PayloadCodec<M> + 'static,
    {
        self.codecs.insert(tag.into(), Arc::new(codec));
        self
    }

    pub fn resolve(&self, tag: &str) -> Result<Arc<dyn PayloadCodec<M>>> {
        self.codecs
            .get(tag)
            .cloned()
            .ok_or_else(|| TraceError::UnknownTypeTag(tag.to_owned()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.codecs.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn decode(&self, tag: &str, bytes: &[u8]) -> Result<M> {
        self.resolve(tag)?
            .decode(bytes)
            .map_err(TraceError::from)
    }

    pub fn encode(&self, tag: &str, message: &M) -> Result<Vec<u8>> {
        self.resolve(tag)?
            .encode(message)
            .map_err(TraceError::from)
    }
}

impl<M> Default for CodecRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry<Vec<u8>> {
    /// Registry holding only [`RawCodec`] under [`RAW_TAG`].
    pub fn raw() -> Self {
        let mut registry = Self::new();
        registry.register(RAW_TAG, RawCodec);
        registry
    }
}
