//! Marshalling between structured values, wire frames and payload text.
//!
//! A [`Marshaller`] owns the wire encoding. The payload representation seen
//! by string handlers is JSON text. Conversions in either direction always go
//! through the structured value, so malformed input is rejected at the
//! boundary instead of being transcoded onto the wire.

use super::channel::Frame;
use crate::error::MarshalError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Pluggable codec between a structured value and its wire bytes.
pub trait Marshaller: Send + Sync {
    type Value: Send;

    fn encode(&self, value: &Self::Value) -> Result<Frame, MarshalError>;

    fn decode(&self, frame: &[u8]) -> Result<Self::Value, MarshalError>;
}

impl<M: Marshaller + ?Sized> Marshaller for Arc<M> {
    type Value = M::Value;

    fn encode(&self, value: &Self::Value) -> Result<Frame, MarshalError> {
        (**self).encode(value)
    }

    fn decode(&self, frame: &[u8]) -> Result<Self::Value, MarshalError> {
        (**self).decode(frame)
    }
}

/// Marshaller that puts serde values on the wire as JSON bytes.
pub struct JsonMarshaller<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> JsonMarshaller<T> {
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<T> Default for JsonMarshaller<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonMarshaller<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonMarshaller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonMarshaller")
    }
}

impl<T> Marshaller for JsonMarshaller<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    type Value = T;

    fn encode(&self, value: &T) -> Result<Frame, MarshalError> {
        serde_json::to_vec(value)
            .map(Frame::from)
            .map_err(|e| MarshalError::encode(e.to_string()))
    }

    fn decode(&self, frame: &[u8]) -> Result<T, MarshalError> {
        serde_json::from_slice(frame).map_err(|e| MarshalError::decode(e.to_string()))
    }
}

/// Parse payload text into a structured value.
pub fn parse_payload<V: DeserializeOwned>(payload: &str) -> Result<V, MarshalError> {
    serde_json::from_str(payload).map_err(|e| MarshalError::payload(e.to_string()))
}

/// Render a structured value as payload text.
pub fn render_payload<V: Serialize>(value: &V) -> Result<String, MarshalError> {
    serde_json::to_string(value).map_err(|e| MarshalError::payload(e.to_string()))
}

/// Payload text to wire frame: parse, then encode.
pub fn frame_from_payload<M>(marshaller: &M, payload: &str) -> Result<Frame, MarshalError>
where
    M: Marshaller + ?Sized,
    M::Value: DeserializeOwned,
{
    let value: M::Value = parse_payload(payload)?;
    marshaller.encode(&value)
}

/// Wire frame to payload text: decode, then render.
pub fn payload_from_frame<M>(marshaller: &M, frame: &[u8]) -> Result<String, MarshalError>
where
    M: Marshaller + ?Sized,
    M::Value: Serialize,
{
    let value = marshaller.decode(frame)?;
    render_payload(&value)
}
