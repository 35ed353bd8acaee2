use std::collections::HashMap;

use bytes::Bytes;
use dashmap::DashMap;

#[cfg(test)]
use mockall::automock;

use crate::errors::Result;

/// A single call argument. The http provider inspects the first argument to
/// decide how the outbound query is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Map(HashMap<String, String>),
    Str(String),
    Bytes(Bytes),
}

/// String attachment map carried on requests and responses. Concurrent-safe
/// and iterable; watcher tasks and the call path may touch it from different
/// tasks.
#[derive(Debug, Default)]
pub struct Attachments(DashMap<String, String>);

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<String> {
        self.0.get(key).map(|v| v.value().clone())
    }

    pub fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn for_each(
        &self,
        mut f: impl FnMut(&str, &str),
    ) {
        for entry in self.0.iter() {
            f(entry.key(), entry.value());
        }
    }
}

impl Clone for Attachments {
    fn clone(&self) -> Self {
        let out = Self::new();
        self.for_each(|k, v| out.set(k, v));
        out
    }
}

/// Body state of an inbound request. `Serialized` bytes are materialized
/// into the mode-specific shape through the [`Serialization`] hook before
/// the provider dispatches the call.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    None,
    /// Wire bytes that still need the serialization hook
    Serialized(Bytes),
    /// Raw request head and body for transparent proxying
    Proxy { header: Bytes, body: Bytes },
    /// A single materialized argument value
    Value(Argument),
}

/// The two deserialize-target shapes, chosen up-front from the call mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeserializeMode {
    /// Two byte buffers: raw header block and raw body
    Proxy,
    /// One opaque argument slot
    Rewrite,
}

/// Deserialization hook supplied by the serialization framework.
#[cfg_attr(test, automock)]
pub trait Serialization: Send + Sync {
    /// Splits wire bytes into the raw header block and raw body.
    fn deserialize_proxy(
        &self,
        data: &[u8],
    ) -> Result<(Bytes, Bytes)>;

    /// Materializes wire bytes into a single argument value.
    fn deserialize_value(
        &self,
        data: &[u8],
    ) -> Result<Argument>;
}

#[derive(Debug, Default)]
pub struct RpcRequest {
    pub method: String,
    pub request_id: u64,
    pub arguments: Vec<Argument>,
    pub attachments: Attachments,
    pub body: RequestBody,
}

impl RpcRequest {
    pub fn new(
        method: impl Into<String>,
        request_id: u64,
    ) -> Self {
        Self {
            method: method.into(),
            request_id,
            ..Default::default()
        }
    }

    pub fn attachment(
        &self,
        key: &str,
    ) -> Option<String> {
        self.attachments.get(key)
    }

    pub fn set_attachment(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.attachments.set(key, value);
    }

    /// Materializes a `Serialized` body into the shape `mode` requires.
    /// A body already in the target shape passes through untouched; bodies
    /// that never went through serialization are left to fail later in the
    /// mode-specific path.
    pub fn process_deserializable(
        &mut self,
        serialization: Option<&dyn Serialization>,
        mode: DeserializeMode,
    ) -> Result<()> {
        let data = match &self.body {
            RequestBody::Serialized(data) => data.clone(),
            _ => return Ok(()),
        };
        let serialization = serialization.ok_or_else(|| {
            crate::ProviderError::Deserialize("no serialization configured".to_string())
        })?;
        match mode {
            DeserializeMode::Proxy => {
                let (header, body) = serialization.deserialize_proxy(&data)?;
                self.body = RequestBody::Proxy { header, body };
            }
            DeserializeMode::Rewrite => {
                let value = serialization.deserialize_value(&data)?;
                if self.arguments.is_empty() {
                    self.arguments.push(value.clone());
                }
                self.body = RequestBody::Value(value);
            }
        }
        Ok(())
    }
}

/// Exception attached to a response instead of raising out of `call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub err_code: u16,
    pub err_type: u16,
    pub err_msg: String,
}

#[derive(Debug, Clone, Default)]
pub enum ResponseValue {
    #[default]
    None,
    /// Response body as text (rewrite mode)
    Text(String),
    /// `[header_bytes, body_bytes]` (transparent proxy mode)
    ByteFrames(Vec<Bytes>),
}

#[derive(Debug, Default)]
pub struct RpcResponse {
    pub request_id: u64,
    pub process_time_ms: i64,
    pub value: ResponseValue,
    pub exception: Option<Exception>,
    pub attachments: Attachments,
}

impl RpcResponse {
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            ..Default::default()
        }
    }

    pub fn set_attachment(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.attachments.set(key, value);
    }

    pub fn is_exception(&self) -> bool {
        self.exception.is_some()
    }
}
