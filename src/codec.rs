//! Payload encoding and the consumer-side message view.

use std::borrow::Cow;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::ser::{self, Impossible};
use serde::Serialize;

use crate::error::{NotificationError, Result};

/// How payloads are turned into message bodies.
///
/// `Json` is the canonical encoding and the default. `Bitcode` produces a
/// compact binary body; on text-only transports it travels base64-encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    #[default]
    Json,
    Bitcode,
}

impl Codec {
    /// Encode a payload, rejecting payloads that serialize to `null`.
    pub fn encode<T: Serialize>(&self, payload: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Json => {
                let value = serde_json::to_value(payload)
                    .map_err(|e| NotificationError::Encoding(e.to_string()))?;
                if value.is_null() {
                    return Err(NotificationError::NullPayload);
                }
                serde_json::to_vec(&value).map_err(|e| NotificationError::Encoding(e.to_string()))
            }
            Codec::Bitcode => {
                if is_null(payload) {
                    return Err(NotificationError::NullPayload);
                }
                bitcode::serialize(payload).map_err(|e| NotificationError::Encoding(e.to_string()))
            }
        }
    }

    /// Decode a body produced by [`Codec::encode`].
    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T> {
        match self {
            Codec::Json => {
                serde_json::from_slice(body).map_err(|e| NotificationError::Encoding(e.to_string()))
            }
            Codec::Bitcode => {
                bitcode::deserialize(body).map_err(|e| NotificationError::Encoding(e.to_string()))
            }
        }
    }

    /// Render a body for a transport that only carries text.
    pub fn to_text(&self, body: &[u8]) -> String {
        match self {
            Codec::Json => String::from_utf8_lossy(body).into_owned(),
            Codec::Bitcode => STANDARD.encode(body),
        }
    }

    /// Inverse of [`Codec::to_text`].
    pub fn from_text(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            Codec::Json => Ok(text.as_bytes().to_vec()),
            Codec::Bitcode => STANDARD
                .decode(text)
                .map_err(|e| NotificationError::Encoding(e.to_string())),
        }
    }
}

/// Whether a payload serializes to JSON `null`, without encoding it.
fn is_null<T: Serialize>(payload: &T) -> bool {
    matches!(payload.serialize(NullCheck), Ok(true))
}

/// Answers `true` for unit-like values. Compound values stop at their first
/// call with [`NotNull`].
struct NullCheck;

#[derive(Debug)]
struct NotNull;

impl fmt::Display for NotNull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value is not null")
    }
}

impl std::error::Error for NotNull {}

impl ser::Error for NotNull {
    fn custom<M: fmt::Display>(_msg: M) -> Self {
        NotNull
    }
}

macro_rules! scalars_are_not_null {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, _v: $ty) -> std::result::Result<bool, NotNull> {
                Ok(false)
            }
        )*
    };
}

impl ser::Serializer for NullCheck {
    type Ok = bool;
    type Error = NotNull;
    type SerializeSeq = Impossible<bool, NotNull>;
    type SerializeTuple = Impossible<bool, NotNull>;
    type SerializeTupleStruct = Impossible<bool, NotNull>;
    type SerializeTupleVariant = Impossible<bool, NotNull>;
    type SerializeMap = Impossible<bool, NotNull>;
    type SerializeStruct = Impossible<bool, NotNull>;
    type SerializeStructVariant = Impossible<bool, NotNull>;

    scalars_are_not_null!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
    );

    fn serialize_none(self) -> std::result::Result<bool, NotNull> {
        Ok(true)
    }

    fn serialize_some<V: ?Sized + Serialize>(self, value: &V) -> std::result::Result<bool, NotNull> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> std::result::Result<bool, NotNull> {
        Ok(true)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> std::result::Result<bool, NotNull> {
        Ok(true)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> std::result::Result<bool, NotNull> {
        Ok(false)
    }

    fn serialize_newtype_struct<V: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &V,
    ) -> std::result::Result<bool, NotNull> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<V: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &V,
    ) -> std::result::Result<bool, NotNull> {
        Ok(false)
    }

    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Self::SerializeSeq, NotNull> {
        Err(NotNull)
    }

    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self::SerializeTuple, NotNull> {
        Err(NotNull)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeTupleStruct, NotNull> {
        Err(NotNull)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeTupleVariant, NotNull> {
        Err(NotNull)
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Self::SerializeMap, NotNull> {
        Err(NotNull)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeStruct, NotNull> {
        Err(NotNull)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self::SerializeStructVariant, NotNull> {
        Err(NotNull)
    }
}

/// One message handed to a consumer callback.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Raw message body, already converted back from its transport form.
    pub body: Vec<u8>,
    /// The receiving resource: queue name/URL, JMS client id or consumer group.
    pub source: String,
    /// Record key, when the backend carries one.
    pub key: Option<String>,
    /// Log offset, when the backend carries one.
    pub offset: Option<u64>,
    codec: Codec,
}

impl Delivery {
    pub fn new(body: Vec<u8>, source: impl Into<String>, codec: Codec) -> Self {
        Self {
            body,
            source: source.into(),
            key: None,
            offset: None,
            codec,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Body as text, for consumers without a schema.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decode the body into a domain value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.codec.decode(&self.body)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}
