use bytes::Bytes;
use std::fmt::{Debug, Display};

/// One item pushed into a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    /// Appended as-is, without any encoding check.
    Binary(Bytes),
}

impl Payload {
    /// Render a value through its `Display` implementation.
    pub fn display<T: Display + ?Sized>(value: &T) -> Self {
        Payload::Text(value.to_string())
    }

    /// Render a value through its `Debug` implementation.
    pub fn debug<T: Debug + ?Sized>(value: &T) -> Self {
        Payload::Text(format!("{value:?}"))
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Payload::Text(text) => Bytes::from(text),
            Payload::Binary(bytes) => bytes,
        }
    }
}

/// Values accepted by `OutputBuffer::push`. `None` means "nothing to push".
pub trait IntoPayload {
    fn into_payload(self) -> Option<Payload>;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> Option<Payload> {
        Some(self)
    }
}

impl IntoPayload for &str {
    fn into_payload(self) -> Option<Payload> {
        Some(Payload::Text(self.to_owned()))
    }
}

impl IntoPayload for String {
    fn into_payload(self) -> Option<Payload> {
        Some(Payload::Text(self))
    }
}

impl IntoPayload for &String {
    fn into_payload(self) -> Option<Payload> {
        Some(Payload::Text(self.clone()))
    }
}

impl IntoPayload for Bytes {
    fn into_payload(self) -> Option<Payload> {
        Some(Payload::Binary(self))
    }
}

impl IntoPayload for Vec<u8> {
    fn into_payload(self) -> Option<Payload> {
        Some(Payload::Binary(Bytes::from(self)))
    }
}

impl IntoPayload for &[u8] {
    fn into_payload(self) -> Option<Payload> {
        Some(Payload::Binary(Bytes::copy_from_slice(self)))
    }
}

impl<const N: usize> IntoPayload for &[u8; N] {
    fn into_payload(self) -> Option<Payload> {
        Some(Payload::Binary(Bytes::copy_from_slice(self)))
    }
}

impl<T: IntoPayload> IntoPayload for Option<T> {
    fn into_payload(self) -> Option<Payload> {
        self.and_then(IntoPayload::into_payload)
    }
}

/// JSON strings are pushed unquoted, `null` is skipped, everything else is
/// pushed in its compact JSON form.
impl IntoPayload for serde_json::Value {
    fn into_payload(self) -> Option<Payload> {
        match self {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(Payload::Text(text)),
            other => Some(Payload::Text(other.to_string())),
        }
    }
}

impl IntoPayload for &serde_json::Value {
    fn into_payload(self) -> Option<Payload> {
        self.clone().into_payload()
    }
}
