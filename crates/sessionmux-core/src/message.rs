//! Immutable message envelope.
//!
//! A [`StreamMessage`] is built once and never mutated. Rewriting a field goes
//! through [`StreamMessage::copy_from`], which starts a builder pre-filled with
//! the original's fields and leaves the original untouched.

use serde::{Deserialize, Serialize};

/// Envelope carried across a session: who sent it, where it is routed, and
/// an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    sender_id: Option<String>,
    qualifier: String,
    data: Option<Vec<u8>>,
}

impl StreamMessage {
    pub fn builder() -> StreamMessageBuilder {
        StreamMessageBuilder::default()
    }

    /// Builder pre-filled from `other`.
    pub fn copy_from(other: &Self) -> StreamMessageBuilder {
        StreamMessageBuilder {
            sender_id: other.sender_id.clone(),
            qualifier: other.qualifier.clone(),
            data: other.data.clone(),
        }
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender_id.as_deref()
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub const fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// Builder for [`StreamMessage`].
#[derive(Debug, Clone, Default)]
pub struct StreamMessageBuilder {
    sender_id: Option<String>,
    qualifier: String,
    data: Option<Vec<u8>>,
}

impl StreamMessageBuilder {
    #[must_use]
    pub fn sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    #[must_use]
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    #[must_use]
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn build(self) -> StreamMessage {
        StreamMessage {
            sender_id: self.sender_id,
            qualifier: self.qualifier,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_empty() {
        let msg = StreamMessage::builder().qualifier("greeting/hello").build();
        assert_eq!(msg.qualifier(), "greeting/hello");
        assert_eq!(msg.sender_id(), None);
        assert!(!msg.has_data());
    }

    #[test]
    fn copy_from_overrides_without_touching_original() {
        let original = StreamMessage::builder()
            .sender_id("client-7")
            .qualifier("greeting/hello")
            .data(b"hi".to_vec())
            .build();

        let copy = StreamMessage::copy_from(&original).sender_id("s1").build();

        assert_eq!(copy.sender_id(), Some("s1"));
        assert_eq!(copy.qualifier(), "greeting/hello");
        assert_eq!(copy.data(), Some(&b"hi"[..]));
        assert_eq!(original.sender_id(), Some("client-7"));
    }
}
