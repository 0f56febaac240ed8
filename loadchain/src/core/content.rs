//! Resource content flowing through a loader chain.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// How a loader wants its input and output treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Input is decoded to a UTF-8 string.
    #[default]
    Text,
    /// Input is handed over as raw bytes.
    Raw,
}

/// A value passed between loaders: either text or a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Content {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(#[serde(with = "super::base64_bytes")] Vec<u8>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl Content {
    /// Returns the content as bytes without copying.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Returns the content as text, decoding bytes lossily.
    #[must_use]
    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Returns the text if this is text content.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }

    /// Consumes the content and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Consumes the content and returns it as text.
    ///
    /// Invalid UTF-8 sequences are replaced with U+FFFD.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
            },
        }
    }

    /// Converts the content into the representation a loader expects.
    #[must_use]
    pub fn into_mode(self, mode: ContentMode) -> Self {
        match (mode, self) {
            (ContentMode::Text, content @ Self::Text(_)) => content,
            (ContentMode::Text, content) => Self::Text(content.into_text()),
            (ContentMode::Raw, content @ Self::Bytes(_)) => content,
            (ContentMode::Raw, content) => Self::Bytes(content.into_bytes()),
        }
    }

    /// Returns the mode this content is currently held in.
    #[must_use]
    pub fn mode(&self) -> ContentMode {
        match self {
            Self::Text(_) => ContentMode::Text,
            Self::Bytes(_) => ContentMode::Raw,
        }
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}
