//! File name templating for emitted files.
//!
//! Supported tokens:
//!
//! | Token | Replacement |
//! |-------|-------------|
//! | `[name]` | resource base name without extension |
//! | `[ext]` | resource extension without the dot |
//! | `[path]` | resource directory with a trailing `/` |
//! | `[query]` | resource query including `?` |
//! | `[hash]`, `[contenthash]` | digest of the emitted content |
//! | `[<type>:hash:<digest>:<length>]` | digest with explicit hash type, encoding and length |
//!
//! Anything else in brackets is left untouched.

use crate::core::split_resource;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use md5::Md5;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;

/// Hash algorithm used for `[hash]` tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFunction {
    /// MD5.
    #[default]
    Md5,
    /// SHA-256.
    Sha256,
}

impl HashFunction {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    fn digest(self, content: &[u8]) -> Vec<u8> {
        match self {
            Self::Md5 => Md5::digest(content).to_vec(),
            Self::Sha256 => Sha256::digest(content).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestEncoding {
    Hex,
    Base64,
    Base64Url,
}

impl DigestEncoding {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "hex" => Some(Self::Hex),
            "base64" => Some(Self::Base64),
            "base64url" => Some(Self::Base64Url),
            _ => None,
        }
    }

    fn encode(self, digest: &[u8]) -> String {
        match self {
            Self::Hex => hex::encode(digest),
            Self::Base64 => STANDARD_NO_PAD.encode(digest),
            Self::Base64Url => URL_SAFE_NO_PAD.encode(digest),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HashToken {
    function: Option<HashFunction>,
    encoding: DigestEncoding,
    length: Option<usize>,
}

impl HashToken {
    /// Parses `[type:]hash[:digest][:length]`.
    fn parse(token: &str) -> Option<Self> {
        let mut parts = token.split(':').peekable();
        let mut function = None;

        let first = parts.next()?;
        if !is_hash_keyword(first) {
            function = Some(HashFunction::parse(first)?);
            if !is_hash_keyword(parts.next()?) {
                return None;
            }
        }

        let mut encoding = DigestEncoding::Hex;
        if let Some(next) = parts.peek() {
            if let Some(parsed) = DigestEncoding::parse(next) {
                encoding = parsed;
                parts.next();
            }
        }

        let length = match parts.next() {
            Some(raw) => Some(raw.parse::<usize>().ok().filter(|len| *len > 0)?),
            None => None,
        };

        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            function,
            encoding,
            length,
        })
    }

    fn render(self, default: HashFunction, content: &[u8]) -> String {
        let digest = self.function.unwrap_or(default).digest(content);
        let mut encoded = self.encoding.encode(&digest);
        if let Some(length) = self.length {
            encoded.truncate(length);
        }
        encoded
    }
}

fn is_hash_keyword(part: &str) -> bool {
    part == "hash" || part == "contenthash"
}

#[allow(clippy::expect_used)]
fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([A-Za-z0-9:]+)\]").expect("token pattern is valid"))
}

/// Resolves a file name template against a resource and the emitted content.
#[must_use]
pub fn interpolate_name(
    template: &str,
    resource_id: &str,
    content: &[u8],
    hash_function: HashFunction,
) -> String {
    let (path, query) = split_resource(resource_id);
    let file = Path::new(path);

    let name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = file
        .parent()
        .map(|parent| parent.to_string_lossy().into_owned())
        .filter(|parent| !parent.is_empty())
        .map(|parent| format!("{parent}/"))
        .unwrap_or_default();

    token_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let token = &caps[1];
            match token {
                "name" => name.clone(),
                "ext" => ext.clone(),
                "path" => dir.clone(),
                "query" => query.to_string(),
                _ => match HashToken::parse(token) {
                    Some(hash) => hash.render(hash_function, content),
                    None => caps[0].to_string(),
                },
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MD5_OF_HELLO: &str = "5d41402abc4b2a76b9719d911017c592";

    fn interpolate(template: &str) -> String {
        interpolate_name(template, "src/img/logo.png?size=2", b"hello", HashFunction::Md5)
    }

    #[test]
    fn test_name_ext_path_query() {
        assert_eq!(interpolate("[path][name].[ext]"), "src/img/logo.png");
        assert_eq!(interpolate("[name][query]"), "logo?size=2");
    }

    #[test]
    fn test_default_hash_is_full_md5_hex() {
        assert_eq!(interpolate("[hash]"), MD5_OF_HELLO);
        assert_eq!(interpolate("[contenthash]"), MD5_OF_HELLO);
    }

    #[test]
    fn test_hash_length() {
        assert_eq!(interpolate("[name].[hash:8].[ext]"), "logo.5d41402a.png");
    }

    #[test]
    fn test_explicit_hash_type_and_digest() {
        let sha_hex = hex::encode(Sha256::digest(b"hello"));
        assert_eq!(interpolate("[sha256:hash]"), sha_hex);
        assert_eq!(interpolate("[sha256:hash:hex:6]"), &sha_hex[..6]);

        let md5_b64 = STANDARD_NO_PAD.encode(Md5::digest(b"hello"));
        assert_eq!(interpolate("[md5:contenthash:base64]"), md5_b64);
    }

    #[test]
    fn test_configured_default_function() {
        let name = interpolate_name("[hash]", "a.txt", b"hello", HashFunction::Sha256);
        assert_eq!(name, hex::encode(Sha256::digest(b"hello")));
    }

    #[test]
    fn test_unknown_tokens_pass_through() {
        assert_eq!(interpolate("[id]-[name]"), "[id]-logo");
        assert_eq!(interpolate("[crc32:hash]"), "[crc32:hash]");
        assert_eq!(interpolate("[hash:zero:0]"), "[hash:zero:0]");
        assert_eq!(interpolate("[ name ]"), "[ name ]");
    }

    #[test]
    fn test_resource_without_directory_or_extension() {
        let name = interpolate_name("[path][name].[ext]", "Makefile", b"", HashFunction::Md5);
        assert_eq!(name, "Makefile.");
    }
}
