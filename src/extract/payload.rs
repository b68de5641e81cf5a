//! Candidate payload classification and decoding

use crate::error::ExtractionError;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

/// What a candidate string turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes carried inline
    Inline {
        /// Decoded bytes
        bytes: Vec<u8>,
        /// MIME type from a `data:` URI
        mime_type: Option<String>,
    },
    /// Bytes that live behind a URL or storage reference
    Remote(String),
}

/// Is `s` a reference the fetcher can follow
#[must_use]
pub fn is_reference(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("gs://")
}

/// Classify and decode a candidate string
///
/// `data:` URIs are unwrapped, references are passed through untouched,
/// everything else is decoded as base64.
pub fn classify(candidate: &str) -> Result<Payload, ExtractionError> {
    let trimmed = candidate.trim();

    if is_reference(trimmed) {
        return Ok(Payload::Remote(trimmed.to_string()));
    }

    if let Some(rest) = trimmed.strip_prefix("data:") {
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| ExtractionError::UnsupportedUri("data URI without payload".into()))?;
        let mut params = header.split(';');
        let mime = params.next().filter(|m| !m.is_empty()).map(str::to_string);
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(ExtractionError::UnsupportedUri(
                "data URI is not base64-encoded".into(),
            ));
        }
        return Ok(Payload::Inline {
            bytes: decode_base64(data)?,
            mime_type: mime,
        });
    }

    Ok(Payload::Inline {
        bytes: decode_base64(trimmed)?,
        mime_type: None,
    })
}

/// Decode standard or URL-safe base64, padded or not, ignoring whitespace
pub fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let mut first_error = None;
    for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        match engine.decode(&compact) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    Err(first_error.unwrap_or(base64::DecodeError::InvalidLength(compact.len())))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_pass_through() {
        assert_eq!(
            classify(" https://cdn.test/v.mp4 ").unwrap(),
            Payload::Remote("https://cdn.test/v.mp4".into())
        );
        assert_eq!(
            classify("gs://bucket/v.mp4").unwrap(),
            Payload::Remote("gs://bucket/v.mp4".into())
        );
        assert!(is_reference("HTTPS://cdn.test/v.mp4"));
        assert!(!is_reference("aHR0cHM6"));
    }

    #[test]
    fn test_data_uri_is_unwrapped() {
        let encoded = STANDARD.encode(b"hello world");
        let payload = classify(&format!("data:video/webm;base64,{encoded}")).unwrap();

        assert_eq!(
            payload,
            Payload::Inline {
                bytes: b"hello world".to_vec(),
                mime_type: Some("video/webm".into()),
            }
        );
    }

    #[test]
    fn test_data_uri_must_be_base64() {
        assert!(classify("data:text/plain,hello").is_err());
        assert!(classify("data:video/mp4;base64").is_err());
    }

    #[test]
    fn test_decode_accepts_common_alphabets() {
        let bytes: Vec<u8> = (0u8..=255).collect();

        for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
            let encoded = engine.encode(&bytes);
            assert_eq!(decode_base64(&encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_ignores_line_breaks() {
        let encoded = STANDARD.encode(vec![9u8; 120]);
        let wrapped = format!("{}\n{}", &encoded[..76], &encoded[76..]);

        assert_eq!(decode_base64(&wrapped).unwrap(), vec![9u8; 120]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_base64("not base64 at all!").is_err());
        assert!(matches!(
            classify("%%%%"),
            Err(ExtractionError::Decode(_))
        ));
    }
}
