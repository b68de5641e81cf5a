//! The six candidate-locating strategies
//!
//! Each strategy looks at one poll response and either points at a string
//! that may hold the artifact or reports nothing. None of them decode,
//! download or log: that happens once, in the chain driver.

use crate::types::SourceStrategy;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Keys under which a field may wrap its payload in an object
/// (`{"video": {"bytesBase64Encoded": "..."}}`, `{"video": {"gcsUri": "gs://..."}}`)
const PAYLOAD_KEYS: &[&str] = &["bytesBase64Encoded", "gcsUri", "uri", "url", "data"];

/// Keys that declare a prediction's content type
pub(crate) const MIME_KEYS: &[&str] = &["mimeType", "mime_type", "contentType"];

/// Compiled pattern size cap for the base64 scan
const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

/// A string that may hold artifact bytes or point at them
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// The raw string
    pub value: Cow<'a, str>,
    /// Strategy that found it
    pub source: SourceStrategy,
    /// Content type declared next to the candidate
    pub mime_type: Option<String>,
}

impl<'a> Candidate<'a> {
    fn borrowed(value: &'a str, source: SourceStrategy) -> Self {
        Self {
            value: Cow::Borrowed(value),
            source,
            mime_type: None,
        }
    }
}

/// One link in the extraction chain
pub trait ExtractionStrategy: Send + Sync {
    /// Which strategy this is
    fn kind(&self) -> SourceStrategy;

    /// Locate a candidate in `response`, or `None` if this strategy sees nothing
    fn attempt<'a>(&self, response: &'a Value) -> Option<Candidate<'a>>;
}

/// Non-empty string held by `value`, either directly or under a payload key
fn payload_string(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Object(map) => PAYLOAD_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|v| v.as_str().filter(|s| !s.trim().is_empty())),
        _ => None,
    }
}

/// Follow a dotted path (`content.video`) through nested objects
fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn lookup_object_path<'a>(object: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = object.get(segments.next()?)?;
    segments.try_fold(first, |current, segment| current.get(segment))
}

/// First entry of the `predictions` array
pub(crate) fn first_prediction(response: &Value) -> Option<&Value> {
    response.get("predictions")?.as_array()?.first()
}

/// Declared `video/*` or `image/*` content type of an object
pub(crate) fn declared_mime(object: &Map<String, Value>) -> Option<&str> {
    MIME_KEYS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|mime| mime.starts_with("video/") || mime.starts_with("image/"))
}

/// Does `s` look like JSON text rather than a payload
fn looks_structured(s: &str) -> bool {
    s.trim_start().starts_with(['{', '['])
}

/// 1. Well-known top-level fields
pub struct DirectField {
    fields: Vec<String>,
}

impl DirectField {
    /// Check `fields` in order
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl ExtractionStrategy for DirectField {
    fn kind(&self) -> SourceStrategy {
        SourceStrategy::DirectField
    }

    fn attempt<'a>(&self, response: &'a Value) -> Option<Candidate<'a>> {
        self.fields
            .iter()
            .filter_map(|field| response.get(field.as_str()))
            .find_map(payload_string)
            .map(|s| Candidate::borrowed(s, self.kind()))
    }
}

/// 2. Priority list of sub-fields on the first prediction
pub struct PredictionField {
    fields: Vec<String>,
}

impl PredictionField {
    /// Check `fields` (dotted paths allowed) in order
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl ExtractionStrategy for PredictionField {
    fn kind(&self) -> SourceStrategy {
        SourceStrategy::PredictionField
    }

    fn attempt<'a>(&self, response: &'a Value) -> Option<Candidate<'a>> {
        let prediction = first_prediction(response)?;
        self.fields
            .iter()
            .filter_map(|field| lookup_path(prediction, field))
            .find_map(payload_string)
            .map(|s| Candidate::borrowed(s, self.kind()))
    }
}

/// 3. Longest string on a prediction that declares a media MIME type
///
/// Only fires when none of the known prediction fields hold anything, so it
/// never competes with [`PredictionField`].
pub struct MimeDeclaredScan {
    known_fields: Vec<String>,
    min_len: usize,
}

impl MimeDeclaredScan {
    /// Scan for strings longer than `min_len`, skipping `known_fields`
    pub fn new(known_fields: Vec<String>, min_len: usize) -> Self {
        Self {
            known_fields,
            min_len,
        }
    }
}

impl ExtractionStrategy for MimeDeclaredScan {
    fn kind(&self) -> SourceStrategy {
        SourceStrategy::MimeDeclaredScan
    }

    fn attempt<'a>(&self, response: &'a Value) -> Option<Candidate<'a>> {
        let predictions = response.get("predictions")?.as_array()?;

        predictions.iter().filter_map(Value::as_object).find_map(|prediction| {
            let mime = declared_mime(prediction)?;

            let known_hit = self.known_fields.iter().any(|field| {
                lookup_object_path(prediction, field)
                    .and_then(payload_string)
                    .is_some()
            });
            if known_hit {
                return None;
            }

            prediction
                .iter()
                .filter(|(key, _)| !MIME_KEYS.contains(&key.as_str()))
                .filter_map(|(_, v)| v.as_str())
                .filter(|s| s.len() > self.min_len)
                .max_by_key(|s| s.len())
                .map(|s| Candidate {
                    value: Cow::Borrowed(s),
                    source: self.kind(),
                    mime_type: Some(mime.to_string()),
                })
        })
    }
}

/// 4. The response body is itself a long string
pub struct WholeResponseString {
    min_len: usize,
}

impl WholeResponseString {
    /// Accept bodies longer than `min_len`
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl ExtractionStrategy for WholeResponseString {
    fn kind(&self) -> SourceStrategy {
        SourceStrategy::WholeResponseString
    }

    fn attempt<'a>(&self, response: &'a Value) -> Option<Candidate<'a>> {
        response
            .as_str()
            .filter(|s| s.trim().len() > self.min_len)
            .map(|s| Candidate::borrowed(s, self.kind()))
    }
}

/// 5. Longest base64-alphabet run anywhere in the serialized response
pub struct GlobalBase64Scan {
    pattern: Option<Regex>,
    min_run: usize,
}

impl GlobalBase64Scan {
    /// Consider runs of at least `min_run` characters
    pub fn new(min_run: usize) -> Self {
        let pattern = regex::RegexBuilder::new(r"[A-Za-z0-9+/_-]+={0,2}")
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| tracing::warn!(error = %e, "base64 scan pattern failed to compile"))
            .ok();
        Self { pattern, min_run }
    }
}

impl ExtractionStrategy for GlobalBase64Scan {
    fn kind(&self) -> SourceStrategy {
        SourceStrategy::GlobalBase64Scan
    }

    fn attempt<'a>(&self, response: &'a Value) -> Option<Candidate<'a>> {
        let pattern = self.pattern.as_ref()?;
        let text = serde_json::to_string(response).ok()?;

        pattern
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|run| run.len() >= self.min_run)
            .max_by_key(|run| run.len())
            .map(|run| Candidate {
                value: Cow::Owned(run.to_string()),
                source: self.kind(),
                mime_type: None,
            })
    }
}

/// 6. Depth-first walk for the first large unstructured string
pub struct RecursiveWalk {
    min_len: usize,
}

impl RecursiveWalk {
    /// Accept strings longer than `min_len`
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    fn walk<'a>(&self, value: &'a Value) -> Option<&'a str> {
        match value {
            Value::String(s) if s.len() > self.min_len && !looks_structured(s) => Some(s),
            Value::Array(items) => items.iter().find_map(|v| self.walk(v)),
            Value::Object(map) => map.values().find_map(|v| self.walk(v)),
            _ => None,
        }
    }
}

impl ExtractionStrategy for RecursiveWalk {
    fn kind(&self) -> SourceStrategy {
        SourceStrategy::RecursiveWalk
    }

    fn attempt<'a>(&self, response: &'a Value) -> Option<Candidate<'a>> {
        self.walk(response)
            .map(|s| Candidate::borrowed(s, self.kind()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn long(c: char, n: usize) -> String {
        std::iter::repeat_n(c, n).collect()
    }

    #[test]
    fn test_direct_field_reads_string_or_wrapped_payload() {
        let strategy = DirectField::new(vec!["video".into()]);

        let plain = json!({ "video": "QUJD" });
        let hit = strategy.attempt(&plain).unwrap();
        assert_eq!(hit.value, "QUJD");
        assert_eq!(hit.source, SourceStrategy::DirectField);

        let nested = json!({ "video": { "gcsUri": "gs://b/o.mp4" } });
        let wrapped = strategy.attempt(&nested).unwrap();
        assert_eq!(wrapped.value, "gs://b/o.mp4");

        assert!(strategy.attempt(&json!({ "video": "" })).is_none());
        assert!(strategy.attempt(&json!({ "other": "QUJD" })).is_none());
    }

    #[test]
    fn test_prediction_field_respects_priority_and_dotted_paths() {
        let strategy = PredictionField::new(vec![
            "video".into(),
            "content.video".into(),
            "bytes".into(),
        ]);

        let response = json!({ "predictions": [{ "bytes": "second", "content": { "video": "first" } }] });
        assert_eq!(strategy.attempt(&response).unwrap().value, "first");

        // Only the first prediction is consulted
        let later = json!({ "predictions": [{}, { "video": "ignored" }] });
        assert!(strategy.attempt(&later).is_none());
        assert!(strategy.attempt(&json!({ "predictions": [] })).is_none());
    }

    #[test]
    fn test_mime_scan_picks_longest_remaining_string() {
        let strategy = MimeDeclaredScan::new(vec!["video".into()], 10);
        let payload = long('A', 50);
        let response = json!({
            "predictions": [{
                "mimeType": "video/mp4",
                "caption": "a short caption here",
                "blob": payload,
            }]
        });

        let hit = strategy.attempt(&response).unwrap();
        assert_eq!(hit.value, payload);
        assert_eq!(hit.mime_type.as_deref(), Some("video/mp4"));
    }

    #[test]
    fn test_mime_scan_stands_down_when_known_field_present() {
        let strategy = MimeDeclaredScan::new(vec!["video".into()], 10);
        let response = json!({
            "predictions": [{ "mimeType": "video/mp4", "video": "x", "blob": long('A', 50) }]
        });

        assert!(strategy.attempt(&response).is_none());
    }

    #[test]
    fn test_mime_scan_requires_media_mime() {
        let strategy = MimeDeclaredScan::new(vec![], 10);
        let response = json!({ "predictions": [{ "mimeType": "text/plain", "blob": long('A', 50) }] });

        assert!(strategy.attempt(&response).is_none());
    }

    #[test]
    fn test_whole_response_string() {
        let strategy = WholeResponseString::new(10);

        assert!(strategy.attempt(&json!(long('B', 11))).is_some());
        assert!(strategy.attempt(&json!(long('B', 10))).is_none());
        assert!(strategy.attempt(&json!({ "a": long('B', 50) })).is_none());
    }

    #[test]
    fn test_global_scan_takes_longest_run() {
        let strategy = GlobalBase64Scan::new(20);
        let short = long('a', 25);
        let longest = format!("{}==", long('Z', 40));
        let response = json!({ "x": short, "deep": { "y": longest } });

        let hit = strategy.attempt(&response).unwrap();
        assert_eq!(hit.value, longest);
        assert!(matches!(hit.value, Cow::Owned(_)));
    }

    #[test]
    fn test_global_scan_ignores_short_runs() {
        let strategy = GlobalBase64Scan::new(100);
        assert!(strategy.attempt(&json!({ "x": long('a', 99) })).is_none());
    }

    #[test]
    fn test_recursive_walk_skips_structured_text() {
        let strategy = RecursiveWalk::new(10);
        let structured = format!("{{\"inner\": \"{}\"}}", long('c', 20));
        let payload = long('d', 20);
        let response = json!({
            "a": { "b": [1, structured] },
            "z": [{ "deep": payload }],
        });

        assert_eq!(strategy.attempt(&response).unwrap().value, payload);
    }

    #[test]
    fn test_strategies_report_their_kind() {
        let kinds: Vec<SourceStrategy> = vec![
            DirectField::new(vec![]).kind(),
            PredictionField::new(vec![]).kind(),
            MimeDeclaredScan::new(vec![], 0).kind(),
            WholeResponseString::new(0).kind(),
            GlobalBase64Scan::new(0).kind(),
            RecursiveWalk::new(0).kind(),
        ];
        assert_eq!(kinds, SourceStrategy::ALL.to_vec());
    }
}
