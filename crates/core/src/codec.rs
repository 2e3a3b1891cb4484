//! Opaque payload encoding for answers and feedback.
//!
//! The tables backend stores a payload as its JSON text. The legacy backend
//! keeps one metadata value per attempt: a JSON object keyed by question id
//! whose values are base64-encoded JSON payloads.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::QuestionId;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("legacy blob must be a JSON object keyed by question id")]
    NotAnObject,

    #[error("invalid question id key: {0}")]
    InvalidQuestionId(String),

    #[error("question {question_id}: invalid base64 payload")]
    Base64 {
        question_id: QuestionId,
        #[source]
        source: base64::DecodeError,
    },

    #[error("question {question_id}: points must be an integer, got {raw}")]
    InvalidPoints { question_id: QuestionId, raw: String },
}

/// Any serializable answer or feedback value: a string, a list of choices, a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_json(self) -> Value {
        self.0
    }

    /// Encode into the blob stored by the tables backend.
    #[must_use]
    pub fn encode(&self) -> String {
        // Serializing a `Value` cannot fail: keys are always strings.
        self.0.to_string()
    }

    /// # Errors
    ///
    /// Returns `CodecError::Json` if the blob is not valid JSON.
    pub fn decode(blob: &str) -> Result<Self, CodecError> {
        Ok(Self(serde_json::from_str(blob)?))
    }
}

fn legacy_object(raw: &str) -> Result<serde_json::Map<String, Value>, CodecError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(CodecError::NotAnObject),
    }
}

fn question_key(key: &str) -> Result<QuestionId, CodecError> {
    key.parse()
        .map_err(|_| CodecError::InvalidQuestionId(key.to_owned()))
}

/// Question ids referenced by a legacy answers blob, without decoding the payloads.
///
/// # Errors
///
/// Returns `CodecError` if the blob is not an object keyed by numeric ids.
pub fn legacy_question_ids(raw: &str) -> Result<Vec<QuestionId>, CodecError> {
    legacy_object(raw)?
        .keys()
        .map(|key| question_key(key))
        .collect()
}

/// Decode a legacy `{question_id: base64(json)}` blob (answers or feedback).
///
/// # Errors
///
/// Returns `CodecError` on malformed keys, base64 or JSON.
pub fn decode_legacy_payloads(raw: &str) -> Result<BTreeMap<QuestionId, Payload>, CodecError> {
    let mut out = BTreeMap::new();
    for (key, value) in legacy_object(raw)? {
        let question_id = question_key(&key)?;
        let encoded = match value {
            Value::String(s) => s,
            // Some writers stored the payload unencoded.
            other => {
                out.insert(question_id, Payload(other));
                continue;
            }
        };
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|source| CodecError::Base64 {
                question_id,
                source,
            })?;
        let payload = serde_json::from_slice::<Value>(&bytes)?;
        out.insert(question_id, Payload(payload));
    }
    Ok(out)
}

/// Encode payloads into the legacy layout.
#[must_use]
pub fn encode_legacy_payloads(payloads: &BTreeMap<QuestionId, Payload>) -> String {
    let map: serde_json::Map<String, Value> = payloads
        .iter()
        .map(|(id, payload)| {
            (
                id.to_string(),
                Value::String(STANDARD.encode(payload.encode())),
            )
        })
        .collect();
    Value::Object(map).to_string()
}

/// Decode a legacy `{question_id: points}` blob. Points may be numbers or numeric strings.
///
/// # Errors
///
/// Returns `CodecError` on malformed keys or non-integer points.
pub fn decode_legacy_points(raw: &str) -> Result<BTreeMap<QuestionId, i64>, CodecError> {
    let mut out = BTreeMap::new();
    for (key, value) in legacy_object(raw)? {
        let question_id = question_key(&key)?;
        let points = match &value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| CodecError::InvalidPoints {
            question_id,
            raw: value.to_string(),
        })?;
        out.insert(question_id, points);
    }
    Ok(out)
}

/// Encode points into the legacy `{question_id: points}` layout.
#[must_use]
pub fn encode_legacy_points(points: &BTreeMap<QuestionId, i64>) -> String {
    let map: serde_json::Map<String, Value> = points
        .iter()
        .map(|(id, points)| (id.to_string(), Value::from(*points)))
        .collect();
    Value::Object(map).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_blob_round_trips_multi_value_answers() {
        let payload = Payload::new(json!(["red", "green", {"other": 3}]));
        let decoded = Payload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn legacy_payloads_round_trip() {
        let mut payloads = BTreeMap::new();
        payloads.insert(QuestionId::new(11), Payload::new("true"));
        payloads.insert(QuestionId::new(12), Payload::new(json!(["a", "c"])));

        let raw = encode_legacy_payloads(&payloads);
        assert_eq!(decode_legacy_payloads(&raw).unwrap(), payloads);
        assert_eq!(
            legacy_question_ids(&raw).unwrap(),
            vec![QuestionId::new(11), QuestionId::new(12)]
        );
    }

    #[test]
    fn legacy_payload_rejects_bad_base64() {
        let err = decode_legacy_payloads(r#"{"5": "@@not base64@@"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Base64 { question_id, .. } if question_id == QuestionId::new(5)));
    }

    #[test]
    fn legacy_payload_rejects_non_numeric_keys() {
        let err = decode_legacy_payloads(r#"{"abc": "InRydWUi"}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidQuestionId(k) if k == "abc"));
        assert!(matches!(
            decode_legacy_payloads("[1,2]").unwrap_err(),
            CodecError::NotAnObject
        ));
    }

    #[test]
    fn legacy_points_accept_numbers_and_strings() {
        let points = decode_legacy_points(r#"{"1": 2, "2": "0"}"#).unwrap();
        assert_eq!(points[&QuestionId::new(1)], 2);
        assert_eq!(points[&QuestionId::new(2)], 0);

        let err = decode_legacy_points(r#"{"3": "lots"}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidPoints { .. }));
    }
}
