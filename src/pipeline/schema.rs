//! Response schema: what the model is asked to return and how it is read.
//!
//! [`response_schema`] is sent with every request. The `Raw*` types mirror
//! it on the way back, deliberately leniently: models emit `"marks": 4`
//! instead of `"4"`, `null` for empty fields, or `"page_index": "1"`. None of
//! these should cost the user a whole chunk, so every scalar is coerced
//! rather than rejected.

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

/// The JSON schema constraining the model's response.
///
/// Uses the OpenAPI-subset dialect accepted by Gemini's `responseSchema`,
/// which plain JSON-schema consumers read equally well.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "sections": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "layout_hint": {
                            "type": "STRING",
                            "enum": ["one_column", "two_column", "three_column"]
                        },
                        "questions": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "number": { "type": "STRING" },
                                    "text": { "type": "STRING" },
                                    "marks": { "type": "STRING" },
                                    "type": {
                                        "type": "STRING",
                                        "enum": ["standard", "mcq", "instruction"]
                                    },
                                    "options": {
                                        "type": "ARRAY",
                                        "items": { "type": "STRING" }
                                    },
                                    "has_diagram": { "type": "BOOLEAN" },
                                    "box_2d": {
                                        "type": "ARRAY",
                                        "items": { "type": "INTEGER" }
                                    },
                                    "page_index": { "type": "INTEGER" }
                                },
                                "required": ["number", "text", "marks", "type", "page_index"]
                            }
                        }
                    },
                    "required": ["title", "questions"]
                }
            }
        },
        "required": ["sections"]
    })
}

/// Top-level response shape.
///
/// `sections` must be present; an object without it is not a transcription.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTranscription {
    #[serde(deserialize_with = "null_as_default")]
    pub sections: Vec<RawSection>,
}

/// One section as returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSection {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub layout_hint: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: Vec<RawQuestion>,
}

/// One question as returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawQuestion {
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub marks: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_diagram: bool,
    #[serde(default, deserialize_with = "lenient_number_list")]
    pub box_2d: Option<Vec<f64>>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub page_index: Option<usize>,
}

// ── Lenient field readers ────────────────────────────────────────────────

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn value_to_string(v: Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(d)?))
}

fn lenient_string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().map(value_to_string).collect(),
        Value::Null => Vec::new(),
        single => vec![value_to_string(single)],
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}

fn lenient_number_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<f64>>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        _ => None,
    })
}

fn lenient_index<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(|v| v as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
