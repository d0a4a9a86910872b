//! Final interview report.
//!
//! Models routinely return numbers as strings ("85", "4.5分"), drop fields or
//! send `null` where a list is expected. Every field deserializes leniently:
//! scores are coerced and clamped, unusable values fall back to defaults.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewReport {
    #[serde(deserialize_with = "lenient_overall_score")]
    pub overall_score: i32,
    #[serde(deserialize_with = "lenient_vec")]
    pub ability_scores: Vec<AbilityScore>,
    #[serde(deserialize_with = "lenient_string")]
    pub overall_comment: String,
    #[serde(deserialize_with = "lenient_string")]
    pub strength_analysis: String,
    #[serde(deserialize_with = "lenient_string")]
    pub weakness_analysis: String,
    #[serde(deserialize_with = "lenient_strings")]
    pub improvement_suggestions: Vec<String>,
    pub keyword_analysis: KeywordAnalysis,
    #[serde(deserialize_with = "lenient_vec")]
    pub star_analysis: Vec<StarAnalysis>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScore {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_ability_score")]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordAnalysis {
    #[serde(deserialize_with = "lenient_strings")]
    pub matched_keywords: Vec<String>,
    #[serde(deserialize_with = "lenient_strings")]
    pub missing_keywords: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub analysis_comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarAnalysis {
    #[serde(deserialize_with = "lenient_sequence")]
    pub question_sequence: i32,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_behavioral_question: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub conforms_to_star: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub star_feedback: String,
}

/// Reads a number from a JSON number or a numeric prefix of a string.
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && c == '-')))
                .map_or(s.len(), |(i, _)| i);
            s[..end].parse::<f64>().ok()
        }
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Integer in [0, 100]; anything unparseable is 0.
pub fn coerce_overall_score(value: &Value) -> i32 {
    as_number(value).map_or(0, |n| n.round().clamp(0.0, 100.0) as i32)
}

/// Number in [0, 5] with one decimal place; anything unparseable is 0.
pub fn coerce_ability_score(value: &Value) -> f64 {
    as_number(value).map_or(0.0, |n| (n.clamp(0.0, 5.0) * 10.0).round() / 10.0)
}

pub fn lenient_overall_score<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    Ok(coerce_overall_score(&Value::deserialize(d)?))
}

pub fn lenient_ability_score<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(coerce_ability_score(&Value::deserialize(d)?))
}

fn lenient_sequence<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(as_number(&value).map_or(0, |n| n.round().clamp(0.0, i32::MAX as f64) as i32))
}

pub fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// A list of strings. A bare string becomes a one-element list; non-string
/// items are dropped.
pub fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

/// A list of objects. Items that fail to deserialize are skipped.
pub fn lenient_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}
