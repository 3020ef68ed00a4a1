//! Runtime type classification
//!
//! Documents are plain `serde_json::Value` trees. `classify` maps a value to
//! its base shape; the refined tags (`integer`, `date`, `regexp`, `buffer`)
//! are only recognised when a schema asks for them through `.type`, and are
//! then evaluated with the evaluator of their base shape.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag of a document value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    /// JSON object
    Object,
    /// JSON array
    Array,
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// Number with a zero fractional part
    Integer,
    /// `true` or `false`
    Boolean,
    /// JSON `null`
    Null,
    /// Absent value
    Undefined,
    /// RFC 3339 timestamp or `YYYY-MM-DD` string
    Date,
    /// String that compiles as a regular expression
    #[serde(rename = "regexp")]
    RegExp,
    /// Array of integers in `0..=255`
    Buffer,
    /// Any present value
    Any,
}

/// Classify a value into its base shape
///
/// Total and deterministic: absent values are `Undefined`, everything else
/// is one of `Object`, `Array`, `String`, `Number`, `Boolean` or `Null`.
pub fn classify(value: Option<&Value>) -> TypeTag {
    match value {
        None => TypeTag::Undefined,
        Some(Value::Object(_)) => TypeTag::Object,
        Some(Value::Array(_)) => TypeTag::Array,
        Some(Value::String(_)) => TypeTag::String,
        Some(Value::Number(_)) => TypeTag::Number,
        Some(Value::Bool(_)) => TypeTag::Boolean,
        Some(Value::Null) => TypeTag::Null,
    }
}

impl TypeTag {
    /// Schema name of this tag
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Integer => "integer",
            TypeTag::Boolean => "boolean",
            TypeTag::Null => "null",
            TypeTag::Undefined => "undefined",
            TypeTag::Date => "date",
            TypeTag::RegExp => "regexp",
            TypeTag::Buffer => "buffer",
            TypeTag::Any => "any",
        }
    }

    /// Whether a present value satisfies this tag
    pub fn admits(&self, value: &Value) -> bool {
        match self {
            TypeTag::Any => true,
            TypeTag::Undefined => false,
            TypeTag::Integer => value.as_f64().is_some_and(|n| n.fract() == 0.0),
            TypeTag::Date => value.as_str().is_some_and(is_date),
            TypeTag::RegExp => value
                .as_str()
                .is_some_and(|s| regex::Regex::new(s).is_ok()),
            TypeTag::Buffer => value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .all(|b| b.as_u64().is_some_and(|b| b <= u8::MAX as u64))
            }),
            base => classify(Some(value)) == *base,
        }
    }

    /// Base shape whose evaluator handles values of this tag
    ///
    /// `Any` has no fixed shape, so the value's own shape is used.
    pub fn shape(&self, value: &Value) -> TypeTag {
        match self {
            TypeTag::Integer => TypeTag::Number,
            TypeTag::Date | TypeTag::RegExp => TypeTag::String,
            TypeTag::Buffer => TypeTag::Array,
            TypeTag::Any | TypeTag::Undefined => classify(Some(value)),
            base => *base,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "object" => TypeTag::Object,
            "array" => TypeTag::Array,
            "string" => TypeTag::String,
            "number" => TypeTag::Number,
            "integer" => TypeTag::Integer,
            "boolean" => TypeTag::Boolean,
            "null" => TypeTag::Null,
            "date" => TypeTag::Date,
            "regexp" => TypeTag::RegExp,
            "buffer" => TypeTag::Buffer,
            "any" => TypeTag::Any,
            other => return Err(format!("unknown type '{other}'")),
        })
    }
}

pub(crate) fn is_date(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Structural equality where numbers compare by value (`1 == 1.0`)
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_value(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, a)| y.get(k).is_some_and(|b| same_value(a, b)))
        }
        _ => a == b,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over values: numbers numerically, strings lexicographically,
/// arrays element-wise, mixed shapes by shape rank
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(a, b)| compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Convert an arithmetic result into a JSON number
///
/// Integral results are emitted as JSON integers so `7 - 3` compares equal
/// to `json!(4)`. Non-finite results have no JSON representation.
pub fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return Some(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n).map(Value::Number)
}

/// Look up a dotted sub-path inside a value
pub(crate) fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
