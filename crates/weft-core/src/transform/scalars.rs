//! String, number and boolean merges, plus the list helpers shared with
//! arrays

use serde_json::Value;

use crate::error::{ErrorKind, ValidationError};
use crate::schema::node::{Case, Injection, MathOp, Node, Placement, Trim};
use crate::types::{TypeTag, number_value};

type Scalar = Result<Value, Box<ValidationError>>;

/// `.cast` a string source to the node's number or boolean type
pub(super) fn cast(node: &Node, source: &Value, path: &str) -> Scalar {
    let Value::String(s) = source else {
        return Ok(source.clone());
    };
    let cast = match node.ty {
        Some(TypeTag::Boolean) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(Value::Bool(true))
            } else if s.eq_ignore_ascii_case("false") {
                Some(Value::Bool(false))
            } else {
                None
            }
        }
        _ => s.trim().parse::<f64>().ok().and_then(number_value),
    };
    cast.ok_or_else(|| {
        let ty = node.ty.map_or("value", |t| t.name());
        Box::new(
            ValidationError::new(
                ErrorKind::Format,
                path,
                &node.path,
                format!("cannot cast '{s}' to {ty}"),
            )
            .expected(ty)
            .actual(s.as_str()),
        )
    })
}

pub(super) fn string(node: &Node, source: &str, target: Option<&str>) -> Scalar {
    let mut text = source.to_string();
    if let Some(Injection::Offsets(points)) = &node.ops.inject {
        let mut pieces: Vec<String> = text.chars().map(String::from).collect();
        splice(
            &mut pieces,
            points.iter().map(|(at, v)| {
                let piece = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (*at, piece)
            }),
        );
        text = pieces.concat();
    }

    let target = target.unwrap_or_default();
    text = match &node.ops.placement {
        Some(Placement::Append) => format!("{target}{text}"),
        Some(Placement::Prepend) => format!("{text}{target}"),
        Some(Placement::Insert(at)) => {
            let split = target
                .char_indices()
                .nth(*at)
                .map_or(target.len(), |(i, _)| i);
            format!("{}{text}{}", &target[..split], &target[split..])
        }
        Some(Placement::Nest(_)) | None => text,
    };

    text = match node.ops.case {
        Some(Case::Upper) => text.to_uppercase(),
        Some(Case::Lower) => text.to_lowercase(),
        None => text,
    };

    if let Some(delimiter) = &node.ops.split {
        return Ok(Value::Array(
            text.split(delimiter.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ));
    }
    Ok(Value::String(text))
}

pub(super) fn number(node: &Node, source: f64, target: Option<&Value>, path: &str) -> Scalar {
    let base = target.and_then(Value::as_f64).unwrap_or(0.0);
    let mut n = match node.ops.math {
        None => source,
        Some(MathOp::Add) => base + source,
        Some(MathOp::Subtract) => base - source,
        Some(MathOp::Multiply) => base * source,
        Some(MathOp::Divide) if source == 0.0 => {
            return Err(invalid(node, path, "division by zero"));
        }
        Some(MathOp::Divide) => base / source,
    };

    if let Some((lo, hi)) = node.ops.normalize {
        n = (n - lo) / (hi - lo);
    }
    if let Some(m) = node.ops.modulate {
        n = n.rem_euclid(m);
    }
    if node.ops.invert {
        n = -n;
    }
    if node.ops.reciprocal {
        if n == 0.0 {
            return Err(invalid(node, path, "reciprocal of zero"));
        }
        n = 1.0 / n;
    }

    number_value(n).ok_or_else(|| invalid(node, path, "result is not a finite number"))
}

fn invalid(node: &Node, path: &str, message: &str) -> Box<ValidationError> {
    Box::new(ValidationError::new(ErrorKind::Invalid, path, &node.path, message))
}

/// Insert values at offsets into the original list; offsets refer to
/// positions before any insertion, `None` appends
pub(super) fn splice<T>(items: &mut Vec<T>, points: impl Iterator<Item = (Option<usize>, T)>) {
    let mut points: Vec<(Option<usize>, T)> = points.collect();
    points.sort_by_key(|(at, _)| at.unwrap_or(usize::MAX));
    let mut shift = 0;
    for (at, value) in points {
        match at {
            Some(at) => {
                let at = at.saturating_add(shift).min(items.len());
                items.insert(at, value);
                shift += 1;
            }
            None => items.push(value),
        }
    }
}

/// `.clip` and `.slice`; negative indices count from the end
pub(super) fn trim<T>(mut items: Vec<T>, trim: Trim) -> Vec<T> {
    let len = items.len() as i64;
    let resolve = |i: i64| -> usize { (if i < 0 { len + i } else { i }).clamp(0, len) as usize };
    let (start, end) = match trim {
        Trim::Clip(n) if n >= 0 => (0, resolve(n)),
        Trim::Clip(n) => (resolve(n), len as usize),
        Trim::Slice(start, end) => (resolve(start), end.map_or(len as usize, resolve)),
    };
    if start >= end {
        return Vec::new();
    }
    items.truncate(end);
    items.drain(..start);
    items
}
