//! Non-recursive constraint checks
//!
//! These run on a single value without descending into children, so both
//! the report pass and the post-transform pass use them.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{ErrorKind, ValidationError, join_path};
use crate::schema::node::{Node, SortKey};
use crate::types::{TypeTag, classify, compare, lookup, number_value, same_value};

/// Type gate: the evaluator shape for `value`, or the single TYPE error
pub(crate) fn gate(node: &Node, value: &Value, path: &str) -> Result<TypeTag, ValidationError> {
    match node.ty {
        Some(ty) if !ty.admits(value) => Err(ValidationError::new(
            ErrorKind::Type,
            path,
            &node.path,
            format!("expected {ty}, found {}", classify(Some(value))),
        )
        .expected(ty.name())
        .actual(value.clone())),
        Some(ty) => Ok(ty.shape(value)),
        None => Ok(classify(Some(value))),
    }
}

pub(crate) fn missing(node: &Node, path: &str) -> ValidationError {
    ValidationError::new(ErrorKind::Missing, path, &node.path, "required value is missing")
}

pub(crate) fn illegal(node: &Node, path: &str, key: &str) -> ValidationError {
    ValidationError::new(
        ErrorKind::Illegal,
        path,
        &node.path,
        format!("key '{key}' is not allowed here"),
    )
    .actual(key)
}

pub(crate) fn too_deep(node: &Node, path: &str, max_depth: usize) -> ValidationError {
    ValidationError::new(
        ErrorKind::Limit,
        path,
        &node.path,
        format!("document is nested deeper than {max_depth} levels"),
    )
    .expected(max_depth)
}

/// Checks of `value` against the node's own constraints, by shape
pub(crate) fn local(node: &Node, value: &Value, shape: TypeTag, path: &str) -> Vec<ValidationError> {
    match (shape, value) {
        (TypeTag::Object, Value::Object(map)) => size(node, map.len(), "key count", path),
        (TypeTag::Array, Value::Array(items)) => {
            let mut errors = size(node, items.len(), "length", path);
            if node.rules.unique {
                errors.extend(unique(node, items, path));
            }
            if let Some(keys) = &node.rules.sort {
                errors.extend(sorted(node, keys, items, path));
            }
            errors
        }
        (TypeTag::String, Value::String(s)) => {
            let mut errors = size(node, s.chars().count(), "length", path);
            if let Some(pattern) = &node.rules.pattern {
                if !pattern.is_match(s) {
                    errors.push(
                        ValidationError::new(
                            ErrorKind::Format,
                            path,
                            &node.path,
                            format!("does not match /{}/", pattern.as_str()),
                        )
                        .expected(pattern.as_str())
                        .actual(s.as_str()),
                    );
                }
            }
            if let Some(format) = node.rules.format {
                if !format.check(s) {
                    errors.push(
                        ValidationError::new(
                            ErrorKind::Format,
                            path,
                            &node.path,
                            format!("is not a valid {}", format.name()),
                        )
                        .expected(format.name())
                        .actual(s.as_str()),
                    );
                }
            }
            errors
        }
        (TypeTag::Number, Value::Number(n)) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            let mut errors = range(node, n, "value", value, path);
            if let Some((divisor, remainder)) = node.rules.modulo {
                if (n % divisor - remainder).abs() > f64::EPSILON {
                    errors.push(
                        ValidationError::new(
                            ErrorKind::Limit,
                            path,
                            &node.path,
                            format!("value modulo {divisor} must be {remainder}"),
                        )
                        .expected(vec![divisor, remainder])
                        .actual(value.clone()),
                    );
                }
            }
            errors
        }
        _ => Vec::new(),
    }
}

fn size(node: &Node, count: usize, what: &str, path: &str) -> Vec<ValidationError> {
    let mut errors = range(node, count as f64, what, &Value::from(count), path);
    if let Some(length) = node.rules.bounds.length {
        if count as f64 != length {
            errors.push(limit(node, path, format!("{what} must be exactly {length}"), length, Value::from(count)));
        }
    }
    errors
}

fn range(node: &Node, n: f64, what: &str, actual: &Value, path: &str) -> Vec<ValidationError> {
    let bounds = node.rules.bounds;
    let checks = [
        (bounds.min, "at least", n >= bounds.min.unwrap_or(f64::NEG_INFINITY)),
        (bounds.max, "at most", n <= bounds.max.unwrap_or(f64::INFINITY)),
        (bounds.exclusive_min, "greater than", n > bounds.exclusive_min.unwrap_or(f64::NEG_INFINITY)),
        (bounds.exclusive_max, "less than", n < bounds.exclusive_max.unwrap_or(f64::INFINITY)),
    ];
    checks
        .into_iter()
        .filter_map(|(bound, relation, ok)| match bound {
            Some(bound) if !ok => Some(limit(
                node,
                path,
                format!("{what} must be {relation} {bound}"),
                bound,
                actual.clone(),
            )),
            _ => None,
        })
        .collect()
}

fn limit(node: &Node, path: &str, message: String, expected: f64, actual: Value) -> ValidationError {
    ValidationError::new(ErrorKind::Limit, path, &node.path, message)
        .expected(number_value(expected).unwrap_or(Value::Null))
        .actual(actual)
}

fn unique(node: &Node, items: &[Value], path: &str) -> Vec<ValidationError> {
    (1..items.len())
        .filter(|&j| items[..j].iter().any(|a| same_value(a, &items[j])))
        .map(|j| {
            ValidationError::new(
                ErrorKind::Format,
                join_path(path, j),
                &node.path,
                "duplicates an earlier element",
            )
            .expected("unique")
            .actual(items[j].clone())
        })
        .collect()
}

/// Compare two elements under a (possibly compound) sort key list
pub(crate) fn order(keys: &[SortKey], a: &Value, b: &Value) -> Ordering {
    for key in keys {
        let ordering = match (lookup(a, &key.path), lookup(b, &key.path)) {
            (Some(x), Some(y)) => compare(x, y),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = if key.descending { ordering.reverse() } else { ordering };
        if ordering.is_ne() {
            return ordering;
        }
    }
    Ordering::Equal
}

fn sorted(node: &Node, keys: &[SortKey], items: &[Value], path: &str) -> Vec<ValidationError> {
    (1..items.len())
        .filter(|&j| order(keys, &items[j - 1], &items[j]) == Ordering::Greater)
        .map(|j| {
            ValidationError::new(
                ErrorKind::Format,
                join_path(path, j),
                &node.path,
                "element is out of order",
            )
            .actual(items[j].clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::node::Bounds;
    use serde_json::json;

    fn node_with(bounds: Bounds) -> Node {
        let mut node = Node::default();
        node.rules.bounds = bounds;
        node
    }

    #[test]
    fn test_numeric_bounds_reported_independently() {
        let node = node_with(Bounds {
            min: Some(10.0),
            exclusive_min: Some(10.0),
            ..Default::default()
        });
        let errors = local(&node, &json!(5), TypeTag::Number, "n");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Limit && e.path == "n"));

        let errors = local(&node, &json!(10), TypeTag::Number, "n");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("greater than"));
    }

    #[test]
    fn test_inclusive_bounds_accept_edges() {
        let node = node_with(Bounds {
            min: Some(1.0),
            max: Some(3.0),
            ..Default::default()
        });
        assert!(local(&node, &json!(1), TypeTag::Number, "").is_empty());
        assert!(local(&node, &json!(3), TypeTag::Number, "").is_empty());
        assert_eq!(local(&node, &json!(3.5), TypeTag::Number, "").len(), 1);
    }

    #[test]
    fn test_string_length_counts_chars() {
        let node = node_with(Bounds {
            max: Some(3.0),
            ..Default::default()
        });
        assert!(local(&node, &json!("äöü"), TypeTag::String, "").is_empty());
        assert_eq!(local(&node, &json!("abcd"), TypeTag::String, "")[0].expected, Some(json!(3)));
    }

    #[test]
    fn test_exact_length() {
        let node = node_with(Bounds {
            length: Some(2.0),
            ..Default::default()
        });
        assert!(local(&node, &json!([1, 2]), TypeTag::Array, "").is_empty());
        assert_eq!(local(&node, &json!([1]), TypeTag::Array, "").len(), 1);
    }

    #[test]
    fn test_modulo() {
        let mut node = Node::default();
        node.rules.modulo = Some((3.0, 1.0));
        assert!(local(&node, &json!(7), TypeTag::Number, "").is_empty());
        assert_eq!(local(&node, &json!(8), TypeTag::Number, "").len(), 1);
    }

    #[test]
    fn test_unique_uses_structural_equality() {
        let mut node = Node::default();
        node.rules.unique = true;
        let errors = local(&node, &json!([{"a": 1}, {"a": 1.0}, {"a": 2}]), TypeTag::Array, "xs");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "xs.1");
        assert_eq!(errors[0].kind, ErrorKind::Format);
    }

    #[test]
    fn test_compound_sort() {
        let keys = vec![
            SortKey {
                path: vec!["group".to_string()],
                descending: false,
            },
            SortKey {
                path: vec!["score".to_string()],
                descending: true,
            },
        ];
        let mut node = Node::default();
        node.rules.sort = Some(keys);
        let ok = json!([
            {"group": "a", "score": 9},
            {"group": "a", "score": 3},
            {"group": "b", "score": 7}
        ]);
        assert!(local(&node, &ok, TypeTag::Array, "").is_empty());
        let bad = json!([
            {"group": "a", "score": 3},
            {"group": "a", "score": 9}
        ]);
        let errors = local(&node, &bad, TypeTag::Array, "");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "1");
    }

    #[test]
    fn test_gate_reports_type() {
        let mut node = Node::default();
        node.ty = Some(TypeTag::Integer);
        assert_eq!(gate(&node, &json!(2), ""), Ok(TypeTag::Number));
        let err = gate(&node, &json!(2.5), "x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
        assert_eq!(err.expected, Some(json!("integer")));
    }
}
