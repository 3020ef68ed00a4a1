//! Transform engine
//!
//! Merges a source document into an optional target under a compiled
//! schema and returns a new value. Neither input is modified. The first
//! violated constraint aborts the whole merge.
//!
//! Per node the merge runs in two phases:
//!
//! 1. shape merge: `.cast`, then the operators of the value's shape
//!    (object rename/drop/inject and children, array placement and trims,
//!    string case and split, number arithmetic)
//! 2. checks on the merged value: the registered `.transform` function,
//!    the type gate (skipped after `.split`/`.group`), bounds, `.all`,
//!    `.exists`, then `.eval`
//!
//! `.anyOf`/`.oneOf` on a node without a type or operators of its own
//! yield the winning alternative's merge; otherwise the node merges as
//! usual and the alternatives must merge too.

mod containers;
mod scalars;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::Value;

use crate::error::{ErrorKind, ValidationError};
use crate::functions::TransformFn;
use crate::report::{Reporter, checks};
use crate::schema::node::{Node, NodeId};
use crate::schema::{Arena, Mode};
use crate::types::{TypeTag, classify};

/// Merged value (`None` when both sides are absent) or the first violation
pub(crate) type Outcome = Result<Option<Value>, Box<ValidationError>>;

type Merged = Result<Value, Box<ValidationError>>;

pub(crate) struct Merger<'s> {
    arena: &'s Arena,
    mode: Mode,
    max_depth: usize,
    reporter: Reporter<'s>,
}

impl<'s> Merger<'s> {
    pub fn new(arena: &'s Arena, mode: Mode, max_depth: usize) -> Self {
        Self {
            arena,
            mode,
            max_depth,
            reporter: Reporter::new(arena, mode, max_depth),
        }
    }

    /// Merge `source` into `target` under node `id`
    pub fn merge<'a>(
        &'a self,
        id: NodeId,
        source: Option<&'a Value>,
        target: Option<&'a Value>,
        path: String,
        depth: usize,
    ) -> BoxFuture<'a, Outcome> {
        async move {
            let (node, optional) = self.arena.resolve(id);
            let Some(source) = source else {
                return match target {
                    Some(target) => Ok(Some(target.clone())),
                    None if optional => Ok(None),
                    None => Err(Box::new(checks::missing(node, &path))),
                };
            };
            if depth > self.max_depth {
                return Err(Box::new(checks::too_deep(node, &path, self.max_depth)));
            }

            if let Some(not) = node.rules.not {
                if self.merge(not, Some(source), target, path.clone(), depth).await.is_ok() {
                    return Err(Box::new(ValidationError::new(
                        ErrorKind::Format,
                        path,
                        &node.path,
                        "merge succeeds under the '.not' schema",
                    )));
                }
            }
            let composite = !node.rules.any_of.is_empty() || !node.rules.one_of.is_empty();
            if composite && node.delegates() {
                let merged = self.alternatives(node, source, target, &path, depth).await?;
                return self.finish(node, merged, &path, depth).await.map(Some);
            }

            let cast;
            let source = if node.ops.cast {
                cast = scalars::cast(node, source, &path)?;
                &cast
            } else {
                source
            };
            let shape = checks::gate(node, source, &path).map_err(Box::new)?;
            let target = match target {
                Some(t) if classify(Some(t)) != classify(Some(source)) => match node.ty {
                    Some(ty) => {
                        return Err(Box::new(
                            ValidationError::new(
                                ErrorKind::Type,
                                path,
                                &node.path,
                                format!("cannot merge into a target of type {}", classify(Some(t))),
                            )
                            .expected(ty.name())
                            .actual(t.clone()),
                        ));
                    }
                    None => None,
                },
                other => other,
            };

            let merged = match (shape, source) {
                (TypeTag::Object, Value::Object(map)) => {
                    self.object(node, map, target, &path, depth).await?
                }
                (TypeTag::Array, Value::Array(items)) => {
                    self.array(node, items, target, &path, depth).await?
                }
                (TypeTag::String, Value::String(s)) => {
                    scalars::string(node, s, target.and_then(Value::as_str))?
                }
                (TypeTag::Number, Value::Number(n)) => {
                    scalars::number(node, n.as_f64().unwrap_or(f64::NAN), target, &path)?
                }
                (TypeTag::Boolean, Value::Bool(b)) => Value::Bool(*b != node.ops.invert),
                _ => source.clone(),
            };
            if composite {
                self.alternatives(node, source, target, &path, depth).await?;
            }
            self.finish(node, merged, &path, depth).await.map(Some)
        }
        .boxed()
    }

    /// `.anyOf` takes the first alternative that merges, `.oneOf` the only one.
    /// A node with a shape of its own keeps its merge and only requires the
    /// alternatives to succeed.
    async fn alternatives(
        &self,
        node: &Node,
        source: &Value,
        target: Option<&Value>,
        path: &str,
        depth: usize,
    ) -> Merged {
        let mut value = None;
        if !node.rules.any_of.is_empty() {
            let mut cause = Vec::new();
            for alternative in &node.rules.any_of {
                match self.merge(*alternative, Some(source), target, path.to_string(), depth).await {
                    Ok(merged) => {
                        value = Some(merged);
                        break;
                    }
                    Err(e) => cause.push(*e),
                }
            }
            tracing::trace!(path, matched = value.is_some(), "anyOf merge evaluated");
            if value.is_none() {
                return Err(Box::new(
                    ValidationError::new(
                        ErrorKind::Format,
                        path,
                        &node.path,
                        "no '.anyOf' alternative merges",
                    )
                    .cause(cause),
                ));
            }
        }

        if !node.rules.one_of.is_empty() {
            let outcomes = join_all(
                node.rules
                    .one_of
                    .iter()
                    .map(|alt| self.merge(*alt, Some(source), target, path.to_string(), depth)),
            )
            .await;
            let passed = outcomes.iter().filter(|o| o.is_ok()).count();
            tracing::trace!(path, passed, "oneOf merge evaluated");
            if passed != 1 {
                let cause = outcomes.into_iter().filter_map(|o| o.err().map(|e| *e)).collect();
                return Err(Box::new(
                    ValidationError::new(
                        ErrorKind::Format,
                        path,
                        &node.path,
                        format!("{passed} '.oneOf' alternatives merge, expected exactly one"),
                    )
                    .expected(1)
                    .actual(passed)
                    .cause(cause),
                ));
            }
            value = outcomes.into_iter().find_map(Result::ok);
        }

        Ok(value.flatten().unwrap_or_else(|| source.clone()))
    }

    /// Checks run on the merged value; the first violation aborts
    async fn finish(&self, node: &Node, value: Value, path: &str, depth: usize) -> Merged {
        let value = match &node.rules.transform {
            None => value,
            Some(TransformFn::Async(_)) if self.mode == Mode::Sync => {
                return Err(Box::new(ValidationError::new(
                    ErrorKind::Sync,
                    path,
                    &node.path,
                    "asynchronous '.transform' reached on a synchronous call",
                )));
            }
            Some(function) => {
                let input = value.clone();
                let applied = match function {
                    TransformFn::Sync(f) => (f.as_ref())(value),
                    TransformFn::Async(f) => f.apply(value).await,
                };
                applied.map_err(|e| {
                    Box::new(
                        ValidationError::new(
                            ErrorKind::Invalid,
                            path,
                            &node.path,
                            "rejected by '.transform'",
                        )
                        .reason(e.to_string())
                        .actual(input),
                    )
                })?
            }
        };

        let shape = if node.ops.reshapes() {
            classify(Some(&value))
        } else {
            checks::gate(node, &value, path).map_err(Box::new)?
        };
        if let Some(e) = checks::local(node, &value, shape, path).into_iter().next() {
            return Err(Box::new(e));
        }

        if node.rules.all.is_some() || !node.rules.exists.is_empty() {
            let items: Vec<(String, &Value)> = match &value {
                Value::Object(map) => map
                    .iter()
                    .map(|(k, v)| (crate::error::join_path(path, k), v))
                    .collect(),
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (crate::error::join_path(path, i), v))
                    .collect(),
                _ => Vec::new(),
            };
            let errors = self.reporter.quantifiers(node, path, &items, depth).await;
            if let Some(e) = errors.into_iter().next() {
                return Err(Box::new(e));
            }
        }

        match self.reporter.predicate(node, &value, path).await {
            Some(e) => Err(Box::new(e)),
            None => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, ErrorKind};
    use crate::functions::{BoxError, Predicate, Registry, TransformFn};
    use crate::schema::Schema;
    use serde_json::{Value, json};

    fn schema(raw: Value) -> Schema {
        Schema::compile(&raw, &Registry::new()).unwrap()
    }

    fn kind(result: crate::error::Result<Value>) -> ErrorKind {
        match result {
            Err(Error::Validation(e)) => e.kind,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_source_keeps_target() {
        let s = schema(json!({"a": "number", "b": {".type": "number", ".optional": true}}));
        let merged = s.transform(&json!({}), Some(&json!({"a": 1, "b": 2}))).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": 2}));
        assert_eq!(kind(s.transform(&json!({}), None)), ErrorKind::Missing);
        assert_eq!(s.transform(&json!({"a": 5}), None).unwrap(), json!({"a": 5}));
    }

    #[test]
    fn test_typed_target_mismatch() {
        let s = schema(json!({"a": "number"}));
        assert_eq!(
            kind(s.transform(&json!({"a": 1}), Some(&json!({"a": "x"})))),
            ErrorKind::Type
        );
        let untyped = schema(json!({"a": {".optional": true}}));
        assert_eq!(
            untyped.transform(&json!({"a": 1}), Some(&json!({"a": "x"}))).unwrap(),
            json!({"a": 1})
        );
    }

    #[test]
    fn test_any_of_takes_first_merge() {
        let s = schema(json!({".anyOf": [
            {".type": "string", ".case": "upper"},
            {".type": "number", ".add": true}
        ]}));
        assert_eq!(s.transform(&json!("ab"), None).unwrap(), json!("AB"));
        assert_eq!(s.transform(&json!(2), Some(&json!(3))).unwrap(), json!(5));
        assert_eq!(kind(s.transform(&json!(true), None)), ErrorKind::Format);
    }

    #[test]
    fn test_typed_node_gates_before_alternatives() {
        let s = schema(json!({".type": "string", ".anyOf": ["number"]}));
        assert_eq!(s.report(&json!(5))[0].kind, ErrorKind::Type);
        assert_eq!(kind(s.transform(&json!(5), None)), ErrorKind::Type);
        assert_eq!(kind(s.transform(&json!("x"), None)), ErrorKind::Format);
    }

    #[test]
    fn test_alternatives_keep_own_children() {
        let s = schema(json!({
            "a": {".type": "number", ".add": true},
            ".anyOf": [{".type": "object", ".arbitrary": true}]
        }));
        assert_eq!(
            s.transform(&json!({"a": 2}), Some(&json!({"a": 3}))).unwrap(),
            json!({"a": 5})
        );

        let s = schema(json!({
            "a": {".type": "number", ".add": true},
            ".oneOf": [{"a": "string"}]
        }));
        assert_eq!(
            kind(s.transform(&json!({"a": 2}), Some(&json!({"a": 3})))),
            ErrorKind::Format
        );
    }

    #[test]
    fn test_merged_value_keeps_declared_type() {
        let s = schema(json!({".type": "integer", ".divide": true}));
        assert_eq!(s.transform(&json!(2), Some(&json!(8))).unwrap(), json!(4));
        assert_eq!(kind(s.transform(&json!(2), Some(&json!(7)))), ErrorKind::Type);

        let registry = Registry::new().transform("count", TransformFn::sync(|v| {
            Ok(json!(v.as_str().map_or(0, str::len)))
        }));
        let s = Schema::compile(&json!({".type": "string", ".transform": "count"}), &registry)
            .unwrap();
        assert_eq!(kind(s.transform(&json!("abc"), None)), ErrorKind::Type);

        let split = schema(json!({".type": "string", ".split": ","}));
        assert_eq!(split.transform(&json!("a,b"), None).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_one_of_requires_single_merge() {
        let s = schema(json!({".oneOf": ["number", {".type": "number", ".min": 10}]}));
        assert_eq!(s.transform(&json!(3), None).unwrap(), json!(3));
        assert_eq!(kind(s.transform(&json!(30), None)), ErrorKind::Format);
    }

    #[test]
    fn test_not_requires_inner_failure() {
        let s = schema(json!({".not": "string"}));
        assert_eq!(s.transform(&json!(1), None).unwrap(), json!(1));
        assert_eq!(kind(s.transform(&json!("x"), None)), ErrorKind::Format);
    }

    #[test]
    fn test_transform_function_then_checks() {
        let registry = Registry::new().transform(
            "double",
            TransformFn::sync(|v| {
                let n = v.as_f64().ok_or("not a number")?;
                Ok(json!(n * 2.0))
            }),
        );
        let s = Schema::compile(&json!({".type": "number", ".transform": "double", ".max": 10}), &registry)
            .unwrap();
        assert_eq!(s.transform(&json!(4), None).unwrap(), json!(8.0));
        assert_eq!(kind(s.transform(&json!(6), None)), ErrorKind::Limit);
    }

    #[test]
    fn test_transform_function_failure_is_invalid() {
        let registry = Registry::new().transform(
            "fail",
            TransformFn::sync(|_| Err("broken".into())),
        );
        let s = Schema::compile(&json!({".transform": "fail"}), &registry).unwrap();
        match s.transform(&json!(1), None) {
            Err(Error::Validation(e)) => {
                assert_eq!(e.kind, ErrorKind::Invalid);
                assert_eq!(e.reason.as_deref(), Some("broken"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_async_transform_on_sync_path() {
        let registry = Registry::new().transform(
            "slow",
            TransformFn::from_async(|v| async move { Ok::<Value, BoxError>(v) }),
        );
        let s = Schema::compile(&json!({".transform": "slow"}), &registry).unwrap();
        assert_eq!(kind(s.transform(&json!(1), None)), ErrorKind::Sync);
    }

    #[tokio::test]
    async fn test_async_transform_awaited() {
        let registry = Registry::new().transform(
            "wrap",
            TransformFn::from_async(|v| async move {
                tokio::task::yield_now().await;
                Ok::<Value, BoxError>(json!({"wrapped": v}))
            }),
        );
        let s = Schema::compile(&json!({"a": {".transform": "wrap"}}), &registry).unwrap();
        assert_eq!(
            s.transform_async(&json!({"a": 1}), None).await.unwrap(),
            json!({"a": {"wrapped": 1}})
        );
    }

    #[test]
    fn test_eval_runs_after_merge() {
        let registry = Registry::new().predicate(
            "small",
            Predicate::sync(|v| match v.as_f64() {
                Some(n) if n < 10.0 => Ok(()),
                _ => Err("too large".into()),
            }),
        );
        let s = Schema::compile(&json!({".type": "number", ".add": true, ".eval": "small"}), &registry)
            .unwrap();
        assert_eq!(s.transform(&json!(4), Some(&json!(5))).unwrap(), json!(9));
        assert_eq!(kind(s.transform(&json!(4), Some(&json!(6)))), ErrorKind::Invalid);
    }

    #[test]
    fn test_exists_checked_after_merge() {
        let s = schema(json!({".append": true, ".exists": {".type": "number", ".min": 10, ".times": 2}}));
        assert_eq!(
            s.transform(&json!([12]), Some(&json!([11]))).unwrap(),
            json!([11, 12])
        );
        assert_eq!(kind(s.transform(&json!([12]), None)), ErrorKind::Missing);
    }
}
