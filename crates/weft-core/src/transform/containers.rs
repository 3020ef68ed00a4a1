//! Object and array merges

use std::collections::BTreeMap;

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::{Map, Value};

use super::{Merged, Merger, Outcome, scalars};
use crate::error::{ErrorKind, ValidationError, join_path};
use crate::report::checks;
use crate::schema::node::{Injection, Node, NodeId, Placement};
use crate::types::{lookup, same_value};

/// A merged member: its key and the value to store, `None` keeping the
/// target's
type Member = Result<(String, Option<Value>), Box<ValidationError>>;

impl Merger<'_> {
    pub(super) async fn object(
        &self,
        node: &Node,
        source: &Map<String, Value>,
        target: Option<&Value>,
        path: &str,
        depth: usize,
    ) -> Merged {
        let mut source = source.clone();
        for (from, to) in &node.ops.rename {
            if let Some(value) = source.remove(from) {
                source.insert(to.clone(), value);
            }
        }
        for key in &node.ops.drop {
            source.remove(key);
        }
        if let Some(Injection::Fields(fields)) = &node.ops.inject {
            for (key, value) in fields {
                source.insert(key.clone(), value.clone());
            }
        }

        let (outer, base) = match (&node.ops.placement, target) {
            (Some(Placement::Nest(key)), Some(Value::Object(outer))) => {
                (Some(outer), outer.get(key).and_then(Value::as_object))
            }
            (Some(Placement::Nest(_)), _) => (None, None),
            (_, target) => (None, target.and_then(Value::as_object)),
        };

        let mut members: Vec<BoxFuture<'_, Member>> = node
            .children
            .iter()
            .map(|(name, id)| {
                self.member(*id, name, source.get(name), base.and_then(|b| b.get(name)), path, depth)
            })
            .collect();
        for (key, value) in source.iter().filter(|(key, _)| !node.children.contains_key(*key)) {
            members.push(self.entry(node, key, value, base.and_then(|b| b.get(key)), path, depth));
        }

        let mut merged = base.cloned().unwrap_or_default();
        for (key, value) in try_join_all(members).await? {
            if let Some(value) = value {
                merged.insert(key, value);
            }
        }

        Ok(match (&node.ops.placement, outer) {
            (Some(Placement::Nest(key)), outer) => {
                let mut outer = outer.cloned().unwrap_or_default();
                outer.insert(key.clone(), Value::Object(merged));
                Value::Object(outer)
            }
            _ => Value::Object(merged),
        })
    }

    fn member<'a>(
        &'a self,
        id: NodeId,
        key: &str,
        source: Option<&'a Value>,
        target: Option<&'a Value>,
        path: &str,
        depth: usize,
    ) -> BoxFuture<'a, Member> {
        let key = key.to_string();
        let child_path = join_path(path, &key);
        async move {
            let merged = self.merge(id, source, target, child_path, depth + 1).await?;
            Ok((key, merged))
        }
        .boxed()
    }

    /// A source key with no named child
    fn entry<'a>(
        &'a self,
        node: &'a Node,
        key: &'a str,
        source: &'a Value,
        target: Option<&'a Value>,
        path: &str,
        depth: usize,
    ) -> BoxFuture<'a, Member> {
        let child_path = join_path(path, key);
        async move {
            if let Some((_, id)) = node.rules.match_children.iter().find(|(re, _)| re.is_match(key)) {
                let merged = self.merge(*id, Some(source), target, child_path, depth + 1).await?;
                return Ok((key.to_string(), merged));
            }

            let mut key_passed = false;
            if let Some(test) = node.rules.key_test {
                let key_value = Value::String(key.to_string());
                let errors = self
                    .reporter
                    .check(test, Some(&key_value), child_path.clone(), depth + 1)
                    .await;
                if !errors.is_empty() {
                    return Err(Box::new(checks::illegal(node, &child_path, key).cause(errors)));
                }
                key_passed = true;
            }

            if let Some(extra) = node.rules.extra {
                let merged = self.merge(extra, Some(source), target, child_path, depth + 1).await?;
                return Ok((key.to_string(), merged));
            }
            if node.rules.arbitrary || key_passed || !node.closed() {
                Ok((key.to_string(), Some(source.clone())))
            } else if node.rules.tolerant {
                Ok((key.to_string(), None))
            } else {
                Err(Box::new(checks::illegal(node, &child_path, key)))
            }
        }
        .boxed()
    }

    pub(super) async fn array(
        &self,
        node: &Node,
        source: &[Value],
        target: Option<&Value>,
        path: &str,
        depth: usize,
    ) -> Merged {
        let mut items = source.to_vec();
        if let Some(Injection::Offsets(points)) = &node.ops.inject {
            scalars::splice(&mut items, points.iter().map(|(at, v)| (*at, v.clone())));
        }

        let items = if node.rules.sequence.is_some() || node.rules.extra.is_some() {
            self.elements(node, &items, path, depth).await?
        } else {
            items
        };

        let target = target.and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
        let items = if node.rules.unique {
            let kept_target: &[Value] = if node.ops.placement.is_some() { target } else { &[] };
            let mut kept: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                let seen = kept_target.iter().chain(kept.iter()).any(|k| same_value(k, &item));
                if !seen {
                    kept.push(item);
                }
            }
            kept
        } else {
            items
        };

        let mut items = match &node.ops.placement {
            Some(Placement::Append) => [target, items.as_slice()].concat(),
            Some(Placement::Prepend) => [items.as_slice(), target].concat(),
            Some(Placement::Insert(at)) => {
                let at = (*at).min(target.len());
                [&target[..at], items.as_slice(), &target[at..]].concat()
            }
            Some(Placement::Nest(_)) | None => items,
        };

        if let Some(trim) = node.ops.trim {
            items = scalars::trim(items, trim);
        }

        match &node.ops.group {
            Some(by) => Ok(group(items, by)),
            None => Ok(Value::Array(items)),
        }
    }

    /// Per-element merges through `.sequence` positions and `.extra`
    async fn elements(
        &self,
        node: &Node,
        items: &[Value],
        path: &str,
        depth: usize,
    ) -> Result<Vec<Value>, Box<ValidationError>> {
        let sequence = node.rules.sequence.as_deref().unwrap_or_default();
        let mut merges: Vec<BoxFuture<'_, Outcome>> = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let item_path = join_path(path, i);
            match (sequence.get(i).copied(), node.rules.extra) {
                (Some(id), _) | (None, Some(id)) => {
                    merges.push(self.merge(id, Some(item), None, item_path, depth + 1));
                }
                (None, None) => {
                    return Err(Box::new(
                        ValidationError::new(
                            ErrorKind::Illegal,
                            item_path,
                            &node.path,
                            "element lies beyond the declared '.sequence'",
                        )
                        .actual(item.clone()),
                    ));
                }
            }
        }
        for (i, id) in sequence.iter().enumerate().skip(items.len()) {
            merges.push(self.merge(*id, None, None, join_path(path, i), depth + 1));
        }
        Ok(try_join_all(merges).await?.into_iter().flatten().collect())
    }
}

/// Array of objects into an object of arrays, keyed by the value at `by`
fn group(items: Vec<Value>, by: &[String]) -> Value {
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for item in items {
        let key = match lookup(&item, by) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "undefined".to_string(),
        };
        groups.entry(key).or_default().push(item);
    }
    Value::Object(
        groups
            .into_iter()
            .map(|(key, members)| (key, Value::Array(members)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use crate::error::{Error, ErrorKind};
    use crate::functions::Registry;
    use crate::schema::Schema;
    use rstest::rstest;
    use serde_json::{Value, json};

    fn schema(raw: Value) -> Schema {
        Schema::compile(&raw, &Registry::new()).unwrap()
    }

    #[test]
    fn test_object_merge_keeps_target_keys() {
        let s = schema(json!({"a": "number", "b": {".type": "string", ".optional": true}, ".tolerant": true}));
        let merged = s
            .transform(&json!({"a": 2, "z": 1}), Some(&json!({"a": 1, "b": "keep", "z": 9})))
            .unwrap();
        assert_eq!(merged, json!({"a": 2, "b": "keep", "z": 9}));
    }

    #[test]
    fn test_arbitrary_copies_unknown_keys() {
        let s = schema(json!({".arbitrary": true}));
        assert_eq!(
            s.transform(&json!({"x": [1, 2]}), Some(&json!({"y": 0}))).unwrap(),
            json!({"x": [1, 2], "y": 0})
        );
    }

    #[test]
    fn test_unknown_key_is_illegal() {
        let s = schema(json!({"a": "number"}));
        match s.transform(&json!({"a": 1, "b": 2}), None) {
            Err(Error::Validation(e)) => {
                assert_eq!(e.kind, ErrorKind::Illegal);
                assert_eq!(e.path, "b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rename_drop_inject() {
        let s = schema(json!({
            ".rename": {"old": "new"},
            ".drop": ["secret"],
            ".inject": {"version": 2},
            ".arbitrary": true
        }));
        assert_eq!(
            s.transform(&json!({"old": 1, "secret": "x", "keep": true}), None).unwrap(),
            json!({"new": 1, "keep": true, "version": 2})
        );
    }

    #[test]
    fn test_nest_under_target_key() {
        let s = schema(json!({".insert": "inner", "a": "number"}));
        assert_eq!(
            s.transform(&json!({"a": 3}), Some(&json!({"other": 1, "inner": {"a": 1}}))).unwrap(),
            json!({"other": 1, "inner": {"a": 3}})
        );
        assert_eq!(
            s.transform(&json!({"a": 3}), None).unwrap(),
            json!({"inner": {"a": 3}})
        );
    }

    #[test]
    fn test_match_children_merge() {
        let s = schema(json!({".matchChildren": {"^n": {".type": "number", ".add": true}}}));
        assert_eq!(
            s.transform(&json!({"n1": 2}), Some(&json!({"n1": 3, "n2": 4}))).unwrap(),
            json!({"n1": 5, "n2": 4})
        );
    }

    #[test]
    fn test_unique_append() {
        let s = schema(json!({".append": true, ".unique": true}));
        assert_eq!(
            s.transform(&json!([0, 1, 2, 2, 1, 2, 5]), Some(&json!([0, 1, 32, 3, 8]))).unwrap(),
            json!([0, 1, 32, 3, 8, 2, 5])
        );
    }

    #[rstest]
    #[case(json!({".append": true}), json!([1, 2, 8, 9]))]
    #[case(json!({".prepend": true}), json!([8, 9, 1, 2]))]
    #[case(json!({".insert": 1}), json!([1, 8, 9, 2]))]
    #[case(json!({".insert": 10}), json!([1, 2, 8, 9]))]
    #[case(json!({".type": "array"}), json!([8, 9]))]
    fn test_array_placement(#[case] raw: Value, #[case] expected: Value) {
        let merged = schema(raw).transform(&json!([8, 9]), Some(&json!([1, 2]))).unwrap();
        assert_eq!(merged, expected);
    }

    #[rstest]
    #[case(json!({".clip": 2}), json!([1, 2]))]
    #[case(json!({".clip": -2}), json!([4, 5]))]
    #[case(json!({".slice": [1, 3]}), json!([2, 3]))]
    #[case(json!({".slice": [-2]}), json!([4, 5]))]
    fn test_array_trim(#[case] raw: Value, #[case] expected: Value) {
        assert_eq!(schema(raw).transform(&json!([1, 2, 3, 4, 5]), None).unwrap(), expected);
    }

    #[test]
    fn test_array_inject_offsets() {
        let s = schema(json!({".inject": [[0, "a"], [2, "b"], [null, "z"]]}));
        assert_eq!(
            s.transform(&json!([1, 2, 3]), None).unwrap(),
            json!(["a", 1, 2, "b", 3, "z"])
        );
    }

    #[test]
    fn test_group_by_path() {
        let s = schema(json!({".group": "kind"}));
        let merged = s
            .transform(
                &json!([{"kind": "a", "n": 1}, {"kind": "b", "n": 2}, {"kind": "a", "n": 3}]),
                None,
            )
            .unwrap();
        assert_eq!(
            merged,
            json!({
                "a": [{"kind": "a", "n": 1}, {"kind": "a", "n": 3}],
                "b": [{"kind": "b", "n": 2}]
            })
        );
    }

    #[test]
    fn test_sequence_element_merges() {
        let s = schema(json!({".sequence": [{".type": "string", ".case": "upper"}, "number"]}));
        assert_eq!(s.transform(&json!(["a", 1]), None).unwrap(), json!(["A", 1]));
        assert!(s.transform(&json!(["a", 1, 2]), None).is_err());
        assert!(s.transform(&json!(["a"]), None).is_err());
    }
}
