//! Object and array evaluators of the report pass

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::{Map, Value};

use super::{Reporter, checks};
use crate::error::{ErrorKind, ValidationError, join_path};
use crate::schema::node::{Node, NodeId};

impl Reporter<'_> {
    pub(super) async fn object(
        &self,
        node: &Node,
        map: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) -> Vec<ValidationError> {
        let named = join_all(node.children.iter().map(|(name, id)| {
            self.check(*id, map.get(name), join_path(path, name), depth + 1)
        }));
        let unknown = join_all(
            map.iter()
                .filter(|(key, _)| !node.children.contains_key(*key))
                .map(|(key, value)| self.entry(node, key, value, path, depth)),
        );
        let (named, unknown) = futures::join!(named, unknown);
        let mut errors: Vec<ValidationError> =
            named.into_iter().chain(unknown).flatten().collect();

        for (key, required) in &node.rules.dependencies {
            if !map.contains_key(key) {
                continue;
            }
            errors.extend(required.iter().filter(|r| !map.contains_key(*r)).map(|r| {
                ValidationError::new(
                    ErrorKind::Missing,
                    join_path(path, r),
                    &node.path,
                    format!("required because '{key}' is present"),
                )
                .expected(r.as_str())
            }));
        }

        let items: Vec<(String, &Value)> = map
            .iter()
            .map(|(key, value)| (join_path(path, key), value))
            .collect();
        errors.extend(self.quantifiers(node, path, &items, depth).await);
        errors
    }

    /// A key with no named child: patterns, key test, `.extra`, then the
    /// permissive flags; otherwise the key is ILLEGAL on a closed node
    fn entry<'a>(
        &'a self,
        node: &'a Node,
        key: &'a str,
        value: &'a Value,
        path: &str,
        depth: usize,
    ) -> BoxFuture<'a, Vec<ValidationError>> {
        let child_path = join_path(path, key);
        async move {
            if let Some((_, id)) = node.rules.match_children.iter().find(|(re, _)| re.is_match(key)) {
                return self.check(*id, Some(value), child_path, depth + 1).await;
            }

            let mut key_passed = false;
            if let Some(test) = node.rules.key_test {
                let key_value = Value::String(key.to_string());
                let errors = self
                    .check(test, Some(&key_value), child_path.clone(), depth + 1)
                    .await;
                if !errors.is_empty() {
                    return vec![checks::illegal(node, &child_path, key).cause(errors)];
                }
                key_passed = true;
            }

            if let Some(extra) = node.rules.extra {
                return self.check(extra, Some(value), child_path, depth + 1).await;
            }
            if node.rules.arbitrary || node.rules.tolerant || key_passed || !node.closed() {
                Vec::new()
            } else {
                vec![checks::illegal(node, &child_path, key)]
            }
        }
        .boxed()
    }

    pub(super) async fn array(
        &self,
        node: &Node,
        items: &[Value],
        path: &str,
        depth: usize,
    ) -> Vec<ValidationError> {
        let mut errors: Vec<ValidationError> = match &node.rules.sequence {
            Some(sequence) => {
                let len = sequence.len().max(items.len());
                let positions: Vec<BoxFuture<'_, Vec<ValidationError>>> = (0..len)
                    .map(|i| self.position(node, sequence.get(i).copied(), items.get(i), join_path(path, i), depth))
                    .collect();
                join_all(positions).await.into_iter().flatten().collect()
            }
            None => match node.rules.extra {
                Some(extra) => join_all(items.iter().enumerate().map(|(i, item)| {
                    self.check(extra, Some(item), join_path(path, i), depth + 1)
                }))
                .await
                .into_iter()
                .flatten()
                .collect(),
                None => Vec::new(),
            },
        };

        let items: Vec<(String, &Value)> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (join_path(path, i), item))
            .collect();
        errors.extend(self.quantifiers(node, path, &items, depth).await);
        errors
    }

    /// One `.sequence` position; elements past the sequence fall to `.extra`
    fn position<'a>(
        &'a self,
        node: &'a Node,
        schema: Option<NodeId>,
        item: Option<&'a Value>,
        item_path: String,
        depth: usize,
    ) -> BoxFuture<'a, Vec<ValidationError>> {
        async move {
            match (schema, node.rules.extra) {
                (Some(id), _) => {
                    let errors = self.check(id, item, item_path.clone(), depth + 1).await;
                    match item {
                        Some(item) if !errors.is_empty() => vec![
                            ValidationError::new(
                                ErrorKind::Format,
                                item_path,
                                &node.path,
                                "element does not match its '.sequence' position",
                            )
                            .actual(item.clone())
                            .cause(errors),
                        ],
                        _ => errors,
                    }
                }
                (None, Some(extra)) => self.check(extra, item, item_path, depth + 1).await,
                (None, None) => vec![
                    ValidationError::new(
                        ErrorKind::Illegal,
                        item_path,
                        &node.path,
                        "element lies beyond the declared '.sequence'",
                    )
                    .actual(item.cloned().unwrap_or(Value::Null)),
                ],
            }
        }
        .boxed()
    }

    /// `.all` and `.exists` over the children of a container
    pub(crate) async fn quantifiers(
        &self,
        node: &Node,
        path: &str,
        items: &[(String, &Value)],
        depth: usize,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(all) = node.rules.all {
            let outcomes = join_all(
                items
                    .iter()
                    .map(|(item_path, item)| self.check(all, Some(*item), item_path.clone(), depth + 1)),
            )
            .await;
            for ((item_path, item), cause) in items.iter().zip(outcomes) {
                if !cause.is_empty() {
                    errors.push(
                        ValidationError::new(
                            ErrorKind::Format,
                            item_path.as_str(),
                            &node.path,
                            "does not satisfy '.all'",
                        )
                        .actual((*item).clone())
                        .cause(cause),
                    );
                }
            }
        }

        if !node.rules.exists.is_empty() {
            let outcomes = join_all(node.rules.exists.iter().map(|exists| {
                join_all(items.iter().map(|(item_path, item)| {
                    self.check(exists.node, Some(*item), item_path.clone(), depth + 1)
                }))
            }))
            .await;

            let mut consumed = vec![false; items.len()];
            for (exists, candidates) in node.rules.exists.iter().zip(outcomes) {
                let mut matched = 0;
                for (i, candidate) in candidates.iter().enumerate() {
                    if matched == exists.times {
                        break;
                    }
                    if !consumed[i] && candidate.is_empty() {
                        consumed[i] = true;
                        matched += 1;
                    }
                }
                tracing::trace!(path, matched, times = exists.times, "exists evaluated");
                if matched < exists.times {
                    errors.push(
                        ValidationError::new(
                            ErrorKind::Missing,
                            path,
                            &node.path,
                            format!(
                                "{matched} of the required {} elements match '.exists'",
                                exists.times
                            ),
                        )
                        .expected(exists.times)
                        .actual(matched)
                        .cause(candidates.into_iter().flatten().collect()),
                    );
                }
            }
        }

        errors
    }
}
