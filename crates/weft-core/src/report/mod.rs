//! Report engine
//!
//! Evaluates a value against a compiled node and collects every violation
//! instead of stopping at the first. Per node the pass runs:
//!
//! 1. presence: an absent value is fine when optional, otherwise MISSING
//! 2. type gate: a mismatch yields one TYPE error and nothing else
//! 3. local checks and the shape evaluator (children, sequence, `.all`,
//!    `.exists`, ...)
//! 4. composite operators (`.anyOf`, `.oneOf`, `.not`)
//! 5. the custom `.eval` predicate
//!
//! Every child evaluation returns its own error vector, merged by the
//! parent. Siblings are joined concurrently, so asynchronous predicates in
//! different children overlap; on the synchronous path all futures are
//! ready on first poll.

pub(crate) mod checks;
mod containers;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde_json::Value;

use crate::error::{ErrorKind, ValidationError};
use crate::functions::Predicate;
use crate::schema::node::{Node, NodeId};
use crate::schema::{Arena, Mode};
use crate::types::TypeTag;

pub(crate) struct Reporter<'s> {
    arena: &'s Arena,
    mode: Mode,
    max_depth: usize,
}

impl<'s> Reporter<'s> {
    pub fn new(arena: &'s Arena, mode: Mode, max_depth: usize) -> Self {
        Self {
            arena,
            mode,
            max_depth,
        }
    }

    /// Report `value` (absent when `None`) against node `id`
    pub fn check<'a>(
        &'a self,
        id: NodeId,
        value: Option<&'a Value>,
        path: String,
        depth: usize,
    ) -> BoxFuture<'a, Vec<ValidationError>> {
        async move {
            let (node, optional) = self.arena.resolve(id);
            let Some(value) = value else {
                return if optional {
                    Vec::new()
                } else {
                    vec![checks::missing(node, &path)]
                };
            };
            if depth > self.max_depth {
                return vec![checks::too_deep(node, &path, self.max_depth)];
            }
            let shape = match checks::gate(node, value, &path) {
                Ok(shape) => shape,
                Err(e) => return vec![e],
            };

            let mut errors = checks::local(node, value, shape, &path);
            match (shape, value) {
                (TypeTag::Object, Value::Object(map)) => {
                    errors.extend(self.object(node, map, &path, depth).await);
                }
                (TypeTag::Array, Value::Array(items)) => {
                    errors.extend(self.array(node, items, &path, depth).await);
                }
                _ => {}
            }
            errors.extend(self.composites(node, value, &path, depth).await);
            errors.extend(self.predicate(node, value, &path).await);
            errors
        }
        .boxed()
    }

    async fn composites(
        &self,
        node: &Node,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !node.rules.any_of.is_empty() {
            let mut cause = Vec::new();
            let mut matched = false;
            for alternative in &node.rules.any_of {
                let alt_errors = self.check(*alternative, Some(value), path.to_string(), depth).await;
                if alt_errors.is_empty() {
                    matched = true;
                    break;
                }
                cause.extend(alt_errors);
            }
            tracing::trace!(path, matched, "anyOf evaluated");
            if !matched {
                errors.push(
                    ValidationError::new(
                        ErrorKind::Format,
                        path,
                        &node.path,
                        "matches none of the '.anyOf' alternatives",
                    )
                    .cause(cause),
                );
            }
        }

        if !node.rules.one_of.is_empty() {
            let outcomes = join_all(
                node.rules
                    .one_of
                    .iter()
                    .map(|alt| self.check(*alt, Some(value), path.to_string(), depth)),
            )
            .await;
            let passed = outcomes.iter().filter(|e| e.is_empty()).count();
            tracing::trace!(path, passed, "oneOf evaluated");
            if passed != 1 {
                let cause = if passed == 0 {
                    outcomes.into_iter().flatten().collect()
                } else {
                    Vec::new()
                };
                errors.push(
                    ValidationError::new(
                        ErrorKind::Format,
                        path,
                        &node.path,
                        format!("matches {passed} '.oneOf' alternatives, expected exactly one"),
                    )
                    .expected(1)
                    .actual(passed)
                    .cause(cause),
                );
            }
        }

        if let Some(not) = node.rules.not {
            if self.check(not, Some(value), path.to_string(), depth).await.is_empty() {
                errors.push(ValidationError::new(
                    ErrorKind::Format,
                    path,
                    &node.path,
                    "matches the '.not' schema",
                ));
            }
        }

        errors
    }

    /// Run the node's `.eval` predicate, if any
    pub async fn predicate(&self, node: &Node, value: &Value, path: &str) -> Option<ValidationError> {
        let outcome = match node.rules.eval.as_ref()? {
            Predicate::Sync(f) => (f.as_ref())(value),
            Predicate::Async(_) if self.mode == Mode::Sync => {
                return Some(ValidationError::new(
                    ErrorKind::Sync,
                    path,
                    &node.path,
                    "asynchronous '.eval' reached on a synchronous call",
                ));
            }
            Predicate::Async(f) => f.check(value).await,
        };
        outcome.err().map(|e| {
            ValidationError::new(ErrorKind::Invalid, path, &node.path, "rejected by '.eval'")
                .reason(e.to_string())
                .actual(value.clone())
        })
    }
}
