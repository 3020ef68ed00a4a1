//! Compiled schemas and their entry points
//!
//! A [`Schema`] is compiled once from a raw description and then used
//! read-only for any number of `report`, `validate` and `transform` calls.
//! Cloning is cheap: the node arena is shared behind an `Arc`, so a schema
//! can be moved into spawned tasks.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use weft_core::{ErrorKind, Registry, Schema};
//!
//! let schema = Schema::compile(
//!     &json!({"able": {".type": "number", ".min": 0}}),
//!     &Registry::new(),
//! )?;
//! let errors = schema.report(&json!({"able": -1}));
//! assert_eq!(errors[0].kind, ErrorKind::Limit);
//! # Ok::<(), weft_core::Error>(())
//! ```

mod compiler;
mod format;
pub(crate) mod node;

use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::{Error, ErrorKind, Result, ValidationError};
use crate::functions::Registry;
use crate::report::Reporter;
use crate::transform::Merger;

pub use node::NodeId;
use node::{Node, Slot};

/// Whether custom async functions may be awaited during an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Sync,
    Async,
}

#[derive(Debug)]
pub(crate) struct Arena {
    slots: Vec<Slot>,
    root: NodeId,
}

impl Arena {
    /// Resolve a node, following a `.recurse` link
    ///
    /// The returned flag is the effective optionality: a link's own
    /// `.optional` applies on top of its target's.
    pub fn resolve(&self, id: NodeId) -> (&Node, bool) {
        match &self.slots[id.0] {
            Slot::Node(node) => (node, node.optional),
            Slot::Link { target, optional } => {
                let (node, target_optional) = self.resolve(*target);
                (node, *optional || target_optional)
            }
            Slot::Pending => unreachable!("compiled arenas contain no pending slots"),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// A compiled schema
#[derive(Debug, Clone)]
pub struct Schema {
    arena: Arc<Arena>,
    config: EngineConfig,
}

impl Schema {
    /// Compile a raw schema description
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`] if the description is structurally
    /// invalid: unknown constraints, malformed constraint values, bad
    /// regular expressions, unregistered functions or an unresolvable
    /// `.recurse`.
    pub fn compile(raw: &Value, registry: &Registry) -> Result<Self> {
        let (slots, root) = compiler::Compiler::new(registry).finish(raw)?;
        tracing::debug!(nodes = slots.len(), "compiled schema");
        Ok(Self {
            arena: Arc::new(Arena { slots, root }),
            config: EngineConfig::default(),
        })
    }

    /// Replace the engine configuration used by this schema
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Engine configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of compiled nodes, `.recurse` links included
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Report every violation in `value`
    ///
    /// Never fails for data problems: the returned list is empty when the
    /// value conforms. Asynchronous predicates cannot run on this path and
    /// are reported as [`ErrorKind::Sync`].
    pub fn report(&self, value: &Value) -> Vec<ValidationError> {
        let reporter = Reporter::new(&self.arena, Mode::Sync, self.config.depth_limit());
        let errors = reporter
            .check(self.arena.root(), Some(value), String::new(), 0)
            .now_or_never()
            .unwrap_or_else(|| vec![suspended()]);
        tracing::debug!(errors = errors.len(), "report finished");
        errors
    }

    /// Report every violation in `value`, awaiting asynchronous predicates
    ///
    /// Sibling children are evaluated concurrently; the order of errors
    /// across siblings is not part of the contract.
    pub async fn report_async(&self, value: &Value) -> Vec<ValidationError> {
        let reporter = Reporter::new(&self.arena, Mode::Async, self.config.depth_limit());
        let check = reporter.check(self.arena.root(), Some(value), String::new(), 0);
        let errors = match self.config.deadline() {
            Some(deadline) => match tokio::time::timeout(deadline, check).await {
                Ok(errors) => errors,
                Err(_) => vec![deadline_exceeded(deadline)],
            },
            None => check.await,
        };
        tracing::debug!(errors = errors.len(), "async report finished");
        errors
    }

    /// Report `value` on the current tokio runtime and hand the errors to
    /// `on_done`
    ///
    /// `on_done` is called exactly once, from a spawned task, so it never
    /// runs before this method has returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] when called outside a tokio runtime.
    pub fn report_with<F>(&self, value: Value, on_done: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(Vec<ValidationError>) + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let schema = self.clone();
        Ok(handle.spawn(async move {
            let errors = schema.report_async(&value).await;
            on_done(errors);
        }))
    }

    /// Fail with the first violation in `value`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] carrying the first error `report` finds.
    pub fn validate(&self, value: &Value) -> Result<()> {
        match self.report(value).into_iter().next() {
            Some(first) => Err(first.into()),
            None => Ok(()),
        }
    }

    /// Async counterpart of [`Schema::validate`]
    pub async fn validate_async(&self, value: &Value) -> Result<()> {
        match self.report_async(value).await.into_iter().next() {
            Some(first) => Err(first.into()),
            None => Ok(()),
        }
    }

    /// Merge `source` into `target` under the schema's transform rules
    ///
    /// The inputs are never modified; the result is a new value. A missing
    /// target is passed as `None`.
    ///
    /// # Errors
    ///
    /// Fails fast with [`Error::Validation`] on the first violated
    /// constraint; no partial result is returned.
    pub fn transform(&self, source: &Value, target: Option<&Value>) -> Result<Value> {
        let merger = Merger::new(&self.arena, Mode::Sync, self.config.depth_limit());
        let merged = merger
            .merge(self.arena.root(), Some(source), target, String::new(), 0)
            .now_or_never()
            .unwrap_or_else(|| Err(Box::new(suspended())));
        finish_transform(merged)
    }

    /// Async counterpart of [`Schema::transform`]
    pub async fn transform_async(&self, source: &Value, target: Option<&Value>) -> Result<Value> {
        let merger = Merger::new(&self.arena, Mode::Async, self.config.depth_limit());
        let merge = merger.merge(self.arena.root(), Some(source), target, String::new(), 0);
        let merged = match self.config.deadline() {
            Some(deadline) => match tokio::time::timeout(deadline, merge).await {
                Ok(merged) => merged,
                Err(_) => Err(Box::new(deadline_exceeded(deadline))),
            },
            None => merge.await,
        };
        finish_transform(merged)
    }

    /// Transform on the current tokio runtime and hand the outcome to
    /// `on_done`, which is called exactly once from a spawned task
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] when called outside a tokio runtime.
    pub fn transform_with<F>(
        &self,
        source: Value,
        target: Option<Value>,
        on_done: F,
    ) -> Result<JoinHandle<()>>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let schema = self.clone();
        Ok(handle.spawn(async move {
            let outcome = schema.transform_async(&source, target.as_ref()).await;
            on_done(outcome);
        }))
    }
}

fn finish_transform(
    merged: std::result::Result<Option<Value>, Box<ValidationError>>,
) -> Result<Value> {
    match merged {
        Ok(value) => {
            tracing::debug!("transform finished");
            Ok(value.unwrap_or(Value::Null))
        }
        Err(e) => {
            tracing::debug!(kind = %e.kind, path = %e.path, "transform failed");
            Err(Error::Validation(e))
        }
    }
}

fn suspended() -> ValidationError {
    ValidationError::new(
        ErrorKind::Sync,
        "",
        "",
        "evaluation suspended on a synchronous call",
    )
}

fn deadline_exceeded(deadline: std::time::Duration) -> ValidationError {
    ValidationError::new(
        ErrorKind::Invalid,
        "",
        "",
        format!("evaluation exceeded its {}ms deadline", deadline.as_millis()),
    )
}
