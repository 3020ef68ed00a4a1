//! Custom functions referenced by `.eval` and `.transform`
//!
//! Raw schemas name functions by string; the [`Registry`] handed to the
//! compiler maps those names to implementations. Each function is either
//! synchronous or asynchronous, and the variant decides how the engine calls
//! it: an asynchronous function reached from a synchronous entry point is
//! reported as a `SYNC` error instead of being run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Error type returned by custom functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type SyncCheck = dyn Fn(&Value) -> Result<(), BoxError> + Send + Sync;
type SyncMap = dyn Fn(Value) -> Result<Value, BoxError> + Send + Sync;

/// Asynchronous predicate over a value
#[async_trait]
pub trait AsyncCheck: Send + Sync {
    /// Accept (`Ok`) or reject (`Err`) the value
    async fn check(&self, value: &Value) -> Result<(), BoxError>;
}

/// Asynchronous value-to-value function
#[async_trait]
pub trait AsyncMap: Send + Sync {
    /// Produce the replacement value
    async fn apply(&self, value: Value) -> Result<Value, BoxError>;
}

/// A `.eval` predicate
#[derive(Clone)]
pub enum Predicate {
    /// Called directly on every entry point
    Sync(Arc<SyncCheck>),
    /// Awaited; only callable from the async entry points
    Async(Arc<dyn AsyncCheck>),
}

impl Predicate {
    /// Wrap a synchronous closure
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Predicate::Sync(Arc::new(f))
    }

    /// Wrap an async closure taking an owned copy of the value
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Predicate::Async(Arc::new(FnCheck(f)))
    }

    /// Whether this predicate must be awaited
    pub fn is_async(&self) -> bool {
        matches!(self, Predicate::Async(_))
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Sync(_) => f.write_str("Predicate::Sync"),
            Predicate::Async(_) => f.write_str("Predicate::Async"),
        }
    }
}

/// A `.transform` function applied to a merged value
#[derive(Clone)]
pub enum TransformFn {
    /// Called directly on every entry point
    Sync(Arc<SyncMap>),
    /// Awaited; only callable from the async entry points
    Async(Arc<dyn AsyncMap>),
}

impl TransformFn {
    /// Wrap a synchronous closure
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        TransformFn::Sync(Arc::new(f))
    }

    /// Wrap an async closure
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        TransformFn::Async(Arc::new(FnMap(f)))
    }

    /// Whether this function must be awaited
    pub fn is_async(&self) -> bool {
        matches!(self, TransformFn::Async(_))
    }
}

impl std::fmt::Debug for TransformFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformFn::Sync(_) => f.write_str("TransformFn::Sync"),
            TransformFn::Async(_) => f.write_str("TransformFn::Async"),
        }
    }
}

struct FnCheck<F>(F);

#[async_trait]
impl<F, Fut> AsyncCheck for FnCheck<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn check(&self, value: &Value) -> Result<(), BoxError> {
        (self.0)(value.clone()).await
    }
}

struct FnMap<F>(F);

#[async_trait]
impl<F, Fut> AsyncMap for FnMap<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    async fn apply(&self, value: Value) -> Result<Value, BoxError> {
        (self.0)(value).await
    }
}

/// Named functions available to a schema at compile time
#[derive(Debug, Clone, Default)]
pub struct Registry {
    predicates: HashMap<String, Predicate>,
    transforms: HashMap<String, TransformFn>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `.eval` predicate under `name`
    pub fn predicate(mut self, name: impl Into<String>, predicate: Predicate) -> Self {
        self.predicates.insert(name.into(), predicate);
        self
    }

    /// Register a `.transform` function under `name`
    pub fn transform(mut self, name: impl Into<String>, function: TransformFn) -> Self {
        self.transforms.insert(name.into(), function);
        self
    }

    pub(crate) fn get_predicate(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(name)
    }

    pub(crate) fn get_transform(&self, name: &str) -> Option<&TransformFn> {
        self.transforms.get(name)
    }
}
