//! Weft Core Library
//!
//! This crate provides the schema engine behind `weft`:
//! - Schema compilation from JSON/YAML descriptions
//! - Reporting every violation in a document
//! - Merging a source document into a target under transform rules
//! - Custom synchronous and asynchronous predicates and transforms
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Raw schema  │────▶│  Compiled   │────▶│   Report    │
//! │ (JSON/YAML) │     │   Schema    │  │  │   Engine    │
//! └─────────────┘     └─────────────┘  │  └─────────────┘
//!                                      │  ┌─────────────┐
//!                                      └─▶│  Transform  │
//!                                         │   Engine    │
//!                                         └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use weft_core::{Registry, Schema};
//!
//! let schema = Schema::compile(
//!     &json!({"total": {".type": "number", ".add": true}}),
//!     &Registry::new(),
//! )?;
//! let merged = schema.transform(&json!({"total": 3}), Some(&json!({"total": 4})))?;
//! assert_eq!(merged, json!({"total": 7}));
//! # Ok::<(), weft_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod functions;
pub(crate) mod report;
pub mod schema;
pub(crate) mod transform;
pub mod types;

pub use config::{EngineConfig, read_value};
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use functions::{AsyncCheck, AsyncMap, BoxError, Predicate, Registry, TransformFn};
pub use schema::{NodeId, Schema};
pub use types::{TypeTag, classify};
