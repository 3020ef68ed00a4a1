//! Compiled schema nodes
//!
//! A compiled schema is an arena of [`Slot`]s addressed by [`NodeId`]. Every
//! sub-schema (`.all`, `.exists`, `.sequence`, alternatives, ...) lives in the
//! same arena, and a `.recurse` reference is a [`Slot::Link`] back to an
//! ancestor's index.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};

use crate::functions::{Predicate, TransformFn};
use crate::types::TypeTag;

/// Index of a node inside its schema arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Arena entry
#[derive(Debug)]
pub(crate) enum Slot {
    /// Placeholder while the node's own sub-schemas are compiled
    Pending,
    Node(Box<Node>),
    /// `.recurse` reference to an ancestor
    Link { target: NodeId, optional: bool },
}

/// One compiled schema fragment
#[derive(Debug, Default)]
pub(crate) struct Node {
    /// Location from the schema root
    pub path: String,
    pub ty: Option<TypeTag>,
    pub optional: bool,
    pub children: BTreeMap<String, NodeId>,
    pub rules: Rules,
    pub ops: Ops,
}

/// Report-side constraints, also re-checked after a transform
#[derive(Debug, Default)]
pub(crate) struct Rules {
    pub bounds: Bounds,
    pub modulo: Option<(f64, f64)>,
    pub pattern: Option<Regex>,
    pub format: Option<Format>,

    pub arbitrary: bool,
    pub tolerant: bool,
    pub key_test: Option<NodeId>,
    pub match_children: Vec<(Regex, NodeId)>,
    pub dependencies: Vec<(String, Vec<String>)>,

    pub extra: Option<NodeId>,
    pub all: Option<NodeId>,
    pub exists: Vec<Exists>,
    pub sequence: Option<Vec<NodeId>>,
    pub unique: bool,
    pub sort: Option<Vec<SortKey>>,

    pub any_of: Vec<NodeId>,
    pub one_of: Vec<NodeId>,
    pub not: Option<NodeId>,

    pub eval: Option<Predicate>,
    pub transform: Option<TransformFn>,
}

/// Numeric bounds; for containers and strings they apply to the size
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub exclusive_min: Option<f64>,
    pub exclusive_max: Option<f64>,
    pub length: Option<f64>,
}

/// `.exists` sub-schema with its `.times` quantifier
#[derive(Debug, Clone, Copy)]
pub(crate) struct Exists {
    pub node: NodeId,
    pub times: usize,
}

/// One key of a `.sort` comparator
#[derive(Debug, Clone)]
pub(crate) struct SortKey {
    /// Sub-path inside each element; empty compares the element itself
    pub path: Vec<String>,
    pub descending: bool,
}

/// Named string formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    DateTime,
    Date,
    Email,
    Uuid,
    Ipv4,
    Hostname,
    Uri,
}

/// Transform-only operators
#[derive(Debug, Default)]
pub(crate) struct Ops {
    pub cast: bool,
    pub math: Option<MathOp>,
    pub normalize: Option<(f64, f64)>,
    pub modulate: Option<f64>,
    pub invert: bool,
    pub reciprocal: bool,

    pub inject: Option<Injection>,
    pub placement: Option<Placement>,
    pub rename: Vec<(String, String)>,
    pub drop: Vec<String>,
    pub trim: Option<Trim>,
    pub case: Option<Case>,
    pub split: Option<String>,
    pub group: Option<Vec<String>>,
}

impl Ops {
    pub fn is_empty(&self) -> bool {
        !self.cast
            && self.math.is_none()
            && self.normalize.is_none()
            && self.modulate.is_none()
            && !self.invert
            && !self.reciprocal
            && self.inject.is_none()
            && self.placement.is_none()
            && self.rename.is_empty()
            && self.drop.is_empty()
            && self.trim.is_none()
            && self.case.is_none()
            && self.split.is_none()
            && self.group.is_none()
    }

    /// `.split` and `.group` hand back a different shape than they receive
    pub fn reshapes(&self) -> bool {
        self.split.is_some() || self.group.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug)]
pub(crate) enum Injection {
    /// Literal key/value pairs for objects
    Fields(Map<String, Value>),
    /// `(offset, value)` pairs for arrays and strings; `None` appends
    Offsets(Vec<(Option<usize>, Value)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Splice the source into the target at an offset
    Insert(usize),
    /// Nest the merged object under a key of the target
    Nest(String),
    Append,
    Prepend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trim {
    Clip(i64),
    Slice(i64, Option<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Case {
    Upper,
    Lower,
}

impl Node {
    /// Whether any report-side constraint applies to object values
    pub fn expects_object(&self) -> bool {
        !self.children.is_empty()
            || !self.rules.match_children.is_empty()
            || self.rules.key_test.is_some()
            || !self.rules.dependencies.is_empty()
            || !self.ops.rename.is_empty()
            || !self.ops.drop.is_empty()
            || matches!(self.ops.placement, Some(Placement::Nest(_)))
            || matches!(self.ops.inject, Some(Injection::Fields(_)))
    }

    /// Whether the node is only `.anyOf`/`.oneOf`/`.not` with no shape of
    /// its own, so the alternatives alone describe the value
    pub fn delegates(&self) -> bool {
        self.ty.is_none()
            && self.ops.is_empty()
            && (!self.rules.any_of.is_empty()
                || !self.rules.one_of.is_empty()
                || self.rules.not.is_some())
    }

    /// Whether unknown object keys are rejected unless admitted
    pub fn closed(&self) -> bool {
        self.ty != Some(TypeTag::Any) && !self.delegates()
    }

    /// Whether any constraint only makes sense on arrays
    pub fn expects_array(&self) -> bool {
        self.rules.sequence.is_some()
            || self.rules.unique
            || self.rules.sort.is_some()
            || self.ops.trim.is_some()
            || self.ops.group.is_some()
    }
}
