//! Raw schema description → compiled node arena
//!
//! Keys starting with `.` are constraints, every other key names a child
//! (`..name` names a child called `.name`). A bare string is shorthand for
//! `{".type": <string>}`. Unknown constraints, malformed constraint values
//! and unresolvable `.recurse` references are rejected here, so evaluation
//! never has to interpret raw descriptions.

use regex::Regex;
use serde_json::{Map, Value};

use super::node::{
    Case, Exists, Format, Injection, MathOp, Node, NodeId, Placement, Slot, SortKey, Trim,
};
use crate::error::{Error, Result, join_path};
use crate::functions::Registry;
use crate::types::TypeTag;

/// Ancestor on the compile stack, with the document level it evaluates at
struct Frame {
    id: NodeId,
    level: usize,
}

pub(crate) struct Compiler<'r> {
    registry: &'r Registry,
    slots: Vec<Slot>,
    stack: Vec<Frame>,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            slots: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// Compile a whole description, returning the arena and its root
    pub fn finish(mut self, raw: &Value) -> Result<(Vec<Slot>, NodeId)> {
        let root = self.node(raw, "", 0)?;
        Ok((self.slots, root))
    }

    fn node(&mut self, raw: &Value, path: &str, level: usize) -> Result<NodeId> {
        let shorthand;
        let map = match raw {
            Value::Object(map) => map,
            Value::String(name) => {
                let mut map = Map::new();
                map.insert(".type".to_string(), Value::String(name.clone()));
                shorthand = map;
                &shorthand
            }
            _ => {
                return Err(Error::compile(
                    path,
                    "schema must be an object or a type name",
                ));
            }
        };

        if let Some(depth) = map.get(".recurse") {
            return self.link(map, depth, path, level);
        }

        let id = NodeId(self.slots.len());
        self.slots.push(Slot::Pending);
        self.stack.push(Frame { id, level });
        let node = self.fill(map, path, level);
        self.stack.pop();
        self.slots[id.0] = Slot::Node(Box::new(node?));
        Ok(id)
    }

    fn link(
        &mut self,
        map: &Map<String, Value>,
        depth: &Value,
        path: &str,
        level: usize,
    ) -> Result<NodeId> {
        if let Some(key) = map.keys().find(|k| *k != ".recurse" && *k != ".optional") {
            return Err(Error::compile(
                path,
                format!("'.recurse' cannot be combined with '{key}'"),
            ));
        }
        let depth = depth
            .as_u64()
            .filter(|d| *d >= 1)
            .ok_or_else(|| Error::compile(path, "'.recurse' must be a positive integer"))?
            as usize;
        if depth > self.stack.len() {
            return Err(Error::compile(
                path,
                format!("'.recurse' depth {depth} reaches above the schema root"),
            ));
        }
        let target = &self.stack[self.stack.len() - depth];
        let (target, target_level) = (target.id, target.level);
        if target_level >= level {
            return Err(Error::compile(
                path,
                "'.recurse' does not descend into the document and would never terminate",
            ));
        }
        let optional = match map.get(".optional") {
            Some(v) => flag(v, path)?,
            None => false,
        };
        let id = NodeId(self.slots.len());
        self.slots.push(Slot::Link { target, optional });
        Ok(id)
    }

    fn fill(&mut self, map: &Map<String, Value>, path: &str, level: usize) -> Result<Node> {
        let mut node = Node {
            path: path.to_string(),
            ..Default::default()
        };
        let mut is_async = None;

        for (key, value) in map {
            if let Some(literal) = key.strip_prefix("..") {
                self.child(&mut node, format!(".{literal}"), value, path, level)?;
            } else if let Some(name) = key.strip_prefix('.') {
                if name == "async" {
                    is_async = Some(flag(value, path)?);
                } else {
                    self.constraint(&mut node, name, value, path, level)?;
                }
            } else {
                self.child(&mut node, key.clone(), value, path, level)?;
            }
        }

        if let Some(is_async) = is_async {
            let eval = node.rules.eval.as_ref().map(|f| f.is_async());
            let transform = node.rules.transform.as_ref().map(|f| f.is_async());
            if eval.is_none() && transform.is_none() {
                return Err(Error::compile(
                    path,
                    "'.async' requires '.eval' or '.transform'",
                ));
            }
            if eval.is_some_and(|a| a != is_async) || transform.is_some_and(|a| a != is_async) {
                return Err(Error::compile(
                    path,
                    "'.async' disagrees with the registered function",
                ));
            }
        }

        self.settle_type(&mut node)?;
        Ok(node)
    }

    fn settle_type(&self, node: &mut Node) -> Result<()> {
        let (object, array) = (node.expects_object(), node.expects_array());
        if object && array {
            return Err(Error::compile(
                &node.path,
                "object and array constraints cannot be mixed",
            ));
        }
        match node.ty {
            None if object => node.ty = Some(TypeTag::Object),
            None if array => node.ty = Some(TypeTag::Array),
            Some(ty) if object && !matches!(ty, TypeTag::Object | TypeTag::Any) => {
                return Err(Error::compile(
                    &node.path,
                    format!("object constraints on a '{ty}' node"),
                ));
            }
            Some(ty) if array && !matches!(ty, TypeTag::Array | TypeTag::Buffer | TypeTag::Any) => {
                return Err(Error::compile(
                    &node.path,
                    format!("array constraints on a '{ty}' node"),
                ));
            }
            _ => {}
        }
        if node.ops.cast
            && !matches!(
                node.ty,
                Some(TypeTag::Number | TypeTag::Integer | TypeTag::Boolean)
            )
        {
            return Err(Error::compile(
                &node.path,
                "'.cast' needs a number, integer or boolean '.type'",
            ));
        }
        Ok(())
    }

    fn child(
        &mut self,
        node: &mut Node,
        name: String,
        raw: &Value,
        path: &str,
        level: usize,
    ) -> Result<()> {
        let id = self.node(raw, &join_path(path, &name), level + 1)?;
        node.children.insert(name, id);
        Ok(())
    }

    fn constraint(
        &mut self,
        node: &mut Node,
        name: &str,
        value: &Value,
        path: &str,
        level: usize,
    ) -> Result<()> {
        let at = format!("{path}.{name}");
        let rules = &mut node.rules;
        let ops = &mut node.ops;
        match name {
            "type" => {
                let ty = text(value, &at)?
                    .parse::<TypeTag>()
                    .map_err(|e| Error::compile(&at, e))?;
                node.ty = Some(ty);
            }
            "optional" => node.optional = flag(value, &at)?,
            "arbitrary" | "adHoc" => rules.arbitrary = flag(value, &at)?,
            "tolerant" => rules.tolerant = flag(value, &at)?,
            "eval" => {
                let name = text(value, &at)?;
                let predicate = self.registry.get_predicate(name).ok_or_else(|| {
                    Error::compile(&at, format!("no predicate registered as '{name}'"))
                })?;
                rules.eval = Some(predicate.clone());
            }
            "transform" => {
                let name = text(value, &at)?;
                let function = self.registry.get_transform(name).ok_or_else(|| {
                    Error::compile(&at, format!("no transform registered as '{name}'"))
                })?;
                rules.transform = Some(function.clone());
            }

            "min" | "gte" => once(&mut rules.bounds.min, number(value, &at)?, &at)?,
            "max" | "lte" => once(&mut rules.bounds.max, number(value, &at)?, &at)?,
            "exclusiveMin" | "gt" => once(&mut rules.bounds.exclusive_min, number(value, &at)?, &at)?,
            "exclusiveMax" | "lt" => once(&mut rules.bounds.exclusive_max, number(value, &at)?, &at)?,
            "length" => once(&mut rules.bounds.length, number(value, &at)?, &at)?,
            "modulo" => {
                let (divisor, remainder) = pair(value, &at)?;
                if divisor == 0.0 {
                    return Err(Error::compile(&at, "divisor must not be zero"));
                }
                rules.modulo = Some((divisor, remainder));
            }
            "match" | "regex" => once(&mut rules.pattern, regex(text(value, &at)?, &at)?, &at)?,
            "format" => {
                let name = text(value, &at)?;
                let format = Format::parse(name)
                    .ok_or_else(|| Error::compile(&at, format!("unknown format '{name}'")))?;
                rules.format = Some(format);
            }

            "keyTest" => rules.key_test = Some(self.node(value, &at, level + 1)?),
            "matchChildren" => {
                let patterns = value
                    .as_object()
                    .ok_or_else(|| Error::compile(&at, "expected a map of patterns to schemas"))?;
                for (pattern, raw) in patterns {
                    let re = regex(pattern, &at)?;
                    let id = self.node(raw, &join_path(&at, pattern), level + 1)?;
                    node.rules.match_children.push((re, id));
                }
            }
            "dependencies" => {
                let deps = value
                    .as_object()
                    .ok_or_else(|| Error::compile(&at, "expected a map of keys to key lists"))?;
                for (key, required) in deps {
                    rules
                        .dependencies
                        .push((key.clone(), strings(required, &at)?));
                }
            }

            "extra" => rules.extra = Some(self.node(value, &at, level + 1)?),
            "all" => rules.all = Some(self.node(value, &at, level + 1)?),
            "exists" => {
                let exists = self.exists(value, &at, level)?;
                node.rules.exists = exists;
            }
            "sequence" => {
                let items = value
                    .as_array()
                    .ok_or_else(|| Error::compile(&at, "expected a list of schemas"))?;
                let mut ids = Vec::with_capacity(items.len());
                for (i, raw) in items.iter().enumerate() {
                    ids.push(self.node(raw, &join_path(&at, i), level + 1)?);
                }
                node.rules.sequence = Some(ids);
            }
            "unique" => rules.unique = flag(value, &at)?,
            "sort" => rules.sort = Some(sort_keys(value, &at)?),

            "anyOf" | "oneOf" => {
                let items = value
                    .as_array()
                    .filter(|items| !items.is_empty())
                    .ok_or_else(|| Error::compile(&at, "expected a non-empty list of schemas"))?;
                let mut ids = Vec::with_capacity(items.len());
                for (i, raw) in items.iter().enumerate() {
                    ids.push(self.node(raw, &join_path(&at, i), level)?);
                }
                if name == "anyOf" {
                    node.rules.any_of = ids;
                } else {
                    node.rules.one_of = ids;
                }
            }
            "not" => rules.not = Some(self.node(value, &at, level)?),

            "cast" => ops.cast = flag(value, &at)?,
            "add" | "total" | "subtract" | "multiply" | "divide" => {
                if flag(value, &at)? {
                    let op = match name {
                        "subtract" => MathOp::Subtract,
                        "multiply" => MathOp::Multiply,
                        "divide" => MathOp::Divide,
                        _ => MathOp::Add,
                    };
                    once(&mut ops.math, op, &at)?;
                }
            }
            "normalize" => {
                let (lo, hi) = pair(value, &at)?;
                if lo >= hi {
                    return Err(Error::compile(&at, "range must be [low, high] with low < high"));
                }
                ops.normalize = Some((lo, hi));
            }
            "modulate" => {
                let m = number(value, &at)?;
                if m == 0.0 {
                    return Err(Error::compile(&at, "modulus must not be zero"));
                }
                ops.modulate = Some(m);
            }
            "invert" | "inverse" => ops.invert = flag(value, &at)?,
            "reciprocal" => ops.reciprocal = flag(value, &at)?,

            "inject" => ops.inject = Some(injection(value, &at)?),
            "insert" => {
                let placement = match value {
                    Value::String(key) => Placement::Nest(key.clone()),
                    other => Placement::Insert(offset(other, &at)?),
                };
                once(&mut ops.placement, placement, &at)?;
            }
            "append" | "prepend" => {
                if flag(value, &at)? {
                    let placement = if name == "append" {
                        Placement::Append
                    } else {
                        Placement::Prepend
                    };
                    once(&mut ops.placement, placement, &at)?;
                }
            }
            "rename" => {
                let pairs = value
                    .as_object()
                    .ok_or_else(|| Error::compile(&at, "expected a map of old to new names"))?;
                for (from, to) in pairs {
                    ops.rename.push((from.clone(), text(to, &at)?.to_string()));
                }
            }
            "drop" => ops.drop = strings(value, &at)?,
            "clip" => once(&mut ops.trim, Trim::Clip(integer(value, &at)?), &at)?,
            "slice" => {
                let bounds = value
                    .as_array()
                    .filter(|b| !b.is_empty() && b.len() <= 2)
                    .ok_or_else(|| Error::compile(&at, "expected [start] or [start, end]"))?;
                let start = integer(&bounds[0], &at)?;
                let end = bounds.get(1).map(|e| integer(e, &at)).transpose()?;
                once(&mut ops.trim, Trim::Slice(start, end), &at)?;
            }
            "case" => {
                ops.case = Some(match text(value, &at)? {
                    "upper" => Case::Upper,
                    "lower" => Case::Lower,
                    other => {
                        return Err(Error::compile(&at, format!("unknown case '{other}'")));
                    }
                });
            }
            "split" => ops.split = Some(text(value, &at)?.to_string()),
            "group" => {
                ops.group = Some(text(value, &at)?.split('.').map(str::to_string).collect());
            }

            other => {
                return Err(Error::compile(
                    path,
                    format!("unknown constraint '.{other}'"),
                ));
            }
        }
        Ok(())
    }

    fn exists(&mut self, value: &Value, at: &str, level: usize) -> Result<Vec<Exists>> {
        let entries: Vec<(String, &Value)> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (join_path(at, i), v))
                .collect(),
            other => vec![(at.to_string(), other)],
        };
        let mut exists = Vec::with_capacity(entries.len());
        for (path, raw) in entries {
            let (raw, times) = match raw {
                Value::Object(map) => {
                    let mut map = map.clone();
                    let times = match map.remove(".times") {
                        Some(t) => t
                            .as_u64()
                            .filter(|t| *t >= 1)
                            .ok_or_else(|| {
                                Error::compile(&path, "'.times' must be a positive integer")
                            })? as usize,
                        None => 1,
                    };
                    (Value::Object(map), times)
                }
                other => (other.clone(), 1),
            };
            let node = self.node(&raw, &path, level + 1)?;
            exists.push(Exists { node, times });
        }
        Ok(exists)
    }
}

fn once<T>(slot: &mut Option<T>, value: T, at: &str) -> Result<()> {
    if slot.is_some() {
        return Err(Error::compile(at, "conflicts with another constraint of the same kind"));
    }
    *slot = Some(value);
    Ok(())
}

fn flag(value: &Value, at: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::compile(at, "expected a boolean"))
}

fn number(value: &Value, at: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::compile(at, "expected a number"))
}

fn integer(value: &Value, at: &str) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::compile(at, "expected an integer"))
}

fn offset(value: &Value, at: &str) -> Result<usize> {
    value
        .as_u64()
        .map(|o| usize::try_from(o).unwrap_or(usize::MAX))
        .ok_or_else(|| Error::compile(at, "expected a non-negative offset"))
}

fn text<'v>(value: &'v Value, at: &str) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| Error::compile(at, "expected a string"))
}

fn strings(value: &Value, at: &str) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| text(item, at).map(str::to_string))
            .collect(),
        _ => Err(Error::compile(at, "expected a string or a list of strings")),
    }
}

fn pair(value: &Value, at: &str) -> Result<(f64, f64)> {
    match value.as_array().map(Vec::as_slice) {
        Some([a, b]) => Ok((number(a, at)?, number(b, at)?)),
        _ => Err(Error::compile(at, "expected a pair of numbers")),
    }
}

fn regex(pattern: &str, at: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::compile(at, format!("invalid pattern: {e}")))
}

fn injection(value: &Value, at: &str) -> Result<Injection> {
    match value {
        Value::Object(fields) => Ok(Injection::Fields(fields.clone())),
        Value::Array(points) => {
            let mut offsets = Vec::with_capacity(points.len());
            for point in points {
                match point.as_array().map(Vec::as_slice) {
                    Some([Value::Null, v]) => offsets.push((None, v.clone())),
                    Some([o, v]) => offsets.push((Some(offset(o, at)?), v.clone())),
                    _ => {
                        return Err(Error::compile(at, "expected [offset, value] pairs"));
                    }
                }
            }
            Ok(Injection::Offsets(offsets))
        }
        _ => Err(Error::compile(at, "expected a map of fields or a list of [offset, value] pairs")),
    }
}

fn sort_key(raw: &str) -> SortKey {
    let (descending, path) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    SortKey {
        path: if path.is_empty() {
            Vec::new()
        } else {
            path.split('.').map(str::to_string).collect()
        },
        descending,
    }
}

fn sort_keys(value: &Value, at: &str) -> Result<Vec<SortKey>> {
    let direct = |descending| -> Result<Vec<SortKey>> {
        Ok(vec![SortKey {
            path: Vec::new(),
            descending,
        }])
    };
    match value {
        Value::Number(n) if n.as_f64().is_some_and(|n| n > 0.0) => direct(false),
        Value::Number(n) if n.as_f64().is_some_and(|n| n < 0.0) => direct(true),
        Value::String(s) if s == "asc" => direct(false),
        Value::String(s) if s == "desc" => direct(true),
        Value::String(s) => Ok(vec![sort_key(s)]),
        Value::Array(keys) if !keys.is_empty() => keys
            .iter()
            .map(|k| text(k, at).map(sort_key))
            .collect(),
        _ => Err(Error::compile(
            at,
            "expected 1, -1, \"asc\", \"desc\", a signed path or a list of signed paths",
        )),
    }
}
