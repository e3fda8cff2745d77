//! Evaluation of Mango selectors, sort orders and field projections.
//!
//! Covers the subset of CouchDB's query language used by ledger clients:
//! implicit equality, nested objects and dotted field paths, the comparison
//! operators, `$in`/`$nin`, `$exists`, `$regex`, `$size`, `$all`,
//! `$elemMatch`, and the combinators `$and`, `$or`, `$nor`, `$not`.

use std::cmp::Ordering;
use std::collections::HashMap;

use ledgerdoc_core::asset::Object;
use ledgerdoc_core::error::CoreError;
use ledgerdoc_core::query::SortDirection;
use regex::Regex;
use serde_json::Value;

/// A selector with its `$regex` patterns compiled up front.
pub struct Selector<'a> {
    root: &'a Object,
    patterns: HashMap<String, Regex>,
}

impl<'a> Selector<'a> {
    /// Compile every `$regex` of `root`. Invalid patterns are rejected here,
    /// before any document is looked at.
    pub fn parse(root: &'a Object) -> Result<Self, CoreError> {
        let mut patterns = HashMap::new();
        for value in root.values() {
            collect_patterns(value, &mut patterns)?;
        }
        Ok(Self { root, patterns })
    }

    /// Whether `doc` satisfies the selector.
    pub fn matches(&self, doc: &Value) -> Result<bool, CoreError> {
        self.matches_object(doc, self.root)
    }

    fn matches_object(&self, doc: &Value, selector: &Object) -> Result<bool, CoreError> {
        for (key, condition) in selector {
            let ok = match key.as_str() {
                "$and" => self.all_selectors(doc, condition)?,
                "$or" => self.any_selector(doc, condition)?,
                "$nor" => !self.any_selector(doc, condition)?,
                "$not" => !self.matches_object(doc, as_selector(condition)?)?,
                op if op.starts_with('$') => {
                    return Err(CoreError::BadRequest(format!(
                        "unsupported selector operator: {op}"
                    )))
                }
                field => self.match_condition(lookup(doc, field), condition)?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn all_selectors(&self, doc: &Value, list: &Value) -> Result<bool, CoreError> {
        for selector in as_array("$and", list)? {
            if !self.matches_object(doc, as_selector(selector)?)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn any_selector(&self, doc: &Value, list: &Value) -> Result<bool, CoreError> {
        for selector in as_array("$or", list)? {
            if self.matches_object(doc, as_selector(selector)?)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Apply a field condition: an operator object, a nested selector, or a
    /// literal compared for equality.
    fn match_condition(&self, value: Option<&Value>, condition: &Value) -> Result<bool, CoreError> {
        match condition {
            Value::Object(map) if is_operator_object(map) => {
                for (op, arg) in map {
                    if !self.apply_operator(value, op, arg)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Value::Object(map) => match value {
                Some(inner @ Value::Object(_)) => self.matches_object(inner, map),
                _ => Ok(false),
            },
            literal => Ok(value == Some(literal)),
        }
    }

    fn apply_operator(&self, value: Option<&Value>, op: &str, arg: &Value) -> Result<bool, CoreError> {
        if op == "$exists" {
            let expected = arg
                .as_bool()
                .ok_or_else(|| CoreError::BadRequest("argument of $exists must be a boolean".into()))?;
            return Ok(value.is_some() == expected);
        }
        if op == "$not" {
            return Ok(!self.match_condition(value, arg)?);
        }

        let Some(value) = value else {
            return Ok(false);
        };

        let result = match op {
            "$eq" => value == arg,
            "$ne" => value != arg,
            "$gt" => same_kind(value, arg) && collate(value, arg) == Ordering::Greater,
            "$gte" => same_kind(value, arg) && collate(value, arg) != Ordering::Less,
            "$lt" => same_kind(value, arg) && collate(value, arg) == Ordering::Less,
            "$lte" => same_kind(value, arg) && collate(value, arg) != Ordering::Greater,
            "$in" => as_array(op, arg)?.contains(value),
            "$nin" => !as_array(op, arg)?.contains(value),
            "$size" => {
                let expected = arg
                    .as_u64()
                    .ok_or_else(|| CoreError::BadRequest("argument of $size must be an integer".into()))?;
                value.as_array().is_some_and(|items| items.len() as u64 == expected)
            }
            "$all" => {
                let wanted = as_array(op, arg)?;
                value
                    .as_array()
                    .is_some_and(|items| wanted.iter().all(|w| items.contains(w)))
            }
            "$elemMatch" => match value.as_array() {
                Some(items) => {
                    let mut found = false;
                    for item in items {
                        if self.match_condition(Some(item), arg)? {
                            found = true;
                            break;
                        }
                    }
                    found
                }
                None => false,
            },
            "$regex" => {
                let re = arg
                    .as_str()
                    .and_then(|pattern| self.patterns.get(pattern))
                    .ok_or_else(|| CoreError::Internal(format!("$regex {arg} was not compiled")))?;
                value.as_str().is_some_and(|s| re.is_match(s))
            }
            "$and" => {
                let mut ok = true;
                for condition in as_array(op, arg)? {
                    ok &= self.match_condition(Some(value), condition)?;
                }
                ok
            }
            "$or" => {
                let mut ok = false;
                for condition in as_array(op, arg)? {
                    ok |= self.match_condition(Some(value), condition)?;
                }
                ok
            }
            other => {
                return Err(CoreError::BadRequest(format!(
                    "unsupported selector operator: {other}"
                )))
            }
        };
        Ok(result)
    }
}

/// Whether `doc` satisfies `selector`.
pub fn matches(doc: &Value, selector: &Object) -> Result<bool, CoreError> {
    Selector::parse(selector)?.matches(doc)
}

fn collect_patterns(value: &Value, patterns: &mut HashMap<String, Regex>) -> Result<(), CoreError> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == "$regex" {
                    let pattern = child.as_str().ok_or_else(|| {
                        CoreError::BadRequest("argument of $regex must be a string".into())
                    })?;
                    if !patterns.contains_key(pattern) {
                        let re = Regex::new(pattern)
                            .map_err(|e| CoreError::BadRequest(format!("invalid $regex: {e}")))?;
                        patterns.insert(pattern.to_string(), re);
                    }
                    continue;
                }
                collect_patterns(child, patterns)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_patterns(item, patterns)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn as_selector(value: &Value) -> Result<&Object, CoreError> {
    value
        .as_object()
        .ok_or_else(|| CoreError::BadRequest(format!("selector must be an object: {value}")))
}

fn as_array<'a>(op: &str, value: &'a Value) -> Result<&'a Vec<Value>, CoreError> {
    value
        .as_array()
        .ok_or_else(|| CoreError::BadRequest(format!("argument of {op} must be an array")))
}

/// Value at a dotted field path.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn is_operator_object(map: &Object) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    kind_rank(a) == kind_rank(b)
}

/// CouchDB-style collation: null < booleans < numbers < strings < arrays < objects.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = collate(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Order two documents by the given sort fields. Missing fields sort first.
pub fn compare_by(a: &Value, b: &Value, fields: &[(String, SortDirection)]) -> Ordering {
    for (field, direction) in fields {
        let ord = match (lookup(a, field), lookup(b, field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => collate(x, y),
        };
        let ord = match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Keep only the listed (possibly dotted) fields of `doc`.
pub fn project(doc: &Object, fields: &[String]) -> Object {
    let source = Value::Object(doc.clone());
    let mut out = Object::new();
    for field in fields {
        let Some(value) = lookup(&source, field) else {
            continue;
        };
        let segments: Vec<&str> = field.split('.').collect();
        insert_path(&mut out, &segments, value.clone());
    }
    out
}

fn insert_path(target: &mut Object, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Object::new()));
            if !entry.is_object() {
                *entry = Value::Object(Object::new());
            }
            if let Value::Object(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}
