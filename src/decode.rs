//! Packed year-page payload decoding.
//!
//! The archival mirror serves each year page as a pool: a flat JSON array
//! where integers inside objects and arrays are indices of other pool
//! entries. Decoding resolves those references into ordinary nested JSON
//! that the record parser can read.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Locates the pool array inside a raw payload.
///
/// The pool normally sits at `nodes[2].data`; if the payload is shaped
/// differently, the largest array holding an object with an integer
/// `detailUrl` is used instead.
pub fn extract_pool(payload: &Value) -> Result<&[Value]> {
    if let Some(data) = payload
        .get("nodes")
        .and_then(Value::as_array)
        .and_then(|nodes| nodes.get(2))
        .and_then(|node| node.get("data"))
        .and_then(Value::as_array)
    {
        return Ok(data);
    }

    let mut best: Option<&[Value]> = None;
    find_pool(payload, &mut best);
    best.ok_or_else(|| Error::InvalidInput("could not locate pool list in payload".to_string()))
}

fn find_pool<'a>(value: &'a Value, best: &mut Option<&'a [Value]>) {
    match value {
        Value::Array(items) => {
            let looks_like_pool = items.iter().any(|it| {
                it.get("detailUrl")
                    .is_some_and(|d| d.is_i64() || d.is_u64())
            });
            if looks_like_pool && best.map_or(true, |b| items.len() > b.len()) {
                *best = Some(items);
            }
            for it in items {
                find_pool(it, best);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                find_pool(v, best);
            }
        }
        _ => {}
    }
}

/// Resolves every integer reference in `value` against `pool`.
///
/// Out-of-range references become `null`. Booleans, strings and floats are
/// literal values, never references. A reference back to a pool entry that
/// is still being expanded is a cycle and also becomes `null`.
pub fn decode_refs(pool: &[Value], value: &Value) -> Value {
    Decoder::new(pool).value(value, 0)
}

// Nesting bound for deep but acyclic pools.
const MAX_DEPTH: usize = 64;

struct Decoder<'a> {
    pool: &'a [Value],
    expanding: Vec<bool>,
}

impl<'a> Decoder<'a> {
    fn new(pool: &'a [Value]) -> Self {
        Self {
            pool,
            expanding: vec![false; pool.len()],
        }
    }

    fn value(&mut self, value: &Value, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return Value::Null;
        }
        match value {
            Value::Number(n) => match n.as_u64() {
                Some(idx) => self.reference(idx, depth),
                // negative ints are out of range; floats are literals
                None if n.is_i64() => Value::Null,
                None => value.clone(),
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|it| self.value(it, depth + 1))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(self.object(map, depth)),
            _ => value.clone(),
        }
    }

    fn reference(&mut self, idx: u64, depth: usize) -> Value {
        let pool = self.pool;
        let Some(i) = usize::try_from(idx).ok().filter(|&i| i < pool.len()) else {
            return Value::Null;
        };
        let target = &pool[i];
        if !is_container(target) {
            return target.clone();
        }
        if self.expanding[i] {
            return Value::Null;
        }

        self.expanding[i] = true;
        let decoded = self.value(target, depth + 1);
        self.expanding[i] = false;
        decoded
    }

    fn object(&mut self, map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.value(v, depth + 1)))
            .collect()
    }
}

fn is_container(v: &Value) -> bool {
    v.is_array() || v.is_object()
}

fn is_int(v: Option<&Value>) -> bool {
    v.is_some_and(|v| v.is_i64() || v.is_u64())
}

/// Decodes every packed issue object in a payload.
///
/// Packed issues are pool objects whose `title` and `detailUrl` are
/// references. Entries that do not decode to string title and URL are
/// dropped. A top-level array of plain issue objects (string `detailUrl`)
/// is already decoded and comes back as its objects.
pub fn decode_issues(payload: &Value) -> Result<Vec<Value>> {
    if let Some(items) = payload.as_array() {
        let plain = items
            .iter()
            .any(|it| it.get("detailUrl").is_some_and(Value::is_string));
        if plain {
            return Ok(items.iter().filter(|it| it.is_object()).cloned().collect());
        }
    }

    let pool = extract_pool(payload)?;
    let mut decoder = Decoder::new(pool);
    let mut out = Vec::new();

    for (idx, packed) in pool.iter().enumerate() {
        let Some(map) = packed.as_object() else {
            continue;
        };
        if !is_int(map.get("title")) || !is_int(map.get("detailUrl")) {
            continue;
        }

        let decoded = decoder.reference(idx as u64, 0);
        let has_strings = decoded.get("title").is_some_and(Value::is_string)
            && decoded.get("detailUrl").is_some_and(Value::is_string);
        if has_strings {
            out.push(decoded);
        }
    }

    Ok(out)
}
