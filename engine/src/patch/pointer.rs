//! RFC 6901 JSON-Pointer navigation over `serde_json::Value`, with the
//! JSON-Patch `-` array-append token supported for `add`.

use serde_json::Value;

use crate::error::{Error, Result};

/// Split a pointer string into unescaped tokens. `""` (document root)
/// yields an empty token list.
pub fn tokenize(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.starts_with('/') {
        return Err(Error::InvalidPatch(format!("path {path:?} must start with '/'")));
    }
    Ok(path[1..]
        .split('/')
        .map(|tok| tok.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Index into an array token: either a decimal index or the append
/// marker `-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayIndex {
    At(usize),
    Append,
}

pub fn parse_array_index(token: &str) -> Result<ArrayIndex> {
    if token == "-" {
        return Ok(ArrayIndex::Append);
    }
    token
        .parse::<usize>()
        .map(ArrayIndex::At)
        .map_err(|_| Error::InvalidPatch(format!("invalid array index {token:?}")))
}

/// Read the value at `path`, or `None` if any segment is missing.
pub fn get<'a>(root: &'a Value, path: &str) -> Result<Option<&'a Value>> {
    let tokens = tokenize(path)?;
    let mut cur = root;
    for tok in &tokens {
        match cur {
            Value::Object(map) => match map.get(tok) {
                Some(v) => cur = v,
                None => return Ok(None),
            },
            Value::Array(arr) => match parse_array_index(tok)? {
                ArrayIndex::At(i) => match arr.get(i) {
                    Some(v) => cur = v,
                    None => return Ok(None),
                },
                ArrayIndex::Append => return Ok(None),
            },
            _ => return Ok(None),
        }
    }
    Ok(Some(cur))
}

/// Navigate to the parent container of the final token, returning the
/// parent and the final token. Errors if any intermediate segment is
/// missing or not a container.
fn navigate_parent<'a>(root: &'a mut Value, tokens: &[String]) -> Result<(&'a mut Value, String)> {
    let (last, init) = tokens.split_last().expect("non-root path");
    let mut cur = root;
    for tok in init {
        cur = match cur {
            Value::Object(map) => map
                .get_mut(tok)
                .ok_or_else(|| Error::InvalidPatch(format!("missing path segment {tok:?}")))?,
            Value::Array(arr) => {
                let idx = match parse_array_index(tok)? {
                    ArrayIndex::At(i) => i,
                    ArrayIndex::Append => {
                        return Err(Error::InvalidPatch(
                            "'-' cannot be used as an intermediate path segment".into(),
                        ))
                    }
                };
                arr.get_mut(idx)
                    .ok_or_else(|| Error::InvalidPatch(format!("array index {idx} out of bounds")))?
            }
            _ => return Err(Error::InvalidPatch(format!("path segment {tok:?} is not a container"))),
        };
    }
    Ok((cur, last.clone()))
}

/// Add (or insert) `value` at `path`. For objects this inserts/overwrites
/// the key; for arrays this inserts at the index or appends on `-`.
pub fn add(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let tokens = tokenize(path)?;
    if tokens.is_empty() {
        *root = value;
        return Ok(());
    }
    let (parent, key) = navigate_parent(root, &tokens)?;
    match parent {
        Value::Object(map) => {
            map.insert(key, value);
            Ok(())
        }
        Value::Array(arr) => match parse_array_index(&key)? {
            ArrayIndex::Append => {
                arr.push(value);
                Ok(())
            }
            ArrayIndex::At(i) => {
                if i > arr.len() {
                    return Err(Error::InvalidPatch(format!("array index {i} out of bounds")));
                }
                arr.insert(i, value);
                Ok(())
            }
        },
        _ => Err(Error::InvalidPatch(format!("path {path:?} parent is not a container"))),
    }
}

/// Replace the value already present at `path`. Errors if the path does
/// not already exist (use [`add`] to create new keys).
pub fn replace(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let tokens = tokenize(path)?;
    if tokens.is_empty() {
        *root = value;
        return Ok(());
    }
    let (parent, key) = navigate_parent(root, &tokens)?;
    match parent {
        Value::Object(map) => {
            if !map.contains_key(&key) {
                return Err(Error::InvalidPatch(format!("path {path:?} does not exist")));
            }
            map.insert(key, value);
            Ok(())
        }
        Value::Array(arr) => match parse_array_index(&key)? {
            ArrayIndex::At(i) if i < arr.len() => {
                arr[i] = value;
                Ok(())
            }
            _ => Err(Error::InvalidPatch(format!("path {path:?} does not exist"))),
        },
        _ => Err(Error::InvalidPatch(format!("path {path:?} parent is not a container"))),
    }
}

/// Remove and return the value at `path`.
pub fn remove(root: &mut Value, path: &str) -> Result<Value> {
    let tokens = tokenize(path)?;
    if tokens.is_empty() {
        return Err(Error::InvalidPatch("cannot remove the document root".into()));
    }
    let (parent, key) = navigate_parent(root, &tokens)?;
    match parent {
        Value::Object(map) => map
            .remove(&key)
            .ok_or_else(|| Error::InvalidPatch(format!("path {path:?} does not exist"))),
        Value::Array(arr) => match parse_array_index(&key)? {
            ArrayIndex::At(i) if i < arr.len() => Ok(arr.remove(i)),
            _ => Err(Error::InvalidPatch(format!("path {path:?} does not exist"))),
        },
        _ => Err(Error::InvalidPatch(format!("path {path:?} parent is not a container"))),
    }
}

/// True if `ancestor` is a strict prefix of `path` at token boundaries
/// (so `/a` is an ancestor of `/ab` is false, but is an ancestor of
/// `/a/b`).
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == path {
        return false;
    }
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.starts_with(ancestor) && path[ancestor.len()..].starts_with('/')
}

/// True if `a` and `b` name the same path or one is an ancestor of the
/// other.
pub fn overlaps(a: &str, b: &str) -> bool {
    a == b || is_ancestor(a, b) || is_ancestor(b, a)
}

/// Split a path into `(parent_path, last_token)`, or `None` for the root.
pub fn split_last(path: &str) -> Option<(String, String)> {
    let idx = path.rfind('/')?;
    Some((path[..idx].to_string(), path[idx + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_reads_nested_path() {
        let v = json!({"a": {"b": [1, 2, 3]}});
        assert_eq!(get(&v, "/a/b/1").unwrap(), Some(&json!(2)));
        assert_eq!(get(&v, "/a/missing").unwrap(), None);
    }

    #[test]
    fn add_appends_with_dash() {
        let mut v = json!({"items": [1, 2]});
        add(&mut v, "/items/-", json!(3)).unwrap();
        assert_eq!(v, json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn replace_requires_existing_key() {
        let mut v = json!({"a": 1});
        assert!(replace(&mut v, "/b", json!(2)).is_err());
    }

    #[test]
    fn remove_deletes_object_key() {
        let mut v = json!({"a": 1, "b": 2});
        let removed = remove(&mut v, "/a").unwrap();
        assert_eq!(removed, json!(1));
        assert_eq!(v, json!({"b": 2}));
    }

    #[test]
    fn ancestor_detection_respects_token_boundaries() {
        assert!(is_ancestor("/a", "/a/b"));
        assert!(!is_ancestor("/a", "/ab"));
        assert!(is_ancestor("", "/a"));
        assert!(!is_ancestor("/a", "/a"));
    }
}
