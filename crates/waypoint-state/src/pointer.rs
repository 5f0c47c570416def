use serde_json::Value;

use crate::error::StateError;

/// Resolves a JSON Pointer (RFC 6901) against a value, the read-only half
/// of the state model's "path resolution" responsibility.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    root.pointer(path)
}

fn split_last(path: &str) -> Option<(String, String)> {
    if path.is_empty() || path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = &path[..idx];
    let token = unescape_token(&path[idx + 1..]);
    Some((parent.to_string(), token))
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Applies a single RFC-6902-style `add`/`replace`/`remove` operation at
/// `path` against `root`. `add` on an array path of `-` appends; `add` on
/// an existing object key overwrites (JSON Patch semantics), matching
/// what merge rule application in practice needs (we never receive `move`
/// or `copy` operations over the wire).
pub fn apply_add(root: &mut Value, path: &str, value: Value) -> Result<(), StateError> {
    if path.is_empty() {
        *root = value;
        return Ok(());
    }
    let (parent_path, token) = split_last(path).ok_or_else(|| StateError::NoParent(path.to_string()))?;
    let parent = if parent_path.is_empty() {
        root
    } else {
        root.pointer_mut(&parent_path)
            .ok_or_else(|| StateError::PathNotFound(parent_path.clone()))?
    };
    match parent {
        Value::Object(map) => {
            map.insert(token, value);
            Ok(())
        }
        Value::Array(arr) => {
            if token == "-" {
                arr.push(value);
                Ok(())
            } else {
                let idx: usize = token
                    .parse()
                    .map_err(|_| StateError::IndexOutOfBounds(token.clone(), path.to_string()))?;
                if idx > arr.len() {
                    return Err(StateError::IndexOutOfBounds(token, path.to_string()));
                }
                arr.insert(idx, value);
                Ok(())
            }
        }
        _ => Err(StateError::NotAContainer(path.to_string())),
    }
}

pub fn apply_replace(root: &mut Value, path: &str, value: Value) -> Result<(), StateError> {
    if path.is_empty() {
        *root = value;
        return Ok(());
    }
    let target = root
        .pointer_mut(path)
        .ok_or_else(|| StateError::PathNotFound(path.to_string()))?;
    *target = value;
    Ok(())
}

pub fn apply_remove(root: &mut Value, path: &str) -> Result<(), StateError> {
    let (parent_path, token) = split_last(path).ok_or_else(|| StateError::NoParent(path.to_string()))?;
    let parent = if parent_path.is_empty() {
        root
    } else {
        root.pointer_mut(&parent_path)
            .ok_or_else(|| StateError::PathNotFound(parent_path.clone()))?
    };
    match parent {
        Value::Object(map) => {
            map.remove(&token)
                .map(|_| ())
                .ok_or_else(|| StateError::PathNotFound(path.to_string()))
        }
        Value::Array(arr) => {
            let idx: usize = token
                .parse()
                .map_err(|_| StateError::IndexOutOfBounds(token.clone(), path.to_string()))?;
            if idx >= arr.len() {
                return Err(StateError::IndexOutOfBounds(token, path.to_string()));
            }
            arr.remove(idx);
            Ok(())
        }
        _ => Err(StateError::NotAContainer(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_path() {
        let v = json!({"decisions": {"icp": {"options": []}}});
        assert_eq!(resolve(&v, "/decisions/icp/options"), Some(&json!([])));
    }

    #[test]
    fn add_appends_to_array_with_dash() {
        let mut v = json!({"items": [1, 2]});
        apply_add(&mut v, "/items/-", json!(3)).unwrap();
        assert_eq!(v["items"], json!([1, 2, 3]));
    }

    #[test]
    fn add_inserts_object_key() {
        let mut v = json!({"a": {}});
        apply_add(&mut v, "/a/b", json!(1)).unwrap();
        assert_eq!(v["a"]["b"], json!(1));
    }

    #[test]
    fn replace_overwrites_existing_value() {
        let mut v = json!({"a": 1});
        apply_replace(&mut v, "/a", json!(2)).unwrap();
        assert_eq!(v["a"], json!(2));
    }

    #[test]
    fn replace_missing_path_errors() {
        let mut v = json!({"a": 1});
        assert!(apply_replace(&mut v, "/b", json!(2)).is_err());
    }

    #[test]
    fn remove_deletes_array_index() {
        let mut v = json!({"items": [1, 2, 3]});
        apply_remove(&mut v, "/items/1").unwrap();
        assert_eq!(v["items"], json!([1, 3]));
    }
}
