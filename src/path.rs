//! Dotted paths into the root model and full-key formatting.

use serde_json::Value;

use crate::types::CURRENT_ONE_OF;

/// Look up a dotted, root-relative path such as `owner.addresses.0.city`.
///
/// Numeric segments index into arrays. An empty path returns the root.
/// `None` means the path is undefined.
pub fn get_dotted<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim_matches('.');
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Build the full key of a field from its parent key and model key.
///
/// Parent keys carry a trailing dot. A leading synthetic `root.` prefix is
/// dropped; `root` segments further down are real property names.
pub fn full_key(parent_key: &str, model_key: &str) -> String {
    let parent = parent_key.strip_prefix("root.").unwrap_or(parent_key);
    format!("{}{}", parent, model_key)
}

/// Strip positional composition markers (`allOf-N.` and `currentOneOf.`)
/// so event keys name data locations only.
pub fn event_key(full_key: &str) -> String {
    let mut out = String::with_capacity(full_key.len());
    for segment in full_key.split_inclusive('.') {
        let name = segment.trim_end_matches('.');
        let is_marker = name == CURRENT_ONE_OF
            || name
                .strip_prefix("allOf-")
                .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
                .unwrap_or(false);
        // A trailing marker without a dot is the field itself, keep it.
        if is_marker && segment.ends_with('.') {
            continue;
        }
        out.push_str(segment);
    }
    out
}
