//! Option lists for enum-like fields.
//!
//! Raw items come from a remote fetch, a live array in the root model,
//! a literal `enum`, or `oneOf` branches over scalars. Every item is
//! normalized to an object carrying the field's key and title properties.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::equality::same_content;
use crate::schema::EffectiveSchema;
use crate::types::{Display, ModelKey};

/// One selectable option: `{<itemKey>: value, <itemTitle>: text, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SelectItem(Map<String, Value>);

impl SelectItem {
    /// Normalize a raw item. Scalars become `{key, title}` objects; objects
    /// keep their fields and gain a title derived from the key when absent.
    pub fn normalize(raw: &Value, item_key: &str, item_title: &str) -> Self {
        let mut map = match raw {
            Value::Object(map) => map.clone(),
            scalar => {
                let mut map = Map::new();
                map.insert(item_key.to_string(), scalar.clone());
                map
            }
        };
        if !map.contains_key(item_title) {
            if let Some(key) = map.get(item_key) {
                let title = Value::String(text_of(key));
                map.insert(item_title.to_string(), title);
            }
        }
        SelectItem(map)
    }

    pub fn key<'a>(&'a self, item_key: &str) -> Option<&'a Value> {
        self.0.get(item_key)
    }

    pub fn title<'a>(&'a self, item_title: &str) -> Option<&'a str> {
        self.0.get(item_title).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key under which a selected value is matched against items.
fn selection_key<'a>(value: &'a Value, item_key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(item_key),
        Value::Null => None,
        other => Some(other),
    }
}

fn contains_key(items: &[SelectItem], key: &Value, item_key: &str) -> bool {
    items
        .iter()
        .any(|item| item.key(item_key).map(|k| same_content(k, key)).unwrap_or(false))
}

/// Raw items contributed by `oneOf` branches: each branch keyed by its
/// `const` or first `enum` value and titled by its `title`.
pub fn one_of_items(schema: &EffectiveSchema) -> Vec<Value> {
    let item_key = schema.item_key();
    let item_title = schema.item_title();
    let Some(branches) = schema.one_of_select_branches() else {
        return Vec::new();
    };
    branches
        .iter()
        .filter_map(|branch| {
            let mut map = branch.as_object()?.clone();
            let key = branch
                .get("const")
                .cloned()
                .or_else(|| branch.get("enum").and_then(|e| e.get(0)).cloned())
                .unwrap_or(Value::Null);
            let title = branch.get("title").cloned().unwrap_or(Value::Null);
            map.insert(item_key.to_string(), key);
            map.insert(item_title.to_string(), title);
            Some(Value::Object(map))
        })
        .collect()
}

/// Compute the option list of a field.
///
/// List displays additionally get a synthetic entry for every selected
/// value missing from the source, so selections never vanish from view.
pub fn compute_items(
    raw: Option<&[Value]>,
    schema: &EffectiveSchema,
    wrapper: &Value,
    key: &ModelKey,
) -> Vec<SelectItem> {
    let item_key = schema.item_key();
    let item_title = schema.item_title();
    let mut items: Vec<SelectItem> = raw
        .unwrap_or_default()
        .iter()
        .map(|raw| SelectItem::normalize(raw, item_key, item_title))
        .collect();

    if schema.display() == Some(Display::List) {
        fill_list(schema, wrapper, key, &mut items);
    } else {
        fill_select_items(schema, wrapper, key, &mut items);
    }
    items
}

fn selected_values<'a>(schema: &EffectiveSchema, model: &'a Value) -> Vec<&'a Value> {
    match model {
        Value::Array(values) if schema.is_array() => values.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Append every selected value missing from `items`.
pub fn fill_list(
    schema: &EffectiveSchema,
    wrapper: &Value,
    key: &ModelKey,
    items: &mut Vec<SelectItem>,
) {
    let Some(model) = key.get(wrapper) else {
        return;
    };
    let item_key = schema.item_key();
    let item_title = schema.item_title();
    for value in selected_values(schema, model) {
        let Some(k) = selection_key(value, item_key) else {
            continue;
        };
        if !contains_key(items, k, item_key) {
            items.push(SelectItem::normalize(value, item_key, item_title));
        }
    }
}

/// Append selected values that are full items (objects) missing from
/// `items`, e.g. a previously picked autocomplete result.
pub fn fill_select_items(
    schema: &EffectiveSchema,
    wrapper: &Value,
    key: &ModelKey,
    items: &mut Vec<SelectItem>,
) {
    let Some(model) = key.get(wrapper) else {
        return;
    };
    let item_key = schema.item_key();
    let item_title = schema.item_title();
    for value in selected_values(schema, model) {
        if !value.is_object() {
            continue;
        }
        let Some(k) = selection_key(value, item_key) else {
            continue;
        };
        if !contains_key(items, k, item_key) {
            items.push(SelectItem::normalize(value, item_key, item_title));
        }
    }
}

/// Published option list of a field.
#[derive(Debug, Clone, Default)]
pub struct OptionList {
    items: Option<Vec<SelectItem>>,
    revision: u64,
}

impl OptionList {
    pub fn items(&self) -> Option<&[SelectItem]> {
        self.items.as_deref()
    }

    /// Bumped each time a different list is published.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Publish a new list. Returns false, leaving the current list in place,
    /// when the content is unchanged.
    pub fn publish(&mut self, items: Vec<SelectItem>) -> bool {
        if let Some(current) = &self.items {
            let unchanged = current.len() == items.len()
                && current
                    .iter()
                    .zip(&items)
                    .all(|(a, b)| same_content(&Value::Object(a.0.clone()), &Value::Object(b.0.clone())));
            if unchanged {
                return false;
            }
        }
        self.items = Some(items);
        self.revision += 1;
        true
    }
}
