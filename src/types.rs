//! Core types shared by the resolver, reconciler and field orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extension key holding a URL template for remote option lists.
pub const X_FROM_URL: &str = "x-fromUrl";
/// Extension key holding a root-relative path to a live array of options.
pub const X_FROM_DATA: &str = "x-fromData";
/// Extension key naming the response property that holds the item array.
pub const X_ITEMS_PROP: &str = "x-itemsProp";
pub const X_ITEM_KEY: &str = "x-itemKey";
pub const X_ITEM_TITLE: &str = "x-itemTitle";
pub const X_ITEM_ICON: &str = "x-itemIcon";
pub const X_DISPLAY: &str = "x-display";
pub const X_CLASS: &str = "x-class";
pub const X_STYLE: &str = "x-style";

/// Sub-model slot used by the active `oneOf` branch.
pub const CURRENT_ONE_OF: &str = "currentOneOf";

/// Returns the JSON type name for log and error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JavaScript-style truthiness, used where schema authors rely on it
/// (`const` discriminators, dependency activation, color defaults).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Name of the sub-model slot for an `allOf` branch.
pub fn all_of_slot(index: usize) -> String {
    format!("allOf-{}", index)
}

/// Key of a field's slot inside its model wrapper.
///
/// Object wrappers are addressed by name, array wrappers by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelKey {
    Name(String),
    Index(usize),
}

impl ModelKey {
    pub fn name(name: impl Into<String>) -> Self {
        ModelKey::Name(name.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            ModelKey::Name(n) => Some(n),
            ModelKey::Index(_) => None,
        }
    }

    /// Read the slot from a wrapper. `None` means the slot is undefined.
    pub fn get<'a>(&self, wrapper: &'a Value) -> Option<&'a Value> {
        match (self, wrapper) {
            (ModelKey::Name(n), Value::Object(map)) => map.get(n),
            (ModelKey::Index(i), Value::Array(arr)) => arr.get(*i),
            _ => None,
        }
    }

    pub fn get_mut<'a>(&self, wrapper: &'a mut Value) -> Option<&'a mut Value> {
        match (self, wrapper) {
            (ModelKey::Name(n), Value::Object(map)) => map.get_mut(n),
            (ModelKey::Index(i), Value::Array(arr)) => arr.get_mut(*i),
            _ => None,
        }
    }

    /// Write the slot. A non-container wrapper is replaced by an object
    /// (named key) or padded array (index) so the write always lands.
    pub fn set(&self, wrapper: &mut Value, value: Value) {
        match self {
            ModelKey::Name(n) => {
                if !wrapper.is_object() {
                    *wrapper = Value::Object(Default::default());
                }
                if let Value::Object(map) = wrapper {
                    map.insert(n.clone(), value);
                }
            }
            ModelKey::Index(i) => {
                if !wrapper.is_array() {
                    *wrapper = Value::Array(Vec::new());
                }
                if let Value::Array(arr) = wrapper {
                    if arr.len() <= *i {
                        arr.resize(*i + 1, Value::Null);
                    }
                    arr[*i] = value;
                }
            }
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKey::Name(n) => write!(f, "{}", n),
            ModelKey::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for ModelKey {
    fn from(s: &str) -> Self {
        ModelKey::Name(s.to_string())
    }
}

impl From<String> for ModelKey {
    fn from(s: String) -> Self {
        ModelKey::Name(s)
    }
}

impl From<usize> for ModelKey {
    fn from(i: usize) -> Self {
        ModelKey::Index(i)
    }
}

/// Declared JSON type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl SchemaType {
    /// Parse a `type` keyword value. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(SchemaType::Object),
            "array" => Some(SchemaType::Array),
            "string" => Some(SchemaType::String),
            "number" => Some(SchemaType::Number),
            "integer" => Some(SchemaType::Integer),
            "boolean" => Some(SchemaType::Boolean),
            "null" => Some(SchemaType::Null),
            _ => None,
        }
    }
}

/// Value of the `x-display` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Display {
    Hidden,
    List,
    Icon,
    /// `custom-*`: the host fills the field through a named slot.
    Custom(String),
    /// Any other marker, forwarded to widgets untouched.
    Other(String),
}

impl Display {
    pub fn parse(s: &str) -> Self {
        match s {
            "hidden" => Display::Hidden,
            "list" => Display::List,
            "icon" => Display::Icon,
            other if other.starts_with("custom-") => Display::Custom(other.to_string()),
            other => Display::Other(other.to_string()),
        }
    }
}

/// Rendering kind of a field, selected once from its effective schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Scalar,
    Date,
    Color,
    ObjectContainer,
    ArrayContainer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn model_key_reads_named_and_indexed_slots() {
        let wrapper = json!({"a": 1});
        assert_eq!(ModelKey::name("a").get(&wrapper), Some(&json!(1)));
        assert_eq!(ModelKey::name("b").get(&wrapper), None);

        let wrapper = json!(["x", "y"]);
        assert_eq!(ModelKey::Index(1).get(&wrapper), Some(&json!("y")));
        assert_eq!(ModelKey::Index(2).get(&wrapper), None);
    }

    #[test]
    fn model_key_set_pads_arrays() {
        let mut wrapper = json!([]);
        ModelKey::Index(2).set(&mut wrapper, json!("z"));
        assert_eq!(wrapper, json!([null, null, "z"]));
    }

    #[test]
    fn model_key_set_replaces_scalar_wrapper() {
        let mut wrapper = Value::Null;
        ModelKey::name("a").set(&mut wrapper, json!(true));
        assert_eq!(wrapper, json!({"a": true}));
    }

    #[test]
    fn display_parse() {
        assert_eq!(Display::parse("hidden"), Display::Hidden);
        assert_eq!(Display::parse("list"), Display::List);
        assert_eq!(
            Display::parse("custom-avatar"),
            Display::Custom("custom-avatar".into())
        );
        assert_eq!(Display::parse("slider"), Display::Other("slider".into()));
    }

    #[test]
    fn truthiness_matches_schema_author_expectations() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("a")));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn schema_type_parse() {
        assert_eq!(SchemaType::parse("object"), Some(SchemaType::Object));
        assert_eq!(SchemaType::parse("tuple"), None);
    }
}
