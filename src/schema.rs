//! Schema resolution - turns a raw schema node into the effective schema of one field.
//!
//! Resolution is a pure function of (raw schema, model wrapper, model key).
//! Composition markers (`allOf`, `oneOf`) are preserved; merging them is
//! value-dependent and belongs to the reconciler.

use serde_json::{Map, Value};

use crate::fetch::template_keys;
use crate::path::get_dotted;
use crate::types::{
    Display, FieldKind, ModelKey, SchemaType, X_CLASS, X_DISPLAY, X_FROM_DATA, X_FROM_URL,
    X_ITEMS_PROP, X_ITEM_ICON, X_ITEM_KEY, X_ITEM_TITLE, X_STYLE,
};

/// Formats rendered by a date widget.
const DATE_FORMATS: &[&str] = &["date", "date-time", "time"];

/// Format rendered by a color widget.
pub const COLOR_FORMAT: &str = "hexcolor";

/// Resolved schema node for one field.
///
/// Equality is structural, so callers can detect "no real change" when the
/// raw schema is re-created between passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveSchema {
    schema: Map<String, Value>,
}

/// Resolve a raw schema against the current model value at `key` in `wrapper`.
///
/// - a schema without `type` but with `properties` resolves as an object
/// - satisfied `dependencies` extend `required`, `properties`, `oneOf` and `allOf`
///
/// Non-object raw schemas (e.g. boolean schemas) resolve to an empty schema.
pub fn resolve(raw: &Value, wrapper: &Value, key: &ModelKey) -> EffectiveSchema {
    let mut schema = raw.as_object().cloned().unwrap_or_default();

    if !schema.contains_key("type") && schema.contains_key("properties") {
        schema.insert("type".to_string(), Value::String("object".to_string()));
    }

    let is_object = schema.get("type").and_then(Value::as_str) == Some("object");
    if is_object {
        if let Some(model) = key.get(wrapper) {
            apply_dependencies(&mut schema, model);
        }
    }

    EffectiveSchema { schema }
}

/// Merge the dependencies whose trigger key holds a meaningful value.
fn apply_dependencies(schema: &mut Map<String, Value>, model: &Value) {
    let Some(Value::Object(deps)) = schema.get("dependencies").cloned() else {
        return;
    };

    for (dep_key, dep) in deps {
        let Some(val) = get_dotted(model, &dep_key) else {
            continue;
        };
        if !dependency_applies(val) {
            continue;
        }

        match dep {
            // Property dependency: a list of extra required keys
            Value::Array(names) => extend_array(schema, "required", names),
            // Schema dependency
            Value::Object(dep) => {
                if let Some(Value::Array(required)) = dep.get("required") {
                    extend_array(schema, "required", required.clone());
                }
                if let Some(Value::Object(props)) = dep.get("properties") {
                    let target = schema
                        .entry("properties")
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(target) = target {
                        for (k, v) in props {
                            target.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                    }
                }
                for composition in ["oneOf", "allOf"] {
                    if let Some(Value::Array(branches)) = dep.get(composition) {
                        extend_array(schema, composition, branches.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

fn dependency_applies(val: &Value) -> bool {
    match val {
        Value::Null | Value::Bool(false) => false,
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

fn extend_array(schema: &mut Map<String, Value>, key: &str, items: Vec<Value>) {
    let target = schema
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(arr) = target {
        for item in items {
            if !arr.contains(&item) {
                arr.push(item);
            }
        }
    }
}

impl EffectiveSchema {
    /// The resolved schema as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.schema.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.schema.get(key)
    }

    fn str_attr(&self, key: &str) -> Option<&str> {
        self.schema.get(key).and_then(Value::as_str)
    }

    /// Declared type. For union types the first non-null member wins.
    pub fn schema_type(&self) -> Option<SchemaType> {
        match self.schema.get("type")? {
            Value::String(s) => SchemaType::parse(s),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .filter_map(SchemaType::parse)
                .find(|t| *t != SchemaType::Null),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        self.schema_type() == Some(SchemaType::Object)
    }

    pub fn is_array(&self) -> bool {
        self.schema_type() == Some(SchemaType::Array)
    }

    pub fn title(&self) -> Option<&str> {
        self.str_attr("title")
    }

    pub fn description(&self) -> Option<&str> {
        self.str_attr("description")
    }

    pub fn format(&self) -> Option<&str> {
        self.str_attr("format")
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.schema.get("default")
    }

    pub fn const_value(&self) -> Option<&Value> {
        self.schema.get("const")
    }

    /// `items` sub-schema of an array schema.
    pub fn items(&self) -> Option<&Value> {
        self.schema.get("items")
    }

    /// The literal enum of the field: `enum`, or `items.enum` for arrays.
    pub fn enum_values(&self) -> Option<&Vec<Value>> {
        if self.is_array() {
            if let Some(values) = self.items().and_then(|i| i.get("enum")) {
                return values.as_array();
            }
        }
        self.schema.get("enum").and_then(Value::as_array)
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> Vec<(&str, &Value)> {
        match self.schema.get("properties") {
            Some(Value::Object(props)) => props.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            _ => Vec::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.schema.get("properties")?.get(key)
    }

    pub fn required_keys(&self) -> Vec<&str> {
        match self.schema.get("required") {
            Some(Value::Array(arr)) => arr.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_required_property(&self, key: &str) -> bool {
        self.required_keys().contains(&key)
    }

    pub fn one_of(&self) -> Option<&Vec<Value>> {
        self.schema.get("oneOf").and_then(Value::as_array)
    }

    pub fn all_of(&self) -> Option<&Vec<Value>> {
        self.schema.get("allOf").and_then(Value::as_array)
    }

    pub fn additional_properties_forbidden(&self) -> bool {
        self.schema.get("additionalProperties") == Some(&Value::Bool(false))
    }

    pub fn min_length(&self) -> Option<u64> {
        self.schema.get("minLength").and_then(Value::as_u64)
    }

    pub fn max_length(&self) -> Option<u64> {
        self.schema.get("maxLength").and_then(Value::as_u64)
    }

    pub fn minimum(&self) -> Option<f64> {
        self.schema.get("minimum").and_then(Value::as_f64)
    }

    pub fn maximum(&self) -> Option<f64> {
        self.schema.get("maximum").and_then(Value::as_f64)
    }

    pub fn min_items(&self) -> Option<u64> {
        self.schema.get("minItems").and_then(Value::as_u64)
    }

    pub fn max_items(&self) -> Option<u64> {
        self.schema.get("maxItems").and_then(Value::as_u64)
    }

    // --- Extension vocabulary ---

    pub fn from_url_template(&self) -> Option<&str> {
        self.str_attr(X_FROM_URL)
    }

    /// Remote list fetched without a free-text query.
    pub fn from_url(&self) -> bool {
        self.from_url_template()
            .map(|t| !t.contains("{q}"))
            .unwrap_or(false)
    }

    /// Remote list searched as the user types.
    pub fn from_url_with_query(&self) -> bool {
        self.from_url_template()
            .map(|t| t.contains("{q}"))
            .unwrap_or(false)
    }

    /// Placeholders of the URL template other than `q`.
    pub fn from_url_keys(&self) -> Vec<String> {
        self.from_url_template().map(template_keys).unwrap_or_default()
    }

    pub fn from_data(&self) -> Option<&str> {
        self.str_attr(X_FROM_DATA)
    }

    pub fn items_prop(&self) -> Option<&str> {
        self.str_attr(X_ITEMS_PROP)
    }

    pub fn item_key(&self) -> &str {
        self.str_attr(X_ITEM_KEY).unwrap_or("key")
    }

    pub fn item_title(&self) -> &str {
        self.str_attr(X_ITEM_TITLE).unwrap_or("title")
    }

    /// Icon field of items; icon displays default to the key field.
    pub fn item_icon(&self) -> Option<&str> {
        self.str_attr(X_ITEM_ICON).or_else(|| {
            if self.display() == Some(Display::Icon) {
                Some(self.item_key())
            } else {
                None
            }
        })
    }

    pub fn display(&self) -> Option<Display> {
        self.str_attr(X_DISPLAY).map(Display::parse)
    }

    pub fn x_class(&self) -> Option<&str> {
        self.str_attr(X_CLASS)
    }

    pub fn x_style(&self) -> Option<&str> {
        self.str_attr(X_STYLE)
    }

    /// A `oneOf` over scalars (or array items) rendered as a select.
    pub fn is_one_of_select(&self) -> bool {
        if self.is_object() {
            return false;
        }
        if self.is_array() {
            return self
                .items()
                .and_then(|i| i.get("oneOf"))
                .map(Value::is_array)
                .unwrap_or(false);
        }
        self.one_of().is_some()
    }

    /// Branches feeding a oneOf select (`oneOf` or `items.oneOf`).
    pub fn one_of_select_branches(&self) -> Option<&Vec<Value>> {
        if self.is_array() {
            self.items()?.get("oneOf")?.as_array()
        } else {
            self.one_of()
        }
    }

    /// Discriminator property of an object `oneOf`: the first property of
    /// the first branch carrying a truthy `const`.
    pub fn one_of_const_prop(&self) -> Option<(&str, &Value)> {
        let first = self.one_of()?.first()?;
        let props = first.get("properties")?.as_object()?;
        props
            .iter()
            .find(|(_, p)| p.get("const").map(crate::types::is_truthy).unwrap_or(false))
            .map(|(k, p)| (k.as_str(), p))
    }

    /// Whether the field offers a list of options to pick from.
    pub fn is_select(&self) -> bool {
        self.from_url_template().is_some()
            || self.from_data().is_some()
            || self.enum_values().is_some()
            || self.is_one_of_select()
    }

    /// Whether the field renders at all.
    pub fn is_rendered(&self) -> bool {
        self.const_value().is_none() && self.display() != Some(Display::Hidden)
    }

    /// Widget kind for this field, `None` when nothing is rendered.
    pub fn kind(&self) -> Option<FieldKind> {
        if !self.is_rendered() {
            return None;
        }
        let kind = match self.schema_type() {
            Some(SchemaType::String) if self.format().map(|f| DATE_FORMATS.contains(&f)) == Some(true) => {
                FieldKind::Date
            }
            Some(SchemaType::String) if self.format() == Some(COLOR_FORMAT) => FieldKind::Color,
            Some(SchemaType::Object) if !self.is_select() => FieldKind::ObjectContainer,
            Some(SchemaType::Array) if !self.is_select() && !self.has_scalar_items() => {
                FieldKind::ArrayContainer
            }
            _ => FieldKind::Scalar,
        };
        Some(kind)
    }

    fn has_scalar_items(&self) -> bool {
        matches!(
            self.items()
                .and_then(|i| i.get("type"))
                .and_then(Value::as_str)
                .and_then(SchemaType::parse),
            Some(SchemaType::String | SchemaType::Number | SchemaType::Integer)
        )
    }

    /// Label shown next to the widget.
    pub fn label(&self, key: &ModelKey) -> String {
        self.title()
            .map(str::to_string)
            .or_else(|| key.as_name().map(str::to_string))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve_root(schema: Value, model: Value) -> EffectiveSchema {
        resolve(&schema, &json!({ "root": model }), &ModelKey::name("root"))
    }

    #[test]
    fn infers_object_type_from_properties() {
        let eff = resolve_root(json!({"properties": {"a": {}}}), Value::Null);
        assert!(eff.is_object());
    }

    #[test]
    fn composition_markers_are_preserved() {
        let schema = json!({
            "type": "object",
            "allOf": [{"properties": {"x": {}}}],
            "oneOf": [{"properties": {"k": {"const": "a"}}}]
        });
        let eff = resolve_root(schema, json!({}));
        assert_eq!(eff.all_of().map(Vec::len), Some(1));
        assert_eq!(eff.one_of().map(Vec::len), Some(1));
    }

    #[test]
    fn resolution_is_idempotent() {
        let schema = json!({"type": "object", "properties": {"a": {"type": "string"}}});
        let a = resolve_root(schema.clone(), json!({}));
        let b = resolve_root(schema, json!({}));
        assert_eq!(a, b);
    }

    #[test]
    fn dependency_applies_when_trigger_is_set() {
        let schema = json!({
            "type": "object",
            "required": ["card"],
            "properties": {"card": {"type": "string"}},
            "dependencies": {
                "card": {
                    "required": ["billing"],
                    "properties": {"billing": {"type": "string"}}
                }
            }
        });
        let inactive = resolve_root(schema.clone(), json!({}));
        assert!(inactive.property("billing").is_none());

        let active = resolve_root(schema, json!({"card": "1234"}));
        assert!(active.property("billing").is_some());
        assert!(active.is_required_property("billing"));
        assert!(active.is_required_property("card"));
    }

    #[test]
    fn dependency_ignores_empty_values() {
        let schema = json!({
            "type": "object",
            "dependencies": {"tags": ["label"]}
        });
        let eff = resolve_root(schema.clone(), json!({"tags": []}));
        assert!(eff.required_keys().is_empty());

        let eff = resolve_root(schema, json!({"tags": ["a"]}));
        assert_eq!(eff.required_keys(), vec!["label"]);
    }

    #[test]
    fn extension_defaults() {
        let eff = resolve_root(json!({"type": "string", "x-display": "icon"}), Value::Null);
        assert_eq!(eff.item_key(), "key");
        assert_eq!(eff.item_title(), "title");
        assert_eq!(eff.item_icon(), Some("key"));

        let eff = resolve_root(
            json!({"type": "string", "x-itemKey": "id", "x-itemTitle": "name"}),
            Value::Null,
        );
        assert_eq!(eff.item_key(), "id");
        assert_eq!(eff.item_title(), "name");
        assert_eq!(eff.item_icon(), None);
    }

    #[test]
    fn from_url_variants() {
        let eff = resolve_root(json!({"type": "string", "x-fromUrl": "/a/{owner}"}), Value::Null);
        assert!(eff.from_url());
        assert!(!eff.from_url_with_query());
        assert_eq!(eff.from_url_keys(), vec!["owner".to_string()]);

        let eff = resolve_root(json!({"type": "string", "x-fromUrl": "/a?q={q}"}), Value::Null);
        assert!(eff.from_url_with_query());
        assert!(eff.from_url_keys().is_empty());
    }

    #[test]
    fn one_of_const_prop_picks_first_truthy_const() {
        let schema = json!({
            "type": "object",
            "oneOf": [
                {"properties": {"name": {"type": "string"}, "kind": {"const": "a"}}},
                {"properties": {"kind": {"const": "b"}}}
            ]
        });
        let eff = resolve_root(schema, json!({}));
        let (key, _) = eff.one_of_const_prop().unwrap();
        assert_eq!(key, "kind");
    }

    #[test]
    fn kind_dispatch() {
        let kind = |schema: Value| resolve_root(schema, Value::Null).kind();
        assert_eq!(kind(json!({"type": "string"})), Some(FieldKind::Scalar));
        assert_eq!(kind(json!({"type": "string", "format": "date"})), Some(FieldKind::Date));
        assert_eq!(
            kind(json!({"type": "string", "format": "hexcolor"})),
            Some(FieldKind::Color)
        );
        assert_eq!(kind(json!({"type": "object"})), Some(FieldKind::ObjectContainer));
        assert_eq!(
            kind(json!({"type": "array", "items": {"type": "object"}})),
            Some(FieldKind::ArrayContainer)
        );
        assert_eq!(
            kind(json!({"type": "array", "items": {"type": "string", "enum": ["a"]}})),
            Some(FieldKind::Scalar)
        );
        assert_eq!(kind(json!({"type": "string", "const": "x"})), None);
        assert_eq!(kind(json!({"type": "string", "x-display": "hidden"})), None);
    }

    #[test]
    fn one_of_select_only_for_scalars() {
        let eff = resolve_root(
            json!({"type": "string", "oneOf": [{"const": "a", "title": "A"}]}),
            Value::Null,
        );
        assert!(eff.is_one_of_select());

        let eff = resolve_root(
            json!({"type": "object", "oneOf": [{"properties": {}}]}),
            json!({}),
        );
        assert!(!eff.is_one_of_select());
    }

    #[test]
    fn label_falls_back_to_key() {
        let eff = resolve_root(json!({"type": "string"}), Value::Null);
        assert_eq!(eff.label(&ModelKey::name("city")), "city");
        assert_eq!(eff.label(&ModelKey::Index(0)), "");
    }
}
