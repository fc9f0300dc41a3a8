//! Model reconciliation - keeps the value at a field's slot in the shape
//! implied by its effective schema.
//!
//! A pass runs in a fixed order:
//!
//! 1. default derivation (`default`, container shape, then `const`, which always wins)
//! 2. null normalization for widgets that cannot show "no value"
//! 3. option-source bootstrap and 4. dependent-parameter watches, returned
//!    as a [`Bootstrap`] plan for the orchestrator to execute
//! 5. `allOf` sub-model seeding
//! 6. `oneOf` variant selection
//! 7. array compaction and write-back
//!
//! Sub-model merge and extra-property cleanup run after child fields have
//! had a chance to fill the sub-models, always merge first.

use serde_json::{Map, Value};
use tracing::debug;

use crate::equality::same_optional;
use crate::schema::{EffectiveSchema, COLOR_FORMAT};
use crate::select::one_of_items;
use crate::types::{all_of_slot, is_truthy, ModelKey, SchemaType, CURRENT_ONE_OF};
use crate::watch::{WatchSource, WatchTarget};

/// Option sources and watches a reconciliation pass asks the orchestrator to set up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bootstrap {
    /// Issue the initial remote fetch (template without `{q}`).
    pub fetch: bool,
    /// Items from a literal enum or scalar `oneOf`.
    pub static_items: Option<Vec<Value>>,
    /// Query seeded from an already selected autocomplete item.
    pub query: Option<String>,
    pub watches: Vec<(WatchSource, WatchTarget)>,
}

/// Empty value for a schema when the slot is undefined and no default is declared.
pub fn default_value(schema: &EffectiveSchema) -> Value {
    match schema.schema_type() {
        Some(SchemaType::Object)
            if schema.from_url_template().is_none()
                && schema.from_data().is_none()
                && schema.get("enum").is_none() =>
        {
            Value::Object(Map::new())
        }
        Some(SchemaType::Array) => Value::Array(Vec::new()),
        _ => Value::Null,
    }
}

/// Steps 1 and 2: derive the value of a slot from its current content.
pub fn initial_value(schema: &EffectiveSchema, current: Option<&Value>) -> Value {
    let mut value = match current {
        Some(v) => v.clone(),
        None => schema
            .default_value()
            .cloned()
            .unwrap_or_else(|| default_value(schema)),
    };

    // Containers always hold their declared shape
    let empty = default_value(schema);
    let mismatched = match (&empty, &value) {
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => false,
        (Value::Array(_) | Value::Object(_), _) => true,
        _ => false,
    };
    if mismatched {
        debug!(expected = ?schema.schema_type(), "replacing mistyped container value");
        value = empty;
    }

    if let Some(constant) = schema.const_value() {
        value = constant.clone();
    }

    if schema.schema_type() == Some(SchemaType::String)
        && schema.format() == Some(COLOR_FORMAT)
        && !is_truthy(&value)
    {
        value = Value::String(String::new());
    }

    value
}

/// Strip null entries from an array value.
pub fn compact_array(value: &mut Value) {
    if let Value::Array(items) = value {
        items.retain(|item| !item.is_null());
    }
}

/// Index of the active `oneOf` branch for `model`.
///
/// The model's discriminator value is matched against each branch's
/// `const`; without one, the schema default's discriminator is used.
pub fn select_one_of(schema: &EffectiveSchema, model: &Value) -> Option<usize> {
    if !schema.is_object() {
        return None;
    }
    let (const_key, _) = schema.one_of_const_prop()?;
    let wanted = match model.get(const_key) {
        Some(v) if is_truthy(v) => v,
        _ => schema.default_value()?.get(const_key)?,
    };
    find_one_of(schema, wanted)
}

/// Index of the `oneOf` branch whose discriminator `const` equals `value`.
pub fn find_one_of(schema: &EffectiveSchema, value: &Value) -> Option<usize> {
    let (const_key, _) = schema.one_of_const_prop()?;
    schema.one_of()?.iter().position(|branch| {
        branch
            .get("properties")
            .and_then(|p| p.get(const_key))
            .and_then(|p| p.get("const"))
            == Some(value)
    })
}

/// Keys declared by the object schema, including those contributed by
/// `allOf` branches and the active `oneOf` branch.
pub fn declared_keys(schema: &EffectiveSchema, current_one_of: Option<usize>) -> Vec<String> {
    let mut keys: Vec<String> = schema
        .properties()
        .into_iter()
        .map(|(k, _)| k.to_string())
        .collect();

    let mut add_branch = |branch: &Value| {
        if let Some(Value::Object(props)) = branch.get("properties") {
            for k in props.keys() {
                if !keys.contains(k) {
                    keys.push(k.clone());
                }
            }
        }
    };

    for branch in schema.all_of().into_iter().flatten() {
        add_branch(branch);
    }
    if let Some(branch) = current_one_of.and_then(|i| schema.one_of()?.get(i)) {
        add_branch(branch);
    }
    keys
}

/// Remove keys of `model` that the schema does not declare.
///
/// Runs only for object schemas when removal is enabled globally or the
/// schema forbids additional properties. Returns the removed keys.
pub fn clean_up_extra_properties(
    schema: &EffectiveSchema,
    remove_additional: bool,
    current_one_of: Option<usize>,
    model: &mut Value,
) -> Vec<String> {
    if !schema.is_object() || !(remove_additional || schema.additional_properties_forbidden()) {
        return Vec::new();
    }
    let declared = declared_keys(schema, current_one_of);
    if declared.is_empty() {
        return Vec::new();
    }
    let Value::Object(map) = model else {
        return Vec::new();
    };

    let extra: Vec<String> = map
        .keys()
        .filter(|k| !declared.contains(k))
        .cloned()
        .collect();
    for key in &extra {
        debug!(key = %key, "removing undeclared property");
        map.remove(key);
    }
    extra
}

/// Scratch copies of the value, one per composition branch.
#[derive(Debug, Clone)]
pub struct Reconciler {
    sub_models: Value,
    /// Sub-models as last seeded or merged. Only entries that moved away
    /// from it are written back to the model.
    baseline: Value,
    current_one_of: Option<usize>,
    show_current_one_of: bool,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            sub_models: Value::Object(Map::new()),
            baseline: Value::Object(Map::new()),
            current_one_of: None,
            show_current_one_of: true,
        }
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sub-models as a model wrapper for composition child fields.
    pub fn sub_models(&self) -> &Value {
        &self.sub_models
    }

    pub fn sub_models_mut(&mut self) -> &mut Value {
        &mut self.sub_models
    }

    pub fn current_one_of(&self) -> Option<usize> {
        self.current_one_of
    }

    /// False between a `oneOf` switch and the following tick, while widgets
    /// bound to the previous variant are unmounted.
    pub fn show_current_one_of(&self) -> bool {
        self.show_current_one_of
    }

    /// Full reconciliation pass of the slot `key` in `wrapper`.
    pub fn init(
        &mut self,
        schema: &EffectiveSchema,
        wrapper: &mut Value,
        key: &ModelKey,
    ) -> Bootstrap {
        let mut value = initial_value(schema, key.get(wrapper));
        let bootstrap = bootstrap(schema, &value);

        self.sub_models = Value::Object(Map::new());
        if schema.is_object() {
            if let Some(all_of) = schema.all_of() {
                for i in 0..all_of.len() {
                    ModelKey::Name(all_of_slot(i)).set(&mut self.sub_models, value.clone());
                }
            }
        }

        self.current_one_of = select_one_of(schema, &value);
        self.show_current_one_of = true;
        let one_of_seed = match self.current_one_of {
            Some(_) => value.clone(),
            None => Value::Object(Map::new()),
        };
        ModelKey::name(CURRENT_ONE_OF).set(&mut self.sub_models, one_of_seed);

        if schema.is_array() {
            compact_array(&mut value);
        }

        key.set(wrapper, value);
        self.baseline = self.sub_models.clone();
        bootstrap
    }

    /// Switch the active `oneOf` branch. The branch sub-model restarts empty
    /// and stays hidden until [`Reconciler::finish_switch`].
    ///
    /// Returns false when `index` is already active.
    pub fn switch_one_of(&mut self, index: Option<usize>) -> bool {
        if index == self.current_one_of {
            return false;
        }
        debug!(from = ?self.current_one_of, to = ?index, "switching oneOf variant");
        self.current_one_of = index;
        self.show_current_one_of = false;
        ModelKey::name(CURRENT_ONE_OF).set(&mut self.sub_models, Value::Object(Map::new()));
        ModelKey::name(CURRENT_ONE_OF).set(&mut self.baseline, Value::Object(Map::new()));
        true
    }

    pub fn finish_switch(&mut self) {
        self.show_current_one_of = true;
    }

    /// Write every sub-model entry that differs from the model into it.
    ///
    /// Entries unchanged since the sub-model was seeded (or last merged)
    /// are skipped, so a stale seed never overwrites a newer model value.
    /// Slots are visited in a stable order (`allOf-*` by index, then
    /// `currentOneOf`); the last writer of a key wins. Returns the written keys.
    pub fn merge_into(&mut self, model: &mut Value) -> Vec<String> {
        let Value::Object(slots) = &self.sub_models else {
            return Vec::new();
        };
        if !model.is_object() {
            return Vec::new();
        }

        let mut ordered: Vec<(&String, &Value)> = slots.iter().collect();
        ordered.sort_by_key(|(name, _)| slot_rank(name));

        let mut written = Vec::new();
        for (slot, sub_model) in ordered {
            let Value::Object(entries) = sub_model else {
                continue;
            };
            let before = self.baseline.get(slot.as_str());
            for (key, value) in entries {
                if same_optional(before.and_then(|b| b.get(key)), Some(value)) {
                    continue;
                }
                let target = ModelKey::name(key.clone());
                if !same_optional(target.get(model), Some(value)) {
                    debug!(slot = %slot, key = %key, "applying sub-model value");
                    target.set(model, value.clone());
                    if !written.contains(key) {
                        written.push(key.clone());
                    }
                }
            }
        }
        self.baseline = self.sub_models.clone();
        written
    }
}

fn slot_rank(name: &str) -> (u8, usize) {
    if name == CURRENT_ONE_OF {
        return (1, 0);
    }
    let index = name
        .strip_prefix("allOf-")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX);
    (0, index)
}

/// Steps 3 and 4: option sources and watches for the reconciled value.
///
/// Remote and data-path sources take priority over static lists.
fn bootstrap(schema: &EffectiveSchema, value: &Value) -> Bootstrap {
    let mut plan = Bootstrap {
        fetch: schema.from_url(),
        ..Bootstrap::default()
    };

    let dynamic = schema.from_url_template().is_some() || schema.from_data().is_some();
    if !dynamic {
        if schema.is_one_of_select() {
            plan.static_items = Some(one_of_items(schema));
        } else if let Some(values) = schema.enum_values() {
            plan.static_items = Some(values.clone());
        }
    }

    if schema.from_url_with_query() {
        plan.query = value.get(schema.item_title()).map(|title| match title {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    }

    if let Some(path) = schema.from_data() {
        plan.watches
            .push((WatchSource::Root(path.to_string()), WatchTarget::FromData));
    }
    for key in schema.from_url_keys() {
        plan.watches.push((
            WatchSource::for_placeholder(&key),
            WatchTarget::UrlParam(key),
        ));
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::resolve;
    use serde_json::json;

    fn effective(schema: Value, wrapper: &Value) -> EffectiveSchema {
        resolve(&schema, wrapper, &ModelKey::name("v"))
    }

    fn init(schema: Value, wrapper: &mut Value) -> (Reconciler, Bootstrap) {
        let eff = effective(schema, wrapper);
        let mut reconciler = Reconciler::new();
        let plan = reconciler.init(&eff, wrapper, &ModelKey::name("v"));
        (reconciler, plan)
    }

    #[test]
    fn defaults_by_type() {
        let mut wrapper = json!({});
        init(json!({"type": "object"}), &mut wrapper);
        assert_eq!(wrapper["v"], json!({}));

        let mut wrapper = json!({});
        init(json!({"type": "array"}), &mut wrapper);
        assert_eq!(wrapper["v"], json!([]));

        let mut wrapper = json!({});
        init(json!({"type": "string"}), &mut wrapper);
        assert_eq!(wrapper["v"], Value::Null);

        // Object selects hold the picked item, not a container
        let mut wrapper = json!({});
        init(json!({"type": "object", "x-fromUrl": "/x"}), &mut wrapper);
        assert_eq!(wrapper["v"], Value::Null);
    }

    #[test]
    fn mistyped_containers_are_replaced() {
        for current in [Value::Null, json!("oops"), json!({"a": 1})] {
            let mut wrapper = json!({"v": current});
            init(json!({"type": "array", "items": {"type": "string"}}), &mut wrapper);
            assert_eq!(wrapper["v"], json!([]));
        }

        for current in [Value::Null, json!(3), json!(["a"])] {
            let mut wrapper = json!({"v": current});
            init(json!({"type": "object"}), &mut wrapper);
            assert_eq!(wrapper["v"], json!({}));
        }
    }

    #[test]
    fn select_slots_keep_scalar_values() {
        let mut wrapper = json!({"v": null});
        init(json!({"type": "object", "x-fromUrl": "/x"}), &mut wrapper);
        assert_eq!(wrapper["v"], Value::Null);

        let mut wrapper = json!({"v": "a"});
        init(json!({"type": "string", "enum": ["a"]}), &mut wrapper);
        assert_eq!(wrapper["v"], json!("a"));
    }

    #[test]
    fn explicit_default_is_copied() {
        let mut wrapper = json!({});
        init(json!({"type": "object", "default": {"a": 1}}), &mut wrapper);
        assert_eq!(wrapper["v"], json!({"a": 1}));
    }

    #[test]
    fn existing_value_is_kept() {
        let mut wrapper = json!({"v": "set"});
        init(json!({"type": "string", "default": "other"}), &mut wrapper);
        assert_eq!(wrapper["v"], json!("set"));
    }

    #[test]
    fn const_wins_over_default_and_content() {
        let mut wrapper = json!({"v": "user"});
        init(
            json!({"type": "string", "const": "fixed", "default": "d"}),
            &mut wrapper,
        );
        assert_eq!(wrapper["v"], json!("fixed"));

        let mut wrapper = json!({});
        init(json!({"const": 3, "default": 1}), &mut wrapper);
        assert_eq!(wrapper["v"], json!(3));
    }

    #[test]
    fn color_fields_never_hold_null() {
        let mut wrapper = json!({"v": null});
        init(json!({"type": "string", "format": "hexcolor"}), &mut wrapper);
        assert_eq!(wrapper["v"], json!(""));

        let mut wrapper = json!({"v": "#fff"});
        init(json!({"type": "string", "format": "hexcolor"}), &mut wrapper);
        assert_eq!(wrapper["v"], json!("#fff"));
    }

    #[test]
    fn arrays_are_compacted() {
        let mut wrapper = json!({"v": [1, null, 2, null]});
        init(json!({"type": "array"}), &mut wrapper);
        assert_eq!(wrapper["v"], json!([1, 2]));
    }

    #[test]
    fn enum_bootstrap() {
        let mut wrapper = json!({});
        let (_, plan) = init(json!({"type": "string", "enum": ["a", "b"]}), &mut wrapper);
        assert_eq!(plan.static_items, Some(vec![json!("a"), json!("b")]));
        assert!(!plan.fetch);

        let mut wrapper = json!({});
        let (_, plan) = init(
            json!({"type": "array", "items": {"type": "string", "enum": ["x"]}}),
            &mut wrapper,
        );
        assert_eq!(plan.static_items, Some(vec![json!("x")]));
    }

    #[test]
    fn remote_source_takes_priority_over_enum() {
        let mut wrapper = json!({});
        let (_, plan) = init(
            json!({"type": "string", "enum": ["a"], "x-fromUrl": "/items/{owner}"}),
            &mut wrapper,
        );
        assert!(plan.fetch);
        assert_eq!(plan.static_items, None);
        assert_eq!(
            plan.watches,
            vec![(
                WatchSource::Root("owner".into()),
                WatchTarget::UrlParam("owner".into())
            )]
        );
    }

    #[test]
    fn query_seeded_from_selected_item() {
        let mut wrapper = json!({"v": {"key": "1", "title": "First"}});
        let (_, plan) = init(
            json!({"type": "object", "x-fromUrl": "/s?q={q}"}),
            &mut wrapper,
        );
        assert!(!plan.fetch);
        assert_eq!(plan.query.as_deref(), Some("First"));
    }

    #[test]
    fn from_data_and_context_watches() {
        let mut wrapper = json!({});
        let (_, plan) = init(
            json!({"type": "string", "x-fromData": "lists.colors"}),
            &mut wrapper,
        );
        assert_eq!(
            plan.watches,
            vec![(WatchSource::Root("lists.colors".into()), WatchTarget::FromData)]
        );

        let mut wrapper = json!({});
        let (_, plan) = init(
            json!({"type": "string", "x-fromUrl": "/o/{context.org}"}),
            &mut wrapper,
        );
        assert_eq!(plan.watches[0].0, WatchSource::Context("org".into()));
    }

    #[test]
    fn all_of_sub_models_are_independent_copies() {
        let mut wrapper = json!({"v": {"a": 1}});
        let (reconciler, _) = init(
            json!({"type": "object", "allOf": [{"properties": {}}, {"properties": {}}]}),
            &mut wrapper,
        );
        assert_eq!(reconciler.sub_models()["allOf-0"], json!({"a": 1}));
        assert_eq!(reconciler.sub_models()["allOf-1"], json!({"a": 1}));
        assert_eq!(reconciler.sub_models()[CURRENT_ONE_OF], json!({}));
    }

    fn variants() -> Value {
        json!({
            "type": "object",
            "oneOf": [
                {"properties": {"kind": {"const": "a"}, "x": {"type": "string"}}},
                {"properties": {"kind": {"const": "b"}, "y": {"type": "string"}}}
            ]
        })
    }

    #[test]
    fn one_of_selected_from_model_discriminator() {
        let mut wrapper = json!({"v": {"kind": "b"}});
        let (reconciler, _) = init(variants(), &mut wrapper);
        assert_eq!(reconciler.current_one_of(), Some(1));
        assert_eq!(reconciler.sub_models()[CURRENT_ONE_OF], json!({"kind": "b"}));
    }

    #[test]
    fn one_of_falls_back_to_default_discriminator() {
        let mut schema = variants();
        schema["default"] = json!({"kind": "a"});
        let mut wrapper = json!({"v": {}});
        let (reconciler, _) = init(schema, &mut wrapper);
        assert_eq!(reconciler.current_one_of(), Some(0));
    }

    #[test]
    fn one_of_without_discriminator_is_not_selectable() {
        let mut wrapper = json!({"v": {"kind": "a"}});
        let (reconciler, _) = init(
            json!({"type": "object", "oneOf": [{"properties": {"kind": {"type": "string"}}}]}),
            &mut wrapper,
        );
        assert_eq!(reconciler.current_one_of(), None);
    }

    #[test]
    fn switch_resets_branch_sub_model_and_hides_it() {
        let mut wrapper = json!({"v": {"kind": "a", "x": "1"}});
        let (mut reconciler, _) = init(variants(), &mut wrapper);
        assert!(reconciler.switch_one_of(Some(1)));
        assert!(!reconciler.show_current_one_of());
        assert_eq!(reconciler.sub_models()[CURRENT_ONE_OF], json!({}));
        assert!(!reconciler.switch_one_of(Some(1)));
        reconciler.finish_switch();
        assert!(reconciler.show_current_one_of());
    }

    #[test]
    fn merge_writes_only_differences_last_writer_wins() {
        let mut wrapper = json!({"v": {}});
        let (mut reconciler, _) = init(
            json!({"type": "object", "allOf": [{"properties": {}}, {"properties": {}}]}),
            &mut wrapper,
        );
        reconciler.sub_models_mut()["allOf-0"] = json!({"x": 1, "shared": "first"});
        reconciler.sub_models_mut()["allOf-1"] = json!({"y": 2, "shared": "second"});

        let mut model = wrapper["v"].clone();
        let written = reconciler.merge_into(&mut model);
        assert_eq!(model, json!({"x": 1, "shared": "second", "y": 2}));
        assert_eq!(written, vec!["x", "shared", "y"]);

        assert!(reconciler.merge_into(&mut model).is_empty());
    }

    #[test]
    fn merge_skips_unchanged_seeds() {
        let mut wrapper = json!({"v": {"tags": ["x", null]}});
        let (mut reconciler, _) = init(
            json!({"type": "object", "allOf": [{"properties": {}}]}),
            &mut wrapper,
        );
        reconciler.sub_models_mut()["allOf-0"]["extra"] = json!(3);

        let mut model = json!({"tags": ["x"]});
        assert_eq!(reconciler.merge_into(&mut model), vec!["extra"]);
        assert_eq!(model, json!({"tags": ["x"], "extra": 3}));
    }

    #[test]
    fn cleanup_requires_policy() {
        let schema = effective(
            json!({"type": "object", "properties": {"a": {}}}),
            &json!({}),
        );
        let mut model = json!({"a": 1, "b": 2});
        assert!(clean_up_extra_properties(&schema, false, None, &mut model).is_empty());
        assert_eq!(
            clean_up_extra_properties(&schema, true, None, &mut model),
            vec!["b".to_string()]
        );
        assert_eq!(model, json!({"a": 1}));
    }

    #[test]
    fn cleanup_honors_schema_level_forbid() {
        let schema = effective(
            json!({"type": "object", "additionalProperties": false, "properties": {"a": {}}}),
            &json!({}),
        );
        let mut model = json!({"a": 1, "b": 2});
        clean_up_extra_properties(&schema, false, None, &mut model);
        assert_eq!(model, json!({"a": 1}));
    }

    #[test]
    fn cleanup_keeps_active_branch_keys() {
        let schema = effective(variants(), &json!({}));
        let mut model = json!({"kind": "b", "x": "old", "y": "new"});
        clean_up_extra_properties(&schema, true, Some(1), &mut model);
        assert_eq!(model, json!({"kind": "b", "y": "new"}));
    }
}
