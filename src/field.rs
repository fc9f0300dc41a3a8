//! Field orchestration.
//!
//! A [`Field`] owns everything about one schema node except the value
//! itself, which lives in a model wrapper owned by the host. Object and
//! array fields own child fields, so a tree of fields mirrors the data.
//!
//! Work is split into explicit steps so the host controls scheduling:
//!
//! - [`Field::mount`] / [`Field::refresh`] run reconciliation synchronously
//! - [`Field::observe`] flushes watches on the root model and ambient context
//! - [`Field::tick`] performs deferred work (remounting a switched `oneOf` variant)
//! - [`Field::take_fetch_requests`] / [`Field::complete_fetch`] bracket remote I/O
//!
//! [`Field::settle`] runs the last three in order for hosts without their own loop.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::equality::same_content;
use crate::error::FetchError;
use crate::fetch::{FetchCoordinator, FetchOutcome, FetchRequest, FromUrlParams, HttpResponse};
use crate::markdown::render_description;
use crate::options::FieldOptions;
use crate::path::{event_key, full_key};
use crate::reconcile::{clean_up_extra_properties, find_one_of, Reconciler};
use crate::rules::{field_rules, one_of_rules, Rule};
use crate::schema::{resolve, EffectiveSchema};
use crate::select::{compute_items, OptionList, SelectItem};
use crate::types::{all_of_slot, json_type_name, Display, FieldKind, ModelKey, CURRENT_ONE_OF};
use crate::watch::{Fired, WatchTable, WatchTarget};

/// Events published to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum FieldEvent {
    /// Raw edit of a value.
    Input { key: String, model: Value },
    /// Committed edit of a value.
    Change { key: String, model: Value },
    /// User-facing fault (missing HTTP capability, failed fetch).
    Error { message: String },
}

/// Which wrapper a child field writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// The parent's own value (object properties, array elements).
    Model,
    /// The parent's sub-models (`allOf-*`, `currentOneOf`).
    SubModel,
}

#[derive(Debug)]
struct Child {
    binding: Binding,
    field: Field,
}

type FieldOp<'a> = dyn FnMut(&mut Field, &mut Value) + 'a;

#[derive(Debug)]
pub struct Field {
    raw_schema: Value,
    key: ModelKey,
    parent_key: String,
    required: bool,
    options: Arc<FieldOptions>,
    schema: EffectiveSchema,
    last_schema: Option<EffectiveSchema>,
    reconciler: Reconciler,
    fetch: FetchCoordinator,
    watches: WatchTable,
    raw_items: Option<Vec<Value>>,
    items: OptionList,
    children: Vec<Child>,
    events: Vec<FieldEvent>,
    requests: Vec<FetchRequest>,
    remount_one_of: bool,
    ready: bool,
}

impl Field {
    /// Create a field for slot `key`. `parent_key` is the chain of parent
    /// keys, each followed by a dot, starting at `root.`; empty for a
    /// top-level field.
    pub fn new(
        raw_schema: Value,
        key: impl Into<ModelKey>,
        parent_key: impl Into<String>,
        required: bool,
        options: Arc<FieldOptions>,
    ) -> Self {
        Self {
            raw_schema,
            key: key.into(),
            parent_key: parent_key.into(),
            required,
            options,
            schema: EffectiveSchema::default(),
            last_schema: None,
            reconciler: Reconciler::new(),
            fetch: FetchCoordinator::new(),
            watches: WatchTable::new(),
            raw_items: None,
            items: OptionList::default(),
            children: Vec::new(),
            events: Vec::new(),
            requests: Vec::new(),
            remount_one_of: false,
            ready: false,
        }
    }

    /// Top-level field bound to slot `root` of its wrapper.
    pub fn root(raw_schema: Value, options: Arc<FieldOptions>) -> Self {
        Self::new(raw_schema, "root", "", false, options)
    }

    // --- Lifecycle ---

    /// Resolve and reconcile unconditionally.
    pub fn mount(&mut self, wrapper: &mut Value) {
        self.last_schema = None;
        self.refresh(wrapper);
    }

    /// Replace the raw schema. Reconciles only if the effective schema
    /// content actually changed.
    pub fn set_schema(&mut self, raw_schema: Value, wrapper: &mut Value) {
        self.raw_schema = raw_schema;
        self.refresh(wrapper);
    }

    /// Re-resolve the schema against the current model and reconcile when
    /// its content changed; otherwise refresh children only.
    pub fn refresh(&mut self, wrapper: &mut Value) {
        let schema = resolve(&self.raw_schema, wrapper, &self.key);
        let (changed, remount) = match &self.last_schema {
            Some(last) => (!same_content(&last.to_value(), &schema.to_value()), false),
            None => (true, true),
        };
        if changed {
            debug!(key = %self.full_key(), "schema changed, reconciling");
            self.schema = schema.clone();
            self.last_schema = Some(schema);
            self.reconcile_pass(wrapper, remount);
            self.ready = true;
        } else {
            self.refresh_children(wrapper);
        }
    }

    /// Full reconciliation pass, remounting every descendant.
    pub fn reconcile(&mut self, wrapper: &mut Value) {
        self.reconcile_pass(wrapper, true);
    }

    /// Reconcile this field. Surviving children are remounted when
    /// `remount` is set, otherwise only refreshed.
    fn reconcile_pass(&mut self, wrapper: &mut Value, remount: bool) {
        let plan = self.reconciler.init(&self.schema, wrapper, &self.key);

        if plan.static_items.is_some() {
            self.raw_items = plan.static_items;
        } else if self.schema.from_url_template().is_none() && self.schema.from_data().is_none() {
            self.raw_items = None;
        }
        if let Some(query) = plan.query {
            self.fetch.set_query(query);
        }
        self.watches.clear();
        for (source, target) in plan.watches {
            self.watches.subscribe(source, target);
        }
        if plan.fetch {
            self.fetch_select_items();
        }

        self.rebuild_children(wrapper, remount);
        self.update_select_items(wrapper);
    }

    /// Replace the options of this field and all descendants.
    pub fn set_options(&mut self, options: Arc<FieldOptions>) {
        for child in &mut self.children {
            child.field.set_options(options.clone());
        }
        self.options = options;
    }

    /// Flush watches against the root model and the ambient context.
    ///
    /// Watch callbacks run here only, after any reconciliation pass that
    /// registered them has completed.
    pub fn observe(&mut self, wrapper: &Value, root: &Value) {
        let fired = self.watches.flush(root, &self.options.context);
        let mut refetch = false;
        let mut items_changed = false;
        for Fired { target, value } in fired {
            match target {
                WatchTarget::FromData => {
                    self.raw_items = match value {
                        Some(Value::Array(items)) => Some(items),
                        Some(other) => {
                            debug!(
                                key = %self.full_key(),
                                actual = json_type_name(&other),
                                "x-fromData source is not an array"
                            );
                            None
                        }
                        None => None,
                    };
                    items_changed = true;
                }
                WatchTarget::UrlParam(key) => {
                    self.fetch.set_param(&key, value);
                    refetch = true;
                }
            }
        }
        if refetch {
            self.fetch_select_items();
        }
        if items_changed {
            self.update_select_items(wrapper);
        }

        let model = self.key.get(wrapper);
        for child in &mut self.children {
            match child.binding {
                Binding::Model => {
                    if let Some(model) = model {
                        child.field.observe(model, root);
                    }
                }
                Binding::SubModel => child.field.observe(self.reconciler.sub_models(), root),
            }
        }
    }

    /// Run deferred work: mount the newly selected `oneOf` variant.
    pub fn tick(&mut self, wrapper: &mut Value) {
        if self.remount_one_of {
            self.remount_one_of = false;
            self.reconciler.finish_switch();
            if let Some(mut child) = self.one_of_child() {
                child.field.mount(self.reconciler.sub_models_mut());
                self.children.push(child);
            }
            self.apply_sub_models(wrapper);
        }

        let mut sub_models_touched = false;
        for child in &mut self.children {
            match child.binding {
                Binding::Model => {
                    if let Some(model) = self.key.get_mut(wrapper) {
                        child.field.tick(model);
                    }
                }
                Binding::SubModel => {
                    child.field.tick(self.reconciler.sub_models_mut());
                    sub_models_touched = true;
                }
            }
        }
        if sub_models_touched {
            self.apply_sub_models(wrapper);
        }
    }

    /// Deferred work, watches and fetches in one go, treating this field's
    /// value as the root model.
    pub fn settle(&mut self, wrapper: &mut Value) {
        self.tick(wrapper);
        let root = self.key.get(wrapper).cloned().unwrap_or(Value::Null);
        self.observe(wrapper, &root);
        self.run_fetches(wrapper);
    }

    // --- Edits ---

    /// Raw edit of the field at `path` (model keys below this field).
    pub fn input_at(&mut self, wrapper: &mut Value, path: &[ModelKey], value: Value) {
        let mut value = Some(value);
        self.route(wrapper, path, &mut |field, wrapper| {
            if let Some(value) = value.take() {
                field.input(wrapper, value);
            }
        });
    }

    /// Commit the current value of the field at `path`.
    pub fn change_at(&mut self, wrapper: &mut Value, path: &[ModelKey]) {
        self.route(wrapper, path, &mut |field, wrapper| field.change(wrapper));
    }

    /// Update the free-text query of an autocomplete field.
    pub fn set_query_at(&mut self, wrapper: &mut Value, path: &[ModelKey], query: &str) {
        self.route(wrapper, path, &mut |field, wrapper| {
            field.set_query(wrapper, query)
        });
    }

    /// Select the `oneOf` variant whose discriminator equals `discriminator`.
    /// The new variant is mounted on the next [`Field::tick`].
    pub fn select_one_of_at(&mut self, wrapper: &mut Value, path: &[ModelKey], discriminator: &Value) {
        self.route(wrapper, path, &mut |field, _| field.select_one_of(discriminator));
    }

    fn route(&mut self, wrapper: &mut Value, path: &[ModelKey], op: &mut FieldOp<'_>) {
        let Some((head, rest)) = path.split_first() else {
            op(self, wrapper);
            return;
        };
        let Some(idx) = self.children.iter().position(|c| &c.field.key == head) else {
            debug!(key = %head, parent = %self.full_key(), "no child field for edit");
            return;
        };
        let binding = self.children[idx].binding;
        match binding {
            Binding::Model => {
                let Some(model) = self.key.get_mut(wrapper) else {
                    return;
                };
                self.children[idx].field.route(model, rest, op);
            }
            Binding::SubModel => {
                self.children[idx]
                    .field
                    .route(self.reconciler.sub_models_mut(), rest, op);
                self.apply_sub_models(wrapper);
            }
        }
        self.refresh(wrapper);
    }

    fn input(&mut self, wrapper: &mut Value, value: Value) {
        self.key.set(wrapper, value);
        let model = self.key.get(wrapper).cloned().unwrap_or(Value::Null);
        self.events.push(FieldEvent::Input {
            key: self.event_key(),
            model,
        });
        if self.is_container() {
            self.rebuild_children(wrapper, true);
        }
        self.refresh(wrapper);
    }

    fn change(&mut self, wrapper: &mut Value) {
        self.update_select_items(wrapper);
        let model = self.key.get(wrapper).cloned().unwrap_or(Value::Null);
        self.events.push(FieldEvent::Change {
            key: self.event_key(),
            model,
        });
    }

    fn set_query(&mut self, wrapper: &Value, query: &str) {
        if self.fetch.query() == query {
            return;
        }
        self.fetch.set_query(query);
        // Selecting an item sets the query to its title; no refetch for that
        let selected_title = self
            .key
            .get(wrapper)
            .and_then(|m| m.get(self.schema.item_title()))
            .and_then(Value::as_str);
        if selected_title == Some(query) {
            return;
        }
        self.fetch_select_items();
    }

    fn select_one_of(&mut self, discriminator: &Value) {
        let index = find_one_of(&self.schema, discriminator);
        if self.reconciler.switch_one_of(index) {
            self.children
                .retain(|c| c.field.key.as_name() != Some(CURRENT_ONE_OF));
            self.remount_one_of = true;
        }
    }

    // --- Fetching ---

    fn fetch_select_items(&mut self) {
        let Some(template) = self.schema.from_url_template().map(str::to_string) else {
            return;
        };
        if self.options.http.is_none() {
            self.events.push(FieldEvent::Error {
                message: FetchError::NoHttpClient.to_string(),
            });
            return;
        }
        if let Some((seq, url)) = self.fetch.prepare(&template) {
            debug!(key = %self.full_key(), %url, seq, "issuing option fetch");
            self.requests.push(FetchRequest {
                field: Vec::new(),
                seq,
                url,
            });
        }
    }

    /// Take the fetches issued by this field and its descendants.
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequest> {
        let mut requests = std::mem::take(&mut self.requests);
        for child in &mut self.children {
            for mut request in child.field.take_fetch_requests() {
                request.field.insert(0, child.field.key.clone());
                requests.push(request);
            }
        }
        requests
    }

    /// Hand the result of a request back to the field that issued it.
    pub fn complete_fetch(
        &mut self,
        wrapper: &Value,
        request: &FetchRequest,
        result: Result<HttpResponse, FetchError>,
    ) {
        self.complete_at(wrapper, &request.field, request.seq, &request.url, result);
    }

    fn complete_at(
        &mut self,
        wrapper: &Value,
        path: &[ModelKey],
        seq: u64,
        url: &str,
        result: Result<HttpResponse, FetchError>,
    ) {
        let Some((head, rest)) = path.split_first() else {
            match self
                .fetch
                .complete(seq, url, result, self.schema.items_prop())
            {
                FetchOutcome::Items(items) => {
                    self.raw_items = Some(items);
                    self.update_select_items(wrapper);
                }
                FetchOutcome::Failed(err) => {
                    if matches!(err, FetchError::NotAnArray { .. }) {
                        self.raw_items = Some(Vec::new());
                        self.update_select_items(wrapper);
                    }
                    self.events.push(FieldEvent::Error {
                        message: err.to_string(),
                    });
                }
                FetchOutcome::Stale => {}
            }
            return;
        };

        let model = self.key.get(wrapper);
        let Some(child) = self.children.iter_mut().find(|c| &c.field.key == head) else {
            return;
        };
        match child.binding {
            Binding::Model => {
                if let Some(model) = model {
                    child.field.complete_at(model, rest, seq, url, result);
                }
            }
            Binding::SubModel => {
                child
                    .field
                    .complete_at(self.reconciler.sub_models(), rest, seq, url, result)
            }
        }
    }

    /// Perform pending fetches through the configured HTTP client.
    pub fn run_fetches(&mut self, wrapper: &Value) {
        let Some(http) = self.options.http.clone() else {
            return;
        };
        for request in self.take_fetch_requests() {
            let result = http.get(&request.url);
            self.complete_fetch(wrapper, &request, result);
        }
    }

    // --- Children and sub-models ---

    fn is_container(&self) -> bool {
        matches!(
            self.schema.kind(),
            Some(FieldKind::ObjectContainer | FieldKind::ArrayContainer)
        )
    }

    fn make_child(&self, binding: Binding, raw: Value, key: ModelKey, required: bool) -> Child {
        Child {
            binding,
            field: Field::new(
                raw,
                key,
                format!("{}{}.", self.parent_key, self.key),
                required,
                self.options.clone(),
            ),
        }
    }

    fn one_of_child(&self) -> Option<Child> {
        if !self.reconciler.show_current_one_of() {
            return None;
        }
        let branch = self
            .reconciler
            .current_one_of()
            .and_then(|i| self.schema.one_of()?.get(i))?;
        Some(self.make_child(
            Binding::SubModel,
            object_branch(branch),
            ModelKey::name(CURRENT_ONE_OF),
            false,
        ))
    }

    fn build_children(&self, wrapper: &Value) -> Vec<Child> {
        let mut children = Vec::new();
        match self.schema.kind() {
            Some(FieldKind::ObjectContainer) => {
                for (i, branch) in self.schema.all_of().into_iter().flatten().enumerate() {
                    children.push(self.make_child(
                        Binding::SubModel,
                        object_branch(branch),
                        ModelKey::Name(all_of_slot(i)),
                        false,
                    ));
                }
                children.extend(self.one_of_child());
                for (name, prop) in self.schema.properties() {
                    children.push(self.make_child(
                        Binding::Model,
                        prop.clone(),
                        ModelKey::name(name),
                        self.schema.is_required_property(name),
                    ));
                }
            }
            Some(FieldKind::ArrayContainer) => {
                let items = self
                    .schema
                    .items()
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                let len = self
                    .key
                    .get(wrapper)
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                for i in 0..len {
                    children.push(self.make_child(
                        Binding::Model,
                        items.clone(),
                        ModelKey::Index(i),
                        false,
                    ));
                }
            }
            _ => {}
        }
        children
    }

    /// Match the child list to the schema. A child whose binding and key
    /// survive keeps its state (fetches, option list) and takes the new raw
    /// schema; it is remounted only when `remount` is set, else refreshed.
    /// Composition branches go first so their sub-models are merged before
    /// properties fill in defaults.
    fn rebuild_children(&mut self, wrapper: &mut Value, remount: bool) {
        let mut previous = std::mem::take(&mut self.children);
        let mut needs_mount = Vec::new();
        for mut child in self.build_children(wrapper) {
            let existing = previous
                .iter()
                .position(|p| p.binding == child.binding && p.field.key == child.field.key);
            match existing {
                Some(i) => {
                    let mut kept = previous.swap_remove(i);
                    kept.field.raw_schema = std::mem::take(&mut child.field.raw_schema);
                    kept.field.required = child.field.required;
                    needs_mount.push(remount);
                    self.children.push(kept);
                }
                None => {
                    needs_mount.push(true);
                    self.children.push(child);
                }
            }
        }
        if !previous.is_empty() {
            debug!(key = %self.full_key(), dropped = previous.len(), "dropping child fields");
        }

        for (child, mount) in self.children.iter_mut().zip(&needs_mount) {
            if child.binding == Binding::SubModel {
                child.field.attach(self.reconciler.sub_models_mut(), *mount);
            }
        }
        self.merge_sub_models(wrapper);

        if let Some(model) = self.key.get_mut(wrapper) {
            for (child, mount) in self.children.iter_mut().zip(&needs_mount) {
                if child.binding == Binding::Model {
                    child.field.attach(model, *mount);
                }
            }
        }
        self.clean_up(wrapper);
    }

    fn attach(&mut self, wrapper: &mut Value, mount: bool) {
        if mount {
            self.mount(wrapper);
        } else {
            self.refresh(wrapper);
        }
    }

    fn refresh_children(&mut self, wrapper: &mut Value) {
        let array_len = self
            .key
            .get(wrapper)
            .and_then(Value::as_array)
            .map(Vec::len);
        if self.schema.kind() == Some(FieldKind::ArrayContainer)
            && array_len != Some(self.children.len())
        {
            self.rebuild_children(wrapper, true);
            return;
        }

        let mut sub_models_touched = false;
        for child in &mut self.children {
            match child.binding {
                Binding::Model => {
                    if let Some(model) = self.key.get_mut(wrapper) {
                        child.field.refresh(model);
                    }
                }
                Binding::SubModel => {
                    child.field.refresh(self.reconciler.sub_models_mut());
                    sub_models_touched = true;
                }
            }
        }
        if sub_models_touched {
            self.apply_sub_models(wrapper);
        }
    }

    fn merge_sub_models(&mut self, wrapper: &mut Value) {
        if let Some(model) = self.key.get_mut(wrapper) {
            self.reconciler.merge_into(model);
        }
    }

    fn clean_up(&mut self, wrapper: &mut Value) {
        if let Some(model) = self.key.get_mut(wrapper) {
            clean_up_extra_properties(
                &self.schema,
                self.options.remove_additional_properties,
                self.reconciler.current_one_of(),
                model,
            );
        }
    }

    /// Merge sub-models into the model, then drop undeclared keys.
    fn apply_sub_models(&mut self, wrapper: &mut Value) {
        self.merge_sub_models(wrapper);
        self.clean_up(wrapper);
    }

    fn update_select_items(&mut self, wrapper: &Value) {
        if self.raw_items.is_none() && !self.schema.is_select() {
            return;
        }
        let items = compute_items(self.raw_items.as_deref(), &self.schema, wrapper, &self.key);
        if self.items.publish(items) {
            debug!(key = %self.full_key(), revision = self.items.revision(), "option list updated");
        }
    }

    // --- Accessors ---

    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    pub fn full_key(&self) -> String {
        full_key(&self.parent_key, &self.key.to_string())
    }

    /// Full key without composition markers, as carried by events.
    pub fn event_key(&self) -> String {
        event_key(&self.full_key())
    }

    pub fn effective_schema(&self) -> &EffectiveSchema {
        &self.schema
    }

    /// True once the first reconciliation pass has run.
    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn kind(&self) -> Option<FieldKind> {
        self.schema.kind()
    }

    pub fn label(&self) -> String {
        self.schema.label(&self.key)
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn disabled(&self) -> bool {
        self.options.disable_all
    }

    pub fn rules(&self) -> Vec<Rule> {
        field_rules(&self.schema, self.required, &self.options)
    }

    pub fn one_of_rules(&self) -> Vec<Rule> {
        one_of_rules(&self.schema, &self.options)
    }

    pub fn html_description(&self) -> Option<String> {
        self.schema
            .description()
            .map(|d| render_description(self.options.markdown.as_deref(), d))
    }

    /// Host slot filling this field: the `custom-*` display marker, else the full key.
    pub fn slot_name(&self) -> String {
        match self.schema.display() {
            Some(Display::Custom(name)) => name,
            _ => self.full_key(),
        }
    }

    /// CSS classes of the field container.
    pub fn property_class(&self) -> String {
        let clean: String = self
            .full_key()
            .replace('.', "-")
            .chars()
            .filter(|c| !c.is_ascii_digit())
            .collect();
        let mut class = format!("field-property field-property-{}", clean);
        if let Some(extra) = self.schema.x_class() {
            class.push(' ');
            class.push_str(extra);
        }
        class
    }

    pub fn style(&self) -> &str {
        self.schema.x_style().unwrap_or("")
    }

    pub fn select_items(&self) -> Option<&[SelectItem]> {
        self.items.items()
    }

    /// Bumped whenever a different option list is published.
    pub fn items_revision(&self) -> u64 {
        self.items.revision()
    }

    pub fn loading(&self) -> bool {
        self.fetch.loading()
    }

    pub fn query(&self) -> &str {
        self.fetch.query()
    }

    pub fn from_url_params(&self) -> &FromUrlParams {
        self.fetch.params()
    }

    pub fn current_one_of(&self) -> Option<usize> {
        self.reconciler.current_one_of()
    }

    pub fn show_current_one_of(&self) -> bool {
        self.reconciler.show_current_one_of()
    }

    pub fn sub_models(&self) -> &Value {
        self.reconciler.sub_models()
    }

    /// Descendant field at `path`.
    pub fn child(&self, path: &[ModelKey]) -> Option<&Field> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        self.children
            .iter()
            .find(|c| &c.field.key == head)
            .and_then(|c| c.field.child(rest))
    }

    pub fn child_keys(&self) -> Vec<&ModelKey> {
        self.children.iter().map(|c| &c.field.key).collect()
    }

    /// Take the events published by this field and its descendants.
    pub fn drain_events(&mut self) -> Vec<FieldEvent> {
        let mut events = std::mem::take(&mut self.events);
        for child in &mut self.children {
            events.extend(child.field.drain_events());
        }
        events
    }
}

/// Composition branch schema as an object schema.
fn object_branch(branch: &Value) -> Value {
    let mut branch = branch.clone();
    if let Value::Object(map) = &mut branch {
        map.entry("type")
            .or_insert_with(|| Value::String("object".to_string()));
    }
    branch
}
