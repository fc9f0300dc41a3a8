//! Field configuration.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::fetch::HttpClient;
use crate::markdown::MarkdownRenderer;

/// Default text of the `required` rule.
pub const DEFAULT_REQUIRED_MESSAGE: &str = "This information is required";

/// Options shared by a field and all of its descendants.
#[derive(Clone)]
pub struct FieldOptions {
    /// HTTP capability for `x-fromUrl` fields. Without it those fields
    /// report an error on first use.
    pub http: Option<Arc<dyn HttpClient>>,
    /// Renderer for descriptions. Without it descriptions stay plain text.
    pub markdown: Option<Arc<dyn MarkdownRenderer>>,
    /// Remove model keys not declared by the object schema.
    pub remove_additional_properties: bool,
    pub required_message: String,
    /// Render every widget disabled.
    pub disable_all: bool,
    /// Ambient values referenced by `{context.*}` URL placeholders.
    pub context: Map<String, Value>,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            http: None,
            markdown: None,
            remove_additional_properties: false,
            required_message: DEFAULT_REQUIRED_MESSAGE.to_string(),
            disable_all: false,
            context: Map::new(),
        }
    }
}

impl fmt::Debug for FieldOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldOptions")
            .field("http", &self.http.is_some())
            .field("markdown", &self.markdown.is_some())
            .field(
                "remove_additional_properties",
                &self.remove_additional_properties,
            )
            .field("required_message", &self.required_message)
            .field("disable_all", &self.disable_all)
            .field("context", &self.context)
            .finish()
    }
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_markdown(mut self, markdown: Arc<dyn MarkdownRenderer>) -> Self {
        self.markdown = Some(markdown);
        self
    }

    /// Set extra-property removal on every object field.
    pub fn remove_additional_properties(mut self, remove: bool) -> Self {
        self.remove_additional_properties = remove;
        self
    }

    pub fn required_message(mut self, message: impl Into<String>) -> Self {
        self.required_message = message.into();
        self
    }

    pub fn disable_all(mut self, disable: bool) -> Self {
        self.disable_all = disable;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Serialized form of [`FieldOptions`] as read from an options file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionsFile {
    pub remove_additional_properties: bool,
    pub required_message: Option<String>,
    pub disable_all: bool,
    pub context: Map<String, Value>,
}

impl OptionsFile {
    /// Convert into options. Capabilities (HTTP, Markdown) are attached by the caller.
    pub fn into_options(self) -> FieldOptions {
        let mut options = FieldOptions::new()
            .remove_additional_properties(self.remove_additional_properties)
            .disable_all(self.disable_all);
        if let Some(message) = self.required_message {
            options = options.required_message(message);
        }
        options.context = self.context;
        options
    }
}
