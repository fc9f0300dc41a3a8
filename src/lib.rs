//! Schema Field
//!
//! Schema resolution and model reconciliation for JSON-Schema-driven form fields.
//!
//! A [`Field`] is bound to one slot of a model wrapper (an object or array
//! owned by the host). Mounting it resolves the effective schema, brings the
//! value into conformance (defaults, `const`, composition branches, extra
//! property removal) and computes the option list of enum-like fields.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use schema_field::{Field, FieldOptions};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "allOf": [
//!         { "properties": { "x": { "type": "integer", "default": 1 } } },
//!         { "properties": { "y": { "type": "integer", "default": 2 } } }
//!     ]
//! });
//!
//! let mut wrapper = json!({});
//! let mut field = Field::root(schema, Arc::new(FieldOptions::new()));
//! field.mount(&mut wrapper);
//!
//! assert_eq!(wrapper["root"], json!({ "x": 1, "y": 2 }));
//! ```
//!
//! # Schema Extensions
//!
//! | Keyword | Effect |
//! |---------|--------|
//! | `x-fromUrl` | Options fetched from a URL template (`{q}`, `{path}`, `{context.key}`) |
//! | `x-fromData` | Options read from an array at a dotted path of the root model |
//! | `x-itemsProp` | Property of the fetch response holding the items |
//! | `x-itemKey` / `x-itemTitle` / `x-itemIcon` | Item fields (default `key` / `title`) |
//! | `x-display` | `hidden`, `list`, `icon` or `custom-*` |
//! | `x-class` / `x-style` | Presentation passthrough |
//!
//! # Scheduling
//!
//! Nothing happens behind the host's back. Watches fire in
//! [`Field::observe`], a switched `oneOf` variant mounts in [`Field::tick`],
//! and HTTP happens in [`Field::run_fetches`] or between
//! [`Field::take_fetch_requests`] and [`Field::complete_fetch`].

mod equality;
mod error;
mod fetch;
mod field;
mod loader;
mod markdown;
mod options;
mod path;
mod reconcile;
mod rules;
mod schema;
mod select;
mod types;
mod watch;

pub use equality::same_content;
pub use error::{FetchError, LoadError};
pub use fetch::{
    build_url, extract_items, template_keys, FetchCoordinator, FetchOutcome, FetchRequest,
    FromUrlParams, HttpClient, HttpResponse,
};
pub use field::{Field, FieldEvent};
pub use loader::{is_url, load_json, load_options, load_schema, load_schema_auto, load_schema_str};
pub use markdown::{render_description, MarkdownRenderer};
pub use options::{FieldOptions, OptionsFile, DEFAULT_REQUIRED_MESSAGE};
pub use path::{event_key, full_key, get_dotted};
pub use reconcile::{
    clean_up_extra_properties, declared_keys, default_value, find_one_of, initial_value,
    select_one_of, Bootstrap, Reconciler,
};
pub use rules::{check_all, field_rules, one_of_rules, Rule};
pub use schema::{resolve, EffectiveSchema};
pub use select::{compute_items, fill_list, fill_select_items, OptionList, SelectItem};
pub use types::{Display, FieldKind, ModelKey, SchemaType};
pub use watch::{Fired, WatchSource, WatchTable, WatchTarget};

#[cfg(feature = "remote")]
pub use fetch::ReqwestClient;
#[cfg(feature = "remote")]
pub use loader::load_schema_url;
#[cfg(feature = "markdown")]
pub use markdown::PulldownRenderer;
