//! Explicit subscription table for values a field depends on.
//!
//! A field observes locations outside its own slot: the live array behind
//! `x-fromData` and the placeholder values of `x-fromUrl`. Subscriptions are
//! rebuilt on every reconciliation pass and evaluated by [`WatchTable::flush`].
//! A new subscription always fires on its first flush, so the current value
//! is captured and not only future changes.

use serde_json::{Map, Value};

use crate::equality::same_optional;
use crate::path::get_dotted;

const CONTEXT_PREFIX: &str = "context.";

/// Where a watched value lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchSource {
    /// Dotted path into the root model.
    Root(String),
    /// Dotted path into the ambient context of the field options.
    Context(String),
}

impl WatchSource {
    /// Source of a URL placeholder: `context.*` names read the ambient
    /// context, everything else the root model.
    pub fn for_placeholder(key: &str) -> Self {
        match key.strip_prefix(CONTEXT_PREFIX) {
            Some(rest) => WatchSource::Context(rest.to_string()),
            None => WatchSource::Root(key.to_string()),
        }
    }

    pub fn read(&self, root: &Value, context: &Map<String, Value>) -> Option<Value> {
        match self {
            WatchSource::Root(path) => get_dotted(root, path).cloned(),
            WatchSource::Context(path) => {
                let (head, tail) = match path.split_once('.') {
                    Some((head, tail)) => (head, tail),
                    None => (path.as_str(), ""),
                };
                context.get(head).and_then(|v| get_dotted(v, tail)).cloned()
            }
        }
    }
}

/// What a change of the watched value feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// Raw option items of an `x-fromData` field.
    FromData,
    /// A URL placeholder, by its name in the template.
    UrlParam(String),
}

#[derive(Debug, Clone)]
enum Observed {
    Never,
    Seen(Option<Value>),
}

#[derive(Debug, Clone)]
struct Subscription {
    source: WatchSource,
    targets: Vec<WatchTarget>,
    last: Observed,
}

/// A watched value that changed during a flush.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired {
    pub target: WatchTarget,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct WatchTable {
    subscriptions: Vec<Subscription>,
}

impl WatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn subscribe(&mut self, source: WatchSource, target: WatchTarget) {
        if let Some(sub) = self.subscriptions.iter_mut().find(|s| s.source == source) {
            if !sub.targets.contains(&target) {
                sub.targets.push(target);
            }
            sub.last = Observed::Never;
            return;
        }
        self.subscriptions.push(Subscription {
            source,
            targets: vec![target],
            last: Observed::Never,
        });
    }

    /// Evaluate every subscription and return the targets whose value changed.
    ///
    /// The whole table is updated before anything is returned, so callbacks
    /// run by the caller never observe a half-updated table.
    pub fn flush(&mut self, root: &Value, context: &Map<String, Value>) -> Vec<Fired> {
        let mut fired = Vec::new();
        for sub in &mut self.subscriptions {
            let current = sub.source.read(root, context);
            let changed = match &sub.last {
                Observed::Never => true,
                Observed::Seen(prev) => !same_optional(prev.as_ref(), current.as_ref()),
            };
            if !changed {
                continue;
            }
            for target in &sub.targets {
                fired.push(Fired {
                    target: target.clone(),
                    value: current.clone(),
                });
            }
            sub.last = Observed::Seen(current);
        }
        fired
    }
}
