//! Remote option fetching.
//!
//! A URL template such as `/api/{owner}/items?q={q}` is filled from the
//! free-text query and from placeholder values tracked per field. Requests
//! are only issued once every placeholder is known; until then the field
//! is simply "not ready".
//!
//! The request itself is performed by the host through [`HttpClient`], so
//! issuing and completing a fetch are two separate steps. Each issued
//! request carries a sequence number and completions older than the most
//! recent request are dropped.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::types::ModelKey;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Known values for URL placeholders, keyed by placeholder name.
pub type FromUrlParams = BTreeMap<String, Value>;

/// Response of an [`HttpClient`]. Clients fill whichever field their
/// library uses; `data` wins when both are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub data: Option<Value>,
    pub body: Option<Value>,
}

impl HttpResponse {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            body: None,
        }
    }

    pub fn into_payload(self) -> Value {
        self.data.or(self.body).unwrap_or(Value::Null)
    }
}

/// HTTP capability used to fetch option lists.
pub trait HttpClient: Send + Sync + fmt::Debug {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// A fetch ready to be performed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Path of model keys from the root field to the requesting field.
    pub field: Vec<ModelKey>,
    /// Per-field sequence number.
    pub seq: u64,
    pub url: String,
}

/// Placeholders of a URL template other than `q`, in order of appearance.
pub fn template_keys(template: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let key = &after[..end];
        if key != "q" {
            keys.push(key.to_string());
        }
        rest = &after[end + 1..];
    }
    keys
}

/// Fill a URL template.
///
/// `{q}` takes the query (empty when unset). Every other placeholder needs
/// a value in `params`; `None` is returned when any is missing or null.
pub fn build_url(template: &str, query: &str, params: &FromUrlParams) -> Option<String> {
    let mut url = template.replace("{q}", query);
    for key in template_keys(template) {
        let text = params.get(&key).and_then(param_text)?;
        url = url.replace(&format!("{{{}}}", key), &text);
    }
    Some(url)
}

fn param_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Pull the item array out of a response payload.
pub fn extract_items(
    payload: Value,
    items_prop: Option<&str>,
    url: &str,
) -> Result<Vec<Value>, FetchError> {
    let items = match items_prop {
        Some(prop) => match payload {
            Value::Object(mut map) => map.remove(prop).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        None => payload,
    };
    match items {
        Value::Array(items) => Ok(items),
        _ => Err(FetchError::NotAnArray {
            url: url.to_string(),
        }),
    }
}

/// Outcome of completing a request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Items(Vec<Value>),
    Failed(FetchError),
    /// A newer request was issued after this one; the result is ignored.
    Stale,
}

/// Fetch state of one field.
#[derive(Debug, Clone, Default)]
pub struct FetchCoordinator {
    params: FromUrlParams,
    query: String,
    next_seq: u64,
    latest_seq: Option<u64>,
    pending_url: Option<String>,
    loaded_url: Option<String>,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &FromUrlParams {
        &self.params
    }

    /// Record a placeholder value. `None` marks it unresolved again.
    pub fn set_param(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(v) => {
                self.params.insert(key.to_string(), v);
            }
            None => {
                self.params.remove(key);
            }
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// True while the most recent request has not completed.
    pub fn loading(&self) -> bool {
        self.pending_url.is_some()
    }

    /// Prepare the next request for `template`.
    ///
    /// Returns `None` when placeholders are incomplete, or when an identical
    /// request is in flight or already supplied the current items.
    pub fn prepare(&mut self, template: &str) -> Option<(u64, String)> {
        let Some(url) = build_url(template, &self.query, &self.params) else {
            debug!(template, "url parameters are incomplete, fetch deferred");
            return None;
        };
        if self.pending_url.as_deref() == Some(url.as_str()) {
            debug!(%url, "identical fetch already in flight");
            return None;
        }
        if self.pending_url.is_none() && self.loaded_url.as_deref() == Some(url.as_str()) {
            debug!(%url, "options already loaded from this url");
            return None;
        }
        self.next_seq += 1;
        self.latest_seq = Some(self.next_seq);
        self.pending_url = Some(url.clone());
        Some((self.next_seq, url))
    }

    /// Complete request `seq` with the host's result.
    pub fn complete(
        &mut self,
        seq: u64,
        url: &str,
        result: Result<HttpResponse, FetchError>,
        items_prop: Option<&str>,
    ) -> FetchOutcome {
        if self.latest_seq != Some(seq) {
            warn!(seq, url, "dropping stale fetch response");
            return FetchOutcome::Stale;
        }
        self.pending_url = None;

        match result.and_then(|res| extract_items(res.into_payload(), items_prop, url)) {
            Ok(items) => {
                self.loaded_url = Some(url.to_string());
                FetchOutcome::Items(items)
            }
            Err(err) => {
                self.loaded_url = None;
                warn!(url, error = %err, "option fetch failed");
                FetchOutcome::Failed(err)
            }
        }
    }
}

/// Blocking HTTP client backed by reqwest.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    base_url: Option<String>,
}

#[cfg(feature = "remote")]
impl ReqwestClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Prefix for relative URLs produced by templates such as `/api/items`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn absolute(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if url.starts_with('/') => format!("{}{}", base, url),
            _ => url.to_string(),
        }
    }
}

#[cfg(feature = "remote")]
impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let target = self.absolute(url);
        let response = self
            .client
            .get(&target)
            .send()
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().map_err(|e| FetchError::InvalidBody {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(HttpResponse::from_data(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> FromUrlParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn template_keys_skip_query() {
        assert_eq!(
            template_keys("/items/{a}?q={q}&b={context.b}"),
            vec!["a".to_string(), "context.b".to_string()]
        );
        assert!(template_keys("/items").is_empty());
    }

    #[test]
    fn build_url_substitutes_everything() {
        let url = build_url("/items/{a}?q={q}", "x", &params(&[("a", json!("5"))]));
        assert_eq!(url.as_deref(), Some("/items/5?q=x"));
    }

    #[test]
    fn build_url_requires_every_placeholder() {
        assert_eq!(build_url("/items/{a}?q={q}", "x", &FromUrlParams::new()), None);
        assert_eq!(
            build_url("/items/{a}", "", &params(&[("a", Value::Null)])),
            None
        );
    }

    #[test]
    fn build_url_formats_numbers() {
        let url = build_url("/page/{n}", "", &params(&[("n", json!(3))]));
        assert_eq!(url.as_deref(), Some("/page/3"));
    }

    #[test]
    fn extract_items_from_sub_property() {
        let items = extract_items(json!({"results": [1, 2]}), Some("results"), "/x").unwrap();
        assert_eq!(items, vec![json!(1), json!(2)]);
    }

    #[test]
    fn extract_items_rejects_non_array() {
        let err = extract_items(json!({"results": [1]}), None, "/x").unwrap_err();
        assert_eq!(err, FetchError::NotAnArray { url: "/x".into() });
    }

    #[test]
    fn coordinator_defers_until_params_known() {
        let mut coord = FetchCoordinator::new();
        assert_eq!(coord.prepare("/items/{a}"), None);
        assert!(!coord.loading());

        coord.set_param("a", Some(json!("5")));
        let (seq, url) = coord.prepare("/items/{a}").unwrap();
        assert_eq!(seq, 1);
        assert_eq!(url, "/items/5");
        assert!(coord.loading());
    }

    #[test]
    fn coordinator_skips_duplicate_in_flight_request() {
        let mut coord = FetchCoordinator::new();
        assert!(coord.prepare("/items").is_some());
        assert!(coord.prepare("/items").is_none());
    }

    #[test]
    fn coordinator_skips_url_that_supplied_current_items() {
        let mut coord = FetchCoordinator::new();
        let (seq, url) = coord.prepare("/items").unwrap();
        coord.complete(seq, &url, Ok(HttpResponse::from_data(json!(["a"]))), None);
        assert_eq!(coord.prepare("/items"), None);

        // A failed load may be retried
        let mut coord = FetchCoordinator::new();
        let (seq, url) = coord.prepare("/items").unwrap();
        coord.complete(seq, &url, Ok(HttpResponse::from_data(json!({}))), None);
        assert!(coord.prepare("/items").is_some());
    }

    #[test]
    fn coordinator_drops_stale_completion() {
        let mut coord = FetchCoordinator::new();
        coord.set_param("a", Some(json!("1")));
        let (first, _) = coord.prepare("/items/{a}").unwrap();
        coord.set_param("a", Some(json!("2")));
        let (second, _) = coord.prepare("/items/{a}").unwrap();

        let newer = coord.complete(
            second,
            "/items/2",
            Ok(HttpResponse::from_data(json!(["b"]))),
            None,
        );
        assert_eq!(newer, FetchOutcome::Items(vec![json!("b")]));

        let older = coord.complete(
            first,
            "/items/1",
            Ok(HttpResponse::from_data(json!(["a"]))),
            None,
        );
        assert_eq!(older, FetchOutcome::Stale);
        assert!(!coord.loading());
    }

    #[test]
    fn coordinator_reports_shape_fault_and_clears_loading() {
        let mut coord = FetchCoordinator::new();
        let (seq, url) = coord.prepare("/items").unwrap();
        let outcome = coord.complete(seq, &url, Ok(HttpResponse::from_data(json!({}))), None);
        assert!(matches!(outcome, FetchOutcome::Failed(FetchError::NotAnArray { .. })));
        assert!(!coord.loading());
    }

    #[test]
    fn response_prefers_data_over_body() {
        let res = HttpResponse {
            data: Some(json!([1])),
            body: Some(json!([2])),
        };
        assert_eq!(res.into_payload(), json!([1]));

        let res = HttpResponse {
            data: None,
            body: Some(json!([2])),
        };
        assert_eq!(res.into_payload(), json!([2]));
    }
}
