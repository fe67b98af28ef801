use std::collections::BTreeMap;
use std::sync::Arc;

use canary_core::{CanaryError, Config, TimeseriesSample, Truncation};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::cache::{cache_key, CacheCategory, ResponseCache};
use crate::resilience::{Guarded, Operation, ResilientCore};
use crate::transport::{HistorianTransport, HttpTransport};
use crate::wire::{self, Aggregate, BrowseNode, DataPage, TagProperties};

/// A decoded response, or the truncation marker that replaced it.
///
/// When `truncation` is set, `value` is the type's empty default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fetched<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
}

impl<T> Fetched<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            truncation: None,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }
}

/// Parameters of one `getTagData` page.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequest {
    pub tags: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub page_size: u32,
    pub continuation: Option<Value>,
    pub aggregate: Option<Aggregate>,
}

impl DataRequest {
    pub fn new(tags: Vec<String>, start: DateTime<Utc>, end: DateTime<Utc>, page_size: u32) -> Self {
        Self {
            tags,
            start,
            end,
            page_size,
            continuation: None,
            aggregate: None,
        }
    }

    pub fn with_aggregate(mut self, aggregate: Option<Aggregate>) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// The same request positioned at the next page.
    pub fn next_page(&self, continuation: Value) -> Self {
        Self {
            continuation: Some(continuation),
            ..self.clone()
        }
    }

    fn params(&self) -> Value {
        let mut params = Map::new();
        params.insert("tags".into(), json!(self.tags));
        params.insert(
            "startTime".into(),
            json!(self.start.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        params.insert(
            "endTime".into(),
            json!(self.end.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        params.insert("maxSize".into(), json!(self.page_size));
        if let Some(c) = &self.continuation {
            params.insert("continuation".into(), c.clone());
        }
        if let Some(agg) = &self.aggregate {
            params.insert("aggregateName".into(), json!(agg.name));
            params.insert("aggregateInterval".into(), json!(agg.interval));
        }
        Value::Object(params)
    }
}

/// Typed historian operations: cache first, then the resilient core.
#[derive(Clone)]
pub struct CanaryClient {
    core: Arc<ResilientCore>,
    cache: Arc<ResponseCache>,
}

impl CanaryClient {
    pub fn new(core: Arc<ResilientCore>, cache: Arc<ResponseCache>) -> Self {
        Self { core, cache }
    }

    /// Wire a client over an arbitrary transport.
    pub fn with_transport(config: &Config, transport: Arc<dyn HistorianTransport>) -> Self {
        Self::new(
            Arc::new(ResilientCore::new(config, transport)),
            Arc::new(ResponseCache::from_config(&config.cache)),
        )
    }

    /// Wire a client over HTTP to the configured Views endpoints.
    pub fn connect(config: &Config) -> Result<Self, CanaryError> {
        let transport = HttpTransport::new(&config.historian)?;
        info!(
            urls = ?config.historian.base_urls,
            "Historian client ready"
        );
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn core(&self) -> &ResilientCore {
        &self.core
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    async fn fetch<T, D>(
        &self,
        op: Operation,
        params: Value,
        category: CacheCategory,
        bypass: bool,
        decode: D,
    ) -> Result<Fetched<T>, CanaryError>
    where
        T: Serialize + DeserializeOwned + Default,
        D: FnOnce(&Value) -> T,
    {
        let key = cache_key(op.endpoint(), &params);
        self.cache
            .get_or_compute_if(
                &key,
                category,
                bypass,
                || async move {
                    Ok(match self.core.call(op, params).await? {
                        Guarded::Complete(raw) => Fetched::complete(decode(&raw)),
                        Guarded::Truncated(t) => Fetched {
                            value: T::default(),
                            truncation: Some(t),
                        },
                    })
                },
                |fetched: &Fetched<T>| !fetched.is_truncated(),
            )
            .await
    }

    /// Tag paths under `path` (whole namespace when `None`), optionally
    /// filtered by a plain substring `search`.
    pub async fn browse_tags(
        &self,
        path: Option<&str>,
        search: Option<&str>,
        deep: bool,
        bypass: bool,
    ) -> Result<Fetched<Vec<String>>, CanaryError> {
        let mut params = Map::new();
        params.insert("path".into(), json!(path.unwrap_or("")));
        if let Some(s) = search.filter(|s| !s.is_empty()) {
            params.insert("search".into(), json!(s));
        }
        params.insert("deep".into(), json!(deep));
        self.fetch(
            Operation::BrowseTags,
            Value::Object(params),
            CacheCategory::Namespace,
            bypass,
            wire::decode_tags,
        )
        .await
    }

    pub async fn browse_nodes(
        &self,
        path: Option<&str>,
        bypass: bool,
    ) -> Result<Fetched<Vec<BrowseNode>>, CanaryError> {
        let parent = path.unwrap_or("").to_string();
        let params = json!({ "path": parent });
        self.fetch(
            Operation::BrowseNodes,
            params,
            CacheCategory::Namespace,
            bypass,
            move |body| wire::decode_nodes(body, &parent),
        )
        .await
    }

    /// Properties keyed by path; unknown paths are simply absent.
    pub async fn get_tag_properties(
        &self,
        paths: &[String],
        bypass: bool,
    ) -> Result<Fetched<BTreeMap<String, TagProperties>>, CanaryError> {
        self.fetch(
            Operation::GetTagProperties,
            json!({ "tags": paths }),
            CacheCategory::Metadata,
            bypass,
            wire::decode_properties,
        )
        .await
    }

    pub async fn get_tag_data(
        &self,
        request: &DataRequest,
        bypass: bool,
    ) -> Result<Fetched<DataPage>, CanaryError> {
        self.fetch(
            Operation::GetTagData,
            request.params(),
            CacheCategory::Timeseries,
            bypass,
            wire::decode_data,
        )
        .await
    }

    /// The most recent sample of each tag, in request order.
    pub async fn get_current_values(
        &self,
        paths: &[String],
        bypass: bool,
    ) -> Result<Fetched<Vec<TimeseriesSample>>, CanaryError> {
        let order: Vec<String> = paths.to_vec();
        self.fetch(
            Operation::GetCurrentValues,
            json!({ "tags": paths }),
            CacheCategory::Timeseries,
            bypass,
            move |body| {
                let mut page = wire::decode_data(body);
                order
                    .iter()
                    .filter_map(|p| {
                        page.samples
                            .remove(p)
                            .and_then(|samples| samples.into_iter().max_by_key(|s| s.timestamp))
                    })
                    .collect()
            },
        )
        .await
    }
}
