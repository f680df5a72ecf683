use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use lexiforge_core::GenerationRequest;

/// One unit of work. The orchestrator only looks at `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentItem {
    pub id: String,
    pub payload: Value,
}

impl EnrichmentItem {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Where a cached result for an item would live in the result cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheQuery {
    pub text: String,
    pub from: String,
    pub to: String,
    pub service: String,
}

/// Domain knowledge the orchestrator needs to enrich one kind of item.
pub trait EnrichmentTask: Send + Sync + 'static {
    type Output: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Name recorded on manual review records.
    fn component(&self) -> &str;

    /// Fields the item still lacks. Empty means nothing to generate.
    fn missing_fields(&self, item: &EnrichmentItem) -> Vec<String>;

    /// `attempt` is the 1-indexed item-level attempt, so later attempts may
    /// frame the prompt differently.
    fn build_request(
        &self,
        item: &EnrichmentItem,
        missing: &[String],
        attempt: u32,
    ) -> GenerationRequest;

    /// Domain validation of a schema-valid payload. `Err` carries the reason.
    fn accept(
        &self,
        item: &EnrichmentItem,
        missing: &[String],
        payload: &Value,
    ) -> Result<Self::Output, String>;

    /// Result for an item with no missing fields. `None` records it as
    /// processed without a stored value.
    fn passthrough(&self, _item: &EnrichmentItem) -> Option<Self::Output> {
        None
    }

    fn cache_query(&self, _item: &EnrichmentItem) -> Option<CacheQuery> {
        None
    }

    fn from_cached(&self, _item: &EnrichmentItem, _cached: &str) -> Option<Self::Output> {
        None
    }

    fn cache_value(&self, _item: &EnrichmentItem, _output: &Self::Output) -> Option<String> {
        None
    }
}
