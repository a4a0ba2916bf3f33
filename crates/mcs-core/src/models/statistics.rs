//! Run statistics and the snapshot manifest.

use super::error::{ExtractionError, ExtractorStatus};
use mcs_connectors::RateLimiterStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-extractor counters for `statistics.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorCounters {
    pub status: ExtractorStatus,
    pub items: usize,
    pub edges: usize,
    pub errors: usize,
    pub pages_fetched: u32,
    pub rate_limit_hits: u32,
    pub duration_ms: u64,
}

/// Aggregated run statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryStatistics {
    pub total_objects: usize,
    pub total_edges: usize,
    pub extractors_run: usize,
    pub extractors_ok: usize,
    pub extractors_partial: usize,
    pub extractors_failed: usize,
    pub duration_ms: u64,
    pub by_extractor: BTreeMap<String, ExtractorCounters>,
    pub errors: Vec<ExtractionError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterStatus>,
}

/// `manifest.json`: the snapshot entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryManifest {
    pub version: String,
    pub generated_at: String,
    pub options: Value,
    pub extractor_kinds: Vec<String>,
    pub counts: BTreeMap<String, usize>,
    pub duration_ms: u64,
}
