//! Extractor pipeline.
//!
//! Every domain extractor implements [`Extractor`] (fetch → enrich →
//! transform) and is driven by [`run_extractor`], which warms declared
//! caches, paces API calls through the adaptive limiter, collects per-item
//! errors without aborting, and classifies the terminal status.

pub mod asset;
pub mod automation;
pub mod data_extension;
pub mod data_extract;
pub mod delivery_profile;
pub mod email;
pub mod event_definition;
pub mod file_transfer;
pub mod filter;
pub mod folder;
pub mod import;
pub mod journey;
pub mod list;
pub mod query;
pub mod script;
pub mod send_classification;
pub mod sender_profile;
pub mod testing;
pub mod triggered_send;

use crate::cache::{Breadcrumb, CacheKind, CacheManager};
use crate::models::{
    ErrorKind, ExtractionError, ExtractorStatus, ObjectKind, ObjectRecord, RelationshipEdge,
};
use mcs_connectors::rest::PagedOutcome;
use mcs_connectors::soap::RetrieveOutcome;
use mcs_connectors::{
    AdaptiveRateLimiter, ApiResponse, RateLimitGuard, RestClient, SimpleFilter, SoapClient,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Rate-limit hits in one call treated as a platform stress signal.
const STRESS_SIGNAL_HITS: u32 = 3;

/// The runnable extractor kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Automations,
    Queries,
    Scripts,
    Imports,
    DataExtracts,
    FileTransfers,
    Filters,
    DataExtensions,
    Journeys,
    EventDefinitions,
    TriggeredSends,
    Emails,
    Lists,
    SenderProfiles,
    DeliveryProfiles,
    SendClassifications,
    Assets,
    Folders,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Automations => "automations",
            ExtractorKind::Queries => "queries",
            ExtractorKind::Scripts => "scripts",
            ExtractorKind::Imports => "imports",
            ExtractorKind::DataExtracts => "data_extracts",
            ExtractorKind::FileTransfers => "file_transfers",
            ExtractorKind::Filters => "filters",
            ExtractorKind::DataExtensions => "data_extensions",
            ExtractorKind::Journeys => "journeys",
            ExtractorKind::EventDefinitions => "event_definitions",
            ExtractorKind::TriggeredSends => "triggered_sends",
            ExtractorKind::Emails => "emails",
            ExtractorKind::Lists => "lists",
            ExtractorKind::SenderProfiles => "sender_profiles",
            ExtractorKind::DeliveryProfiles => "delivery_profiles",
            ExtractorKind::SendClassifications => "send_classifications",
            ExtractorKind::Assets => "assets",
            ExtractorKind::Folders => "folders",
        }
    }

    pub fn all() -> &'static [ExtractorKind] {
        &[
            ExtractorKind::Automations,
            ExtractorKind::Queries,
            ExtractorKind::Scripts,
            ExtractorKind::Imports,
            ExtractorKind::DataExtracts,
            ExtractorKind::FileTransfers,
            ExtractorKind::Filters,
            ExtractorKind::DataExtensions,
            ExtractorKind::Journeys,
            ExtractorKind::EventDefinitions,
            ExtractorKind::TriggeredSends,
            ExtractorKind::Emails,
            ExtractorKind::Lists,
            ExtractorKind::SenderProfiles,
            ExtractorKind::DeliveryProfiles,
            ExtractorKind::SendClassifications,
            ExtractorKind::Assets,
            ExtractorKind::Folders,
        ]
    }
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named extractor selections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Quick,
    Full,
    Automation,
    Messaging,
    Content,
    Journey,
}

/// Resolves a preset to its extractor kinds.
pub fn preset_kinds(preset: Preset) -> Vec<ExtractorKind> {
    match preset {
        Preset::Quick => vec![ExtractorKind::Automations, ExtractorKind::DataExtensions],
        Preset::Full => ExtractorKind::all().to_vec(),
        Preset::Automation => vec![
            ExtractorKind::Automations,
            ExtractorKind::Queries,
            ExtractorKind::Scripts,
            ExtractorKind::Imports,
            ExtractorKind::DataExtracts,
            ExtractorKind::Filters,
            ExtractorKind::FileTransfers,
        ],
        Preset::Messaging => vec![
            ExtractorKind::Emails,
            ExtractorKind::TriggeredSends,
            ExtractorKind::Lists,
            ExtractorKind::SenderProfiles,
            ExtractorKind::DeliveryProfiles,
            ExtractorKind::SendClassifications,
        ],
        Preset::Content => vec![
            ExtractorKind::DataExtensions,
            ExtractorKind::Queries,
            ExtractorKind::Assets,
        ],
        Preset::Journey => vec![
            ExtractorKind::Journeys,
            ExtractorKind::DataExtensions,
            ExtractorKind::EventDefinitions,
        ],
    }
}

/// Constructs the extractor for a kind.
pub fn extractor_for(kind: ExtractorKind) -> Box<dyn Extractor> {
    match kind {
        ExtractorKind::Automations => Box::new(automation::AutomationExtractor),
        ExtractorKind::Queries => Box::new(query::QueryExtractor),
        ExtractorKind::Scripts => Box::new(script::ScriptExtractor),
        ExtractorKind::Imports => Box::new(import::ImportExtractor),
        ExtractorKind::DataExtracts => Box::new(data_extract::DataExtractExtractor),
        ExtractorKind::FileTransfers => Box::new(file_transfer::FileTransferExtractor),
        ExtractorKind::Filters => Box::new(filter::FilterExtractor),
        ExtractorKind::DataExtensions => Box::new(data_extension::DataExtensionExtractor),
        ExtractorKind::Journeys => Box::new(journey::JourneyExtractor),
        ExtractorKind::EventDefinitions => Box::new(event_definition::EventDefinitionExtractor),
        ExtractorKind::TriggeredSends => Box::new(triggered_send::TriggeredSendExtractor),
        ExtractorKind::Emails => Box::new(email::EmailExtractor),
        ExtractorKind::Lists => Box::new(list::ListExtractor),
        ExtractorKind::SenderProfiles => Box::new(sender_profile::SenderProfileExtractor),
        ExtractorKind::DeliveryProfiles => Box::new(delivery_profile::DeliveryProfileExtractor),
        ExtractorKind::SendClassifications => {
            Box::new(send_classification::SendClassificationExtractor)
        }
        ExtractorKind::Assets => Box::new(asset::AssetExtractor),
        ExtractorKind::Folders => Box::new(folder::FolderExtractor),
    }
}

/// Options shared by all extractors in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorOptions {
    /// REST collection page size.
    pub page_size: u32,
    /// Fetch per-item detail records.
    pub include_details: bool,
    /// Carry heavyweight content (query text stays on; script bodies,
    /// email bodies, asset content come with this).
    pub include_content: bool,
    /// Bound on concurrent per-item detail fetches.
    pub max_detail_concurrency: usize,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            include_details: true,
            include_content: false,
            max_detail_concurrency: 8,
        }
    }
}

/// Progress notifications for the TUI/CLI collaborators.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        kind: ExtractorKind,
    },
    Progress {
        kind: ExtractorKind,
        done: u64,
        total: u64,
        message: String,
    },
    Finished {
        kind: ExtractorKind,
        items: usize,
        status: ExtractorStatus,
    },
    Error {
        kind: ExtractorKind,
        message: String,
    },
}

/// Progress callback handle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Everything an extractor needs to run: clients, caches, pacing, options.
/// All handles are explicit; tests construct a fresh context per scenario.
#[derive(Clone)]
pub struct ExtractorContext {
    pub rest: Arc<RestClient>,
    pub soap: Arc<SoapClient>,
    pub cache: Arc<CacheManager>,
    pub limiter: Arc<AdaptiveRateLimiter>,
    pub options: ExtractorOptions,
    pub progress: Option<ProgressSink>,
    pub cancel: CancellationToken,
}

/// Raw records pulled by `fetch`, with pagination counters and the
/// terminal error, if any. Items gathered before a failure are kept.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub items: Vec<Value>,
    pub pages: u32,
    pub rate_limit_hits: u32,
    pub error: Option<ExtractionError>,
}

/// Accumulator filled by `transform`.
#[derive(Debug, Default)]
pub struct TransformOutput {
    pub records: Vec<ObjectRecord>,
    pub edges: Vec<RelationshipEdge>,
    pub errors: Vec<ExtractionError>,
}

/// Result of one extractor run.
#[derive(Debug)]
pub struct ExtractorResult {
    pub kind: ExtractorKind,
    pub status: ExtractorStatus,
    pub items: Vec<ObjectRecord>,
    pub edges: Vec<RelationshipEdge>,
    pub errors: Vec<ExtractionError>,
    pub pages_fetched: u32,
    pub rate_limit_hits: u32,
    pub duration_ms: u64,
}

impl ExtractorResult {
    fn new(kind: ExtractorKind) -> Self {
        Self {
            kind,
            status: ExtractorStatus::Ok,
            items: Vec::new(),
            edges: Vec::new(),
            errors: Vec::new(),
            pages_fetched: 0,
            rate_limit_hits: 0,
            duration_ms: 0,
        }
    }
}

/// One domain extractor.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;
    fn object_kind(&self) -> ObjectKind;

    /// Caches the driver warms before `fetch` runs.
    fn required_caches(&self) -> &'static [CacheKind] {
        &[]
    }

    /// Paginated pull of raw records for this object type.
    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult;

    /// Attaches breadcrumbs, resolves referenced names, fetches per-item
    /// details. Per-item failures go into `errors` and keep the item
    /// unenriched. Default: pass-through.
    async fn enrich(
        &self,
        _ctx: &ExtractorContext,
        items: Vec<Value>,
        _errors: &mut Vec<ExtractionError>,
    ) -> Vec<Value> {
        items
    }

    /// Normalizes raw records and emits relationship edges.
    fn transform(&self, ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput);
}

impl ExtractorContext {
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(sink) = &self.progress {
            sink(event);
        }
    }

    fn note_outcome(&self, guard: RateLimitGuard, ok: bool, hits: u32) {
        self.limiter.release(guard, ok && hits == 0);
        if hits >= STRESS_SIGNAL_HITS {
            self.limiter.note_stress();
        }
    }

    /// Paced single REST GET.
    pub async fn paced_get(
        &self,
        kind: ExtractorKind,
        path: &str,
    ) -> Result<ApiResponse, ExtractionError> {
        let guard = self.limiter.acquire(kind.as_str()).await;
        match self.rest.get(path).await {
            Ok(response) => {
                let ok = response.ok;
                let hits = response.rate_limit_hits;
                self.note_outcome(guard, ok, hits);
                Ok(response)
            }
            Err(e) => {
                self.limiter.release(guard, false);
                Err(ExtractionError::from_transport(kind.as_str(), &e))
            }
        }
    }

    /// Paced, fully paginated REST collection fetch.
    pub async fn paced_get_paged(&self, kind: ExtractorKind, path: &str) -> FetchResult {
        let guard = self.limiter.acquire(kind.as_str()).await;
        let outcome = self.rest.get_paged(path, self.options.page_size).await;
        let ok = outcome.error.is_none();
        let hits = outcome.rate_limit_hits;
        self.note_outcome(guard, ok, hits);
        fetch_from_paged(kind, outcome)
    }

    /// Paced SOAP retrieve across all continuation pages.
    pub async fn paced_retrieve_all(
        &self,
        kind: ExtractorKind,
        object_type: &str,
        properties: &[&str],
        filter: Option<&SimpleFilter>,
    ) -> FetchResult {
        let guard = self.limiter.acquire(kind.as_str()).await;
        let outcome = self.soap.retrieve_all(object_type, properties, filter).await;
        let ok = outcome.error.is_none();
        self.note_outcome(guard, ok, 0);
        fetch_from_retrieve(kind, outcome)
    }

    /// Resolves a breadcrumb for the folder id found in `item[field]` and
    /// stores it under `folderPath`. Cyclic paths are reported as
    /// data-consistency errors but still attached.
    pub async fn attach_breadcrumb(
        &self,
        kind: ExtractorKind,
        cache_kind: CacheKind,
        item: &mut Value,
        field: &str,
        errors: &mut Vec<ExtractionError>,
    ) {
        let Some(folder_id) = crate::models::object::raw_str(item, field) else {
            return;
        };
        match self.cache.breadcrumb(cache_kind, &folder_id).await {
            Ok(Breadcrumb { path, cyclic }) => {
                if cyclic {
                    errors.push(
                        ExtractionError::new(
                            kind.as_str(),
                            ErrorKind::DataConsistency,
                            format!("cyclic folder chain at {}", folder_id),
                        )
                        .with_detail(serde_json::json!({ "folderId": folder_id })),
                    );
                }
                if let Some(map) = item.as_object_mut() {
                    map.insert("folderPath".to_string(), Value::String(path));
                }
            }
            Err(e) => {
                errors.push(ExtractionError::new(
                    kind.as_str(),
                    ErrorKind::CacheLoadFailed,
                    e.to_string(),
                ));
            }
        }
    }
}

fn fetch_from_paged(kind: ExtractorKind, outcome: PagedOutcome) -> FetchResult {
    FetchResult {
        items: outcome.items,
        pages: outcome.pages,
        rate_limit_hits: outcome.rate_limit_hits,
        error: outcome
            .error
            .map(|e| ExtractionError::from_transport(kind.as_str(), &e)),
    }
}

fn fetch_from_retrieve(kind: ExtractorKind, outcome: RetrieveOutcome) -> FetchResult {
    FetchResult {
        items: outcome.objects,
        pages: outcome.pages,
        rate_limit_hits: 0,
        error: outcome
            .error
            .map(|e| ExtractionError::from_transport(kind.as_str(), &e)),
    }
}

/// Drives one extractor through the full pipeline.
pub async fn run_extractor(extractor: &dyn Extractor, ctx: &ExtractorContext) -> ExtractorResult {
    let kind = extractor.kind();
    let started = Instant::now();
    let mut result = ExtractorResult::new(kind);
    ctx.emit(ProgressEvent::Started { kind });

    // Warm declared caches; a failed load is fatal for this extractor only.
    let warmed = ctx
        .cache
        .warm(extractor.required_caches(), ctx.options.max_detail_concurrency)
        .await;
    for (cache_kind, outcome) in warmed {
        if let Err(e) = outcome {
            warn!(extractor = %kind, cache = %cache_kind, error = %e, "cache load failed");
            result.errors.push(ExtractionError::new(
                kind.as_str(),
                ErrorKind::CacheLoadFailed,
                e.to_string(),
            ));
            result.status = ExtractorStatus::Failed;
            result.duration_ms = started.elapsed().as_millis() as u64;
            ctx.emit(ProgressEvent::Error {
                kind,
                message: e.to_string(),
            });
            return result;
        }
    }

    ctx.emit(ProgressEvent::Progress {
        kind,
        done: 0,
        total: 0,
        message: "fetching".to_string(),
    });
    let fetch = extractor.fetch(ctx).await;
    result.pages_fetched = fetch.pages;
    result.rate_limit_hits = fetch.rate_limit_hits;
    let fetch_failed_empty = fetch.error.is_some() && fetch.items.is_empty();
    if let Some(error) = fetch.error {
        ctx.emit(ProgressEvent::Error {
            kind,
            message: error.message.clone(),
        });
        result.errors.push(error);
    }

    let enriched = if fetch_failed_empty {
        Vec::new()
    } else {
        ctx.emit(ProgressEvent::Progress {
            kind,
            done: 0,
            total: fetch.items.len() as u64,
            message: "enriching".to_string(),
        });
        extractor.enrich(ctx, fetch.items, &mut result.errors).await
    };

    let mut output = TransformOutput::default();
    extractor.transform(ctx, &enriched, &mut output);
    result.items = output.records;
    result.edges = output.edges;
    result.errors.append(&mut output.errors);

    result.status = classify_status(&result, fetch_failed_empty);
    result.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        extractor = %kind,
        items = result.items.len(),
        edges = result.edges.len(),
        errors = result.errors.len(),
        status = ?result.status,
        "extractor finished"
    );
    ctx.emit(ProgressEvent::Finished {
        kind,
        items: result.items.len(),
        status: result.status,
    });
    result
}

fn classify_status(result: &ExtractorResult, fetch_failed_empty: bool) -> ExtractorStatus {
    let canceled = result
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::Canceled);
    if canceled {
        return ExtractorStatus::Aborted;
    }
    let fatal = result
        .errors
        .iter()
        .any(|e| e.kind.is_fatal_for_extractor());
    if (fatal || fetch_failed_empty) && result.items.is_empty() {
        return ExtractorStatus::Failed;
    }
    // Data-consistency findings (cyclic folders, unresolved references)
    // are counted but do not mean data was lost.
    let lossy = result
        .errors
        .iter()
        .any(|e| e.kind != ErrorKind::DataConsistency);
    if lossy {
        ExtractorStatus::Partial
    } else {
        ExtractorStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testing::engine_fixture;
    use mcs_connectors::testing::MockResponse;
    use mcs_connectors::RateLimiterConfig;
    use serde_json::json;

    fn status_of(errors: Vec<ExtractionError>, items: usize, fetch_failed_empty: bool) -> ExtractorStatus {
        let mut result = ExtractorResult::new(ExtractorKind::Queries);
        result.errors = errors;
        result.items = (0..items)
            .map(|i| ObjectRecord::new(ObjectKind::Query, format!("q-{i}"), "q"))
            .collect();
        classify_status(&result, fetch_failed_empty)
    }

    #[test]
    fn status_classification_rules() {
        assert_eq!(status_of(vec![], 2, false), ExtractorStatus::Ok);
        assert_eq!(
            status_of(
                vec![ExtractionError::new("queries", ErrorKind::Canceled, "x")],
                2,
                false
            ),
            ExtractorStatus::Aborted
        );
        assert_eq!(
            status_of(
                vec![ExtractionError::new("queries", ErrorKind::AuthFailed, "x")],
                0,
                true
            ),
            ExtractorStatus::Failed
        );
        assert_eq!(
            status_of(
                vec![ExtractionError::new("queries", ErrorKind::ParseError, "x")],
                2,
                false
            ),
            ExtractorStatus::Partial
        );
        // Data-consistency findings alone keep the run clean.
        assert_eq!(
            status_of(
                vec![ExtractionError::new("queries", ErrorKind::DataConsistency, "cycle")],
                2,
                false
            ),
            ExtractorStatus::Ok
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_calls_grow_the_kinds_delay() {
        let fixture = engine_fixture();
        let route = fixture.backend.on("/automation/v1/queries");
        route.push(MockResponse::rate_limited(1));
        route.push(MockResponse::json(200, json!({"items": []})));

        // A context with real pacing parameters, not the zeroed test ones.
        let mut ctx = fixture.context();
        ctx.limiter = Arc::new(AdaptiveRateLimiter::new(RateLimiterConfig::default()));

        let before = ctx.limiter.current_delay("queries");
        let response = ctx
            .paced_get(ExtractorKind::Queries, "/automation/v1/queries")
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.rate_limit_hits, 1);

        // The call succeeded but absorbed a 429, so pacing backs off.
        let after = ctx.limiter.current_delay("queries");
        assert!(after > before);
    }

    #[tokio::test]
    async fn cyclic_folder_chain_is_counted_but_not_partial() {
        let fixture = engine_fixture();
        fixture.backend.on("/email/v1/category").always(MockResponse::json(
            200,
            json!({"items": [
                {"id": 1, "name": "A", "parentId": 2},
                {"id": 2, "name": "B", "parentId": 1}
            ]}),
        ));
        fixture.backend.on("/automation/v1/queries").push(MockResponse::json(
            200,
            json!({"items": [
                {"queryDefinitionId": "Q1", "name": "In a cycle", "categoryId": 1}
            ]}),
        ));

        let ctx = fixture.context();
        let result = run_extractor(&query::QueryExtractor, &ctx).await;
        assert_eq!(result.status, ExtractorStatus::Ok);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::DataConsistency);
        // The path still resolved, truncated at the revisit.
        assert!(result.items[0].folder_path.is_some());
    }
}
