//! Lazy, thread-safe registry of reference tables.
//!
//! Each [`CacheKind`] is populated at most once per run, on first access,
//! behind a per-kind `OnceCell`; reads after publication are lock-free.
//! Folder kinds feed breadcrumb resolution, definition kinds feed
//! cross-reference lookups during enrichment.

pub mod breadcrumb;

pub use breadcrumb::{Breadcrumb, BreadcrumbBuilder};

use crate::models::Folder;
use mcs_connectors::{RestClient, SimpleFilter, SoapClient};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Page size for cache population fetches.
const CACHE_PAGE_SIZE: u32 = 500;

/// Reference tables the engine can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKind {
    // Folder maps loaded over SOAP (DataFolder).
    AutomationFolders,
    EmailFolders,
    TriggeredSendFolders,
    ListFolders,
    JourneyFolders,
    // Folder maps loaded over REST categories.
    DataExtensionFolders,
    QueryFolders,
    ScriptFolders,
    ImportFolders,
    DataExtractFolders,
    FileTransferFolders,
    FilterFolders,
    // Content Builder categories.
    ContentCategories,
    // Definition lookups.
    Queries,
    Scripts,
    Emails,
    TriggeredSends,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::AutomationFolders => "automation_folders",
            CacheKind::EmailFolders => "email_folders",
            CacheKind::TriggeredSendFolders => "triggered_send_folders",
            CacheKind::ListFolders => "list_folders",
            CacheKind::JourneyFolders => "journey_folders",
            CacheKind::DataExtensionFolders => "data_extension_folders",
            CacheKind::QueryFolders => "query_folders",
            CacheKind::ScriptFolders => "script_folders",
            CacheKind::ImportFolders => "import_folders",
            CacheKind::DataExtractFolders => "data_extract_folders",
            CacheKind::FileTransferFolders => "file_transfer_folders",
            CacheKind::FilterFolders => "filter_folders",
            CacheKind::ContentCategories => "content_categories",
            CacheKind::Queries => "queries",
            CacheKind::Scripts => "scripts",
            CacheKind::Emails => "emails",
            CacheKind::TriggeredSends => "triggered_sends",
        }
    }

    pub fn all() -> &'static [CacheKind] {
        &[
            CacheKind::AutomationFolders,
            CacheKind::EmailFolders,
            CacheKind::TriggeredSendFolders,
            CacheKind::ListFolders,
            CacheKind::JourneyFolders,
            CacheKind::DataExtensionFolders,
            CacheKind::QueryFolders,
            CacheKind::ScriptFolders,
            CacheKind::ImportFolders,
            CacheKind::DataExtractFolders,
            CacheKind::FileTransferFolders,
            CacheKind::FilterFolders,
            CacheKind::ContentCategories,
            CacheKind::Queries,
            CacheKind::Scripts,
            CacheKind::Emails,
            CacheKind::TriggeredSends,
        ]
    }

    fn is_folder_kind(&self) -> bool {
        !matches!(
            self,
            CacheKind::Queries | CacheKind::Scripts | CacheKind::Emails | CacheKind::TriggeredSends
        )
    }

    /// Platform content-type string for SOAP-loaded folder kinds.
    fn soap_content_type(&self) -> Option<&'static str> {
        match self {
            CacheKind::AutomationFolders => Some("automations"),
            CacheKind::EmailFolders => Some("email"),
            CacheKind::TriggeredSendFolders => Some("triggered_send_definition"),
            CacheKind::ListFolders => Some("list"),
            CacheKind::JourneyFolders => Some("journey"),
            _ => None,
        }
    }

    /// Platform category-type string for REST-loaded folder kinds.
    fn rest_category_type(&self) -> Option<&'static str> {
        match self {
            CacheKind::DataExtensionFolders => Some("dataextension"),
            CacheKind::QueryFolders => Some("queryactivity"),
            CacheKind::ScriptFolders => Some("ssjsactivity"),
            CacheKind::ImportFolders => Some("importactivity"),
            CacheKind::DataExtractFolders => Some("dataextractactivity"),
            CacheKind::FileTransferFolders => Some("filetransferactivity"),
            CacheKind::FilterFolders => Some("filteractivity"),
            _ => None,
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache population failure.
#[derive(Error, Debug, Clone)]
#[error("failed to load cache {kind}: {message}")]
pub struct CacheError {
    pub kind: &'static str,
    pub message: String,
}

impl CacheError {
    fn new(kind: CacheKind, message: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str(),
            message: message.into(),
        }
    }
}

/// Per-kind load statistics for `statistics.json`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub load_ms: u64,
    pub unresolved_folders: usize,
}

type FolderTable = HashMap<String, Folder>;
type DefinitionTable = HashMap<String, Value>;

/// Lazy-loading registry of folder maps and definition lookups.
pub struct CacheManager {
    rest: Arc<RestClient>,
    soap: Arc<SoapClient>,
    folder_cells: HashMap<CacheKind, OnceCell<Arc<FolderTable>>>,
    definition_cells: HashMap<CacheKind, OnceCell<Arc<DefinitionTable>>>,
    breadcrumbs: Mutex<HashMap<CacheKind, Arc<BreadcrumbBuilder>>>,
    stats: Mutex<HashMap<CacheKind, CacheStats>>,
}

impl CacheManager {
    pub fn new(rest: Arc<RestClient>, soap: Arc<SoapClient>) -> Self {
        let mut folder_cells = HashMap::new();
        let mut definition_cells = HashMap::new();
        for kind in CacheKind::all() {
            if kind.is_folder_kind() {
                folder_cells.insert(*kind, OnceCell::new());
            } else {
                definition_cells.insert(*kind, OnceCell::new());
            }
        }
        Self {
            rest,
            soap,
            folder_cells,
            definition_cells,
            breadcrumbs: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Folder map for a folder kind, loading it on first access.
    pub async fn folders(&self, kind: CacheKind) -> Result<Arc<FolderTable>, CacheError> {
        let cell = self
            .folder_cells
            .get(&kind)
            .ok_or_else(|| CacheError::new(kind, "not a folder cache"))?;
        cell.get_or_try_init(|| async {
            let started = Instant::now();
            let table = self.load_folders(kind).await?;
            self.record_stats(kind, table.len(), started);
            Ok(Arc::new(table))
        })
        .await
        .cloned()
    }

    /// Definition lookup table, loading it on first access.
    pub async fn definitions(&self, kind: CacheKind) -> Result<Arc<DefinitionTable>, CacheError> {
        let cell = self
            .definition_cells
            .get(&kind)
            .ok_or_else(|| CacheError::new(kind, "not a definition cache"))?;
        cell.get_or_try_init(|| async {
            let started = Instant::now();
            let table = self.load_definitions(kind).await?;
            self.record_stats(kind, table.len(), started);
            Ok(Arc::new(table))
        })
        .await
        .cloned()
    }

    /// One definition by id.
    pub async fn definition(&self, kind: CacheKind, id: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.definitions(kind).await?.get(id).cloned())
    }

    /// Resolved breadcrumb path for a folder id within a folder kind.
    pub async fn breadcrumb(&self, kind: CacheKind, folder_id: &str) -> Result<Breadcrumb, CacheError> {
        let folders = self.folders(kind).await?;
        let builder = {
            let mut builders = self.breadcrumbs.lock().expect("breadcrumb registry poisoned");
            Arc::clone(
                builders
                    .entry(kind)
                    .or_insert_with(|| Arc::new(BreadcrumbBuilder::new(folders))),
            )
        };
        Ok(builder.build(folder_id))
    }

    /// Preloads the given kinds with bounded parallelism.
    pub async fn warm(
        &self,
        kinds: &[CacheKind],
        parallelism: usize,
    ) -> Vec<(CacheKind, Result<(), CacheError>)> {
        use futures::stream::{self, StreamExt};

        stream::iter(kinds.iter().copied())
            .map(|kind| async move { (kind, self.ensure(kind).await) })
            .buffer_unordered(parallelism.max(1))
            .collect()
            .await
    }

    async fn ensure(&self, kind: CacheKind) -> Result<(), CacheError> {
        if kind.is_folder_kind() {
            self.folders(kind).await.map(|_| ())
        } else {
            self.definitions(kind).await.map(|_| ())
        }
    }

    /// Load stats for every populated kind, with unresolved-folder counts
    /// folded in from the breadcrumb builders.
    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        let mut stats: BTreeMap<String, CacheStats> = self
            .stats
            .lock()
            .expect("cache stats poisoned")
            .iter()
            .map(|(kind, s)| (kind.as_str().to_string(), s.clone()))
            .collect();

        let builders = self.breadcrumbs.lock().expect("breadcrumb registry poisoned");
        for (kind, builder) in builders.iter() {
            if let Some(entry) = stats.get_mut(kind.as_str()) {
                entry.unresolved_folders = builder.missing_ids().len();
            }
        }
        stats
    }

    fn record_stats(&self, kind: CacheKind, entries: usize, started: Instant) {
        let load_ms = started.elapsed().as_millis() as u64;
        debug!(kind = %kind, entries, load_ms, "cache populated");
        self.stats.lock().expect("cache stats poisoned").insert(
            kind,
            CacheStats {
                entries,
                load_ms,
                unresolved_folders: 0,
            },
        );
    }

    async fn load_folders(&self, kind: CacheKind) -> Result<FolderTable, CacheError> {
        if let Some(content_type) = kind.soap_content_type() {
            return self.load_soap_folders(kind, content_type).await;
        }
        if let Some(category_type) = kind.rest_category_type() {
            let filter = format!("categoryType eq '{}'", category_type);
            let path = format!("/email/v1/category?$filter={}", urlencoding::encode(&filter));
            return self.load_rest_folders(kind, &path, Some(category_type)).await;
        }
        // Content Builder categories are the remaining folder kind.
        self.load_rest_folders(kind, "/asset/v1/content/categories", None)
            .await
    }

    async fn load_soap_folders(
        &self,
        kind: CacheKind,
        content_type: &str,
    ) -> Result<FolderTable, CacheError> {
        let filter = SimpleFilter::equals("ContentType", content_type);
        let outcome = self
            .soap
            .retrieve_all(
                "DataFolder",
                &["ID", "Name", "ParentFolder.ID", "ContentType"],
                Some(&filter),
            )
            .await;
        if let Some(error) = outcome.error {
            return Err(CacheError::new(kind, error.to_string()));
        }

        let mut table = FolderTable::new();
        for object in outcome.objects {
            let Some(id) = value_str(&object, "ID") else {
                continue;
            };
            let parent_id = object
                .get("ParentFolder")
                .and_then(|p| value_str(p, "ID"))
                .filter(|id| id != "0");
            let mut folder = Folder::new(id.clone(), value_str(&object, "Name").unwrap_or_default())
                .with_content_type(content_type);
            folder.parent_id = parent_id;
            table.insert(id, folder);
        }
        Ok(table)
    }

    async fn load_rest_folders(
        &self,
        kind: CacheKind,
        path: &str,
        content_type: Option<&str>,
    ) -> Result<FolderTable, CacheError> {
        let outcome = self.rest.get_paged(path, CACHE_PAGE_SIZE).await;
        if let Some(error) = outcome.error {
            return Err(CacheError::new(kind, error.to_string()));
        }

        let mut table = FolderTable::new();
        for item in outcome.items {
            let Some(id) = value_str(&item, "id").or_else(|| value_str(&item, "categoryId"))
            else {
                continue;
            };
            let name = value_str(&item, "name")
                .or_else(|| value_str(&item, "categoryName"))
                .unwrap_or_default();
            let mut folder = Folder::new(id.clone(), name);
            folder.parent_id = value_str(&item, "parentId").filter(|p| p != "0");
            folder.content_type = content_type
                .map(str::to_string)
                .or_else(|| value_str(&item, "categoryType"));
            table.insert(id, folder);
        }
        Ok(table)
    }

    async fn load_definitions(&self, kind: CacheKind) -> Result<DefinitionTable, CacheError> {
        match kind {
            CacheKind::Queries => {
                self.load_rest_definitions(kind, "/automation/v1/queries", "queryDefinitionId")
                    .await
            }
            CacheKind::Scripts => {
                self.load_rest_definitions(kind, "/automation/v1/scripts", "ssjsActivityId")
                    .await
            }
            CacheKind::Emails => {
                self.load_soap_definitions(
                    kind,
                    "Email",
                    &["ID", "Name", "CustomerKey", "Subject", "CategoryID", "Status"],
                    "ID",
                )
                .await
            }
            CacheKind::TriggeredSends => {
                self.load_soap_definitions(
                    kind,
                    "TriggeredSendDefinition",
                    &[
                        "ObjectID",
                        "Name",
                        "CustomerKey",
                        "TriggeredSendStatus",
                        "Email.ID",
                        "CategoryID",
                    ],
                    "ObjectID",
                )
                .await
            }
            other => {
                warn!(kind = %other, "no definition loader for cache kind");
                Ok(DefinitionTable::new())
            }
        }
    }

    async fn load_rest_definitions(
        &self,
        kind: CacheKind,
        path: &str,
        id_field: &str,
    ) -> Result<DefinitionTable, CacheError> {
        let outcome = self.rest.get_paged(path, CACHE_PAGE_SIZE).await;
        if let Some(error) = outcome.error {
            return Err(CacheError::new(kind, error.to_string()));
        }
        let mut table = DefinitionTable::new();
        for item in outcome.items {
            if let Some(id) = value_str(&item, id_field) {
                table.insert(id, item);
            }
        }
        Ok(table)
    }

    async fn load_soap_definitions(
        &self,
        kind: CacheKind,
        object_type: &str,
        properties: &[&str],
        id_field: &str,
    ) -> Result<DefinitionTable, CacheError> {
        let outcome = self.soap.retrieve_all(object_type, properties, None).await;
        if let Some(error) = outcome.error {
            return Err(CacheError::new(kind, error.to_string()));
        }
        let mut table = DefinitionTable::new();
        for object in outcome.objects {
            if let Some(id) = value_str(&object, id_field) {
                table.insert(id, object);
            }
        }
        Ok(table)
    }
}

fn value_str(value: &Value, field: &str) -> Option<String> {
    match value.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testing::engine_fixture;
    use mcs_connectors::testing::MockResponse;
    use serde_json::json;

    #[tokio::test]
    async fn folder_cache_loads_once_and_reuses() {
        let fixture = engine_fixture();
        fixture.backend.on("/email/v1/category").push(MockResponse::json(
            200,
            json!({"items": [
                {"id": 1, "name": "Query Activities", "parentId": 0},
                {"id": 2, "name": "Maintenance", "parentId": 1}
            ]}),
        ));

        let cache = CacheManager::new(fixture.rest.clone(), fixture.soap.clone());
        let first = cache.folders(CacheKind::QueryFolders).await.unwrap();
        let second = cache.folders(CacheKind::QueryFolders).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fixture.backend.requests_to("/email/v1/category").len(), 1);
    }

    #[tokio::test]
    async fn breadcrumb_resolves_through_folder_cache() {
        let fixture = engine_fixture();
        fixture.backend.on("/email/v1/category").push(MockResponse::json(
            200,
            json!({"items": [
                {"id": 1, "name": "Query Activities", "parentId": 0},
                {"id": 2, "name": "Maintenance", "parentId": 1}
            ]}),
        ));

        let cache = CacheManager::new(fixture.rest.clone(), fixture.soap.clone());
        let crumb = cache.breadcrumb(CacheKind::QueryFolders, "2").await.unwrap();
        assert_eq!(crumb.path, "Query Activities > Maintenance");
    }

    #[tokio::test]
    async fn failed_load_surfaces_cache_error_and_next_caller_retries() {
        let fixture = engine_fixture();
        let route = fixture.backend.on("/automation/v1/queries");
        route.push(MockResponse::text(400, "bad request"));
        route.push(MockResponse::json(
            200,
            json!({"items": [{"queryDefinitionId": "q-1", "name": "Dedupe"}]}),
        ));

        let cache = CacheManager::new(fixture.rest.clone(), fixture.soap.clone());
        assert!(cache.definitions(CacheKind::Queries).await.is_err());
        // OnceCell did not publish the failure; a later caller loads cleanly.
        let table = cache.definitions(CacheKind::Queries).await.unwrap();
        assert!(table.contains_key("q-1"));
    }

    #[tokio::test]
    async fn soap_folder_cache_parses_parent_refs() {
        let fixture = engine_fixture();
        fixture.backend.on("/Service.asmx").push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "req-1",
                "<Results><ID>10</ID><Name>Triggered Sends</Name>\
                 <ContentType>triggered_send_definition</ContentType></Results>\
                 <Results><ID>11</ID><Name>journeybuilder</Name>\
                 <ParentFolder><ID>10</ID></ParentFolder>\
                 <ContentType>triggered_send_definition</ContentType></Results>",
            ),
        ));

        let cache = CacheManager::new(fixture.rest.clone(), fixture.soap.clone());
        let folders = cache.folders(CacheKind::TriggeredSendFolders).await.unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders["11"].parent_id.as_deref(), Some("10"));

        let crumb = cache
            .breadcrumb(CacheKind::TriggeredSendFolders, "11")
            .await
            .unwrap();
        assert_eq!(crumb.path, "Triggered Sends > journeybuilder");
    }

    #[tokio::test]
    async fn warm_preloads_requested_kinds() {
        let fixture = engine_fixture();
        fixture
            .backend
            .on("/email/v1/category")
            .always(MockResponse::json(200, json!({"items": []})));
        fixture
            .backend
            .on("/automation/v1/queries")
            .always(MockResponse::json(200, json!({"items": []})));

        let cache = CacheManager::new(fixture.rest.clone(), fixture.soap.clone());
        let results = cache
            .warm(&[CacheKind::QueryFolders, CacheKind::Queries], 4)
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let stats = cache.stats();
        assert!(stats.contains_key("query_folders"));
        assert!(stats.contains_key("queries"));
    }
}
