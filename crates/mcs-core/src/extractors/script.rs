//! SSJS script activity extractor.
//!
//! Static analysis of script bodies is not attempted: server-side
//! JavaScript resolves data extension names at runtime, so the extractor
//! only counts the reference call sites it can see and surfaces them as
//! `unresolvedReferences` per script.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{ExtractionError, ObjectKind};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;

/// Call sites that touch data extensions from SSJS.
static DE_CALL_SITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:Lookup|LookupRows|LookupOrderedRows|UpsertData|InsertData|UpdateData|DeleteData)\s*\(|DataExtension\.Init\s*\(",
    )
    .expect("call site pattern is valid")
});

/// Counts data-extension call sites in a script body.
pub fn unresolved_reference_count(script: &str) -> usize {
    DE_CALL_SITE_RE.find_iter(script).count()
}

pub struct ScriptExtractor;

#[async_trait::async_trait]
impl super::Extractor for ScriptExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Scripts
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Script
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::ScriptFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/automation/v1/scripts")
            .await
    }

    async fn enrich(
        &self,
        ctx: &ExtractorContext,
        items: Vec<Value>,
        errors: &mut Vec<ExtractionError>,
    ) -> Vec<Value> {
        let mut enriched = Vec::with_capacity(items.len());
        for mut item in items {
            ctx.attach_breadcrumb(
                self.kind(),
                CacheKind::ScriptFolders,
                &mut item,
                "categoryId",
                errors,
            )
            .await;
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        let fields = RawFieldMap {
            id: "ssjsActivityId",
            ..RawFieldMap::default()
        };

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::Script, item, &fields) else {
                continue;
            };
            record.folder_path = raw_str(item, "folderPath");

            if let Some(body) = item.get("script").and_then(|v| v.as_str()) {
                record = record.with_attribute(
                    "unresolvedReferences",
                    json!(unresolved_reference_count(body)),
                );
                if ctx.options.include_content {
                    record = record.with_attribute("script", json!(body));
                }
            }

            out.records.push(record);
        }
    }
}
