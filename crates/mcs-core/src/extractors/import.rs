//! Import file activity extractor.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{
    EdgeEndpoint, ExtractionError, ObjectKind, RelationshipEdge, RelationshipKind,
};
use serde_json::Value;

pub struct ImportExtractor;

#[async_trait::async_trait]
impl super::Extractor for ImportExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Imports
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Import
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::ImportFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/automation/v1/imports")
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
                CacheKind::ImportFolders,
                &mut item,
                "categoryId",
                errors,
            )
            .await;
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        let fields = RawFieldMap {
            id: "importDefinitionId",
            ..RawFieldMap::default()
        };

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::Import, item, &fields) else {
                continue;
            };
            record.folder_path = raw_str(item, "folderPath");

            let destination = item.get("destinationObject");
            record = record
                .with_attribute(
                    "destinationId",
                    destination.and_then(|d| d.get("id")).cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "destinationName",
                    destination
                        .and_then(|d| d.get("name"))
                        .cloned()
                        .unwrap_or(Value::Null),
                )
                .with_attribute(
                    "fileNamingPattern",
                    item.get("fileNamingPattern").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "updateTypeName",
                    item.get("updateTypeName").cloned().unwrap_or(Value::Null),
                );

            if let Some(de_id) = destination.and_then(|d| raw_str(d, "id")) {
                out.edges.push(RelationshipEdge::new(
                    EdgeEndpoint::named(
                        ObjectKind::Import.as_str(),
                        record.id.clone(),
                        Some(record.name.clone()),
                    ),
                    RelationshipKind::ImportWritesDe,
                    EdgeEndpoint::named(
                        ObjectKind::DataExtension.as_str(),
                        de_id,
                        destination.and_then(|d| raw_str(d, "name")),
                    ),
                ));
            }

            out.records.push(record);
        }
    }
}
