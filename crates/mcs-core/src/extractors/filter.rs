//! Filter activity extractor.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{
    EdgeEndpoint, ExtractionError, ObjectKind, RelationshipEdge, RelationshipKind,
};
use serde_json::Value;

pub struct FilterExtractor;

#[async_trait::async_trait]
impl super::Extractor for FilterExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Filters
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Filter
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::FilterFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/automation/v1/filters")
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
                CacheKind::FilterFolders,
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
            id: "filterActivityId",
            customer_key: "customerKey",
            ..RawFieldMap::default()
        };

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::Filter, item, &fields) else {
                continue;
            };
            record.customer_key = record.customer_key.or_else(|| raw_str(item, "key"));
            record.folder_path = raw_str(item, "folderPath");
            record = record
                .with_attribute(
                    "filterDefinitionId",
                    item.get("filterDefinitionId").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "sourceDataExtensionName",
                    item.get("sourceDEName").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "destinationDataExtensionName",
                    item.get("resultDEName").cloned().unwrap_or(Value::Null),
                );

            let source = EdgeEndpoint::named(
                ObjectKind::Filter.as_str(),
                record.id.clone(),
                Some(record.name.clone()),
            );

            if let Some(de_id) = raw_str(item, "sourceObjectId") {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    RelationshipKind::FilterReadsDe,
                    EdgeEndpoint::named(
                        ObjectKind::DataExtension.as_str(),
                        de_id,
                        raw_str(item, "sourceDEName"),
                    ),
                ));
            }
            if let Some(de_id) = raw_str(item, "destinationObjectId") {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    RelationshipKind::FilterWritesDe,
                    EdgeEndpoint::named(
                        ObjectKind::DataExtension.as_str(),
                        de_id,
                        raw_str(item, "resultDEName"),
                    ),
                ));
            }

            out.records.push(record);
        }
    }
}
