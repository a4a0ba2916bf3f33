//! Data extract activity extractor.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{
    EdgeEndpoint, ExtractionError, ObjectKind, RelationshipEdge, RelationshipKind,
};
use serde_json::Value;

pub struct DataExtractExtractor;

#[async_trait::async_trait]
impl super::Extractor for DataExtractExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::DataExtracts
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::DataExtract
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::DataExtractFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/automation/v1/dataextracts")
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
                CacheKind::DataExtractFolders,
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
            id: "dataExtractDefinitionId",
            ..RawFieldMap::default()
        };

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::DataExtract, item, &fields) else {
                continue;
            };
            record.folder_path = raw_str(item, "folderPath");

            let extract_type = item.get("dataExtractType");
            record = record
                .with_attribute(
                    "dataExtractTypeName",
                    extract_type
                        .and_then(|t| t.get("name"))
                        .cloned()
                        .unwrap_or(Value::Null),
                )
                .with_attribute(
                    "fileNamingPattern",
                    item.get("fileNamingPattern").cloned().unwrap_or(Value::Null),
                );

            // Extract configurations reference source DEs through their
            // data fields; tracking extracts have none.
            if let Some(data_fields) = item.get("dataFields").and_then(|v| v.as_array()) {
                for field in data_fields {
                    let Some(de) = field.get("dataExtension") else {
                        continue;
                    };
                    if let Some(de_id) = raw_str(de, "id") {
                        out.edges.push(RelationshipEdge::new(
                            EdgeEndpoint::named(
                                ObjectKind::DataExtract.as_str(),
                                record.id.clone(),
                                Some(record.name.clone()),
                            ),
                            RelationshipKind::ExtractReadsDe,
                            EdgeEndpoint::named(
                                ObjectKind::DataExtension.as_str(),
                                de_id,
                                raw_str(de, "name"),
                            ),
                        ));
                    }
                }
            }

            out.records.push(record);
        }
    }
}
