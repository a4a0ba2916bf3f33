//! Folder extractor: Automation Studio folder trees as first-class objects.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::{ExtractionError, ObjectKind};
use mcs_connectors::SimpleFilter;
use serde_json::{json, Value};

/// Folder content types extracted as objects.
const FOLDER_CONTENT_TYPES: &[&str] = &[
    "automations",
    "queryactivity",
    "ssjsactivity",
    "importactivity",
    "dataextractactivity",
    "filetransferactivity",
    "filteractivity",
    "dataextension",
];

pub struct FolderExtractor;

#[async_trait::async_trait]
impl super::Extractor for FolderExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Folders
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Folder
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        let mut combined = FetchResult::default();

        for content_type in FOLDER_CONTENT_TYPES {
            ctx.emit(super::ProgressEvent::Progress {
                kind: self.kind(),
                done: combined.items.len() as u64,
                total: 0,
                message: format!("fetching {} folders", content_type),
            });
            let filter = SimpleFilter::equals("ContentType", *content_type);
            let mut outcome = ctx
                .paced_retrieve_all(
                    self.kind(),
                    "DataFolder",
                    &["ID", "Name", "ParentFolder.ID", "ContentType", "IsActive"],
                    Some(&filter),
                )
                .await;
            combined.pages += outcome.pages;
            combined.items.append(&mut outcome.items);
            if let Some(error) = outcome.error {
                let canceled = matches!(error.kind, crate::models::ErrorKind::Canceled);
                combined.error = Some(error);
                if canceled {
                    break;
                }
            }
        }

        combined
    }

    async fn enrich(
        &self,
        _ctx: &ExtractorContext,
        items: Vec<Value>,
        _errors: &mut Vec<ExtractionError>,
    ) -> Vec<Value> {
        items
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            let Some(id) = raw_str(item, "ID") else {
                continue;
            };
            let mut record = ObjectRecord::new(
                ObjectKind::Folder,
                id,
                raw_str(item, "Name").unwrap_or_default(),
            );
            let parent_id = item
                .get("ParentFolder")
                .and_then(|p| raw_str(p, "ID"))
                .filter(|p| p != "0");
            record = record
                .with_attribute(
                    "parentId",
                    parent_id.map(Value::String).unwrap_or(Value::Null),
                )
                .with_attribute(
                    "contentType",
                    item.get("ContentType").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "isActive",
                    json!(matches!(
                        item.get("IsActive").and_then(|v| v.as_str()),
                        Some("true") | None
                    )),
                );
            out.records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testing::engine_fixture;
    use crate::extractors::run_extractor;
    use mcs_connectors::testing::MockResponse;

    #[tokio::test]
    async fn sweeps_every_content_type() {
        let fixture = engine_fixture();
        let soap = fixture.backend.on("/Service.asmx");
        soap.push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r1",
                "<Results><ID>1</ID><Name>my automations</Name>\
                 <ContentType>automations</ContentType><IsActive>true</IsActive></Results>",
            ),
        ));
        // Remaining content types come back empty.
        soap.always(MockResponse::text(200, fixture.soap_body("OK", "r", "")));

        let ctx = fixture.context();
        let result = run_extractor(&FolderExtractor, &ctx).await;
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].attributes["contentType"], serde_json::json!("automations"));
        assert_eq!(
            fixture.backend.requests_to("/Service.asmx").len(),
            FOLDER_CONTENT_TYPES.len()
        );
    }
}
