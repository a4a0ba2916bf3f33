//! Subscriber list definition extractor (SOAP). List definitions only;
//! subscriber data is out of scope.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::{ExtractionError, ObjectKind};
use serde_json::Value;

const SOAP_PROPERTIES: &[&str] = &[
    "ID",
    "ObjectID",
    "CustomerKey",
    "ListName",
    "Description",
    "Category",
    "Type",
    "ListClassification",
    "CreatedDate",
    "ModifiedDate",
];

pub struct ListExtractor;

#[async_trait::async_trait]
impl super::Extractor for ListExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Lists
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::List
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::ListFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_retrieve_all(self.kind(), "List", SOAP_PROPERTIES, None)
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
                CacheKind::ListFolders,
                &mut item,
                "Category",
                errors,
            )
            .await;
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            let Some(id) = raw_str(item, "ID") else {
                continue;
            };
            let mut record = ObjectRecord::new(
                ObjectKind::List,
                id,
                raw_str(item, "ListName").unwrap_or_default(),
            );
            record.customer_key = raw_str(item, "CustomerKey");
            record.description = raw_str(item, "Description");
            record.folder_id = raw_str(item, "Category");
            record.folder_path = raw_str(item, "folderPath");
            record.created_date = raw_str(item, "CreatedDate");
            record.modified_date = raw_str(item, "ModifiedDate");
            record = record
                .with_attribute("listType", item.get("Type").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "listClassification",
                    item.get("ListClassification").cloned().unwrap_or(Value::Null),
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
    async fn lists_normalize_from_soap_records() {
        let fixture = engine_fixture();
        let soap = fixture.backend.on("/Service.asmx");
        soap.push(MockResponse::text(200, fixture.soap_body("OK", "r1", "")));
        soap.push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r2",
                "<Results><ID>42</ID><ListName>All Subscribers</ListName>\
                 <CustomerKey>all-subs</CustomerKey><Type>Private</Type></Results>",
            ),
        ));

        let ctx = fixture.context();
        let result = run_extractor(&ListExtractor, &ctx).await;
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].name, "All Subscribers");
        assert_eq!(result.items[0].attributes["listType"], serde_json::json!("Private"));
        assert!(result.edges.is_empty());
    }
}
