//! Classic email definition extractor (SOAP). Content Builder emails come
//! through the asset extractor instead.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::{ExtractionError, ObjectKind};
use serde_json::Value;

const SOAP_PROPERTIES: &[&str] = &[
    "ID",
    "CustomerKey",
    "Name",
    "Subject",
    "Status",
    "CategoryID",
    "IsHTMLPaste",
    "CharacterSet",
    "PreHeader",
    "CreatedDate",
    "ModifiedDate",
];

const CONTENT_PROPERTIES: &[&str] = &["HTMLBody", "TextBody"];

pub struct EmailExtractor;

#[async_trait::async_trait]
impl super::Extractor for EmailExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Emails
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Email
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::EmailFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        let mut properties = SOAP_PROPERTIES.to_vec();
        if ctx.options.include_content {
            properties.extend_from_slice(CONTENT_PROPERTIES);
        }
        ctx.paced_retrieve_all(self.kind(), "Email", &properties, None)
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
                CacheKind::EmailFolders,
                &mut item,
                "CategoryID",
                errors,
            )
            .await;
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            let Some(id) = raw_str(item, "ID") else {
                continue;
            };
            let mut record = ObjectRecord::new(
                ObjectKind::Email,
                id,
                raw_str(item, "Name").unwrap_or_default(),
            );
            record.customer_key = raw_str(item, "CustomerKey");
            record.status = raw_str(item, "Status");
            record.folder_id = raw_str(item, "CategoryID");
            record.folder_path = raw_str(item, "folderPath");
            record.created_date = raw_str(item, "CreatedDate");
            record.modified_date = raw_str(item, "ModifiedDate");
            record = record
                .with_attribute("subject", item.get("Subject").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "preHeader",
                    item.get("PreHeader").cloned().unwrap_or(Value::Null),
                );
            if ctx.options.include_content {
                record = record
                    .with_attribute(
                        "htmlBody",
                        item.get("HTMLBody").cloned().unwrap_or(Value::Null),
                    )
                    .with_attribute(
                        "textBody",
                        item.get("TextBody").cloned().unwrap_or(Value::Null),
                    );
            }
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
    use mcs_connectors::RequestBody;

    #[tokio::test]
    async fn content_properties_are_opt_in() {
        let fixture = engine_fixture();
        let soap = fixture.backend.on("/Service.asmx");
        soap.push(MockResponse::text(200, fixture.soap_body("OK", "r1", "")));
        soap.push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r2",
                "<Results><ID>100</ID><Name>Welcome</Name>\
                 <CustomerKey>wel</CustomerKey><Status>Active</Status>\
                 <Subject>Hi there</Subject></Results>",
            ),
        ));

        let ctx = fixture.context();
        let result = run_extractor(&EmailExtractor, &ctx).await;
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].attributes["subject"], serde_json::json!("Hi there"));

        // The retrieve did not request body properties.
        let retrieve = fixture
            .backend
            .requests_to("/Service.asmx")
            .into_iter()
            .nth(1)
            .unwrap();
        match retrieve.body {
            Some(RequestBody::Xml(xml)) => {
                assert!(!xml.contains("HTMLBody"));
                assert!(xml.contains("<Properties>Subject</Properties>"));
            }
            other => panic!("expected XML body, got {:?}", other),
        }
    }
}
