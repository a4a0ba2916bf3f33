//! Sender profile extractor (SOAP).

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::ObjectKind;
use serde_json::Value;

const SOAP_PROPERTIES: &[&str] = &[
    "ObjectID",
    "CustomerKey",
    "Name",
    "Description",
    "FromName",
    "FromAddress",
    "CreatedDate",
    "ModifiedDate",
];

pub struct SenderProfileExtractor;

#[async_trait::async_trait]
impl super::Extractor for SenderProfileExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::SenderProfiles
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::SenderProfile
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_retrieve_all(self.kind(), "SenderProfile", SOAP_PROPERTIES, None)
            .await
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            // Profiles are keyed by CustomerKey in referencing objects, so
            // the key doubles as the id when ObjectID is withheld.
            let Some(id) = raw_str(item, "CustomerKey").or_else(|| raw_str(item, "ObjectID"))
            else {
                continue;
            };
            let mut record = ObjectRecord::new(
                ObjectKind::SenderProfile,
                id,
                raw_str(item, "Name").unwrap_or_default(),
            );
            record.customer_key = raw_str(item, "CustomerKey");
            record.description = raw_str(item, "Description");
            record.created_date = raw_str(item, "CreatedDate");
            record.modified_date = raw_str(item, "ModifiedDate");
            record = record
                .with_attribute("fromName", item.get("FromName").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "fromAddress",
                    item.get("FromAddress").cloned().unwrap_or(Value::Null),
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
    async fn keyed_by_customer_key() {
        let fixture = engine_fixture();
        fixture.backend.on("/Service.asmx").push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r1",
                "<Results><ObjectID>guid-1</ObjectID><CustomerKey>sp-default</CustomerKey>\
                 <Name>Default Sender</Name><FromAddress>news@example.com</FromAddress></Results>",
            ),
        ));

        let ctx = fixture.context();
        let result = run_extractor(&SenderProfileExtractor, &ctx).await;
        assert_eq!(result.items[0].id, "sp-default");
        assert_eq!(
            result.items[0].attributes["fromAddress"],
            serde_json::json!("news@example.com")
        );
    }
}
