//! Delivery profile extractor (SOAP).

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::ObjectKind;
use serde_json::Value;

const SOAP_PROPERTIES: &[&str] = &[
    "ObjectID",
    "CustomerKey",
    "Name",
    "Description",
    "SourceAddressType",
    "DomainType",
    "PrivateDomain",
    "CreatedDate",
    "ModifiedDate",
];

pub struct DeliveryProfileExtractor;

#[async_trait::async_trait]
impl super::Extractor for DeliveryProfileExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::DeliveryProfiles
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::DeliveryProfile
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_retrieve_all(self.kind(), "DeliveryProfile", SOAP_PROPERTIES, None)
            .await
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            let Some(id) = raw_str(item, "CustomerKey").or_else(|| raw_str(item, "ObjectID"))
            else {
                continue;
            };
            let mut record = ObjectRecord::new(
                ObjectKind::DeliveryProfile,
                id,
                raw_str(item, "Name").unwrap_or_default(),
            );
            record.customer_key = raw_str(item, "CustomerKey");
            record.description = raw_str(item, "Description");
            record.created_date = raw_str(item, "CreatedDate");
            record.modified_date = raw_str(item, "ModifiedDate");
            record = record
                .with_attribute(
                    "sourceAddressType",
                    item.get("SourceAddressType").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "domainType",
                    item.get("DomainType").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "privateDomain",
                    item.get("PrivateDomain").cloned().unwrap_or(Value::Null),
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
    async fn normalizes_delivery_profiles() {
        let fixture = engine_fixture();
        fixture.backend.on("/Service.asmx").push(MockResponse::text(
            200,
            fixture.soap_body(
                "OK",
                "r1",
                "<Results><CustomerKey>dp-default</CustomerKey>\
                 <Name>Default Delivery</Name><DomainType>DefaultDomain</DomainType></Results>",
            ),
        ));

        let ctx = fixture.context();
        let result = run_extractor(&DeliveryProfileExtractor, &ctx).await;
        assert_eq!(result.items[0].id, "dp-default");
        assert_eq!(
            result.items[0].attributes["domainType"],
            serde_json::json!("DefaultDomain")
        );
    }
}
