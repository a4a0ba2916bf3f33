//! Send classification extractor (SOAP).
//!
//! Classifications tie sender and delivery profiles together, which makes
//! their edges the evidence that keeps those profiles out of the orphan set.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::{
    EdgeEndpoint, ObjectKind, RelationshipEdge, RelationshipKind,
};
use serde_json::Value;

const SOAP_PROPERTIES: &[&str] = &[
    "ObjectID",
    "CustomerKey",
    "Name",
    "Description",
    "SenderProfile.ObjectID",
    "SenderProfile.CustomerKey",
    "DeliveryProfile.ObjectID",
    "DeliveryProfile.CustomerKey",
    "CreatedDate",
    "ModifiedDate",
];

pub struct SendClassificationExtractor;

#[async_trait::async_trait]
impl super::Extractor for SendClassificationExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::SendClassifications
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::SendClassification
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_retrieve_all(self.kind(), "SendClassification", SOAP_PROPERTIES, None)
            .await
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            let Some(id) = raw_str(item, "CustomerKey").or_else(|| raw_str(item, "ObjectID"))
            else {
                continue;
            };
            let mut record = ObjectRecord::new(
                ObjectKind::SendClassification,
                id,
                raw_str(item, "Name").unwrap_or_default(),
            );
            record.customer_key = raw_str(item, "CustomerKey");
            record.description = raw_str(item, "Description");
            record.created_date = raw_str(item, "CreatedDate");
            record.modified_date = raw_str(item, "ModifiedDate");

            let source = EdgeEndpoint::named(
                ObjectKind::SendClassification.as_str(),
                record.id.clone(),
                Some(record.name.clone()),
            );

            if let Some(key) = item
                .get("SenderProfile")
                .and_then(|p| raw_str(p, "CustomerKey"))
            {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    RelationshipKind::SendClassificationUsesSenderProfile,
                    EdgeEndpoint::new(ObjectKind::SenderProfile.as_str(), key),
                ));
            }
            if let Some(key) = item
                .get("DeliveryProfile")
                .and_then(|p| raw_str(p, "CustomerKey"))
            {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    RelationshipKind::SendClassificationUsesDeliveryProfile,
                    EdgeEndpoint::new(ObjectKind::DeliveryProfile.as_str(), key),
                ));
            }

            out.records.push(record);
        }
    }
}
