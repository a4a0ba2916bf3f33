//! Triggered send definition extractor (SOAP).

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, ObjectRecord};
use crate::models::{
    EdgeEndpoint, ExtractionError, ObjectKind, RelationshipEdge, RelationshipKind,
};
use serde_json::Value;

/// Status vocabulary for triggered sends.
pub const TRIGGERED_SEND_STATUSES: [&str; 5] = ["Active", "Inactive", "Deleted", "Canceled", "New"];

const SOAP_PROPERTIES: &[&str] = &[
    "ObjectID",
    "CustomerKey",
    "Name",
    "Description",
    "TriggeredSendStatus",
    "Email.ID",
    "List.ID",
    "SendClassification.CustomerKey",
    "SenderProfile.CustomerKey",
    "DeliveryProfile.CustomerKey",
    "CategoryID",
    "FromName",
    "FromAddress",
    "EmailSubject",
    "Priority",
    "CreatedDate",
    "ModifiedDate",
];

pub struct TriggeredSendExtractor;

#[async_trait::async_trait]
impl super::Extractor for TriggeredSendExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::TriggeredSends
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::TriggeredSend
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::TriggeredSendFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_retrieve_all(
            self.kind(),
            "TriggeredSendDefinition",
            SOAP_PROPERTIES,
            None,
        )
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
                CacheKind::TriggeredSendFolders,
                &mut item,
                "CategoryID",
                errors,
            )
            .await;
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        for item in items {
            let Some(id) = raw_str(item, "ObjectID") else {
                continue;
            };
            let name = raw_str(item, "Name").unwrap_or_default();
            let mut record = ObjectRecord::new(ObjectKind::TriggeredSend, id, name);
            record.customer_key = raw_str(item, "CustomerKey");
            record.description = raw_str(item, "Description");
            record.status = raw_str(item, "TriggeredSendStatus");
            record.folder_id = raw_str(item, "CategoryID");
            record.folder_path = raw_str(item, "folderPath");
            record.created_date = raw_str(item, "CreatedDate");
            record.modified_date = raw_str(item, "ModifiedDate");
            record = record
                .with_attribute(
                    "fromName",
                    item.get("FromName").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "fromAddress",
                    item.get("FromAddress").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "emailSubject",
                    item.get("EmailSubject").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "priority",
                    item.get("Priority").cloned().unwrap_or(Value::Null),
                );

            let source = EdgeEndpoint::named(
                ObjectKind::TriggeredSend.as_str(),
                record.id.clone(),
                Some(record.name.clone()),
            );

            if let Some(email_id) = item.get("Email").and_then(|e| raw_str(e, "ID")) {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    RelationshipKind::TriggeredSendUsesEmail,
                    EdgeEndpoint::new(ObjectKind::Email.as_str(), email_id),
                ));
            }
            if let Some(list_id) = item.get("List").and_then(|l| raw_str(l, "ID")) {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    RelationshipKind::TriggeredSendUsesList,
                    EdgeEndpoint::new(ObjectKind::List.as_str(), list_id),
                ));
            }
            let profile_refs = [
                (
                    "SenderProfile",
                    RelationshipKind::TriggeredSendUsesSenderProfile,
                    ObjectKind::SenderProfile,
                ),
                (
                    "DeliveryProfile",
                    RelationshipKind::TriggeredSendUsesDeliveryProfile,
                    ObjectKind::DeliveryProfile,
                ),
                (
                    "SendClassification",
                    RelationshipKind::TriggeredSendUsesSendClassification,
                    ObjectKind::SendClassification,
                ),
            ];
            for (field, edge_kind, target_kind) in profile_refs {
                if let Some(key) = item.get(field).and_then(|p| raw_str(p, "CustomerKey")) {
                    out.edges.push(RelationshipEdge::new(
                        source.clone(),
                        edge_kind,
                        EdgeEndpoint::new(target_kind.as_str(), key),
                    ));
                }
            }

            out.records.push(record);
        }
    }
}
