//! Journey entry event definition extractor.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{
    EdgeEndpoint, ObjectKind, RelationshipEdge, RelationshipKind,
};
use serde_json::{json, Value};

pub struct EventDefinitionExtractor;

/// The DE an event is bound to: a direct field on newer payloads, nested
/// under `schema` on older ones.
fn bound_data_extension(item: &Value) -> Option<(String, Option<String>)> {
    if let Some(id) = raw_str(item, "dataExtensionId") {
        return Some((id, raw_str(item, "dataExtensionName")));
    }
    let schema = item.get("schema")?;
    raw_str(schema, "id").map(|id| (id, raw_str(schema, "name")))
}

#[async_trait::async_trait]
impl super::Extractor for EventDefinitionExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::EventDefinitions
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::EventDefinition
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/interaction/v1/eventDefinitions")
            .await
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        let fields = RawFieldMap::default();

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::EventDefinition, item, &fields)
            else {
                continue;
            };
            record.customer_key = raw_str(item, "eventDefinitionKey").or(record.customer_key);
            record = record
                .with_attribute("type", item.get("type").cloned().unwrap_or(Value::Null))
                .with_attribute("mode", item.get("mode").cloned().unwrap_or(Value::Null));

            if let Some((de_id, de_name)) = bound_data_extension(item) {
                record = record.with_attribute("dataExtensionId", json!(de_id));
                out.edges.push(
                    RelationshipEdge::new(
                        EdgeEndpoint::named(
                            ObjectKind::EventDefinition.as_str(),
                            record.id.clone(),
                            Some(record.name.clone()),
                        ),
                        RelationshipKind::EventDefinitionUsesDe,
                        EdgeEndpoint::named(ObjectKind::DataExtension.as_str(), de_id, de_name),
                    )
                    .with_metadata("usage", json!("entry_source")),
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

    #[tokio::test]
    async fn binds_de_from_direct_field_or_schema() {
        let fixture = engine_fixture();
        fixture.backend.on("/interaction/v1/eventDefinitions").push(MockResponse::json(
            200,
            serde_json::json!({"items": [
                {
                    "id": "ev-1",
                    "name": "API entry",
                    "eventDefinitionKey": "APIEvent-1",
                    "dataExtensionId": "de-1",
                    "dataExtensionName": "Entry DE"
                },
                {
                    "id": "ev-2",
                    "name": "Legacy entry",
                    "schema": {"id": "de-2", "name": "Old Entry DE"}
                },
                {
                    "id": "ev-3",
                    "name": "No binding"
                }
            ]}),
        ));

        let ctx = fixture.context();
        let result = run_extractor(&EventDefinitionExtractor, &ctx).await;
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.edges.len(), 2);
        let targets: Vec<&str> = result.edges.iter().map(|e| e.target.id.as_str()).collect();
        assert!(targets.contains(&"de-1"));
        assert!(targets.contains(&"de-2"));
    }
}
