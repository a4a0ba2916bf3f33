//! Journey extractor.
//!
//! The list endpoint carries shells only; activities, triggers, and goals
//! come from a per-journey detail fetch. Edges are derived by walking the
//! activity and trigger configuration.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{
    EdgeEndpoint, ExtractionError, ObjectKind, RelationshipEdge, RelationshipKind,
};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

pub struct JourneyExtractor;

impl JourneyExtractor {
    async fn enrich_one(ctx: ExtractorContext, mut item: Value) -> (Value, Vec<ExtractionError>) {
        let mut errors = Vec::new();
        if ctx.options.include_details {
            if let Some(id) = raw_str(&item, "id") {
                match ctx
                    .paced_get(
                        ExtractorKind::Journeys,
                        &format!("/interaction/v1/interactions/{}", id),
                    )
                    .await
                {
                    Ok(response) if response.ok => {
                        if let Some(map) = item.as_object_mut() {
                            for field in [
                                "triggers",
                                "activities",
                                "goals",
                                "entryMode",
                                "definitionId",
                                "workflowApiVersion",
                            ] {
                                if let Some(value) = response.data.get(field) {
                                    map.insert(field.to_string(), value.clone());
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => errors.push(e),
                }
            }
        }
        (item, errors)
    }

    fn emit_trigger_edges(journey: &EdgeEndpoint, trigger: &Value, out: &mut TransformOutput) {
        let meta = trigger.get("metaData");
        if let Some(event_id) = meta.and_then(|m| raw_str(m, "eventDefinitionId")) {
            let mut edge = RelationshipEdge::new(
                journey.clone(),
                RelationshipKind::JourneyUsesEvent,
                EdgeEndpoint::named(
                    ObjectKind::EventDefinition.as_str(),
                    event_id,
                    raw_str(trigger, "name"),
                ),
            );
            if let Some(key) = meta.and_then(|m| raw_str(m, "eventDefinitionKey")) {
                edge = edge.with_metadata("eventDefinitionKey", json!(key));
            }
            out.edges.push(edge);
        }

        // Event-triggered journeys may bind an entry DE directly.
        if let Some(de_key) = trigger
            .get("configurationArguments")
            .and_then(|c| c.get("eventDataConfig"))
            .and_then(|e| raw_str(e, "deKey"))
        {
            out.edges.push(
                RelationshipEdge::new(
                    journey.clone(),
                    RelationshipKind::JourneyUsesDe,
                    EdgeEndpoint::named(
                        ObjectKind::DataExtension.as_str(),
                        de_key.clone(),
                        Some(de_key),
                    ),
                )
                .with_metadata("usage", json!("entry_event")),
            );
        }
    }

    fn emit_activity_edges(journey: &EdgeEndpoint, activity: &Value, out: &mut TransformOutput) {
        let activity_type = activity
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_ascii_uppercase();
        let config = activity.get("configurationArguments");

        match activity_type.as_str() {
            "EMAILV2" | "EMAIL" => {
                let Some(send) = config.and_then(|c| c.get("triggeredSend")) else {
                    return;
                };
                if let Some(email_id) = raw_str(send, "emailId") {
                    out.edges.push(RelationshipEdge::new(
                        journey.clone(),
                        RelationshipKind::JourneyUsesEmail,
                        EdgeEndpoint::new(ObjectKind::Email.as_str(), email_id),
                    ));
                }
                let profile_refs = [
                    (
                        "senderProfileId",
                        RelationshipKind::JourneyUsesSenderProfile,
                        ObjectKind::SenderProfile,
                    ),
                    (
                        "deliveryProfileId",
                        RelationshipKind::JourneyUsesDeliveryProfile,
                        ObjectKind::DeliveryProfile,
                    ),
                    (
                        "sendClassificationId",
                        RelationshipKind::JourneyUsesSendClassification,
                        ObjectKind::SendClassification,
                    ),
                    (
                        "publicationListId",
                        RelationshipKind::JourneyUsesList,
                        ObjectKind::List,
                    ),
                ];
                for (field, edge_kind, target_kind) in profile_refs {
                    if let Some(id) = raw_str(send, field) {
                        out.edges.push(RelationshipEdge::new(
                            journey.clone(),
                            edge_kind,
                            EdgeEndpoint::new(target_kind.as_str(), id),
                        ));
                    }
                }
                if let Some(suppressions) = send.get("suppressionLists").and_then(|v| v.as_array())
                {
                    for list in suppressions {
                        let id = raw_str(list, "id")
                            .or_else(|| list.as_str().map(str::to_string));
                        if let Some(id) = id {
                            out.edges.push(
                                RelationshipEdge::new(
                                    journey.clone(),
                                    RelationshipKind::JourneyUsesList,
                                    EdgeEndpoint::new(ObjectKind::List.as_str(), id),
                                )
                                .with_metadata("usage", json!("suppression_list")),
                            );
                        }
                    }
                }
            }
            "UPDATECONTACTDATA" => {
                if let Some(de_key) = config.and_then(|c| raw_str(c, "deKey")) {
                    out.edges.push(
                        RelationshipEdge::new(
                            journey.clone(),
                            RelationshipKind::JourneyUsesDe,
                            EdgeEndpoint::named(
                                ObjectKind::DataExtension.as_str(),
                                de_key.clone(),
                                Some(de_key),
                            ),
                        )
                        .with_metadata("usage", json!("update_contact")),
                    );
                }
            }
            "DATAEXTENSIONUPDATE" => {
                if let Some(de_id) = config.and_then(|c| raw_str(c, "dataExtensionId")) {
                    out.edges.push(
                        RelationshipEdge::new(
                            journey.clone(),
                            RelationshipKind::JourneyUsesDe,
                            EdgeEndpoint::new(ObjectKind::DataExtension.as_str(), de_id),
                        )
                        .with_metadata("usage", json!("data_extension_update")),
                    );
                }
            }
            "FIREAUTOMATION" => {
                if let Some(automation_id) = config.and_then(|c| raw_str(c, "automationId")) {
                    out.edges.push(RelationshipEdge::new(
                        journey.clone(),
                        RelationshipKind::JourneyUsesAutomation,
                        EdgeEndpoint::new(ObjectKind::Automation.as_str(), automation_id),
                    ));
                }
            }
            other => {
                // Decision splits reference a filter definition.
                if other == "ENGAGEMENTSPLIT" || other.contains("FILTER") {
                    if let Some(filter_id) = config.and_then(|c| raw_str(c, "filterId")) {
                        out.edges.push(RelationshipEdge::new(
                            journey.clone(),
                            RelationshipKind::JourneyUsesFilter,
                            EdgeEndpoint::new(ObjectKind::Filter.as_str(), filter_id),
                        ));
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl super::Extractor for JourneyExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Journeys
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Journey
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/interaction/v1/interactions")
            .await
    }

    async fn enrich(
        &self,
        ctx: &ExtractorContext,
        items: Vec<Value>,
        errors: &mut Vec<ExtractionError>,
    ) -> Vec<Value> {
        let concurrency = ctx.options.max_detail_concurrency.max(1);
        let results: Vec<(Value, Vec<ExtractionError>)> = stream::iter(items)
            .map(|item| Self::enrich_one(ctx.clone(), item))
            .buffered(concurrency)
            .collect()
            .await;

        let mut enriched = Vec::with_capacity(results.len());
        for (item, mut item_errors) in results {
            errors.append(&mut item_errors);
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        let fields = RawFieldMap::default();

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::Journey, item, &fields) else {
                continue;
            };
            let activities = item.get("activities").and_then(|v| v.as_array());
            let triggers = item.get("triggers").and_then(|v| v.as_array());

            record = record
                .with_attribute("version", item.get("version").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "entryMode",
                    item.get("entryMode").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "definitionId",
                    item.get("definitionId").cloned().unwrap_or(Value::Null),
                )
                .with_attribute("channel", item.get("channel").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "triggerCount",
                    json!(triggers.map_or(0, |t| t.len())),
                )
                .with_attribute(
                    "activityCount",
                    json!(activities.map_or(0, |a| a.len())),
                );

            let journey = EdgeEndpoint::named(
                ObjectKind::Journey.as_str(),
                record.id.clone(),
                Some(record.name.clone()),
            );

            if let Some(triggers) = triggers {
                for trigger in triggers {
                    Self::emit_trigger_edges(&journey, trigger, out);
                }
            }
            if let Some(activities) = activities {
                for activity in activities {
                    Self::emit_activity_edges(&journey, activity, out);
                }
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
    use crate::models::ExtractorStatus;
    use mcs_connectors::testing::MockResponse;
    use serde_json::json;

    fn journey_detail() -> Value {
        json!({
            "id": "j-1",
            "triggers": [
                {
                    "name": "API entry",
                    "metaData": {
                        "eventDefinitionId": "ev-5",
                        "eventDefinitionKey": "APIEvent-abc"
                    },
                    "configurationArguments": {
                        "eventDataConfig": {"deKey": "entry_de"}
                    }
                }
            ],
            "activities": [
                {
                    "type": "EMAILV2",
                    "configurationArguments": {
                        "triggeredSend": {
                            "emailId": 1234,
                            "senderProfileId": "sp-1",
                            "suppressionLists": [{"id": "list-9"}]
                        }
                    }
                },
                {
                    "type": "UPDATECONTACTDATA",
                    "configurationArguments": {"deKey": "scores_de"}
                },
                {
                    "type": "FIREAUTOMATION",
                    "configurationArguments": {"automationId": "a-3"}
                },
                {
                    "type": "WAIT"
                }
            ]
        })
    }

    #[tokio::test]
    async fn pipeline_walks_triggers_and_activities() {
        let fixture = engine_fixture();
        fixture.backend.on("/interaction/v1/interactions").push(MockResponse::json(
            200,
            json!({"items": [
                {"id": "j-1", "name": "Welcome series", "key": "jw-1", "status": "Published", "version": 4}
            ]}),
        ));
        fixture
            .backend
            .on("/interaction/v1/interactions/j-1")
            .push(MockResponse::json(200, journey_detail()));

        let ctx = fixture.context();
        let result = run_extractor(&JourneyExtractor, &ctx).await;

        assert_eq!(result.status, ExtractorStatus::Ok);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].attributes["activityCount"], json!(4));

        let mut kinds: Vec<&str> = result.edges.iter().map(|e| e.kind.as_str()).collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                "journey_uses_automation",
                "journey_uses_de",
                "journey_uses_de",
                "journey_uses_email",
                "journey_uses_event",
                "journey_uses_list",
                "journey_uses_sender_profile",
            ]
        );

        let event_edge = result
            .edges
            .iter()
            .find(|e| e.kind == RelationshipKind::JourneyUsesEvent)
            .unwrap();
        assert_eq!(event_edge.target.id, "ev-5");

        let email_edge = result
            .edges
            .iter()
            .find(|e| e.kind == RelationshipKind::JourneyUsesEmail)
            .unwrap();
        assert_eq!(email_edge.target.id, "1234");
    }

    #[tokio::test]
    async fn skips_detail_fetch_when_details_disabled() {
        let fixture = engine_fixture();
        fixture.backend.on("/interaction/v1/interactions").push(MockResponse::json(
            200,
            json!({"items": [{"id": "j-2", "name": "Bare"}]}),
        ));

        let mut options = crate::extractors::ExtractorOptions::default();
        options.include_details = false;
        let ctx = fixture.context_with_options(options);
        let result = run_extractor(&JourneyExtractor, &ctx).await;

        assert_eq!(result.status, ExtractorStatus::Ok);
        assert!(result.edges.is_empty());
        assert!(fixture
            .backend
            .requests_to("/interaction/v1/interactions/j-2")
            .is_empty());
    }
}
