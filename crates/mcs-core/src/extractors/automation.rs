//! Automation extractor.
//!
//! Automations arrive as a REST list plus a per-item detail fetch that
//! carries steps and activities. Activity classification goes through a
//! versioned lookup table: the platform's activity-type vocabulary keeps
//! growing, so the table carries data, not hard-coded semantics.

use super::{ExtractorContext, ExtractorKind, FetchResult, TransformOutput};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{
    EdgeEndpoint, ExtractionError, ObjectKind, RelationshipEdge, RelationshipKind,
};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

/// One entry of the activity-type lookup table.
#[derive(Debug, Clone, Copy)]
pub struct ActivityType {
    pub id: u64,
    pub name: &'static str,
    /// Edge emitted for a reference from this activity, with the kind of
    /// the referenced object. `None` for purely informational activities.
    pub edge: Option<(RelationshipKind, &'static str)>,
}

/// Activity-type vocabulary as of platform API v1 (2025).
pub const ACTIVITY_TYPES: &[ActivityType] = &[
    ActivityType { id: 42, name: "Email Send", edge: Some((RelationshipKind::AutomationContainsEmail, "email")) },
    ActivityType { id: 43, name: "Import File", edge: Some((RelationshipKind::AutomationContainsImport, "import")) },
    ActivityType { id: 45, name: "Refresh Group", edge: Some((RelationshipKind::AutomationContainsRefreshGroup, "group")) },
    ActivityType { id: 53, name: "File Transfer", edge: Some((RelationshipKind::AutomationContainsTransfer, "file_transfer")) },
    ActivityType { id: 73, name: "Data Extract", edge: Some((RelationshipKind::AutomationContainsExtract, "data_extract")) },
    ActivityType { id: 84, name: "Report Definition", edge: None },
    ActivityType { id: 300, name: "Query Activity", edge: Some((RelationshipKind::AutomationContainsQuery, "query")) },
    ActivityType { id: 303, name: "Filter Activity", edge: Some((RelationshipKind::AutomationContainsFilter, "filter")) },
    ActivityType { id: 423, name: "Script Activity", edge: Some((RelationshipKind::AutomationContainsScript, "script")) },
    ActivityType { id: 425, name: "Data Factory Utility", edge: None },
    ActivityType { id: 427, name: "Build Audience", edge: None },
    ActivityType { id: 467, name: "Wait Activity", edge: Some((RelationshipKind::AutomationContainsWait, "wait")) },
    ActivityType { id: 667, name: "Journey Entry Injection", edge: Some((RelationshipKind::AutomationContainsJourneyEntry, "event_definition")) },
    ActivityType { id: 724, name: "Refresh Mobile Filtered List", edge: None },
    ActivityType { id: 725, name: "SMS", edge: Some((RelationshipKind::AutomationContainsSms, "sms_definition")) },
    ActivityType { id: 726, name: "Import Mobile Contact", edge: None },
    ActivityType { id: 733, name: "Journey Entry (Legacy)", edge: Some((RelationshipKind::AutomationContainsJourneyEntry, "event_definition")) },
    ActivityType { id: 736, name: "Push Notification", edge: Some((RelationshipKind::AutomationContainsPush, "push_definition")) },
    ActivityType { id: 749, name: "Fire Event", edge: Some((RelationshipKind::AutomationContainsFireEvent, "event_definition")) },
    ActivityType { id: 771, name: "Salesforce Send", edge: Some((RelationshipKind::AutomationContainsSalesforceSend, "salesforce_campaign")) },
    ActivityType { id: 783, name: "Send SMS (v2)", edge: Some((RelationshipKind::AutomationContainsSms, "sms_definition")) },
    ActivityType { id: 952, name: "Journey Entry", edge: Some((RelationshipKind::AutomationContainsJourneyEntry, "event_definition")) },
    ActivityType { id: 1000, name: "Verification Activity", edge: Some((RelationshipKind::AutomationContainsVerification, "verification")) },
    ActivityType { id: 1010, name: "Interaction Studio Data", edge: None },
    ActivityType { id: 1101, name: "Interactions", edge: None },
];

/// Looks up an activity type by platform id.
pub fn activity_type(id: u64) -> Option<&'static ActivityType> {
    ACTIVITY_TYPES.iter().find(|t| t.id == id)
}

/// Automation status ids as reported by the list endpoint.
pub fn status_name(status_id: i64) -> &'static str {
    match status_id {
        -1 => "Error",
        0 => "Building",
        1 => "Ready",
        2 => "Running",
        3 => "Paused",
        4 => "Stopped",
        5 => "Scheduled",
        6 => "Awaiting Trigger",
        7 => "InactiveTrigger",
        8 => "Skipped",
        _ => "Unknown",
    }
}

/// Renders an `icalRecur` string (e.g. `FREQ=DAILY;INTERVAL=2`) into a
/// short human-readable summary.
pub fn schedule_summary(schedule: Option<&Value>) -> String {
    let Some(schedule) = schedule else {
        return String::new();
    };
    if schedule.get("scheduleStatus").and_then(|v| v.as_str()) == Some("none") {
        return String::new();
    }
    let Some(ical) = schedule.get("icalRecur").and_then(|v| v.as_str()) else {
        // File-drop automations have a trigger type instead of a recurrence.
        if schedule.get("typeId").and_then(|v| v.as_i64()) == Some(2) {
            return "Triggered (File Drop)".to_string();
        }
        return String::new();
    };

    let mut freq = "";
    let mut interval = "1";
    let mut count = None;
    for part in ical.split(';') {
        match part.split_once('=') {
            Some(("FREQ", v)) => freq = v,
            Some(("INTERVAL", v)) => interval = v,
            Some(("COUNT", v)) => count = Some(v),
            _ => {}
        }
    }
    if count == Some("1") {
        return "Once".to_string();
    }

    match (freq.to_ascii_uppercase().as_str(), interval) {
        ("MINUTELY", "1") => "Every minute".to_string(),
        ("MINUTELY", n) => format!("Every {} minutes", n),
        ("HOURLY", "1") => "Hourly".to_string(),
        ("HOURLY", n) => format!("Every {} hours", n),
        ("DAILY", "1") => "Daily".to_string(),
        ("DAILY", n) => format!("Every {} days", n),
        ("WEEKLY", "1") => "Weekly".to_string(),
        ("WEEKLY", n) => format!("Every {} weeks", n),
        ("MONTHLY", "1") => "Monthly".to_string(),
        ("MONTHLY", n) => format!("Every {} months", n),
        ("YEARLY", "1") => "Yearly".to_string(),
        ("YEARLY", n) => format!("Every {} years", n),
        ("", _) => String::new(),
        (other, _) => format!("{}{}", &other[..1], other[1..].to_ascii_lowercase()),
    }
}

pub struct AutomationExtractor;

impl AutomationExtractor {
    async fn enrich_one(
        ctx: ExtractorContext,
        mut item: Value,
    ) -> (Value, Vec<ExtractionError>) {
        let kind = ExtractorKind::Automations;
        let mut errors = Vec::new();

        ctx.attach_breadcrumb(
            kind,
            CacheKind::AutomationFolders,
            &mut item,
            "categoryId",
            &mut errors,
        )
        .await;

        if let Some(status_id) = item.get("status").and_then(|v| v.as_i64()) {
            if let Some(map) = item.as_object_mut() {
                map.insert(
                    "statusName".to_string(),
                    Value::String(status_name(status_id).to_string()),
                );
            }
        }

        if ctx.options.include_details {
            if let Some(id) = raw_str(&item, "id") {
                match ctx
                    .paced_get(kind, &format!("/automation/v1/automations/{}", id))
                    .await
                {
                    Ok(response) if response.ok => {
                        let detail = response.data;
                        if let Some(map) = item.as_object_mut() {
                            for field in ["steps", "schedule", "lastRunTime", "lastRunStatus"] {
                                if let Some(value) = detail.get(field) {
                                    map.insert(field.to_string(), value.clone());
                                }
                            }
                        }
                        Self::resolve_activity_names(&ctx, &mut item).await;
                    }
                    Ok(_) => {
                        // Detail 404s happen for freshly deleted automations;
                        // the list record still stands on its own.
                    }
                    Err(e) => errors.push(e),
                }
            }
        }

        (item, errors)
    }

    /// Resolves activity display names from the query/script caches.
    async fn resolve_activity_names(ctx: &ExtractorContext, item: &mut Value) {
        let queries = ctx.cache.definitions(CacheKind::Queries).await.ok();
        let scripts = ctx.cache.definitions(CacheKind::Scripts).await.ok();

        let Some(steps) = item.get_mut("steps").and_then(|v| v.as_array_mut()) else {
            return;
        };
        for step in steps {
            let Some(activities) = step.get_mut("activities").and_then(|v| v.as_array_mut())
            else {
                continue;
            };
            for activity in activities {
                let type_id = activity.get("objectTypeId").and_then(|v| v.as_u64());
                let object_id = raw_str(activity, "activityObjectId");
                let Some(map) = activity.as_object_mut() else {
                    continue;
                };
                if let Some(type_id) = type_id {
                    let name = activity_type(type_id)
                        .map(|t| t.name.to_string())
                        .unwrap_or_else(|| format!("Unknown ({})", type_id));
                    map.insert("activityTypeName".to_string(), Value::String(name));
                }
                let (Some(type_id), Some(object_id)) = (type_id, object_id) else {
                    continue;
                };
                match type_id {
                    300 => {
                        if let Some(query) = queries.as_ref().and_then(|q| q.get(&object_id)) {
                            if let Some(name) = query.get("name") {
                                map.insert("queryName".to_string(), name.clone());
                            }
                            if let Some(target) = query.get("targetId") {
                                map.insert("targetDataExtensionId".to_string(), target.clone());
                            }
                            if let Some(target) = query.get("targetName") {
                                map.insert("targetDataExtensionName".to_string(), target.clone());
                            }
                        }
                    }
                    423 => {
                        if let Some(script) = scripts.as_ref().and_then(|s| s.get(&object_id)) {
                            if let Some(name) = script.get("name") {
                                map.insert("scriptName".to_string(), name.clone());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn emit_activity_edges(
        automation: &EdgeEndpoint,
        activity: &Value,
        out: &mut TransformOutput,
    ) {
        let Some(type_id) = activity.get("objectTypeId").and_then(|v| v.as_u64()) else {
            return;
        };
        let object_id = raw_str(activity, "activityObjectId");
        let activity_name = raw_str(activity, "name");

        if let (Some(object_id), Some((edge_kind, target_kind))) = (
            object_id.as_ref(),
            activity_type(type_id).and_then(|t| t.edge),
        ) {
            out.edges.push(RelationshipEdge::new(
                automation.clone(),
                edge_kind,
                EdgeEndpoint::named(target_kind, object_id.clone(), activity_name.clone()),
            ));
        }

        // Imports, queries, and filters carry their destination DEs inline.
        let write_kind = match type_id {
            43 => Some((RelationshipKind::ImportWritesDe, ObjectKind::Import)),
            300 => Some((RelationshipKind::QueryWritesDe, ObjectKind::Query)),
            303 => Some((RelationshipKind::FilterWritesDe, ObjectKind::Filter)),
            _ => None,
        };
        let (Some((edge_kind, source_kind)), Some(object_id)) = (write_kind, object_id) else {
            return;
        };
        let Some(targets) = activity.get("targetDataExtensions").and_then(|v| v.as_array())
        else {
            return;
        };
        for target in targets {
            let Some(de_id) = raw_str(target, "id") else {
                continue;
            };
            out.edges.push(RelationshipEdge::new(
                EdgeEndpoint::named(source_kind.as_str(), object_id.clone(), activity_name.clone()),
                edge_kind,
                EdgeEndpoint::named(
                    ObjectKind::DataExtension.as_str(),
                    de_id,
                    raw_str(target, "name"),
                ),
            ));
        }
    }
}

#[async_trait::async_trait]
impl super::Extractor for AutomationExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Automations
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Automation
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[
            CacheKind::AutomationFolders,
            CacheKind::Queries,
            CacheKind::Scripts,
        ]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/automation/v1/automations")
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
            let Some(mut record) = record_from_raw(ObjectKind::Automation, item, &fields) else {
                continue;
            };
            record.folder_path = raw_str(item, "folderPath");
            // The list endpoint reports status as a numeric id.
            record.status = raw_str(item, "statusName").or(record.status);

            let steps = item.get("steps").and_then(|v| v.as_array());
            let step_count = steps.map_or(0, |s| s.len());
            let activity_count = steps.map_or(0, |s| {
                s.iter()
                    .filter_map(|step| step.get("activities").and_then(|a| a.as_array()))
                    .map(|a| a.len())
                    .sum()
            });

            record = record
                .with_attribute("statusId", item.get("status").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "scheduleSummary",
                    match schedule_summary(item.get("schedule")) {
                        s if s.is_empty() => Value::Null,
                        s => Value::String(s),
                    },
                )
                .with_attribute(
                    "lastRunTime",
                    item.get("lastRunTime").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "lastRunStatus",
                    item.get("lastRunStatus").cloned().unwrap_or(Value::Null),
                )
                .with_attribute("stepCount", json!(step_count))
                .with_attribute("activityCount", json!(activity_count))
                .with_attribute("steps", item.get("steps").cloned().unwrap_or(Value::Null));

            let automation = EdgeEndpoint::named(
                ObjectKind::Automation.as_str(),
                record.id.clone(),
                Some(record.name.clone()),
            );
            if let Some(steps) = steps {
                for step in steps {
                    if let Some(activities) = step.get("activities").and_then(|v| v.as_array()) {
                        for activity in activities {
                            Self::emit_activity_edges(&automation, activity, out);
                        }
                    }
                }
            }

            out.records.push(record);
        }
    }
}
