//! Relationship edges between extracted objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The enumerated edge vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    // Automation step activities.
    AutomationContainsQuery,
    AutomationContainsScript,
    AutomationContainsImport,
    AutomationContainsExtract,
    AutomationContainsTransfer,
    AutomationContainsEmail,
    AutomationContainsFilter,
    AutomationContainsFireEvent,
    AutomationContainsJourneyEntry,
    AutomationContainsSms,
    AutomationContainsSalesforceSend,
    AutomationContainsPush,
    AutomationContainsRefreshGroup,
    AutomationContainsWait,
    AutomationContainsVerification,
    // Query SQL analysis.
    QueryReadsDe,
    QueryWritesDe,
    // Journey activities and triggers.
    JourneyUsesDe,
    JourneyUsesEmail,
    JourneyUsesFilter,
    JourneyUsesAutomation,
    JourneyUsesEvent,
    JourneyUsesSenderProfile,
    JourneyUsesDeliveryProfile,
    JourneyUsesSendClassification,
    JourneyUsesList,
    JourneyUsesAsset,
    // Automation Studio activity targets.
    ImportWritesDe,
    ExtractReadsDe,
    FilterReadsDe,
    FilterWritesDe,
    // Triggered send references.
    TriggeredSendUsesEmail,
    TriggeredSendUsesList,
    TriggeredSendUsesSenderProfile,
    TriggeredSendUsesDeliveryProfile,
    TriggeredSendUsesSendClassification,
    // Send classification references.
    SendClassificationUsesSenderProfile,
    SendClassificationUsesDeliveryProfile,
    // Journey entry events.
    EventDefinitionUsesDe,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::AutomationContainsQuery => "automation_contains_query",
            RelationshipKind::AutomationContainsScript => "automation_contains_script",
            RelationshipKind::AutomationContainsImport => "automation_contains_import",
            RelationshipKind::AutomationContainsExtract => "automation_contains_extract",
            RelationshipKind::AutomationContainsTransfer => "automation_contains_transfer",
            RelationshipKind::AutomationContainsEmail => "automation_contains_email",
            RelationshipKind::AutomationContainsFilter => "automation_contains_filter",
            RelationshipKind::AutomationContainsFireEvent => "automation_contains_fire_event",
            RelationshipKind::AutomationContainsJourneyEntry => "automation_contains_journey_entry",
            RelationshipKind::AutomationContainsSms => "automation_contains_sms",
            RelationshipKind::AutomationContainsSalesforceSend => {
                "automation_contains_salesforce_send"
            }
            RelationshipKind::AutomationContainsPush => "automation_contains_push",
            RelationshipKind::AutomationContainsRefreshGroup => "automation_contains_refresh_group",
            RelationshipKind::AutomationContainsWait => "automation_contains_wait",
            RelationshipKind::AutomationContainsVerification => "automation_contains_verification",
            RelationshipKind::QueryReadsDe => "query_reads_de",
            RelationshipKind::QueryWritesDe => "query_writes_de",
            RelationshipKind::JourneyUsesDe => "journey_uses_de",
            RelationshipKind::JourneyUsesEmail => "journey_uses_email",
            RelationshipKind::JourneyUsesFilter => "journey_uses_filter",
            RelationshipKind::JourneyUsesAutomation => "journey_uses_automation",
            RelationshipKind::JourneyUsesEvent => "journey_uses_event",
            RelationshipKind::JourneyUsesSenderProfile => "journey_uses_sender_profile",
            RelationshipKind::JourneyUsesDeliveryProfile => "journey_uses_delivery_profile",
            RelationshipKind::JourneyUsesSendClassification => "journey_uses_send_classification",
            RelationshipKind::JourneyUsesList => "journey_uses_list",
            RelationshipKind::JourneyUsesAsset => "journey_uses_asset",
            RelationshipKind::ImportWritesDe => "import_writes_de",
            RelationshipKind::ExtractReadsDe => "extract_reads_de",
            RelationshipKind::FilterReadsDe => "filter_reads_de",
            RelationshipKind::FilterWritesDe => "filter_writes_de",
            RelationshipKind::TriggeredSendUsesEmail => "triggered_send_uses_email",
            RelationshipKind::TriggeredSendUsesList => "triggered_send_uses_list",
            RelationshipKind::TriggeredSendUsesSenderProfile => {
                "triggered_send_uses_sender_profile"
            }
            RelationshipKind::TriggeredSendUsesDeliveryProfile => {
                "triggered_send_uses_delivery_profile"
            }
            RelationshipKind::TriggeredSendUsesSendClassification => {
                "triggered_send_uses_send_classification"
            }
            RelationshipKind::SendClassificationUsesSenderProfile => {
                "send_classification_uses_sender_profile"
            }
            RelationshipKind::SendClassificationUsesDeliveryProfile => {
                "send_classification_uses_delivery_profile"
            }
            RelationshipKind::EventDefinitionUsesDe => "event_definition_uses_de",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of an edge.
///
/// The `kind` is an open string: extractors occasionally reference
/// vocabulary outside the eighteen extracted kinds (SMS definitions,
/// subscriber groups); such endpoints are always external to the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EdgeEndpoint {
    pub kind: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EdgeEndpoint {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            name: None,
        }
    }

    pub fn named(
        kind: impl Into<String>,
        id: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            name,
        }
    }
}

/// A directed, labeled edge between two objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipEdge {
    pub source: EdgeEndpoint,
    pub target: EdgeEndpoint,
    pub kind: RelationshipKind,
    /// True when the target was not extracted in this run.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dangling: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl RelationshipEdge {
    pub fn new(source: EdgeEndpoint, kind: RelationshipKind, target: EdgeEndpoint) -> Self {
        Self {
            source,
            target,
            kind,
            dangling: false,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    /// Deduplication key: edges are identical when the 5-tuple matches.
    pub fn dedupe_key(&self) -> (String, String, RelationshipKind, String, String) {
        (
            self.source.kind.clone(),
            self.source.id.clone(),
            self.kind,
            self.target.kind.clone(),
            self.target.id.clone(),
        )
    }
}
