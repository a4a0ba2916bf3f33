//! Normalized object records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The object categories the engine extracts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Automation,
    Query,
    Script,
    Import,
    DataExtract,
    FileTransfer,
    Filter,
    DataExtension,
    Email,
    Journey,
    EventDefinition,
    TriggeredSend,
    List,
    Asset,
    Folder,
    SenderProfile,
    DeliveryProfile,
    SendClassification,
}

impl ObjectKind {
    /// Snake-case name used in edges, orphan rules, and file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Automation => "automation",
            ObjectKind::Query => "query",
            ObjectKind::Script => "script",
            ObjectKind::Import => "import",
            ObjectKind::DataExtract => "data_extract",
            ObjectKind::FileTransfer => "file_transfer",
            ObjectKind::Filter => "filter",
            ObjectKind::DataExtension => "data_extension",
            ObjectKind::Email => "email",
            ObjectKind::Journey => "journey",
            ObjectKind::EventDefinition => "event_definition",
            ObjectKind::TriggeredSend => "triggered_send",
            ObjectKind::List => "list",
            ObjectKind::Asset => "asset",
            ObjectKind::Folder => "folder",
            ObjectKind::SenderProfile => "sender_profile",
            ObjectKind::DeliveryProfile => "delivery_profile",
            ObjectKind::SendClassification => "send_classification",
        }
    }

    /// All kinds, in stable order.
    pub fn all() -> &'static [ObjectKind] {
        &[
            ObjectKind::Automation,
            ObjectKind::Query,
            ObjectKind::Script,
            ObjectKind::Import,
            ObjectKind::DataExtract,
            ObjectKind::FileTransfer,
            ObjectKind::Filter,
            ObjectKind::DataExtension,
            ObjectKind::Email,
            ObjectKind::Journey,
            ObjectKind::EventDefinition,
            ObjectKind::TriggeredSend,
            ObjectKind::List,
            ObjectKind::Asset,
            ObjectKind::Folder,
            ObjectKind::SenderProfile,
            ObjectKind::DeliveryProfile,
            ObjectKind::SendClassification,
        ]
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized object emitted by an extractor.
///
/// Common fields are typed; everything type-specific lives in `attributes`.
/// Dates pass through as the platform returned them so a re-read of the
/// snapshot reproduces the record exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRecord {
    pub id: String,
    pub kind: ObjectKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl ObjectRecord {
    pub fn new(kind: ObjectKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            customer_key: None,
            description: None,
            folder_id: None,
            folder_path: None,
            created_date: None,
            modified_date: None,
            status: None,
            attributes: Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_folder_path(mut self, path: impl Into<String>) -> Self {
        self.folder_path = Some(path.into());
        self
    }

    /// Adds a type-specific attribute, dropping JSON nulls.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        if !value.is_null() {
            self.attributes.insert(key.into(), value);
        }
        self
    }
}

/// Copies common record fields out of a raw platform item.
///
/// `id_field` and friends name where each field lives in the raw JSON;
/// absent fields stay `None`.
pub struct RawFieldMap<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub customer_key: &'a str,
    pub description: &'a str,
    pub folder_id: &'a str,
    pub created_date: &'a str,
    pub modified_date: &'a str,
    pub status: &'a str,
}

impl Default for RawFieldMap<'_> {
    fn default() -> Self {
        Self {
            id: "id",
            name: "name",
            customer_key: "key",
            description: "description",
            folder_id: "categoryId",
            created_date: "createdDate",
            modified_date: "modifiedDate",
            status: "status",
        }
    }
}

/// Stringifies a raw JSON field (ids arrive as numbers or strings).
pub fn raw_str(item: &Value, field: &str) -> Option<String> {
    match item.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// Builds an [`ObjectRecord`] from a raw item via a field map.
/// Returns `None` when the id is missing.
pub fn record_from_raw(kind: ObjectKind, item: &Value, fields: &RawFieldMap<'_>) -> Option<ObjectRecord> {
    let id = raw_str(item, fields.id)?;
    let name = raw_str(item, fields.name).unwrap_or_default();
    let mut record = ObjectRecord::new(kind, id, name);
    record.customer_key = raw_str(item, fields.customer_key);
    record.description = raw_str(item, fields.description);
    record.folder_id = raw_str(item, fields.folder_id);
    record.created_date = raw_str(item, fields.created_date);
    record.modified_date = raw_str(item, fields.modified_date);
    record.status = raw_str(item, fields.status);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ObjectKind::DataExtension).unwrap(),
            "\"data_extension\""
        );
        assert_eq!(ObjectKind::TriggeredSend.as_str(), "triggered_send");
        assert_eq!(ObjectKind::all().len(), 18);
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = ObjectRecord::new(ObjectKind::Query, "q-1", "Nightly dedupe")
            .with_status("Active")
            .with_folder_path("Query Activities > Maintenance")
            .with_attribute("queryText", json!("SELECT 1"))
            .with_attribute("ignored", Value::Null);

        let line = serde_json::to_string(&record).unwrap();
        let back: ObjectRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(record, back);
        assert!(!back.attributes.contains_key("ignored"));
    }

    #[test]
    fn record_from_raw_handles_numeric_ids_and_missing_fields() {
        let raw = json!({
            "id": 42,
            "name": "Welcome",
            "categoryId": 9,
            "createdDate": "2024-01-01T00:00:00Z"
        });
        let record =
            record_from_raw(ObjectKind::Automation, &raw, &RawFieldMap::default()).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.folder_id.as_deref(), Some("9"));
        assert!(record.status.is_none());
    }

    #[test]
    fn record_from_raw_requires_an_id() {
        let raw = json!({"name": "nameless"});
        assert!(record_from_raw(ObjectKind::Query, &raw, &RawFieldMap::default()).is_none());
    }
}
