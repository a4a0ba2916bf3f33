//! SQL Query Activity extractor.
//!
//! Scans the SQL text of each query for `FROM`/`JOIN` references. The scan
//! is regex-based and best-effort by design; it only needs to find data
//! extension names, not parse SQL.

use super::{
    ExtractorContext, ExtractorKind, FetchResult, TransformOutput,
};
use crate::cache::CacheKind;
use crate::models::object::{raw_str, record_from_raw, RawFieldMap};
use crate::models::{
    EdgeEndpoint, ExtractionError, ObjectKind, RelationshipEdge, RelationshipKind,
};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Matches `FROM x`, `LEFT JOIN [schema].[x]`, etc. Group 1 is the
/// optional schema prefix, group 2 the table name.
static TABLE_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:FROM|(?:LEFT|RIGHT|INNER|OUTER|CROSS|FULL\s+OUTER)?\s*JOIN)\s+\[?(?:(\w+)\.)?\[?([A-Za-z_][A-Za-z0-9_]*)\]?",
    )
    .expect("table reference pattern is valid")
});

const SYSTEM_TABLE_NAMES: [&str; 3] = ["dual", "subscribers", "subscriberattributes"];

/// A data extension referenced from SQL, resolved by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeReference {
    pub name: String,
    pub shared: bool,
}

/// Extracts the data extension names a query reads from.
pub fn extract_de_references(sql: &str) -> Vec<DeReference> {
    let mut references: BTreeMap<String, bool> = BTreeMap::new();

    for captures in TABLE_REFERENCE_RE.captures_iter(sql) {
        let Some(name) = captures.get(2).map(|m| m.as_str().trim().to_string()) else {
            continue;
        };
        if name.is_empty() || is_system_table(&name) {
            continue;
        }
        let shared = captures
            .get(1)
            .map(|m| {
                let schema = m.as_str().to_ascii_uppercase();
                schema == "ENT" || schema == "_ENT"
            })
            .unwrap_or(false);
        let entry = references.entry(name).or_insert(false);
        *entry |= shared;
    }

    references
        .into_iter()
        .map(|(name, shared)| DeReference { name, shared })
        .collect()
}

fn is_system_table(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with('_')
        || lower.starts_with("sys")
        || lower.starts_with("information_schema")
        || SYSTEM_TABLE_NAMES.contains(&lower.as_str())
}

pub struct QueryExtractor;

#[async_trait::async_trait]
impl super::Extractor for QueryExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Queries
    }

    fn object_kind(&self) -> ObjectKind {
        ObjectKind::Query
    }

    fn required_caches(&self) -> &'static [CacheKind] {
        &[CacheKind::QueryFolders]
    }

    async fn fetch(&self, ctx: &ExtractorContext) -> FetchResult {
        ctx.paced_get_paged(self.kind(), "/automation/v1/queries")
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
                CacheKind::QueryFolders,
                &mut item,
                "categoryId",
                errors,
            )
            .await;

            if let Some(sql) = item.get("queryText").and_then(|v| v.as_str()) {
                let references: Vec<Value> = extract_de_references(sql)
                    .into_iter()
                    .map(|r| json!({"name": r.name, "isShared": r.shared}))
                    .collect();
                if let Some(map) = item.as_object_mut() {
                    map.insert("referencedDataExtensions".to_string(), Value::Array(references));
                }
            }
            enriched.push(item);
        }
        enriched
    }

    fn transform(&self, _ctx: &ExtractorContext, items: &[Value], out: &mut TransformOutput) {
        let fields = RawFieldMap {
            id: "queryDefinitionId",
            ..RawFieldMap::default()
        };

        for item in items {
            let Some(mut record) = record_from_raw(ObjectKind::Query, item, &fields) else {
                continue;
            };
            record.folder_path = raw_str(item, "folderPath");
            record = record
                .with_attribute("queryText", item.get("queryText").cloned().unwrap_or(Value::Null))
                .with_attribute("targetId", item.get("targetId").cloned().unwrap_or(Value::Null))
                .with_attribute(
                    "targetName",
                    item.get("targetName").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "targetKey",
                    item.get("targetKey").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "targetUpdateTypeName",
                    item.get("targetUpdateTypeName").cloned().unwrap_or(Value::Null),
                )
                .with_attribute(
                    "referencedDataExtensions",
                    item.get("referencedDataExtensions").cloned().unwrap_or(Value::Null),
                );

            let source = EdgeEndpoint::named(
                ObjectKind::Query.as_str(),
                record.id.clone(),
                Some(record.name.clone()),
            );

            // Target DE (writes).
            if let Some(target_id) = raw_str(item, "targetId") {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    RelationshipKind::QueryWritesDe,
                    EdgeEndpoint::named(
                        ObjectKind::DataExtension.as_str(),
                        target_id,
                        raw_str(item, "targetName"),
                    ),
                ));
            }

            // Source DEs (reads), referenced by name.
            if let Some(references) = item
                .get("referencedDataExtensions")
                .and_then(|v| v.as_array())
            {
                for reference in references {
                    let Some(name) = reference.get("name").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    let shared = reference
                        .get("isShared")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let mut edge = RelationshipEdge::new(
                        source.clone(),
                        RelationshipKind::QueryReadsDe,
                        EdgeEndpoint::named(
                            ObjectKind::DataExtension.as_str(),
                            name.to_string(),
                            Some(name.to_string()),
                        ),
                    )
                    .with_metadata("resolved_by_name", json!(true));
                    if shared {
                        edge = edge.with_metadata("isShared", json!(true));
                    }
                    out.edges.push(edge);
                }
            }

            out.records.push(record);
        }
    }
}
