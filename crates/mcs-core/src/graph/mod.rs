//! Relationship graph assembly and orphan detection.
//!
//! Runs strictly after all extractors complete: indexes every extracted
//! object, folds and dedupes the edges, marks edges whose target was not
//! extracted as dangling, and computes orphan sets from the rule table.

use crate::models::{ObjectKind, ObjectRecord, RelationshipEdge};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

/// Names of journey-builder-generated triggered sends end in a UUID.
static UUID_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid suffix pattern is valid")
});

/// Which source kinds count as "using" an object kind. An object of the
/// left kind with no edge from any of the right kinds is an orphan.
const ORPHAN_RULES: &[(ObjectKind, &[ObjectKind])] = &[
    (ObjectKind::Query, &[ObjectKind::Automation]),
    (ObjectKind::Script, &[ObjectKind::Automation]),
    (ObjectKind::Import, &[ObjectKind::Automation]),
    (ObjectKind::DataExtract, &[ObjectKind::Automation]),
    (ObjectKind::FileTransfer, &[ObjectKind::Automation]),
    (ObjectKind::Filter, &[ObjectKind::Automation, ObjectKind::Journey]),
    (ObjectKind::EventDefinition, &[ObjectKind::Journey]),
    (
        ObjectKind::DataExtension,
        &[
            ObjectKind::Query,
            ObjectKind::Journey,
            ObjectKind::Import,
            ObjectKind::Filter,
            ObjectKind::EventDefinition,
            ObjectKind::TriggeredSend,
            ObjectKind::DataExtract,
        ],
    ),
    (
        ObjectKind::Email,
        &[
            ObjectKind::Automation,
            ObjectKind::Journey,
            ObjectKind::TriggeredSend,
        ],
    ),
    (
        ObjectKind::List,
        &[ObjectKind::TriggeredSend, ObjectKind::Journey],
    ),
    (
        ObjectKind::SenderProfile,
        &[ObjectKind::SendClassification, ObjectKind::TriggeredSend],
    ),
    (
        ObjectKind::DeliveryProfile,
        &[ObjectKind::SendClassification, ObjectKind::TriggeredSend],
    ),
    (ObjectKind::SendClassification, &[ObjectKind::TriggeredSend]),
];

/// Compact object entry kept in the graph index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<String>,
}

/// An object flagged as unused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanRecord {
    pub kind: String,
    pub id: String,
    pub name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
}

/// Graph-level statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_objects: usize,
    pub total_edges: usize,
    pub dangling_edges: usize,
    pub orphan_count: usize,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub objects_by_kind: BTreeMap<String, usize>,
}

/// The assembled, read-only relationship graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub edges: Vec<RelationshipEdge>,
    /// `kind -> id -> summary` for every extracted object.
    pub index: BTreeMap<String, BTreeMap<String, ObjectSummary>>,
    pub orphans: Vec<OrphanRecord>,
    pub stats: GraphStats,
}

impl RelationshipGraph {
    /// Orphan ids grouped by kind, the shape written to `orphans.json`.
    pub fn orphan_ids_by_kind(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_kind: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for orphan in &self.orphans {
            by_kind
                .entry(orphan.kind.clone())
                .or_default()
                .push(orphan.id.clone());
        }
        for ids in by_kind.values_mut() {
            ids.sort();
        }
        by_kind
    }
}

struct IndexedObject {
    kind: ObjectKind,
    id: String,
    summary: ObjectSummary,
}

/// Folds extractor output into a [`RelationshipGraph`].
#[derive(Default)]
pub struct RelationshipBuilder {
    objects: Vec<IndexedObject>,
    edges: Vec<RelationshipEdge>,
    seen: HashSet<(String, String, crate::models::RelationshipKind, String, String)>,
}

impl RelationshipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes extracted objects by `(kind, id)`.
    pub fn index_objects(&mut self, records: &[ObjectRecord]) {
        for record in records {
            self.objects.push(IndexedObject {
                kind: record.kind,
                id: record.id.clone(),
                summary: ObjectSummary {
                    name: record.name.clone(),
                    customer_key: record.customer_key.clone(),
                    folder_path: record.folder_path.clone(),
                    status: record.status.clone(),
                    modified_date: record.modified_date.clone(),
                },
            });
        }
    }

    /// Folds edges in, deduplicating on the 5-tuple.
    pub fn add_edges(&mut self, edges: impl IntoIterator<Item = RelationshipEdge>) {
        for edge in edges {
            if self.seen.insert(edge.dedupe_key()) {
                self.edges.push(edge);
            }
        }
    }

    /// Assembles the graph: resolves edge targets, marks dangling edges,
    /// and computes orphan sets.
    pub fn build(mut self) -> RelationshipGraph {
        // Targets may be referenced by id, customer key, or (for SQL-derived
        // edges) bare name; resolve all three to the canonical id.
        let mut aliases: HashMap<(String, String), String> = HashMap::new();
        for object in &self.objects {
            let kind = object.kind.as_str().to_string();
            aliases
                .entry((kind.clone(), object.id.clone()))
                .or_insert_with(|| object.id.clone());
            if let Some(key) = &object.summary.customer_key {
                aliases
                    .entry((kind.clone(), key.clone()))
                    .or_insert_with(|| object.id.clone());
            }
            if !object.summary.name.is_empty() {
                aliases
                    .entry((kind, object.summary.name.clone()))
                    .or_insert_with(|| object.id.clone());
            }
        }

        // referenced[(target_kind, target_id)] = set of source kinds.
        let mut referenced: HashMap<(String, String), HashSet<String>> = HashMap::new();
        let mut dangling_edges = 0usize;
        for edge in &mut self.edges {
            let target_key = (edge.target.kind.clone(), edge.target.id.clone());
            match aliases.get(&target_key) {
                Some(canonical) => {
                    edge.dangling = false;
                    referenced
                        .entry((edge.target.kind.clone(), canonical.clone()))
                        .or_default()
                        .insert(edge.source.kind.clone());
                }
                None => {
                    edge.dangling = true;
                    dangling_edges += 1;
                }
            }
        }

        let orphans = compute_orphans(&self.objects, &referenced);

        let mut index: BTreeMap<String, BTreeMap<String, ObjectSummary>> = BTreeMap::new();
        let mut objects_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for object in self.objects {
            let kind = object.kind.as_str().to_string();
            *objects_by_kind.entry(kind.clone()).or_default() += 1;
            index.entry(kind).or_default().insert(object.id, object.summary);
        }

        let mut edges_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for edge in &self.edges {
            *edges_by_kind.entry(edge.kind.as_str().to_string()).or_default() += 1;
        }

        let stats = GraphStats {
            total_objects: objects_by_kind.values().sum(),
            total_edges: self.edges.len(),
            dangling_edges,
            orphan_count: orphans.len(),
            edges_by_kind,
            objects_by_kind,
        };

        RelationshipGraph {
            edges: self.edges,
            index,
            orphans,
            stats,
        }
    }
}

fn compute_orphans(
    objects: &[IndexedObject],
    referenced: &HashMap<(String, String), HashSet<String>>,
) -> Vec<OrphanRecord> {
    let rules: HashMap<ObjectKind, &[ObjectKind]> = ORPHAN_RULES.iter().copied().collect();
    let mut orphans = Vec::new();

    for object in objects {
        if object.kind == ObjectKind::TriggeredSend {
            if is_jb_orphan(object) {
                orphans.push(orphan_record(object, "jb_orphan"));
            }
            continue;
        }
        let Some(required_sources) = rules.get(&object.kind) else {
            continue;
        };
        let used = referenced
            .get(&(object.kind.as_str().to_string(), object.id.clone()))
            .map(|sources| {
                required_sources
                    .iter()
                    .any(|required| sources.contains(required.as_str()))
            })
            .unwrap_or(false);
        if !used {
            orphans.push(orphan_record(object, "unreferenced"));
        }
    }

    orphans
}

/// A triggered send left behind by a deleted journey: sits in a
/// journey-builder folder, is deleted, and carries a generated UUID name.
fn is_jb_orphan(object: &IndexedObject) -> bool {
    let in_jb_folder = object
        .summary
        .folder_path
        .as_deref()
        .map(|path| path.to_ascii_lowercase().contains("journeybuilder"))
        .unwrap_or(false);
    let deleted = object.summary.status.as_deref() == Some("Deleted");
    in_jb_folder && deleted && UUID_SUFFIX_RE.is_match(&object.summary.name)
}

fn orphan_record(object: &IndexedObject, reason: &str) -> OrphanRecord {
    OrphanRecord {
        kind: object.kind.as_str().to_string(),
        id: object.id.clone(),
        name: object.summary.name.clone(),
        reason: reason.to_string(),
        folder_path: object.summary.folder_path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeEndpoint, RelationshipKind};

    fn record(kind: ObjectKind, id: &str, name: &str) -> ObjectRecord {
        ObjectRecord::new(kind, id, name)
    }

    fn edge(
        source_kind: ObjectKind,
        source_id: &str,
        kind: RelationshipKind,
        target_kind: ObjectKind,
        target_id: &str,
    ) -> RelationshipEdge {
        RelationshipEdge::new(
            EdgeEndpoint::new(source_kind.as_str(), source_id),
            kind,
            EdgeEndpoint::new(target_kind.as_str(), target_id),
        )
    }

    #[test]
    fn unreferenced_query_is_an_orphan() {
        let mut builder = RelationshipBuilder::new();
        builder.index_objects(&[
            record(ObjectKind::Query, "Q1", "Lonely"),
            record(ObjectKind::Query, "Q2", "Used"),
            record(ObjectKind::Automation, "A1", "Runner"),
        ]);
        builder.add_edges([edge(
            ObjectKind::Automation,
            "A1",
            RelationshipKind::AutomationContainsQuery,
            ObjectKind::Query,
            "Q2",
        )]);

        let graph = builder.build();
        let orphans = graph.orphan_ids_by_kind();
        assert_eq!(orphans.get("query"), Some(&vec!["Q1".to_string()]));
    }

    #[test]
    fn reference_from_wrong_kind_does_not_count() {
        // The rule table says queries are used iff an automation references
        // them; a journey edge alone leaves the query orphaned.
        let mut builder = RelationshipBuilder::new();
        builder.index_objects(&[
            record(ObjectKind::Query, "Q1", "Via journey"),
            record(ObjectKind::Journey, "J1", "A journey"),
        ]);
        builder.add_edges([edge(
            ObjectKind::Journey,
            "J1",
            RelationshipKind::JourneyUsesDe,
            ObjectKind::Query,
            "Q1",
        )]);

        let graph = builder.build();
        assert_eq!(
            graph.orphan_ids_by_kind().get("query"),
            Some(&vec!["Q1".to_string()])
        );
    }

    #[test]
    fn jb_orphan_rule_matches_all_three_conditions() {
        let mut alpha = record(ObjectKind::TriggeredSend, "ts-a", "TS_alpha");
        alpha.status = Some("Active".to_string());
        alpha.folder_path = Some("root > triggered_send".to_string());

        let mut beta = record(
            ObjectKind::TriggeredSend,
            "ts-b",
            "promo-emailv2-1b2e3f4a-5b6c-7d8e-9f01-23456789abcd",
        );
        beta.status = Some("Deleted".to_string());
        beta.folder_path = Some("root > triggered_send_journeybuilder".to_string());

        // Deleted and in the JB folder, but a human-given name.
        let mut gamma = record(ObjectKind::TriggeredSend, "ts-c", "legacy promo");
        gamma.status = Some("Deleted".to_string());
        gamma.folder_path = Some("root > triggered_send_journeybuilder".to_string());

        let mut builder = RelationshipBuilder::new();
        builder.index_objects(&[alpha, beta, gamma]);
        let graph = builder.build();

        assert_eq!(graph.orphans.len(), 1);
        assert_eq!(graph.orphans[0].id, "ts-b");
        assert_eq!(graph.orphans[0].reason, "jb_orphan");
    }

    #[test]
    fn dangling_iff_target_not_indexed() {
        let mut builder = RelationshipBuilder::new();
        builder.index_objects(&[
            record(ObjectKind::Query, "Q1", "Reader"),
            record(ObjectKind::DataExtension, "de-1", "Known"),
        ]);
        builder.add_edges([
            edge(
                ObjectKind::Query,
                "Q1",
                RelationshipKind::QueryReadsDe,
                ObjectKind::DataExtension,
                "de-1",
            ),
            edge(
                ObjectKind::Query,
                "Q1",
                RelationshipKind::QueryReadsDe,
                ObjectKind::DataExtension,
                "never_extracted",
            ),
        ]);

        let graph = builder.build();
        let by_target: HashMap<&str, bool> = graph
            .edges
            .iter()
            .map(|e| (e.target.id.as_str(), e.dangling))
            .collect();
        assert_eq!(by_target["de-1"], false);
        assert_eq!(by_target["never_extracted"], true);
        assert_eq!(graph.stats.dangling_edges, 1);
    }

    #[test]
    fn name_and_customer_key_aliases_resolve_references() {
        let mut de = record(ObjectKind::DataExtension, "de-77", "Customer Master");
        de.customer_key = Some("customer_master".to_string());

        let mut builder = RelationshipBuilder::new();
        builder.index_objects(&[de, record(ObjectKind::Query, "Q1", "Reader")]);
        // SQL-derived edge references the DE by name.
        builder.add_edges([edge(
            ObjectKind::Query,
            "Q1",
            RelationshipKind::QueryReadsDe,
            ObjectKind::DataExtension,
            "Customer Master",
        )]);

        let graph = builder.build();
        assert!(!graph.edges[0].dangling);
        // The DE is referenced by a query, so it is not an orphan.
        assert!(graph.orphan_ids_by_kind().get("data_extension").is_none());
    }

    #[test]
    fn edges_dedupe_on_the_five_tuple() {
        let mut builder = RelationshipBuilder::new();
        builder.index_objects(&[record(ObjectKind::Automation, "A1", "Runner")]);
        builder.add_edges([
            edge(
                ObjectKind::Automation,
                "A1",
                RelationshipKind::AutomationContainsQuery,
                ObjectKind::Query,
                "Q1",
            ),
            edge(
                ObjectKind::Automation,
                "A1",
                RelationshipKind::AutomationContainsQuery,
                ObjectKind::Query,
                "Q1",
            ),
        ]);
        let graph = builder.build();
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn stats_tally_by_kind() {
        let mut builder = RelationshipBuilder::new();
        builder.index_objects(&[
            record(ObjectKind::Query, "Q1", "One"),
            record(ObjectKind::Query, "Q2", "Two"),
            record(ObjectKind::Automation, "A1", "Runner"),
        ]);
        builder.add_edges([edge(
            ObjectKind::Automation,
            "A1",
            RelationshipKind::AutomationContainsQuery,
            ObjectKind::Query,
            "Q1",
        )]);
        let graph = builder.build();
        assert_eq!(graph.stats.total_objects, 3);
        assert_eq!(graph.stats.objects_by_kind["query"], 2);
        assert_eq!(graph.stats.edges_by_kind["automation_contains_query"], 1);
    }
}
