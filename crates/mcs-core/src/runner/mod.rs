//! Extractor runner: bounded parallel orchestration.

use crate::extractors::{
    extractor_for, run_extractor, ExtractorContext, ExtractorKind, ExtractorResult, ProgressEvent,
};
use crate::graph::{RelationshipBuilder, RelationshipGraph};
use crate::models::{
    ErrorKind, ExtractionError, ExtractorCounters, ExtractorStatus, InventoryStatistics,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Extractor kinds running at once.
    pub max_concurrency: usize,
    /// Soft per-extractor deadline; an overrun fails that extractor only.
    pub extractor_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            extractor_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Aggregated outcome of a run.
#[derive(Debug)]
pub struct RunnerResult {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub kinds: Vec<ExtractorKind>,
    pub results: BTreeMap<ExtractorKind, ExtractorResult>,
    pub graph: RelationshipGraph,
}

impl RunnerResult {
    pub fn duration_ms(&self) -> u64 {
        (self.completed_at - self.started_at).num_milliseconds().max(0) as u64
    }

    /// True when every extractor finished clean.
    pub fn all_ok(&self) -> bool {
        self.results
            .values()
            .all(|r| r.status == ExtractorStatus::Ok)
    }

    /// True when any extractor lost data or failed outright.
    pub fn any_partial(&self) -> bool {
        self.results
            .values()
            .any(|r| r.status != ExtractorStatus::Ok)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        kinds: Vec<ExtractorKind>,
        results: BTreeMap<ExtractorKind, ExtractorResult>,
        graph: RelationshipGraph,
    ) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            completed_at: now,
            kinds,
            results,
            graph,
        }
    }
}

/// Orchestrates selected extractors and assembles the relationship graph.
///
/// The runner owns no global state: clients, caches, and the limiter come
/// in through the [`ExtractorContext`], so each run (and each test) builds
/// a fresh engine.
pub struct Runner {
    ctx: ExtractorContext,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(ctx: ExtractorContext, config: RunnerConfig) -> Self {
        Self { ctx, config }
    }

    /// Signals cancellation to everything in flight.
    pub fn cancel(&self) {
        warn!("run canceled");
        self.ctx.cancel.cancel();
    }

    /// Runs the given kinds in parallel under the global semaphore.
    pub async fn run(&self, kinds: &[ExtractorKind]) -> RunnerResult {
        let started_at = Utc::now();
        let kinds = dedupe_kinds(kinds);
        info!(count = kinds.len(), "starting extraction run");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut join_set: JoinSet<(ExtractorKind, ExtractorResult)> = JoinSet::new();

        for kind in kinds.clone() {
            let ctx = self.ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.config.extractor_timeout;
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("runner semaphore closed");
                (kind, run_with_timeout(kind, &ctx, timeout).await)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((kind, result)) => {
                    results.insert(kind, result);
                }
                Err(join_error) => {
                    error!(error = %join_error, "extractor task panicked");
                }
            }
        }

        self.finish(started_at, kinds, results)
    }

    /// Runs one extractor at a time, in the order given. Used under heavy
    /// rate-limit stress or when explicitly requested.
    pub async fn run_sequential(&self, kinds: &[ExtractorKind]) -> RunnerResult {
        let started_at = Utc::now();
        let kinds = dedupe_kinds(kinds);
        info!(count = kinds.len(), "starting sequential extraction run");

        let mut results = BTreeMap::new();
        for kind in kinds.clone() {
            let result = run_with_timeout(kind, &self.ctx, self.config.extractor_timeout).await;
            results.insert(kind, result);
        }

        self.finish(started_at, kinds, results)
    }

    fn finish(
        &self,
        started_at: DateTime<Utc>,
        kinds: Vec<ExtractorKind>,
        results: BTreeMap<ExtractorKind, ExtractorResult>,
    ) -> RunnerResult {
        // A run that absorbed no rate-limit pressure counts as a calm
        // window for the global stress multiplier.
        if results.values().all(|r| r.rate_limit_hits == 0) {
            self.ctx.limiter.note_calm();
        }

        let mut builder = RelationshipBuilder::new();
        for result in results.values() {
            builder.index_objects(&result.items);
        }
        builder.add_edges(
            results
                .values()
                .flat_map(|r| r.edges.iter().cloned()),
        );
        let graph = builder.build();

        info!(
            objects = graph.stats.total_objects,
            edges = graph.stats.total_edges,
            orphans = graph.stats.orphan_count,
            "extraction run complete"
        );

        RunnerResult {
            started_at,
            completed_at: Utc::now(),
            kinds,
            results,
            graph,
        }
    }

    /// Builds run statistics including cache and rate-limiter snapshots.
    pub fn statistics(&self, result: &RunnerResult) -> InventoryStatistics {
        let mut by_extractor = BTreeMap::new();
        let mut errors = Vec::new();
        let mut totals = (0usize, 0usize); // (objects, edges)
        let mut status_tally = (0usize, 0usize, 0usize); // (ok, partial, failed)

        for (kind, extractor_result) in &result.results {
            totals.0 += extractor_result.items.len();
            totals.1 += extractor_result.edges.len();
            match extractor_result.status {
                ExtractorStatus::Ok => status_tally.0 += 1,
                ExtractorStatus::Partial | ExtractorStatus::Aborted => status_tally.1 += 1,
                ExtractorStatus::Failed => status_tally.2 += 1,
            }
            errors.extend(extractor_result.errors.iter().cloned());
            by_extractor.insert(
                kind.as_str().to_string(),
                ExtractorCounters {
                    status: extractor_result.status,
                    items: extractor_result.items.len(),
                    edges: extractor_result.edges.len(),
                    errors: extractor_result.errors.len(),
                    pages_fetched: extractor_result.pages_fetched,
                    rate_limit_hits: extractor_result.rate_limit_hits,
                    duration_ms: extractor_result.duration_ms,
                },
            );
        }

        InventoryStatistics {
            total_objects: totals.0,
            total_edges: totals.1,
            extractors_run: result.results.len(),
            extractors_ok: status_tally.0,
            extractors_partial: status_tally.1,
            extractors_failed: status_tally.2,
            duration_ms: result.duration_ms(),
            by_extractor,
            errors,
            cache: serde_json::to_value(self.ctx.cache.stats()).ok(),
            rate_limiter: Some(self.ctx.limiter.status()),
        }
    }
}

async fn run_with_timeout(
    kind: ExtractorKind,
    ctx: &ExtractorContext,
    timeout: Duration,
) -> ExtractorResult {
    let extractor = extractor_for(kind);
    match tokio::time::timeout(timeout, run_extractor(extractor.as_ref(), ctx)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(extractor = %kind, ?timeout, "extractor exceeded soft timeout");
            ctx.emit(ProgressEvent::Error {
                kind,
                message: "extractor timeout".to_string(),
            });
            let mut result = ExtractorResult {
                kind,
                status: ExtractorStatus::Failed,
                items: Vec::new(),
                edges: Vec::new(),
                errors: Vec::new(),
                pages_fetched: 0,
                rate_limit_hits: 0,
                duration_ms: timeout.as_millis() as u64,
            };
            result.errors.push(ExtractionError::new(
                kind.as_str(),
                ErrorKind::ExtractorTimeout,
                format!("exceeded soft timeout of {:?}", timeout),
            ));
            result
        }
    }
}

fn dedupe_kinds(kinds: &[ExtractorKind]) -> Vec<ExtractorKind> {
    let mut seen = std::collections::HashSet::new();
    kinds
        .iter()
        .copied()
        .filter(|kind| seen.insert(*kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testing::engine_fixture;
    use crate::extractors::Preset;
    use mcs_connectors::testing::MockResponse;
    use serde_json::json;

    #[tokio::test]
    async fn parallel_run_aggregates_results_and_graph() {
        let fixture = engine_fixture();
        fixture
            .backend
            .on("/email/v1/category")
            .always(MockResponse::json(200, json!({"items": []})));
        fixture.backend.on("/automation/v1/queries").always(MockResponse::json(
            200,
            json!({"items": [
                {
                    "queryDefinitionId": "Q1",
                    "name": "Reader",
                    "queryText": "SELECT * FROM de_a",
                    "targetId": "de_out"
                }
            ]}),
        ));
        fixture.backend.on("/automation/v1/filters").always(MockResponse::json(
            200,
            json!({"items": [
                {"filterActivityId": "F1", "name": "Unused filter"}
            ]}),
        ));

        let runner = Runner::new(fixture.context(), RunnerConfig::default());
        let result = runner
            .run(&[ExtractorKind::Queries, ExtractorKind::Filters])
            .await;

        assert!(result.all_ok());
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.graph.stats.total_objects, 2);
        // Neither the query nor the filter is referenced by an automation.
        let orphans = result.graph.orphan_ids_by_kind();
        assert_eq!(orphans["query"], vec!["Q1".to_string()]);
        assert_eq!(orphans["filter"], vec!["F1".to_string()]);

        let statistics = runner.statistics(&result);
        assert_eq!(statistics.extractors_run, 2);
        assert_eq!(statistics.extractors_ok, 2);
        assert!(statistics.by_extractor.contains_key("queries"));
        assert!(statistics.rate_limiter.is_some());
    }

    #[tokio::test]
    async fn sequential_run_produces_same_shape() {
        let fixture = engine_fixture();
        fixture
            .backend
            .on("/interaction/v1/eventDefinitions")
            .always(MockResponse::json(200, json!({"items": []})));

        let runner = Runner::new(fixture.context(), RunnerConfig::default());
        let result = runner
            .run_sequential(&[ExtractorKind::EventDefinitions])
            .await;
        assert!(result.all_ok());
        assert_eq!(result.kinds, vec![ExtractorKind::EventDefinitions]);
    }

    #[tokio::test]
    async fn cancellation_surfaces_aborted_extractors() {
        let fixture = engine_fixture();
        fixture
            .backend
            .on("/interaction/v1/eventDefinitions")
            .always(MockResponse::json(200, json!({"items": []})));

        let runner = Runner::new(fixture.context(), RunnerConfig::default());
        runner.cancel();
        let result = runner.run(&[ExtractorKind::EventDefinitions]).await;

        let extractor_result = &result.results[&ExtractorKind::EventDefinitions];
        assert_eq!(extractor_result.status, ExtractorStatus::Aborted);
        assert!(result.any_partial());
    }

    #[tokio::test]
    async fn duplicate_kinds_run_once() {
        let fixture = engine_fixture();
        fixture
            .backend
            .on("/interaction/v1/eventDefinitions")
            .always(MockResponse::json(200, json!({"items": []})));

        let runner = Runner::new(fixture.context(), RunnerConfig::default());
        let result = runner
            .run(&[
                ExtractorKind::EventDefinitions,
                ExtractorKind::EventDefinitions,
            ])
            .await;
        assert_eq!(result.kinds.len(), 1);
        assert_eq!(
            fixture
                .backend
                .requests_to("/interaction/v1/eventDefinitions")
                .len(),
            1
        );
    }

    #[test]
    fn presets_resolve_to_kind_lists() {
        use crate::extractors::preset_kinds;
        assert_eq!(preset_kinds(Preset::Quick).len(), 2);
        assert_eq!(preset_kinds(Preset::Full).len(), 18);
        assert!(preset_kinds(Preset::Journey).contains(&ExtractorKind::EventDefinitions));
    }
}
