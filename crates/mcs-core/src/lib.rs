//! # mcs-core
//!
//! The inventory extraction engine: normalized object and relationship
//! models, the lazy reference-table cache with breadcrumb resolution, the
//! extractor pipeline and its eighteen domain extractors, the bounded
//! parallel runner, the relationship graph assembler with orphan detection,
//! and the snapshot writer.
//!
//! Transport concerns (auth, REST, SOAP, rate limiting) live in
//! `mcs-connectors`; this crate drives them.

pub mod cache;
pub mod extractors;
pub mod graph;
pub mod models;
pub mod output;
pub mod runner;

pub use cache::{CacheKind, CacheManager, CacheStats};
pub use extractors::{
    extractor_for, preset_kinds, run_extractor, Extractor, ExtractorContext, ExtractorKind,
    ExtractorOptions, ExtractorResult, Preset, ProgressEvent, ProgressSink,
};
pub use graph::{GraphStats, OrphanRecord, RelationshipBuilder, RelationshipGraph};
pub use models::{
    ErrorKind, ExtractionError, ExtractorStatus, Folder, ObjectKind, ObjectRecord,
    RelationshipEdge, RelationshipKind,
};
pub use output::SnapshotWriter;
pub use runner::{Runner, RunnerConfig, RunnerResult};
