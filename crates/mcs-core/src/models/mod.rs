//! Data model for the extraction engine.

pub mod error;
pub mod folder;
pub mod object;
pub mod relationship;
pub mod statistics;

pub use error::{ErrorKind, ExtractionError, ExtractorStatus};
pub use folder::Folder;
pub use object::{ObjectKind, ObjectRecord};
pub use relationship::{EdgeEndpoint, RelationshipEdge, RelationshipKind};
pub use statistics::{ExtractorCounters, InventoryManifest, InventoryStatistics};
