//! Folder breadcrumb resolution.
//!
//! Paths read root-first, e.g. `Marketing > Campaigns > 2025 Q1`. The walk
//! is iterative with an explicit visited set: a missing parent terminates
//! the path with a synthetic `(unknown:<id>)` segment, a revisited id stops
//! the walk and flags the result cyclic.

use crate::models::Folder;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Default segment separator.
pub const DEFAULT_SEPARATOR: &str = " > ";

/// A resolved folder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub path: String,
    pub cyclic: bool,
}

impl Breadcrumb {
    fn empty() -> Self {
        Self {
            path: String::new(),
            cyclic: false,
        }
    }
}

/// Memoized breadcrumb resolver over one folder map.
pub struct BreadcrumbBuilder {
    folders: Arc<HashMap<String, Folder>>,
    separator: String,
    resolved: Mutex<HashMap<String, Breadcrumb>>,
    missing: Mutex<HashSet<String>>,
}

impl BreadcrumbBuilder {
    pub fn new(folders: Arc<HashMap<String, Folder>>) -> Self {
        Self::with_separator(folders, DEFAULT_SEPARATOR)
    }

    pub fn with_separator(
        folders: Arc<HashMap<String, Folder>>,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            folders,
            separator: separator.into(),
            resolved: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
        }
    }

    /// Resolves the path for a folder id. Terminates for all inputs,
    /// including cyclic folder maps.
    pub fn build(&self, folder_id: &str) -> Breadcrumb {
        if folder_id.is_empty() || folder_id == "0" {
            return Breadcrumb::empty();
        }
        if let Some(cached) = self.resolved.lock().expect("breadcrumb cache poisoned").get(folder_id)
        {
            return cached.clone();
        }

        // Walk leaf -> root, collecting segments.
        let mut segments: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut cyclic = false;
        let mut current = Some(folder_id.to_string());

        while let Some(id) = current {
            if id.is_empty() || id == "0" {
                break;
            }
            if !visited.insert(id.clone()) {
                cyclic = true;
                break;
            }
            match self.folders.get(&id) {
                Some(folder) => {
                    segments.push(folder.name.clone());
                    current = folder.parent_id.clone();
                }
                None => {
                    segments.push(format!("(unknown:{})", id));
                    self.missing
                        .lock()
                        .expect("breadcrumb missing set poisoned")
                        .insert(id);
                    break;
                }
            }
        }

        segments.reverse();
        let breadcrumb = Breadcrumb {
            path: segments.join(&self.separator),
            cyclic,
        };
        self.resolved
            .lock()
            .expect("breadcrumb cache poisoned")
            .insert(folder_id.to_string(), breadcrumb.clone());
        breadcrumb
    }

    /// Folder ids that were referenced but absent from the map.
    pub fn missing_ids(&self) -> HashSet<String> {
        self.missing
            .lock()
            .expect("breadcrumb missing set poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder_map(folders: Vec<Folder>) -> Arc<HashMap<String, Folder>> {
        Arc::new(folders.into_iter().map(|f| (f.id.clone(), f)).collect())
    }

    #[test]
    fn resolves_root_to_leaf() {
        let builder = BreadcrumbBuilder::new(folder_map(vec![
            Folder::new("1", "Marketing"),
            Folder::new("2", "Campaigns").with_parent("1"),
            Folder::new("3", "2025 Q1").with_parent("2"),
        ]));
        let crumb = builder.build("3");
        assert_eq!(crumb.path, "Marketing > Campaigns > 2025 Q1");
        assert!(!crumb.cyclic);
    }

    #[test]
    fn empty_and_zero_ids_resolve_to_empty_path() {
        let builder = BreadcrumbBuilder::new(folder_map(vec![]));
        assert_eq!(builder.build("").path, "");
        assert_eq!(builder.build("0").path, "");
    }

    #[test]
    fn missing_parent_terminates_with_unknown_segment() {
        let builder = BreadcrumbBuilder::new(folder_map(vec![
            Folder::new("5", "Orphaned").with_parent("99"),
        ]));
        let crumb = builder.build("5");
        assert_eq!(crumb.path, "(unknown:99) > Orphaned");
        assert!(builder.missing_ids().contains("99"));
    }

    #[test]
    fn cycle_terminates_and_is_flagged() {
        let builder = BreadcrumbBuilder::new(folder_map(vec![
            Folder::new("a", "A").with_parent("b"),
            Folder::new("b", "B").with_parent("a"),
        ]));
        let crumb = builder.build("a");
        assert!(crumb.cyclic);
        // Walk visited A then B, then stopped at the revisit of A.
        assert_eq!(crumb.path, "B > A");

        // Entering the same cycle from the other node also terminates.
        let other = builder.build("b");
        assert!(other.cyclic);
    }

    #[test]
    fn memoizes_resolved_paths() {
        let builder = BreadcrumbBuilder::new(folder_map(vec![
            Folder::new("1", "Top"),
            Folder::new("2", "Nested").with_parent("1"),
        ]));
        let first = builder.build("2");
        let second = builder.build("2");
        assert_eq!(first, second);
    }

    #[test]
    fn custom_separator() {
        let builder = BreadcrumbBuilder::with_separator(
            folder_map(vec![
                Folder::new("1", "Top"),
                Folder::new("2", "Nested").with_parent("1"),
            ]),
            "/",
        );
        assert_eq!(builder.build("2").path, "Top/Nested");
    }
}
