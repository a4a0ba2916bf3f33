//! Folder hierarchy records.

use serde::{Deserialize, Serialize};

/// A folder node. Folder maps form forests keyed by content type; a cycle
/// in the parent chain is a data error the breadcrumb builder survives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            content_type: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// True for top-of-forest nodes (no parent, or the platform's "0").
    pub fn is_root(&self) -> bool {
        match self.parent_id.as_deref() {
            None | Some("") | Some("0") => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_detection_treats_zero_as_no_parent() {
        assert!(Folder::new("1", "root").is_root());
        assert!(Folder::new("1", "root").with_parent("0").is_root());
        assert!(!Folder::new("2", "child").with_parent("1").is_root());
    }
}
