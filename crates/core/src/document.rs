//! In-memory document view the cleanup engine operates on.
//!
//! This is deliberately not a PDF file parser: callers hand the engine an
//! already-dereferenced, acyclic page view (content bytes, resource
//! dictionaries, annotation dictionaries) and read the rewritten state back
//! out. The only document-global pieces are the access mode and an optional
//! structure tree for tagged documents.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{CleanupError, Result};
use crate::model::{PdfDict, PdfObject};
use crate::utils::Rect;

/// How the document was opened. Cleanup rewrites pages in place, so it
/// refuses to start on a read-only view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// One page: content stream bytes plus the dictionaries cleanup reads and
/// rewrites.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Concatenated content stream bytes (already filter-decoded).
    pub content: Vec<u8>,
    /// Page resource dictionary (/Font, /XObject, /ExtGState, ...).
    pub resources: PdfDict,
    /// Annotation dictionaries, in /Annots order.
    pub annotations: Vec<PdfDict>,
    /// /MediaBox in default user space.
    pub media_box: Rect,
    /// /Rotate, in degrees (multiples of 90).
    pub rotation: i64,
}

impl Page {
    pub fn new(content: impl Into<Vec<u8>>, resources: PdfDict, media_box: Rect) -> Self {
        Self {
            content: content.into(),
            resources,
            annotations: Vec::new(),
            media_box,
            rotation: 0,
        }
    }

    /// Look up a subdictionary of /Resources (e.g. "XObject", "ExtGState").
    pub fn resource_dict(&self, category: &str) -> Option<&PdfDict> {
        self.resources.get(category).and_then(|o| o.as_dict().ok())
    }

    /// Look up a named entry inside a resource category.
    pub fn resource(&self, category: &str, name: &str) -> Option<&PdfObject> {
        self.resource_dict(category).and_then(|d| d.get(name))
    }
}

/// Structure-tree stub for tagged documents.
///
/// Tracks which (page, MCID) content items still have a structure parent.
/// Cleanup removes the item when it drops the marked-content sequence that
/// carried it; an item with no parent is a recovered inconsistency, not an
/// error.
#[derive(Debug, Clone, Default)]
pub struct StructTree {
    parents: FxHashMap<(usize, i64), ()>,
}

impl StructTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a content item under its structure parent.
    pub fn add_content_item(&mut self, page: usize, mcid: i64) {
        self.parents.insert((page, mcid), ());
    }

    pub fn contains(&self, page: usize, mcid: i64) -> bool {
        self.parents.contains_key(&(page, mcid))
    }

    /// Remove the content item for a dropped marked-content sequence.
    pub fn remove_content_item(&mut self, page: usize, mcid: i64) -> Result<()> {
        if self.parents.remove(&(page, mcid)).is_none() {
            return Err(CleanupError::StructureInconsistency);
        }
        Ok(())
    }
}

/// The document view handed to [`clean_up`](crate::cleanup::clean_up).
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    pub access: AccessMode,
    /// Present when the document is tagged.
    pub struct_tree: Option<StructTree>,
}

impl Document {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            access: AccessMode::ReadWrite,
            struct_tree: None,
        }
    }

    pub fn page(&self, index: usize) -> Result<&Page> {
        self.pages
            .get(index)
            .ok_or(CleanupError::PageNotFound(index))
    }

    pub fn page_mut(&mut self, index: usize) -> Result<&mut Page> {
        self.pages
            .get_mut(index)
            .ok_or(CleanupError::PageNotFound(index))
    }

    /// Drop the structure content item for a removed tag, silently
    /// tolerating items the tree never knew about.
    pub fn remove_struct_item(&mut self, page: usize, mcid: i64) {
        if let Some(tree) = self.struct_tree.as_mut()
            && tree.remove_content_item(page, mcid).is_err()
        {
            debug!(page, mcid, "marked content item had no structure parent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_item_removal() {
        let mut tree = StructTree::new();
        tree.add_content_item(0, 3);
        assert!(tree.remove_content_item(0, 3).is_ok());
        assert!(tree.remove_content_item(0, 3).is_err(), "second removal has no parent");
    }

    #[test]
    fn test_missing_struct_item_is_silent() {
        let mut doc = Document::new(vec![Page::default()]);
        doc.struct_tree = Some(StructTree::new());
        doc.remove_struct_item(0, 99);
    }
}
