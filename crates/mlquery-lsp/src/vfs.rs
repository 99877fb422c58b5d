//! Virtual File System for document management.
//!
//! The VFS maintains the in-memory state of all open query documents so a
//! run command can use the editor's current text, including unsaved edits.

use ropey::Rope;
use std::collections::HashMap;

/// A document in the virtual file system.
#[derive(Debug)]
pub struct Document {
    /// The document content as a rope for efficient editing.
    content: Rope,
    /// The document version (incremented on each change).
    version: i32,
}

impl Document {
    /// Create a new document with the given content.
    pub fn new(content: &str, version: i32) -> Self {
        Self {
            content: Rope::from_str(content),
            version,
        }
    }

    /// Get the document content as a string.
    pub fn text(&self) -> String {
        self.content.to_string()
    }

    /// Get the document version.
    pub const fn version(&self) -> i32 {
        self.version
    }

    /// Update the document content.
    pub fn update(&mut self, content: &str, version: i32) {
        self.content = Rope::from_str(content);
        self.version = version;
    }
}

/// Virtual file system for managing open documents.
#[derive(Debug, Default)]
pub struct Vfs {
    /// Open documents indexed by URI.
    documents: HashMap<String, Document>,
}

impl Vfs {
    /// Create a new empty VFS.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document in the VFS.
    pub fn open(&mut self, uri: &str, content: &str, version: i32) {
        self.documents
            .insert(uri.to_string(), Document::new(content, version));
    }

    /// Close a document in the VFS.
    pub fn close(&mut self, uri: &str) {
        self.documents.remove(uri);
    }

    /// Get a document by URI.
    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.documents.get(uri)
    }

    /// Update a document's content.
    pub fn update(&mut self, uri: &str, content: &str, version: i32) {
        if let Some(doc) = self.documents.get_mut(uri) {
            doc.update(content, version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vfs_open_close() {
        let mut vfs = Vfs::new();
        let uri = "file:///test.xqy";

        vfs.open(uri, "xquery version \"1.0-ml\"; 1 + 1", 1);
        assert!(vfs.get(uri).is_some());

        vfs.close(uri);
        assert!(vfs.get(uri).is_none());
    }

    #[test]
    fn test_vfs_update() {
        let mut vfs = Vfs::new();
        let uri = "untitled:Untitled-1";

        vfs.open(uri, "1", 1);
        vfs.update(uri, "2", 2);

        let doc = vfs.get(uri).unwrap();
        assert_eq!(doc.text(), "2");
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn test_update_of_unknown_document_is_ignored() {
        let mut vfs = Vfs::new();
        vfs.update("file:///missing.xqy", "x", 3);
        assert!(vfs.get("file:///missing.xqy").is_none());
    }
}
