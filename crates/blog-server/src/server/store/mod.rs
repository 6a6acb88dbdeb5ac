//! Document store collaborator.
//!
//! The service talks to storage through the synchronous [`BlogStore`] trait:
//! one logical collection of blog documents keyed by [`BlogId`], supporting
//! insert, find-by-id, a limited cursor scan, replace-by-id and remove-by-id.
//! Every operation either succeeds, reports [`StoreError::NotFound`], or fails
//! with another [`StoreError`]. Nothing else about the backend's consistency
//! model is assumed.
//!
//! Calls are blocking and are expected to run on a worker thread, never on
//! the async dispatch task.
//!
//! ## Submodules
//!
//! - [`memory`] - In-process database session with named collections.

pub mod memory;

use blog_core::{proto::Blog, types::BlogId};
use serde::{Deserialize, Serialize};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a [`BlogStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document is stored under the id.
    #[error("document {0} not found")]
    NotFound(BlogId),

    /// A document with the same id is already stored.
    #[error("document {0} already exists")]
    Duplicate(BlogId),

    /// A stored document could not be decoded.
    #[error("failed to decode document {id}: {reason}")]
    Decode { id: BlogId, reason: String },

    /// A document could not be encoded for storage.
    #[error("failed to encode document {id}: {reason}")]
    Encode { id: BlogId, reason: String },

    /// The named collection was never registered with the session.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// The database session has been closed.
    #[error("database session is closed")]
    Closed,
}

/// Stored form of a blog post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogDocument {
    #[serde(rename = "_id")]
    pub id: BlogId,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl BlogDocument {
    /// Builds a document from wire fields under an id chosen by the caller.
    /// Any id carried by `blog` itself is ignored.
    pub fn from_wire(id: BlogId, blog: Blog) -> Self {
        Self {
            id,
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        }
    }
}

impl From<BlogDocument> for Blog {
    fn from(doc: BlogDocument) -> Self {
        Self {
            id: doc.id.to_hex(),
            author_id: doc.author_id,
            title: doc.title,
            content: doc.content,
        }
    }
}

/// A single collection of blog documents.
pub trait BlogStore: Send + Sync + 'static {
    /// Inserts a new document.
    fn insert(&self, doc: &BlogDocument) -> StoreResult<()>;

    /// Fetches the document stored under `id`.
    fn find_by_id(&self, id: &BlogId) -> StoreResult<BlogDocument>;

    /// Opens a cursor over at most `limit` documents. A `limit` of zero
    /// means no limit.
    fn find_with_limit(&self, limit: usize) -> StoreResult<Box<dyn BlogCursor>>;

    /// Replaces every field of the document stored under `id`.
    fn replace_by_id(&self, id: &BlogId, doc: &BlogDocument) -> StoreResult<()>;

    /// Permanently removes the document stored under `id`.
    fn remove_by_id(&self, id: &BlogId) -> StoreResult<()>;
}

/// Handle over a bounded result set. Owns backend resources until closed.
pub trait BlogCursor: Send {
    /// Advances the cursor. `None` once the result set is exhausted.
    fn next_document(&mut self) -> Option<StoreResult<BlogDocument>>;

    /// Releases the cursor's resources. Calling it more than once is a no-op.
    fn close(&mut self) -> StoreResult<()>;
}

/// Closes the wrapped cursor when dropped, whichever way iteration ends.
pub struct CursorGuard {
    cursor: Box<dyn BlogCursor>,
}

impl CursorGuard {
    pub fn new(cursor: Box<dyn BlogCursor>) -> Self {
        Self { cursor }
    }
}

impl Iterator for CursorGuard {
    type Item = StoreResult<BlogDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_document()
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        if let Err(e) = self.cursor.close() {
            tracing::error!("Failed to close cursor: {e}");
        }
    }
}
