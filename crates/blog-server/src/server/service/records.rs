//! Storage operations behind each call.
//!
//! These run on the worker side of the [`RequestBridge`], so they are plain
//! blocking functions. Each one maps backend failures onto the service's error
//! taxonomy and logs a failure once, where it is detected.
//!
//! [`RequestBridge`]: crate::server::bridge::RequestBridge

use crate::server::{
    gate::MutationGate,
    store::{BlogDocument, BlogStore, StoreError},
};
use blog_core::{Error, Result, proto::Blog, types::BlogId};

/// Inserts a new post under a freshly generated id.
pub fn create_record(store: &dyn BlogStore, blog: Blog) -> Result<BlogDocument> {
    let doc = BlogDocument::from_wire(BlogId::generate(), blog);
    store.insert(&doc).map_err(|e| {
        tracing::error!(blog_id = %doc.id, "Failed to insert blog: {e}");
        Error::internal(format!("failed to insert blog: {e}"))
    })?;
    Ok(doc)
}

pub fn read_record(store: &dyn BlogStore, id: BlogId) -> Result<BlogDocument> {
    store.find_by_id(&id).map_err(|e| lookup_error(id, e))
}

/// Replaces every field of an existing post, holding `gate` across the
/// lookup and the replace.
pub fn update_record(
    store: &dyn BlogStore,
    gate: &MutationGate,
    doc: BlogDocument,
) -> Result<BlogDocument> {
    gate.run(|| {
        store.find_by_id(&doc.id).map_err(|e| lookup_error(doc.id, e))?;
        store
            .replace_by_id(&doc.id, &doc)
            .map_err(|e| write_error(doc.id, e))
    })?;
    Ok(doc)
}

/// Permanently removes a post, holding `gate` across the removal.
pub fn delete_record(store: &dyn BlogStore, gate: &MutationGate, id: BlogId) -> Result<BlogId> {
    gate.run(|| store.remove_by_id(&id).map_err(|e| write_error(id, e)))?;
    Ok(id)
}

fn lookup_error(id: BlogId, err: StoreError) -> Error {
    match err {
        StoreError::NotFound(_) => {
            tracing::debug!(blog_id = %id, "Blog not found");
            Error::NotFound { id: id.to_hex() }
        }
        err => {
            tracing::error!(blog_id = %id, "Failed to look up blog: {err}");
            Error::unavailable(format!("failed to look up blog {id}: {err}"))
        }
    }
}

fn write_error(id: BlogId, err: StoreError) -> Error {
    match err {
        StoreError::NotFound(_) => {
            tracing::debug!(blog_id = %id, "Blog vanished before the write");
            Error::NotFound { id: id.to_hex() }
        }
        err => {
            tracing::error!(blog_id = %id, "Failed to write blog: {err}");
            Error::internal(format!("failed to write blog {id}: {err}"))
        }
    }
}
