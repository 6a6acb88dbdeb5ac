//! In-process document database.
//!
//! [`MemoryDatabase`] plays the role of the process-wide storage session: it
//! is opened once at startup, owns a set of named [`MemoryCollection`]s and is
//! closed on shutdown, after which every operation fails with
//! [`StoreError::Closed`].
//!
//! Documents are held JSON-encoded, so reads decode on the way out and a
//! corrupt document surfaces as [`StoreError::Decode`] exactly like it would
//! from a remote document store.

use super::{BlogCursor, BlogDocument, BlogStore, StoreError, StoreResult};
use blog_core::types::BlogId;
use parking_lot::RwLock;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

/// Name of the collection holding blog posts.
pub const BLOGS: &str = "blogs";

/// Name of the collection holding authors. Registered at startup, unused by
/// the service.
pub const AUTHORS: &str = "authors";

type Documents = Arc<RwLock<BTreeMap<BlogId, Vec<u8>>>>;

/// A database session holding named collections.
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
    open: Arc<AtomicBool>,
}

impl MemoryDatabase {
    /// Opens an empty database session.
    pub fn open(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::debug!("Opened database session {name}");
        Self {
            name,
            collections: RwLock::new(HashMap::new()),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Registers a collection, returning the existing one if the name is
    /// already taken.
    pub fn add_collection(&self, name: &str) -> Arc<MemoryCollection> {
        let mut collections = self.collections.write();
        let collection = collections.entry(name.to_string()).or_insert_with(|| {
            Arc::new(MemoryCollection {
                name: name.to_string(),
                docs: Arc::default(),
                open: Arc::clone(&self.open),
                open_cursors: Arc::default(),
            })
        });
        Arc::clone(collection)
    }

    /// Looks up a registered collection.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] once the session is closed, and
    /// [`StoreError::UnknownCollection`] for names never registered.
    pub fn collection(&self, name: &str) -> StoreResult<Arc<MemoryCollection>> {
        if !self.is_open() {
            return Err(StoreError::Closed);
        }
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }

    /// Closes the session. Collections handed out earlier stay allocated but
    /// reject every further operation.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::info!("Closed database session {}", self.name);
        }
    }
}

/// A collection of JSON-encoded blog documents ordered by id.
pub struct MemoryCollection {
    name: String,
    docs: Documents,
    open: Arc<AtomicBool>,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Number of cursors opened and not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::Acquire)
    }

    /// Stores pre-encoded bytes under `id` without validating them.
    pub fn insert_encoded(&self, id: BlogId, raw: Vec<u8>) -> StoreResult<()> {
        self.ensure_open()?;
        self.docs.write().insert(id, raw);
        Ok(())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }
}

fn encode(doc: &BlogDocument) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|e| StoreError::Encode {
        id: doc.id,
        reason: e.to_string(),
    })
}

fn decode(id: BlogId, raw: &[u8]) -> StoreResult<BlogDocument> {
    serde_json::from_slice(raw).map_err(|e| StoreError::Decode {
        id,
        reason: e.to_string(),
    })
}

impl BlogStore for MemoryCollection {
    fn insert(&self, doc: &BlogDocument) -> StoreResult<()> {
        self.ensure_open()?;
        let raw = encode(doc)?;
        let mut docs = self.docs.write();
        if docs.contains_key(&doc.id) {
            return Err(StoreError::Duplicate(doc.id));
        }
        docs.insert(doc.id, raw);
        Ok(())
    }

    fn find_by_id(&self, id: &BlogId) -> StoreResult<BlogDocument> {
        self.ensure_open()?;
        let docs = self.docs.read();
        let raw = docs.get(id).ok_or(StoreError::NotFound(*id))?;
        decode(*id, raw)
    }

    fn find_with_limit(&self, limit: usize) -> StoreResult<Box<dyn BlogCursor>> {
        self.ensure_open()?;
        self.open_cursors.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryCursor {
            docs: Arc::clone(&self.docs),
            open: Arc::clone(&self.open),
            open_cursors: Arc::clone(&self.open_cursors),
            last: None,
            remaining: (limit > 0).then_some(limit),
            closed: false,
        }))
    }

    fn replace_by_id(&self, id: &BlogId, doc: &BlogDocument) -> StoreResult<()> {
        self.ensure_open()?;
        let raw = encode(doc)?;
        let mut docs = self.docs.write();
        match docs.get_mut(id) {
            Some(slot) => {
                *slot = raw;
                Ok(())
            }
            None => Err(StoreError::NotFound(*id)),
        }
    }

    fn remove_by_id(&self, id: &BlogId) -> StoreResult<()> {
        self.ensure_open()?;
        match self.docs.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(*id)),
        }
    }
}

/// Cursor that walks the collection in id order.
///
/// The read lock is taken per step rather than for the whole scan, so writes
/// made by other callers during iteration may or may not be observed.
struct MemoryCursor {
    docs: Documents,
    open: Arc<AtomicBool>,
    open_cursors: Arc<AtomicUsize>,
    last: Option<BlogId>,
    remaining: Option<usize>,
    closed: bool,
}

impl BlogCursor for MemoryCursor {
    fn next_document(&mut self) -> Option<StoreResult<BlogDocument>> {
        if self.closed || self.remaining == Some(0) {
            return None;
        }
        if !self.open.load(Ordering::Acquire) {
            return Some(Err(StoreError::Closed));
        }

        let (id, raw) = {
            let docs = self.docs.read();
            let lower = match &self.last {
                Some(last) => Bound::Excluded(last),
                None => Bound::Unbounded,
            };
            let (id, raw) = docs.range((lower, Bound::Unbounded)).next()?;
            (*id, raw.clone())
        };

        self.last = Some(id);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(decode(id, &raw))
    }

    fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            self.closed = true;
            self.open_cursors.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }
}
