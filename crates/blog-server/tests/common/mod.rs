#![allow(dead_code)]

use blog_core::{proto::Blog, types::BlogId};
use blog_server::server::{
    config::ServerConfig,
    service::handler::BlogService,
    store::{
        BlogCursor, BlogDocument, BlogStore, StoreResult,
        memory::{BLOGS, MemoryCollection, MemoryDatabase},
    },
};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a collection and counts every storage call made through it.
pub struct CountingStore {
    inner: Arc<MemoryCollection>,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<MemoryCollection>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::AcqRel);
    }
}

impl BlogStore for CountingStore {
    fn insert(&self, doc: &BlogDocument) -> StoreResult<()> {
        self.hit();
        self.inner.insert(doc)
    }

    fn find_by_id(&self, id: &BlogId) -> StoreResult<BlogDocument> {
        self.hit();
        self.inner.find_by_id(id)
    }

    fn find_with_limit(&self, limit: usize) -> StoreResult<Box<dyn BlogCursor>> {
        self.hit();
        self.inner.find_with_limit(limit)
    }

    fn replace_by_id(&self, id: &BlogId, doc: &BlogDocument) -> StoreResult<()> {
        self.hit();
        self.inner.replace_by_id(id, doc)
    }

    fn remove_by_id(&self, id: &BlogId) -> StoreResult<()> {
        self.hit();
        self.inner.remove_by_id(id)
    }
}

/// Sleeps before every storage call.
pub struct SlowStore {
    inner: Arc<MemoryCollection>,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: Arc<MemoryCollection>, delay: Duration) -> Arc<Self> {
        Arc::new(Self { inner, delay })
    }
}

impl BlogStore for SlowStore {
    fn insert(&self, doc: &BlogDocument) -> StoreResult<()> {
        std::thread::sleep(self.delay);
        self.inner.insert(doc)
    }

    fn find_by_id(&self, id: &BlogId) -> StoreResult<BlogDocument> {
        std::thread::sleep(self.delay);
        self.inner.find_by_id(id)
    }

    fn find_with_limit(&self, limit: usize) -> StoreResult<Box<dyn BlogCursor>> {
        std::thread::sleep(self.delay);
        self.inner.find_with_limit(limit)
    }

    fn replace_by_id(&self, id: &BlogId, doc: &BlogDocument) -> StoreResult<()> {
        std::thread::sleep(self.delay);
        self.inner.replace_by_id(id, doc)
    }

    fn remove_by_id(&self, id: &BlogId) -> StoreResult<()> {
        std::thread::sleep(self.delay);
        self.inner.remove_by_id(id)
    }
}

pub fn collection() -> Arc<MemoryCollection> {
    MemoryDatabase::open("blog_system_test").add_collection(BLOGS)
}

pub fn service_over(store: Arc<dyn BlogStore>) -> BlogService {
    BlogService::new(store, ServerConfig::default())
}

pub fn blog(author_id: &str, title: &str, content: &str) -> Blog {
    Blog {
        id: String::new(),
        author_id: author_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
