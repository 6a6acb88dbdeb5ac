//! gRPC service implementation for blog posts.
//!
//! This module defines [`BlogService`], the concrete implementation of the
//! [`BlogSystem`] gRPC service defined in the protobuf schema. Unary calls run
//! their storage operation through the [`RequestBridge`]; `ListBlog` hands the
//! call over to the [`StreamExporter`].
//!
//! ## Responsibilities
//!
//! - Validate record identifiers before any storage access.
//! - Serialize updates and deletes through their [`MutationGate`]s.
//! - Map failures onto the client-facing error categories.
//! - Track in-flight calls so shutdown can drain them.

use crate::server::{
    bridge::{CallContext, RequestBridge},
    config::ServerConfig,
    gate::{MutationGate, MutationKind},
    service::records::{create_record, delete_record, read_record, update_record},
    store::{BlogDocument, BlogStore},
    streaming::{ExportStream, StreamExporter},
    telemetry::{increment_request_errors, increment_requests},
};
use blog_core::{
    Error, Result,
    proto::{
        CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
        ListBlogRequest, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest, UpdateBlogResponse,
        blog_system_server::BlogSystem,
    },
    types::BlogId,
};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, metadata::MetadataMap};

const CREATE: &str = "create_blog";
const READ: &str = "read_blog";
const UPDATE: &str = "update_blog";
const DELETE: &str = "delete_blog";
const LIST: &str = "list_blog";

/// gRPC service for creating, reading, updating, deleting and listing blog
/// posts.
///
/// Cloning is cheap; every clone shares the same store, gates and in-flight
/// counter.
#[derive(Clone)]
pub struct BlogService {
    config: ServerConfig,
    store: Arc<dyn BlogStore>,
    bridge: RequestBridge,
    exporter: StreamExporter,
    update_gate: Arc<MutationGate>,
    delete_gate: Arc<MutationGate>,
    inflight: Arc<AtomicUsize>,
}

/// Keeps a call counted as in flight until dropped.
struct InflightGuard(Arc<AtomicUsize>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BlogService {
    /// Creates a service over `store`.
    pub fn new(store: Arc<dyn BlogStore>, config: ServerConfig) -> Self {
        let bridge = RequestBridge::new(CancellationToken::new(), config.default_timeout);
        let exporter = StreamExporter::new(Arc::clone(&store), config.stream_buffer_size);

        Self {
            config,
            store,
            bridge,
            exporter,
            update_gate: Arc::new(MutationGate::new(MutationKind::Update)),
            delete_gate: Arc::new(MutationGate::new(MutationKind::Delete)),
            inflight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of calls currently being served, open list streams included.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Gracefully stops the service.
    ///
    /// New calls are refused with `UNAVAILABLE` right away. Calls already
    /// running get up to the configured shutdown timeout to finish, after
    /// which whatever remains is cancelled.
    pub async fn shutdown(&self) {
        self.bridge.refuse_new_calls();
        tracing::info!("Refusing new calls, draining {} in flight", self.inflight());

        let drain = async {
            while self.inflight() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        match tokio::time::timeout(self.config.shutdown_timeout, drain).await {
            Ok(()) => tracing::debug!("All calls drained"),
            Err(_) => tracing::warn!(
                "Shutdown timeout elapsed with {} calls in flight, cancelling them",
                self.inflight()
            ),
        }

        self.bridge.cancel_all();
    }

    fn track(&self) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        InflightGuard(Arc::clone(&self.inflight))
    }

    async fn create(&self, metadata: &MetadataMap, req: CreateBlogRequest) -> Result<BlogDocument> {
        let blog = req.blog.unwrap_or_default();
        let ctx = self.bridge.open(metadata)?;
        let store = Arc::clone(&self.store);
        self.bridge
            .run(&ctx, move |_| create_record(store.as_ref(), blog))
            .await
    }

    async fn read(&self, metadata: &MetadataMap, req: ReadBlogRequest) -> Result<BlogDocument> {
        let id = parse_id(&req.blog_id)?;
        let ctx = self.bridge.open(metadata)?;
        let store = Arc::clone(&self.store);
        self.bridge
            .run(&ctx, move |_| read_record(store.as_ref(), id))
            .await
    }

    async fn update(&self, metadata: &MetadataMap, req: UpdateBlogRequest) -> Result<BlogDocument> {
        let blog = req.blog.ok_or_else(|| {
            tracing::debug!("Rejected update without a blog");
            Error::InvalidRequest {
                reason: "blog must be set".to_string(),
            }
        })?;
        let id = parse_id(&blog.id)?;
        let doc = BlogDocument::from_wire(id, blog);

        let ctx = self.bridge.open(metadata)?;
        let store = Arc::clone(&self.store);
        let gate = Arc::clone(&self.update_gate);
        self.bridge
            .run(&ctx, move |_| update_record(store.as_ref(), &gate, doc))
            .await
    }

    async fn delete(&self, metadata: &MetadataMap, req: DeleteBlogRequest) -> Result<BlogId> {
        let id = parse_id(&req.blog_id)?;
        let ctx = self.bridge.open(metadata)?;
        let store = Arc::clone(&self.store);
        let gate = Arc::clone(&self.delete_gate);
        self.bridge
            .run(&ctx, move |_| delete_record(store.as_ref(), &gate, id))
            .await
    }

    fn open_list(&self, metadata: &MetadataMap) -> Result<CallContext> {
        self.bridge.open(metadata)
    }
}

fn parse_id(raw: &str) -> Result<BlogId> {
    BlogId::parse(raw).map_err(|e| {
        tracing::debug!("Rejected blog id {raw:?}: {e}");
        Error::from(e)
    })
}

/// Builds the response for a unary call, counting the failure if any.
fn respond<T, R>(
    operation: &'static str,
    outcome: Result<T>,
    into: impl FnOnce(T) -> R,
) -> core::result::Result<Response<R>, Status> {
    match outcome {
        Ok(value) => Ok(Response::new(into(value))),
        Err(e) => {
            increment_request_errors(operation, e.kind());
            Err(e.into())
        }
    }
}

#[tonic::async_trait]
impl BlogSystem for BlogService {
    type ListBlogStream = ExportStream;

    #[tracing::instrument(skip_all)]
    async fn create_blog(
        &self,
        req: Request<CreateBlogRequest>,
    ) -> core::result::Result<Response<CreateBlogResponse>, Status> {
        let _inflight = self.track();
        increment_requests(CREATE);

        let (metadata, _, req) = req.into_parts();
        let outcome = self.create(&metadata, req).await;
        respond(CREATE, outcome, |doc| CreateBlogResponse {
            blog: Some(doc.into()),
        })
    }

    #[tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id))]
    async fn read_blog(
        &self,
        req: Request<ReadBlogRequest>,
    ) -> core::result::Result<Response<ReadBlogResponse>, Status> {
        let _inflight = self.track();
        increment_requests(READ);

        let (metadata, _, req) = req.into_parts();
        let outcome = self.read(&metadata, req).await;
        respond(READ, outcome, |doc| ReadBlogResponse {
            blog: Some(doc.into()),
        })
    }

    #[tracing::instrument(
        skip_all,
        fields(blog_id = req.get_ref().blog.as_ref().map(|b| b.id.as_str()).unwrap_or_default())
    )]
    async fn update_blog(
        &self,
        req: Request<UpdateBlogRequest>,
    ) -> core::result::Result<Response<UpdateBlogResponse>, Status> {
        let _inflight = self.track();
        increment_requests(UPDATE);

        let (metadata, _, req) = req.into_parts();
        let outcome = self.update(&metadata, req).await;
        respond(UPDATE, outcome, |doc| UpdateBlogResponse {
            blog: Some(doc.into()),
        })
    }

    #[tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id))]
    async fn delete_blog(
        &self,
        req: Request<DeleteBlogRequest>,
    ) -> core::result::Result<Response<DeleteBlogResponse>, Status> {
        let _inflight = self.track();
        increment_requests(DELETE);

        let (metadata, _, req) = req.into_parts();
        let outcome = self.delete(&metadata, req).await;
        respond(DELETE, outcome, |id| DeleteBlogResponse {
            blog_id: id.to_hex(),
        })
    }

    /// Streams stored posts in id order, at most `limit` of them (zero means
    /// all). The call stays counted as in flight until the stream ends.
    #[tracing::instrument(skip_all, fields(limit = req.get_ref().limit))]
    async fn list_blog(
        &self,
        req: Request<ListBlogRequest>,
    ) -> core::result::Result<Response<Self::ListBlogStream>, Status> {
        let inflight = self.track();
        increment_requests(LIST);

        let ctx = match self.open_list(req.metadata()) {
            Ok(ctx) => ctx,
            Err(e) => return respond(LIST, Err(e), |stream: ExportStream| stream),
        };
        let limit = usize::try_from(req.get_ref().limit).unwrap_or(usize::MAX);

        Ok(Response::new(self.exporter.export(ctx, limit, inflight)))
    }
}
