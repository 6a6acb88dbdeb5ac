//! Streaming export of stored records.
//!
//! A list call is split in two halves that only talk through channels created
//! for that call:
//!
//! - [`processor`] - blocking worker that walks the storage cursor and builds
//!   one message per record;
//! - [`coordinator`] - async task that forwards those messages to the client
//!   while watching for cancellation and disconnects.

pub mod coordinator;
pub mod processor;

use crate::server::{
    bridge::{CallContext, spawn_worker},
    store::BlogStore,
    telemetry::{
        decrement_streams_inflight, increment_records_streamed, increment_request_errors,
        increment_streams_inflight, record_stream_duration,
    },
};
use blog_core::proto::ListBlogResponse;
use coordinator::forward_records;
use processor::export_records;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

pub type ExportStream = ReceiverStream<Result<ListBlogResponse, Status>>;

/// Streams bounded scans of a [`BlogStore`] to clients.
#[derive(Clone)]
pub struct StreamExporter {
    store: Arc<dyn BlogStore>,
    buffer_size: usize,
}

impl StreamExporter {
    pub fn new(store: Arc<dyn BlogStore>, buffer_size: usize) -> Self {
        Self {
            store,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Starts exporting up to `limit` records (zero means no limit) and
    /// returns the response stream.
    ///
    /// `held` is kept alive until the coordinator is done, whatever the
    /// outcome.
    pub fn export<G>(&self, ctx: CallContext, limit: usize, held: G) -> ExportStream
    where
        G: Send + 'static,
    {
        let (record_tx, record_rx) = mpsc::channel(self.buffer_size);
        let (resp_tx, resp_rx) = mpsc::channel(self.buffer_size);

        let store = Arc::clone(&self.store);
        let done_rx = spawn_worker(ctx.token().clone(), move |token| {
            export_records(store.as_ref(), limit, &record_tx, token)
        });

        let start = std::time::Instant::now();
        increment_streams_inflight();

        let fut = async move {
            match forward_records(ctx, record_rx, done_rx, resp_tx).await {
                Ok(count) => {
                    increment_records_streamed(count as u64);
                    record_stream_duration(start.elapsed().as_millis() as f64);
                }
                Err(e) => {
                    increment_request_errors("list_blog", e.kind());
                    tracing::warn!("List stream ended early: {e}");
                }
            }
            decrement_streams_inflight();
            drop(held);
        };
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("streaming", limit);
            fut.instrument(span)
        };
        tokio::spawn(fut);

        ReceiverStream::new(resp_rx)
    }
}
