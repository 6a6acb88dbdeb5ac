use crate::server::bridge::CallContext;
use blog_core::{Error, Result, proto::ListBlogResponse};
use tokio::sync::{mpsc, oneshot};
use tonic::Status;

/// Forwards exported records to the client stream until the export ends.
///
/// This is the async half of a list call. It owns the call's
/// [`CallContext`] and races three things on every step: the call being
/// cancelled, the client dropping the response stream, and the next record
/// arriving from the worker.
///
/// # Arguments
///
/// - `ctx`: Cancellation scope of the call. Dropped on return, which cancels
///   the worker if it is still running.
/// - `record_rx`: Private channel fed by the worker.
/// - `done_rx`: Private completion signal of the worker.
/// - `resp_tx`: Channel backing the gRPC response stream.
///
/// # Behavior
///
/// - On success every record has been forwarded and `resp_tx` is dropped,
///   closing the stream without an error.
/// - On failure or cancellation exactly one terminal [`Status`] is sent and
///   nothing is forwarded after it.
/// - If the client is gone nothing more is sent.
pub async fn forward_records(
    ctx: CallContext,
    mut record_rx: mpsc::Receiver<ListBlogResponse>,
    done_rx: oneshot::Receiver<Result<usize>>,
    resp_tx: mpsc::Sender<core::result::Result<ListBlogResponse, Status>>,
) -> Result<usize> {
    let mut forwarded = 0;

    loop {
        let msg = tokio::select! {
            biased;
            err = ctx.cancelled() => return fail(&resp_tx, err).await,
            () = resp_tx.closed() => return Err(client_gone(forwarded)),
            msg = record_rx.recv() => msg,
        };

        // The worker drops its sender when it returns.
        let Some(msg) = msg else {
            break;
        };

        tokio::select! {
            biased;
            err = ctx.cancelled() => return fail(&resp_tx, err).await,
            sent = resp_tx.send(Ok(msg)) => {
                if sent.is_err() {
                    return Err(client_gone(forwarded));
                }
                forwarded += 1;
            }
        }
    }

    let outcome = crate::server::bridge::resolve(&ctx, done_rx).await;
    match outcome {
        Ok(exported) => {
            tracing::debug!("Stream completed with {exported} records");
            Ok(exported)
        }
        Err(err) => fail(&resp_tx, err).await,
    }
}

fn client_gone(forwarded: usize) -> Error {
    tracing::debug!("Client stream closed after {forwarded} records");
    Error::ChannelError {
        context: "client stream closed".to_string(),
    }
}

/// Sends the terminal error to the client, best effort, and returns it.
async fn fail(
    resp_tx: &mpsc::Sender<core::result::Result<ListBlogResponse, Status>>,
    err: Error,
) -> Result<usize> {
    if let Err(_e) = resp_tx.send(Err(err.clone().into())).await {
        tracing::debug!("Failed to forward terminal error: {err}");
    }
    Err(err)
}
