use crate::server::store::{BlogStore, CursorGuard};
use blog_core::{Error, Result, proto::ListBlogResponse};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Walks a bounded cursor and hands one message per record to the
/// coordinator.
///
/// Runs on a blocking worker thread. Every record is turned into a freshly
/// built [`ListBlogResponse`] that is moved into `record_tx`, so messages
/// queued downstream never share storage with later ones.
///
/// # Arguments
///
/// - `store`: Collection to scan.
/// - `limit`: Maximum number of records; zero means no limit.
/// - `record_tx`: Private channel to the coordinator of this call.
/// - `token`: The call's cancellation token, checked before every record.
///
/// # Behavior
///
/// - The cursor is closed on every exit path by [`CursorGuard`].
/// - A record that fails to decode aborts the whole export with
///   [`Error::Internal`].
/// - If the coordinator has gone away, the export stops with
///   [`Error::ChannelError`].
/// - Returns the number of records handed off.
pub fn export_records(
    store: &dyn BlogStore,
    limit: usize,
    record_tx: &mpsc::Sender<ListBlogResponse>,
    token: &CancellationToken,
) -> Result<usize> {
    let cursor = store.find_with_limit(limit).map_err(|e| {
        tracing::error!("Failed to open cursor: {e}");
        Error::internal(format!("failed to open cursor: {e}"))
    })?;
    let mut cursor = CursorGuard::new(cursor);
    let mut sent = 0;

    loop {
        if token.is_cancelled() {
            tracing::debug!("Export cancelled after {sent} records");
            return Err(Error::RequestCancelled);
        }

        let Some(next) = cursor.next() else {
            break;
        };
        let doc = next.map_err(|e| {
            tracing::error!("Failed to decode record during export: {e}");
            Error::internal(format!("error in unmarshalling the data: {e}"))
        })?;

        let msg = ListBlogResponse {
            blog: Some(doc.into()),
        };
        if let Err(_e) = record_tx.blocking_send(msg) {
            tracing::debug!("Record channel closed after {sent} records");
            return Err(Error::ChannelError {
                context: "record channel closed".to_string(),
            });
        }
        sent += 1;
    }

    Ok(sent)
}
