//! Error types for the blog service.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a call can surface to a client. Each variant belongs to exactly one
//! [`ErrorKind`], the coarse category clients reason about, and `From<Error>`
//! for `tonic::Status` maps it onto the matching gRPC status code.
//!
//! ## Error Cases
//! - `InvalidId`: The supplied record identifier is not well-formed.
//! - `InvalidRequest`: The request is missing a required field.
//! - `RequestCancelled`: The client cancelled the call mid-flight.
//! - `DeadlineExceeded`: The call's deadline elapsed before it resolved.
//! - `NotFound`: A lookup found no record with the given id.
//! - `Unavailable`: A lookup failed for a reason other than a miss.
//! - `Internal`: A write, stream or decode failure.
//! - `ChannelError`: An internal hand-off between tasks failed.
//! - `WorkerLost`: A worker exited without reporting an outcome.
//! - `ServiceShutdown`: A call arrived while the service was shutting down.

use crate::types::IdError;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the blog service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The record identifier could not be parsed.
    #[error("Invalid blog id: {0}")]
    InvalidId(#[from] IdError),

    /// The request was structurally incomplete.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The request deadline elapsed before an outcome was observed.
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// No record exists under the requested id.
    #[error("Blog {id} not found")]
    NotFound { id: String },

    /// The storage lookup failed for a reason other than a miss.
    #[error("Storage unavailable: {context}")]
    Unavailable { context: String },

    /// A write, stream or decoding failure.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The worker task terminated without delivering a result.
    #[error("Worker exited without reporting an outcome")]
    WorkerLost,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

/// Coarse error category surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Cancelled,
    InvalidArgument,
    NotFound,
    Unavailable,
    Internal,
}

impl Error {
    /// Returns the category this error is reported under.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RequestCancelled | Self::DeadlineExceeded => ErrorKind::Cancelled,
            Self::InvalidId(_) | Self::InvalidRequest { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unavailable { .. } | Self::ServiceShutdown => ErrorKind::Unavailable,
            Self::Internal { .. } | Self::ChannelError { .. } | Self::WorkerLost => {
                ErrorKind::Internal
            }
        }
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    pub fn unavailable(context: impl Into<String>) -> Self {
        Self::Unavailable {
            context: context.into(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidId(e) => Status::invalid_argument(format!("Invalid blog id: {e}")),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::DeadlineExceeded => Status::deadline_exceeded("Request deadline exceeded"),
            Error::NotFound { id } => Status::not_found(format!("Blog {id} not found")),
            Error::Unavailable { context } => Status::unavailable(context),
            Error::Internal { context } => Status::internal(context),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::WorkerLost => Status::internal("Worker exited without reporting an outcome"),
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
