//! Shared protocol, error and identifier definitions for the blog service.
//!
//! ## Submodules
//!
//! - [`error`] - Service error taxonomy and its `tonic::Status` mapping.
//! - [`types`] - The [`BlogId`](types::BlogId) record identifier.
//! - [`proto`] - Generated Protobuf messages and the `BlogSystem` service.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};

/// gRPC service and message definitions generated from `proto/blog.proto`.
///
/// - [`BlogSystem`](proto::blog_system_server::BlogSystem) - server trait with
///   the five record operations.
/// - [`Blog`](proto::Blog) - the wire form of a single post.
///
/// [`FILE_DESCRIPTOR_SET`](proto::FILE_DESCRIPTOR_SET) is the encoded
/// descriptor used to serve gRPC reflection.
pub mod proto {
    tonic::include_proto!("blog");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("blog_descriptor");
}
