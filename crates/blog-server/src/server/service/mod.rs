//! gRPC service implementation.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point ([`handler::BlogService`]).
//! - [`records`] - Blocking storage operations run on call workers.

pub mod handler;
pub mod records;
