pub mod bridge;
pub mod config;
pub mod gate;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;
