use crate::server::telemetry::LogFormat;
use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `blog-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first when present), with defaults matching a local
/// development setup.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "blog-server",
    version,
    about = "A gRPC service for creating, reading, updating, deleting and listing blog posts"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "127.0.0.1:50051" or "/tmp/blog.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("127.0.0.1:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Name of the database session opened at startup.
    ///
    /// Environment variable: `DATABASE_NAME`
    #[arg(long, env = "DATABASE_NAME", default_value_t = String::from("blog_system"))]
    pub database_name: String,

    /// Capacity of the buffers between the list worker, the coordinator and
    /// the gRPC response stream.
    ///
    /// Lower values make cancellation and backpressure more responsive; higher
    /// values allow deeper pipelining.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Deadline applied to calls, in milliseconds. A shorter `grpc-timeout`
    /// sent by the client wins. Zero disables the server-side deadline.
    ///
    /// Environment variable: `DEFAULT_TIMEOUT_MS`
    #[arg(long, env = "DEFAULT_TIMEOUT_MS", default_value_t = 0)]
    pub default_timeout_ms: u64,

    /// Seconds to wait for in-flight calls to drain during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Console log format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub database_name: String,
    pub stream_buffer_size: usize,
    pub default_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("127.0.0.1:50051"),
            uds: false,
            database_name: String::from("blog_system"),
            stream_buffer_size: 8,
            default_timeout: None,
            shutdown_timeout: Duration::from_secs(3),
            log_format: LogFormat::Pretty,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.database_name.trim().is_empty() {
            bail!("DATABASE_NAME must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            database_name: args.database_name,
            stream_buffer_size: args.stream_buffer_size,
            default_timeout: (args.default_timeout_ms > 0)
                .then(|| Duration::from_millis(args.default_timeout_ms)),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            log_format: args.log_format,
        })
    }
}
