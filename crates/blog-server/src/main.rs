use blog_core::proto::{FILE_DESCRIPTOR_SET, blog_system_server::BlogSystemServer};
use blog_server::server::{
    config::{CliArgs, ServerConfig},
    service::handler::BlogService,
    store::memory::{AUTHORS, BLOGS, MemoryDatabase},
    telemetry::{TelemetryProviders, init_telemetry},
};
use clap::Parser;
use futures::Stream;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry(config.log_format)?;

    let db = Arc::new(MemoryDatabase::open(config.database_name.clone()));
    db.add_collection(BLOGS);
    db.add_collection(AUTHORS);

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(providers, db, incoming, config).await;
            // Best effort, a panic may still leave the socket file behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(providers, db, incoming, config).await
    }
}

async fn run_server_with_incoming<I, IO, IE>(
    providers: TelemetryProviders,
    db: Arc<MemoryDatabase>,
    incoming: I,
    config: ServerConfig,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<BlogSystemServer<BlogService>>()
        .await;

    let blogs = db.collection(BLOGS)?;
    let service = BlogService::new(blogs, config);

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service.clone())
        .add_service(reflection)
        .add_service(build_blog_service(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(service, db, health_reporter, providers),
        )
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting blog service on {addr} with full config: {config:#?}");
    } else {
        tracing::info!(
            "Starting blog service on {addr} with database {}",
            config.database_name
        );
    }
}

fn build_blog_service(service: BlogService) -> BlogSystemServer<BlogService> {
    BlogSystemServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal(
    service: BlogService,
    db: Arc<MemoryDatabase>,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<BlogSystemServer<BlogService>>()
        .await;

    // 2. Drain in-flight calls, then cancel the rest
    service.shutdown().await;

    // 3. Release the database session
    db.close();

    // 4. Flush telemetry
    providers.shutdown();
}
