use blog_core::proto::{
    Blog, CreateBlogRequest, ListBlogRequest, ReadBlogRequest,
    blog_system_client::BlogSystemClient, blog_system_server::BlogSystemServer,
};
use blog_server::server::{
    config::ServerConfig,
    service::handler::BlogService,
    store::memory::{BLOGS, MemoryDatabase},
};
use core::{fmt, hint::black_box};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::stream::FuturesUnordered;
use std::time::Instant;
use tokio::{net::TcpListener, runtime::Builder};
use tokio_stream::{StreamExt, wrappers::TcpListenerStream};
use tonic::{
    codec::CompressionEncoding,
    transport::{Channel, Server},
};

#[derive(Clone, Copy, Debug)]
enum Compression {
    None,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

fn post(i: usize) -> Blog {
    Blog {
        id: String::new(),
        author_id: format!("author-{i}"),
        title: format!("Post number {i}"),
        content: "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(8),
    }
}

/// Starts an in-process server on an ephemeral port and returns a channel
/// connected to it.
async fn start_server() -> Channel {
    let db = MemoryDatabase::open("blog_bench");
    let service = BlogService::new(db.add_collection(BLOGS), ServerConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(
                BlogSystemServer::new(service)
                    .send_compressed(CompressionEncoding::Zstd)
                    .send_compressed(CompressionEncoding::Gzip)
                    .accept_compressed(CompressionEncoding::Zstd)
                    .accept_compressed(CompressionEncoding::Gzip),
            )
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

fn client(channel: &Channel, compression: Compression) -> BlogSystemClient<Channel> {
    let mut client = BlogSystemClient::new(channel.clone());
    if let Some(encoding) = compression.into() {
        client = client.accept_compressed(encoding).send_compressed(encoding);
    }
    client
}

fn grpc_bench(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();
    let channel = rt.block_on(start_server());

    // Seed enough records for the list cases.
    let ids: Vec<String> = rt.block_on(async {
        let mut client = client(&channel, Compression::None);
        let mut ids = Vec::with_capacity(10_000);
        for i in 0..10_000 {
            let resp = client
                .create_blog(CreateBlogRequest { blog: Some(post(i)) })
                .await
                .unwrap();
            ids.push(resp.into_inner().blog.unwrap().id);
        }
        ids
    });

    let concurrency_cases = [1, 8, 32];
    let compression_cases = [Compression::None, Compression::Zstd, Compression::Gzip];

    let mut group = c.benchmark_group("grpc/create_blog");
    for &concurrency in &concurrency_cases {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_function(format!("conc/{concurrency}"), |b| {
            b.to_async(&rt).iter_custom(|iters| {
                let channel = channel.clone();
                async move {
                    let start = Instant::now();
                    for _ in 0..iters {
                        let mut tasks = FuturesUnordered::new();
                        for i in 0..concurrency {
                            let mut client = client(&channel, Compression::None);
                            tasks.push(tokio::spawn(async move {
                                let resp = client
                                    .create_blog(CreateBlogRequest { blog: Some(post(i)) })
                                    .await
                                    .expect("create failed");
                                black_box(resp);
                            }));
                        }
                        while let Some(res) = tasks.next().await {
                            res.unwrap();
                        }
                    }
                    start.elapsed()
                }
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("grpc/read_blog");
    for &concurrency in &concurrency_cases {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_function(format!("conc/{concurrency}"), |b| {
            b.to_async(&rt).iter_custom(|iters| {
                let channel = channel.clone();
                let ids = ids.clone();
                async move {
                    let start = Instant::now();
                    for iter in 0..iters as usize {
                        let mut tasks = FuturesUnordered::new();
                        for i in 0..concurrency {
                            let mut client = client(&channel, Compression::None);
                            let blog_id = ids[(iter * concurrency + i) % ids.len()].clone();
                            tasks.push(tokio::spawn(async move {
                                let resp = client
                                    .read_blog(ReadBlogRequest { blog_id })
                                    .await
                                    .expect("read failed");
                                black_box(resp);
                            }));
                        }
                        while let Some(res) = tasks.next().await {
                            res.unwrap();
                        }
                    }
                    start.elapsed()
                }
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("grpc/list_blog");
    for limit in [100u64, 1_000, 10_000] {
        for &compression in &compression_cases {
            group.throughput(Throughput::Elements(limit));
            group.bench_function(format!("limit/{limit}/comp/{compression}"), |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let channel = channel.clone();
                    async move {
                        let mut client = client(&channel, compression);
                        let start = Instant::now();
                        for _ in 0..iters {
                            let mut stream = client
                                .list_blog(ListBlogRequest { limit })
                                .await
                                .expect("list failed")
                                .into_inner();
                            while let Some(resp) = stream.next().await {
                                black_box(resp.expect("resp"));
                            }
                        }
                        start.elapsed()
                    }
                });
            });
        }
    }
    group.finish();
}

criterion_group!(grpc_benches, grpc_bench);
criterion_main!(grpc_benches);
