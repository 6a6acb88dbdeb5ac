//! Command-line client for the blog service.

use anyhow::{Context, Result};
use blog_core::proto::{
    Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest,
    UpdateBlogRequest, blog_system_client::BlogSystemClient,
};
use clap::{Parser, Subcommand};
use core::time::Duration;
use tokio_stream::StreamExt;
use tonic::{Request, transport::Channel};

#[derive(Parser, Debug)]
#[command(name = "blog-client", version, about = "Talk to a running blog-server")]
struct Cli {
    /// Server endpoint.
    #[arg(long, env = "BLOG_ENDPOINT", default_value = "http://127.0.0.1:50051")]
    endpoint: String,

    /// Per-call deadline in milliseconds, sent as `grpc-timeout`.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a post and print the stored record
    Create {
        #[arg(long)]
        author_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Print one post
    Read { id: String },
    /// Replace every field of an existing post
    Update {
        id: String,
        #[arg(long)]
        author_id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
    /// Delete a post
    Delete { id: String },
    /// Stream stored posts
    List {
        /// Maximum number of posts, 0 for all
        #[arg(short, long, default_value_t = 0)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut client = BlogSystemClient::connect(cli.endpoint.clone())
        .await
        .with_context(|| format!("failed to connect to {}", cli.endpoint))?;
    let timeout = cli.timeout_ms.map(Duration::from_millis);

    match cli.command {
        Command::Create {
            author_id,
            title,
            content,
        } => {
            let blog = Blog {
                id: String::new(),
                author_id,
                title,
                content,
            };
            let resp = client
                .create_blog(request(CreateBlogRequest { blog: Some(blog) }, timeout))
                .await?;
            print_blog(resp.into_inner().blog.as_ref());
        }
        Command::Read { id } => {
            let resp = client
                .read_blog(request(ReadBlogRequest { blog_id: id }, timeout))
                .await?;
            print_blog(resp.into_inner().blog.as_ref());
        }
        Command::Update {
            id,
            author_id,
            title,
            content,
        } => {
            let blog = Blog {
                id,
                author_id,
                title,
                content,
            };
            let resp = client
                .update_blog(request(UpdateBlogRequest { blog: Some(blog) }, timeout))
                .await?;
            print_blog(resp.into_inner().blog.as_ref());
        }
        Command::Delete { id } => {
            let resp = client
                .delete_blog(request(DeleteBlogRequest { blog_id: id }, timeout))
                .await?;
            println!("deleted {}", resp.into_inner().blog_id);
        }
        Command::List { limit } => list(&mut client, limit, timeout).await?,
    }

    Ok(())
}

async fn list(
    client: &mut BlogSystemClient<Channel>,
    limit: u64,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut stream = client
        .list_blog(request(ListBlogRequest { limit }, timeout))
        .await?
        .into_inner();

    let mut count = 0;
    while let Some(item) = stream.next().await {
        print_blog(item?.blog.as_ref());
        count += 1;
    }
    eprintln!("{count} posts");
    Ok(())
}

fn request<T>(msg: T, timeout: Option<Duration>) -> Request<T> {
    let mut req = Request::new(msg);
    if let Some(timeout) = timeout {
        req.set_timeout(timeout);
    }
    req
}

fn print_blog(blog: Option<&Blog>) {
    match blog {
        Some(blog) => println!(
            "{}\t{}\t{}\t{}",
            blog.id, blog.author_id, blog.title, blog.content
        ),
        None => println!("<empty>"),
    }
}
