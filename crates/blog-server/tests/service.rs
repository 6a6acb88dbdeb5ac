mod common;

use blog_core::proto::{
    CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest, UpdateBlogRequest,
    blog_system_server::BlogSystem,
};
use blog_server::server::service::handler::BlogService;
use common::{CountingStore, SlowStore, blog, collection, eventually, service_over};
use core::time::Duration;
use std::collections::HashSet;
use tokio_stream::StreamExt;
use tonic::{Code, Request};

async fn create(service: &BlogService, author: &str, title: &str, content: &str) -> String {
    service
        .create_blog(Request::new(CreateBlogRequest {
            blog: Some(blog(author, title, content)),
        }))
        .await
        .unwrap()
        .into_inner()
        .blog
        .unwrap()
        .id
}

async fn read(service: &BlogService, id: &str) -> Result<blog_core::proto::Blog, tonic::Status> {
    service
        .read_blog(Request::new(ReadBlogRequest {
            blog_id: id.to_string(),
        }))
        .await
        .map(|resp| resp.into_inner().blog.unwrap())
}

#[tokio::test]
async fn created_record_reads_back_with_same_fields() {
    let service = service_over(collection());

    let id = create(&service, "a1", "Hi", "World").await;
    assert_eq!(id.len(), 24);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let stored = read(&service, &id).await.unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.author_id, "a1");
    assert_eq!(stored.title, "Hi");
    assert_eq!(stored.content, "World");
}

#[tokio::test]
async fn well_formed_unknown_id_is_not_found() {
    let service = service_over(collection());
    let status = read(&service, "000000000000000000000000").await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn malformed_id_never_reaches_storage() {
    let store = CountingStore::new(collection());
    let service = service_over(store.clone());

    let status = read(&service, "not-a-valid-id").await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = service
        .update_blog(Request::new(UpdateBlogRequest {
            blog: Some(blog("a", "t", "c")),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = service
        .delete_blog(Request::new(DeleteBlogRequest {
            blog_id: "ZZZZZZZZZZZZZZZZZZZZZZZZ".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn deleted_record_is_gone() {
    let service = service_over(collection());
    let id = create(&service, "a", "t", "c").await;

    let resp = service
        .delete_blog(Request::new(DeleteBlogRequest {
            blog_id: id.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.blog_id, id);

    assert_eq!(read(&service, &id).await.unwrap_err().code(), Code::NotFound);
    let status = service
        .delete_blog(Request::new(DeleteBlogRequest { blog_id: id }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn update_replaces_rather_than_merges() {
    let service = service_over(collection());
    let id = create(&service, "a1", "t1", "c1").await;

    let mut replacement = blog("a2", "t2", "");
    replacement.id = id.clone();
    service
        .update_blog(Request::new(UpdateBlogRequest {
            blog: Some(replacement),
        }))
        .await
        .unwrap();

    let stored = read(&service, &id).await.unwrap();
    assert_eq!(stored.author_id, "a2");
    assert_eq!(stored.title, "t2");
    assert_eq!(stored.content, "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_never_interleave() {
    let service = service_over(collection());
    let id = create(&service, "seed", "seed", "seed").await;

    let mut tasks = Vec::new();
    for i in 0..50 {
        let service = service.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let tag = format!("writer-{i}");
            let mut update = blog(&tag, &tag, &tag);
            update.id = id;
            service
                .update_blog(Request::new(UpdateBlogRequest { blog: Some(update) }))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stored = read(&service, &id).await.unwrap();
    assert!(stored.author_id.starts_with("writer-"));
    assert_eq!(stored.author_id, stored.title);
    assert_eq!(stored.title, stored.content);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_get_their_own_records() {
    let service = service_over(collection());
    let mut ids = Vec::new();
    for i in 0..100 {
        ids.push(create(&service, &format!("author-{i}"), "t", "c").await);
    }

    let mut tasks = Vec::new();
    for (i, id) in ids.into_iter().enumerate() {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let stored = read(&service, &id).await.unwrap();
            assert_eq!(stored.id, id);
            assert_eq!(stored.author_id, format!("author-{i}"));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn list_is_bounded_by_limit() {
    let blogs = collection();
    let service = service_over(blogs.clone());
    for i in 0..10 {
        create(&service, "a", &format!("post-{i}"), "c").await;
    }

    for (limit, expected) in [(3, 3), (0, 10), (20, 10)] {
        let items: Vec<_> = service
            .list_blog(Request::new(ListBlogRequest { limit }))
            .await
            .unwrap()
            .into_inner()
            .collect()
            .await;
        assert_eq!(items.len(), expected, "limit {limit}");

        let ids: HashSet<_> = items
            .into_iter()
            .map(|item| item.unwrap().blog.unwrap().id)
            .collect();
        assert_eq!(ids.len(), expected);
    }

    assert!(eventually(|| blogs.open_cursors() == 0).await);
    assert!(eventually(|| service.inflight() == 0).await);
}

#[tokio::test]
async fn corrupt_record_ends_the_stream_with_internal() {
    let blogs = collection();
    let service = service_over(blogs.clone());
    create(&service, "a", "first", "c").await;

    // Sorts after any id generated during this run.
    blogs
        .insert_encoded(
            blog_core::types::BlogId::from_bytes([0xff; 12]),
            b"{not json".to_vec(),
        )
        .unwrap();

    let items: Vec<_> = service
        .list_blog(Request::new(ListBlogRequest { limit: 0 }))
        .await
        .unwrap()
        .into_inner()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    let status = items[1].as_ref().unwrap_err();
    assert_eq!(status.code(), Code::Internal);
    assert!(eventually(|| blogs.open_cursors() == 0).await);
}

#[tokio::test]
async fn deadline_returns_before_slow_write_lands() {
    let blogs = collection();
    let service = service_over(SlowStore::new(blogs.clone(), Duration::from_millis(200)));

    let mut req = Request::new(CreateBlogRequest {
        blog: Some(blog("a", "t", "c")),
    });
    req.set_timeout(Duration::from_millis(20));

    let started = std::time::Instant::now();
    let status = service.create_blog(req).await.unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_millis(200));

    // The worker is not preempted: the write still commits.
    assert!(eventually(|| blogs.len() == 1).await);
}

#[tokio::test]
async fn dropped_call_does_not_disturb_later_calls() {
    let blogs = collection();
    let slow = service_over(SlowStore::new(blogs.clone(), Duration::from_millis(100)));
    let fast = service_over(blogs.clone());
    let id = create(&fast, "a", "t", "c").await;

    let abandoned = tokio::time::timeout(Duration::from_millis(10), read(&slow, &id)).await;
    assert!(abandoned.is_err());

    let stored = read(&slow, &id).await.unwrap();
    assert_eq!(stored.id, id);
    assert!(eventually(|| slow.inflight() == 0).await);
}

#[tokio::test]
async fn shutdown_drains_running_calls_and_refuses_new_ones() {
    let blogs = collection();
    let service = service_over(SlowStore::new(blogs.clone(), Duration::from_millis(100)));

    let running = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .create_blog(Request::new(CreateBlogRequest {
                    blog: Some(blog("a", "t", "c")),
                }))
                .await
        })
    };
    assert!(eventually(|| service.inflight() == 1).await);

    service.shutdown().await;
    assert!(running.await.unwrap().is_ok());
    assert_eq!(blogs.len(), 1);

    let status = read(&service, "000000000000000000000000").await.unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}
