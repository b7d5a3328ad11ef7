//! Basic example demonstrating cached reads and uncached writes.
//!
//! This example shows how to:
//! - Create a client with basic configuration
//! - Make a cached GET request and repeat it without touching the network
//! - Make a POST request and invalidate the affected cache entry
//! - Access response details
//!
//! Run with: `cargo run --example basic_call`

use fetchkit::{Client, Endpoint, Error, KeyCasing};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct Post {
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("fetchkit=debug,basic_call=info")
        .init();

    // JSONPlaceholder spells keys in camelCase (`userId`)
    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .key_casing(KeyCasing::CamelCase)
        .timeout(Duration::from_secs(10))
        .cache_ttl(Duration::from_secs(30))
        .build()?;

    println!("=== Cached GET ===");
    let post = Endpoint::get("/posts/1");
    let response = client.send::<Post>(&post, Some("post:1")).await?;
    println!("Title: {}", response.title);
    println!("Latency: {:?}, attempts: {}", response.latency, response.attempts);

    let again = client.send::<Post>(&post, Some("post:1")).await?;
    println!("Second read from cache: {} ({:?})", again.from_cache, again.latency);
    println!();

    println!("=== POST ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created: Post = client
        .execute(&Endpoint::post("/posts").with_body(&new_post)?, None)
        .await?;
    println!("Created post ID: {}", created.id);

    // The list changed; drop any cached copy of it
    client.invalidate("posts:all");

    let posts = Endpoint::get("/posts").with_query_param("userId", "1");
    let list: Vec<Post> = client.execute(&posts, Some("posts:all")).await?;
    println!("User 1 has {} posts", list.len());

    Ok(())
}
