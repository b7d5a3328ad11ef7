//! Example demonstrating error classification, reporting and cancellation.
//!
//! This example shows how to:
//! - Match on classified error kinds
//! - Inspect decode failures with their raw body
//! - Forward terminal failures to an observer
//! - Cancel a call that is waiting to retry
//!
//! Run with: `cargo run --example error_handling`

use fetchkit::{CancelToken, Client, Endpoint, Error, FailureReport};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("fetchkit=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .observer(Arc::new(|report: &FailureReport| {
            println!(
                "  [observer] {} {} -> {} after {} attempt(s)",
                report.method, report.path, report.kind, report.attempts
            );
        }))
        .build()?;

    println!("=== Example 1: Not Found ===");
    match client.execute::<Post>(&Endpoint::get("/posts/999999"), None).await {
        Ok(post) => println!("Success: {:?}", post),
        Err(Error::NotFound) => println!("No such post (not retried)"),
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 2: Decode Failures ===");
    #[derive(Debug, Clone, Deserialize)]
    #[allow(dead_code)]
    struct WrongSchema {
        nonexistent_field: String,
    }

    match client.execute::<WrongSchema>(&Endpoint::get("/posts/1"), None).await {
        Ok(_) => println!("Unexpected success"),
        Err(Error::DecodeFailure {
            message,
            raw_response,
            status,
        }) => {
            println!("Decode failed with status {}: {}", status, message);
            println!(
                "  Raw response (first 200 chars): {}",
                raw_response.chars().take(200).collect::<String>()
            );
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 3: Transport Failures Are Retried ===");
    let bad_client = Client::builder()
        .base_url("https://this-domain-does-not-exist-12345.com")?
        .max_attempts(3)
        .base_backoff(Duration::from_millis(200))
        .build()?;

    match bad_client.execute::<serde_json::Value>(&Endpoint::get("/"), None).await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Gave up: {} (kind {}, retryable {})", e, e.kind(), e.is_retryable()),
    }
    println!();

    println!("=== Example 4: Cancelling A Retry Wait ===");
    let token = CancelToken::new();
    let call = tokio::spawn({
        let token = token.clone();
        async move {
            bad_client
                .execute_with_cancel::<serde_json::Value>(&Endpoint::get("/"), None, &token)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    match call.await? {
        Err(Error::Cancelled) => println!("Cancelled cleanly"),
        other => println!("Finished before cancel: {:?}", other.map(|_| ())),
    }

    Ok(())
}
