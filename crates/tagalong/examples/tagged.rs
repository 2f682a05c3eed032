// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tagged Cache Example
//!
//! Demonstrates cache-aside reads, tagged writes, and invalidation by tag against the
//! in-memory store, with logs and metrics enabled.

use std::time::Duration;

use opentelemetry_sdk::metrics::SdkMeterProvider;
use serde::{Deserialize, Serialize};
use tagalong::{CacheTelemetry, TagCache};
use tagalong_store::testing::MockStore;
use tick::Clock;
use tracing::Level;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Article {
    id: u32,
    author: u32,
    title: String,
}

async fn load_article(id: u32) -> Article {
    // stands in for a database query
    Article {
        id,
        author: 7,
        title: format!("Article #{id}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), tagalong::Error> {
    let subscriber = tracing_subscriber::fmt().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("no other global subscriber is installed");

    let clock = Clock::new_tokio();
    let meter_provider = SdkMeterProvider::builder().build();

    let cache = TagCache::builder(clock.clone())
        .store(MockStore::with_clock(clock))
        .name("articles")
        .verify_invalidation(true)
        .telemetry(CacheTelemetry::new().with_logs().with_metrics(&meter_provider))
        .build();

    let ttl = Duration::from_secs(600);

    // First read computes the article and tags it with its author
    let article: Article = cache
        .remember_with_tags("article:1", &["articles", "author:7"], ttl, || load_article(1))
        .await?;
    println!("loaded {article:?}");

    // Second read is served from the cache
    let cached: Article = cache
        .remember_with_tags("article:1", &["articles", "author:7"], ttl, || load_article(1))
        .await?;
    println!("cached {cached:?}");

    cache
        .set_with_tags("article:2", &load_article(2).await, &["articles", "author:7"], ttl)
        .await?;

    // The author edited their profile: drop everything they wrote
    let report = cache.invalidate(&["author:7"]).await?;
    println!(
        "invalidated {} keys ({} removed, complete: {})",
        report.keys_collected(),
        report.keys_removed(),
        report.is_complete()
    );

    match cache.get::<Article>("article:1").await {
        Err(error) if error.is_cache_miss() => println!("article:1 is gone"),
        other => println!("unexpected: {other:?}"),
    }

    Ok(())
}
