// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis Example
//!
//! Runs the cache against a Redis server. Start one locally, or set `REDIS_HOST`:
//!
//! ```text
//! docker run --rm -p 6379:6379 redis
//! cargo run -p tagalong --features redis --example redis
//! ```

use std::time::Duration;

use tagalong::{RedisOptions, RedisStore, TagCache, ttl};
use tick::Clock;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let clock = Clock::new_tokio();

    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost:6379".to_string());
    let options = RedisOptions {
        db: 3,
        read_timeout: Duration::from_secs(1),
        ..RedisOptions::for_host(host)
    };
    let store = RedisStore::connect(&options, &clock).await?;

    let cache = TagCache::builder(clock)
        .store(store)
        .timeout(Duration::from_secs(2))
        .default_ttl(options.expiration)
        .build();

    let visits: u64 = cache.remember("visits:home", ttl::MINUTE, || async { 0 }).await?;
    cache.set_with_tags("visits:home", &(visits + 1), &["visits"], ttl::MINUTE).await?;
    println!("home page visits: {}", cache.get::<u64>("visits:home").await?);

    let report = cache.invalidate(&["visits"]).await?;
    println!("reset {} counters", report.keys_collected());

    Ok(())
}
