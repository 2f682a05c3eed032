// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A tag-indexed cache-aside layer over a remote key-value store.
//!
//! [`TagCache`] stores serialized values under string keys with an expiration, and
//! adds two things on top of a plain key-value cache:
//!
//! - **Tags.** [`set_with_tags`](TagCache::set_with_tags) records the key in one
//!   store-side set per tag, in the same atomic transaction that writes the value.
//!   [`invalidate`](TagCache::invalidate) later drops every key listed under a tag.
//! - **Cache-aside.** [`remember`](TagCache::remember) returns the cached value, or
//!   runs a producer on a miss and stores its result before returning it.
//!
//! A miss always means the key is confirmed absent. Store faults and timeouts are
//! reported as [`ErrorKind::Store`] and are never mistaken for a miss.
//!
//! The store is anything implementing [`KeyValueStore`]. The `redis` feature enables
//! a Redis-backed store; the `test-util` feature enables an in-memory mock with failure
//! injection for tests.
//!
//! # Examples
//!
//! ## Cache-Aside
//!
//! ```
//! use std::time::Duration;
//!
//! use tagalong::TagCache;
//! use tagalong_store::testing::MockStore;
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let cache = TagCache::builder(Clock::new_frozen()).store(MockStore::new()).build();
//!
//! let profile: String = cache
//!     .remember("profile:1", Duration::from_secs(60), || async { "Ada".to_string() })
//!     .await?;
//! assert_eq!(profile, "Ada");
//! assert_eq!(cache.get::<String>("profile:1").await?, "Ada");
//! # Ok::<(), tagalong::Error>(())
//! # });
//! ```
//!
//! ## Invalidating by Tag
//!
//! ```
//! use tagalong::{TagCache, ttl};
//! use tagalong_store::testing::MockStore;
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let cache = TagCache::builder(Clock::new_frozen()).store(MockStore::new()).build();
//!
//! cache.set_with_tags("post:1", "hello", &["posts", "author:7"], ttl::HOUR).await?;
//! cache.set_with_tags("post:2", "world", &["posts"], ttl::HOUR).await?;
//! cache.set("about", "static", ttl::DAY).await?;
//!
//! cache.invalidate(&["author:7"]).await?;
//!
//! assert!(!cache.contains("post:1").await?);
//! assert!(cache.contains("post:2").await?);
//! assert!(cache.contains("about").await?);
//! # Ok::<(), tagalong::Error>(())
//! # });
//! ```
//!
//! # Features
//!
//! - `logs` (default): structured `tracing` events for cache operations.
//! - `metrics`: OpenTelemetry counters and duration histograms.
//! - `postcard`: the compact binary [`PostcardCodec`](codec::PostcardCodec).
//! - `redis`: re-exports the `tagalong_redis` store.
//! - `test-util`: enables `tagalong_store::testing::MockStore` and frozen clocks.

mod builder;
mod cache;
pub mod codec;
mod error;
mod remember;
mod tags;
mod telemetry;
pub mod ttl;

#[doc(inline)]
pub use builder::TagCacheBuilder;
#[doc(inline)]
pub use cache::TagCache;
#[doc(inline)]
pub use codec::{Codec, CodecError, JsonCodec};
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use remember::RememberState;
#[doc(inline)]
pub use tagalong_store::{KeyValueStore, StoreError};
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
#[doc(inline)]
pub use tagalong_redis::{Protocol, RedisOptions, RedisStore};
#[doc(inline)]
pub use tags::Invalidation;
#[doc(inline)]
pub use telemetry::{CacheName, CacheTelemetry};
