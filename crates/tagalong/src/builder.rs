// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`TagCache`].

use std::time::Duration;

use tagalong_store::KeyValueStore;
use tick::Clock;

use crate::codec::{Codec, JsonCodec};
use crate::telemetry::{CacheName, CacheTelemetry};
use crate::{TagCache, ttl};

/// Name reported in telemetry when none is configured.
pub(crate) const DEFAULT_NAME: CacheName = "tagalong";

/// Deadline applied to each store call when none is configured.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for a [`TagCache`].
///
/// Created by [`TagCache::builder`]. A store must be supplied before the cache can
/// be built; everything else has a default.
///
/// | Setting               | Default                 |
/// |-----------------------|-------------------------|
/// | `codec`               | [`JsonCodec`]           |
/// | `name`                | `"tagalong"`            |
/// | `timeout`             | 5 seconds               |
/// | `default_ttl`         | [`ttl::HOUR`]           |
/// | `cache_nulls`         | `false`                 |
/// | `verify_invalidation` | `false`                 |
/// | `telemetry`           | disabled                |
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tagalong::{TagCache, ttl};
/// use tagalong_store::testing::MockStore;
/// use tick::Clock;
///
/// let cache = TagCache::builder(Clock::new_frozen())
///     .store(MockStore::new())
///     .name("profiles")
///     .timeout(Duration::from_secs(1))
///     .default_ttl(ttl::DAY)
///     .verify_invalidation(true)
///     .build();
///
/// assert_eq!(cache.name(), "profiles");
/// assert_eq!(cache.default_ttl(), ttl::DAY);
/// ```
#[derive(Debug)]
pub struct TagCacheBuilder<S = (), C = JsonCodec> {
    name: CacheName,
    store: S,
    codec: C,
    clock: Clock,
    timeout: Duration,
    default_ttl: Duration,
    cache_nulls: bool,
    verify_invalidation: bool,
    telemetry: CacheTelemetry,
}

impl TagCacheBuilder<(), JsonCodec> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            name: DEFAULT_NAME,
            store: (),
            codec: JsonCodec,
            clock,
            timeout: DEFAULT_TIMEOUT,
            default_ttl: ttl::SYSTEM_DEFAULT,
            cache_nulls: false,
            verify_invalidation: false,
            telemetry: CacheTelemetry::default(),
        }
    }
}

impl<S, C> TagCacheBuilder<S, C> {
    /// Sets the store the cache reads and writes.
    pub fn store<T: KeyValueStore>(self, store: T) -> TagCacheBuilder<T, C> {
        TagCacheBuilder {
            name: self.name,
            store,
            codec: self.codec,
            clock: self.clock,
            timeout: self.timeout,
            default_ttl: self.default_ttl,
            cache_nulls: self.cache_nulls,
            verify_invalidation: self.verify_invalidation,
            telemetry: self.telemetry,
        }
    }

    /// Sets the payload codec.
    pub fn codec<T: Codec>(self, codec: T) -> TagCacheBuilder<S, T> {
        TagCacheBuilder {
            name: self.name,
            store: self.store,
            codec,
            clock: self.clock,
            timeout: self.timeout,
            default_ttl: self.default_ttl,
            cache_nulls: self.cache_nulls,
            verify_invalidation: self.verify_invalidation,
            telemetry: self.telemetry,
        }
    }

    /// Sets the name reported in telemetry.
    #[must_use]
    pub fn name(mut self, name: CacheName) -> Self {
        self.name = name;
        self
    }

    /// Sets the deadline for each store call. A zero duration keeps the default.
    ///
    /// A call that misses its deadline fails with
    /// [`ErrorKind::Store`](crate::ErrorKind::Store).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Sets the time-to-live used by [`TagCache::set_default`].
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets whether a stored null counts as a hit in
    /// [`remember`](TagCache::remember).
    ///
    /// When `false`, a null payload is treated as a miss and recomputed.
    #[must_use]
    pub fn cache_nulls(mut self, cache_nulls: bool) -> Self {
        self.cache_nulls = cache_nulls;
        self
    }

    /// Sets whether [`invalidate`](TagCache::invalidate) re-reads the tags between
    /// deleting their keys and deleting the tags, to catch keys tagged concurrently.
    #[must_use]
    pub fn verify_invalidation(mut self, verify: bool) -> Self {
        self.verify_invalidation = verify;
        self
    }

    /// Sets the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: CacheTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }
}

impl<S, C> TagCacheBuilder<S, C>
where
    S: KeyValueStore,
    C: Codec,
{
    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> TagCache<S, C> {
        TagCache {
            name: self.name,
            store: self.store,
            codec: self.codec,
            clock: self.clock,
            timeout: self.timeout,
            default_ttl: self.default_ttl,
            cache_nulls: self.cache_nulls,
            verify_invalidation: self.verify_invalidation,
            telemetry: self.telemetry,
        }
    }
}
