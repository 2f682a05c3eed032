// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache façade over a key-value store.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tagalong_store::{KeyValueStore, StoreError, Transaction};
use tick::{Clock, FutureExt as _};

use crate::builder::TagCacheBuilder;
use crate::codec::{Codec, JsonCodec};
use crate::telemetry::ext::ClockExt;
use crate::telemetry::{CacheActivity, CacheName, CacheOperation, CacheTelemetry};
use crate::{Error, Result};

/// A typed, tag-indexed cache over a remote key-value store.
///
/// `TagCache` encodes values with its [`Codec`] and keeps them under caller-defined
/// string keys with an expiration. On top of plain reads and writes it offers tagged
/// writes that can later be dropped as a group with
/// [`invalidate`](TagCache::invalidate), and the cache-aside
/// [`remember`](TagCache::remember) pattern.
///
/// The cache holds no state of its own: every call is a round-trip to the store,
/// bounded by the configured timeout. A timed-out read is an [`ErrorKind::Store`]
/// error, never a [`ErrorKind::CacheMiss`].
///
/// [`ErrorKind::Store`]: crate::ErrorKind::Store
/// [`ErrorKind::CacheMiss`]: crate::ErrorKind::CacheMiss
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tagalong::TagCache;
/// use tagalong_store::testing::MockStore;
/// use tick::Clock;
/// # futures::executor::block_on(async {
///
/// let cache = TagCache::builder(Clock::new_frozen()).store(MockStore::new()).build();
///
/// cache.set("answer", &42, Duration::from_secs(60)).await?;
/// let answer: i32 = cache.get("answer").await?;
/// assert_eq!(answer, 42);
///
/// let missing = cache.get::<i32>("question").await.unwrap_err();
/// assert!(missing.is_cache_miss());
/// # Ok::<(), tagalong::Error>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TagCache<S, C = JsonCodec> {
    pub(crate) name: CacheName,
    pub(crate) store: S,
    pub(crate) codec: C,
    pub(crate) clock: Clock,
    pub(crate) timeout: Duration,
    pub(crate) default_ttl: Duration,
    pub(crate) cache_nulls: bool,
    pub(crate) verify_invalidation: bool,
    pub(crate) telemetry: CacheTelemetry,
}

impl TagCache<(), JsonCodec> {
    /// Creates a cache builder.
    ///
    /// The clock drives operation timeouts and telemetry timings.
    #[must_use]
    pub fn builder(clock: Clock) -> TagCacheBuilder<(), JsonCodec> {
        TagCacheBuilder::new(clock)
    }
}

impl<S, C> TagCache<S, C> {
    /// Returns the name identifying this cache in telemetry.
    #[must_use]
    pub fn name(&self) -> CacheName {
        self.name
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the codec used for payloads.
    #[must_use]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Returns the cache's clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Returns the deadline applied to every store call.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the time-to-live used by [`set_default`](Self::set_default).
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl<S, C> TagCache<S, C>
where
    S: KeyValueStore,
    C: Codec,
{
    /// Reads and decodes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::CacheMiss`](crate::ErrorKind::CacheMiss) if the key is absent or expired.
    /// - [`ErrorKind::Decoding`](crate::ErrorKind::Decoding) if the payload does not decode into `V`.
    /// - [`ErrorKind::Store`](crate::ErrorKind::Store) if the store fails or times out.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Result<V> {
        match self.get_raw(key).await? {
            Some(payload) => self.decode(key, &payload),
            None => Err(Error::cache_miss(key)),
        }
    }

    /// Reads the raw payload stored under `key` without decoding it.
    ///
    /// Returns `Ok(None)` for a miss.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Store`](crate::ErrorKind::Store) error if the store fails
    /// or times out.
    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let timed = self.clock.timed_async(self.call(key, self.store.get(key))).await;
        let activity = match &timed.result {
            Ok(Some(_)) => CacheActivity::Hit,
            Ok(None) => CacheActivity::Miss,
            Err(_) => CacheActivity::Error,
        };
        self.telemetry
            .record(self.name, CacheOperation::Get, activity, Some(timed.duration));
        timed.result
    }

    /// Reads several raw payloads in one round-trip.
    ///
    /// Every requested key appears in the result; absent keys map to `None`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::CacheMiss`](crate::ErrorKind::CacheMiss) if `keys` is empty.
    /// - [`ErrorKind::Store`](crate::ErrorKind::Store) if the store fails, times out, or
    ///   does not answer with exactly one entry per key.
    pub async fn get_multi<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<HashMap<String, Option<Vec<u8>>>>
    where
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            self.telemetry
                .record(self.name, CacheOperation::GetMulti, CacheActivity::Miss, None);
            return Err(Error::cache_miss("[]"));
        }

        let subject = keys.join(",");
        let timed = self
            .clock
            .timed_async(self.fetch_payloads(&subject, &keys))
            .await;

        let payloads = match timed.result {
            Ok(payloads) => payloads,
            Err(e) => {
                self.telemetry
                    .record(self.name, CacheOperation::GetMulti, CacheActivity::Error, Some(timed.duration));
                return Err(e);
            }
        };

        let activity = if payloads.iter().any(Option::is_some) {
            CacheActivity::Hit
        } else {
            CacheActivity::Miss
        };
        self.telemetry
            .record(self.name, CacheOperation::GetMulti, activity, Some(timed.duration));

        Ok(keys.into_iter().zip(payloads).collect())
    }

    /// Reads and decodes several values in one round-trip.
    ///
    /// # Errors
    ///
    /// As [`get_multi`](Self::get_multi), plus
    /// [`ErrorKind::Decoding`](crate::ErrorKind::Decoding) if any present payload does
    /// not decode into `V`.
    pub async fn get_multi_as<V, K>(&self, keys: impl IntoIterator<Item = K>) -> Result<HashMap<String, Option<V>>>
    where
        V: DeserializeOwned,
        K: Into<String>,
    {
        self.get_multi(keys)
            .await?
            .into_iter()
            .map(|(key, payload)| {
                let value = payload.map(|payload| self.decode(&key, &payload)).transpose()?;
                Ok((key, value))
            })
            .collect()
    }

    /// Encodes `value` and stores it under `key` for `ttl`.
    ///
    /// A zero `ttl` stores the value without expiration. Existing values are overwritten.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Encoding`](crate::ErrorKind::Encoding) if `value` cannot be encoded;
    ///   nothing is written.
    /// - [`ErrorKind::Store`](crate::ErrorKind::Store) if the store fails or times out.
    pub async fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V, ttl: Duration) -> Result<()> {
        let payload = self.encode(key, value)?;
        let timed = self
            .clock
            .timed_async(self.call(key, self.store.set(key, payload, expiry(ttl))))
            .await;
        self.record_write(CacheOperation::Set, &timed.result, timed.duration);
        timed.result
    }

    /// Stores `value` under `key` for the cache's default time-to-live.
    ///
    /// # Errors
    ///
    /// As [`set`](Self::set).
    pub async fn set_default<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        self.set(key, value, self.default_ttl).await
    }

    /// Stores several values for `ttl` in one atomic transaction.
    ///
    /// Every value is encoded before anything is submitted, so an encoding failure
    /// leaves the store untouched.
    ///
    /// # Errors
    ///
    /// As [`set`](Self::set).
    pub async fn set_many<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>, ttl: Duration) -> Result<()>
    where
        K: Into<String>,
        V: Serialize,
    {
        let mut transaction = Transaction::new();
        let mut keys = Vec::new();
        for (key, value) in entries {
            let key = key.into();
            let payload = self.encode(&key, &value)?;
            transaction = transaction.set(key.clone(), payload, expiry(ttl));
            keys.push(key);
        }

        if transaction.is_empty() {
            return Ok(());
        }

        let subject = keys.join(",");
        let timed = self
            .clock
            .timed_async(self.call(&subject, self.store.execute(transaction)))
            .await;
        self.record_write(CacheOperation::SetMany, &timed.result, timed.duration);
        timed.result
    }

    /// Removes `key`. Returns `true` if it existed.
    ///
    /// Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Store`](crate::ErrorKind::Store) error if the store fails
    /// or times out.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let keys = [key.to_owned()];
        let timed = self.clock.timed_async(self.call(key, self.store.delete(&keys))).await;
        let activity = match &timed.result {
            Ok(_) => CacheActivity::Invalidated,
            Err(_) => CacheActivity::Error,
        };
        self.telemetry
            .record(self.name, CacheOperation::Delete, activity, Some(timed.duration));
        timed.result.map(|removed| removed > 0)
    }

    /// Returns `true` if a payload is stored under `key`, without decoding it.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Store`](crate::ErrorKind::Store) error if the store fails
    /// or times out.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_raw(key).await?.is_some())
    }

    /// Lists every key in the store, including tag sets.
    ///
    /// Intended for diagnostics: on large keyspaces this walks the whole store.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Store`](crate::ErrorKind::Store) error if the store fails
    /// or times out.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.keys_matching("*").await
    }

    /// Lists keys matching a glob `pattern` such as `user:*`.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Store`](crate::ErrorKind::Store) error if the store fails
    /// or times out.
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let timed = self
            .clock
            .timed_async(self.call(pattern, self.store.keys(pattern)))
            .await;
        let activity = if timed.result.is_ok() { CacheActivity::Ok } else { CacheActivity::Error };
        self.telemetry
            .record(self.name, CacheOperation::Keys, activity, Some(timed.duration));
        timed.result
    }

    /// Irreversibly removes every key in the store's keyspace, including entries this
    /// cache did not write.
    ///
    /// The keyspace is whatever the store exposes. For `RedisStore` that is the
    /// selected logical database (`FLUSHDB`), not the whole server.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Store`](crate::ErrorKind::Store) error if the store fails
    /// or times out.
    pub async fn flush(&self) -> Result<()> {
        let timed = self.clock.timed_async(self.call("*", self.store.flush())).await;
        let activity = if timed.result.is_ok() { CacheActivity::Ok } else { CacheActivity::Error };
        self.telemetry
            .record(self.name, CacheOperation::Flush, activity, Some(timed.duration));
        timed.result
    }

    /// Runs a store call under the configured deadline.
    pub(crate) async fn call<T>(&self, subject: &str, future: impl Future<Output = std::result::Result<T, StoreError>>) -> Result<T> {
        match future.timeout(&self.clock, self.timeout).await {
            Ok(result) => result.map_err(|e| Error::store(subject, e)),
            Err(elapsed) => Err(Error::store(subject, StoreError::timed_out(elapsed))),
        }
    }

    /// Reads the payloads of `keys`, one entry per key in request order.
    pub(crate) async fn fetch_payloads(&self, subject: &str, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let payloads = self.call(subject, self.store.get_multi(keys)).await?;
        if payloads.len() != keys.len() {
            return Err(Error::store(
                subject,
                StoreError::permanent(format!(
                    "store answered a read of {} keys with {} payloads",
                    keys.len(),
                    payloads.len()
                )),
            ));
        }
        Ok(payloads)
    }

    pub(crate) fn encode<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<Vec<u8>> {
        self.codec.encode(value).map_err(|e| Error::encoding(key, e))
    }

    pub(crate) fn decode<V: DeserializeOwned>(&self, key: &str, payload: &[u8]) -> Result<V> {
        self.codec.decode(payload).map_err(|e| Error::decoding(key, e))
    }

    pub(crate) fn record_write(&self, operation: CacheOperation, result: &Result<()>, duration: Duration) {
        let activity = if result.is_ok() {
            CacheActivity::Inserted
        } else {
            CacheActivity::Error
        };
        self.telemetry.record(self.name, operation, activity, Some(duration));
    }
}

/// Maps a caller-facing TTL to a store expiration; zero means "never expires".
pub(crate) fn expiry(ttl: Duration) -> Option<Duration> {
    (!ttl.is_zero()).then_some(ttl)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use opentelemetry::KeyValue;
    use tagalong_store::testing::{MockStore, StoreOp};

    use super::*;
    use crate::telemetry::attributes;
    use crate::telemetry::testing::{LogCapture, MetricTester};

    #[test]
    fn zero_ttl_means_no_expiry() {
        assert_eq!(expiry(Duration::ZERO), None);
        assert_eq!(expiry(Duration::from_secs(1)), Some(Duration::from_secs(1)));
    }

    #[test]
    fn operations_are_logged_when_enabled() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let cache = TagCache::builder(Clock::new_frozen())
            .store(MockStore::new())
            .name("profiles")
            .telemetry(CacheTelemetry::new().with_logs())
            .build();

        block_on(async {
            cache.set("k", &1, Duration::from_secs(60)).await.unwrap();
            cache.get::<i32>("missing").await.unwrap_err();
        });

        capture.assert_contains("profiles");
        capture.assert_contains(CacheOperation::Set.as_str());
        capture.assert_contains(CacheActivity::Inserted.as_str());
        capture.assert_contains(CacheActivity::Miss.as_str());
    }

    #[test]
    fn store_faults_are_logged_as_errors() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = MockStore::new();
        store.fail_when(|op| matches!(op, StoreOp::Get(_)));
        let cache = TagCache::builder(Clock::new_frozen())
            .store(store)
            .telemetry(CacheTelemetry::new().with_logs())
            .build();

        block_on(cache.get::<i32>("k")).unwrap_err();

        capture.assert_contains("ERROR");
        capture.assert_contains(CacheActivity::Error.as_str());
    }

    #[test]
    fn operations_are_counted_when_metrics_enabled() {
        let tester = MetricTester::new();
        let cache = TagCache::builder(Clock::new_frozen())
            .store(MockStore::new())
            .name("profiles")
            .telemetry(CacheTelemetry::new().with_metrics(tester.meter_provider()))
            .build();

        block_on(async {
            cache.set("k", &1, Duration::from_secs(60)).await.unwrap();
            let _: i32 = cache.get("k").await.unwrap();
        });

        tester.assert_attributes_contain(&[
            KeyValue::new(attributes::CACHE_NAME, "profiles"),
            KeyValue::new(attributes::CACHE_OPERATION_NAME, CacheOperation::Get.as_str()),
            KeyValue::new(attributes::CACHE_ACTIVITY_NAME, CacheActivity::Hit.as_str()),
        ]);
    }

    #[test]
    fn silent_without_telemetry() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let cache = TagCache::builder(Clock::new_frozen()).store(MockStore::new()).build();
        block_on(cache.get::<i32>("k")).unwrap_err();

        assert!(capture.output().is_empty());
    }
}
