// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tagged writes and group invalidation.
//!
//! A tag is a store-side set of the keys written under it. Tagged writes add the key to
//! every tag set and write the value in one atomic transaction. Invalidation reads the
//! tag sets and deletes the sets together with every key they list.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use tagalong_store::{KeyValueStore, Transaction};

use crate::cache::expiry;
use crate::codec::Codec;
use crate::telemetry::ext::ClockExt;
use crate::telemetry::{CacheActivity, CacheOperation};
use crate::{Result, TagCache};

/// What an [`invalidate`](TagCache::invalidate) call removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    keys_collected: usize,
    keys_removed: u64,
    late_keys: Vec<String>,
}

impl Invalidation {
    /// Number of distinct keys listed by the invalidated tags on the first read.
    #[must_use]
    pub fn keys_collected(&self) -> usize {
        self.keys_collected
    }

    /// Number of keys the store reported as deleted, tag sets included.
    ///
    /// Lower than expected when entries had already expired.
    #[must_use]
    pub fn keys_removed(&self) -> u64 {
        self.keys_removed
    }

    /// Keys tagged while the invalidation was in flight.
    ///
    /// Only populated for caches built with `verify_invalidation(true)`. A key is late
    /// when it was added to a tag, or written again under a tag, after the first
    /// delete. These keys were caught by a second delete; a write landing after that
    /// delete is still missed.
    #[must_use]
    pub fn late_keys(&self) -> &[String] {
        &self.late_keys
    }

    /// Returns `true` unless a concurrent tagged write was detected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.late_keys.is_empty()
    }
}

impl<S, C> TagCache<S, C>
where
    S: KeyValueStore,
    C: Codec,
{
    /// Stores `value` under `key` and records `key` under every tag, atomically.
    ///
    /// Each tag's expiration is reset to `ttl`, so the tag outlives none of its most
    /// recent writes. A zero `ttl` stores both value and tags without expiration. An
    /// empty tag list behaves like [`set`](Self::set).
    ///
    /// Either the value and all tag memberships are written, or none are.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Encoding`](crate::ErrorKind::Encoding) if `value` cannot be encoded;
    ///   nothing is written.
    /// - [`ErrorKind::Store`](crate::ErrorKind::Store) if the transaction fails or times
    ///   out.
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
    /// let ttl = Duration::from_secs(300);
    ///
    /// cache.set_with_tags("user:1", "ada", &["users"], ttl).await?;
    /// cache.set_with_tags("user:2", "bob", &["users"], ttl).await?;
    ///
    /// let report = cache.invalidate(&["users"]).await?;
    /// assert_eq!(report.keys_collected(), 2);
    /// assert!(cache.get::<String>("user:1").await.unwrap_err().is_cache_miss());
    /// # Ok::<(), tagalong::Error>(())
    /// # });
    /// ```
    pub async fn set_with_tags<V, T>(&self, key: &str, value: &V, tags: &[T], ttl: Duration) -> Result<()>
    where
        V: Serialize + ?Sized,
        T: AsRef<str>,
    {
        if tags.is_empty() {
            return self.set(key, value, ttl).await;
        }

        let payload = self.encode(key, value)?;
        let transaction = tagged_write(key, payload, tags, ttl);

        let timed = self
            .clock
            .timed_async(self.call(key, self.store.execute(transaction)))
            .await;
        self.record_write(CacheOperation::SetWithTags, &timed.result, timed.duration);
        timed.result
    }

    /// Deletes every key recorded under any of `tags`, along with the tags themselves.
    ///
    /// Unknown or empty tags are not an error. An empty tag list does nothing.
    ///
    /// The tag sets are read first and deleted afterwards, so by default a key tagged
    /// in between survives. With `verify_invalidation(true)` the member keys are
    /// deleted first and the tags are read again before they are dropped. Every key on
    /// that second read is deleted with the tags. Keys that were newly tagged, or
    /// written again, after the first delete are reported in
    /// [`Invalidation::late_keys`] and logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Store`](crate::ErrorKind::Store) error if reading a tag or
    /// a delete fails or times out. A failed first read deletes nothing.
    pub async fn invalidate<T: AsRef<str>>(&self, tags: &[T]) -> Result<Invalidation> {
        if tags.is_empty() {
            return Ok(Invalidation::default());
        }

        let tags: Vec<String> = tags.iter().map(|tag| tag.as_ref().to_owned()).collect();

        let timed = self.clock.timed_async(self.invalidate_tags(&tags)).await;
        let activity = if timed.result.is_ok() {
            CacheActivity::Invalidated
        } else {
            CacheActivity::Error
        };
        self.telemetry
            .record(self.name, CacheOperation::Invalidate, activity, Some(timed.duration));

        let report = timed.result?;
        if !report.is_complete() {
            self.telemetry
                .record_invalidation_race(self.name, &tags, &report.late_keys);
        }

        Ok(report)
    }

    async fn invalidate_tags(&self, tags: &[String]) -> Result<Invalidation> {
        let subject = tags.join(",");
        let members = self.collect_members(tags).await?;
        let keys_collected = members.len();

        if !self.verify_invalidation {
            let mut doomed = tags.to_vec();
            doomed.extend(members);
            let keys_removed = self.call(&subject, self.store.delete(&doomed)).await?;

            return Ok(Invalidation {
                keys_collected,
                keys_removed,
                late_keys: Vec::new(),
            });
        }

        let doomed: Vec<String> = members.iter().cloned().collect();
        let mut keys_removed = self.call(&subject, self.store.delete(&doomed)).await?;

        let listed = self.collect_members(tags).await?;
        let late_keys = self.late_keys(&subject, &members, &listed).await?;

        let mut doomed = tags.to_vec();
        doomed.extend(listed);
        keys_removed += self.call(&subject, self.store.delete(&doomed)).await?;

        Ok(Invalidation {
            keys_collected,
            keys_removed,
            late_keys,
        })
    }

    /// Picks the keys of the second tag read that were written after the first delete.
    ///
    /// Tag sets still list every deleted key, so a key seen on the first read is late
    /// only if it holds a value again.
    async fn late_keys(&self, subject: &str, deleted: &BTreeSet<String>, listed: &BTreeSet<String>) -> Result<Vec<String>> {
        let known: Vec<String> = listed.intersection(deleted).cloned().collect();
        let rewritten: BTreeSet<String> = if known.is_empty() {
            BTreeSet::new()
        } else {
            let payloads = self.fetch_payloads(subject, &known).await?;
            known
                .into_iter()
                .zip(payloads)
                .filter_map(|(key, payload)| payload.map(|_| key))
                .collect()
        };

        Ok(listed
            .iter()
            .filter(|key| !deleted.contains(*key) || rewritten.contains(*key))
            .cloned()
            .collect())
    }

    async fn collect_members(&self, tags: &[String]) -> Result<BTreeSet<String>> {
        let mut members = BTreeSet::new();
        for tag in tags {
            members.extend(self.call(tag, self.store.members(tag)).await?);
        }
        Ok(members)
    }
}

/// Builds the transaction for a tagged write: tag memberships first, value last.
pub(crate) fn tagged_write<T: AsRef<str>>(key: &str, payload: Vec<u8>, tags: &[T], ttl: Duration) -> Transaction {
    let ttl = expiry(ttl);
    let mut transaction = Transaction::new();

    for tag in tags {
        let tag = tag.as_ref();
        transaction = transaction.set_add(tag, key);
        if let Some(ttl) = ttl {
            transaction = transaction.expire(tag, ttl);
        }
    }

    transaction.set(key, payload, ttl)
}
