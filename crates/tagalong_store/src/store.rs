// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for key-value store backends.

use std::time::Duration;

use crate::{StoreError, Transaction};

/// Trait for remote key-value stores backing a tag-indexed cache.
///
/// Keys are UTF-8 strings, values are opaque byte payloads. A key holds either a
/// payload or a set of member strings; the set form backs the tag index.
///
/// Implementations report missing keys as `Ok(None)` or an empty collection and
/// reserve [`StoreError`] for transport and protocol faults. None of the methods
/// apply their own deadline; callers wrap them in one.
pub trait KeyValueStore: Send + Sync {
    /// Reads the payload stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Reads several payloads in one round-trip.
    ///
    /// The result has one entry per requested key, in request order, with `None`
    /// for keys that are absent.
    fn get_multi(&self, keys: &[String]) -> impl Future<Output = Result<Vec<Option<Vec<u8>>>, StoreError>> + Send;

    /// Writes `value` under `key`; `ttl: None` means the entry never expires.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Removes the listed keys and returns how many existed.
    fn delete(&self, keys: &[String]) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Returns the members of the set stored at `key`, or an empty list if the key is absent.
    fn members(&self, key: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Lists keys matching a glob `pattern`, where `*` matches any run of characters.
    ///
    /// The order of the returned keys is unspecified.
    fn keys(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Removes every key in the store's keyspace.
    fn flush(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Applies every command of `transaction` atomically.
    ///
    /// Either all commands take effect or none do. Concurrent readers never observe a
    /// partially applied transaction.
    fn execute(&self, transaction: Transaction) -> impl Future<Output = Result<(), StoreError>> + Send;
}
