// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Key-value store abstractions for the `tagalong` cache.
//!
//! This crate defines the [`KeyValueStore`] trait: the exact capability set the
//! tag-indexed cache needs from a remote key-value store. A store reads and writes
//! opaque byte payloads under string keys, keeps sets of keys for the tag index, and
//! submits batches of [`Command`]s as one atomic [`Transaction`].
//!
//! Payload encoding, tag bookkeeping, and cache-aside logic live in `tagalong`; backends
//! such as `tagalong_redis` only translate these primitives into their wire protocol.
//!
//! # Implementing a Store
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Mutex;
//! use std::time::Duration;
//!
//! use tagalong_store::{Command, KeyValueStore, StoreError, Transaction};
//!
//! #[derive(Debug, Default)]
//! struct StringsOnly(Mutex<HashMap<String, Vec<u8>>>);
//!
//! impl KeyValueStore for StringsOnly {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
//!         Ok(self.0.lock().unwrap().get(key).cloned())
//!     }
//!
//!     async fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
//!         let data = self.0.lock().unwrap();
//!         Ok(keys.iter().map(|key| data.get(key).cloned()).collect())
//!     }
//!
//!     async fn set(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> Result<(), StoreError> {
//!         self.0.lock().unwrap().insert(key.to_owned(), value);
//!         Ok(())
//!     }
//!
//!     async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
//!         let mut data = self.0.lock().unwrap();
//!         Ok(keys.iter().filter(|key| data.remove(*key).is_some()).count() as u64)
//!     }
//!
//!     async fn members(&self, _key: &str) -> Result<Vec<String>, StoreError> {
//!         Err(StoreError::permanent("sets are not supported"))
//!     }
//!
//!     async fn keys(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
//!         Ok(self.0.lock().unwrap().keys().cloned().collect())
//!     }
//!
//!     async fn flush(&self) -> Result<(), StoreError> {
//!         self.0.lock().unwrap().clear();
//!         Ok(())
//!     }
//!
//!     async fn execute(&self, transaction: Transaction) -> Result<(), StoreError> {
//!         let mut data = self.0.lock().unwrap();
//!         for command in transaction {
//!             if let Command::Set { key, value, .. } = command {
//!                 data.insert(key, value);
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Testing
//!
//! Enable the `test-util` feature for [`testing::MockStore`], an in-memory store with
//! expiration, atomic transactions, operation recording, and failure injection.

mod command;
pub mod error;
mod store;
#[cfg(any(feature = "test-util", test))]
pub mod testing;

#[doc(inline)]
pub use command::{Command, Transaction};
#[doc(inline)]
pub use error::StoreError;
#[doc(inline)]
pub use store::KeyValueStore;
