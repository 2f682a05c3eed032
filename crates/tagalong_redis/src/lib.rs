// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Redis-backed key-value store for the `tagalong` cache.
//!
//! [`RedisStore`] implements [`tagalong_store::KeyValueStore`] on top of the `redis`
//! crate's multiplexed [`ConnectionManager`](redis::aio::ConnectionManager):
//!
//! | Store operation | Redis command                         |
//! |-----------------|---------------------------------------|
//! | `get`           | `GET`                                 |
//! | `get_multi`     | `MGET`                                |
//! | `set`           | `SET key value [PX ttl]`              |
//! | `delete`        | `DEL`                                 |
//! | `members`       | `SMEMBERS`                            |
//! | `keys`          | cursor-driven `SCAN MATCH`            |
//! | `flush`         | `FLUSHDB`                             |
//! | `execute`       | `MULTI` ... `EXEC` pipeline           |
//!
//! `flush` clears only the selected logical database, not the whole server.
//!
//! Connection settings come from [`RedisOptions`].

mod options;
mod store;

pub use options::{Protocol, RedisOptions};
pub use store::RedisStore;
