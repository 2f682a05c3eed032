// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;
use std::time::Duration;

use recoverable::RecoveryInfo;
use redis::aio::ConnectionManager;
use redis::{Cmd, FromRedisValue, Pipeline, RedisError};
use tagalong_store::{Command, KeyValueStore, StoreError, Transaction};
use tick::{Clock, FutureExt as _};

use crate::RedisOptions;

/// Number of keys requested per `SCAN` step.
const SCAN_BATCH: usize = 500;

/// A [`KeyValueStore`] backed by a Redis server.
///
/// `RedisStore` wraps a multiplexed [`ConnectionManager`] and is cheap to clone; all
/// clones share one connection that is re-established automatically after a failure.
/// Every command is raced against the read or write timeout from [`RedisOptions`],
/// measured with the store's [`Clock`].
///
/// Transactions are submitted as one `MULTI`/`EXEC` pipeline.
///
/// # Examples
///
/// ```no_run
/// use tagalong_redis::{RedisOptions, RedisStore};
/// use tagalong_store::KeyValueStore;
/// use tick::Clock;
///
/// # async fn example() -> Result<(), tagalong_store::StoreError> {
/// let clock = Clock::new_tokio();
/// let store = RedisStore::connect(&RedisOptions::for_host("localhost:6379"), &clock).await?;
///
/// store.set("greeting", b"hello".to_vec(), None).await?;
/// assert_eq!(store.get("greeting").await?, Some(b"hello".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    clock: Clock,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the server described by `options`.
    ///
    /// Zero settings in `options` are replaced by their defaults first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the URL is invalid, the server cannot be reached
    /// within the connect timeout, or the handshake fails.
    pub async fn connect(options: &RedisOptions, clock: &Clock) -> Result<Self, StoreError> {
        let options = options.clone().with_defaults();
        let client = redis::Client::open(options.connection_info()?).map_err(StoreError::permanent)?;

        let connection = ConnectionManager::new(client)
            .timeout(clock, options.connect_timeout)
            .await
            .map_err(StoreError::timed_out)?
            .map_err(classify)?;

        Ok(Self::from_connection(connection, &options, clock))
    }

    /// Wraps an already established connection.
    #[must_use]
    pub fn from_connection(connection: ConnectionManager, options: &RedisOptions, clock: &Clock) -> Self {
        let options = options.clone().with_defaults();
        Self {
            connection,
            clock: clock.clone(),
            read_timeout: options.read_timeout,
            write_timeout: options.write_timeout,
        }
    }

    async fn query<T: FromRedisValue>(&self, cmd: Cmd, deadline: Duration) -> Result<T, StoreError> {
        let mut connection = self.connection.clone();
        cmd.query_async(&mut connection)
            .timeout(&self.clock, deadline)
            .await
            .map_err(StoreError::timed_out)?
            .map_err(classify)
    }

    async fn submit(&self, pipeline: Pipeline) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let reply: redis::RedisResult<()> = pipeline
            .query_async(&mut connection)
            .timeout(&self.clock, self.write_timeout)
            .await
            .map_err(StoreError::timed_out)?;
        reply.map_err(classify)
    }
}

impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.query(get_cmd(key), self.read_timeout).await
    }

    async fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.query(mget_cmd(keys), self.read_timeout).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.query(set_cmd(key, &value, ttl), self.write_timeout).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.query(del_cmd(keys), self.write_timeout).await
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.query(redis::cmd("SMEMBERS").arg(key).clone(), self.read_timeout).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        // SCAN may return a key more than once
        let mut found = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = self.query(scan_cmd(cursor, pattern), self.read_timeout).await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(found.into_iter().collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.query(redis::cmd("FLUSHDB"), self.write_timeout).await
    }

    async fn execute(&self, transaction: Transaction) -> Result<(), StoreError> {
        if transaction.is_empty() {
            return Ok(());
        }
        self.submit(transaction_pipeline(&transaction)).await
    }
}

/// Maps a client error onto the store's recovery classification.
fn classify(error: RedisError) -> StoreError {
    let recovery = if error.is_connection_refusal() {
        RecoveryInfo::unavailable()
    } else if error.is_timeout() || error.is_connection_dropped() || error.is_io_error() {
        RecoveryInfo::retry()
    } else {
        RecoveryInfo::never()
    };
    StoreError::with_recovery(recovery, error)
}

fn millis(ttl: Duration) -> u64 {
    // Redis rejects a zero expiration
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn get_cmd(key: &str) -> Cmd {
    redis::cmd("GET").arg(key).clone()
}

fn mget_cmd(keys: &[String]) -> Cmd {
    redis::cmd("MGET").arg(keys).clone()
}

fn del_cmd(keys: &[String]) -> Cmd {
    redis::cmd("DEL").arg(keys).clone()
}

fn set_cmd(key: &str, value: &[u8], ttl: Option<Duration>) -> Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(ttl) = ttl {
        cmd.arg("PX").arg(millis(ttl));
    }
    cmd
}

fn scan_cmd(cursor: u64, pattern: &str) -> Cmd {
    redis::cmd("SCAN")
        .arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(SCAN_BATCH)
        .clone()
}

fn transaction_pipeline(transaction: &Transaction) -> Pipeline {
    let mut pipeline = redis::pipe();
    pipeline.atomic();

    for command in transaction.commands() {
        match command {
            Command::Set { key, value, ttl } => {
                pipeline.add_command(set_cmd(key, value, *ttl)).ignore();
            }
            Command::SetAdd { key, member } => {
                pipeline.cmd("SADD").arg(key).arg(member).ignore();
            }
            Command::Expire { key, ttl } => {
                pipeline.cmd("PEXPIRE").arg(key).arg(millis(*ttl)).ignore();
            }
            Command::Delete { keys } if keys.is_empty() => {}
            Command::Delete { keys } => {
                pipeline.add_command(del_cmd(keys)).ignore();
            }
        }
    }

    pipeline
}
