// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory store implementation for testing.
//!
//! This module provides [`MockStore`], an in-memory [`KeyValueStore`] that honors
//! expirations against a [`Clock`], applies transactions atomically, records every
//! operation, and supports failure and stall injection for testing error and
//! timeout paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tick::Clock;

use crate::{Command, KeyValueStore, StoreError, Transaction};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Recorded store operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A single-key read.
    Get(String),
    /// A multi-key read.
    GetMulti(Vec<String>),
    /// A plain write.
    Set {
        /// The key that was written.
        key: String,
        /// The payload that was written.
        value: Vec<u8>,
        /// The requested time-to-live.
        ttl: Option<Duration>,
    },
    /// A delete of the listed keys.
    Delete(Vec<String>),
    /// A set-members read.
    Members(String),
    /// A key enumeration with the given pattern.
    Keys(String),
    /// A flush of the whole keyspace.
    Flush,
    /// An atomic transaction.
    Execute(Transaction),
}

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

type OpPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;
type OpHook = Box<dyn Fn(&StoreOp, &MockStore) + Send + Sync>;

/// A configurable in-memory store for testing.
///
/// Entries expire according to the [`Clock`] the store was created with, so tests
/// can drive expiration through `tick::ClockControl`. Transactions are validated
/// before any command is applied, which makes them all-or-nothing in the same way
/// a `MULTI`/`EXEC` block is. All operations are recorded for later verification.
///
/// # Examples
///
/// ```
/// use tagalong_store::KeyValueStore;
/// use tagalong_store::testing::{MockStore, StoreOp};
///
/// # futures::executor::block_on(async {
/// let store = MockStore::new();
///
/// store.set("key", b"42".to_vec(), None).await.unwrap();
/// assert_eq!(store.get("key").await.unwrap(), Some(b"42".to_vec()));
///
/// assert_eq!(store.operations()[1], StoreOp::Get("key".to_string()));
/// # });
/// ```
///
/// # Failure Injection
///
/// ```
/// use tagalong_store::KeyValueStore;
/// use tagalong_store::testing::{MockStore, StoreOp};
///
/// # futures::executor::block_on(async {
/// let store = MockStore::new();
///
/// // Fail reads of one key only
/// store.fail_when(|op| matches!(op, StoreOp::Get(key) if key == "forbidden"));
/// assert!(store.get("forbidden").await.is_err());
/// assert!(store.get("allowed").await.is_ok());
/// # });
/// ```
pub struct MockStore {
    data: Arc<Mutex<BTreeMap<String, Slot>>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<OpPredicate>>>,
    stall_when: Arc<Mutex<Option<OpPredicate>>>,
    after_operation: Arc<Mutex<Option<Arc<OpHook>>>>,
    clock: Clock,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("stall_when", &self.stall_when.lock().is_some())
            .field("after_operation", &self.after_operation.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Clone for MockStore {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            stall_when: Arc::clone(&self.stall_when),
            after_operation: Arc::clone(&self.after_operation),
            clock: self.clock.clone(),
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Creates an empty store driven by a frozen clock.
    ///
    /// Nothing expires unless the clock is advanced, which a frozen clock never is.
    /// Use [`MockStore::with_clock`] to test expiration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Clock::new_frozen())
    }

    /// Creates an empty store that evaluates expirations against `clock`.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            stall_when: Arc::new(Mutex::new(None)),
            after_operation: Arc::new(Mutex::new(None)),
            clock,
        }
    }

    /// Returns the number of live keys, counting tag sets.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        let now = self.clock.instant();
        self.data.lock().values().filter(|slot| slot.is_live(now)).count()
    }

    /// Returns true if `key` holds a live payload or set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.instant();
        self.data.lock().get(key).is_some_and(|slot| slot.is_live(now))
    }

    /// Returns the live members of the set at `key`, without recording an operation.
    #[must_use]
    pub fn set_members(&self, key: &str) -> Option<BTreeSet<String>> {
        let now = self.clock.instant();
        match self.data.lock().get(key) {
            Some(Slot {
                value: Value::Set(members),
                expires_at,
            }) if expires_at.is_none_or(|deadline| deadline > now) => Some(members.clone()),
            _ => None,
        }
    }

    /// Returns the remaining time-to-live of `key`.
    ///
    /// `None` if the key is absent or never expires.
    #[must_use]
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.instant();
        let data = self.data.lock();
        let slot = data.get(key).filter(|slot| slot.is_live(now))?;
        slot.expires_at.map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Writes a raw payload without recording an operation.
    ///
    /// Useful for seeding payloads that a codec cannot produce.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.data.lock().insert(
            key.into(),
            Slot {
                value: Value::Bytes(value.into()),
                expires_at: None,
            },
        );
    }

    /// Adds `member` to the set at `key` without recording an operation.
    ///
    /// Any existing expiration of the set is kept. A non-set value at `key` is replaced.
    pub fn insert_member(&self, key: impl Into<String>, member: impl Into<String>) {
        let now = self.clock.instant();
        let mut data = self.data.lock();
        let slot = data
            .entry(key.into())
            .and_modify(|slot| {
                if !slot.is_live(now) || !matches!(slot.value, Value::Set(_)) {
                    *slot = Slot {
                        value: Value::Set(BTreeSet::new()),
                        expires_at: None,
                    };
                }
            })
            .or_insert_with(|| Slot {
                value: Value::Set(BTreeSet::new()),
                expires_at: None,
            });

        if let Value::Set(members) = &mut slot.value {
            members.insert(member.into());
        }
    }

    /// Sets a predicate that determines when operations should fail.
    ///
    /// Failing operations are still recorded, but have no effect on the stored data.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagalong_store::testing::{MockStore, StoreOp};
    ///
    /// let store = MockStore::new();
    ///
    /// // Fail all operations
    /// store.fail_when(|_| true);
    ///
    /// // Fail only transactions
    /// store.fail_when(|op| matches!(op, StoreOp::Execute(_)));
    /// ```
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Sets a predicate that determines when operations never complete.
    ///
    /// A stalled operation is recorded and then stays pending forever, which lets tests
    /// exercise deadlines applied by the caller.
    pub fn stall_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.stall_when.lock() = Some(Box::new(predicate));
    }

    /// Sets a hook that runs after every successful operation has been applied.
    ///
    /// The hook receives the store itself so it can simulate a concurrent writer.
    pub fn after_operation<F>(&self, hook: F)
    where
        F: Fn(&StoreOp, &Self) + Send + Sync + 'static,
    {
        *self.after_operation.lock() = Some(Arc::new(Box::new(hook)));
    }

    /// Clears the failure and stall predicates and the operation hook.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
        *self.stall_when.lock() = None;
        *self.after_operation.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Records `op` and decides whether it proceeds.
    async fn admit(&self, op: &StoreOp) -> Result<(), StoreError> {
        self.operations.lock().push(op.clone());

        let stall = self.stall_when.lock().as_ref().is_some_and(|predicate| predicate(op));
        if stall {
            std::future::pending::<()>().await;
        }

        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(op));
        if fail {
            return Err(StoreError::transient(format!("mock: {} failed", op_name(op))));
        }

        Ok(())
    }

    fn finish(&self, op: &StoreOp) {
        let hook = self.after_operation.lock().clone();
        if let Some(hook) = hook {
            (**hook)(op, self);
        }
    }

    fn deadline(&self, ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| self.clock.instant() + ttl)
    }
}

fn op_name(op: &StoreOp) -> &'static str {
    match op {
        StoreOp::Get(_) => "get",
        StoreOp::GetMulti(_) => "get_multi",
        StoreOp::Set { .. } => "set",
        StoreOp::Delete(_) => "delete",
        StoreOp::Members(_) => "members",
        StoreOp::Keys(_) => "keys",
        StoreOp::Flush => "flush",
        StoreOp::Execute(_) => "execute",
    }
}

fn wrong_type() -> StoreError {
    StoreError::permanent(WRONG_TYPE)
}

/// Removes `key` if it has expired, then returns the live slot.
fn live_slot<'a>(data: &'a mut BTreeMap<String, Slot>, key: &str, now: Instant) -> Option<&'a mut Slot> {
    if data.get(key).is_some_and(|slot| !slot.is_live(now)) {
        data.remove(key);
    }
    data.get_mut(key)
}

/// Glob matching with `*` (any run) and `?` (any single character).
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

fn validate(data: &mut BTreeMap<String, Slot>, transaction: &Transaction, now: Instant) -> Result<(), StoreError> {
    for command in transaction.commands() {
        if let Command::SetAdd { key, .. } = command
            && live_slot(data, key, now).is_some_and(|slot| !matches!(slot.value, Value::Set(_)))
        {
            return Err(wrong_type());
        }
    }
    Ok(())
}

fn apply(data: &mut BTreeMap<String, Slot>, command: Command, now: Instant) {
    match command {
        Command::Set { key, value, ttl } => {
            data.insert(
                key,
                Slot {
                    value: Value::Bytes(value),
                    expires_at: ttl.map(|ttl| now + ttl),
                },
            );
        }
        Command::SetAdd { key, member } => {
            if let Some(Slot {
                value: Value::Set(members),
                ..
            }) = live_slot(data, &key, now)
            {
                members.insert(member);
            } else {
                data.insert(
                    key,
                    Slot {
                        value: Value::Set(BTreeSet::from([member])),
                        expires_at: None,
                    },
                );
            }
        }
        Command::Expire { key, ttl } => {
            if let Some(slot) = live_slot(data, &key, now) {
                slot.expires_at = Some(now + ttl);
            }
        }
        Command::Delete { keys } => {
            for key in keys {
                data.remove(&key);
            }
        }
    }
}

impl KeyValueStore for MockStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let op = StoreOp::Get(key.to_owned());
        self.admit(&op).await?;

        let now = self.clock.instant();
        let result = match live_slot(&mut self.data.lock(), key, now) {
            None => None,
            Some(Slot {
                value: Value::Bytes(bytes),
                ..
            }) => Some(bytes.clone()),
            Some(_) => return Err(wrong_type()),
        };

        self.finish(&op);
        Ok(result)
    }

    async fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let op = StoreOp::GetMulti(keys.to_vec());
        self.admit(&op).await?;

        let now = self.clock.instant();
        let result = {
            let mut data = self.data.lock();
            keys.iter()
                .map(|key| match live_slot(&mut data, key, now) {
                    Some(Slot {
                        value: Value::Bytes(bytes),
                        ..
                    }) => Some(bytes.clone()),
                    // MGET reports non-string values as absent
                    _ => None,
                })
                .collect()
        };

        self.finish(&op);
        Ok(result)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let op = StoreOp::Set {
            key: key.to_owned(),
            value: value.clone(),
            ttl,
        };
        self.admit(&op).await?;

        let expires_at = self.deadline(ttl);
        self.data.lock().insert(
            key.to_owned(),
            Slot {
                value: Value::Bytes(value),
                expires_at,
            },
        );

        self.finish(&op);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let op = StoreOp::Delete(keys.to_vec());
        self.admit(&op).await?;

        let now = self.clock.instant();
        let removed = {
            let mut data = self.data.lock();
            keys.iter()
                .filter(|key| data.remove(key.as_str()).is_some_and(|slot| slot.is_live(now)))
                .count()
        };

        self.finish(&op);
        Ok(removed as u64)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let op = StoreOp::Members(key.to_owned());
        self.admit(&op).await?;

        let now = self.clock.instant();
        let result = match live_slot(&mut self.data.lock(), key, now) {
            None => Vec::new(),
            Some(Slot {
                value: Value::Set(members),
                ..
            }) => members.iter().cloned().collect(),
            Some(_) => return Err(wrong_type()),
        };

        self.finish(&op);
        Ok(result)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let op = StoreOp::Keys(pattern.to_owned());
        self.admit(&op).await?;

        let now = self.clock.instant();
        let result = {
            let mut data = self.data.lock();
            data.retain(|_, slot| slot.is_live(now));
            data.keys().filter(|key| glob_match(pattern, key)).cloned().collect()
        };

        self.finish(&op);
        Ok(result)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let op = StoreOp::Flush;
        self.admit(&op).await?;

        self.data.lock().clear();

        self.finish(&op);
        Ok(())
    }

    async fn execute(&self, transaction: Transaction) -> Result<(), StoreError> {
        let op = StoreOp::Execute(transaction.clone());
        self.admit(&op).await?;

        let now = self.clock.instant();
        {
            let mut data = self.data.lock();
            validate(&mut data, &transaction, now)?;
            for command in transaction {
                apply(&mut data, command, now);
            }
        }

        self.finish(&op);
        Ok(())
    }
}
