// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// A single write submitted as part of a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// With `ttl: None` the entry never expires.
    Set {
        /// The key to write.
        key: String,
        /// The encoded payload.
        value: Vec<u8>,
        /// Time-to-live for the entry.
        ttl: Option<Duration>,
    },

    /// Adds `member` to the set stored at `key`, creating the set if needed.
    SetAdd {
        /// The set key.
        key: String,
        /// The member to add.
        member: String,
    },

    /// Sets the expiration of `key`, replacing any previous expiration.
    ///
    /// Has no effect when `key` does not exist.
    Expire {
        /// The key to expire.
        key: String,
        /// Time until the key expires.
        ttl: Duration,
    },

    /// Removes all listed keys.
    Delete {
        /// The keys to remove.
        keys: Vec<String>,
    },
}

impl Command {
    /// Returns the first key this command touches.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Set { key, .. } | Self::SetAdd { key, .. } | Self::Expire { key, .. } => Some(key),
            Self::Delete { keys } => keys.first().map(String::as_str),
        }
    }

    /// Returns the wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "SET",
            Self::SetAdd { .. } => "SADD",
            Self::Expire { .. } => "EXPIRE",
            Self::Delete { .. } => "DEL",
        }
    }
}

/// An ordered batch of [`Command`]s that a store applies all-or-nothing.
///
/// Stores must either apply every command or none of them. A reader must never
/// observe a state where only part of the batch has been applied.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tagalong_store::Transaction;
///
/// let tx = Transaction::new()
///     .set_add("tag:user:42", "profile:42")
///     .expire("tag:user:42", Duration::from_secs(60))
///     .set("profile:42", b"{}".to_vec(), Some(Duration::from_secs(60)));
///
/// assert_eq!(tx.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    commands: Vec<Command>,
}

impl Transaction {
    /// Creates an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Appends a `SET` command.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) -> Self {
        self.push(Command::Set {
            key: key.into(),
            value,
            ttl,
        });
        self
    }

    /// Appends a `SADD` command.
    #[must_use]
    pub fn set_add(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(Command::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Appends an `EXPIRE` command.
    #[must_use]
    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.push(Command::Expire { key: key.into(), ttl });
        self
    }

    /// Appends a `DEL` command.
    #[must_use]
    pub fn delete(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push(Command::Delete {
            keys: keys.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Returns the queued commands in submission order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no commands are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl IntoIterator for Transaction {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl Extend<Command> for Transaction {
    fn extend<T: IntoIterator<Item = Command>>(&mut self, iter: T) {
        self.commands.extend(iter);
    }
}
