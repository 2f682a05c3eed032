// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tagalong_store::StoreError;

const DEFAULT_HOST: &str = "localhost:6379";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5_000);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5_000);
const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60 * 60);

/// Transport used to reach the Redis server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP, with [`RedisOptions::host`] as `host:port`.
    #[default]
    Tcp,
    /// Unix domain socket, with [`RedisOptions::host`] as the socket path.
    Unix,
}

impl Protocol {
    /// Returns the protocol name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for [`RedisStore`](crate::RedisStore).
///
/// Zero or empty values mean "use the default"; call [`RedisOptions::with_defaults`]
/// to resolve them. [`RedisStore::connect`](crate::RedisStore::connect) does so itself.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tagalong_redis::RedisOptions;
///
/// let options = RedisOptions {
///     host: "cache.internal:6380".to_string(),
///     db: 2,
///     ..RedisOptions::default()
/// }
/// .with_defaults();
///
/// let info = options.connection_info().unwrap();
/// assert_eq!(info.redis.db, 2);
/// assert_eq!(options.read_timeout, Duration::from_secs(5));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RedisOptions {
    /// Server address: `host:port` for TCP, a socket path for Unix sockets.
    pub host: String,
    /// Transport to use.
    pub protocol: Protocol,
    /// Password for `AUTH`, if the server requires one.
    pub password: Option<String>,
    /// Logical database index.
    pub db: u32,
    /// Default time-to-live for entries written without an explicit one.
    ///
    /// The store itself never reads this; pass it to the cache builder's
    /// `default_ttl` so `set_default` uses it.
    pub expiration: Duration,
    /// Deadline for establishing the connection.
    pub connect_timeout: Duration,
    /// Deadline for commands that only read.
    pub read_timeout: Duration,
    /// Deadline for commands that write.
    pub write_timeout: Duration,
}

impl RedisOptions {
    /// Creates options for `host` with every other setting at its default.
    #[must_use]
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
        .with_defaults()
    }

    /// Replaces zero and empty settings with their defaults.
    ///
    /// | Setting           | Default          |
    /// |-------------------|------------------|
    /// | `host`            | `localhost:6379` |
    /// | `expiration`      | 1 hour           |
    /// | `connect_timeout` | 10 seconds       |
    /// | `read_timeout`    | 5 seconds        |
    /// | `write_timeout`   | 5 seconds        |
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.host.is_empty() {
            DEFAULT_HOST.clone_into(&mut self.host);
        }
        if self.password.as_deref().is_some_and(str::is_empty) {
            self.password = None;
        }
        if self.expiration.is_zero() {
            self.expiration = DEFAULT_EXPIRATION;
        }
        if self.connect_timeout.is_zero() {
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        self
    }

    /// Builds the connection settings handed to the `redis` client.
    ///
    /// A TCP host without a port connects to 6379. Bracketed IPv6 addresses such as
    /// `[::1]:6379` are accepted.
    ///
    /// # Errors
    ///
    /// Returns a permanent [`StoreError`] if the port of a TCP host is not a number.
    pub fn connection_info(&self) -> Result<ConnectionInfo, StoreError> {
        let host = if self.host.is_empty() { DEFAULT_HOST } else { self.host.as_str() };

        let addr = match self.protocol {
            Protocol::Tcp => tcp_addr(host)?,
            Protocol::Unix => ConnectionAddr::Unix(PathBuf::from(host)),
        };

        Ok(ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: i64::from(self.db),
                password: self.password.clone().filter(|password| !password.is_empty()),
                ..RedisConnectionInfo::default()
            },
        })
    }
}

impl fmt::Debug for RedisOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisOptions")
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .field("expiration", &self.expiration)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

fn tcp_addr(host: &str) -> Result<ConnectionAddr, StoreError> {
    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && !port.contains(']') => {
            let port = port
                .parse()
                .map_err(|e| StoreError::permanent(format!("invalid port in redis host '{host}': {e}")))?;
            (name, port)
        }
        _ => (host, DEFAULT_PORT),
    };

    let name = name.trim_start_matches('[').trim_end_matches(']');
    Ok(ConnectionAddr::Tcp(name.to_owned(), port))
}
