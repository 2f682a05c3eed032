// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache-aside: read a value, or compute and store it on a miss.

use std::convert::Infallible;
use std::fmt::{self, Display};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tagalong_store::KeyValueStore;

use crate::codec::Codec;
use crate::telemetry::ext::ClockExt;
use crate::telemetry::{CacheActivity, CacheOperation};
use crate::{Error, Result, TagCache};

/// The stages of a [`remember`](TagCache::remember) call.
///
/// ```text
/// Checking ──hit──────────────────────────────▶ Done
///    │  └──fault─────────────────────────────▶ Failed
///    └─miss─▶ Missed ─▶ Computing ─▶ Storing ─▶ Done
///                          └─fault─▶ Failed ◀─fault─┘
/// ```
///
/// Every transition is logged at debug level as a `cache.remember` event when the
/// cache has logging enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RememberState {
    /// Reading the key.
    Checking,
    /// The key was absent, or held a null the cache does not keep.
    Missed,
    /// The producer is running.
    Computing,
    /// The computed value is being written back.
    Storing,
    /// A value was returned. Terminal.
    Done,
    /// The call failed. Terminal.
    Failed,
}

impl RememberState {
    /// Returns the lowercase name used in log events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Missed => "missed",
            Self::Computing => "computing",
            Self::Storing => "storing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for [`Done`](Self::Done) and [`Failed`](Self::Failed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns `true` if the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Checking, Self::Done | Self::Failed | Self::Missed)
                | (Self::Missed, Self::Computing)
                | (Self::Computing, Self::Storing | Self::Failed)
                | (Self::Storing, Self::Done | Self::Failed)
        )
    }
}

impl Display for RememberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one `remember` call through its states.
struct Progress<'a, S, C> {
    cache: &'a TagCache<S, C>,
    key: &'a str,
    state: RememberState,
}

impl<'a, S, C> Progress<'a, S, C> {
    fn start(cache: &'a TagCache<S, C>, key: &'a str) -> Self {
        Self {
            cache,
            key,
            state: RememberState::Checking,
        }
    }

    fn advance(&mut self, next: RememberState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid remember transition {} -> {next}",
            self.state
        );
        self.cache
            .telemetry
            .record_transition(self.cache.name, self.key, self.state.as_str(), next.as_str());
        self.state = next;
    }

    fn fail(&mut self, error: Error) -> Error {
        self.advance(RememberState::Failed);
        error
    }
}

impl<S, C> TagCache<S, C>
where
    S: KeyValueStore,
    C: Codec,
{
    /// Returns the value under `key`, computing and storing it with `producer` on a miss.
    ///
    /// The producer runs only when the key is absent, or holds a null and the cache was
    /// not built with `cache_nulls(true)`. Its value is written back for `ttl` before
    /// it is returned. Concurrent misses on the same key may each run the producer;
    /// the last write wins.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Store`](crate::ErrorKind::Store) if the read fails or times out.
    ///   The producer is not run.
    /// - [`ErrorKind::Decoding`](crate::ErrorKind::Decoding) if a stored value does not
    ///   decode into `V`. The producer is not run.
    /// - [`ErrorKind::Encoding`](crate::ErrorKind::Encoding) or
    ///   [`ErrorKind::Store`](crate::ErrorKind::Store) if the write-back fails. The
    ///   computed value is dropped, since it was not cached.
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
    /// let ttl = Duration::from_secs(60);
    ///
    /// let first: u64 = cache.remember("counter", ttl, || async { 1 }).await?;
    /// let second: u64 = cache.remember("counter", ttl, || async { 2 }).await?;
    /// assert_eq!((first, second), (1, 1));
    /// # Ok::<(), tagalong::Error>(())
    /// # });
    /// ```
    pub async fn remember<V, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.resolve(key, NO_TAGS, ttl, move || async move { Ok::<_, Infallible>(producer().await) })
            .await
    }

    /// Like [`remember`](Self::remember), with a producer that can fail.
    ///
    /// # Errors
    ///
    /// As [`remember`](Self::remember), plus
    /// [`ErrorKind::Producer`](crate::ErrorKind::Producer) if the producer fails. Nothing
    /// is cached in that case.
    pub async fn try_remember<V, E, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        self.resolve(key, NO_TAGS, ttl, producer).await
    }

    /// Like [`remember`](Self::remember), but a computed value is written with
    /// [`set_with_tags`](Self::set_with_tags) so it can be invalidated by tag.
    ///
    /// A hit is returned as stored; its tags are not touched.
    ///
    /// # Errors
    ///
    /// As [`remember`](Self::remember).
    pub async fn remember_with_tags<V, T, F, Fut>(&self, key: &str, tags: &[T], ttl: Duration, producer: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        T: AsRef<str>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.resolve(key, tags, ttl, move || async move { Ok::<_, Infallible>(producer().await) })
            .await
    }

    async fn resolve<V, T, E, F, Fut>(&self, key: &str, tags: &[T], ttl: Duration, producer: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        T: AsRef<str>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let mut progress = Progress::start(self, key);
        let timed = self.clock.timed_async(self.run(&mut progress, tags, ttl, producer)).await;

        let activity = match &timed.result {
            Ok(Outcome::Hit(_)) => CacheActivity::Hit,
            Ok(Outcome::Computed(_)) => CacheActivity::Computed,
            Err(_) => CacheActivity::Error,
        };
        self.telemetry
            .record(self.name, CacheOperation::Remember, activity, Some(timed.duration));

        timed.result.map(Outcome::into_value)
    }

    async fn run<V, T, E, F, Fut>(
        &self,
        progress: &mut Progress<'_, S, C>,
        tags: &[T],
        ttl: Duration,
        producer: F,
    ) -> Result<Outcome<V>>
    where
        V: Serialize + DeserializeOwned,
        T: AsRef<str>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        let key = progress.key;

        let payload = match self.get_raw(key).await {
            Ok(payload) => payload,
            Err(e) => return Err(progress.fail(e)),
        };

        if let Some(payload) = payload.filter(|payload| self.cache_nulls || !self.codec.is_null(payload)) {
            return match self.decode(key, &payload) {
                Ok(value) => {
                    progress.advance(RememberState::Done);
                    Ok(Outcome::Hit(value))
                }
                Err(e) => Err(progress.fail(e)),
            };
        }

        progress.advance(RememberState::Missed);
        progress.advance(RememberState::Computing);

        let value = match producer().await {
            Ok(value) => value,
            Err(e) => return Err(progress.fail(Error::producer(key, e))),
        };

        progress.advance(RememberState::Storing);

        match self.set_with_tags(key, &value, tags, ttl).await {
            Ok(()) => {
                progress.advance(RememberState::Done);
                Ok(Outcome::Computed(value))
            }
            Err(e) => Err(progress.fail(e)),
        }
    }
}

const NO_TAGS: &[&str] = &[];

enum Outcome<V> {
    Hit(V),
    Computed(V),
}

impl<V> Outcome<V> {
    fn into_value(self) -> V {
        match self {
            Self::Hit(value) | Self::Computed(value) => value,
        }
    }
}
