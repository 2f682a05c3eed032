// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::fmt::{self, Display};

use ohno::ErrorExt as _;
use recoverable::{Recovery, RecoveryInfo};
use tagalong_store::StoreError;

/// The category of a cache [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The key is confirmed absent from the store.
    ///
    /// This is an expected outcome, not a fault. It is never reported for a read that
    /// timed out or failed.
    CacheMiss,
    /// The value could not be encoded. Nothing was written.
    Encoding,
    /// The stored payload could not be decoded into the requested type.
    Decoding,
    /// The store reported a transport or protocol fault, or did not answer in time.
    Store,
    /// The producer passed to [`try_remember`](crate::TagCache::try_remember) failed.
    Producer,
}

impl ErrorKind {
    /// Returns a short description of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CacheMiss => "cache miss",
            Self::Encoding => "encoding failed",
            Self::Decoding => "decoding failed",
            Self::Store => "store failure",
            Self::Producer => "producer failed",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a cache operation.
///
/// Every error carries an [`ErrorKind`] and the key, tag, or pattern it concerns.
/// The underlying cause, such as a [`StoreError`] or a `serde_json` error, is
/// kept in the source chain.
///
/// # Examples
///
/// ```
/// use tagalong::{Error, ErrorKind};
///
/// fn describe(error: &Error) -> &'static str {
///     match error.kind() {
///         ErrorKind::CacheMiss => "not cached yet",
///         ErrorKind::Store => "store unavailable",
///         _ => "bad payload",
///     }
/// }
/// ```
#[ohno::error]
#[display("{kind} for '{subject}'")]
pub struct Error {
    kind: ErrorKind,
    subject: String,
}

impl Error {
    pub(crate) fn cache_miss(subject: impl Into<String>) -> Self {
        Self::new(ErrorKind::CacheMiss, subject)
    }

    pub(crate) fn encoding(subject: impl Into<String>, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Encoding, subject, cause)
    }

    pub(crate) fn decoding(subject: impl Into<String>, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Decoding, subject, cause)
    }

    pub(crate) fn store(subject: impl Into<String>, cause: StoreError) -> Self {
        Self::caused_by(ErrorKind::Store, subject, cause)
    }

    pub(crate) fn producer(subject: impl Into<String>, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Producer, subject, cause)
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the key, tag, or pattern the failed operation concerned.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns `true` if the key is confirmed absent.
    #[must_use]
    pub fn is_cache_miss(&self) -> bool {
        self.kind == ErrorKind::CacheMiss
    }

    /// Returns the store fault behind a [`ErrorKind::Store`] error.
    #[must_use]
    pub fn store_error(&self) -> Option<&StoreError> {
        self.find_source::<StoreError>()
    }
}

impl Recovery for Error {
    /// Store faults keep the store's classification; every other kind never recovers
    /// by repeating the same call.
    fn recovery(&self) -> RecoveryInfo {
        match self.kind {
            ErrorKind::Store => self.store_error().map_or_else(RecoveryInfo::unknown, Recovery::recovery),
            ErrorKind::CacheMiss | ErrorKind::Encoding | ErrorKind::Decoding | ErrorKind::Producer => RecoveryInfo::never(),
        }
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
