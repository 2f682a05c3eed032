// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error type for key-value store operations.

use recoverable::{Recovery, RecoveryInfo};

/// A transport or protocol fault reported by a key-value store.
///
/// Every store failure carries a [`RecoveryInfo`] describing whether repeating the
/// operation may help. Timeouts and dropped connections are transient; protocol,
/// authentication, and type errors are permanent. "Key not found" is never a
/// `StoreError`: stores report it as `Ok(None)`.
///
/// # Examples
///
/// ```
/// use recoverable::{Recovery, RecoveryKind};
/// use tagalong_store::StoreError;
///
/// let error = StoreError::transient("connection reset by peer");
/// assert_eq!(error.recovery().kind(), RecoveryKind::Retry);
/// assert!(error.to_string().contains("connection reset by peer"));
/// ```
#[ohno::error]
pub struct StoreError {
    recovery_info: RecoveryInfo,
}

impl StoreError {
    /// Creates an error for a failure that may succeed if retried, such as a timeout
    /// or a dropped connection.
    pub fn transient(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(RecoveryInfo::retry(), cause)
    }

    /// Creates an error for a failure that will not go away on its own, such as a
    /// rejected command or an authentication failure.
    pub fn permanent(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(RecoveryInfo::never(), cause)
    }

    /// Creates an error for a store operation that did not complete within its deadline.
    pub fn timed_out(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::transient(cause)
    }

    /// Creates an error with an explicit recovery classification.
    pub fn with_recovery(recovery_info: RecoveryInfo, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(recovery_info, cause)
    }
}

impl Recovery for StoreError {
    fn recovery(&self) -> RecoveryInfo {
        self.recovery_info.clone()
    }
}

/// A specialized [`Result`] type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
