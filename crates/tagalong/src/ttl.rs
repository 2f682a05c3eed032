// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Common time-to-live values.
//!
//! Months are 30 days and seasons 90 days. [`YEAR`] is twelve seasons, which keeps
//! entries written by other clients of the same keyspace on the same schedule.

use std::time::Duration;

/// One minute.
pub const MINUTE: Duration = Duration::from_secs(60);

/// One hour.
pub const HOUR: Duration = Duration::from_secs(60 * 60);

/// One day.
pub const DAY: Duration = Duration::from_secs(60 * 60 * 24);

/// Thirty days.
pub const MONTH: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Ninety days.
pub const SEASON: Duration = Duration::from_secs(60 * 60 * 24 * 30 * 3);

/// Twelve seasons.
pub const YEAR: Duration = Duration::from_secs(60 * 60 * 24 * 30 * 3 * 12);

/// Time-to-live used by [`TagCache::set_default`](crate::TagCache::set_default) unless
/// the builder overrides it.
pub const SYSTEM_DEFAULT: Duration = HOUR;

/// No expiration.
pub const FOREVER: Duration = Duration::ZERO;
