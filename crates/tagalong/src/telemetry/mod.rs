// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache telemetry: structured `tracing` events and OpenTelemetry metrics.
//!
//! Logging is compiled in with the `logs` feature and metrics with the `metrics`
//! feature. Both are switched on per cache through [`CacheTelemetry`].

use std::time::Duration;

#[cfg(any(feature = "logs", test))]
use opentelemetry::logs::Severity;
#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::MeterProvider;

pub(crate) mod attributes;
pub(crate) mod ext;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

/// Name identifying a cache in telemetry output.
pub type CacheName = &'static str;

/// Telemetry settings for a cache.
///
/// Everything is disabled by default. Enable logs and/or metrics, then pass this to
/// [`TagCacheBuilder::telemetry`](crate::TagCacheBuilder::telemetry).
///
/// # Examples
///
/// ```
/// use tagalong::CacheTelemetry;
///
/// # #[cfg(feature = "logs")]
/// let telemetry = CacheTelemetry::new().with_logs();
/// ```
#[derive(Clone, Debug, Default)]
pub struct CacheTelemetry {
    #[cfg(any(feature = "logs", test))]
    logs_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    instruments: Option<metrics::Instruments>,
}

impl CacheTelemetry {
    /// Creates telemetry settings with logs and metrics disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables structured logging through the `tracing` crate.
    #[cfg(any(feature = "logs", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "logs")))]
    #[must_use]
    pub fn with_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// Enables metrics recorded with meters from `provider`.
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn with_metrics(self, provider: &dyn MeterProvider) -> Self {
        Self {
            instruments: Some(metrics::Instruments::new(provider)),
            ..self
        }
    }

    /// Records the outcome of a cache operation.
    #[cfg_attr(
        not(any(feature = "logs", feature = "metrics", test)),
        expect(unused_variables, reason = "no-op without telemetry features")
    )]
    pub(crate) fn record(&self, name: CacheName, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.instruments {
            use opentelemetry::KeyValue;

            let attrs = [
                KeyValue::new(attributes::CACHE_NAME, name),
                KeyValue::new(attributes::CACHE_OPERATION_NAME, operation.as_str()),
                KeyValue::new(attributes::CACHE_ACTIVITY_NAME, activity.as_str()),
            ];

            instruments.event_counter.add(1, &attrs);
            if let Some(duration) = duration {
                #[expect(clippy::cast_precision_loss, reason = "histogram precision is sufficient")]
                instruments.operation_duration.record(duration.as_nanos() as f64, &attrs);
            }
        }

        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            Self::emit(name, operation, activity, duration);
        }
    }

    /// Logs a state change of a cache-aside computation.
    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, reason = "no-op without the logs feature")
    )]
    pub(crate) fn record_transition(&self, name: CacheName, key: &str, from: &'static str, to: &'static str) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            tracing::debug!(
                cache.name = name,
                cache.key = key,
                remember.from = from,
                remember.state = to,
                "cache.remember"
            );
        }
    }

    /// Reports keys that were tagged while an invalidation was in flight.
    pub(crate) fn record_invalidation_race(&self, name: CacheName, tags: &[String], late_keys: &[String]) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            tracing::warn!(
                cache.name = name,
                cache.tags = ?tags,
                cache.late_keys = ?late_keys,
                "cache.invalidation_race"
            );
        }

        #[cfg(not(any(feature = "logs", test)))]
        let _ = (tags, late_keys);

        self.record(name, CacheOperation::Invalidate, CacheActivity::InvalidationRace, None);
    }

    #[cfg(any(feature = "logs", test))]
    fn emit(name: CacheName, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
        let op = operation.as_str();
        let act = activity.as_str();
        let duration_ns = duration.map(|d| d.as_nanos());

        // Tracing levels must be constant, so the level is picked by the macro.
        // Field names must match the constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = name,
                    cache.operation = op,
                    cache.activity = act,
                    cache.duration_ns = ?duration_ns,
                    "cache.event"
                )
            };
        }

        match activity.severity() {
            Severity::Error => emit_event!(error),
            Severity::Warn => emit_event!(warn),
            Severity::Info => emit_event!(info),
            Severity::Debug => emit_event!(debug),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Get,
    GetMulti,
    Set,
    SetMany,
    Delete,
    Keys,
    Flush,
    SetWithTags,
    Invalidate,
    Remember,
}

impl CacheOperation {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::GetMulti => "cache.get_multi",
            Self::Set => "cache.set",
            Self::SetMany => "cache.set_many",
            Self::Delete => "cache.delete",
            Self::Keys => "cache.keys",
            Self::Flush => "cache.flush",
            Self::SetWithTags => "cache.set_with_tags",
            Self::Invalidate => "cache.invalidate",
            Self::Remember => "cache.remember",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Ok,
    Inserted,
    Invalidated,
    Computed,
    InvalidationRace,
    Error,
}

impl CacheActivity {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Ok => "cache.ok",
            Self::Inserted => "cache.inserted",
            Self::Invalidated => "cache.invalidated",
            Self::Computed => "cache.computed",
            Self::InvalidationRace => "cache.invalidation_race",
            Self::Error => "cache.error",
        }
    }

    #[cfg(any(feature = "logs", test))]
    pub(crate) fn severity(self) -> Severity {
        match self {
            Self::Hit | Self::Miss | Self::Ok => Severity::Debug,
            Self::Inserted | Self::Invalidated | Self::Computed => Severity::Info,
            Self::InvalidationRace => Severity::Warn,
            Self::Error => Severity::Error,
        }
    }
}
