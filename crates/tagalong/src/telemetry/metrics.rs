// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use opentelemetry::InstrumentationScope;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};

const METER_NAME: &str = "tagalong";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
const CACHE_EVENT_COUNT_NAME: &str = "cache.event.count";
const CACHE_OPERATION_DURATION_NAME: &str = "cache.operation.duration_ns";

/// The instruments a cache records into.
#[derive(Clone, Debug)]
pub(crate) struct Instruments {
    pub(crate) event_counter: Counter<u64>,
    pub(crate) operation_duration: Histogram<f64>,
}

impl Instruments {
    pub(crate) fn new(meter_provider: &dyn MeterProvider) -> Self {
        let meter = create_meter(meter_provider);
        Self {
            event_counter: create_event_counter(&meter),
            operation_duration: create_operation_duration_histogram(&meter),
        }
    }
}

fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

fn create_event_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter(CACHE_EVENT_COUNT_NAME)
        .with_description("Cache events")
        .with_unit("{event}")
        .build()
}

fn create_operation_duration_histogram(meter: &Meter) -> Histogram<f64> {
    meter
        .f64_histogram(CACHE_OPERATION_DURATION_NAME)
        .with_description("Cache operation duration, including the store round-trip")
        .with_unit("ns")
        .build()
}
