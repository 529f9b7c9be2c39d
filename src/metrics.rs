use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static CACHE_LOOKUP_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("cache_lookup_total", "Disk cache lookups by result");
    let vec = IntCounterVec::new(opts, &["result"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_lookup_total");
    vec
});

static CACHE_STORE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_store_total", "Disk cache entries written")
        .expect("create cache_store_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_total");
    counter
});

static CACHE_STORE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_store_errors_total", "Disk cache store failures")
        .expect("create cache_store_errors_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_errors_total");
    counter
});

static CACHE_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter =
        IntCounter::new("cache_evictions_total", "Disk cache evictions").expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_evictions_total");
    counter
});

static CACHE_EVICTED_BYTES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_evicted_bytes_total", "Bytes reclaimed by eviction")
        .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_evicted_bytes_total");
    counter
});

static CACHE_BYTES_IN_USE: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("cache_bytes_in_use", "Bytes tracked by the disk cache")
        .expect("create gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("register cache_bytes_in_use");
    gauge
});

static CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    let gauge =
        IntGauge::new("cache_entries", "Entries tracked by the disk cache").expect("create gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("register cache_entries");
    gauge
});

pub fn record_cache_lookup(hit: bool) {
    let label = if hit { "hit" } else { "miss" };
    CACHE_LOOKUP_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_cache_store() {
    CACHE_STORE_TOTAL.inc();
}

pub fn record_cache_store_error() {
    CACHE_STORE_ERRORS_TOTAL.inc();
}

pub fn record_cache_eviction(bytes: u64) {
    CACHE_EVICTIONS_TOTAL.inc();
    if bytes > 0 {
        CACHE_EVICTED_BYTES_TOTAL.inc_by(bytes);
    }
}

pub fn set_cache_usage(bytes: u64, entries: usize) {
    CACHE_BYTES_IN_USE.set(i64::try_from(bytes).unwrap_or(i64::MAX));
    CACHE_ENTRIES.set(i64::try_from(entries).unwrap_or(i64::MAX));
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather() -> Result<Vec<u8>> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .context("encode metrics")?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_cache_metrics() {
        record_cache_lookup(true);
        record_cache_lookup(false);
        record_cache_store();
        record_cache_eviction(128);
        set_cache_usage(4096, 3);

        let text = String::from_utf8(gather().expect("gather")).expect("utf8");
        for name in [
            "cache_lookup_total",
            "cache_store_total",
            "cache_evictions_total",
            "cache_evicted_bytes_total",
            "cache_bytes_in_use",
            "cache_entries",
        ] {
            assert!(text.contains(name), "expected {name} in metrics output");
        }
        assert!(text.contains("result=\"hit\""));
    }
}
