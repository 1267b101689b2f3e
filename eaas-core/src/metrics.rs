// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! Metrics collection and reporting

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Process-wide counters for both roles
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    // Server role
    requests_total: AtomicU64,
    requests_rejected: AtomicU64,
    requests_failed: AtomicU64,
    bytes_served: AtomicU64,

    // Monitor role
    cycles_total: AtomicU64,
    injections_total: AtomicU64,
    bits_injected: AtomicU64,
    fetch_failures: AtomicU64,
    device_failures: AtomicU64,
    cycles_exhausted: AtomicU64,

    // Latency tracking (microseconds)
    request_latencies: RwLock<Vec<u64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                requests_total: AtomicU64::new(0),
                requests_rejected: AtomicU64::new(0),
                requests_failed: AtomicU64::new(0),
                bytes_served: AtomicU64::new(0),
                cycles_total: AtomicU64::new(0),
                injections_total: AtomicU64::new(0),
                bits_injected: AtomicU64::new(0),
                fetch_failures: AtomicU64::new(0),
                device_failures: AtomicU64::new(0),
                cycles_exhausted: AtomicU64::new(0),
                request_latencies: RwLock::new(Vec::with_capacity(MAX_LATENCY_SAMPLES)),
            }),
        }
    }

    // Server metrics
    pub fn record_request(&self, bytes: usize, latency_micros: u64) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_served.fetch_add(bytes as u64, Ordering::Relaxed);

        let mut latencies = self.inner.request_latencies.write();
        latencies.push(latency_micros);
        if latencies.len() > MAX_LATENCY_SAMPLES {
            latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
        }
    }

    pub fn record_rejected_request(&self) {
        self.inner.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_failure(&self) {
        self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.inner.requests_total.load(Ordering::Relaxed)
    }

    pub fn requests_rejected(&self) -> u64 {
        self.inner.requests_rejected.load(Ordering::Relaxed)
    }

    pub fn requests_failed(&self) -> u64 {
        self.inner.requests_failed.load(Ordering::Relaxed)
    }

    pub fn bytes_served(&self) -> u64 {
        self.inner.bytes_served.load(Ordering::Relaxed)
    }

    // Monitor metrics
    pub fn record_cycle(&self) {
        self.inner.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_injection(&self, bits: u32) {
        self.inner.injections_total.fetch_add(1, Ordering::Relaxed);
        self.inner.bits_injected.fetch_add(u64::from(bits), Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.inner.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_failure(&self) {
        self.inner.device_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted_cycle(&self) {
        self.inner.cycles_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_total(&self) -> u64 {
        self.inner.cycles_total.load(Ordering::Relaxed)
    }

    pub fn injections_total(&self) -> u64 {
        self.inner.injections_total.load(Ordering::Relaxed)
    }

    pub fn bits_injected(&self) -> u64 {
        self.inner.bits_injected.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.inner.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn device_failures(&self) -> u64 {
        self.inner.device_failures.load(Ordering::Relaxed)
    }

    pub fn cycles_exhausted(&self) -> u64 {
        self.inner.cycles_exhausted.load(Ordering::Relaxed)
    }

    // Derived metrics
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn latency_percentile(&self, percentile: f64) -> Option<u64> {
        let latencies = self.inner.request_latencies.read();
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();
        let index = ((sorted.len() as f64 * percentile).ceil() as usize).min(sorted.len() - 1);
        Some(sorted[index])
    }

    pub fn latency_p50(&self) -> Option<u64> {
        self.latency_percentile(0.50)
    }

    pub fn latency_p99(&self) -> Option<u64> {
        self.latency_percentile(0.99)
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            ("eaas_requests_total", "Total number of entropy requests served", self.requests_total()),
            ("eaas_requests_rejected", "Requests rejected by validation", self.requests_rejected()),
            ("eaas_requests_failed", "Requests that failed reading the source", self.requests_failed()),
            ("eaas_bytes_served", "Total bytes served", self.bytes_served()),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        output.push_str("# HELP eaas_uptime_seconds Service uptime in seconds\n");
        output.push_str("# TYPE eaas_uptime_seconds gauge\n");
        output.push_str(&format!("eaas_uptime_seconds {}\n", self.uptime_seconds()));

        if let Some(p50) = self.latency_p50() {
            output.push_str("# HELP eaas_latency_p50_microseconds Request latency 50th percentile\n");
            output.push_str("# TYPE eaas_latency_p50_microseconds gauge\n");
            output.push_str(&format!("eaas_latency_p50_microseconds {}\n", p50));
        }

        if let Some(p99) = self.latency_p99() {
            output.push_str("# HELP eaas_latency_p99_microseconds Request latency 99th percentile\n");
            output.push_str("# TYPE eaas_latency_p99_microseconds gauge\n");
            output.push_str(&format!("eaas_latency_p99_microseconds {}\n", p99));
        }

        output
    }
}
