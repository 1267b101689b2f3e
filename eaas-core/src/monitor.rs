// SPDX-License-Identifier: MIT
//
// EaaS: Entropy as a Service
// Copyright (c) 2025 EaaS Contributors
//
// https://github.com/thesp1der/eaas

//! Kernel entropy pool monitor
//!
//! Polls the pool level on a fixed interval and, whenever it drops below the
//! configured minimum, fetches entropy from a peer and injects it.
//!
//! ```text
//! ┌──────────────┐  read level  ┌──────────────┐  GET /entropy  ┌──────────────┐
//! │    Kernel    │ <────────────│   Monitor    │ ──────────────>│  EaaS peer   │
//! │     pool     │ <────────────│  (per tick)  │ <──────────────│   (server)   │
//! └──────────────┘    inject    └──────────────┘   base64 data  └──────────────┘
//! ```

use crate::{
    device::KernelEntropyPort,
    fetcher::EntropyFetcher,
    metrics::Metrics,
    Error, Result, MAX_FILL_ATTEMPTS, MAX_REQUEST_BITS,
};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bits to request for a pool at `current` bits, or `None` when the minimum
/// is already met. A single request never exceeds [`MAX_REQUEST_BITS`].
pub fn plan_request(minimum: u32, current: u32) -> Option<u32> {
    if current >= minimum {
        return None;
    }
    Some((minimum - current).min(MAX_REQUEST_BITS))
}

/// Bytes needed to carry `bits` bits, rounded up
pub fn bits_to_bytes(bits: u32) -> usize {
    bits.div_ceil(8) as usize
}

/// Outcome of a successful [`EntropyMonitor::replenish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Replenishment {
    /// Fetch/inject rounds performed
    pub iterations: u32,
    /// Bits credited to the pool across all rounds
    pub bits_injected: u64,
    /// Last observed pool level
    pub final_level: u32,
}

/// Keeps the kernel pool at or above a minimum level
pub struct EntropyMonitor<K> {
    kernel: K,
    fetcher: EntropyFetcher,
    minimum_bits: u32,
    poll_interval: Duration,
    metrics: Metrics,
}

impl<K: KernelEntropyPort> EntropyMonitor<K> {
    pub fn new(
        kernel: K,
        fetcher: EntropyFetcher,
        minimum_bits: u32,
        poll_interval: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            kernel,
            fetcher,
            minimum_bits,
            poll_interval,
            metrics,
        }
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between ticks: a tick in progress always
    /// completes and no tick starts once the token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Monitoring kernel entropy (minimum: {} bits, interval: {:?})",
            self.minimum_bits, self.poll_interval
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.tick().await;
        }

        info!("Entropy monitor stopped");
    }

    /// One replenishment cycle; failures are logged and counted, never returned
    async fn tick(&self) {
        self.metrics.record_cycle();

        match self.replenish().await {
            Ok(report) if report.iterations > 0 => {
                info!(
                    "Replenished {} bits in {} iteration(s), pool at {} bits",
                    report.bits_injected, report.iterations, report.final_level
                );
            }
            Ok(_) => {}
            Err(e) => {
                if e.is_fetch_failure() {
                    self.metrics.record_fetch_failure();
                } else if e.is_device_failure() {
                    self.metrics.record_device_failure();
                } else if matches!(e, Error::MaxAttempts { .. }) {
                    self.metrics.record_exhausted_cycle();
                }
                error!("Entropy replenishment failed: {}", e);
            }
        }
    }

    /// Fill the pool up to the minimum.
    ///
    /// Performs at most [`MAX_FILL_ATTEMPTS`] fetch/inject rounds. Any device
    /// or peer failure aborts the cycle.
    pub async fn replenish(&self) -> Result<Replenishment> {
        let mut report = Replenishment::default();
        let mut previous_level: Option<u32> = None;

        for _ in 0..MAX_FILL_ATTEMPTS {
            let level = self.kernel.read_level()?;
            report.final_level = level;

            let Some(requested_bits) = plan_request(self.minimum_bits, level) else {
                return Ok(report);
            };

            if let Some(previous) = previous_level {
                if level <= previous {
                    warn!(
                        "Pool did not grow after injection (was {} bits, now {} bits)",
                        previous, level
                    );
                }
            }

            let byte_count = bits_to_bytes(requested_bits);
            debug!("Need to fill {} bits, requesting {} bytes", requested_bits, byte_count);

            let data = self.fetcher.fetch(byte_count).await?;

            // Never claim more bits than the peer actually delivered
            let delivered_bits = u32::try_from(data.len().saturating_mul(8)).unwrap_or(u32::MAX);
            let credited_bits = requested_bits.min(delivered_bits);
            if credited_bits < requested_bits {
                warn!(
                    "Short read from peer ({} of {} bytes), crediting {} bits",
                    data.len(),
                    byte_count,
                    credited_bits
                );
            }

            self.kernel.inject(credited_bits, &data)?;
            self.metrics.record_injection(credited_bits);

            report.iterations += 1;
            report.bits_injected += u64::from(credited_bits);
            previous_level = Some(level);
        }

        let level = self.kernel.read_level()?;
        report.final_level = level;
        if level >= self.minimum_bits {
            return Ok(report);
        }

        Err(Error::MaxAttempts {
            attempts: report.iterations,
            level,
            minimum: self.minimum_bits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetcherConfig;
    use crate::record::InjectionRecord;
    use crate::protocol::EntropyEnvelope;
    use mockito::Matcher;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use url::Url;

    /// In-memory pool that credits a fraction of every injection
    #[derive(Clone)]
    struct FakePool {
        state: Arc<Mutex<PoolState>>,
    }

    struct PoolState {
        level: u32,
        credit_percent: u32,
        fail_reads: bool,
        injections: Vec<InjectionRecord>,
    }

    impl FakePool {
        fn new(level: u32, credit_percent: u32) -> Self {
            Self {
                state: Arc::new(Mutex::new(PoolState {
                    level,
                    credit_percent,
                    fail_reads: false,
                    injections: Vec::new(),
                })),
            }
        }

        fn failing() -> Self {
            let pool = Self::new(0, 100);
            pool.state.lock().fail_reads = true;
            pool
        }

        fn injections(&self) -> Vec<InjectionRecord> {
            self.state.lock().injections.clone()
        }

        fn level(&self) -> u32 {
            self.state.lock().level
        }
    }

    impl KernelEntropyPort for FakePool {
        fn read_level(&self) -> Result<u32> {
            let state = self.state.lock();
            if state.fail_reads {
                return Err(Error::device("RNDGETENTCNT", "permission denied"));
            }
            Ok(state.level)
        }

        fn inject(&self, bit_count: u32, data: &[u8]) -> Result<()> {
            let record = InjectionRecord::new(bit_count, data)?;
            let mut state = self.state.lock();
            state.level += bit_count * state.credit_percent / 100;
            state.injections.push(record);
            Ok(())
        }
    }

    fn monitor_for(server: &mockito::ServerGuard, pool: FakePool, minimum: u32) -> EntropyMonitor<FakePool> {
        let url = Url::parse(&format!("{}/entropy", server.url())).unwrap();
        let fetcher = EntropyFetcher::new(FetcherConfig::new(url)).unwrap();
        EntropyMonitor::new(pool, fetcher, minimum, Duration::from_millis(10), Metrics::new())
    }

    fn payload_body(len: usize) -> String {
        serde_json::to_string(&EntropyEnvelope::success(&vec![0x5A; len])).unwrap()
    }

    #[test]
    fn test_plan_request() {
        assert_eq!(plan_request(1200, 1200), None);
        assert_eq!(plan_request(1200, 4096), None);
        assert_eq!(plan_request(1200, 1000), Some(200));
        assert_eq!(plan_request(20_001_000, 1000), Some(MAX_REQUEST_BITS));
        assert_eq!(plan_request(MAX_REQUEST_BITS, 0), Some(MAX_REQUEST_BITS));
    }

    #[test]
    fn test_bits_to_bytes() {
        assert_eq!(bits_to_bytes(200), 25);
        assert_eq!(bits_to_bytes(MAX_REQUEST_BITS), crate::MAX_REQUEST_BYTES);
        assert_eq!(bits_to_bytes(13), 2);
        assert_eq!(bits_to_bytes(1), 1);
    }

    #[tokio::test]
    async fn test_no_op_when_pool_is_full() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/entropy")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let pool = FakePool::new(1500, 100);
        let monitor = monitor_for(&server, pool.clone(), 1200);

        let report = monitor.replenish().await.unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(report.final_level, 1500);
        assert!(pool.injections().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_replenish_scenario() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/entropy")
            .match_query(Matcher::UrlEncoded("bytes".into(), "25".into()))
            .with_status(200)
            .with_body(payload_body(25))
            .expect(1)
            .create_async()
            .await;

        let pool = FakePool::new(1000, 100);
        let monitor = monitor_for(&server, pool.clone(), 1200);

        let report = monitor.replenish().await.unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.bits_injected, 200);
        assert_eq!(report.final_level, 1200);

        let injections = pool.injections();
        assert_eq!(injections.len(), 1);
        assert_eq!(injections[0].bit_count(), 200);
        assert_eq!(injections[0].byte_length(), 28);
        assert_eq!(&injections[0].payload()[25..], &[0, 0, 0]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_request_is_capped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/entropy")
            .match_query(Matcher::UrlEncoded("bytes".into(), "2097152".into()))
            .with_status(503)
            .with_body(r#"{"error":true,"error-message":"unavailable"}"#)
            .expect(1)
            .create_async()
            .await;

        let pool = FakePool::new(1000, 100);
        let monitor = monitor_for(&server, pool.clone(), 20_001_000);

        let err = monitor.replenish().await.unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(pool.injections().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_iterations_are_bounded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/entropy")
            .match_query(Matcher::UrlEncoded("bytes".into(), "25".into()))
            .with_status(200)
            .with_body(payload_body(25))
            .expect(MAX_FILL_ATTEMPTS as usize)
            .create_async()
            .await;

        // Kernel discards everything that is injected
        let pool = FakePool::new(1000, 0);
        let monitor = monitor_for(&server, pool.clone(), 1200);

        match monitor.replenish().await {
            Err(Error::MaxAttempts { attempts, level, minimum }) => {
                assert_eq!(attempts, MAX_FILL_ATTEMPTS);
                assert_eq!(level, 1000);
                assert_eq!(minimum, 1200);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(pool.injections().len(), MAX_FILL_ATTEMPTS as usize);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_partial_credit_stalls_below_minimum() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/entropy")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(payload_body(25))
            .create_async()
            .await;

        // Kernel credits half of each injection:
        // 1000 -> 1100 -> 1150 -> 1175 -> 1187 -> 1193 -> 1196 -> 1198 -> 1199 -> 1199 -> 1199
        let pool = FakePool::new(1000, 50);
        let monitor = monitor_for(&server, pool.clone(), 1200);

        match monitor.replenish().await {
            Err(Error::MaxAttempts {
                attempts,
                level,
                minimum,
            }) => {
                assert_eq!(attempts, MAX_FILL_ATTEMPTS);
                assert_eq!(level, 1199);
                assert_eq!(minimum, 1200);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let credited: Vec<u32> = pool.injections().iter().map(|r| r.bit_count()).collect();
        assert_eq!(credited, vec![200, 100, 50, 25, 13, 7, 4, 2, 1, 1]);
        assert_eq!(pool.level(), 1199);
    }

    #[tokio::test]
    async fn test_peer_error_aborts_without_injecting() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/entropy")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"error":true,"error-message":"rate limited"}"#)
            .create_async()
            .await;

        let pool = FakePool::new(1000, 100);
        let monitor = monitor_for(&server, pool.clone(), 1200);

        match monitor.replenish().await {
            Err(Error::Fetch(msg)) => assert!(msg.contains("rate limited")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(pool.injections().is_empty());
    }

    #[tokio::test]
    async fn test_short_read_clamps_credit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/entropy")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(payload_body(10))
            .create_async()
            .await;

        let pool = FakePool::new(1000, 100);
        let monitor = monitor_for(&server, pool.clone(), 1200);

        // 80 bits per round: 1000 -> 1080 -> 1160 -> 1200
        let report = monitor.replenish().await.unwrap();
        let injections = pool.injections();
        assert_eq!(injections[0].bit_count(), 80);
        assert_eq!(injections[0].byte_length(), 12);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.final_level, 1200);
    }

    #[tokio::test]
    async fn test_device_failure_aborts_cycle() {
        let server = mockito::Server::new_async().await;
        let monitor = monitor_for(&server, FakePool::failing(), 1200);

        let err = monitor.replenish().await.unwrap_err();
        assert!(err.is_device_failure());
    }

    #[tokio::test]
    async fn test_run_records_failures_and_stops_on_cancel() {
        let server = mockito::Server::new_async().await;
        let metrics = Metrics::new();
        let url = Url::parse(&format!("{}/entropy", server.url())).unwrap();
        let fetcher = EntropyFetcher::new(FetcherConfig::new(url)).unwrap();
        let monitor = Arc::new(EntropyMonitor::new(
            FakePool::failing(),
            fetcher,
            1200,
            Duration::from_millis(10),
            metrics.clone(),
        ));

        let shutdown = CancellationToken::new();
        let handle = {
            let monitor = Arc::clone(&monitor);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { monitor.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
        assert!(metrics.cycles_total() >= 1);
        assert_eq!(metrics.device_failures(), metrics.cycles_total());
    }

    #[tokio::test]
    async fn test_cancelled_monitor_never_ticks() {
        let server = mockito::Server::new_async().await;
        let metrics = Metrics::new();
        let url = Url::parse(&format!("{}/entropy", server.url())).unwrap();
        let fetcher = EntropyFetcher::new(FetcherConfig::new(url)).unwrap();
        let monitor = EntropyMonitor::new(
            FakePool::new(0, 100),
            fetcher,
            1200,
            Duration::from_millis(1),
            metrics.clone(),
        );

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        monitor.run(shutdown).await;

        assert_eq!(metrics.cycles_total(), 0);
    }
}
