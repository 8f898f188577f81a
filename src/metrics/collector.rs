// Argus Host Monitoring Service - Metrics Collector
// Periodic parallel sampling into per-family cache slots with bounded staleness

use super::query::ProcessQuery;
use super::{
    CollectorConfig, CombinedMetrics, CpuMetric, CpuMetrics, MemoryMetric, MemoryMetrics,
    MetricFamily, MetricKey, MetricSource, MetricsError, NetworkMetric, NetworkMetrics,
    ProcessRecord, ProcessSnapshot, Sampled, SystemProbe,
};
use crate::clock::Clock;
use crate::pool::{Pool, MAX_POOLED_ELEMENTS};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Slot<T> = Arc<RwLock<Option<Sampled<T>>>>;

/// Sampling state shared between the collector handle and its loop task.
struct Sampler {
    config: CollectorConfig,
    probe: Arc<dyn SystemProbe>,
    clock: Arc<dyn Clock>,
    cpu: Slot<CpuMetrics>,
    memory: Slot<MemoryMetrics>,
    network: Slot<NetworkMetrics>,
    processes: Slot<ProcessSnapshot>,
    /// Recycles the record vectors of replaced snapshots across ticks.
    record_pool: Arc<Pool<Vec<ProcessRecord>>>,
}

impl Sampler {
    /// Run the four family probes in parallel and store whatever succeeds.
    ///
    /// A failed or timed-out probe leaves the previous cached sample in
    /// place; repeated failure surfaces through health reporting.
    async fn sample_once(&self) {
        let probe_timeout = Duration::from_secs(self.config.probe_timeout_secs.max(1));
        let process_timeout = Duration::from_secs(self.config.process_probe_timeout_secs.max(1));

        let cpu = {
            let probe = Arc::clone(&self.probe);
            let slot = Arc::clone(&self.cpu);
            let clock = Arc::clone(&self.clock);
            tokio::spawn(async move {
                store_sample(
                    MetricFamily::Cpu,
                    tokio::time::timeout(probe_timeout, probe.sample_cpu()).await,
                    &slot,
                    clock.as_ref(),
                )
                .await;
            })
        };

        let memory = {
            let probe = Arc::clone(&self.probe);
            let slot = Arc::clone(&self.memory);
            let clock = Arc::clone(&self.clock);
            tokio::spawn(async move {
                store_sample(
                    MetricFamily::Memory,
                    tokio::time::timeout(probe_timeout, probe.sample_memory()).await,
                    &slot,
                    clock.as_ref(),
                )
                .await;
            })
        };

        let network = {
            let probe = Arc::clone(&self.probe);
            let slot = Arc::clone(&self.network);
            let clock = Arc::clone(&self.clock);
            tokio::spawn(async move {
                store_sample(
                    MetricFamily::Network,
                    tokio::time::timeout(probe_timeout, probe.sample_network()).await,
                    &slot,
                    clock.as_ref(),
                )
                .await;
            })
        };

        let processes = {
            let probe = Arc::clone(&self.probe);
            let slot = Arc::clone(&self.processes);
            let clock = Arc::clone(&self.clock);
            let pool = Arc::clone(&self.record_pool);
            let limit = self.config.process_limit;
            tokio::spawn(async move {
                match tokio::time::timeout(process_timeout, probe.sample_processes()).await {
                    Ok(Ok(records)) => {
                        let snapshot = build_snapshot(records, limit, &pool);
                        let mut guard = slot.write().await;
                        if let Some(old) = guard.take() {
                            pool.release(old.data.processes);
                        }
                        *guard = Some(Sampled {
                            data: snapshot,
                            updated_at: clock.now(),
                        });
                    }
                    Ok(Err(e)) => {
                        warn!(family = %MetricFamily::Process, "Probe failed, keeping previous sample: {e}");
                    }
                    Err(_) => {
                        warn!(family = %MetricFamily::Process, "Probe timed out, keeping previous sample");
                    }
                }
            })
        };

        for task in [cpu, memory, network, processes] {
            if let Err(e) = task.await {
                warn!("Sampling task panicked: {e}");
            }
        }
    }

    async fn fresh<T: Clone>(&self, slot: &Slot<T>) -> Option<Sampled<T>> {
        let ttl = ChronoDuration::seconds(self.config.cache_ttl_secs as i64);
        let guard = slot.read().await;
        guard
            .as_ref()
            .filter(|sample| self.clock.now() - sample.updated_at <= ttl)
            .cloned()
    }

    async fn within<T>(&self, slot: &Slot<T>, horizon: ChronoDuration) -> bool {
        let guard = slot.read().await;
        guard
            .as_ref()
            .map(|sample| self.clock.now() - sample.updated_at <= horizon)
            .unwrap_or(false)
    }
}

/// Cached, concurrently refreshed view of host metrics.
///
/// One background loop per instance; each tick runs the four family probes
/// as independent tasks so a slow probe cannot stall the other families.
/// Readers get copies of cached samples and never block the samplers for
/// longer than a slot clone.
pub struct MetricsCollector {
    sampler: Arc<Sampler>,
    started: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsCollector {
    pub fn new(config: CollectorConfig, probe: Arc<dyn SystemProbe>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sampler: Arc::new(Sampler {
                config,
                probe,
                clock,
                cpu: Arc::new(RwLock::new(None)),
                memory: Arc::new(RwLock::new(None)),
                network: Arc::new(RwLock::new(None)),
                processes: Arc::new(RwLock::new(None)),
                record_pool: Arc::new(Pool::new(2, MAX_POOLED_ELEMENTS)),
            }),
            started: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Begin periodic sampling.
    ///
    /// Performs one synchronous sample before returning so health reporting
    /// is meaningful immediately. Calling `start` twice on an instance is a
    /// no-op.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Metrics collector already started");
            return;
        }

        info!(
            interval_secs = self.sampler.config.update_interval_secs,
            cache_ttl_secs = self.sampler.config.cache_ttl_secs,
            "Starting metrics collector"
        );

        self.sampler.sample_once().await;

        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let sampler = Arc::clone(&self.sampler);
        let period = Duration::from_secs(self.sampler.config.update_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sampler.sample_once().await;
                    }
                    _ = rx.changed() => {
                        debug!("Metrics collector loop exiting");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);
    }

    /// Signal the sampler to halt and wait for the in-flight tick.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Metrics collector loop join failed: {e}");
            }
        }
        info!("Metrics collector stopped");
    }

    /// Take one sample immediately, outside the periodic loop.
    pub async fn sample_once(&self) {
        self.sampler.sample_once().await;
    }

    /// Cached CPU sample, if fresh.
    pub async fn cpu(&self) -> Option<Sampled<CpuMetrics>> {
        self.sampler.fresh(&self.sampler.cpu).await
    }

    /// Cached memory sample, if fresh.
    pub async fn memory(&self) -> Option<Sampled<MemoryMetrics>> {
        self.sampler.fresh(&self.sampler.memory).await
    }

    /// Cached network sample, if fresh.
    pub async fn network(&self) -> Option<Sampled<NetworkMetrics>> {
        self.sampler.fresh(&self.sampler.network).await
    }

    /// Cached process snapshot, if fresh.
    pub async fn processes(&self) -> Option<Sampled<ProcessSnapshot>> {
        self.sampler.fresh(&self.sampler.processes).await
    }

    /// All families in one read.
    pub async fn combined(&self) -> CombinedMetrics {
        CombinedMetrics {
            cpu: self.cpu().await,
            memory: self.memory().await,
            network: self.network().await,
            processes: self.processes().await,
            timestamp: self.sampler.clock.now(),
        }
    }

    /// Filtered / sorted / paginated view over the cached process snapshot.
    ///
    /// Fails when the snapshot is absent or stale so callers can surface
    /// cache misses explicitly.
    pub async fn query_processes(
        &self,
        query: &ProcessQuery,
    ) -> Result<(Vec<ProcessRecord>, usize), MetricsError> {
        let snapshot = self
            .processes()
            .await
            .ok_or(MetricsError::CacheExpired(MetricFamily::Process))?;
        query.apply(&snapshot.data.processes)
    }

    /// Current scalar value for a threshold metric, from the cache.
    pub async fn current_value(&self, key: &MetricKey) -> Result<f64, MetricsError> {
        match key {
            MetricKey::Cpu(metric) => {
                let sample = self
                    .cpu()
                    .await
                    .ok_or(MetricsError::CacheExpired(MetricFamily::Cpu))?;
                Ok(match metric {
                    CpuMetric::UsagePercent => sample.data.usage_percent,
                    CpuMetric::Load1 => sample.data.load1,
                    CpuMetric::Load5 => sample.data.load5,
                    CpuMetric::Load15 => sample.data.load15,
                })
            }
            MetricKey::Memory(metric) => {
                let sample = self
                    .memory()
                    .await
                    .ok_or(MetricsError::CacheExpired(MetricFamily::Memory))?;
                Ok(match metric {
                    MemoryMetric::UsedPercent => sample.data.used_percent,
                    MemoryMetric::Used => sample.data.used as f64,
                    MemoryMetric::Free => sample.data.free as f64,
                })
            }
            MetricKey::Network(metric) => {
                let sample = self
                    .network()
                    .await
                    .ok_or(MetricsError::CacheExpired(MetricFamily::Network))?;
                Ok(match metric {
                    NetworkMetric::BytesSent => sample.data.bytes_sent as f64,
                    NetworkMetric::BytesRecv => sample.data.bytes_recv as f64,
                    NetworkMetric::PacketsSent => sample.data.packets_sent as f64,
                    NetworkMetric::PacketsRecv => sample.data.packets_recv as f64,
                })
            }
        }
    }

    /// True iff every family has a sample no older than twice the cache TTL.
    pub async fn is_healthy(&self) -> bool {
        let horizon = ChronoDuration::seconds(2 * self.sampler.config.cache_ttl_secs as i64);
        self.sampler.within(&self.sampler.cpu, horizon).await
            && self.sampler.within(&self.sampler.memory, horizon).await
            && self.sampler.within(&self.sampler.network, horizon).await
            && self.sampler.within(&self.sampler.processes, horizon).await
    }
}

#[async_trait]
impl MetricSource for MetricsCollector {
    async fn current_value(&self, key: &MetricKey) -> Result<f64, MetricsError> {
        MetricsCollector::current_value(self, key).await
    }
}

/// Pre-sort by CPU% descending and cap the snapshot so unfiltered reads are
/// already ordered. The backing vector comes from the recycle pool.
fn build_snapshot(
    mut records: Vec<ProcessRecord>,
    limit: usize,
    pool: &Pool<Vec<ProcessRecord>>,
) -> ProcessSnapshot {
    records.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    records.truncate(limit);

    let mut owned = pool.acquire();
    owned.append(&mut records);
    ProcessSnapshot { processes: owned }
}

async fn store_sample<T>(
    family: MetricFamily,
    result: Result<Result<T, MetricsError>, tokio::time::error::Elapsed>,
    slot: &RwLock<Option<Sampled<T>>>,
    clock: &dyn Clock,
) {
    match result {
        Ok(Ok(data)) => {
            let mut guard = slot.write().await;
            *guard = Some(Sampled {
                data,
                updated_at: clock.now(),
            });
        }
        Ok(Err(e)) => {
            warn!(family = %family, "Probe failed, keeping previous sample: {e}");
        }
        Err(_) => {
            warn!(family = %family, "Probe timed out, keeping previous sample");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    struct ScriptedProbe {
        fail: AtomicBool,
        processes: Vec<ProcessRecord>,
    }

    impl ScriptedProbe {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                processes: (1..=5)
                    .map(|i| ProcessRecord {
                        pid: i,
                        name: format!("proc-{i}"),
                        cpu_percent: i as f64 * 10.0,
                        mem_percent: i as f32,
                    })
                    .collect(),
            }
        }

        fn with_processes(processes: Vec<ProcessRecord>) -> Self {
            Self {
                fail: AtomicBool::new(false),
                processes,
            }
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        fn check(&self, family: MetricFamily) -> Result<(), MetricsError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(MetricsError::ProbeFailure {
                    family,
                    reason: "scripted failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SystemProbe for ScriptedProbe {
        async fn sample_cpu(&self) -> Result<CpuMetrics, MetricsError> {
            self.check(MetricFamily::Cpu)?;
            Ok(CpuMetrics {
                usage_percent: 42.0,
                load1: 1.0,
                load5: 0.5,
                load15: 0.25,
            })
        }

        async fn sample_memory(&self) -> Result<MemoryMetrics, MetricsError> {
            self.check(MetricFamily::Memory)?;
            Ok(MemoryMetrics {
                total: 1024,
                used: 512,
                free: 512,
                used_percent: 50.0,
            })
        }

        async fn sample_network(&self) -> Result<NetworkMetrics, MetricsError> {
            self.check(MetricFamily::Network)?;
            Ok(NetworkMetrics {
                bytes_sent: 100,
                bytes_recv: 200,
                packets_sent: 10,
                packets_recv: 20,
            })
        }

        async fn sample_processes(&self) -> Result<Vec<ProcessRecord>, MetricsError> {
            self.check(MetricFamily::Process)?;
            Ok(self.processes.clone())
        }
    }

    fn collector_with(
        config: CollectorConfig,
        probe: Arc<ScriptedProbe>,
        clock: Arc<ManualClock>,
    ) -> MetricsCollector {
        MetricsCollector::new(config, probe, clock)
    }

    #[tokio::test]
    async fn test_start_samples_synchronously() {
        let probe = Arc::new(ScriptedProbe::new());
        let clock = Arc::new(ManualClock::starting_now());
        let collector = collector_with(CollectorConfig::default(), probe, clock);

        collector.start().await;

        assert!(collector.cpu().await.is_some());
        assert!(collector.memory().await.is_some());
        assert!(collector.network().await.is_some());
        assert!(collector.processes().await.is_some());
        assert!(collector.is_healthy().await);

        collector.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let probe = Arc::new(ScriptedProbe::new());
        let clock = Arc::new(ManualClock::starting_now());
        let collector = collector_with(CollectorConfig::default(), probe, clock);

        collector.start().await;
        collector.start().await;
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_cache_expiry_and_health_horizon() {
        let probe = Arc::new(ScriptedProbe::new());
        let clock = Arc::new(ManualClock::starting_now());
        let config = CollectorConfig {
            cache_ttl_secs: 1,
            ..CollectorConfig::default()
        };
        let collector = collector_with(config, probe, Arc::clone(&clock));

        collector.sample_once().await;

        clock.advance(ChronoDuration::milliseconds(500));
        assert!(collector.cpu().await.is_some());
        assert!(collector.is_healthy().await);

        clock.advance(ChronoDuration::milliseconds(1000));
        assert!(collector.cpu().await.is_none());
        assert!(collector.is_healthy().await);

        clock.advance(ChronoDuration::milliseconds(600));
        assert!(!collector.is_healthy().await);
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_previous_sample() {
        let probe = Arc::new(ScriptedProbe::new());
        let clock = Arc::new(ManualClock::starting_now());
        let collector = collector_with(
            CollectorConfig::default(),
            Arc::clone(&probe),
            Arc::clone(&clock),
        );

        collector.sample_once().await;
        let first = collector.cpu().await.unwrap();

        probe.set_failing(true);
        clock.advance(ChronoDuration::seconds(5));
        collector.sample_once().await;

        let second = collector.cpu().await.unwrap();
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn test_snapshot_sorted_and_capped() {
        let records = vec![
            ProcessRecord {
                pid: 1,
                name: "low".to_string(),
                cpu_percent: 1.0,
                mem_percent: 0.1,
            },
            ProcessRecord {
                pid: 2,
                name: "high".to_string(),
                cpu_percent: 90.0,
                mem_percent: 0.2,
            },
            ProcessRecord {
                pid: 3,
                name: "mid".to_string(),
                cpu_percent: 40.0,
                mem_percent: 0.3,
            },
        ];
        let probe = Arc::new(ScriptedProbe::with_processes(records));
        let clock = Arc::new(ManualClock::starting_now());
        let config = CollectorConfig {
            process_limit: 2,
            ..CollectorConfig::default()
        };
        let collector = collector_with(config, probe, clock);

        collector.sample_once().await;

        let snapshot = collector.processes().await.unwrap();
        assert_eq!(snapshot.data.processes.len(), 2);
        assert_eq!(snapshot.data.processes[0].name, "high");
        assert_eq!(snapshot.data.processes[1].name, "mid");
    }

    #[tokio::test]
    async fn test_query_fails_on_stale_cache() {
        let probe = Arc::new(ScriptedProbe::new());
        let clock = Arc::new(ManualClock::starting_now());
        let config = CollectorConfig {
            cache_ttl_secs: 1,
            ..CollectorConfig::default()
        };
        let collector = collector_with(config, probe, Arc::clone(&clock));

        collector.sample_once().await;
        clock.advance(ChronoDuration::seconds(2));

        let result = collector.query_processes(&ProcessQuery::default()).await;
        assert!(matches!(
            result,
            Err(MetricsError::CacheExpired(MetricFamily::Process))
        ));
    }

    #[tokio::test]
    async fn test_current_value_lookup() {
        let probe = Arc::new(ScriptedProbe::new());
        let clock = Arc::new(ManualClock::starting_now());
        let collector = collector_with(CollectorConfig::default(), probe, clock);

        collector.sample_once().await;

        let usage = collector
            .current_value(&MetricKey::Cpu(CpuMetric::UsagePercent))
            .await
            .unwrap();
        assert_eq!(usage, 42.0);

        let free = collector
            .current_value(&MetricKey::Memory(MemoryMetric::Free))
            .await
            .unwrap();
        assert_eq!(free, 512.0);

        let packets = collector
            .current_value(&MetricKey::Network(NetworkMetric::PacketsRecv))
            .await
            .unwrap();
        assert_eq!(packets, 20.0);
    }
}
