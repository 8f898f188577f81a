// Argus Host Monitoring Service - OS Probes
// sysinfo-backed sampling of CPU, memory, network and process metrics

use super::{CpuMetrics, MemoryMetrics, MetricFamily, MetricsError, NetworkMetrics, ProcessRecord};
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use sysinfo::{CpuExt, NetworkExt, PidExt, ProcessExt, System, SystemExt};
use tokio::sync::Mutex;

/// Window used to measure global CPU usage between two refreshes.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Platform probe behind the collector.
///
/// Implementations must be cancellation-safe: the collector bounds every
/// call with a timeout and drops the future when it fires.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Sample global CPU usage and load averages.
    async fn sample_cpu(&self) -> Result<CpuMetrics, MetricsError>;

    /// Sample virtual memory statistics.
    async fn sample_memory(&self) -> Result<MemoryMetrics, MetricsError>;

    /// Sample cumulative network I/O counters.
    async fn sample_network(&self) -> Result<NetworkMetrics, MetricsError>;

    /// Enumerate live processes.
    ///
    /// Kernel threads (empty name or a name beginning with `[`) and
    /// non-positive pids are excluded. Per-process metric failures default
    /// the field to zero without dropping the record.
    async fn sample_processes(&self) -> Result<Vec<ProcessRecord>, MetricsError>;
}

/// [`SystemProbe`] implementation over the `sysinfo` crate.
///
/// Holds one `System` so consecutive process refreshes produce meaningful
/// CPU deltas; the very first snapshot reports zero per-process CPU.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for SysinfoProbe {
    async fn sample_cpu(&self) -> Result<CpuMetrics, MetricsError> {
        {
            let mut system = self.system.lock().await;
            system.refresh_cpu();
        }

        // Usage is the delta between two refreshes.
        tokio::time::sleep(CPU_SAMPLE_WINDOW).await;

        let mut system = self.system.lock().await;
        system.refresh_cpu();
        let usage_percent = system.global_cpu_info().cpu_usage() as f64;
        let load = load_average(&system);

        debug!("Sampled CPU: {usage_percent:.2}% load1={:.2}", load.0);

        Ok(CpuMetrics {
            usage_percent,
            load1: load.0,
            load5: load.1,
            load15: load.2,
        })
    }

    async fn sample_memory(&self) -> Result<MemoryMetrics, MetricsError> {
        let mut system = self.system.lock().await;
        system.refresh_memory();

        let total = system.total_memory();
        let used = system.used_memory();
        let free = system.free_memory();
        let used_percent = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Ok(MemoryMetrics {
            total,
            used,
            free,
            used_percent,
        })
    }

    async fn sample_network(&self) -> Result<NetworkMetrics, MetricsError> {
        let mut system = self.system.lock().await;
        system.refresh_networks_list();
        system.refresh_networks();

        let mut metrics = NetworkMetrics::default();
        for (_name, network) in system.networks() {
            metrics.bytes_sent += network.total_transmitted();
            metrics.bytes_recv += network.total_received();
            metrics.packets_sent += network.total_packets_transmitted();
            metrics.packets_recv += network.total_packets_received();
        }

        Ok(metrics)
    }

    async fn sample_processes(&self) -> Result<Vec<ProcessRecord>, MetricsError> {
        let mut system = self.system.lock().await;
        system.refresh_processes();

        let total_memory = system.total_memory();
        let mut records = Vec::with_capacity(system.processes().len());

        for (pid, process) in system.processes() {
            let pid = pid.as_u32() as i32;
            if pid <= 0 {
                continue;
            }

            let name = process.name();
            if name.is_empty() || name.starts_with('[') {
                continue;
            }

            let cpu_percent = process.cpu_usage() as f64;
            let mem_percent = if total_memory > 0 {
                (process.memory() as f64 / total_memory as f64 * 100.0) as f32
            } else {
                0.0
            };

            records.push(ProcessRecord {
                pid,
                name: name.to_string(),
                cpu_percent,
                mem_percent,
            });
        }

        if records.is_empty() {
            warn!("Process enumeration produced no records");
            return Err(MetricsError::ProbeFailure {
                family: MetricFamily::Process,
                reason: "process table is empty".to_string(),
            });
        }

        Ok(records)
    }
}

#[cfg(unix)]
fn load_average(system: &System) -> (f64, f64, f64) {
    let load = system.load_average();
    (load.one, load.five, load.fifteen)
}

#[cfg(not(unix))]
fn load_average(_system: &System) -> (f64, f64, f64) {
    (0.0, 0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_probe_reports_totals() {
        let probe = SysinfoProbe::new();
        let memory = probe.sample_memory().await.unwrap();

        assert!(memory.total > 0);
        assert!(memory.used <= memory.total);
        assert!(memory.used_percent >= 0.0 && memory.used_percent <= 100.0);
    }

    #[tokio::test]
    async fn test_process_probe_filters_kernel_threads() {
        let probe = SysinfoProbe::new();
        let records = probe.sample_processes().await.unwrap();

        assert!(!records.is_empty());
        for record in &records {
            assert!(record.pid > 0);
            assert!(!record.name.is_empty());
            assert!(!record.name.starts_with('['));
        }
    }

    #[tokio::test]
    async fn test_process_probe_unique_pids() {
        let probe = SysinfoProbe::new();
        let records = probe.sample_processes().await.unwrap();

        let mut pids: Vec<i32> = records.iter().map(|r| r.pid).collect();
        pids.sort_unstable();
        pids.dedup();
        assert_eq!(pids.len(), records.len());
    }
}
