// Argus Host Monitoring Service - Metrics Module
// Cached system metric samples with a filtered, paginated process query surface

pub mod collector;
pub mod probe;
pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use collector::MetricsCollector;
pub use probe::{SysinfoProbe, SystemProbe};
pub use query::{ProcessQuery, SortField, SortOrder};

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Sampling interval in seconds
    pub update_interval_secs: u64,

    /// Maximum age of a cached sample before readers see nothing, in seconds
    pub cache_ttl_secs: u64,

    /// Maximum number of processes retained in a snapshot
    pub process_limit: usize,

    /// Timeout for the process enumeration probe, in seconds
    pub process_probe_timeout_secs: u64,

    /// Timeout for the cpu/memory/network probes, in seconds
    pub probe_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 5,
            cache_ttl_secs: 10,
            process_limit: 100,
            process_probe_timeout_secs: 10,
            probe_timeout_secs: 5,
        }
    }
}

/// Metric families tracked by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Cpu,
    Memory,
    Network,
    Process,
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricFamily::Cpu => write!(f, "cpu"),
            MetricFamily::Memory => write!(f, "memory"),
            MetricFamily::Network => write!(f, "network"),
            MetricFamily::Process => write!(f, "process"),
        }
    }
}

/// CPU metric names available to alert thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpuMetric {
    UsagePercent,
    Load1,
    Load5,
    Load15,
}

/// Memory metric names available to alert thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMetric {
    UsedPercent,
    Used,
    Free,
}

/// Network metric names available to alert thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMetric {
    BytesSent,
    BytesRecv,
    PacketsSent,
    PacketsRecv,
}

/// Fully qualified metric identifier.
///
/// Serialized as `{"metric_type": "cpu", "metric_name": "load1"}` so alert
/// documents stay readable; unknown combinations are rejected at
/// deserialization instead of at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "metric_type", content = "metric_name", rename_all = "snake_case")]
pub enum MetricKey {
    Cpu(CpuMetric),
    Memory(MemoryMetric),
    Network(NetworkMetric),
}

impl MetricKey {
    /// Family the metric belongs to.
    pub fn family(&self) -> MetricFamily {
        match self {
            MetricKey::Cpu(_) => MetricFamily::Cpu,
            MetricKey::Memory(_) => MetricFamily::Memory,
            MetricKey::Network(_) => MetricFamily::Network,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKey::Cpu(m) => {
                let name = match m {
                    CpuMetric::UsagePercent => "usage_percent",
                    CpuMetric::Load1 => "load1",
                    CpuMetric::Load5 => "load5",
                    CpuMetric::Load15 => "load15",
                };
                write!(f, "cpu.{name}")
            }
            MetricKey::Memory(m) => {
                let name = match m {
                    MemoryMetric::UsedPercent => "used_percent",
                    MemoryMetric::Used => "used",
                    MemoryMetric::Free => "free",
                };
                write!(f, "memory.{name}")
            }
            MetricKey::Network(m) => {
                let name = match m {
                    NetworkMetric::BytesSent => "bytes_sent",
                    NetworkMetric::BytesRecv => "bytes_recv",
                    NetworkMetric::PacketsSent => "packets_sent",
                    NetworkMetric::PacketsRecv => "packets_recv",
                };
                write!(f, "network.{name}")
            }
        }
    }
}

/// CPU sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    /// Global CPU usage percentage
    pub usage_percent: f64,

    /// 1-minute load average
    pub load1: f64,

    /// 5-minute load average
    pub load5: f64,

    /// 15-minute load average
    pub load15: f64,
}

/// Virtual memory sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Total physical memory in bytes
    pub total: u64,

    /// Used memory in bytes
    pub used: u64,

    /// Free memory in bytes
    pub free: u64,

    /// Used memory percentage
    pub used_percent: f64,
}

/// Cumulative network I/O counters summed over all interfaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Bytes sent
    pub bytes_sent: u64,

    /// Bytes received
    pub bytes_recv: u64,

    /// Packets sent
    pub packets_sent: u64,

    /// Packets received
    pub packets_recv: u64,
}

/// A single process in a snapshot. Unique by pid within one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID
    pub pid: i32,

    /// Process name (kernel threads are filtered out before this point)
    pub name: String,

    /// CPU usage percentage
    pub cpu_percent: f64,

    /// Memory usage percentage
    pub mem_percent: f32,
}

/// Snapshot of live processes, pre-sorted by CPU% descending.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub processes: Vec<ProcessRecord>,
}

/// A cached sample of one metric family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sampled<T> {
    /// The sampled values
    pub data: T,

    /// When the sample was taken
    pub updated_at: DateTime<Utc>,
}

/// Every family in one response, for combined reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedMetrics {
    pub cpu: Option<Sampled<CpuMetrics>>,
    pub memory: Option<Sampled<MemoryMetrics>>,
    pub network: Option<Sampled<NetworkMetrics>>,
    pub processes: Option<Sampled<ProcessSnapshot>>,
    pub timestamp: DateTime<Utc>,
}

/// Source of current scalar metric values for alert evaluation.
///
/// The collector is the production implementation; evaluator tests script
/// their own.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn current_value(&self, key: &MetricKey) -> Result<f64, MetricsError>;
}

/// Metrics subsystem errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    /// No fresh sample for the family (never sampled, or past the TTL)
    CacheExpired(MetricFamily),

    /// An OS probe failed
    ProbeFailure { family: MetricFamily, reason: String },

    /// An OS probe exceeded its timeout
    ProbeTimeout(MetricFamily),

    /// Invalid process query parameters
    InvalidQuery(String),
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::CacheExpired(family) => {
                write!(f, "no fresh {family} sample in cache")
            }
            MetricsError::ProbeFailure { family, reason } => {
                write!(f, "{family} probe failed: {reason}")
            }
            MetricsError::ProbeTimeout(family) => write!(f, "{family} probe timed out"),
            MetricsError::InvalidQuery(msg) => write!(f, "invalid process query: {msg}"),
        }
    }
}

impl std::error::Error for MetricsError {}
