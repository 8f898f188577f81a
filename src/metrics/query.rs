// Argus Host Monitoring Service - Process Query
// Filtering, sorting, heap-based top-N selection and pagination over snapshots

use super::{MetricsError, ProcessRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Sortable process fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Cpu,
    Memory,
    Name,
    Pid,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Query over a process snapshot.
///
/// Filters apply in declaration order, then either top-N selection
/// (`top_n > 0`) or sort + `(offset, limit)` pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessQuery {
    /// Keep records with at least this CPU percentage
    pub min_cpu: Option<f64>,

    /// Keep records with at least this memory percentage
    pub min_memory: Option<f32>,

    /// Keep records whose name contains this substring, case-insensitively
    pub name_contains: Option<String>,

    /// Sort field
    pub sort_by: SortField,

    /// Sort direction
    pub sort_order: SortOrder,

    /// When positive, return the `top_n` extremal records instead of a page
    pub top_n: usize,

    /// Pagination offset
    pub offset: usize,

    /// Pagination page size
    pub limit: usize,
}

impl Default for ProcessQuery {
    fn default() -> Self {
        Self {
            min_cpu: None,
            min_memory: None,
            name_contains: None,
            sort_by: SortField::Cpu,
            sort_order: SortOrder::Desc,
            top_n: 0,
            offset: 0,
            limit: 10,
        }
    }
}

impl ProcessQuery {
    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.top_n == 0 && self.limit == 0 {
            return Err(MetricsError::InvalidQuery(
                "limit must be positive".to_string(),
            ));
        }
        if let Some(min_cpu) = self.min_cpu {
            if !min_cpu.is_finite() || min_cpu < 0.0 {
                return Err(MetricsError::InvalidQuery(
                    "min_cpu must be a non-negative number".to_string(),
                ));
            }
        }
        if let Some(min_memory) = self.min_memory {
            if !min_memory.is_finite() || min_memory < 0.0 {
                return Err(MetricsError::InvalidQuery(
                    "min_memory must be a non-negative number".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Run the query against a snapshot.
    ///
    /// Returns the selected records and the post-filter total used for
    /// pagination metadata.
    pub fn apply(&self, records: &[ProcessRecord]) -> Result<(Vec<ProcessRecord>, usize), MetricsError> {
        self.validate()?;

        let needle = self.name_contains.as_ref().map(|s| s.to_lowercase());
        let filtered: Vec<&ProcessRecord> = records
            .iter()
            .filter(|r| self.min_cpu.map_or(true, |min| r.cpu_percent >= min))
            .filter(|r| self.min_memory.map_or(true, |min| r.mem_percent >= min))
            .filter(|r| {
                needle
                    .as_ref()
                    .map_or(true, |n| r.name.to_lowercase().contains(n))
            })
            .collect();

        let total = filtered.len();

        let selected = if self.top_n > 0 {
            if self.top_n < total {
                self.select_top_n(&filtered)
            } else {
                // Selection covers the whole filtered set.
                let mut all: Vec<ProcessRecord> = filtered.into_iter().cloned().collect();
                all.sort_by(|a, b| compare_records(a, b, self.sort_by, self.sort_order));
                all
            }
        } else {
            let mut sorted: Vec<ProcessRecord> = filtered.into_iter().cloned().collect();
            sorted.sort_by(|a, b| compare_records(a, b, self.sort_by, self.sort_order));
            if self.offset >= sorted.len() {
                Vec::new()
            } else {
                let end = (self.offset + self.limit).min(sorted.len());
                sorted[self.offset..end].to_vec()
            }
        };

        Ok((selected, total))
    }

    /// Heap-based selection of the `top_n` records extremal under the
    /// requested order, O(n log k). Returns them fully sorted.
    fn select_top_n(&self, filtered: &[&ProcessRecord]) -> Vec<ProcessRecord> {
        let mut heap: BinaryHeap<Ranked<'_>> = BinaryHeap::with_capacity(self.top_n + 1);

        for record in filtered.iter().copied() {
            heap.push(Ranked {
                record,
                sort_by: self.sort_by,
                sort_order: self.sort_order,
            });
            if heap.len() > self.top_n {
                // Evict the record that sorts last among those kept.
                heap.pop();
            }
        }

        let mut selected: Vec<ProcessRecord> =
            heap.into_iter().map(|r| r.record.clone()).collect();
        selected.sort_by(|a, b| compare_records(a, b, self.sort_by, self.sort_order));
        selected
    }
}

/// Total order over records for a `(field, order)` pair. Ties between equal
/// keys are left to the underlying sort.
fn compare_records(
    a: &ProcessRecord,
    b: &ProcessRecord,
    field: SortField,
    order: SortOrder,
) -> Ordering {
    let ordering = match field {
        SortField::Cpu => a.cpu_percent.total_cmp(&b.cpu_percent),
        SortField::Memory => a.mem_percent.total_cmp(&b.mem_percent),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Pid => a.pid.cmp(&b.pid),
    };
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Heap entry whose max element is the record sorting last under the
/// requested order, so the binary max-heap evicts the worst candidate.
struct Ranked<'a> {
    record: &'a ProcessRecord,
    sort_by: SortField,
    sort_order: SortOrder,
}

impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_records(self.record, other.record, self.sort_by, self.sort_order)
    }
}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}
