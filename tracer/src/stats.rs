//! Per-operation execution statistics

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Running statistics for one operation name. Monotonic: values never
/// shrink, entries live for the whole profiling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStat {
    pub total_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub call_count: u64,
}

/// Statistics keyed by operation display name, updated at retirement.
#[derive(Debug, Default)]
pub struct KernelStatMap {
    stats: HashMap<String, KernelStat>,
}

impl KernelStatMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed call into the named operation's entry.
    pub fn record(&mut self, name: &str, duration_ns: u64) {
        match self.stats.get_mut(name) {
            Some(stat) => {
                stat.total_ns += duration_ns;
                stat.min_ns = stat.min_ns.min(duration_ns);
                stat.max_ns = stat.max_ns.max(duration_ns);
                stat.call_count += 1;
            }
            None => {
                self.stats.insert(
                    name.to_string(),
                    KernelStat {
                        total_ns: duration_ns,
                        min_ns: duration_ns,
                        max_ns: duration_ns,
                        call_count: 1,
                    },
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&KernelStat> {
        self.stats.get(name)
    }

    /// Snapshot ranked by descending total time, ties broken by descending
    /// call count. This ordering is part of the reporting contract. The
    /// residual name tie-break only keeps the output deterministic.
    pub fn ranked(&self) -> Vec<(String, KernelStat)> {
        let mut entries: Vec<(String, KernelStat)> = self
            .stats
            .iter()
            .map(|(name, stat)| (name.clone(), *stat))
            .collect();
        entries.sort_by(|(a_name, a), (b_name, b)| {
            b.total_ns
                .cmp(&a.total_ns)
                .then(b.call_count.cmp(&a.call_count))
                .then(a_name.cmp(b_name))
        });
        entries
    }
}
