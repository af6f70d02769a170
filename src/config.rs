//! Builder-style run-time configuration, mirroring CUDD's `Cudd_Set*`/
//! `Cudd_Read*` option pairs as a
//! single struct passed to `Manager::with_config`, plus individual
//! `set_*`/`*()` accessors on `Manager` for run-time tuning.
use crate::reorder::ReorderMethod;

/// When automatic reordering fires, see `Manager::autodyn_enable`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoDyn { Disabled, Enabled(ReorderMethod) }

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub(crate) max_memory_bytes: u64,
    pub(crate) max_live_nodes: u64,
    pub(crate) max_cache_hard: usize,
    pub(crate) loose_up_to: u64,
    pub(crate) initial_unique_slots: usize,
    pub(crate) initial_cache_slots: usize,
    pub(crate) gc_enabled: bool,
    pub(crate) gc_frac: f64,
    pub(crate) min_dead: u64,
    pub(crate) reordering_reporting: bool,
    pub(crate) next_reordering: u64,
    pub(crate) reordering_cycle: u64,
    pub(crate) max_growth: f64,
    pub(crate) max_growth_alt: f64,
    pub(crate) reordering_switch: bool,
    pub(crate) time_limit: Option<u64>,
    pub(crate) autodyn: AutoDyn,
    pub(crate) stdout_path: Option<std::path::PathBuf>,
    pub(crate) stderr_path: Option<std::path::PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            max_memory_bytes: u64::MAX,
            max_live_nodes: u64::MAX,
            max_cache_hard: 1 << 24,
            loose_up_to: 1 << 18,
            initial_unique_slots: 256,
            initial_cache_slots: 1 << 12,
            gc_enabled: true,
            gc_frac: 0.2,
            min_dead: 256,
            reordering_reporting: false,
            next_reordering: 2048,
            reordering_cycle: 0,
            max_growth: 1.2,
            max_growth_alt: 2.0,
            reordering_switch: false,
            time_limit: None,
            autodyn: AutoDyn::Disabled,
            stdout_path: None,
            stderr_path: None,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self { Self::default() }
    pub fn max_memory(mut self, bytes: u64) -> Self { self.max_memory_bytes = bytes; self }
    pub fn max_live(mut self, n: u64) -> Self { self.max_live_nodes = n; self }
    pub fn max_cache_hard(mut self, n: usize) -> Self { self.max_cache_hard = n; self }
    pub fn loose_up_to(mut self, n: u64) -> Self { self.loose_up_to = n; self }
    pub fn initial_unique_slots(mut self, n: usize) -> Self { self.initial_unique_slots = n; self }
    pub fn initial_cache_slots(mut self, n: usize) -> Self { self.initial_cache_slots = n; self }
    pub fn gc_enabled(mut self, on: bool) -> Self { self.gc_enabled = on; self }
    pub fn gc_frac(mut self, frac: f64) -> Self { self.gc_frac = frac; self }
    pub fn min_dead(mut self, n: u64) -> Self { self.min_dead = n; self }
    pub fn time_limit(mut self, millis: Option<u64>) -> Self { self.time_limit = millis; self }
    pub fn next_reordering(mut self, n: u64) -> Self { self.next_reordering = n; self }
}
