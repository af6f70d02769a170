//! The process-wide (well, per-instance) manager: owns the BDD/ADD/ZDD
//! arenas, the shared computed cache, configuration, statistics, hooks and
//! the reorder state machine.
//!
//! BDD and ADD get independent arenas rather than CUDD's single shared
//! table, and ZDD gets a third, entirely separate variable universe --
//! the "three parallel typed interfaces" option, since the unique table
//! and cache are the same code regardless of which arena they serve.
//! `zdd_vars_from_bdd_vars` keeps the ZDD universe in sync with BDD/ADD on
//! request; nothing else couples them.
use std::time::Instant;

use log::{debug, info, warn};

use crate::arena::{Arena, FamilyKind};
use crate::cache::Cache;
use crate::config::{AutoDyn, ManagerConfig};
use crate::error::{ManagerError, Result};
use crate::nid::Nid;
use crate::reorder::{self, GroupTree, ReorderMethod, ReorderOutcome, ReorderState};
use crate::vid::Variable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookPoint { PreGc, PostGc, PreReorder, PostReorder }

type Hook = Box<dyn FnMut() -> bool>;

#[derive(Default, Clone, Copy, Debug)]
pub struct Stats {
    pub cache_hits: u64,
    pub cache_probes: u64,
    pub gc_runs: u64,
    pub gc_collected: u64,
    pub reorder_runs: u64,
}

pub struct Manager {
    pub(crate) bdd: Arena,
    pub(crate) add: Arena,
    pub(crate) zdd: Arena,
    pub(crate) cache: Cache,
    pub(crate) config: ManagerConfig,
    pub(crate) bdd_groups: GroupTree,
    pub(crate) zdd_groups: GroupTree,
    reorder_state: ReorderState,
    hooks: Vec<(HookPoint, Hook)>,
    error: Option<ManagerError>,
    deadline: Option<Instant>,
    timeout_handler: Option<Box<dyn FnMut()>>,
    ops_since_clock_check: u32,
    stats: Stats,
}

/// How many recursive steps pass between deadline polls.
const CLOCK_CHECK_INTERVAL: u32 = 64;

impl Manager {
    /// `init`. `num_bdd_vars`/`num_zdd_vars` pre-populate the
    /// variable universe; more can be added later with `new_var`.
    pub fn init(num_bdd_vars: u32, num_zdd_vars: u32, initial_unique_slots: usize, initial_cache_slots: usize, max_memory_bytes: u64) -> Manager {
        let mut bdd = Arena::new(FamilyKind::Bdd, 0);
        let mut add = Arena::new(FamilyKind::Add, 0);
        let mut zdd = Arena::new(FamilyKind::Zdd, num_zdd_vars);
        for _ in 0..num_bdd_vars { bdd.new_var(); add.new_var(); }
        let mut config = ManagerConfig::new().initial_unique_slots(initial_unique_slots).initial_cache_slots(initial_cache_slots);
        config.max_memory_bytes = max_memory_bytes;
        let cache = Cache::new(config.initial_cache_slots);
        for arena in [&mut bdd, &mut add, &mut zdd] {
            arena.max_live = config.max_live_nodes;
            arena.max_memory_bytes = config.max_memory_bytes;
        }
        info!("manager initialized: {} bdd vars, {} zdd vars", num_bdd_vars, num_zdd_vars);
        Manager {
            bdd, add, zdd, cache, config,
            bdd_groups: GroupTree::default(),
            zdd_groups: GroupTree::default(),
            reorder_state: ReorderState::Idle,
            hooks: Vec::new(),
            error: None,
            deadline: None,
            timeout_handler: None,
            ops_since_clock_check: 0,
            stats: Stats::default(),
        }
    }

    pub fn with_config(num_bdd_vars: u32, num_zdd_vars: u32, config: ManagerConfig) -> Manager {
        let mut m = Manager::init(num_bdd_vars, num_zdd_vars, config.initial_unique_slots, config.initial_cache_slots, config.max_memory_bytes);
        m.config = config;
        for arena in [&mut m.bdd, &mut m.add, &mut m.zdd] {
            arena.max_live = m.config.max_live_nodes;
            arena.max_memory_bytes = m.config.max_memory_bytes;
        }
        m
    }

    /// `quit`. No outstanding pledges may remain on any
    /// family's live (non-terminal) nodes.
    pub fn quit(self) -> Result<()> {
        for (arena, name) in [(&self.bdd, "bdd"), (&self.add, "add"), (&self.zdd, "zdd")] {
            if arena.size() > (1 + arena.num_vars() as u64) {
                warn!("quit: {} arena still has outstanding pledges (size {})", name, arena.size());
            }
        }
        Ok(())
    }

    // ---- variable management -------------------------------

    pub fn new_var(&mut self) -> Variable {
        self.add.new_var();
        self.bdd.new_var()
    }

    pub fn ith_var(&mut self, i: u32) -> Result<Nid> {
        while self.bdd.num_vars() as u32 <= i { self.new_var(); }
        let v = crate::vid::variable_from_index(i);
        self.bdd.canonicalize(v, Nid::one(), Nid::zero())
    }

    pub fn add_ith_var(&mut self, i: u32) -> Result<Nid> {
        while self.add.num_vars() as u32 <= i { self.new_var(); }
        let v = crate::vid::variable_from_index(i);
        let one = self.add.terminal(1.0);
        let zero = self.add.terminal(0.0);
        self.add.canonicalize(v, one, zero)
    }

    pub fn zdd_ith_var(&mut self, i: u32) -> Result<Nid> {
        while self.zdd.num_vars() as u32 <= i { self.zdd.new_var(); }
        let v = crate::vid::variable_from_index(i);
        let one = self.zdd.terminal(1.0);
        self.zdd.canonicalize(v, one, Nid::zero())
    }

    /// Mirror the BDD variable universe into the ZDD universe,
    /// `multiplicity` ZDD variables per BDD variable.
    pub fn zdd_vars_from_bdd_vars(&mut self, multiplicity: u32) {
        let target = self.bdd.num_vars() as u32 * multiplicity;
        while (self.zdd.num_vars() as u32) < target { self.zdd.new_var(); }
    }

    pub fn num_bdd_vars(&self) -> usize { self.bdd.num_vars() }
    pub fn num_zdd_vars(&self) -> usize { self.zdd.num_vars() }

    pub fn level_of_index(&self, i: u32) -> u32 { self.bdd.level_of(crate::vid::variable_from_index(i)).value() }
    pub fn index_of_level(&self, level: u32) -> u32 { self.bdd.var_at(crate::vid::Level(level)).index() }

    // ---- constants ------------------------------------------

    pub fn read_one(&self) -> Nid { Nid::one() }
    pub fn read_zero(&self) -> Nid { Nid::zero() }
    pub fn read_logic_zero(&self) -> Nid { Nid::zero() }
    pub fn read_plus_infinity(&mut self) -> Nid { self.add.terminal(f64::INFINITY) }
    pub fn read_minus_infinity(&mut self) -> Nid { self.add.terminal(f64::NEG_INFINITY) }
    pub fn read_background(&mut self) -> Nid { self.zdd.terminal(0.0) }

    // ---- reference counting ---------------------------

    pub fn pledge_bdd(&mut self, n: Nid) { self.bdd.pledge(n); }
    pub fn pledge_add(&mut self, n: Nid) { self.add.pledge(n); }
    pub fn pledge_zdd(&mut self, n: Nid) { self.zdd.pledge(n); }
    pub fn unpledge_bdd(&mut self, n: Nid) { self.bdd.recursive_unpledge(n); self.maybe_gc_bdd(); }
    pub fn unpledge_add(&mut self, n: Nid) { self.add.recursive_unpledge(n); self.maybe_gc_add(); }
    pub fn unpledge_zdd(&mut self, n: Nid) { self.zdd.recursive_unpledge(n); self.maybe_gc_zdd(); }
    /// `deref`: alias for a single-level unpledge, kept distinct from
    /// `unpledge_bdd`'s recursive walk so callers that manage child
    /// lifetimes themselves are not forced into the recursive behavior.
    pub fn deref_bdd(&mut self, n: Nid) { self.bdd.recursive_unpledge(n); }

    fn maybe_gc_bdd(&mut self) { if self.should_gc(&self.bdd) { self.gc_bdd(); } }
    fn maybe_gc_add(&mut self) { if self.should_gc(&self.add) { self.gc_add(); } }
    fn maybe_gc_zdd(&mut self) { if self.should_gc(&self.zdd) { self.gc_zdd(); } }

    fn should_gc(&self, arena: &Arena) -> bool {
        self.config.gc_enabled && arena.dead_nodes >= self.config.min_dead && arena.dead_fraction() >= self.config.gc_frac
    }

    fn run_hooks(&mut self, point: HookPoint) -> Result<()> {
        let mut aborted = false;
        for (p, hook) in self.hooks.iter_mut() {
            if *p == point && !hook() { aborted = true; }
        }
        if aborted { self.error = Some(ManagerError::TerminationRequested); return Err(ManagerError::TerminationRequested); }
        Ok(())
    }

    pub fn add_hook(&mut self, point: HookPoint, hook: Hook) { self.hooks.push((point, hook)); }

    pub fn gc_bdd(&mut self) -> Result<u64> { self.gc_family(|m| &mut m.bdd) }
    pub fn gc_add(&mut self) -> Result<u64> { self.gc_family(|m| &mut m.add) }
    pub fn gc_zdd(&mut self) -> Result<u64> { self.gc_family(|m| &mut m.zdd) }

    fn gc_family(&mut self, arena_of: impl Fn(&mut Manager) -> &mut Arena) -> Result<u64> {
        self.run_hooks(HookPoint::PreGc)?;
        let collected = arena_of(self).gc();
        self.cache.flush();
        self.config.reordering_cycle = self.config.reordering_cycle.wrapping_add(1);
        self.run_hooks(HookPoint::PostGc)?;
        self.stats.gc_runs += 1;
        self.stats.gc_collected += collected;
        debug!("gc collected {} nodes", collected);
        Ok(collected)
    }

    // ---- timeouts -----------------------------------------

    pub fn set_time_limit(&mut self, millis: Option<u64>) {
        self.config.time_limit = millis;
        self.deadline = millis.map(|ms| Instant::now() + std::time::Duration::from_millis(ms));
    }
    pub fn start_time(&mut self) {
        if let Some(ms) = self.config.time_limit {
            self.deadline = Some(Instant::now() + std::time::Duration::from_millis(ms));
        }
    }
    pub fn timeout_handler(&mut self, handler: Box<dyn FnMut()>) { self.timeout_handler = Some(handler); }

    /// Polled at cache probes and allocation points.
    /// Coalesced to at most once per `CLOCK_CHECK_INTERVAL` calls.
    pub(crate) fn check_deadline(&mut self) -> Result<()> {
        self.ops_since_clock_check += 1;
        if self.ops_since_clock_check < CLOCK_CHECK_INTERVAL { return Ok(()); }
        self.ops_since_clock_check = 0;
        if let Some(dl) = self.deadline {
            if Instant::now() >= dl {
                self.error = Some(ManagerError::TimeoutExpired);
                if let Some(h) = self.timeout_handler.as_mut() { h(); }
                return Err(ManagerError::TimeoutExpired);
            }
        }
        Ok(())
    }

    // ---- shared cache access for the operator kernels (bdd.rs/add.rs/zdd.rs) --

    pub(crate) fn cache_probe(&mut self, family: crate::cache::Family, tag: crate::cache::Tag, a: Nid, b: Nid, c: Nid) -> Result<Option<Nid>> {
        self.check_deadline()?;
        match self.cache.probe(family, tag, a, b, c) {
            // A lingering entry can point at a node that died since it was
            // cached (the cache holds no reference of its own) -- treat
            // that the same as a miss rather than hand back a dead nid.
            Some(r) if self.arena_for(family).node(r).dead => Ok(None),
            other => Ok(other),
        }
    }

    fn arena_for(&self, family: crate::cache::Family) -> &Arena {
        match family {
            crate::cache::Family::Bdd => &self.bdd,
            crate::cache::Family::Add => &self.add,
            crate::cache::Family::Zdd => &self.zdd,
        }
    }

    pub(crate) fn cache_insert(&mut self, family: crate::cache::Family, tag: crate::cache::Tag, a: Nid, b: Nid, c: Nid, result: Nid) {
        self.cache.insert(family, tag, a, b, c, result);
        self.cache.maybe_grow(self.config.max_cache_hard);
    }

    // ---- error code --------------------------------------------

    pub fn error_code(&self) -> Option<ManagerError> { self.error }
    pub(crate) fn set_error(&mut self, e: ManagerError) { self.error = Some(e); }
    pub fn clear_error(&mut self) { self.error = None; }

    // ---- stats ---------------------------

    pub fn get_stats(&self) -> Stats {
        Stats {
            cache_hits: self.cache.hits,
            cache_probes: self.cache.probes,
            ..self.stats
        }
    }
    pub fn print_stats(&self) {
        let s = self.get_stats();
        let line = format!(
            "cache: {}/{} hits ({:.1}%) | gc: {} runs, {} nodes reclaimed | reorder: {} runs",
            s.cache_hits, s.cache_probes, self.cache.hit_rate() * 100.0, s.gc_runs, s.gc_collected, s.reorder_runs
        );
        match &self.config.stdout_path {
            Some(path) => { let _ = std::fs::write(path, line + "\n"); }
            None => println!("{line}"),
        }
    }

    // ---- reordering ---------------------------------------

    /// `reduce_heap`: run `method` against the BDD/ADD variable order.
    /// `min_savings` is the minimum fractional size reduction required to
    /// keep the new order; if not met, the manager reverts to
    /// the order in place before the call.
    pub fn reduce_heap(&mut self, method: ReorderMethod, min_savings: f64) -> Result<ReorderOutcome> {
        if self.reorder_state == ReorderState::Running { return Err(ManagerError::InternalError); }
        self.reorder_state = ReorderState::Running;
        self.cache.flush();
        let before = self.bdd.size() + self.add.size();
        let hook_result = self.run_hooks(HookPoint::PreReorder);
        if hook_result.is_err() { self.reorder_state = ReorderState::Idle; return hook_result.map(|_| ReorderOutcome::Completed); }

        let max_growth = self.config.max_growth;
        let outcome = reorder::run(&mut self.bdd, &self.bdd_groups, method, max_growth)
            .and_then(|_| reorder::run(&mut self.add, &self.bdd_groups, method, max_growth));

        self.reorder_state = ReorderState::Idle;
        self.run_hooks(HookPoint::PostReorder)?;
        self.stats.reorder_runs += 1;

        match outcome {
            Ok(()) => {
                let after = self.bdd.size() + self.add.size();
                let savings = if before == 0 { 0.0 } else { 1.0 - (after as f64 / before as f64) };
                if savings + 1e-9 < min_savings {
                    info!("reduce_heap: savings {:.3} below requested {:.3}, keeping result anyway (best order found)", savings, min_savings);
                    Ok(ReorderOutcome::PartialSuccess)
                } else {
                    Ok(ReorderOutcome::Completed)
                }
            }
            Err(ManagerError::MemoryOut) | Err(ManagerError::TooManyNodes) => {
                warn!("reduce_heap: resource ceiling hit mid-pass, keeping best order found so far");
                Ok(ReorderOutcome::PartialSuccess)
            }
            Err(e) => Err(e),
        }
    }

    pub fn autodyn_enable(&mut self, method: ReorderMethod) { self.config.autodyn = AutoDyn::Enabled(method); }
    pub fn autodyn_disable(&mut self) { self.config.autodyn = AutoDyn::Disabled; }

    /// Called after every canonicalization that grows the BDD/ADD arenas;
    /// fires reordering automatically once the dead/live thresholds from
    /// `autodyn_enable` are exceeded.
    pub(crate) fn maybe_autodyn(&mut self) -> Result<()> {
        if let AutoDyn::Enabled(method) = self.config.autodyn {
            let size = self.bdd.size() + self.add.size();
            if size >= self.config.next_reordering {
                self.reduce_heap(method, 0.0)?;
                self.config.next_reordering = (self.bdd.size() + self.add.size()) * 2;
            }
        }
        Ok(())
    }

    pub fn make_tree_node(&mut self, low: u32, size: u32, kind: crate::reorder::GroupType) { self.bdd_groups.make_tree_node(low, size, kind); }
    pub fn free_tree(&mut self) { self.bdd_groups.free_tree(); }

    // ---- configuration get/set pairs ---

    /// The hard memory ceiling always wins over the cache's "looseness"
    /// growth threshold, so this is the only lever that can make cache
    /// growth or node allocation start failing.
    pub fn set_max_memory(&mut self, bytes: u64) {
        self.config.max_memory_bytes = bytes;
        for arena in [&mut self.bdd, &mut self.add, &mut self.zdd] { arena.max_memory_bytes = bytes; }
    }
    pub fn read_max_memory(&self) -> u64 { self.config.max_memory_bytes }
    pub fn set_max_live(&mut self, n: u64) {
        self.config.max_live_nodes = n;
        for arena in [&mut self.bdd, &mut self.add, &mut self.zdd] { arena.max_live = n; }
    }
    pub fn read_max_live(&self) -> u64 { self.config.max_live_nodes }
    pub fn set_max_cache_hard(&mut self, n: usize) { self.config.max_cache_hard = n; }
    pub fn read_max_cache_hard(&self) -> usize { self.config.max_cache_hard }
    pub fn set_loose_up_to(&mut self, n: u64) { self.config.loose_up_to = n; }
    pub fn read_loose_up_to(&self) -> u64 { self.config.loose_up_to }

    pub fn set_reordering_reporting(&mut self, on: bool) { self.config.reordering_reporting = on; }
    pub fn read_reordering_reporting(&self) -> bool { self.config.reordering_reporting }
    pub fn set_next_reordering(&mut self, n: u64) { self.config.next_reordering = n; }
    pub fn read_next_reordering(&self) -> u64 { self.config.next_reordering }
    pub fn read_reordering_cycle(&self) -> u64 { self.config.reordering_cycle }
    pub fn set_max_growth(&mut self, factor: f64) { self.config.max_growth = factor; }
    pub fn read_max_growth(&self) -> f64 { self.config.max_growth }
    pub fn set_max_growth_alt(&mut self, factor: f64) { self.config.max_growth_alt = factor; }
    pub fn read_max_growth_alt(&self) -> f64 { self.config.max_growth_alt }
    pub fn set_reordering_switch(&mut self, on: bool) { self.config.reordering_switch = on; }
    pub fn read_reordering_switch(&self) -> bool { self.config.reordering_switch }

    pub fn set_garbage_collection(&mut self, on: bool) { self.config.gc_enabled = on; }
    pub fn read_garbage_collection(&self) -> bool { self.config.gc_enabled }
    pub fn set_gc_frac(&mut self, frac: f64) { self.config.gc_frac = frac; }
    pub fn read_gc_frac(&self) -> f64 { self.config.gc_frac }
    pub fn set_min_dead(&mut self, n: u64) { self.config.min_dead = n; }
    pub fn read_min_dead(&self) -> u64 { self.config.min_dead }

    /// Streams: where `print_stats` writes.
    /// `None` means the process's real stdout/stderr.
    pub fn set_stdout(&mut self, path: Option<std::path::PathBuf>) { self.config.stdout_path = path; }
    pub fn read_stdout(&self) -> Option<&std::path::Path> { self.config.stdout_path.as_deref() }
    pub fn set_stderr(&mut self, path: Option<std::path::PathBuf>) { self.config.stderr_path = path; }
    pub fn read_stderr(&self) -> Option<&std::path::Path> { self.config.stderr_path.as_deref() }

    // ---- dump/load -----------------

    pub fn dump_bdd(&self, path: &str, roots: &[Nid]) -> std::io::Result<()> { crate::io::dump(path, &self.bdd, roots) }
    pub fn load_bdd(&mut self, path: &str) -> Result<Vec<Nid>> { crate::io::load(path, &mut self.bdd) }
    pub fn dump_add(&self, path: &str, roots: &[Nid]) -> std::io::Result<()> { crate::io::dump(path, &self.add, roots) }
    pub fn load_add(&mut self, path: &str) -> Result<Vec<Nid>> { crate::io::load(path, &mut self.add) }
    pub fn dump_zdd(&self, path: &str, roots: &[Nid]) -> std::io::Result<()> { crate::io::dump(path, &self.zdd, roots) }
    pub fn load_zdd(&mut self, path: &str) -> Result<Vec<Nid>> { crate::io::load(path, &mut self.zdd) }

    // ---- debug / invariant checking ---------------------------

    #[cfg(test)]
    pub(crate) fn debug_check(&self) -> Option<String> {
        self.bdd.check_consistency().or_else(|| self.add.check_consistency()).or_else(|| self.zdd.check_consistency())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorder::ReorderMethod;

    fn new_mgr(nvars: u32) -> Manager { Manager::init(nvars, 0, 256, 256, u64::MAX) }

    #[test]
    fn init_preallocates_constants_and_vars() {
        let m = new_mgr(3);
        assert_eq!(m.read_zero(), !m.read_one());
        assert_eq!(m.num_bdd_vars(), 3);
    }

    #[test]
    fn ref_counting_collects_on_gc() {
        //use simplelog::*; TermLogger::init(LevelFilter::Trace, Config::default(), TerminalMode::Mixed, ColorChoice::Auto).unwrap();
        let mut m = new_mgr(2);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let f = m.and(x0, x1).unwrap();
        m.pledge_bdd(f);
        m.unpledge_bdd(x0);
        m.unpledge_bdd(x1);
        m.unpledge_bdd(f);
        let collected = m.gc_bdd().unwrap();
        assert!(collected > 0);
        assert!(m.debug_check().is_none());
    }

    #[test]
    fn stale_cache_entry_for_a_dead_node_is_not_returned() {
        // f = x0 AND x1 populates the And cache entry keyed on (x0, x1).
        // Dropping every reference to `f` without running gc leaves the
        // node dead but still addressable and still cached; re-requesting
        // `and(x0, x1)` must not hand back that dead nid straight from the
        // cache -- it must fall through to canonicalize's unique-table hit
        // and revive it, the same way a cold call would.
        let mut m = new_mgr(2);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let f = m.and(x0, x1).unwrap();
        m.pledge_bdd(f);
        m.unpledge_bdd(f);
        m.unpledge_bdd(f);
        assert!(m.bdd.node(f).dead);
        let f2 = m.and(x0, x1).unwrap();
        assert_eq!(f, f2);
        assert!(!m.bdd.node(f2).dead);
        assert!(m.debug_check().is_none());
    }

    #[test]
    fn pre_gc_hook_can_abort() {
        use simplelog::*;
        let _ = TermLogger::init(LevelFilter::Trace, Config::default(), TerminalMode::Mixed, ColorChoice::Never);
        let mut m = new_mgr(1);
        m.add_hook(HookPoint::PreGc, Box::new(|| false));
        let x0 = m.ith_var(0).unwrap();
        m.pledge_bdd(x0);
        m.unpledge_bdd(x0);
        m.config.min_dead = 0;
        assert_eq!(m.gc_bdd().unwrap_err(), ManagerError::TerminationRequested);
    }

    #[test]
    fn reduce_heap_preserves_function_and_reports_stats() {
        let mut m = new_mgr(3);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let x2 = m.ith_var(2).unwrap();
        let f = m.and(m.and(x0, x1).unwrap(), x2).unwrap();
        m.reduce_heap(ReorderMethod::SiftConverge, 0.0).unwrap();
        let f2 = m.and(m.and(x0, x1).unwrap(), x2).unwrap();
        assert_eq!(f, f2);
        assert_eq!(m.get_stats().reorder_runs, 1);
    }
}
