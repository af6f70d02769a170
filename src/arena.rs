//! The node arena + unique table + canonicalization for one family
//! (BDD/ADD share an arena; ZDD gets its own instance). Each row is a
//! `FxHashMap<(then, else), index>` hash-consing table keyed per variable,
//! single-threaded and index-only from the start (see `nid.rs`).
use fxhash::FxHashMap;
use log::{debug, trace};

use crate::error::{ManagerError, Result};
use crate::nid::Nid;
use crate::node::{Node, NIL, PINNED};
use crate::vid::{Level, Variable};

/// Which reduction / canonicalization rule an arena enforces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FamilyKind {
    /// Complement edges; then-child is never complemented (Bryant's rules).
    Bdd,
    /// Same node shape as `Bdd` but edges are never complemented and
    /// terminals carry arbitrary real values.
    Add,
    /// No complement edges; nodes whose then-child is the empty-set
    /// terminal are suppressed.
    Zdd,
}

fn remap_nid(n: Nid, remap: &FxHashMap<u32, Nid>) -> Nid {
    match remap.get(&n.index()) {
        Some(&new) => new.inv_if(n.is_inv()),
        None => n,
    }
}

/// One sub-table per variable: hash-consed by (then, else).
#[derive(Default)]
struct UniqueRow {
    index: FxHashMap<(Nid, Nid), u32>,
}

pub(crate) struct Arena {
    pub kind: FamilyKind,
    nodes: Vec<Node>,
    /// Terminal payload, meaningful only at terminal indices. Index 0 is
    /// always the family's "default" terminal (false / 0.0 / empty-set).
    values: Vec<f64>,
    /// Reverse lookup so that equal ADD constants share one terminal node.
    value_index: FxHashMap<u64, u32>,
    rows: Vec<UniqueRow>,
    var_of_level: Vec<Variable>,
    level_of_var: Vec<Level>,
    free_head: u32,
    pub live_nodes: u64,
    pub dead_nodes: u64,
    resize_threshold: usize,
    /// Config-driven ceilings (`max_live`/`max_memory`), enforced
    /// at the allocation point inside `canonicalize`. Default to unbounded;
    /// `Manager` sets these from `ManagerConfig` at construction and on
    /// `set_max_live`/`set_max_memory`.
    pub(crate) max_live: u64,
    pub(crate) max_memory_bytes: u64,
}

/// Rough per-node footprint (node record + terminal value slot + one
/// unique-table bucket entry), used to translate `max_memory_bytes` into a
/// node-count ceiling without tracking real allocator bytes.
const BYTES_PER_NODE_ESTIMATE: u64 = 64;

impl Arena {
    pub fn new(kind: FamilyKind, num_vars: u32) -> Arena {
        let mut a = Arena {
            kind,
            nodes: vec![Node::terminal()],
            values: vec![0.0],
            value_index: FxHashMap::default(),
            rows: Vec::new(),
            var_of_level: Vec::new(),
            level_of_var: Vec::new(),
            free_head: NIL,
            live_nodes: 1,
            dead_nodes: 0,
            resize_threshold: 8,
            max_live: u64::MAX,
            max_memory_bytes: u64::MAX,
        };
        a.value_index.insert(0.0f64.to_bits(), 0);
        for _ in 0..num_vars { a.new_var(); }
        a
    }

    pub fn num_vars(&self) -> usize { self.rows.len() }

    pub fn new_var(&mut self) -> Variable {
        let var = Variable(self.rows.len() as u32);
        let level = Level(self.var_of_level.len() as u32);
        self.rows.push(UniqueRow::default());
        self.var_of_level.push(var);
        self.level_of_var.push(level);
        var
    }

    #[inline] pub fn level_of(&self, var: Variable) -> Level { self.level_of_var[var.index() as usize] }
    #[inline] pub fn var_at(&self, level: Level) -> Variable { self.var_of_level[level.value() as usize] }

    #[inline] pub fn node(&self, n: Nid) -> &Node { &self.nodes[n.index() as usize] }

    #[inline] pub fn level_of_nid(&self, n: Nid) -> Level {
        match self.node(n).var {
            Some(v) => self.level_of(v),
            None => Level::BOTTOM,
        }
    }

    /// Child when the top edge sign is accounted for (BDD complement pushes
    /// through to both children).
    pub fn then_child(&self, n: Nid) -> Nid {
        let node = self.node(n);
        node.then_.inv_if(self.kind == FamilyKind::Bdd && n.is_inv())
    }
    pub fn else_child(&self, n: Nid) -> Nid {
        let node = self.node(n);
        node.else_.inv_if(self.kind == FamilyKind::Bdd && n.is_inv())
    }

    pub fn value(&self, n: Nid) -> f64 {
        debug_assert!(self.node(n).is_terminal());
        let v = self.values[n.index() as usize];
        if n.is_inv() { -v } else { v }
    }

    pub fn terminal(&mut self, value: f64) -> Nid {
        if value == 0.0 { return Nid::zero(); }
        let bits = value.to_bits();
        if let Some(&ix) = self.value_index.get(&bits) { return Nid::new(ix, false); }
        let ix = self.alloc_slot(Node::terminal());
        self.values[ix as usize] = value;
        self.value_index.insert(bits, ix);
        Nid::new(ix, false)
    }

    fn alloc_slot(&mut self, node: Node) -> u32 {
        if self.free_head != NIL {
            let ix = self.free_head;
            self.free_head = self.nodes[ix as usize].next;
            self.nodes[ix as usize] = node;
            self.values.resize(self.nodes.len(), 0.0);
            ix
        } else {
            self.nodes.push(node);
            self.values.push(0.0);
            (self.nodes.len() - 1) as u32
        }
    }

    /// Core canonicalization: reduce, sign-normalize, zero-suppress, then
    /// hash-cons (var, then, else) into the unique table, allocating a
    /// fresh node only on a true miss.
    pub fn canonicalize(&mut self, var: Variable, mut then_: Nid, mut else_: Nid) -> Result<Nid> {
        // 1. reduction check
        if then_ == else_ { return Ok(else_); }
        let mut sign = false;
        // 2. canonical sign (BDD only): then-edge is never complemented.
        if self.kind == FamilyKind::Bdd && then_.is_inv() {
            then_ = !then_;
            else_ = !else_;
            sign = true;
        }
        // 3. zero suppression (ZDD only).
        if self.kind == FamilyKind::Zdd && then_.is_zero() {
            return Ok(else_.inv_if(sign));
        }
        let level_t = self.level_of_nid(then_);
        let level_e = self.level_of_nid(else_);
        let my_level = self.level_of(var);
        debug_assert!(my_level.is_above(&level_t) && my_level.is_above(&level_e),
            "ordering violated: {:?} not above children", var);

        let key = (then_, else_);
        if let Some(&ix) = self.rows[var.index() as usize].index.get(&key) {
            let was_dead = self.nodes[ix as usize].dead;
            self.reclaim(Nid::new(ix, false));
            if was_dead { trace!("revived node {} on {:?}", ix, var); }
            return Ok(Nid::new(ix, sign));
        }

        if self.live_nodes + self.dead_nodes >= u32::MAX as u64 - 1 {
            return Err(ManagerError::MemoryOut);
        }
        if self.live_nodes + 1 > self.max_live {
            return Err(ManagerError::TooManyNodes);
        }
        if (self.live_nodes + self.dead_nodes + 1).saturating_mul(BYTES_PER_NODE_ESTIMATE) > self.max_memory_bytes {
            return Err(ManagerError::MemoryOut);
        }
        let ix = self.alloc_slot(Node::internal(var, then_, else_));
        self.nodes[ix as usize].ref_count = 1;
        // A live node holds an implicit pledge on each child; this is what
        // makes `recursive_unpledge` correct.
        self.reclaim(then_);
        self.reclaim(else_);
        self.rows[var.index() as usize].index.insert(key, ix);
        self.live_nodes += 1;
        if self.rows[var.index() as usize].index.len() > self.resize_threshold {
            self.resize_threshold *= 2;
        }
        Ok(Nid::new(ix, sign))
    }

    /// Add one reference to `n`. If `n` is currently dead, this is a
    /// revival: clear the dead flag, set ref to 1, and -- since a dead
    /// node's own hold on *its* children was released when it died --
    /// recursively reclaim those children too (mirrors CUDD's
    /// `cuddReclaim`). A node that is already alive is simply ref-bumped;
    /// its own children's accounting is already correct.
    fn reclaim(&mut self, n: Nid) {
        let ix = n.index() as usize;
        if self.nodes[ix].ref_count == PINNED { return; }
        if self.nodes[ix].dead {
            self.nodes[ix].revive();
            self.live_nodes += 1;
            self.dead_nodes -= 1;
            let (t, e) = (self.nodes[ix].then_, self.nodes[ix].else_);
            self.reclaim(t);
            self.reclaim(e);
        } else {
            self.nodes[ix].bump_ref();
        }
    }

    /// Pledge: caller takes a reference to `n`, reviving it (and,
    /// transitively, any of its children that had also gone dead) if
    /// necessary -- a cache hit or a trivial short-circuit can hand back a
    /// node that nothing else currently holds live.
    pub fn pledge(&mut self, n: Nid) {
        self.reclaim(n.raw());
    }

    /// Canonicalize `(var, t, e)` and release the transient references `t`
    /// and `e` picked up from being returned by nested recursive calls --
    /// CUDD's `cuddRef(T); cuddRef(E); ...; cuddDeref(T); cuddDeref(E);`
    /// bracket around `cuddUniqueInter` in its `apply`-style operators.
    /// Without this, every operator recursion's intermediates keep the
    /// reference count they were handed back with, on top of whatever
    /// hold `canonicalize` itself adds when `t`/`e` become a child of the
    /// freshly built node -- the intermediates then never reach ref 0
    /// and the unique table only grows. The pledge/unpledge pair here is
    /// self-balancing around whichever path `canonicalize` takes
    /// (reduction, unique-table hit, or fresh allocation), so callers
    /// never need to special-case `t == e`.
    pub fn canonicalize_release(&mut self, var: Variable, t: Nid, e: Nid) -> Result<Nid> {
        self.pledge(t);
        self.pledge(e);
        let r = self.canonicalize(var, t, e);
        self.recursive_unpledge(t);
        self.recursive_unpledge(e);
        r
    }

    /// Recursively drop a reference; if it reaches zero, recurse into
    /// children.
    pub fn recursive_unpledge(&mut self, n: Nid) {
        let ix = n.index() as usize;
        if self.nodes[ix].ref_count == PINNED { return; }
        let became_dead = self.nodes[ix].drop_ref();
        if became_dead {
            self.live_nodes -= 1;
            self.dead_nodes += 1;
            let (t, e) = (self.nodes[ix].then_, self.nodes[ix].else_);
            self.recursive_unpledge(t);
            self.recursive_unpledge(e);
        }
    }

    pub fn dead_fraction(&self) -> f64 {
        let total = self.live_nodes + self.dead_nodes;
        if total == 0 { 0.0 } else { self.dead_nodes as f64 / total as f64 }
    }

    /// Unlink dead nodes from their unique-table bucket and return them to
    /// the free list. Does not touch terminals.
    pub fn gc(&mut self) -> u64 {
        let mut collected = 0u64;
        for (vi, row) in self.rows.iter_mut().enumerate() {
            row.index.retain(|_, &mut ix| {
                let keep = !self.nodes[ix as usize].dead;
                if !keep {
                    collected += 1;
                    let _ = vi;
                }
                keep
            });
        }
        // second pass: physically reclaim, after bucket unlinking above.
        for ix in 0..self.nodes.len() {
            if self.nodes[ix].dead {
                self.nodes[ix].next = self.free_head;
                self.free_head = ix as u32;
                self.nodes[ix].dead = false; // slot is free, not a live dead-node anymore
            }
        }
        self.dead_nodes -= collected;
        debug!("gc reclaimed {} nodes ({} live remain)", collected, self.live_nodes);
        collected
    }

    pub fn size(&self) -> u64 { self.live_nodes }

    #[inline] pub(crate) fn var_of(&self, n: Nid) -> Option<Variable> { self.node(n).var }

    /// Cofactor `n` with respect to `var`: `(n, n)` (the trivial
    /// cofactor) when `n` does not branch on `var`.
    pub(crate) fn cofactor(&self, n: Nid, var: Variable) -> (Nid, Nid) {
        if self.var_of(n) == Some(var) { (self.then_child(n), self.else_child(n)) } else { (n, n) }
    }

    /// The variable of minimal level among however many nids are given,
    /// skipping terminals.
    pub(crate) fn top_var(&self, nids: &[Nid]) -> Option<Variable> {
        let mut best: Option<(Level, Variable)> = None;
        for &n in nids {
            if let Some(v) = self.var_of(n) {
                let l = self.level_of(v);
                if best.map_or(true, |(bl, _)| l < bl) { best = Some((l, v)); }
            }
        }
        best.map(|(_, v)| v)
    }

    pub(crate) fn row_len(&self, v: Variable) -> usize { self.rows[v.index() as usize].index.len() }

    pub(crate) fn levels_adjacent(&self, v: Variable, w: Variable) -> bool {
        let (a, b) = (self.level_of(v).value() as i64, self.level_of(w).value() as i64);
        (a - b).abs() == 1
    }

    /// Exchange the level assignment of two variables without touching any
    /// node content. Safe to call only after `rebuild_for_swap`'s output
    /// has already been folded in via `substitute_children`/`rebuild_rows`
    /// (reorder.rs `swap_adjacent`).
    pub(crate) fn swap_levels(&mut self, v: Variable, w: Variable) {
        let lv = self.level_of(v);
        let lw = self.level_of(w);
        self.var_of_level[lv.value() as usize] = w;
        self.var_of_level[lw.value() as usize] = v;
        self.level_of_var[v.index() as usize] = lw;
        self.level_of_var[w.index() as usize] = lv;
    }

    /// Identify the nodes at `v`'s level that reference `w` directly (the
    /// only ones whose content must change for an adjacent swap), and
    /// return a map from their old index to a freshly canonicalized
    /// replacement built against the new top variable `w`.
    pub(crate) fn rebuild_for_swap(&mut self, v: Variable, w: Variable) -> Result<FxHashMap<u32, Nid>> {
        let mut candidates = Vec::new();
        for (ix, node) in self.nodes.iter().enumerate() {
            if node.dead || node.is_terminal() || node.var != Some(v) { continue; }
            if self.var_of(node.then_) == Some(w) || self.var_of(node.else_) == Some(w) {
                candidates.push(ix as u32);
            }
        }
        let mut remap = FxHashMap::default();
        for ix in candidates {
            let node = self.nodes[ix as usize];
            let (hi, lo) = (node.then_, node.else_);
            let (hi1, hi0) = if self.var_of(hi) == Some(w) { (self.then_child(hi), self.else_child(hi)) } else { (hi, hi) };
            let (lo1, lo0) = if self.var_of(lo) == Some(w) { (self.then_child(lo), self.else_child(lo)) } else { (lo, lo) };
            let sub_hi = self.canonicalize(v, hi1, lo1)?;
            let sub_lo = self.canonicalize(v, hi0, lo0)?;
            let new_nid = self.canonicalize(w, sub_hi, sub_lo)?;
            remap.insert(ix, new_nid);
        }
        Ok(remap)
    }

    /// Rewrite every surviving node's children through `remap` (old index
    /// -> replacement nid, sign-adjusted). Nodes that are themselves keys
    /// of `remap` are left untouched; they are freed right after by the
    /// caller.
    pub(crate) fn substitute_children(&mut self, remap: &FxHashMap<u32, Nid>) {
        for ix in 0..self.nodes.len() {
            if remap.contains_key(&(ix as u32)) { continue; }
            let node = self.nodes[ix];
            if node.dead || node.is_terminal() { continue; }
            let then_ = remap_nid(node.then_, remap);
            let else_ = remap_nid(node.else_, remap);
            self.nodes[ix].then_ = then_;
            self.nodes[ix].else_ = else_;
        }
    }

    /// Full rehash of every per-variable row from the current node
    /// contents. Simple and correct; paid for by `reorder.rs` only around
    /// reordering operations, never inside operator recursion.
    pub(crate) fn rebuild_rows(&mut self) {
        for row in self.rows.iter_mut() { row.index.clear(); }
        for (ix, node) in self.nodes.iter().enumerate() {
            if node.dead || node.is_terminal() { continue; }
            if let Some(v) = node.var {
                self.rows[v.index() as usize].index.insert((node.then_, node.else_), ix as u32);
            }
        }
    }

    /// Return a node slot to the free list outright (used only by the
    /// reorder substitution pass, which has already proven the slot has no
    /// remaining referrers).
    pub(crate) fn free_index(&mut self, ix: u32) {
        self.nodes[ix as usize] = Node { var: None, then_: Nid::zero(), else_: Nid::zero(), ref_count: 0, next: self.free_head, dead: false };
        self.free_head = ix;
        self.live_nodes = self.live_nodes.saturating_sub(1);
    }

    /// Structural symmetry test: for every
    /// node at the higher level, the `v=1,w=0` and `v=0,w=1` cofactors
    /// must coincide.
    pub(crate) fn check_symmetric(&self, v: Variable, w: Variable) -> bool {
        let (top, bot) = if self.level_of(v).value() < self.level_of(w).value() { (v, w) } else { (w, v) };
        let row = &self.rows[top.index() as usize];
        for (&(hi, lo), &ix) in row.index.iter() {
            if self.nodes[ix as usize].dead { continue; }
            let hi0 = if self.var_of(hi) == Some(bot) { self.else_child(hi) } else { hi };
            let lo1 = if self.var_of(lo) == Some(bot) { self.then_child(lo) } else { lo };
            if hi0 != lo1 { return false; }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn check_consistency(&self) -> Option<String> {
        for (vi, row) in self.rows.iter().enumerate() {
            for (&(t, e), &ix) in row.index.iter() {
                let node = &self.nodes[ix as usize];
                if node.dead { continue; }
                if t == e { return Some(format!("reduced pair survives canonicalization at {ix}")); }
                if self.kind == FamilyKind::Bdd && t.is_inv() {
                    return Some(format!("then-edge complemented at node {ix}"));
                }
                if self.kind == FamilyKind::Zdd && t.is_zero() {
                    return Some(format!("zero-suppression violated at node {ix}"));
                }
                let my_level = Level(vi as u32).value();
                let _ = my_level;
                let lt = self.level_of_nid(t);
                let le = self.level_of_nid(e);
                let mine = self.level_of(Variable(vi as u32));
                if !mine.is_above(&lt) || !mine.is_above(&le) {
                    return Some(format!("ordering violated at node {ix}"));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod budget_tests {
    use super::*;

    #[test]
    fn max_live_rejects_once_ceiling_reached() {
        let mut a = Arena::new(FamilyKind::Bdd, 8);
        // One node (the zero terminal) already lives; cap at exactly that.
        a.max_live = a.live_nodes;
        let err = a.canonicalize(Variable(0), Nid::one(), Nid::zero()).unwrap_err();
        assert_eq!(err, ManagerError::TooManyNodes);
    }

    #[test]
    fn max_live_allows_up_to_the_ceiling() {
        let mut a = Arena::new(FamilyKind::Bdd, 8);
        a.max_live = a.live_nodes + 1;
        let nid = a.canonicalize(Variable(0), Nid::one(), Nid::zero());
        assert!(nid.is_ok());
    }

    #[test]
    fn max_memory_rejects_once_budget_exceeded() {
        let mut a = Arena::new(FamilyKind::Bdd, 8);
        a.max_memory_bytes = (a.live_nodes + a.dead_nodes) * BYTES_PER_NODE_ESTIMATE;
        let err = a.canonicalize(Variable(0), Nid::one(), Nid::zero()).unwrap_err();
        assert_eq!(err, ManagerError::MemoryOut);
    }

    #[test]
    fn revived_dead_node_does_not_count_against_max_live() {
        // Canonicalizing the same (var, then, else) pair twice must hit the
        // unique-table entry rather than allocate, so it should never trip
        // a ceiling sized for exactly one non-terminal node.
        let mut a = Arena::new(FamilyKind::Bdd, 8);
        a.max_live = a.live_nodes + 1;
        let first = a.canonicalize(Variable(0), Nid::one(), Nid::zero()).unwrap();
        let second = a.canonicalize(Variable(0), Nid::one(), Nid::zero()).unwrap();
        assert_eq!(first, second);
    }
}

#[cfg(test)]
mod revival_tests {
    use super::*;

    #[test]
    fn reviving_a_node_also_reclaims_its_already_dead_children() {
        // grandchild: a lone var2 node. child: references grandchild as
        // its then-edge. Kill child first (one unpledge, since its only
        // hold is its own creation reference) -- the cascade drops
        // grandchild from 2 (creation + child's hold) to 1, so grandchild
        // survives that step. Killing grandchild's own remaining
        // reference too leaves both dead. Re-deriving `child` must revive
        // both, not just the top one.
        let mut a = Arena::new(FamilyKind::Bdd, 3);
        let grandchild = a.canonicalize(Variable(2), Nid::one(), Nid::zero()).unwrap();
        let child = a.canonicalize(Variable(1), grandchild, Nid::zero()).unwrap();
        assert_eq!(a.node(grandchild).ref_count, 2);

        a.recursive_unpledge(child);
        assert!(a.node(child).dead);
        assert!(!a.node(grandchild).dead, "child's death should only remove one of grandchild's two holds");
        assert_eq!(a.node(grandchild).ref_count, 1);

        a.recursive_unpledge(grandchild);
        assert!(a.node(grandchild).dead);

        let child2 = a.canonicalize(Variable(1), grandchild, Nid::zero()).unwrap();
        assert_eq!(child, child2);
        assert!(!a.node(child2).dead, "revival must clear the parent's dead flag");
        assert!(!a.node(grandchild).dead, "revival must cascade into already-dead children");
        assert_eq!(a.node(grandchild).ref_count, 1);
        assert!(a.check_consistency().is_none());
    }
}
