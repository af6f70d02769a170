//! The computed (operation) cache: a fixed-capacity, lossy hash table
//! mapping operator fingerprints to result nids. Grounded
//! on the direct-mapped table CUDD itself uses, and on the `FxHashMap`
//! hashing convention already adopted in `arena.rs`.
use fxhash::FxHasher;
use std::hash::{Hash, Hasher};

use crate::nid::Nid;

/// Which family a cached node belongs to, so that entries from the BDD,
/// ADD and ZDD arenas (which reuse the same small `Nid` index space) can
/// never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Family { Bdd, Add, Zdd }

/// Operator tag. A single generic kernel
/// is instantiated for every member; the tag is the cache key's
/// discriminant. `u16` aux carries small operator-specific parameters
/// (e.g. which binary op an ADD `apply` performs) without needing a
/// separate cache per parameterization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Tag {
    And, Or, Xor, Ite, Leq, Intersect,
    Exist, Univ, AndAbstract, XorExistAbstract,
    Compose, VectorCompose, Restrict, Constrain, Minimize,
    ClippingAnd { depth: u16, over: bool },
    ShortestPath, SubsetShortPaths, SupersetShortPaths, SubsetHeavyBranch, SubsetCompress,
    AddApply(u16),
    AddMonadic(u16),
    AddIte,
    AddExist, AddUniv, AddOrAbstract, AddCompose,
    AddScalarInverse, AddRoundOff, AddThreshold, AddStrictThreshold, AddInterval, AddIthBit,
    ZddUnion, ZddIntersect, ZddDiff, ZddProduct, ZddWeakDiv, ZddIte, ZddChange,
    ZddSubset1, ZddSubset0, ZddCount,
    Support, Count,
}

#[derive(Clone, Copy)]
struct Entry {
    family: Family,
    tag: Tag,
    a: Nid,
    b: Nid,
    c: Nid,
    result: Nid,
    /// Generation stamp; entries from a stale generation (pre-GC/reorder
    /// flush) are treated as absent without needing to walk the table.
    gen: u32,
}

pub(crate) struct Cache {
    slots: Vec<Option<Entry>>,
    mask: usize,
    gen: u32,
    pub hits: u64,
    pub probes: u64,
    pub inserts: u64,
    soft_ceiling: usize,
}

fn fingerprint(family: Family, tag: Tag, a: Nid, b: Nid, c: Nid) -> u64 {
    let mut h = FxHasher::default();
    family.hash(&mut h);
    tag.hash(&mut h);
    a.hash(&mut h);
    b.hash(&mut h);
    c.hash(&mut h);
    h.finish()
}

impl Cache {
    pub fn new(initial_slots: usize) -> Cache {
        let slots = initial_slots.next_power_of_two().max(16);
        Cache {
            slots: vec![None; slots],
            mask: slots - 1,
            gen: 0,
            hits: 0,
            probes: 0,
            inserts: 0,
            soft_ceiling: slots * 8,
        }
    }

    /// Drop every entry: used on reordering-start and when the dead-node
    /// fraction crosses `gc_frac`.
    pub fn flush(&mut self) {
        self.gen = self.gen.wrapping_add(1);
        for s in self.slots.iter_mut() { *s = None; }
    }

    pub fn hit_rate(&self) -> f64 {
        if self.probes == 0 { 0.0 } else { self.hits as f64 / self.probes as f64 }
    }

    /// Grow the table (power-of-two doubling) when the measured hit rate
    /// falls below a threshold, bounded by `hard_ceiling`.
    pub fn maybe_grow(&mut self, hard_ceiling: usize) {
        if self.slots.len() * 2 > hard_ceiling { return; }
        if self.probes > 256 && self.hit_rate() < 0.1 && self.inserts as usize > self.soft_ceiling {
            let new_len = self.slots.len() * 2;
            self.slots = vec![None; new_len];
            self.mask = new_len - 1;
            self.soft_ceiling = new_len * 8;
            self.gen = self.gen.wrapping_add(1);
        }
    }

    pub fn probe(&mut self, family: Family, tag: Tag, a: Nid, b: Nid, c: Nid) -> Option<Nid> {
        self.probes += 1;
        let idx = (fingerprint(family, tag, a, b, c) as usize) & self.mask;
        if let Some(e) = self.slots[idx] {
            if e.gen == self.gen && e.family == family && e.tag == tag && e.a == a && e.b == b && e.c == c {
                self.hits += 1;
                return Some(e.result);
            }
        }
        None
    }

    /// Insert, displacing whatever was in the slot.
    pub fn insert(&mut self, family: Family, tag: Tag, a: Nid, b: Nid, c: Nid, result: Nid) {
        self.inserts += 1;
        let idx = (fingerprint(family, tag, a, b, c) as usize) & self.mask;
        self.slots[idx] = Some(Entry { family, tag, a, b, c, result, gen: self.gen });
    }

    pub fn len_slots(&self) -> usize { self.slots.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_probe_hits() {
        let mut c = Cache::new(16);
        let (a, b, r) = (Nid::zero(), Nid::one(), Nid::one());
        c.insert(Family::Bdd, Tag::And, a, b, Nid::zero(), r);
        assert_eq!(c.probe(Family::Bdd, Tag::And, a, b, Nid::zero()), Some(r));
    }

    #[test]
    fn flush_clears_everything() {
        let mut c = Cache::new(16);
        c.insert(Family::Bdd, Tag::And, Nid::zero(), Nid::one(), Nid::zero(), Nid::one());
        c.flush();
        assert_eq!(c.probe(Family::Bdd, Tag::And, Nid::zero(), Nid::one(), Nid::zero()), None);
    }

    #[test]
    fn distinct_families_do_not_collide() {
        let mut c = Cache::new(16);
        c.insert(Family::Bdd, Tag::And, Nid::zero(), Nid::one(), Nid::zero(), Nid::one());
        assert_eq!(c.probe(Family::Zdd, Tag::And, Nid::zero(), Nid::one(), Nid::zero()), None);
    }
}
