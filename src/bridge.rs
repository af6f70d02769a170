//! Cross-family bridges: BDD<->ADD structural conversions and transferring
//! a BDD between two independent managers. Grounded
//! on CUDD's `Cudd_BddToAdd`/`Cudd_addBddPattern`/`Cudd_bddTransfer`
//! family, re-expressed over the shared `Variable` index space that
//! `Manager::new_var` keeps in lockstep across the `bdd` and `add` arenas.
use fxhash::FxHashMap;

use crate::error::Result;
use crate::manager::Manager;
use crate::nid::Nid;

impl Manager {
    fn bdd_to_add_rec(&mut self, n: Nid, memo: &mut FxHashMap<Nid, Nid>) -> Result<Nid> {
        if let Some(&r) = memo.get(&n) { return Ok(r); }
        let r = if n.is_zero() { self.add.terminal(0.0) }
            else if n.is_one() { self.add.terminal(1.0) }
            else {
                let var = self.bdd.var_of(n).unwrap();
                let (t, e) = self.bdd.cofactor(n, var);
                let nt = self.bdd_to_add_rec(t, memo)?;
                let ne = self.bdd_to_add_rec(e, memo)?;
                self.add.canonicalize_release(var, nt, ne)?
            };
        memo.insert(n, r);
        Ok(r)
    }
    /// `bdd_to_add` (CUDD's `Cudd_BddToAdd`): the 0/1-valued ADD with the
    /// same combinatorial structure as a BDD.
    pub fn bdd_to_add(&mut self, f: Nid) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.bdd_to_add_rec(f, &mut memo)
    }

    fn add_bdd_with(&mut self, f: Nid, pred: impl Fn(f64) -> bool + Copy, memo: &mut FxHashMap<Nid, Nid>) -> Result<Nid> {
        if let Some(&r) = memo.get(&f) { return Ok(r); }
        let r = match self.add.var_of(f) {
            None => if pred(self.add.value(f)) { Nid::one() } else { Nid::zero() },
            Some(var) => {
                let (t, e) = self.add.cofactor(f, var);
                let nt = self.add_bdd_with(t, pred, memo)?;
                let ne = self.add_bdd_with(e, pred, memo)?;
                self.bdd.canonicalize_release(var, nt, ne)?
            }
        };
        memo.insert(f, r);
        Ok(r)
    }

    /// The BDD agreeing with `f != 0` at every point (CUDD's
    /// `Cudd_addBddPattern`).
    pub fn add_bdd_pattern(&mut self, f: Nid) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.add_bdd_with(f, |v| v != 0.0, &mut memo)
    }
    /// The BDD of `f >= threshold` (CUDD's `Cudd_addBddThreshold`).
    pub fn add_bdd_threshold(&mut self, f: Nid, threshold: f64) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.add_bdd_with(f, move |v| v >= threshold, &mut memo)
    }
    /// The BDD of `f > threshold` (CUDD's `Cudd_addBddStrictThreshold`).
    pub fn add_bdd_strict_threshold(&mut self, f: Nid, threshold: f64) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.add_bdd_with(f, move |v| v > threshold, &mut memo)
    }
    /// The BDD of `lo <= f <= hi` (CUDD's `Cudd_addBddInterval`).
    pub fn add_bdd_interval(&mut self, f: Nid, lo: f64, hi: f64) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.add_bdd_with(f, move |v| v >= lo && v <= hi, &mut memo)
    }
    /// The BDD of bit `i` of `f`'s (integer-valued) terminals (CUDD's
    /// `Cudd_addBddIthBit`).
    pub fn add_bdd_ith_bit(&mut self, f: Nid, i: u32) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.add_bdd_with(f, move |v| ((v as i64) >> i) & 1 == 1, &mut memo)
    }

    /// Rebuild `f` (a node of `src`) inside `self`'s own `bdd` arena,
    /// assuming both managers share the same variable numbering (CUDD's
    /// `Cudd_bddTransfer`, simplified to the common single-order case; the
    /// general cross-manager-with-different-orders transfer is out of
    /// scope, see DESIGN.md).
    pub fn bdd_transfer(&mut self, src: &Manager, f: Nid) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.bdd_transfer_rec(src, f, &mut memo)
    }
    fn bdd_transfer_rec(&mut self, src: &Manager, n: Nid, memo: &mut FxHashMap<Nid, Nid>) -> Result<Nid> {
        if n.is_zero() { return Ok(Nid::zero()); }
        if n.is_one() { return Ok(Nid::one()); }
        let raw = n.raw();
        if let Some(&r) = memo.get(&raw) {
            return Ok(r.inv_if(n.is_inv()));
        }
        let var = src.bdd.var_of(raw).unwrap();
        let t = src.bdd.then_child(raw);
        let e = src.bdd.else_child(raw);
        while self.bdd.num_vars() as u32 <= var.index() { self.new_var(); }
        let nt = self.bdd_transfer_rec(src, t, memo)?;
        let ne = self.bdd_transfer_rec(src, e, memo)?;
        let r = self.bdd.canonicalize_release(var, nt, ne)?;
        memo.insert(raw, r);
        Ok(r.inv_if(n.is_inv()))
    }

    /// The ZDD over BDD-numbered variables whose combinations are exactly
    /// the satisfying assignments of BDD `f` (CUDD's `Cudd_zddPortFromBdd`).
    /// Levels that `f` does not branch on still get a ZDD node with equal
    /// then/else children -- ZDD's suppression rule only collapses a
    /// `then`-child equal to the empty-family terminal, not an arbitrary
    /// equal pair, so "don't care at this level" is representable without
    /// losing the one-combination-per-assignment correspondence.
    pub fn port_from_bdd(&mut self, f: Nid) -> Result<Nid> {
        let nvars = self.num_bdd_vars() as u32;
        let mut memo = FxHashMap::default();
        self.port_from_bdd_rec(f, 0, nvars, &mut memo)
    }
    fn port_from_bdd_rec(&mut self, b: Nid, level: u32, nvars: u32, memo: &mut FxHashMap<(Nid, u32), Nid>) -> Result<Nid> {
        if level == nvars {
            return Ok(if b.is_one() { self.zdd.terminal(1.0) } else { Nid::zero() });
        }
        if let Some(&r) = memo.get(&(b, level)) { return Ok(r); }
        let var = crate::vid::variable_from_index(self.index_of_level(level));
        let (bt, be) = self.bdd.cofactor(b, var);
        let t = self.port_from_bdd_rec(bt, level + 1, nvars, memo)?;
        let e = self.port_from_bdd_rec(be, level + 1, nvars, memo)?;
        let r = self.zdd.canonicalize_release(var, t, e)?;
        memo.insert((b, level), r);
        Ok(r)
    }

    /// The BDD agreeing with ZDD `f`'s membership test at every assignment
    /// (CUDD's `Cudd_zddPortToBdd`): a combination's variables are true,
    /// everything else false.
    pub fn port_to_bdd(&mut self, f: Nid) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.port_to_bdd_rec(f, &mut memo)
    }
    fn port_to_bdd_rec(&mut self, f: Nid, memo: &mut FxHashMap<Nid, Nid>) -> Result<Nid> {
        if f.is_zero() { return Ok(Nid::zero()); }
        if f == self.zdd.terminal(1.0) { return Ok(Nid::one()); }
        if let Some(&r) = memo.get(&f) { return Ok(r); }
        let var = self.zdd.var_of(f).unwrap();
        let (t, e) = self.zdd.cofactor(f, var);
        let bt = self.port_to_bdd_rec(t, memo)?;
        let be = self.port_to_bdd_rec(e, memo)?;
        let lit = self.bdd.canonicalize(var, Nid::one(), Nid::zero())?;
        let r = self.ite(lit, bt, be)?;
        memo.insert(f, r);
        Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_mgr(nvars: u32) -> Manager { Manager::init(nvars, 0, 256, 256, u64::MAX) }

    #[test]
    fn bdd_to_add_round_trips_through_pattern() {
        let mut m = new_mgr(2);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        let f = m.and(x, y).unwrap();
        let a = m.bdd_to_add(f).unwrap();
        let back = m.add_bdd_pattern(a).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn threshold_and_strict_threshold_agree_on_boundary() {
        let mut m = new_mgr(0);
        let five = m.add.terminal(5.0);
        assert_eq!(m.add_bdd_threshold(five, 5.0).unwrap(), m.read_one());
        assert_eq!(m.add_bdd_strict_threshold(five, 5.0).unwrap(), m.read_zero());
    }

    #[test]
    fn port_round_trips_between_bdd_and_zdd() {
        let mut m = new_mgr(2);
        m.zdd_vars_from_bdd_vars(1);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        let f = m.and(x, y).unwrap();
        let z = m.port_from_bdd(f).unwrap();
        assert_eq!(m.zdd_count(z), 1);
        let back = m.port_to_bdd(z).unwrap();
        assert_eq!(back, f);
    }

    #[test]
    fn transfer_preserves_structure() {
        let mut src = new_mgr(2);
        let x = src.ith_var(0).unwrap();
        let y = src.ith_var(1).unwrap();
        let f = src.and(x, y).unwrap();

        let mut dst = new_mgr(2);
        let transferred = dst.bdd_transfer(&src, f).unwrap();
        let x2 = dst.ith_var(0).unwrap();
        let y2 = dst.ith_var(1).unwrap();
        let expected = dst.and(x2, y2).unwrap();
        assert_eq!(transferred, expected);
    }
}
