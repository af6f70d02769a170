//! ZDD-family set operators: same kernel shape as `bdd_ops.rs`/`add_ops.rs`
//! but over the zero-suppressed arena, where a node's then-branch already
//! omits its own variable.
use fxhash::FxHashMap;

use crate::cache::{Family, Tag};
use crate::error::Result;
use crate::manager::Manager;
use crate::nid::Nid;
use crate::vid::Variable;

fn order(f: Nid, g: Nid) -> (Nid, Nid) { if f <= g { (f, g) } else { (g, f) } }

impl Manager {
    fn zdd_base_one(&mut self) -> Nid { self.zdd.terminal(1.0) }

    pub fn zdd_union(&mut self, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() { return Ok(g); }
        if g.is_zero() { return Ok(f); }
        if f == g { return Ok(f); }
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddUnion, a, b, Nid::zero())? { return Ok(r); }
        let var = self.zdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.zdd.cofactor(a, var);
        let (bt, be) = self.zdd.cofactor(b, var);
        let t = self.zdd_union(at, bt)?;
        let e = self.zdd_union(ae, be)?;
        let r = self.zdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Zdd, Tag::ZddUnion, a, b, Nid::zero(), r);
        Ok(r)
    }

    pub fn zdd_intersect(&mut self, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() || g.is_zero() { return Ok(Nid::zero()); }
        if f == g { return Ok(f); }
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddIntersect, a, b, Nid::zero())? { return Ok(r); }
        let var = self.zdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.zdd.cofactor(a, var);
        let (bt, be) = self.zdd.cofactor(b, var);
        let t = self.zdd_intersect(at, bt)?;
        let e = self.zdd_intersect(ae, be)?;
        let r = self.zdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Zdd, Tag::ZddIntersect, a, b, Nid::zero(), r);
        Ok(r)
    }

    /// `f \ g`: every combination of `f` that is not also a combination of `g`.
    pub fn zdd_diff(&mut self, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() || f == g { return Ok(Nid::zero()); }
        if g.is_zero() { return Ok(f); }
        let (a, b) = (f, g); // not commutative, do not reorder
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddDiff, a, b, Nid::zero())? { return Ok(r); }
        let var = self.zdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.zdd.cofactor(a, var);
        let (bt, be) = self.zdd.cofactor(b, var);
        let t = self.zdd_diff(at, bt)?;
        let e = self.zdd_diff(ae, be)?;
        let r = self.zdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Zdd, Tag::ZddDiff, a, b, Nid::zero(), r);
        Ok(r)
    }

    /// Cartesian product: the family `{s | t : s in f, t in g}` (CUDD's
    /// `Cudd_zddProduct`).
    pub fn zdd_product(&mut self, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() || g.is_zero() { return Ok(Nid::zero()); }
        let one = self.zdd_base_one();
        if f == one { return Ok(g); }
        if g == one { return Ok(f); }
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddProduct, a, b, Nid::zero())? { return Ok(r); }
        let var = self.zdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.zdd.cofactor(a, var);
        let (bt, be) = self.zdd.cofactor(b, var);
        let r00 = self.zdd_product(ae, be)?;
        let r01 = self.zdd_product(ae, bt)?;
        let r10 = self.zdd_product(at, be)?;
        let r11 = self.zdd_product(at, bt)?;
        let present = self.zdd_union(self.zdd_union(r01, r10)?, r11)?;
        let r = self.zdd.canonicalize_release(var, present, r00)?;
        self.cache_insert(Family::Zdd, Tag::ZddProduct, a, b, Nid::zero(), r);
        Ok(r)
    }

    /// Weak division `f / g` (CUDD's `Cudd_zddWeakDiv`): the largest
    /// family `q` such that `product(q, g)` is a sub-family of `f`, found
    /// without the full algebraic quotient-remainder search.
    pub fn zdd_weak_div(&mut self, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        let one = self.zdd_base_one();
        if g == one { return Ok(f); }
        if f.is_zero() { return Ok(Nid::zero()); }
        if f == g { return Ok(one); }
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddWeakDiv, f, g, Nid::zero())? { return Ok(r); }
        let gvar = self.zdd.var_of(g).expect("g is neither 0 nor the base-one terminal");
        let fvar = self.zdd.top_var(&[f, g]).unwrap();
        let result = if fvar != gvar {
            let (ft, fe) = self.zdd.cofactor(f, fvar);
            let t = self.zdd_weak_div(ft, g)?;
            let e = self.zdd_weak_div(fe, g)?;
            self.zdd.canonicalize_release(fvar, t, e)?
        } else {
            let (ft, fe) = self.zdd.cofactor(f, fvar);
            let (gt, ge) = self.zdd.cofactor(g, gvar);
            if ge.is_zero() {
                self.zdd_weak_div(ft, gt)?
            } else {
                let q1 = self.zdd_weak_div(ft, gt)?;
                let q0 = self.zdd_weak_div(fe, ge)?;
                self.zdd_intersect(q1, q0)?
            }
        };
        self.cache_insert(Family::Zdd, Tag::ZddWeakDiv, f, g, Nid::zero(), result);
        Ok(result)
    }

    /// Structural `ite` over the zero-suppressed arena: select between `g`
    /// and `h` at each node of `f` the way `bdd_ops::ite` does, but without
    /// complement-edge normalization (ZDD edges are never tagged).
    pub fn zdd_ite(&mut self, f: Nid, g: Nid, h: Nid) -> Result<Nid> {
        self.check_deadline()?;
        let one = self.zdd_base_one();
        if f.is_zero() { return Ok(h); }
        if f == one { return Ok(g); }
        if g == h { return Ok(g); }
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddIte, f, g, h)? { return Ok(r); }
        let var = self.zdd.top_var(&[f, g, h]).expect("non-terminal triple has a top variable");
        let (ft, fe) = self.zdd.cofactor(f, var);
        let (gt, ge) = self.zdd.cofactor(g, var);
        let (ht, he) = self.zdd.cofactor(h, var);
        let t = self.zdd_ite(ft, gt, ht)?;
        let e = self.zdd_ite(fe, ge, he)?;
        let r = self.zdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Zdd, Tag::ZddIte, f, g, h, r);
        Ok(r)
    }

    /// Toggle membership of `var` in every combination of `f` (CUDD's
    /// `Cudd_zddChange`).
    pub fn zdd_change(&mut self, f: Nid, var: Variable) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() { return Ok(Nid::zero()); }
        let var_level = self.zdd.level_of(var);
        let f_level = self.zdd.level_of_nid(f);
        if f_level.is_below(&var_level) {
            return self.zdd.canonicalize(var, f, Nid::zero());
        }
        let fvar = self.zdd.var_of(f).unwrap();
        if f_level == var_level {
            let (t, e) = self.zdd.cofactor(f, fvar);
            return self.zdd.canonicalize(var, e, t);
        }
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddChange, f, Nid::zero(), Nid::zero())? { return Ok(r); }
        let (ft, fe) = self.zdd.cofactor(f, fvar);
        let t = self.zdd_change(ft, var)?;
        let e = self.zdd_change(fe, var)?;
        let r = self.zdd.canonicalize_release(fvar, t, e)?;
        self.cache_insert(Family::Zdd, Tag::ZddChange, f, Nid::zero(), Nid::zero(), r);
        Ok(r)
    }

    /// `{S - {var} : S in f, var in S}` (CUDD's `Cudd_zddSubset1`).
    pub fn zdd_subset1(&mut self, f: Nid, var: Variable) -> Result<Nid> {
        self.check_deadline()?;
        let one = self.zdd_base_one();
        if f.is_zero() || f == one { return Ok(Nid::zero()); }
        let var_level = self.zdd.level_of(var);
        let f_level = self.zdd.level_of_nid(f);
        if f_level.is_below(&var_level) { return Ok(Nid::zero()); }
        let fvar = self.zdd.var_of(f).unwrap();
        let (ft, fe) = self.zdd.cofactor(f, fvar);
        if f_level == var_level { return Ok(ft); }
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddSubset1, f, Nid::zero(), Nid::zero())? { return Ok(r); }
        let t = self.zdd_subset1(ft, var)?;
        let e = self.zdd_subset1(fe, var)?;
        let r = self.zdd.canonicalize_release(fvar, t, e)?;
        self.cache_insert(Family::Zdd, Tag::ZddSubset1, f, Nid::zero(), Nid::zero(), r);
        Ok(r)
    }

    /// `{S in f : var not in S}` (CUDD's `Cudd_zddSubset0`).
    pub fn zdd_subset0(&mut self, f: Nid, var: Variable) -> Result<Nid> {
        self.check_deadline()?;
        let one = self.zdd_base_one();
        if f.is_zero() || f == one { return Ok(f); }
        let var_level = self.zdd.level_of(var);
        let f_level = self.zdd.level_of_nid(f);
        if f_level.is_below(&var_level) { return Ok(f); }
        let fvar = self.zdd.var_of(f).unwrap();
        let (ft, fe) = self.zdd.cofactor(f, fvar);
        if f_level == var_level { return Ok(fe); }
        if let Some(r) = self.cache_probe(Family::Zdd, Tag::ZddSubset0, f, Nid::zero(), Nid::zero())? { return Ok(r); }
        let t = self.zdd_subset0(ft, var)?;
        let e = self.zdd_subset0(fe, var)?;
        let r = self.zdd.canonicalize_release(fvar, t, e)?;
        self.cache_insert(Family::Zdd, Tag::ZddSubset0, f, Nid::zero(), Nid::zero(), r);
        Ok(r)
    }

    fn zdd_count_rec(&mut self, f: Nid, memo: &mut FxHashMap<Nid, u64>) -> u64 {
        if let Some(&c) = memo.get(&f) { return c; }
        let c = if f.is_zero() { 0 }
            else if f == self.zdd.terminal(1.0) { 1 }
            else {
                let var = self.zdd.var_of(f).unwrap();
                let (t, e) = self.zdd.cofactor(f, var);
                self.zdd_count_rec(t, memo) + self.zdd_count_rec(e, memo)
            };
        memo.insert(f, c);
        c
    }
    /// Number of distinct combinations (subsets) the family `f` represents.
    pub fn zdd_count(&mut self, f: Nid) -> u64 {
        let mut memo = FxHashMap::default();
        self.zdd_count_rec(f, &mut memo)
    }

    fn isop_rec(&mut self, l: Nid, u: Nid, memo: &mut FxHashMap<(Nid, Nid), (Nid, Nid)>) -> Result<(Nid, Nid)> {
        self.check_deadline()?;
        if l.is_zero() { return Ok((Nid::zero(), Nid::zero())); }
        if u.is_one() { let one = self.zdd_base_one(); return Ok((Nid::one(), one)); }
        if let Some(&r) = memo.get(&(l, u)) { return Ok(r); }
        let var = self.bdd.top_var(&[l, u]).expect("non-terminal pair has a top variable");
        let (l1, l0) = self.bdd.cofactor(l, var);
        let (u1, u0) = self.bdd.cofactor(u, var);
        let result = if l1.is_zero() {
            self.isop_rec(l0, u0, memo)?
        } else if l0.is_zero() {
            let (b, z) = self.isop_rec(l1, u1, memo)?;
            let bdd_r = self.bdd.canonicalize_release(var, b, Nid::zero())?;
            let zdd_r = self.zdd.canonicalize_release(var, z, Nid::zero())?;
            (bdd_r, zdd_r)
        } else {
            let (b1, z1) = self.isop_rec(l1, u1, memo)?;
            let (b0, z0) = self.isop_rec(l0, u0, memo)?;
            let lit = self.bdd.canonicalize(var, Nid::one(), Nid::zero())?;
            let bdd_r = self.ite(lit, b1, b0)?;
            let zdd_r = self.zdd.canonicalize_release(var, z1, z0)?;
            (bdd_r, zdd_r)
        };
        memo.insert((l, u), result);
        Ok(result)
    }

    /// An irredundant sum-of-products cover of any function `f` with `lower
    /// <= f <= upper`, returned as both a reconstructed BDD and a ZDD of
    /// cubes (CUDD's `Cudd_zddIsop`). This rewrite omits Minato's
    /// don't-care-sharing optimization that minimizes literal count across
    /// the two cofactor branches -- it returns a correct but not always
    /// minimal cover.
    pub fn irr_cover(&mut self, lower: Nid, upper: Nid) -> Result<(Nid, Nid)> {
        let mut memo = FxHashMap::default();
        self.isop_rec(lower, upper, &mut memo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_mgr(nbdd: u32, nzdd: u32) -> Manager { Manager::init(nbdd, nzdd, 256, 256, u64::MAX) }

    #[test]
    fn union_is_commutative_and_idempotent() {
        let mut m = new_mgr(0, 2);
        let a = m.zdd_ith_var(0).unwrap();
        let b = m.zdd_ith_var(1).unwrap();
        assert_eq!(m.zdd_union(a, b).unwrap(), m.zdd_union(b, a).unwrap());
        assert_eq!(m.zdd_union(a, a).unwrap(), a);
    }

    #[test]
    fn diff_removes_shared_members() {
        let mut m = new_mgr(0, 2);
        let a = m.zdd_ith_var(0).unwrap();
        let b = m.zdd_ith_var(1).unwrap();
        let u = m.zdd_union(a, b).unwrap();
        assert_eq!(m.zdd_diff(u, b).unwrap(), a);
        assert_eq!(m.zdd_diff(u, u).unwrap(), Nid::zero());
    }

    #[test]
    fn change_is_its_own_inverse() {
        let mut m = new_mgr(0, 2);
        let a = m.zdd_ith_var(0).unwrap();
        let v1 = crate::vid::variable_from_index(1);
        let changed = m.zdd_change(a, v1).unwrap();
        let back = m.zdd_change(changed, v1).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn subset1_and_subset0_partition_the_family() {
        let mut m = new_mgr(0, 2);
        let a = m.zdd_ith_var(0).unwrap();
        let b = m.zdd_ith_var(1).unwrap();
        let f = m.zdd_union(a, b).unwrap();
        let v0 = crate::vid::variable_from_index(0);
        let with0 = m.zdd_subset1(f, v0).unwrap();
        let without0 = m.zdd_subset0(f, v0).unwrap();
        assert_eq!(m.zdd_count(f), m.zdd_count(with0) + m.zdd_count(without0));
    }

    #[test]
    fn count_counts_members() {
        let mut m = new_mgr(0, 2);
        let a = m.zdd_ith_var(0).unwrap();
        let b = m.zdd_ith_var(1).unwrap();
        let f = m.zdd_union(a, b).unwrap();
        assert_eq!(m.zdd_count(f), 2);
    }

    #[test]
    fn weak_div_recovers_factor() {
        let mut m = new_mgr(0, 2);
        let a = m.zdd_ith_var(0).unwrap();
        let b = m.zdd_ith_var(1).unwrap();
        let p = m.zdd_product(a, b).unwrap();
        assert_eq!(m.zdd_weak_div(p, b).unwrap(), a);
    }
}
