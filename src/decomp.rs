//! Conjunctive/disjunctive decomposition:
//! factor a BDD into simpler pieces whose AND (resp. OR) reconstructs the
//! original. Grounded on CUDD's `cuddDecomp.c` family
//! (`Cudd_bddApproxConjDecomp`, `Cudd_bddIterConjDecomp`,
//! `Cudd_bddGenConjDecomp`, `Cudd_bddVarConjDecomp`, and their `Disj`
//! counterparts), simplified to the single structural case CUDD itself
//! exploits most often: a node whose negative (resp. positive) cofactor is
//! the constant that lets the top variable peel off as a standalone
//! literal factor. Nodes with no such opportunity are returned whole as a
//! single irreducible factor, so every variant here keeps the exact
//! reconstruction law (`and(factors) == f` / `or(factors) == f`) rather
//! than CUDD's looser approximate guarantees.
use crate::error::Result;
use crate::manager::Manager;
use crate::nid::Nid;
use crate::vid::Variable;

impl Manager {
    fn conj_step(&mut self, f: Nid) -> Result<Vec<Nid>> {
        if f.is_one() { return Ok(Vec::new()); }
        if f.is_zero() { return Ok(vec![Nid::zero()]); }
        let v = self.bdd.var_of(f).unwrap();
        let (ft, fe) = self.bdd.cofactor(f, v);
        if fe.is_zero() {
            let lit = self.bdd.canonicalize(v, Nid::one(), Nid::zero())?;
            Ok(vec![lit, ft])
        } else if ft.is_zero() {
            let lit = !self.bdd.canonicalize(v, Nid::one(), Nid::zero())?;
            Ok(vec![lit, fe])
        } else {
            Ok(vec![f])
        }
    }

    fn disj_step(&mut self, f: Nid) -> Result<Vec<Nid>> {
        if f.is_zero() { return Ok(Vec::new()); }
        if f.is_one() { return Ok(vec![Nid::one()]); }
        let v = self.bdd.var_of(f).unwrap();
        let (ft, fe) = self.bdd.cofactor(f, v);
        if ft.is_one() {
            let lit = self.bdd.canonicalize(v, Nid::one(), Nid::zero())?;
            Ok(vec![lit, fe])
        } else if fe.is_one() {
            let lit = !self.bdd.canonicalize(v, Nid::one(), Nid::zero())?;
            Ok(vec![lit, ft])
        } else {
            Ok(vec![f])
        }
    }

    /// One round of conjunctive splitting at `f`'s top variable (CUDD's
    /// `Cudd_bddApproxConjDecomp`): cheap, does not recurse into the
    /// resulting factors.
    pub fn approx_conj_decomp(&mut self, f: Nid) -> Result<Vec<Nid>> {
        let r = self.conj_step(f)?;
        if r.is_empty() { Ok(vec![Nid::one()]) } else { Ok(r) }
    }

    /// One round of disjunctive splitting, dual of `approx_conj_decomp`.
    pub fn approx_disj_decomp(&mut self, f: Nid) -> Result<Vec<Nid>> {
        let r = self.disj_step(f)?;
        if r.is_empty() { Ok(vec![Nid::zero()]) } else { Ok(r) }
    }

    fn iter_conj_rec(&mut self, f: Nid, out: &mut Vec<Nid>) -> Result<()> {
        let step = self.conj_step(f)?;
        if step.len() <= 1 && step.first() == Some(&f) {
            out.push(f);
            return Ok(());
        }
        for factor in step {
            if factor == f { out.push(factor); } else { self.iter_conj_rec(factor, out)?; }
        }
        Ok(())
    }
    /// Fully recursive conjunctive decomposition (CUDD's
    /// `Cudd_bddIterConjDecomp`): keeps re-splitting every factor until
    /// none admits the single-variable peel used by `approx_conj_decomp`.
    pub fn iter_conj_decomp(&mut self, f: Nid) -> Result<Vec<Nid>> {
        let mut out = Vec::new();
        self.iter_conj_rec(f, &mut out)?;
        if out.is_empty() { out.push(Nid::one()); }
        Ok(out)
    }

    fn iter_disj_rec(&mut self, f: Nid, out: &mut Vec<Nid>) -> Result<()> {
        let step = self.disj_step(f)?;
        if step.len() <= 1 && step.first() == Some(&f) {
            out.push(f);
            return Ok(());
        }
        for factor in step {
            if factor == f { out.push(factor); } else { self.iter_disj_rec(factor, out)?; }
        }
        Ok(())
    }
    pub fn iter_disj_decomp(&mut self, f: Nid) -> Result<Vec<Nid>> {
        let mut out = Vec::new();
        self.iter_disj_rec(f, &mut out)?;
        if out.is_empty() { out.push(Nid::zero()); }
        Ok(out)
    }

    /// `iter_conj_decomp` capped at `max_factors`, ANDing any surplus back
    /// together (CUDD's `Cudd_bddGenConjDecomp`).
    pub fn gen_conj_decomp(&mut self, f: Nid, max_factors: usize) -> Result<Vec<Nid>> {
        let mut factors = self.iter_conj_decomp(f)?;
        let cap = max_factors.max(1);
        while factors.len() > cap {
            let a = factors.pop().unwrap();
            let b = factors.pop().unwrap();
            factors.push(self.and(a, b)?);
        }
        Ok(factors)
    }

    pub fn gen_disj_decomp(&mut self, f: Nid, max_factors: usize) -> Result<Vec<Nid>> {
        let mut factors = self.iter_disj_decomp(f)?;
        let cap = max_factors.max(1);
        while factors.len() > cap {
            let a = factors.pop().unwrap();
            let b = factors.pop().unwrap();
            factors.push(self.or(a, b)?);
        }
        Ok(factors)
    }

    fn group_of(groups: &[Vec<Variable>], v: Variable) -> Option<usize> {
        groups.iter().position(|g| g.contains(&v))
    }

    /// `iter_conj_decomp` regrouped against a caller-supplied variable
    /// partition (CUDD's `Cudd_bddVarConjDecomp`): every literal factor is
    /// folded into the conjunctive bucket for the group containing its
    /// variable; factors that don't reduce to a single literal (or whose
    /// variable falls outside every group) are returned alongside the
    /// per-group buckets unchanged.
    pub fn var_conj_decomp(&mut self, f: Nid, groups: &[Vec<Variable>]) -> Result<Vec<Nid>> {
        let raw = self.iter_conj_decomp(f)?;
        let mut buckets: Vec<Option<Nid>> = vec![None; groups.len()];
        let mut leftover = Vec::new();
        for factor in raw {
            let bucket = self.bdd.var_of(factor).and_then(|v| Self::group_of(groups, v));
            match bucket {
                Some(i) => {
                    buckets[i] = Some(match buckets[i] {
                        Some(acc) => self.and(acc, factor)?,
                        None => factor,
                    });
                }
                None => leftover.push(factor),
            }
        }
        let mut out: Vec<Nid> = buckets.into_iter().flatten().collect();
        out.extend(leftover);
        if out.is_empty() { out.push(Nid::one()); }
        Ok(out)
    }

    pub fn var_disj_decomp(&mut self, f: Nid, groups: &[Vec<Variable>]) -> Result<Vec<Nid>> {
        let raw = self.iter_disj_decomp(f)?;
        let mut buckets: Vec<Option<Nid>> = vec![None; groups.len()];
        let mut leftover = Vec::new();
        for factor in raw {
            let bucket = self.bdd.var_of(factor).and_then(|v| Self::group_of(groups, v));
            match bucket {
                Some(i) => {
                    buckets[i] = Some(match buckets[i] {
                        Some(acc) => self.or(acc, factor)?,
                        None => factor,
                    });
                }
                None => leftover.push(factor),
            }
        }
        let mut out: Vec<Nid> = buckets.into_iter().flatten().collect();
        out.extend(leftover);
        if out.is_empty() { out.push(Nid::zero()); }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_mgr(nvars: u32) -> Manager { Manager::init(nvars, 0, 256, 256, u64::MAX) }

    #[test]
    fn conj_decomp_reconstructs_original() {
        let mut m = new_mgr(3);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let x2 = m.ith_var(2).unwrap();
        let f = m.and(m.and(x0, x1).unwrap(), x2).unwrap();
        let factors = m.iter_conj_decomp(f).unwrap();
        let mut acc = m.read_one();
        for factor in factors { acc = m.and(acc, factor).unwrap(); }
        assert_eq!(acc, f);
    }

    #[test]
    fn disj_decomp_reconstructs_original() {
        let mut m = new_mgr(3);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let x2 = m.ith_var(2).unwrap();
        let f = m.or(m.or(x0, x1).unwrap(), x2).unwrap();
        let factors = m.iter_disj_decomp(f).unwrap();
        let mut acc = m.read_zero();
        for factor in factors { acc = m.or(acc, factor).unwrap(); }
        assert_eq!(acc, f);
    }

    #[test]
    fn gen_conj_decomp_respects_cap() {
        let mut m = new_mgr(4);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let x2 = m.ith_var(2).unwrap();
        let x3 = m.ith_var(3).unwrap();
        let f = m.and(m.and(x0, x1).unwrap(), m.and(x2, x3).unwrap()).unwrap();
        let factors = m.gen_conj_decomp(f, 2).unwrap();
        assert!(factors.len() <= 2);
        let mut acc = m.read_one();
        for factor in factors { acc = m.and(acc, factor).unwrap(); }
        assert_eq!(acc, f);
    }

    #[test]
    fn var_conj_decomp_groups_literals() {
        let mut m = new_mgr(2);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let f = m.and(x0, x1).unwrap();
        let groups = vec![vec![crate::vid::variable_from_index(0)], vec![crate::vid::variable_from_index(1)]];
        let factors = m.var_conj_decomp(f, &groups).unwrap();
        let mut acc = m.read_one();
        for factor in factors { acc = m.and(acc, factor).unwrap(); }
        assert_eq!(acc, f);
    }
}
