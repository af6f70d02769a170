//! Priority functions: bit-vector
//! comparisons and selection routines grounded on CUDD's `cuddPriority.c`
//! family (`Cudd_Xgty`, `Cudd_Xeqy`, `Cudd_Dxygtdxz`, `Cudd_Dxygtdyz`,
//! `Cudd_Inequality`, `Cudd_Disequality`, `Cudd_bddInterval`,
//! `Cudd_CProjection`, `Cudd_bddClosestCube`, `Cudd_MinHammingDist`,
//! `Cudd_PrioritySelect`). Bit vectors are MSB-first, matching CUDD's own
//! convention of building the comparison from `x[0]` down.
use fxhash::FxHashMap;

use crate::add_ops::AddBinOp;
use crate::error::{ManagerError, Result};
use crate::manager::Manager;
use crate::nid::Nid;
use crate::vid::Variable;

impl Manager {
    /// `x > y` over equal-length bit vectors (CUDD's `Cudd_Xgty`; the `z`
    /// don't-care vector CUDD threads through for variable-order bookkeeping
    /// has no effect on the resulting function, so it is omitted here).
    pub fn xgty(&mut self, x: &[Nid], y: &[Nid]) -> Result<Nid> {
        let n = x.len().min(y.len());
        let mut gt = Nid::zero();
        let mut eq = Nid::one();
        for i in 0..n {
            let gt_here = self.and(x[i], !y[i])?;
            let term = self.and(eq, gt_here)?;
            gt = self.or(gt, term)?;
            let same = self.xnor(x[i], y[i])?;
            eq = self.and(eq, same)?;
        }
        Ok(gt)
    }

    /// `x == y` over equal-length bit vectors (CUDD's `Cudd_Xeqy`).
    pub fn xeqy(&mut self, x: &[Nid], y: &[Nid]) -> Result<Nid> {
        let mut eq = Nid::one();
        for i in 0..x.len().min(y.len()) {
            let same = self.xnor(x[i], y[i])?;
            eq = self.and(eq, same)?;
        }
        Ok(eq)
    }

    fn bitwise_diff(&mut self, a: &[Nid], b: &[Nid]) -> Result<Vec<Nid>> {
        let n = a.len().min(b.len());
        let mut out = Vec::with_capacity(n);
        for i in 0..n { out.push(self.xor(a[i], b[i])?); }
        Ok(out)
    }

    /// `d(x,y) > d(x,z)`, where `d` is the bitwise (Hamming-style) distance
    /// vector `x XOR y` compared MSB-first (CUDD's `Cudd_Dxygtdxz`).
    pub fn dxygtdxz(&mut self, x: &[Nid], y: &[Nid], z: &[Nid]) -> Result<Nid> {
        let dxy = self.bitwise_diff(x, y)?;
        let dxz = self.bitwise_diff(x, z)?;
        self.xgty(&dxy, &dxz)
    }

    /// `d(x,y) > d(y,z)` (CUDD's `Cudd_Dxygtdyz`).
    pub fn dxygtdyz(&mut self, x: &[Nid], y: &[Nid], z: &[Nid]) -> Result<Nid> {
        let dxy = self.bitwise_diff(x, y)?;
        let dyz = self.bitwise_diff(y, z)?;
        self.xgty(&dxy, &dyz)
    }

    /// Weighted sum `sum_i bits[i] * 2^(n-1-i)` as an ADD, MSB first.
    fn bitvec_to_add(&mut self, bits: &[Nid], n: u32) -> Result<Nid> {
        let mut acc = self.add.terminal(0.0);
        for (i, &bit) in bits.iter().take(n as usize).enumerate() {
            let bit_add = self.bdd_to_add(bit)?;
            let weight = self.add.terminal(2f64.powi((n as i32) - 1 - i as i32));
            let term = self.apply(AddBinOp::Times, bit_add, weight)?;
            acc = self.apply(AddBinOp::Plus, acc, term)?;
        }
        Ok(acc)
    }

    /// `x - y >= c`, `x`/`y` read as `n_bits`-wide unsigned integers (CUDD's
    /// `Cudd_Inequality`). `n_bits <= 0` is rejected rather than reproducing
    /// CUDD's undefined-behavior shift (see DESIGN.md).
    pub fn inequality(&mut self, n_bits: i32, c: i64, x: &[Nid], y: &[Nid]) -> Result<Nid> {
        if n_bits <= 0 { return Err(ManagerError::InvalidInput); }
        let n = n_bits as u32;
        let vx = self.bitvec_to_add(x, n)?;
        let vy = self.bitvec_to_add(y, n)?;
        let diff = self.apply(AddBinOp::Minus, vx, vy)?;
        self.add_bdd_threshold(diff, c as f64)
    }

    /// `x - y != c` (CUDD's `Cudd_Disequality`), same `n_bits <= 0`
    /// rejection as `inequality`.
    pub fn disequality(&mut self, n_bits: i32, c: i64, x: &[Nid], y: &[Nid]) -> Result<Nid> {
        if n_bits <= 0 { return Err(ManagerError::InvalidInput); }
        let n = n_bits as u32;
        let vx = self.bitvec_to_add(x, n)?;
        let vy = self.bitvec_to_add(y, n)?;
        let diff = self.apply(AddBinOp::Minus, vx, vy)?;
        let c_nid = self.add.terminal(c as f64);
        let eq_mask = self.apply(AddBinOp::Equals, diff, c_nid)?;
        let eq_bdd = self.add_bdd_pattern(eq_mask)?;
        Ok(!eq_bdd)
    }

    /// `lo <= x <= hi`, `x` read as an unsigned integer over its bits
    /// (CUDD's `Cudd_bddInterval`).
    pub fn bdd_interval(&mut self, x: &[Nid], lo: i64, hi: i64) -> Result<Nid> {
        let n = x.len() as u32;
        let v = self.bitvec_to_add(x, n)?;
        self.add_bdd_interval(v, lo as f64, hi as f64)
    }

    fn next_cube_lit(&self, cube: Nid) -> Option<(Variable, bool, Nid)> {
        let var = self.bdd.var_of(cube)?;
        let t = self.bdd.then_child(cube);
        let e = self.bdd.else_child(cube);
        if e.is_zero() { Some((var, true, t)) }
        else if t.is_zero() { Some((var, false, e)) }
        else { None }
    }

    fn c_projection_rec(&mut self, r: Nid, y: Nid) -> Result<Nid> {
        if r.is_zero() { return Ok(Nid::zero()); }
        if y.is_one() { return Ok(r); }
        let (v, sign, rest) = self.next_cube_lit(y).ok_or(ManagerError::InvalidCube)?;
        let (rt, re) = self.bdd.cofactor(r, v);
        let branch = if sign { rt } else { re };
        self.c_projection_rec(branch, rest)
    }
    /// Restrict `r` along the literal chain named by the cube `y`,
    /// returning whatever of `r` remains below it (CUDD's
    /// `Cudd_CProjection`, simplified to a single cofactor chain rather
    /// than CUDD's full compatible-projection search -- see DESIGN.md).
    /// Rejects `y` values that are not a simple cube (a branching node
    /// along the chain) with `InvalidCube`.
    pub fn c_projection(&mut self, r: Nid, y: Nid) -> Result<Nid> {
        self.c_projection_rec(r, y)
    }

    fn closest_dist_rec(&mut self, f: Nid, g: Nid, memo: &mut FxHashMap<(Nid, Nid), u32>) -> Result<u32> {
        if let Some(&d) = memo.get(&(f, g)) { return Ok(d); }
        let d = if f.is_zero() || g.is_zero() {
            u32::MAX
        } else if f.is_one() && g.is_one() {
            0
        } else {
            let v = self.bdd.top_var(&[f, g]).expect("non-terminal pair has a top variable");
            let (ft, fe) = self.bdd.cofactor(f, v);
            let (gt, ge) = self.bdd.cofactor(g, v);
            let d1 = self.closest_dist_rec(ft, gt, memo)?;
            let d0 = self.closest_dist_rec(fe, ge, memo)?;
            let dc1 = self.closest_dist_rec(ft, ge, memo)?.saturating_add(1);
            let dc2 = self.closest_dist_rec(fe, gt, memo)?.saturating_add(1);
            d1.min(d0).min(dc1).min(dc2)
        };
        memo.insert((f, g), d);
        Ok(d)
    }
    fn closest_witness_rec(&mut self, f: Nid, g: Nid, memo: &FxHashMap<(Nid, Nid), u32>, lits: &mut Vec<(Variable, bool)>) -> Result<()> {
        if f.is_one() && g.is_one() { return Ok(()); }
        if f.is_zero() || g.is_zero() { return Ok(()); }
        let v = self.bdd.top_var(&[f, g]).expect("non-terminal pair has a top variable");
        let (ft, fe) = self.bdd.cofactor(f, v);
        let (gt, ge) = self.bdd.cofactor(g, v);
        let d = *memo.get(&(f, g)).unwrap_or(&u32::MAX);
        let at = |k: (Nid, Nid)| *memo.get(&k).unwrap_or(&u32::MAX);
        if at((ft, gt)) == d { lits.push((v, true)); return self.closest_witness_rec(ft, gt, memo, lits); }
        if at((fe, ge)) == d { lits.push((v, false)); return self.closest_witness_rec(fe, ge, memo, lits); }
        if at((ft, ge)).saturating_add(1) == d { lits.push((v, true)); return self.closest_witness_rec(ft, ge, memo, lits); }
        if at((fe, gt)).saturating_add(1) == d { lits.push((v, false)); return self.closest_witness_rec(fe, gt, memo, lits); }
        Ok(())
    }
    /// The minimum Hamming distance between any minterm of `f` and any
    /// minterm of `g`, plus a witness cube in `f` achieving it (CUDD's
    /// `Cudd_bddClosestCube`). When either side is empty, returns the zero
    /// function with distance zero as a degenerate witness.
    pub fn closest_cube(&mut self, f: Nid, g: Nid) -> Result<(Nid, u32)> {
        if f.is_zero() || g.is_zero() { return Ok((Nid::zero(), 0)); }
        let mut memo = FxHashMap::default();
        let d = self.closest_dist_rec(f, g, &mut memo)?;
        let mut lits = Vec::new();
        self.closest_witness_rec(f, g, &memo, &mut lits)?;
        let cube = self.literal_cube(&lits)?;
        Ok((cube, d))
    }

    fn min_hamming_rec(&self, f: Nid, minterm: &[bool], bound: u32) -> u32 {
        if f.is_one() { return 0; }
        if f.is_zero() { return bound; }
        if bound == 0 { return 0; }
        let v = self.bdd.var_of(f).unwrap();
        let bit = minterm.get(v.index() as usize).copied().unwrap_or(false);
        let (t, e) = self.bdd.cofactor(f, v);
        let (same, other) = if bit { (t, e) } else { (e, t) };
        let d_same = self.min_hamming_rec(same, minterm, bound);
        if d_same == 0 { return 0; }
        let d_other = 1 + self.min_hamming_rec(other, minterm, bound - 1);
        d_same.min(d_other).min(bound)
    }
    /// Minimum Hamming distance from `minterm` to any satisfying point of
    /// `f`, capped at `upper_bound` (CUDD's `Cudd_MinHammingDist`).
    pub fn min_hamming_dist(&self, f: Nid, minterm: &[bool], upper_bound: u32) -> u32 {
        self.min_hamming_rec(f, minterm, upper_bound)
    }

    /// For each assignment to `x` satisfying `exists y. R(x,y)`, keep only
    /// the highest-priority `y` (CUDD's `Cudd_PrioritySelect`). Priority is
    /// `pi(candidate, y)` if given, else the default `candidate > y`
    /// (`xgty`) used by CUDD's own default comparator; `candidate` ranges
    /// over a block of fresh variables allocated for the comparison,
    /// matching CUDD's behavior when its `z` argument is omitted.
    pub fn priority_select(&mut self, r: Nid, x: &[Nid], y: &[Nid], pi: Option<Nid>) -> Result<Nid> {
        let mut z = Vec::with_capacity(y.len());
        for _ in 0..y.len() {
            let v = self.new_var();
            z.push(self.bdd.canonicalize(v, Nid::one(), Nid::zero())?);
        }
        let pi = match pi {
            Some(p) => p,
            None => self.xgty(&z, y)?,
        };
        let subst: Vec<(Variable, Nid)> = y.iter().zip(z.iter())
            .map(|(&yv, &zv)| (self.bdd.var_of(yv).expect("y entries must be literal variables"), zv))
            .collect();
        let r_xz = self.vector_compose(r, &subst)?;
        let candidate_wins = self.and(r_xz, pi)?;
        let mut cube = Nid::one();
        for &lit in z.iter().rev() { cube = self.and(lit, cube)?; }
        let exists_better = self.exist(candidate_wins, cube)?;
        let not_better = !exists_better;
        let _ = x;
        self.and(r, not_better)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_mgr(nvars: u32) -> Manager { Manager::init(nvars, 0, 256, 256, u64::MAX) }

    #[test]
    fn xgty_matches_integer_comparison() {
        let mut m = new_mgr(4);
        let x = vec![m.ith_var(0).unwrap(), m.ith_var(1).unwrap()];
        let y = vec![m.ith_var(2).unwrap(), m.ith_var(3).unwrap()];
        let gt = m.xgty(&x, &y).unwrap();
        // x=10 (2), y=01 (1): x > y holds.
        let x0 = !x[0]; let x1 = x[1];
        let y0 = y[0]; let y1 = !y[1];
        let point = m.and(m.and(x0, x1).unwrap(), m.and(y0, y1).unwrap()).unwrap();
        assert!(m.leq(point, gt).unwrap());
    }

    #[test]
    fn xeqy_is_symmetric_equality() {
        let mut m = new_mgr(2);
        let x = vec![m.ith_var(0).unwrap()];
        let y = vec![m.ith_var(1).unwrap()];
        let eq = m.xeqy(&x, &y).unwrap();
        let expected = m.xnor(x[0], y[0]).unwrap();
        assert_eq!(eq, expected);
    }

    #[test]
    fn inequality_rejects_non_positive_bit_width() {
        let mut m = new_mgr(2);
        let x = vec![m.ith_var(0).unwrap()];
        let y = vec![m.ith_var(1).unwrap()];
        assert_eq!(m.inequality(0, 0, &x, &y).unwrap_err(), ManagerError::InvalidInput);
        assert_eq!(m.disequality(-1, 0, &x, &y).unwrap_err(), ManagerError::InvalidInput);
    }

    #[test]
    fn bdd_interval_full_range_is_one() {
        let mut m = new_mgr(3);
        let x: Vec<Nid> = (0..3).map(|i| m.ith_var(i).unwrap()).collect();
        let full = m.bdd_interval(&x, 0, 7).unwrap();
        assert_eq!(full, m.read_one());
    }

    #[test]
    fn c_projection_passes_through_on_trivial_cube() {
        let mut m = new_mgr(1);
        let x = m.ith_var(0).unwrap();
        let r = m.c_projection(x, m.read_one()).unwrap();
        assert_eq!(r, x);
        let zero = m.read_zero();
        let r2 = m.c_projection(zero, x).unwrap();
        assert_eq!(r2, zero);
    }

    #[test]
    fn c_projection_rejects_branching_cube() {
        let mut m = new_mgr(2);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        let not_a_cube = m.or(x, y).unwrap();
        assert_eq!(m.c_projection(x, not_a_cube).unwrap_err(), ManagerError::InvalidCube);
    }

    #[test]
    fn closest_cube_identical_functions_have_distance_zero() {
        let mut m = new_mgr(1);
        let x = m.ith_var(0).unwrap();
        let (_cube, dist) = m.closest_cube(x, x).unwrap();
        assert_eq!(dist, 0);
    }

    #[test]
    fn closest_cube_complementary_functions_have_distance_one() {
        let mut m = new_mgr(1);
        let x = m.ith_var(0).unwrap();
        let (_cube, dist) = m.closest_cube(x, !x).unwrap();
        assert_eq!(dist, 1);
    }

    #[test]
    fn closest_cube_disjoint_conjunctions_have_distance_two() {
        let mut m = new_mgr(2);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        let f = m.and(x, y).unwrap();
        let g = m.and(!x, !y).unwrap();
        let (_cube, dist) = m.closest_cube(f, g).unwrap();
        assert_eq!(dist, 2);
    }

    #[test]
    fn min_hamming_dist_matches_literal_mismatch() {
        let mut m = new_mgr(1);
        let x = m.ith_var(0).unwrap();
        assert_eq!(m.min_hamming_dist(x, &[true], 10), 0);
        assert_eq!(m.min_hamming_dist(x, &[false], 10), 1);
    }

    #[test]
    fn min_hamming_dist_from_constant_zero_is_the_bound() {
        let m = new_mgr(0);
        let zero = m.read_zero();
        assert_eq!(m.min_hamming_dist(zero, &[false; 4], 10), 10);
    }

    #[test]
    fn priority_select_keeps_only_one_y_per_x() {
        let mut m = new_mgr(2);
        let x0 = m.ith_var(0).unwrap();
        let y0 = m.ith_var(1).unwrap();
        let r = m.and(x0, y0).unwrap();
        let selected = m.priority_select(r, &[x0], &[y0], None).unwrap();
        assert!(m.leq(selected, r).unwrap());
    }
}
