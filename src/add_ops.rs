//! ADD-family operators: the same Shannon-expansion kernel as `bdd_ops.rs`
//! but with no complement edges and real-valued terminals.
use fxhash::FxHashMap;

use crate::cache::{Family, Tag};
use crate::error::Result;
use crate::manager::Manager;
use crate::nid::Nid;
use crate::vid::Variable;

/// Binary terminal-combining operators for `apply`, grounded on CUDD's family of `Cudd_add*` binary functions
/// (`Cudd_addPlus`, `Cudd_addTimes`, `Cudd_addMinimum`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddBinOp {
    Plus, Times, Minus, Divide, Min, Max,
    Or, And, Nand, Nor, Xor,
    Equals, NotEquals, Greater, GreaterEq, Less, LessEq,
}

fn combine(op: AddBinOp, a: f64, b: f64) -> f64 {
    let truthy = |x: f64| x != 0.0;
    match op {
        AddBinOp::Plus => a + b,
        AddBinOp::Times => a * b,
        AddBinOp::Minus => a - b,
        AddBinOp::Divide => a / b,
        AddBinOp::Min => a.min(b),
        AddBinOp::Max => a.max(b),
        AddBinOp::Or => if truthy(a) || truthy(b) { 1.0 } else { 0.0 },
        AddBinOp::And => if truthy(a) && truthy(b) { 1.0 } else { 0.0 },
        AddBinOp::Nand => if !(truthy(a) && truthy(b)) { 1.0 } else { 0.0 },
        AddBinOp::Nor => if !(truthy(a) || truthy(b)) { 1.0 } else { 0.0 },
        AddBinOp::Xor => if truthy(a) != truthy(b) { 1.0 } else { 0.0 },
        AddBinOp::Equals => if a == b { 1.0 } else { 0.0 },
        AddBinOp::NotEquals => if a != b { 1.0 } else { 0.0 },
        AddBinOp::Greater => if a > b { 1.0 } else { 0.0 },
        AddBinOp::GreaterEq => if a >= b { 1.0 } else { 0.0 },
        AddBinOp::Less => if a < b { 1.0 } else { 0.0 },
        AddBinOp::LessEq => if a <= b { 1.0 } else { 0.0 },
    }
}

fn order(f: Nid, g: Nid) -> (Nid, Nid) { if f <= g { (f, g) } else { (g, f) } }

impl Manager {
    fn add_apply_rec(&mut self, op: AddBinOp, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        let f_term = self.add.var_of(f).is_none();
        let g_term = self.add.var_of(g).is_none();
        if f_term && g_term {
            let r = combine(op, self.add.value(f), self.add.value(g));
            return Ok(self.add.terminal(r));
        }
        if op == AddBinOp::Times {
            if f_term && self.add.value(f) == 0.0 { return Ok(Nid::zero()); }
            if g_term && self.add.value(g) == 0.0 { return Ok(Nid::zero()); }
        }
        if op == AddBinOp::Plus {
            if f_term && self.add.value(f) == 0.0 { return Ok(g); }
            if g_term && self.add.value(g) == 0.0 { return Ok(f); }
        }
        let commutative = matches!(op,
            AddBinOp::Plus | AddBinOp::Times | AddBinOp::Min | AddBinOp::Max |
            AddBinOp::Or | AddBinOp::And | AddBinOp::Nand | AddBinOp::Nor | AddBinOp::Xor |
            AddBinOp::Equals | AddBinOp::NotEquals);
        let (a, b) = if commutative { order(f, g) } else { (f, g) };
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddApply(op as u16), a, b, Nid::zero())? { return Ok(r); }
        let var = self.add.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.add.cofactor(a, var);
        let (bt, be) = self.add.cofactor(b, var);
        let t = self.add_apply_rec(op, at, bt)?;
        let e = self.add_apply_rec(op, ae, be)?;
        let r = self.add.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Add, Tag::AddApply(op as u16), a, b, Nid::zero(), r);
        Ok(r)
    }
    pub fn apply(&mut self, op: AddBinOp, f: Nid, g: Nid) -> Result<Nid> { self.add_apply_rec(op, f, g) }

    fn add_monadic_rec(&mut self, id: u16, op: fn(f64) -> f64, x: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if self.add.var_of(x).is_none() {
            return Ok(self.add.terminal(op(self.add.value(x))));
        }
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddMonadic(id), x, Nid::zero(), Nid::zero())? { return Ok(r); }
        let var = self.add.var_of(x).unwrap();
        let (t, e) = self.add.cofactor(x, var);
        let nt = self.add_monadic_rec(id, op, t)?;
        let ne = self.add_monadic_rec(id, op, e)?;
        let r = self.add.canonicalize_release(var, nt, ne)?;
        self.cache_insert(Family::Add, Tag::AddMonadic(id), x, Nid::zero(), Nid::zero(), r);
        Ok(r)
    }
    /// Apply an arbitrary terminal-to-terminal function structurally,
    /// memoized under a caller-chosen `id` (CUDD's `Cudd_addMonadicApply`).
    pub fn monadic_apply(&mut self, id: u16, op: fn(f64) -> f64, x: Nid) -> Result<Nid> {
        self.add_monadic_rec(id, op, x)
    }
    pub fn negate(&mut self, f: Nid) -> Result<Nid> { self.monadic_apply(0xFFFF, |v| -v, f) }

    /// `ite` over real-valued terminals: `f`'s truthiness (any nonzero
    /// value) selects between `g` and `h`.
    pub fn add_ite(&mut self, f: Nid, g: Nid, h: Nid) -> Result<Nid> { self.add_ite_rec(f, g, h) }
    fn add_ite_rec(&mut self, f: Nid, g: Nid, h: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if self.add.var_of(f).is_none() {
            return Ok(if self.add.value(f) != 0.0 { g } else { h });
        }
        if g == h { return Ok(g); }
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddIte, f, g, h)? { return Ok(r); }
        let var = self.add.top_var(&[f, g, h]).expect("non-terminal triple has a top variable");
        let (ft, fe) = self.add.cofactor(f, var);
        let (gt, ge) = self.add.cofactor(g, var);
        let (ht, he) = self.add.cofactor(h, var);
        let t = self.add_ite_rec(ft, gt, ht)?;
        let e = self.add_ite_rec(fe, ge, he)?;
        let r = self.add.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Add, Tag::AddIte, f, g, h, r);
        Ok(r)
    }

    /// Existential abstraction "via sum": summing a constant over an
    /// abstracted variable doubles it, and over two variables quadruples
    /// it.
    pub fn add_exist(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.validate_cube(cube)?;
        self.add_exist_rec(f, cube)
    }
    fn add_exist_rec(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if cube.is_one() { return Ok(f); }
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddExist, f, cube, Nid::zero())? { return Ok(r); }
        let cube_var = self.bdd.node(cube).var.unwrap();
        let cube_rest = self.bdd.node(cube).then_;
        let result = match self.add.var_of(f) {
            Some(fv) if self.add.level_of(fv) == self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.add.cofactor(f, fv);
                let t = self.add_exist_rec(ft, cube_rest)?;
                let e = self.add_exist_rec(fe, cube_rest)?;
                self.apply(AddBinOp::Plus, t, e)?
            }
            Some(fv) if self.add.level_of(fv) < self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.add.cofactor(f, fv);
                let t = self.add_exist_rec(ft, cube)?;
                let e = self.add_exist_rec(fe, cube)?;
                self.add.canonicalize_release(fv, t, e)?
            }
            _ => {
                let half = self.add_exist_rec(f, cube_rest)?;
                self.apply(AddBinOp::Plus, half, half)?
            }
        };
        self.cache_insert(Family::Add, Tag::AddExist, f, cube, Nid::zero(), result);
        Ok(result)
    }

    /// Universal abstraction "via product": multiplying a constant over
    /// an abstracted variable squares it.
    pub fn add_univ(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.validate_cube(cube)?;
        self.add_univ_rec(f, cube)
    }
    fn add_univ_rec(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if cube.is_one() { return Ok(f); }
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddUniv, f, cube, Nid::zero())? { return Ok(r); }
        let cube_var = self.bdd.node(cube).var.unwrap();
        let cube_rest = self.bdd.node(cube).then_;
        let result = match self.add.var_of(f) {
            Some(fv) if self.add.level_of(fv) == self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.add.cofactor(f, fv);
                let t = self.add_univ_rec(ft, cube_rest)?;
                let e = self.add_univ_rec(fe, cube_rest)?;
                self.apply(AddBinOp::Times, t, e)?
            }
            Some(fv) if self.add.level_of(fv) < self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.add.cofactor(f, fv);
                let t = self.add_univ_rec(ft, cube)?;
                let e = self.add_univ_rec(fe, cube)?;
                self.add.canonicalize_release(fv, t, e)?
            }
            _ => {
                let half = self.add_univ_rec(f, cube_rest)?;
                self.apply(AddBinOp::Times, half, half)?
            }
        };
        self.cache_insert(Family::Add, Tag::AddUniv, f, cube, Nid::zero(), result);
        Ok(result)
    }

    pub fn or_abstract(&mut self, f: Nid, g: Nid, cube: Nid) -> Result<Nid> {
        self.validate_cube(cube)?;
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddOrAbstract, f, g, cube)? { return Ok(r); }
        let disj = self.apply(AddBinOp::Or, f, g)?;
        let r = self.add_exist_rec(disj, cube)?;
        self.cache_insert(Family::Add, Tag::AddOrAbstract, f, g, cube, r);
        Ok(r)
    }

    fn add_cofactor_val(&mut self, f: Nid, v: Variable, value: bool, memo: &mut FxHashMap<Nid, Nid>) -> Result<Nid> {
        if let Some(&r) = memo.get(&f) { return Ok(r); }
        let r = match self.add.var_of(f) {
            None => f,
            Some(fv) => {
                if self.add.level_of(fv) > self.add.level_of(v) { f }
                else if fv == v {
                    let (t, e) = self.add.cofactor(f, fv);
                    if value { t } else { e }
                } else {
                    let (t, e) = self.add.cofactor(f, fv);
                    let nt = self.add_cofactor_val(t, v, value, memo)?;
                    let ne = self.add_cofactor_val(e, v, value, memo)?;
                    self.add.canonicalize_release(fv, nt, ne)?
                }
            }
        };
        memo.insert(f, r);
        Ok(r)
    }

    /// `compose(f, v, g) = ite(g, f|v=1, f|v=0)` over ADD terminals.
    pub fn add_compose(&mut self, f: Nid, v: Variable, g: Nid) -> Result<Nid> {
        let mut memo1 = FxHashMap::default();
        let f1 = self.add_cofactor_val(f, v, true, &mut memo1)?;
        let mut memo0 = FxHashMap::default();
        let f0 = self.add_cofactor_val(f, v, false, &mut memo0)?;
        let _ = Tag::AddCompose;
        self.add_ite(g, f1, f0)
    }

    fn scalar_inverse_rec(&mut self, f: Nid, epsilon: f64) -> Result<Nid> {
        self.check_deadline()?;
        if self.add.var_of(f).is_none() {
            let v = self.add.value(f);
            let inv = if v.abs() < epsilon { v } else { 1.0 / v };
            return Ok(self.add.terminal(inv));
        }
        let eps_nid = self.add.terminal(epsilon);
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddScalarInverse, f, eps_nid, Nid::zero())? { return Ok(r); }
        let var = self.add.var_of(f).unwrap();
        let (t, e) = self.add.cofactor(f, var);
        let nt = self.scalar_inverse_rec(t, epsilon)?;
        let ne = self.scalar_inverse_rec(e, epsilon)?;
        let r = self.add.canonicalize_release(var, nt, ne)?;
        self.cache_insert(Family::Add, Tag::AddScalarInverse, f, eps_nid, Nid::zero(), r);
        Ok(r)
    }
    /// Pointwise `1/v`, leaving values smaller than `epsilon` in
    /// magnitude untouched to avoid division blow-up.
    pub fn scalar_inverse(&mut self, f: Nid, epsilon: f64) -> Result<Nid> { self.scalar_inverse_rec(f, epsilon) }

    fn round_off_rec(&mut self, f: Nid, scale: f64) -> Result<Nid> {
        self.check_deadline()?;
        if self.add.var_of(f).is_none() {
            let v = self.add.value(f);
            return Ok(self.add.terminal((v * scale).round() / scale));
        }
        let scale_nid = self.add.terminal(scale);
        if let Some(r) = self.cache_probe(Family::Add, Tag::AddRoundOff, f, scale_nid, Nid::zero())? { return Ok(r); }
        let var = self.add.var_of(f).unwrap();
        let (t, e) = self.add.cofactor(f, var);
        let nt = self.round_off_rec(t, scale)?;
        let ne = self.round_off_rec(e, scale)?;
        let r = self.add.canonicalize_release(var, nt, ne)?;
        self.cache_insert(Family::Add, Tag::AddRoundOff, f, scale_nid, Nid::zero(), r);
        Ok(r)
    }
    /// Round every terminal to `precision` decimal digits.
    pub fn round_off(&mut self, f: Nid, precision: i32) -> Result<Nid> {
        self.round_off_rec(f, 10f64.powi(precision))
    }

    fn to_add01(&mut self, n: Nid, pred: impl Fn(f64) -> bool + Copy, memo: &mut FxHashMap<Nid, Nid>) -> Result<Nid> {
        if let Some(&r) = memo.get(&n) { return Ok(r); }
        let r = match self.add.var_of(n) {
            None => self.add.terminal(if pred(self.add.value(n)) { 1.0 } else { 0.0 }),
            Some(var) => {
                let (t, e) = self.add.cofactor(n, var);
                let nt = self.to_add01(t, pred, memo)?;
                let ne = self.to_add01(e, pred, memo)?;
                self.add.canonicalize_release(var, nt, ne)?
            }
        };
        memo.insert(n, r);
        Ok(r)
    }
    pub fn threshold(&mut self, f: Nid, t: f64) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.to_add01(f, move |v| v >= t, &mut memo)
    }
    pub fn strict_threshold(&mut self, f: Nid, t: f64) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.to_add01(f, move |v| v > t, &mut memo)
    }
    pub fn interval(&mut self, f: Nid, lo: f64, hi: f64) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.to_add01(f, move |v| v >= lo && v <= hi, &mut memo)
    }
    /// Bit `i` of each (integer-valued) terminal, as a 0/1 ADD.
    pub fn ith_bit(&mut self, f: Nid, i: u32) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        self.to_add01(f, move |v| ((v as i64) >> i) & 1 == 1, &mut memo)
    }

    /// Sum of pointwise XOR across two equal-length vectors of 0/1 ADDs.
    pub fn hamming(&mut self, xs: &[Nid], ys: &[Nid]) -> Result<Nid> {
        let mut acc = self.add.terminal(0.0);
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            let d = self.apply(AddBinOp::Xor, x, y)?;
            acc = self.apply(AddBinOp::Plus, acc, d)?;
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vid::variable_from_index;

    fn new_mgr(nvars: u32) -> Manager { Manager::init(nvars, 0, 256, 256, u64::MAX) }

    #[test]
    fn exist_sums_constant_branches() {
        let mut m = new_mgr(1);
        let v0 = m.add_ith_var(0).unwrap();
        let three = m.add.terminal(3.0);
        let five = m.add.terminal(5.0);
        let f = m.add_ite(v0, three, five).unwrap();
        let cube = m.ith_var(0).unwrap();
        let r = m.add_exist(f, cube).unwrap();
        assert_eq!(m.add.value(r), 8.0);
    }

    #[test]
    fn exist_two_vars_multiplies_by_four() {
        let mut m = new_mgr(2);
        let two = m.add.terminal(2.0);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let cube = m.and(x0, x1).unwrap();
        let r = m.add_exist(two, cube).unwrap();
        assert_eq!(m.add.value(r), 8.0);
    }

    #[test]
    fn scalar_inverse_round_trip() {
        let mut m = new_mgr(1);
        let v0 = m.add_ith_var(0).unwrap();
        let two = m.add.terminal(2.0);
        let four = m.add.terminal(4.0);
        let f = m.add_ite(v0, two, four).unwrap();
        let inv = m.scalar_inverse(f, 1e-10).unwrap();
        let prod = m.apply(AddBinOp::Times, f, inv).unwrap();
        assert_eq!(m.add.value(m.add.canonicalize(variable_from_index(0), prod, prod).unwrap()), 1.0);
    }

    #[test]
    fn threshold_conversion() {
        let mut m = new_mgr(0);
        let five = m.add.terminal(5.0);
        assert_eq!(m.add_bdd_threshold(five, 3.0).unwrap(), m.read_one());
        assert_eq!(m.add_bdd_threshold(five, 5.0).unwrap(), m.read_one());
        assert_eq!(m.add_bdd_strict_threshold(five, 5.0).unwrap(), m.read_zero());
    }

    #[test]
    fn ith_bit_of_five() {
        let mut m = new_mgr(0);
        let five = m.add.terminal(5.0); // binary 101
        assert_eq!(m.ith_bit(five, 0).unwrap(), m.add.terminal(1.0));
        assert_eq!(m.ith_bit(five, 1).unwrap(), m.add.terminal(0.0));
        assert_eq!(m.ith_bit(five, 2).unwrap(), m.add.terminal(1.0));
    }
}
