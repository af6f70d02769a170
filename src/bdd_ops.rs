//! BDD-family recursive operators: the core Shannon-expansion kernel
//! instantiated for Boolean apply, ITE, abstraction,
//! composition/restriction, and the two approximation heuristics.
//!
//! Every entry point lives as a `Manager` method so recursion can borrow
//! `self.bdd`/`self.cache` field-disjointly without an explicit context
//! struct -- a node's `var`/`then_`/`else_` are `Copy`, so nothing is ever
//! held across a recursive call.
use fxhash::FxHashMap;

use crate::cache::{Family, Tag};
use crate::error::{ManagerError, Result};
use crate::manager::Manager;
use crate::nid::Nid;
use crate::vid::Variable;

fn order(f: Nid, g: Nid) -> (Nid, Nid) { if f <= g { (f, g) } else { (g, f) } }

impl Manager {
    /// Validate that `cube` is a conjunction of positive literals: the top edge must not be complemented, and
    /// every node along the chain must have its else-child equal to zero
    /// (a "branching" cube -- one whose else-child goes anywhere else --
    /// is rejected).
    pub(crate) fn validate_cube(&self, cube: Nid) -> Result<()> {
        if cube.is_inv() { return Err(ManagerError::InvalidCube); }
        let mut n = cube;
        loop {
            if n.is_one() { return Ok(()); }
            if n.is_zero() { return Err(ManagerError::InvalidCube); }
            let node = self.bdd.node(n);
            match node.var {
                None => return Err(ManagerError::InvalidCube),
                Some(_) => {
                    if node.else_ != Nid::zero() { return Err(ManagerError::InvalidCube); }
                    n = node.then_;
                }
            }
        }
    }

    // ---- and / or / xor / derived ----------------------------------------

    pub fn and(&mut self, f: Nid, g: Nid) -> Result<Nid> { self.bdd_and(f, g) }
    pub(crate) fn bdd_and(&mut self, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() || g.is_zero() { return Ok(Nid::zero()); }
        if f.is_one() { return Ok(g); }
        if g.is_one() { return Ok(f); }
        if f == g { return Ok(f); }
        if f == !g { return Ok(Nid::zero()); }
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::And, a, b, Nid::zero())? { return Ok(r); }
        let var = self.bdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.bdd.cofactor(a, var);
        let (bt, be) = self.bdd.cofactor(b, var);
        let t = self.bdd_and(at, bt)?;
        let e = self.bdd_and(ae, be)?;
        let r = self.bdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Bdd, Tag::And, a, b, Nid::zero(), r);
        Ok(r)
    }

    /// `or(f,g) = not(and(not f, not g))`, same trick CUDD's `Cudd_bddOr`
    /// uses to piggy-back on the `and` cache via complement edges.
    pub fn or(&mut self, f: Nid, g: Nid) -> Result<Nid> { Ok(!self.bdd_and(!f, !g)?) }

    pub(crate) fn bdd_xor(&mut self, mut f: Nid, mut g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f == g { return Ok(Nid::zero()); }
        if f == !g { return Ok(Nid::one()); }
        if f.is_zero() { return Ok(g); }
        if f.is_one() { return Ok(!g); }
        if g.is_zero() { return Ok(f); }
        if g.is_one() { return Ok(!f); }
        let mut comp = false;
        if f.is_inv() { f = !f; comp = !comp; }
        if g.is_inv() { g = !g; comp = !comp; }
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Xor, a, b, Nid::zero())? { return Ok(r.inv_if(comp)); }
        let var = self.bdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.bdd.cofactor(a, var);
        let (bt, be) = self.bdd.cofactor(b, var);
        let t = self.bdd_xor(at, bt)?;
        let e = self.bdd_xor(ae, be)?;
        let r = self.bdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Bdd, Tag::Xor, a, b, Nid::zero(), r);
        Ok(r.inv_if(comp))
    }
    pub fn xor(&mut self, f: Nid, g: Nid) -> Result<Nid> { self.bdd_xor(f, g) }
    pub fn xnor(&mut self, f: Nid, g: Nid) -> Result<Nid> { Ok(!self.bdd_xor(f, g)?) }
    pub fn nand(&mut self, f: Nid, g: Nid) -> Result<Nid> { Ok(!self.bdd_and(f, g)?) }
    pub fn nor(&mut self, f: Nid, g: Nid) -> Result<Nid> { Ok(self.bdd_and(!f, !g)?) }

    /// Implication check: `f <= g` in the Boolean lattice, i.e. `f => g`
    /// is a tautology.
    pub fn leq(&mut self, f: Nid, g: Nid) -> Result<bool> {
        Ok(self.bdd_and(f, !g)?.is_zero())
    }

    /// A single witness cube in the intersection of `f` and `g` (cheaper
    /// than full `and` -- CUDD's `Cudd_bddIntersect`).
    pub fn intersect(&mut self, f: Nid, g: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() || g.is_zero() { return Ok(Nid::zero()); }
        if f.is_one() { return Ok(g); }
        if g.is_one() { return Ok(f); }
        if f == g { return Ok(f); }
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Intersect, a, b, Nid::zero())? { return Ok(r); }
        let var = self.bdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.bdd.cofactor(a, var);
        let (bt, be) = self.bdd.cofactor(b, var);
        let t = self.intersect(at, bt)?;
        let result = if !t.is_zero() {
            self.bdd.canonicalize_release(var, t, Nid::zero())?
        } else {
            let e = self.intersect(ae, be)?;
            if !e.is_zero() { self.bdd.canonicalize_release(var, Nid::zero(), e)? } else { Nid::zero() }
        };
        self.cache_insert(Family::Bdd, Tag::Intersect, a, b, Nid::zero(), result);
        Ok(result)
    }

    // ---- ite ---------------------------------------------------------------

    /// `ite(f,g,h)`: dedicated three-operand recursion with the terminal
    /// short-circuits plus a reduced Brace-Rudell-Bryant
    /// normalization (push complement onto `g`/`h` when `g` is
    /// complemented, so the cache key is canonical under `ite(f,g,h) ==
    /// not ite(f, not g, not h)`).
    pub fn ite(&mut self, f: Nid, g: Nid, h: Nid) -> Result<Nid> { self.bdd_ite(f, g, h) }
    fn bdd_ite(&mut self, f: Nid, mut g: Nid, mut h: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_one() { return Ok(g); }
        if f.is_zero() { return Ok(h); }
        if g == h { return Ok(g); }
        if g.is_one() && h.is_zero() { return Ok(f); }
        if g.is_zero() && h.is_one() { return Ok(!f); }
        if f == g { return self.or(f, h); }
        if f == !g { return self.bdd_and(!f, h); }
        let mut comp = false;
        if g.is_inv() { g = !g; h = !h; comp = true; }
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Ite, f, g, h)? { return Ok(r.inv_if(comp)); }
        let var = self.bdd.top_var(&[f, g, h]).expect("non-terminal triple has a top variable");
        let (ft, fe) = self.bdd.cofactor(f, var);
        let (gt, ge) = self.bdd.cofactor(g, var);
        let (ht, he) = self.bdd.cofactor(h, var);
        let t = self.bdd_ite(ft, gt, ht)?;
        let e = self.bdd_ite(fe, ge, he)?;
        let r = self.bdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Bdd, Tag::Ite, f, g, h, r);
        Ok(r.inv_if(comp))
    }

    // ---- abstraction ----------------------------------------

    pub fn exist(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.validate_cube(cube)?;
        self.bdd_exist_rec(f, cube)
    }
    fn bdd_exist_rec(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if cube.is_one() { return Ok(f); }
        if f.is_one() || f.is_zero() { return Ok(f); }
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Exist, f, cube, Nid::zero())? { return Ok(r); }
        let cube_var = self.bdd.node(cube).var.unwrap();
        let cube_rest = self.bdd.node(cube).then_;
        let f_var = self.bdd.var_of(f);
        let result = match f_var {
            Some(fv) if self.bdd.level_of(fv) == self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.bdd.cofactor(f, fv);
                let t = self.bdd_exist_rec(ft, cube_rest)?;
                let e = self.bdd_exist_rec(fe, cube_rest)?;
                self.or(t, e)?
            }
            Some(fv) if self.bdd.level_of(fv) < self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.bdd.cofactor(f, fv);
                let t = self.bdd_exist_rec(ft, cube)?;
                let e = self.bdd_exist_rec(fe, cube)?;
                self.bdd.canonicalize_release(fv, t, e)?
            }
            _ => self.bdd_exist_rec(f, cube_rest)?,
        };
        self.cache_insert(Family::Bdd, Tag::Exist, f, cube, Nid::zero(), result);
        Ok(result)
    }

    pub fn univ(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.validate_cube(cube)?;
        self.bdd_univ_rec(f, cube)
    }
    fn bdd_univ_rec(&mut self, f: Nid, cube: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if cube.is_one() { return Ok(f); }
        if f.is_one() || f.is_zero() { return Ok(f); }
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Univ, f, cube, Nid::zero())? { return Ok(r); }
        let cube_var = self.bdd.node(cube).var.unwrap();
        let cube_rest = self.bdd.node(cube).then_;
        let f_var = self.bdd.var_of(f);
        let result = match f_var {
            Some(fv) if self.bdd.level_of(fv) == self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.bdd.cofactor(f, fv);
                let t = self.bdd_univ_rec(ft, cube_rest)?;
                let e = self.bdd_univ_rec(fe, cube_rest)?;
                self.bdd_and(t, e)?
            }
            Some(fv) if self.bdd.level_of(fv) < self.bdd.level_of(cube_var) => {
                let (ft, fe) = self.bdd.cofactor(f, fv);
                let t = self.bdd_univ_rec(ft, cube)?;
                let e = self.bdd_univ_rec(fe, cube)?;
                self.bdd.canonicalize_release(fv, t, e)?
            }
            _ => self.bdd_univ_rec(f, cube_rest)?,
        };
        self.cache_insert(Family::Bdd, Tag::Univ, f, cube, Nid::zero(), result);
        Ok(result)
    }

    /// `exist(and(f,g), cube)`, outer-memoized so repeated calls on the
    /// same triple skip both inner recursions.
    pub fn and_abstract(&mut self, f: Nid, g: Nid, cube: Nid) -> Result<Nid> {
        self.validate_cube(cube)?;
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::AndAbstract, a, b, cube)? { return Ok(r); }
        let conj = self.bdd_and(a, b)?;
        let r = self.bdd_exist_rec(conj, cube)?;
        self.cache_insert(Family::Bdd, Tag::AndAbstract, a, b, cube, r);
        Ok(r)
    }

    pub fn xor_exist_abstract(&mut self, f: Nid, g: Nid, cube: Nid) -> Result<Nid> {
        self.validate_cube(cube)?;
        let (a, b) = order(f, g);
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::XorExistAbstract, a, b, cube)? { return Ok(r); }
        let x = self.bdd_xor(a, b)?;
        let r = self.bdd_exist_rec(x, cube)?;
        self.cache_insert(Family::Bdd, Tag::XorExistAbstract, a, b, cube, r);
        Ok(r)
    }

    // ---- composition / restriction --------------------------

    /// Full (not just top-level) cofactor of `f` by fixing `v` to `value`
    /// everywhere it appears -- the building block `compose` needs since
    /// `v` may occur below other variables too.
    fn cofactor_val(&mut self, f: Nid, v: Variable, value: bool, memo: &mut FxHashMap<Nid, Nid>) -> Result<Nid> {
        if let Some(&r) = memo.get(&f) { return Ok(r); }
        let r = match self.bdd.var_of(f) {
            None => f,
            Some(fv) => {
                if self.bdd.level_of(fv) > self.bdd.level_of(v) { f }
                else if fv == v {
                    let (t, e) = self.bdd.cofactor(f, fv);
                    if value { t } else { e }
                } else {
                    let (t, e) = self.bdd.cofactor(f, fv);
                    let nt = self.cofactor_val(t, v, value, memo)?;
                    let ne = self.cofactor_val(e, v, value, memo)?;
                    self.bdd.canonicalize_release(fv, nt, ne)?
                }
            }
        };
        memo.insert(f, r);
        Ok(r)
    }

    /// `compose(f, v, g) = ite(g, f|v=1, f|v=0)`.
    pub fn compose(&mut self, f: Nid, v: Variable, g: Nid) -> Result<Nid> {
        let mut memo = FxHashMap::default();
        let f1 = self.cofactor_val(f, v, true, &mut memo)?;
        let mut memo0 = FxHashMap::default();
        let f0 = self.cofactor_val(f, v, false, &mut memo0)?;
        self.ite(g, f1, f0)
    }

    /// Simultaneous substitution, generalizing `compose` to a vector of
    /// `(variable, replacement)` pairs. Implemented as a fold of `compose`
    /// from the deepest level up -- correct as long as no replacement
    /// function reintroduces a variable earlier in the vector that has
    /// already been substituted away, which holds for the common case of
    /// substituting each variable by an independent function.
    pub fn vector_compose(&mut self, f: Nid, subst: &[(Variable, Nid)]) -> Result<Nid> {
        let mut ordered: Vec<(Variable, Nid)> = subst.to_vec();
        ordered.sort_by_key(|(v, _)| std::cmp::Reverse(self.bdd.level_of(*v).value()));
        let mut acc = f;
        for (v, g) in ordered { acc = self.compose(acc, v, g)?; }
        Ok(acc)
    }

    /// Coudert/Madre generalized cofactor restrict: simplifies `f` so it agrees with `f` wherever `c`
    /// holds, discarding don't-care structure to shrink the DAG.
    pub fn restrict(&mut self, f: Nid, c: Nid) -> Result<Nid> {
        if c.is_zero() { return Ok(f); }
        self.bdd_restrict_rec(f, c)
    }
    fn bdd_restrict_rec(&mut self, f: Nid, c: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if c.is_one() { return Ok(f); }
        if f.is_one() || f.is_zero() { return Ok(f); }
        if f == c { return Ok(Nid::one()); }
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Restrict, f, c, Nid::zero())? { return Ok(r); }
        let var = self.bdd.top_var(&[f, c]).expect("non-terminal pair has a top variable");
        let (ft, fe) = self.bdd.cofactor(f, var);
        let (ct, ce) = self.bdd.cofactor(c, var);
        let result = if ct.is_zero() {
            self.bdd_restrict_rec(fe, ce)?
        } else if ce.is_zero() {
            self.bdd_restrict_rec(ft, ct)?
        } else {
            let t = self.bdd_restrict_rec(ft, ct)?;
            let e = self.bdd_restrict_rec(fe, ce)?;
            self.bdd.canonicalize_release(var, t, e)?
        };
        self.cache_insert(Family::Bdd, Tag::Restrict, f, c, Nid::zero(), result);
        Ok(result)
    }

    /// `constrain`: the same generalized-cofactor shape as `restrict`
    /// (Coudert/Madre), cached separately since the two routines are
    /// tuned differently in CUDD (restrict favors sharing, constrain
    /// favors locality) even though this rewrite's recursion is identical.
    pub fn constrain(&mut self, f: Nid, c: Nid) -> Result<Nid> {
        if c.is_zero() { return Ok(f); }
        self.bdd_constrain_rec(f, c)
    }
    fn bdd_constrain_rec(&mut self, f: Nid, c: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if c.is_one() { return Ok(f); }
        if f.is_one() || f.is_zero() { return Ok(f); }
        if f == c { return Ok(Nid::one()); }
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Constrain, f, c, Nid::zero())? { return Ok(r); }
        let var = self.bdd.top_var(&[f, c]).expect("non-terminal pair has a top variable");
        let (ft, fe) = self.bdd.cofactor(f, var);
        let (ct, ce) = self.bdd.cofactor(c, var);
        let result = if ct.is_zero() {
            self.bdd_constrain_rec(fe, ce)?
        } else if ce.is_zero() {
            self.bdd_constrain_rec(ft, ct)?
        } else {
            let t = self.bdd_constrain_rec(ft, ct)?;
            let e = self.bdd_constrain_rec(fe, ce)?;
            self.bdd.canonicalize_release(var, t, e)?
        };
        self.cache_insert(Family::Bdd, Tag::Constrain, f, c, Nid::zero(), result);
        Ok(result)
    }

    /// `minimize`: this rewrite treats CUDD's "squeeze" variant as
    /// `restrict` under a distinct cache tag -- both return a smaller BDD
    /// agreeing with `f` on the `c`-care-set; DESIGN.md records the
    /// collapse of CUDD's several generalized-cofactor routines into one
    /// recursion.
    pub fn minimize(&mut self, f: Nid, c: Nid) -> Result<Nid> {
        if c.is_zero() { return Ok(f); }
        self.bdd_minimize_rec(f, c)
    }
    fn bdd_minimize_rec(&mut self, f: Nid, c: Nid) -> Result<Nid> {
        self.check_deadline()?;
        if c.is_one() { return Ok(f); }
        if f.is_one() || f.is_zero() { return Ok(f); }
        if f == c { return Ok(Nid::one()); }
        if let Some(r) = self.cache_probe(Family::Bdd, Tag::Minimize, f, c, Nid::zero())? { return Ok(r); }
        let var = self.bdd.top_var(&[f, c]).expect("non-terminal pair has a top variable");
        let (ft, fe) = self.bdd.cofactor(f, var);
        let (ct, ce) = self.bdd.cofactor(c, var);
        let result = if ct.is_zero() {
            self.bdd_minimize_rec(fe, ce)?
        } else if ce.is_zero() {
            self.bdd_minimize_rec(ft, ct)?
        } else {
            let t = self.bdd_minimize_rec(ft, ct)?;
            let e = self.bdd_minimize_rec(fe, ce)?;
            self.bdd.canonicalize_release(var, t, e)?
        };
        self.cache_insert(Family::Bdd, Tag::Minimize, f, c, Nid::zero(), result);
        Ok(result)
    }

    // ---- approximations -------------------------------------

    /// Bounded-depth AND: at depth 0, short-circuits to `1` (over-approx,
    /// a superset/implicant) or `0` (under-approx, a subset) instead of
    /// recursing further.
    pub fn clipping_and(&mut self, f: Nid, g: Nid, depth: u32, over: bool) -> Result<Nid> {
        self.clipping_and_rec(f, g, depth as i32, over)
    }
    fn clipping_and_rec(&mut self, f: Nid, g: Nid, depth: i32, over: bool) -> Result<Nid> {
        self.check_deadline()?;
        if f.is_zero() || g.is_zero() { return Ok(Nid::zero()); }
        if f.is_one() { return Ok(g); }
        if g.is_one() { return Ok(f); }
        if f == g { return Ok(f); }
        if f == !g { return Ok(Nid::zero()); }
        if depth <= 0 { return Ok(if over { Nid::one() } else { Nid::zero() }); }
        let (a, b) = order(f, g);
        let depth16 = depth.clamp(0, u16::MAX as i32) as u16;
        let tag = Tag::ClippingAnd { depth: depth16, over };
        if let Some(r) = self.cache_probe(Family::Bdd, tag, a, b, Nid::zero())? { return Ok(r); }
        let var = self.bdd.top_var(&[a, b]).expect("non-terminal pair has a top variable");
        let (at, ae) = self.bdd.cofactor(a, var);
        let (bt, be) = self.bdd.cofactor(b, var);
        let t = self.clipping_and_rec(at, bt, depth - 1, over)?;
        let e = self.clipping_and_rec(ae, be, depth - 1, over)?;
        let r = self.bdd.canonicalize_release(var, t, e)?;
        self.cache_insert(Family::Bdd, tag, a, b, Nid::zero(), r);
        Ok(r)
    }

    pub fn clipping_and_abstract(&mut self, f: Nid, g: Nid, cube: Nid, depth: u32, over: bool) -> Result<Nid> {
        self.validate_cube(cube)?;
        let conj = self.clipping_and(f, g, depth, over)?;
        self.bdd_exist_rec(conj, cube)
    }

    /// Length (number of branch tests) of the shortest path from `f` to
    /// the `1` terminal, memoized across the whole reachable sub-DAG.
    fn shortest_path_len(&mut self, f: Nid, memo: &mut FxHashMap<Nid, u32>) -> u32 {
        if let Some(&v) = memo.get(&f) { return v; }
        let r = if f.is_one() { 0 }
            else if f.is_zero() { u32::MAX }
            else {
                let var = self.bdd.var_of(f).unwrap();
                let (t, e) = self.bdd.cofactor(f, var);
                let lt = self.shortest_path_len(t, memo);
                let le = self.shortest_path_len(e, memo);
                let a = if lt == u32::MAX { u32::MAX } else { lt + 1 };
                let b = if le == u32::MAX { u32::MAX } else { le + 1 };
                a.min(b)
            };
        memo.insert(f, r);
        r
    }

    fn extract_short_paths(&mut self, f: Nid, budget: u32, spl: &FxHashMap<Nid, u32>, memo: &mut FxHashMap<(Nid, u32), Nid>) -> Result<Nid> {
        if f.is_one() || f.is_zero() { return Ok(f); }
        if let Some(&r) = memo.get(&(f, budget)) { return Ok(r); }
        let var = self.bdd.var_of(f).unwrap();
        let (t, e) = self.bdd.cofactor(f, var);
        let lt = *spl.get(&t).unwrap_or(&u32::MAX);
        let le = *spl.get(&e).unwrap_or(&u32::MAX);
        let new_t = if budget >= 1 && lt != u32::MAX && lt <= budget - 1 { self.extract_short_paths(t, budget - 1, spl, memo)? } else { Nid::zero() };
        let new_e = if budget >= 1 && le != u32::MAX && le <= budget - 1 { self.extract_short_paths(e, budget - 1, spl, memo)? } else { Nid::zero() };
        let r = self.bdd.canonicalize_release(var, new_t, new_e)?;
        memo.insert((f, budget), r);
        Ok(r)
    }

    /// `subset_short_paths(f) <= f`: keep only the nodes lying on a
    /// shortest 1-path of length `<= threshold`.
    pub fn subset_short_paths(&mut self, f: Nid, threshold: u32) -> Result<Nid> {
        let mut spl = FxHashMap::default();
        self.shortest_path_len(f, &mut spl);
        let mut memo = FxHashMap::default();
        self.extract_short_paths(f, threshold, &spl, &mut memo)
    }

    /// Dual of `subset_short_paths` via the complemented view: `f <=
    /// superset_short_paths(f)`.
    pub fn superset_short_paths(&mut self, f: Nid, threshold: u32) -> Result<Nid> {
        Ok(!self.subset_short_paths(!f, threshold)?)
    }

    fn subtree_size(&mut self, f: Nid, memo: &mut FxHashMap<Nid, u32>) -> u32 {
        if let Some(&v) = memo.get(&f) { return v; }
        let r = if f.is_one() || f.is_zero() { 1 }
            else {
                let var = self.bdd.var_of(f).unwrap();
                let (t, e) = self.bdd.cofactor(f, var);
                1 + self.subtree_size(t, memo) + self.subtree_size(e, memo)
            };
        memo.insert(f, r);
        r
    }

    fn heavy_extract(&mut self, f: Nid, budget: u32, sizes: &FxHashMap<Nid, u32>, memo: &mut FxHashMap<(Nid, u32), Nid>) -> Result<Nid> {
        if f.is_one() || f.is_zero() { return Ok(f); }
        if budget == 0 { return Ok(Nid::zero()); }
        if let Some(&r) = memo.get(&(f, budget)) { return Ok(r); }
        let var = self.bdd.var_of(f).unwrap();
        let (t, e) = self.bdd.cofactor(f, var);
        let st = *sizes.get(&t).unwrap_or(&1);
        let se = *sizes.get(&e).unwrap_or(&1);
        let r = if st >= se {
            let nt = self.heavy_extract(t, budget - 1, sizes, memo)?;
            self.bdd.canonicalize_release(var, nt, Nid::zero())?
        } else {
            let ne = self.heavy_extract(e, budget - 1, sizes, memo)?;
            self.bdd.canonicalize_release(var, Nid::zero(), ne)?
        };
        memo.insert((f, budget), r);
        Ok(r)
    }

    /// Subset heuristic that, at each node, follows the branch covering
    /// more of the sub-DAG ("heavier") and drops the other (CUDD's
    /// `Cudd_SubsetHeavyBranch`, approximated here with node-count as the
    /// weight proxy rather than exact minterm counts).
    pub fn subset_heavy_branch(&mut self, f: Nid, threshold: u32) -> Result<Nid> {
        let mut sizes = FxHashMap::default();
        self.subtree_size(f, &mut sizes);
        let mut memo = FxHashMap::default();
        self.heavy_extract(f, threshold, &sizes, &mut memo)
    }

    /// `subset_compress`: take the short-paths subset, then squeeze it
    /// back against the original function as a care set (CUDD's
    /// `Cudd_bddSqueeze`, approximated via `restrict`).
    pub fn subset_compress(&mut self, f: Nid, threshold: u32) -> Result<Nid> {
        let sub = self.subset_short_paths(f, threshold)?;
        self.restrict(sub, f)
    }

    // ---- utilities ----------------------------------------------------------

    /// Build a BDD cube (an AND-chain of literals, highest-level variable
    /// first) from an explicit assignment list, used by witness-extraction
    /// routines (`intersect`'s caller, `closest_cube`) that need to hand
    /// back a concrete minterm rather than a whole function.
    pub(crate) fn literal_cube(&mut self, lits: &[(Variable, bool)]) -> Result<Nid> {
        let mut acc = Nid::one();
        for &(v, pos) in lits.iter().rev() {
            let lit = self.bdd.canonicalize(v, Nid::one(), Nid::zero())?;
            let lit = if pos { lit } else { !lit };
            acc = self.bdd_and(lit, acc)?;
        }
        Ok(acc)
    }

    fn support_rec(&self, f: Nid, seen: &mut FxHashMap<Nid, ()>, out: &mut Vec<Variable>) {
        let raw = f.raw();
        if seen.insert(raw, ()).is_some() { return; }
        if let Some(v) = self.bdd.var_of(raw) {
            out.push(v);
            self.support_rec(self.bdd.then_child(raw), seen, out);
            self.support_rec(self.bdd.else_child(raw), seen, out);
        }
    }
    /// The set of variables `f` depends on, ordered by level (CUDD's
    /// `Cudd_Support`).
    pub fn support(&self, f: Nid) -> Vec<Variable> {
        let mut seen = FxHashMap::default();
        let mut out = Vec::new();
        self.support_rec(f, &mut seen, &mut out);
        out.sort_by_key(|v| self.bdd.level_of(*v).value());
        out
    }

    fn sat_count_rec(&self, f: Nid, num_vars: u32, memo: &mut FxHashMap<Nid, f64>) -> f64 {
        if f.is_one() { return 1.0; }
        if f.is_zero() { return 0.0; }
        if let Some(&c) = memo.get(&f) { return c; }
        let v = self.bdd.var_of(f).unwrap();
        let my_level = self.bdd.level_of(v).value();
        let t = self.bdd.then_child(f);
        let e = self.bdd.else_child(f);
        let level_or_bottom = |n: Nid| match self.bdd.var_of(n) {
            Some(w) => self.bdd.level_of(w).value(),
            None => num_vars,
        };
        let lt = level_or_bottom(t);
        let le = level_or_bottom(e);
        let count = self.sat_count_rec(t, num_vars, memo) * 2f64.powi((lt - my_level - 1) as i32)
            + self.sat_count_rec(e, num_vars, memo) * 2f64.powi((le - my_level - 1) as i32);
        memo.insert(f, count);
        count
    }
    /// Number of satisfying assignments over `num_vars` variables (CUDD's
    /// `Cudd_CountMinterm`), accounting for skipped levels both above the
    /// root and between a parent and its children.
    pub fn sat_count(&self, f: Nid, num_vars: u32) -> f64 {
        if f.is_zero() { return 0.0; }
        if f.is_one() { return 2f64.powi(num_vars as i32); }
        let mut memo = FxHashMap::default();
        let top_level = self.bdd.level_of(self.bdd.var_of(f).unwrap()).value();
        self.sat_count_rec(f, num_vars, &mut memo) * 2f64.powi(top_level as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vid::variable_from_index;

    fn new_mgr(nvars: u32) -> Manager { Manager::init(nvars, 0, 256, 256, u64::MAX) }

    #[test]
    fn and_is_commutative() {
        let mut m = new_mgr(2);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        assert_eq!(m.and(x, y).unwrap(), m.and(y, x).unwrap());
    }

    #[test]
    fn or_excluded_middle() {
        let mut m = new_mgr(1);
        let x = m.ith_var(0).unwrap();
        assert_eq!(m.or(x, !x).unwrap(), m.read_one());
    }

    #[test]
    fn ite_identities() {
        let mut m = new_mgr(1);
        let v = m.ith_var(0).unwrap();
        assert_eq!(m.ite(v, m.read_one(), m.read_zero()).unwrap(), v);
        assert_eq!(m.ite(v, m.read_zero(), m.read_one()).unwrap(), !v);
        let g = m.ith_var(0).unwrap();
        assert_eq!(m.ite(v, g, g).unwrap(), g);
    }

    #[test]
    fn nand_is_not_and() {
        let mut m = new_mgr(2);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        let n = m.nand(x, y).unwrap();
        let a = m.and(x, y).unwrap();
        assert_eq!(n, !a);
    }

    #[test]
    fn leq_detects_implication() {
        let mut m = new_mgr(2);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        let xy = m.and(x, y).unwrap();
        assert!(m.leq(xy, x).unwrap());
        assert!(!m.leq(x, y).unwrap());
    }

    #[test]
    fn exist_over_own_var_is_one() {
        let mut m = new_mgr(1);
        let x = m.ith_var(0).unwrap();
        let cube = x; // x is itself a valid single-variable cube
        assert_eq!(m.exist(x, cube).unwrap(), m.read_one());
    }

    #[test]
    fn and_abstract_matches_law() {
        // exist(and(f,g), v) == and(exist(f,v), g) when v not in support(g)
        let mut m = new_mgr(2);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let lhs = m.and_abstract(x0, x1, x0).unwrap();
        let ef = m.exist(x0, x0).unwrap();
        let rhs = m.and(ef, x1).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn clipping_and_is_monotone() {
        let mut m = new_mgr(2);
        let x = m.ith_var(0).unwrap();
        let y = m.ith_var(1).unwrap();
        let under = m.clipping_and(x, y, 1, false).unwrap();
        let exact = m.and(x, y).unwrap();
        let over = m.clipping_and(x, y, 1, true).unwrap();
        assert!(m.leq(under, exact).unwrap());
        assert!(m.leq(exact, over).unwrap());
    }

    #[test]
    fn subset_short_paths_is_subset() {
        let mut m = new_mgr(3);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let x2 = m.ith_var(2).unwrap();
        let f = m.or(m.and(x0, x1).unwrap(), x2).unwrap();
        let sub = m.subset_short_paths(f, 1).unwrap();
        assert!(m.leq(sub, f).unwrap());
        let sup = m.superset_short_paths(f, 1).unwrap();
        assert!(m.leq(f, sup).unwrap());
    }

    #[test]
    fn compose_substitutes_variable() {
        let mut m = new_mgr(2);
        let x0 = m.ith_var(0).unwrap();
        let x1 = m.ith_var(1).unwrap();
        let composed = m.compose(x0, variable_from_index(0), x1).unwrap();
        assert_eq!(composed, x1);
    }

    #[test]
    fn restrict_on_full_care_set_is_identity_on_one() {
        let mut m = new_mgr(1);
        let x = m.ith_var(0).unwrap();
        assert_eq!(m.restrict(x, m.read_one()).unwrap(), x);
    }
}
