//! Node arena shared by the BDD/ADD table and (a separate instance of) the
//! ZDD table. A `Node` is either a terminal (no branch variable; its
//! numeric payload lives in the parallel `values` vector kept by
//! `arena::Arena`) or an internal node with a branch variable and two
//! child edges.
use crate::nid::Nid;
use crate::vid::Variable;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Node {
    /// `None` for terminal nodes.
    pub var: Option<Variable>,
    pub then_: Nid,
    pub else_: Nid,
    /// Saturating reference count; terminals are pinned at `u32::MAX`.
    pub ref_count: u32,
    /// Next link for the unique-table bucket chain, and (when the node is
    /// dead and has been swept) the free-list link. `u32::MAX` terminates.
    pub next: u32,
    pub dead: bool,
}

pub(crate) const PINNED: u32 = u32::MAX;
pub(crate) const NIL: u32 = u32::MAX;

impl Node {
    pub fn terminal() -> Node {
        Node { var: None, then_: Nid::zero(), else_: Nid::zero(), ref_count: PINNED, next: NIL, dead: false }
    }
    pub fn internal(var: Variable, then_: Nid, else_: Nid) -> Node {
        Node { var: Some(var), then_, else_, ref_count: 0, next: NIL, dead: false }
    }
    #[inline] pub fn is_terminal(&self) -> bool { self.var.is_none() }
    #[inline] pub fn bump_ref(&mut self) {
        if self.ref_count != PINNED { self.ref_count = self.ref_count.saturating_add(1); }
    }
    /// Decrement the reference count. Returns `true` if it just reached zero
    /// (the node became dead).
    #[inline] pub fn drop_ref(&mut self) -> bool {
        if self.ref_count == PINNED { return false; }
        debug_assert!(self.ref_count > 0, "reference count underflow");
        self.ref_count -= 1;
        if self.ref_count == 0 { self.dead = true; true } else { false }
    }
    #[inline] pub fn revive(&mut self) {
        self.dead = false;
        self.ref_count = 1;
    }
}
