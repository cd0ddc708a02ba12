// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Variables and binder metadata.

use crate::ty::Ty;

/// Unique identifier for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Name prefix of builder-synthesized expansion bindings (inlined closures
/// standing in for builder method bodies).
pub const EXPANSION_PREFIX: &str = "__expand_";

/// Name prefix of builder-protocol transients. These are re-established
/// after every resumption by construction and never become machine state.
pub const STACK_PREFIX: &str = "__stack_";

/// A variable binder. The binding site owns the metadata; use sites refer
/// to it by [`VarId`].
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub id: VarId,
    pub name: String,
    pub ty: Ty,
    pub mutable: bool,
    /// Builder-synthesized macro closure binding. The inliner substitutes
    /// its definition and the binding disappears before conversion.
    pub expansion: bool,
    /// Already compiled at top level; never needs machine storage.
    pub top_level: bool,
    /// Must stay a real local regardless of liveness.
    pub keep_local: bool,
}

impl Var {
    /// True for `__stack_`-prefixed transients.
    pub fn is_stack_transient(&self) -> bool {
        self.name.starts_with(STACK_PREFIX)
    }
}

/// Allocator and registry for variables.
///
/// Binders own their metadata inside the tree; the table keeps a copy per
/// id so passes can look up variables whose binders lie outside the
/// expression at hand (free variables of a candidate).
#[derive(Debug, Default)]
pub struct VarTable {
    vars: Vec<Var>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> VarId {
        VarId(self.vars.len() as u32)
    }

    fn alloc(&mut self, var: Var) -> Var {
        self.vars.push(var.clone());
        var
    }

    pub fn fresh(&mut self, name: impl Into<String>, ty: Ty) -> Var {
        let id = self.next_id();
        self.alloc(Var {
            id,
            name: name.into(),
            ty,
            mutable: false,
            expansion: false,
            top_level: false,
            keep_local: false,
        })
    }

    pub fn fresh_mut(&mut self, name: impl Into<String>, ty: Ty) -> Var {
        let id = self.next_id();
        self.alloc(Var {
            id,
            name: name.into(),
            ty,
            mutable: true,
            expansion: false,
            top_level: false,
            keep_local: false,
        })
    }

    /// Fresh expansion binder, named with the `__expand_` prefix.
    pub fn fresh_expansion(&mut self, name: &str, ty: Ty) -> Var {
        let id = self.next_id();
        self.alloc(Var {
            id,
            name: format!("{}{}", EXPANSION_PREFIX, name),
            ty,
            mutable: false,
            expansion: true,
            top_level: false,
            keep_local: false,
        })
    }

    /// Fresh `__stack_` transient.
    pub fn fresh_stack(&mut self, name: &str, ty: Ty) -> Var {
        let id = self.next_id();
        self.alloc(Var {
            id,
            name: format!("{}{}", STACK_PREFIX, name),
            ty,
            mutable: true,
            expansion: false,
            top_level: false,
            keep_local: false,
        })
    }

    /// Metadata for a variable allocated from this table.
    pub fn get(&self, id: VarId) -> Option<&Var> {
        self.vars.get(id.0 as usize)
    }

    pub fn is_expansion(&self, id: VarId) -> bool {
        self.get(id).map_or(false, |v| v.expansion)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_ids_are_dense_and_unique() {
        let mut vars = VarTable::new();
        let a = vars.fresh("a", Ty::Int);
        let b = vars.fresh("b", Ty::Int);
        assert_ne!(a.id, b.id);
        assert_eq!(vars.get(a.id).map(|v| v.name.as_str()), Some("a"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn synthetic_prefixes() {
        let mut vars = VarTable::new();
        let code = vars.fresh_expansion("code", Ty::Unknown);
        assert!(code.expansion);
        assert_eq!(code.name, "__expand_code");
        assert!(!code.is_stack_transient());
        assert!(vars.is_expansion(code.id));

        let fin = vars.fresh_stack("fin", Ty::Bool);
        assert!(fin.is_stack_transient());
        assert!(fin.mutable);
        assert!(!vars.is_expansion(fin.id));
    }
}
