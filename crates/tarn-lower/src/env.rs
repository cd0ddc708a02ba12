// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversion-time environments: program-counter and label supplies, the
//! PC-to-label map phase 2 renders against, the macro environment the
//! inliner substitutes from, and the context threaded through conversion.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use tarn_tir::{Expr, LabelId, Ty, Var, VarId};

/// A resume point's program counter. Numbering starts at 1; the runtime
/// resume slot holds 0 until the first suspension stores into it, so 0 is
/// never a valid PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pc(pub u32);

impl fmt::Display for Pc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for PCs, scoped to one machine.
#[derive(Debug)]
pub(crate) struct PcSupply {
    next: u32,
}

impl PcSupply {
    pub(crate) fn new() -> Self {
        // 0 stays reserved as the unset sentinel.
        PcSupply { next: 1 }
    }

    pub(crate) fn fresh(&mut self) -> Pc {
        let pc = Pc(self.next);
        self.next += 1;
        pc
    }
}

/// Allocator for jump labels, scoped to one machine.
#[derive(Debug)]
pub(crate) struct LabelSupply {
    next: u32,
}

impl LabelSupply {
    pub(crate) fn new() -> Self {
        LabelSupply { next: 0 }
    }

    pub(crate) fn fresh(&mut self) -> LabelId {
        let label = LabelId(self.next);
        self.next += 1;
        label
    }
}

/// The PC-to-label map phase 2 renders symbolic resume targets against.
/// Insertion order is preserved so jump-table arms come out in PC
/// discovery order.
#[derive(Debug, Clone, Default)]
pub(crate) struct LabelEnv {
    map: IndexMap<Pc, LabelId>,
}

impl LabelEnv {
    /// Assign one fresh label to every PC, in order.
    pub(crate) fn allocate(pcs: &[Pc], supply: &mut LabelSupply) -> Self {
        let mut map = IndexMap::with_capacity(pcs.len());
        for &pc in pcs {
            let prior = map.insert(pc, supply.fresh());
            debug_assert!(prior.is_none(), "resume point {pc} allocated twice");
        }
        LabelEnv { map }
    }

    pub(crate) fn lookup(&self, pc: Pc) -> Option<LabelId> {
        self.map.get(&pc).copied()
    }

    /// Label for a PC that must already be mapped. Every PC reaching
    /// phase 2 was allocated a label up front, so a miss is a defect in
    /// the conversion itself, not in the input.
    pub(crate) fn expect_label(&self, pc: Pc) -> LabelId {
        match self.lookup(pc) {
            Some(label) => label,
            None => panic!("resume point {pc} has no label"),
        }
    }

    /// Copy of this environment with `pairs` rebinding their PCs. Used by
    /// protected regions, which re-route their own PCs to inner labels
    /// while outer PCs keep their outer labels.
    pub(crate) fn with_overrides(&self, pairs: &[(Pc, LabelId)]) -> Self {
        let mut map = self.map.clone();
        for &(pc, label) in pairs {
            map.insert(pc, label);
        }
        LabelEnv { map }
    }
}

/// One inlinable definition: the binder (kept for diagnostics) and its
/// expanded right-hand side.
#[derive(Debug, Clone)]
pub(crate) struct MacroDef {
    pub(crate) name: String,
    pub(crate) def: Expr,
}

/// Definitions the inliner substitutes at use sites: expansion bindings
/// collected from the candidate's prefix and from `let`s met during the
/// walk, plus reentry PC variables bound to their literal PCs.
#[derive(Debug, Clone, Default)]
pub(crate) struct MacroEnv {
    defs: HashMap<VarId, MacroDef>,
}

impl MacroEnv {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Extended copy with `var` mapped to `def`.
    pub(crate) fn bind(&self, var: &Var, def: Expr) -> Self {
        let mut defs = self.defs.clone();
        defs.insert(
            var.id,
            MacroDef {
                name: var.name.clone(),
                def,
            },
        );
        MacroEnv { defs }
    }

    pub(crate) fn lookup(&self, id: VarId) -> Option<&MacroDef> {
        self.defs.get(&id)
    }
}

/// The initial `resume_at` head of a step body: the machine's resume-slot
/// variable and the read expression dispatching on it.
#[derive(Debug, Clone)]
pub(crate) struct ResumeSlot {
    pub(crate) var: VarId,
    pub(crate) read: Expr,
}

/// Context threaded through conversion.
#[derive(Debug, Clone)]
pub(crate) struct ConvertCtx {
    pub(crate) macros: MacroEnv,
    /// Struct template type of the machine under conversion, when it is a
    /// value machine. By-reference bindings to this type are the machine
    /// rebinding its own address.
    pub(crate) template_ty: Option<Ty>,
    /// Present when the step body led with a `resume_at` over the slot.
    pub(crate) resume_slot: Option<ResumeSlot>,
}

impl ConvertCtx {
    pub(crate) fn new(
        macros: MacroEnv,
        template_ty: Option<Ty>,
        resume_slot: Option<ResumeSlot>,
    ) -> Self {
        ConvertCtx {
            macros,
            template_ty,
            resume_slot,
        }
    }

    /// Context with one more macro definition in scope.
    pub(crate) fn with_macro(&self, var: &Var, def: Expr) -> Self {
        ConvertCtx {
            macros: self.macros.bind(var, def),
            template_ty: self.template_ty.clone(),
            resume_slot: self.resume_slot.clone(),
        }
    }
}
