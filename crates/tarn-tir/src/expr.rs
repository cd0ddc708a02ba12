// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expression tree the machine lowering runs on.
//!
//! This is the desugared, typed form of a resumable computation: builder
//! calls are already rewritten into expansion bindings, reentry tests, and
//! resume-at markers, and machine candidates appear as [`RefMachine`] /
//! [`StructMachine`] nodes behind a [`ExprKind::SupportsResume`] guard.
//!
//! Trees derive structural `PartialEq` so rewrites can be compared
//! node-for-node in tests.

use crate::span::Span;
use crate::ty::Ty;
use crate::vars::{Var, VarId};

/// Jump label introduced by the lowering. [`ExprKind::LabelMark`] places
/// one; [`ExprKind::Goto`] transfers control to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Unit,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Zero value of the expression's type, synthesized as the fallthrough
    /// of an incomplete match.
    Zero,
}

/// An expression with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr { kind, span }
    }

    /// Expression synthesized by the compiler, with no source location.
    pub fn synth(kind: ExprKind) -> Expr {
        Expr {
            kind,
            span: Span::DUMMY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const(Const),
    /// Use of a variable.
    Var(VarId),
    /// Callee applied to arguments.
    Apply { callee: Box<Expr>, args: Vec<Expr> },
    Lambda { params: Vec<Var>, body: Box<Expr> },
    /// Non-recursive `let`.
    Let {
        var: Var,
        rhs: Box<Expr>,
        body: Box<Expr>,
    },
    /// Mutually recursive bindings. Never legal inside resumable code.
    LetRec {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    Seq { first: Box<Expr>, second: Box<Expr> },
    Cond {
        guard: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// Compiled decision tree: scrutinee plus a flat arm frontier.
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    While { guard: Box<Expr>, body: Box<Expr> },
    /// Integer for-loop over inclusive bounds.
    For {
        var: Var,
        start: Box<Expr>,
        stop: Box<Expr>,
        body: Box<Expr>,
    },
    TryFinally {
        body: Box<Expr>,
        compensation: Box<Expr>,
    },
    TryWith {
        body: Box<Expr>,
        filter: Handler,
        handler: Handler,
    },
    /// Store to a mutable variable. Once the variable is machine state
    /// this reads as a field store on the machine.
    Assign { var: VarId, value: Box<Expr> },
    /// Address of a mutable variable.
    AddrOf(VarId),
    /// `__resume_at <pc>`: transfer control to a resume point. Inside a
    /// step body the operand must macro-reduce to a literal; at the head
    /// of a step body it reads the machine's resume slot instead.
    ResumeAt { pc: Box<Expr> },
    /// Reentry test. `first` runs the first time control passes through;
    /// `resumed` runs only when dispatch jumps into it, with `pc_var`
    /// bound to the suspension's program counter.
    Reentry {
        first: Box<Expr>,
        pc_var: Var,
        resumed: Box<Expr>,
    },
    /// Builder capability guard: `machine` when state-machine compilation
    /// is available, `fallback` otherwise.
    SupportsResume {
        machine: Box<Expr>,
        fallback: Box<Expr>,
    },
    Goto(LabelId),
    LabelMark(LabelId),
    /// Heap-allocated machine overriding a single `step` method.
    RefMachine(Box<RefMachine>),
    /// Value-type machine instantiating a struct template.
    StructMachine(Box<StructMachine>),
    /// Opaque runtime or builder operation.
    Intrinsic { name: String, args: Vec<Expr> },
}

/// One `let rec` binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub var: Var,
    pub rhs: Expr,
}

/// One decision-tree arm: pattern, the variables it binds, body.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pat: Pat,
    pub binders: Vec<Var>,
    pub body: Expr,
}

/// Decision-tree tests, already compiled to a flat frontier.
#[derive(Debug, Clone, PartialEq)]
pub enum Pat {
    Wildcard,
    Int(i64),
    Bool(bool),
    /// Constructor test; the payload lands in the arm's binders.
    Ctor(String),
}

/// Exception filter or handler arm: the bound exception variable and a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub var: Var,
    pub body: Box<Expr>,
}

/// Heap machine: an object expression overriding `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct RefMachine {
    pub machine_ty: Ty,
    /// Fields added by the lowering for state persisted across suspensions.
    pub state_vars: Vec<Var>,
    pub step_body: Expr,
}

/// Value-type machine: a struct template with `step`, `set_state`, and
/// `after` members.
#[derive(Debug, Clone, PartialEq)]
pub struct StructMachine {
    pub template_ty: Ty,
    /// Fields added by the lowering for state persisted across suspensions.
    pub state_vars: Vec<Var>,
    pub step: MachineMethod,
    pub set_state: SetStateMethod,
    /// Post-construction code run once the machine value exists.
    pub after: MachineMethod,
}

/// A machine method: self binder plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineMethod {
    pub self_var: Var,
    pub body: Expr,
}

/// The state-assignment method: `set_state(self, state)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStateMethod {
    pub self_var: Var,
    pub state_var: Var,
    pub body: Expr,
}
