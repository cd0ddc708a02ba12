// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Typed expression tree for resumable-computation lowering.
//!
//! This crate defines the desugared tree the machine lowering consumes,
//! plus the rewrite infrastructure it expects: node constructors,
//! free-variable collection, shadowing-aware substitution, and a
//! structural printer.

pub mod build;
pub mod expr;
pub mod free_vars;
pub mod span;
pub mod subst;
pub mod ty;
pub mod vars;

mod display;

pub use expr::{
    Binding, Const, Expr, ExprKind, Handler, LabelId, MachineMethod, MatchArm, Pat, RefMachine,
    SetStateMethod, StructMachine,
};
pub use free_vars::{free_vars, occurs_free};
pub use span::{LineMap, Span};
pub use subst::subst_vars;
pub use ty::Ty;
pub use vars::{Var, VarId, VarTable, EXPANSION_PREFIX, STACK_PREFIX};
