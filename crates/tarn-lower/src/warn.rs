// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lowering warnings.
//!
//! The pass never fails hard: when a candidate cannot be compiled to a
//! state machine it emits one of these and the caller keeps the dynamic
//! fallback path. Kinds carry `PartialEq` so tests can assert on the
//! exact rejection.

use tarn_tir::Span;
use thiserror::Error;

/// A reason the lowering declined a machine candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct LowerWarning {
    pub kind: LowerWarningKind,
    pub span: Span,
}

impl LowerWarning {
    pub fn new(kind: LowerWarningKind, span: Span) -> Self {
        LowerWarning { kind, span }
    }
}

/// The kind of lowering warning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerWarningKind {
    /// A suspension point inside `try ... finally` cannot be resumed into.
    #[error("a `try ... finally` body cannot contain a suspension point")]
    TryFinallySuspension,

    /// A suspension point inside an integer `for` loop.
    #[error("a `for` loop cannot contain a suspension point")]
    ForLoopSuspension,

    /// A suspension point inside an exception filter or handler.
    #[error("an exception filter or handler cannot contain a suspension point")]
    HandlerSuspension,

    /// `let rec` inside resumable code.
    #[error("recursive bindings are not supported in resumable code")]
    RecursiveBinding,

    /// An expansion was applied to fewer arguments than it declares.
    #[error("`{name}` expects {expected} arguments but was given {found}")]
    ExpansionArity {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A resume target did not reduce to a literal program counter.
    #[error("resume target does not reduce to a constant program counter")]
    NonConstantResumeTarget,

    /// An expansion variable stayed free in the candidate, so its
    /// definition can never be inlined.
    #[error("expansion `{name}` has no definition in the candidate")]
    UnexpandedExpansion { name: String },

    /// A `try ... with` body suspends but the step body carries no resume
    /// slot to re-dispatch on inside the protected region.
    #[error("cannot resume inside a protected region: the machine has no resume slot")]
    ProtectedRegionWithoutSlot,
}
