// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! State-machine lowering for resumable computations.
//!
//! This crate rewrites a recognized machine candidate into suspend/resume
//! form:
//! - Inline expansion bindings at their use sites
//! - Number every reentry with a program counter, starting at 1
//! - Promote bindings live across a suspension to machine state fields
//! - Render resume targets as labels, gotos, and a jump table over the
//!   machine's resume slot
//!
//! Lowering never edits in place: the input is read-only and the caller
//! gets either a complete rewritten machine or `None` plus warnings that
//! say why the candidate was abandoned.

mod convert;
mod env;
mod inline;
mod jump_table;
mod shape;
mod trace;
mod warn;

pub use env::Pc;
pub use shape::is_candidate;
pub use warn::{LowerWarning, LowerWarningKind};

use tarn_tir::{free_vars, Expr, Span, Var, VarTable};

use crate::convert::Conversion;
use crate::env::{ConvertCtx, LabelEnv, LabelSupply, MacroEnv, PcSupply};
use crate::shape::Shape;

/// Result of lowering one candidate.
#[derive(Debug)]
pub struct LowerResult {
    /// The rewritten machine, or `None` when the candidate was abandoned.
    pub lowered: Option<LoweredMachine>,
    pub warnings: Vec<LowerWarning>,
}

/// A successfully lowered machine.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredMachine {
    pub expr: Expr,
    /// State fields of the rewritten machine, declared order: the fields
    /// the candidate already carried, then the promoted bindings.
    pub state_fields: Vec<Var>,
    /// Resume points in discovery order.
    pub resume_points: Vec<Pc>,
}

/// One lowering run. PCs and labels are scoped to a single machine;
/// nested machines each get a fresh `Lowering` over the shared variable
/// table.
pub(crate) struct Lowering<'v> {
    pub(crate) vars: &'v mut VarTable,
    pub(crate) warnings: Vec<LowerWarning>,
    pub(crate) pcs: PcSupply,
    pub(crate) labels: LabelSupply,
}

impl<'v> Lowering<'v> {
    pub(crate) fn new(vars: &'v mut VarTable) -> Self {
        Lowering {
            vars,
            warnings: Vec::new(),
            pcs: PcSupply::new(),
            labels: LabelSupply::new(),
        }
    }

    /// Record why the candidate is being abandoned.
    pub(crate) fn warn(&mut self, kind: LowerWarningKind, span: Span) {
        if trace::enabled() {
            eprintln!("[tarn-lower] candidate abandoned: {kind}");
        }
        self.warnings.push(LowerWarning::new(kind, span));
    }

    fn lower_machine(&mut self, expr: &Expr) -> Option<LoweredMachine> {
        let recognized = shape::recognize(expr, self.vars)?;

        // Expansion variables are only meaningful while their definition
        // is in scope; one left free cannot be inlined away.
        let mut unexpanded: Vec<(u32, String)> = free_vars(expr)
            .into_iter()
            .filter_map(|id| {
                self.vars
                    .get(id)
                    .filter(|v| v.expansion)
                    .map(|v| (id.0, v.name.clone()))
            })
            .collect();
        unexpanded.sort_unstable();
        if let Some((_, name)) = unexpanded.into_iter().next() {
            self.warn(LowerWarningKind::UnexpandedExpansion { name }, expr.span);
            return None;
        }

        // Prefix definitions enter the macro environment pre-expanded, in
        // binding order, each seeing the ones before it.
        let mut macros = MacroEnv::new();
        for (var, rhs) in &recognized.prefix {
            let def = self.expand(rhs, &macros)?;
            macros = macros.bind(var, def);
        }
        let ctx = ConvertCtx::new(
            macros,
            recognized.template_ty().cloned(),
            recognized.resume.clone(),
        );

        let Conversion {
            phase1: _,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars: _,
        } = self.convert(&recognized.step_body, &ctx)?;

        let labels = LabelEnv::allocate(&entry_points, &mut self.labels);
        let mut step_body = phase2(&labels, &mut self.labels);
        if let Some(slot) = &recognized.resume {
            step_body = jump_table::build(
                &entry_points,
                &labels,
                slot.read.clone(),
                step_body,
                &mut self.labels,
            );
        }

        // Auxiliary method bodies see the same macro environment as the
        // step body but never suspend, so a leaf rewrite is enough.
        let (set_state_body, after_body) = match &recognized.shape {
            Shape::Struct {
                set_state, after, ..
            } => (
                Some(self.expand(&set_state.body, &ctx.macros)?),
                Some(self.expand(&after.body, &ctx.macros)?),
            ),
            Shape::Ref { .. } => (None, None),
        };

        if trace::enabled() {
            eprintln!(
                "[tarn-lower] machine lowered: {} resume points, {} promoted fields",
                entry_points.len(),
                state_vars.len()
            );
        }
        let expr = recognized.shape.rebuild(
            recognized.span,
            step_body,
            state_vars.clone(),
            &this_vars,
            set_state_body,
            after_body,
        );
        Some(LoweredMachine {
            expr,
            state_fields: state_vars,
            resume_points: entry_points,
        })
    }

    /// Lower a machine nested inside another candidate's expression. The
    /// nested machine numbers its own PCs and labels from scratch; on
    /// failure its warnings carry over and the subtree stays as written.
    pub(crate) fn lower_nested(&mut self, expr: &Expr) -> Expr {
        let mut inner = Lowering::new(&mut *self.vars);
        let lowered = inner.lower_machine(expr);
        let inner_warnings = inner.warnings;
        self.warnings.extend(inner_warnings);
        match lowered {
            Some(machine) => machine.expr,
            None => expr.clone(),
        }
    }
}

/// Lower one machine candidate.
///
/// Non-candidates come back untouched with no warnings; probing every
/// expression in a program is the intended use. An abandoned candidate
/// reports at least one warning and `lowered` stays `None`.
pub fn lower(expr: &Expr, vars: &mut VarTable) -> LowerResult {
    let mut lowering = Lowering::new(vars);
    let lowered = lowering.lower_machine(expr);
    LowerResult {
        lowered,
        warnings: lowering.warnings,
    }
}
