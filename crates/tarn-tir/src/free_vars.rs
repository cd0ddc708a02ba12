// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Free-variable collection.
//!
//! Binder-aware: lambda params, let/letrec vars, for vars, match-arm
//! binders, filter/handler vars, reentry pc vars, machine state fields and
//! method self vars all scope over their bodies.

use std::collections::HashSet;

use crate::expr::{Expr, ExprKind, Handler};
use crate::vars::VarId;

/// Collect the free variables of `expr`.
pub fn free_vars(expr: &Expr) -> HashSet<VarId> {
    let mut free = HashSet::new();
    let mut bound = Vec::new();
    collect(expr, &mut bound, &mut free);
    free
}

/// True if `var` occurs free in `expr`.
pub fn occurs_free(expr: &Expr, var: VarId) -> bool {
    free_vars(expr).contains(&var)
}

fn use_site(id: VarId, bound: &[VarId], free: &mut HashSet<VarId>) {
    if !bound.contains(&id) {
        free.insert(id);
    }
}

fn collect(expr: &Expr, bound: &mut Vec<VarId>, free: &mut HashSet<VarId>) {
    match &expr.kind {
        ExprKind::Const(_) | ExprKind::Goto(_) | ExprKind::LabelMark(_) => {}
        ExprKind::Var(id) | ExprKind::AddrOf(id) => use_site(*id, bound, free),
        ExprKind::Assign { var, value } => {
            use_site(*var, bound, free);
            collect(value, bound, free);
        }
        ExprKind::Apply { callee, args } => {
            collect(callee, bound, free);
            for arg in args {
                collect(arg, bound, free);
            }
        }
        ExprKind::Lambda { params, body } => {
            let mark = bound.len();
            bound.extend(params.iter().map(|p| p.id));
            collect(body, bound, free);
            bound.truncate(mark);
        }
        ExprKind::Let { var, rhs, body } => {
            collect(rhs, bound, free);
            bound.push(var.id);
            collect(body, bound, free);
            bound.pop();
        }
        ExprKind::LetRec { bindings, body } => {
            // Recursive: every binder scopes over every rhs too.
            let mark = bound.len();
            bound.extend(bindings.iter().map(|b| b.var.id));
            for binding in bindings {
                collect(&binding.rhs, bound, free);
            }
            collect(body, bound, free);
            bound.truncate(mark);
        }
        ExprKind::Seq { first, second } => {
            collect(first, bound, free);
            collect(second, bound, free);
        }
        ExprKind::Cond {
            guard,
            then_branch,
            else_branch,
        } => {
            collect(guard, bound, free);
            collect(then_branch, bound, free);
            collect(else_branch, bound, free);
        }
        ExprKind::Match { scrutinee, arms } => {
            collect(scrutinee, bound, free);
            for arm in arms {
                let mark = bound.len();
                bound.extend(arm.binders.iter().map(|v| v.id));
                collect(&arm.body, bound, free);
                bound.truncate(mark);
            }
        }
        ExprKind::While { guard, body } => {
            collect(guard, bound, free);
            collect(body, bound, free);
        }
        ExprKind::For {
            var,
            start,
            stop,
            body,
        } => {
            collect(start, bound, free);
            collect(stop, bound, free);
            bound.push(var.id);
            collect(body, bound, free);
            bound.pop();
        }
        ExprKind::TryFinally { body, compensation } => {
            collect(body, bound, free);
            collect(compensation, bound, free);
        }
        ExprKind::TryWith {
            body,
            filter,
            handler,
        } => {
            collect(body, bound, free);
            collect_handler(filter, bound, free);
            collect_handler(handler, bound, free);
        }
        ExprKind::ResumeAt { pc } => collect(pc, bound, free),
        ExprKind::Reentry {
            first,
            pc_var,
            resumed,
        } => {
            collect(first, bound, free);
            bound.push(pc_var.id);
            collect(resumed, bound, free);
            bound.pop();
        }
        ExprKind::SupportsResume { machine, fallback } => {
            collect(machine, bound, free);
            collect(fallback, bound, free);
        }
        ExprKind::RefMachine(machine) => {
            let mark = bound.len();
            bound.extend(machine.state_vars.iter().map(|v| v.id));
            collect(&machine.step_body, bound, free);
            bound.truncate(mark);
        }
        ExprKind::StructMachine(machine) => {
            let mark = bound.len();
            bound.extend(machine.state_vars.iter().map(|v| v.id));

            bound.push(machine.step.self_var.id);
            collect(&machine.step.body, bound, free);
            bound.pop();

            bound.push(machine.set_state.self_var.id);
            bound.push(machine.set_state.state_var.id);
            collect(&machine.set_state.body, bound, free);
            bound.pop();
            bound.pop();

            bound.push(machine.after.self_var.id);
            collect(&machine.after.body, bound, free);
            bound.pop();

            bound.truncate(mark);
        }
        ExprKind::Intrinsic { args, .. } => {
            for arg in args {
                collect(arg, bound, free);
            }
        }
    }
}

fn collect_handler(handler: &Handler, bound: &mut Vec<VarId>, free: &mut HashSet<VarId>) {
    bound.push(handler.var.id);
    collect(&handler.body, bound, free);
    bound.pop();
}
