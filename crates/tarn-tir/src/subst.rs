// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Variable substitution.
//!
//! Replaces free occurrences of mapped variables with their image
//! expressions. A rebinding of a mapped id shadows it for that binder's
//! scope. Assignment targets and address-of operands are retargeted only
//! when the image is itself a variable use; other images leave the target
//! untouched (the lowering only maps such vars to var uses).

use std::collections::HashMap;

use crate::expr::{
    Expr, ExprKind, Handler, MachineMethod, MatchArm, RefMachine, SetStateMethod, StructMachine,
};
use crate::vars::VarId;

/// Substitute `map` through `expr`.
pub fn subst_vars(expr: &Expr, map: &HashMap<VarId, Expr>) -> Expr {
    if map.is_empty() {
        return expr.clone();
    }
    let mut shadow = Vec::new();
    walk(expr, map, &mut shadow)
}

fn image<'a>(id: VarId, map: &'a HashMap<VarId, Expr>, shadow: &[VarId]) -> Option<&'a Expr> {
    if shadow.contains(&id) {
        return None;
    }
    map.get(&id)
}

/// Image id when the mapping sends `id` to another plain variable.
fn image_var(id: VarId, map: &HashMap<VarId, Expr>, shadow: &[VarId]) -> Option<VarId> {
    match image(id, map, shadow).map(|e| &e.kind) {
        Some(ExprKind::Var(new_id)) => Some(*new_id),
        _ => None,
    }
}

fn walk(expr: &Expr, map: &HashMap<VarId, Expr>, shadow: &mut Vec<VarId>) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Var(id) => match image(*id, map, shadow) {
            Some(img) => {
                let mut replacement = img.clone();
                replacement.span = expr.span;
                return replacement;
            }
            None => ExprKind::Var(*id),
        },
        ExprKind::AddrOf(id) => ExprKind::AddrOf(image_var(*id, map, shadow).unwrap_or(*id)),
        ExprKind::Assign { var, value } => ExprKind::Assign {
            var: image_var(*var, map, shadow).unwrap_or(*var),
            value: Box::new(walk(value, map, shadow)),
        },
        ExprKind::Const(c) => ExprKind::Const(c.clone()),
        ExprKind::Goto(l) => ExprKind::Goto(*l),
        ExprKind::LabelMark(l) => ExprKind::LabelMark(*l),
        ExprKind::Apply { callee, args } => ExprKind::Apply {
            callee: Box::new(walk(callee, map, shadow)),
            args: args.iter().map(|a| walk(a, map, shadow)).collect(),
        },
        ExprKind::Lambda { params, body } => {
            let mark = shadow.len();
            shadow.extend(params.iter().map(|p| p.id));
            let body = Box::new(walk(body, map, shadow));
            shadow.truncate(mark);
            ExprKind::Lambda {
                params: params.clone(),
                body,
            }
        }
        ExprKind::Let { var, rhs, body } => {
            let rhs = Box::new(walk(rhs, map, shadow));
            shadow.push(var.id);
            let body = Box::new(walk(body, map, shadow));
            shadow.pop();
            ExprKind::Let {
                var: var.clone(),
                rhs,
                body,
            }
        }
        ExprKind::LetRec { bindings, body } => {
            let mark = shadow.len();
            shadow.extend(bindings.iter().map(|b| b.var.id));
            let bindings = bindings
                .iter()
                .map(|b| crate::expr::Binding {
                    var: b.var.clone(),
                    rhs: walk(&b.rhs, map, shadow),
                })
                .collect();
            let body = Box::new(walk(body, map, shadow));
            shadow.truncate(mark);
            ExprKind::LetRec { bindings, body }
        }
        ExprKind::Seq { first, second } => ExprKind::Seq {
            first: Box::new(walk(first, map, shadow)),
            second: Box::new(walk(second, map, shadow)),
        },
        ExprKind::Cond {
            guard,
            then_branch,
            else_branch,
        } => ExprKind::Cond {
            guard: Box::new(walk(guard, map, shadow)),
            then_branch: Box::new(walk(then_branch, map, shadow)),
            else_branch: Box::new(walk(else_branch, map, shadow)),
        },
        ExprKind::Match { scrutinee, arms } => {
            let scrutinee = Box::new(walk(scrutinee, map, shadow));
            let arms = arms
                .iter()
                .map(|arm| {
                    let mark = shadow.len();
                    shadow.extend(arm.binders.iter().map(|v| v.id));
                    let body = walk(&arm.body, map, shadow);
                    shadow.truncate(mark);
                    MatchArm {
                        pat: arm.pat.clone(),
                        binders: arm.binders.clone(),
                        body,
                    }
                })
                .collect();
            ExprKind::Match { scrutinee, arms }
        }
        ExprKind::While { guard, body } => ExprKind::While {
            guard: Box::new(walk(guard, map, shadow)),
            body: Box::new(walk(body, map, shadow)),
        },
        ExprKind::For {
            var,
            start,
            stop,
            body,
        } => {
            let start = Box::new(walk(start, map, shadow));
            let stop = Box::new(walk(stop, map, shadow));
            shadow.push(var.id);
            let body = Box::new(walk(body, map, shadow));
            shadow.pop();
            ExprKind::For {
                var: var.clone(),
                start,
                stop,
                body,
            }
        }
        ExprKind::TryFinally { body, compensation } => ExprKind::TryFinally {
            body: Box::new(walk(body, map, shadow)),
            compensation: Box::new(walk(compensation, map, shadow)),
        },
        ExprKind::TryWith {
            body,
            filter,
            handler,
        } => ExprKind::TryWith {
            body: Box::new(walk(body, map, shadow)),
            filter: walk_handler(filter, map, shadow),
            handler: walk_handler(handler, map, shadow),
        },
        ExprKind::ResumeAt { pc } => ExprKind::ResumeAt {
            pc: Box::new(walk(pc, map, shadow)),
        },
        ExprKind::Reentry {
            first,
            pc_var,
            resumed,
        } => {
            let first = Box::new(walk(first, map, shadow));
            shadow.push(pc_var.id);
            let resumed = Box::new(walk(resumed, map, shadow));
            shadow.pop();
            ExprKind::Reentry {
                first,
                pc_var: pc_var.clone(),
                resumed,
            }
        }
        ExprKind::SupportsResume { machine, fallback } => ExprKind::SupportsResume {
            machine: Box::new(walk(machine, map, shadow)),
            fallback: Box::new(walk(fallback, map, shadow)),
        },
        ExprKind::RefMachine(machine) => {
            let mark = shadow.len();
            shadow.extend(machine.state_vars.iter().map(|v| v.id));
            let step_body = walk(&machine.step_body, map, shadow);
            shadow.truncate(mark);
            ExprKind::RefMachine(Box::new(RefMachine {
                machine_ty: machine.machine_ty.clone(),
                state_vars: machine.state_vars.clone(),
                step_body,
            }))
        }
        ExprKind::StructMachine(machine) => {
            let mark = shadow.len();
            shadow.extend(machine.state_vars.iter().map(|v| v.id));

            shadow.push(machine.step.self_var.id);
            let step_body = walk(&machine.step.body, map, shadow);
            shadow.pop();

            shadow.push(machine.set_state.self_var.id);
            shadow.push(machine.set_state.state_var.id);
            let set_state_body = walk(&machine.set_state.body, map, shadow);
            shadow.pop();
            shadow.pop();

            shadow.push(machine.after.self_var.id);
            let after_body = walk(&machine.after.body, map, shadow);
            shadow.pop();

            shadow.truncate(mark);
            ExprKind::StructMachine(Box::new(StructMachine {
                template_ty: machine.template_ty.clone(),
                state_vars: machine.state_vars.clone(),
                step: MachineMethod {
                    self_var: machine.step.self_var.clone(),
                    body: step_body,
                },
                set_state: SetStateMethod {
                    self_var: machine.set_state.self_var.clone(),
                    state_var: machine.set_state.state_var.clone(),
                    body: set_state_body,
                },
                after: MachineMethod {
                    self_var: machine.after.self_var.clone(),
                    body: after_body,
                },
            }))
        }
        ExprKind::Intrinsic { name, args } => ExprKind::Intrinsic {
            name: name.clone(),
            args: args.iter().map(|a| walk(a, map, shadow)).collect(),
        },
    };
    Expr::new(kind, expr.span)
}

fn walk_handler(handler: &Handler, map: &HashMap<VarId, Expr>, shadow: &mut Vec<VarId>) -> Handler {
    shadow.push(handler.var.id);
    let body = Box::new(walk(&handler.body, map, shadow));
    shadow.pop();
    Handler {
        var: handler.var.clone(),
        body,
    }
}
