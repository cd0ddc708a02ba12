// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Machine-shape recognition.
//!
//! A candidate is a spine of expansion bindings and capability guards
//! ending in a [`RefMachine`] or [`StructMachine`] node. [`is_candidate`]
//! decides that with a bounded walk down the spine so the surrounding
//! compiler can probe every expression cheaply; [`recognize`] then pulls
//! the pieces apart and keeps enough context to rebuild the machine
//! around a rendered step body.

use tarn_tir::{
    build, subst_vars, Expr, ExprKind, MachineMethod, RefMachine, SetStateMethod, Span,
    StructMachine, Ty, Var, VarTable,
};

use crate::env::ResumeSlot;

/// A recognized machine candidate.
#[derive(Debug)]
pub(crate) struct Recognized {
    /// Expansion bindings stripped from the spine, in binding order.
    pub(crate) prefix: Vec<(Var, Expr)>,
    /// Span of the machine node, kept for the rebuilt expression.
    pub(crate) span: Span,
    /// Present when the step body led with `resume_at` over the slot.
    pub(crate) resume: Option<ResumeSlot>,
    /// Step body with the resume head stripped.
    pub(crate) step_body: Expr,
    pub(crate) shape: Shape,
}

/// Which machine form the candidate takes, with everything rebuild needs.
#[derive(Debug)]
pub(crate) enum Shape {
    Ref {
        machine_ty: Ty,
        state_vars: Vec<Var>,
    },
    Struct {
        template_ty: Ty,
        state_vars: Vec<Var>,
        step_self: Var,
        set_state: SetStateMethod,
        after: MachineMethod,
    },
}

impl Recognized {
    pub(crate) fn template_ty(&self) -> Option<&Ty> {
        match &self.shape {
            Shape::Ref { .. } => None,
            Shape::Struct { template_ty, .. } => Some(template_ty),
        }
    }
}

impl Shape {
    /// Reassemble the machine expression around the rendered step body,
    /// with the state fields the conversion discovered appended. For value
    /// machines, self-reference rebindings collapse onto the step method's
    /// own self binder, and the rewritten auxiliary method bodies slot
    /// back in.
    pub(crate) fn rebuild(
        self,
        span: Span,
        step_body: Expr,
        added_state: Vec<Var>,
        this_vars: &[Var],
        set_state_body: Option<Expr>,
        after_body: Option<Expr>,
    ) -> Expr {
        match self {
            Shape::Ref {
                machine_ty,
                mut state_vars,
            } => {
                state_vars.extend(added_state);
                Expr::new(
                    ExprKind::RefMachine(Box::new(RefMachine {
                        machine_ty,
                        state_vars,
                        step_body,
                    })),
                    span,
                )
            }
            Shape::Struct {
                template_ty,
                mut state_vars,
                step_self,
                set_state,
                after,
            } => {
                state_vars.extend(added_state);
                let this_map = this_vars
                    .iter()
                    .map(|v| (v.id, build::var(&step_self)))
                    .collect();
                let step_body = subst_vars(&step_body, &this_map);
                Expr::new(
                    ExprKind::StructMachine(Box::new(StructMachine {
                        template_ty,
                        state_vars,
                        step: MachineMethod {
                            self_var: step_self,
                            body: step_body,
                        },
                        set_state: SetStateMethod {
                            self_var: set_state.self_var,
                            state_var: set_state.state_var,
                            body: set_state_body.unwrap_or(set_state.body),
                        },
                        after: MachineMethod {
                            self_var: after.self_var,
                            body: after_body.unwrap_or(after.body),
                        },
                    })),
                    span,
                )
            }
        }
    }
}

enum SpineEnd<'e> {
    Ref(&'e RefMachine, Span),
    Struct(&'e StructMachine, Span),
}

/// Walk the prefix spine. Borrows only; cost is bounded by the prefix
/// length, independent of subtree sizes.
fn strip_spine(expr: &Expr) -> Option<(Vec<(&Var, &Expr)>, SpineEnd<'_>)> {
    let mut prefix = Vec::new();
    let mut cur = expr;
    loop {
        match &cur.kind {
            ExprKind::Let { var, rhs, body } if var.expansion => {
                prefix.push((var, rhs.as_ref()));
                cur = body;
            }
            ExprKind::SupportsResume { machine, .. } => cur = machine,
            ExprKind::RefMachine(machine) => {
                return Some((prefix, SpineEnd::Ref(machine, cur.span)));
            }
            ExprKind::StructMachine(machine) => {
                return Some((prefix, SpineEnd::Struct(machine, cur.span)));
            }
            _ => return None,
        }
    }
}

/// True when `expr` has the candidate spine. This is the quick-reject
/// test: no recursion into subtrees and nothing cloned.
pub fn is_candidate(expr: &Expr) -> bool {
    strip_spine(expr).is_some()
}

/// Recognize a machine candidate and pull it apart. Copies are made only
/// once the spine test has passed.
pub(crate) fn recognize(expr: &Expr, vars: &VarTable) -> Option<Recognized> {
    let (prefix, end) = strip_spine(expr)?;
    let prefix = prefix
        .into_iter()
        .map(|(v, e)| (v.clone(), e.clone()))
        .collect();
    match end {
        SpineEnd::Ref(machine, span) => {
            let (resume, step_body) = split_resume_head(&machine.step_body, vars)?;
            Some(Recognized {
                prefix,
                span,
                resume,
                step_body,
                shape: Shape::Ref {
                    machine_ty: machine.machine_ty.clone(),
                    state_vars: machine.state_vars.clone(),
                },
            })
        }
        SpineEnd::Struct(machine, span) => {
            let (resume, step_body) = split_resume_head(&machine.step.body, vars)?;
            Some(Recognized {
                prefix,
                span,
                resume,
                step_body,
                shape: Shape::Struct {
                    template_ty: machine.template_ty.clone(),
                    state_vars: machine.state_vars.clone(),
                    step_self: machine.step.self_var.clone(),
                    set_state: machine.set_state.clone(),
                    after: machine.after.clone(),
                },
            })
        }
    }
}

/// Split an optional leading `resume_at` off a step body. The protocol
/// only ever dispatches on a read of the machine's mutable resume slot;
/// a leading `resume_at` over anything else disqualifies the candidate.
fn split_resume_head(body: &Expr, vars: &VarTable) -> Option<(Option<ResumeSlot>, Expr)> {
    if let ExprKind::Seq { first, second } = &body.kind {
        if let ExprKind::ResumeAt { pc } = &first.kind {
            return match &pc.kind {
                ExprKind::Var(id) if vars.get(*id).map_or(false, |v| v.mutable) => {
                    let slot = ResumeSlot {
                        var: *id,
                        read: pc.as_ref().clone(),
                    };
                    Some((Some(slot), second.as_ref().clone()))
                }
                _ => None,
            };
        }
    }
    Some((None, body.clone()))
}
