// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Two-phase conversion of a step body.
//!
//! Phase 1 rewrites the tree with resume targets left symbolic; it is what
//! liveness questions are asked of. Phase 2 is deferred until every PC in
//! the machine has a label, then renders the executable tree with gotos
//! and label marks. Phase 2 may mint fresh labels (protected regions need
//! inner ones) but never allocates PCs.
//!
//! Bindings whose variable is live across a suspension are promoted to
//! machine state; a binding that merely rebinds the machine's own address
//! is dropped and its uses later collapse onto the step self binder.
//!
//! Conversion is conservative: any arrangement it cannot compile warns
//! and abandons the candidate, so the caller never sees partial output.

use std::collections::HashSet;

use tarn_tir::{
    build, free_vars, Const, Expr, ExprKind, Handler, MatchArm, Span, Ty, Var, VarId,
};

use crate::env::{ConvertCtx, LabelEnv, LabelSupply, Pc};
use crate::warn::LowerWarningKind;
use crate::{jump_table, trace, Lowering};

/// Deferred phase-2 rendering against the machine's label map.
pub(crate) type Phase2 = Box<dyn FnOnce(&LabelEnv, &mut LabelSupply) -> Expr>;

/// Result of converting one subtree.
pub(crate) struct Conversion {
    /// Rewritten tree with resume targets still symbolic.
    pub(crate) phase1: Expr,
    pub(crate) phase2: Phase2,
    /// PCs allocated in this subtree: own PC first, then children's, in
    /// discovery order.
    pub(crate) entry_points: Vec<Pc>,
    /// Bindings promoted to machine state, outermost first.
    pub(crate) state_vars: Vec<Var>,
    /// Dropped rebindings of the machine's own address.
    pub(crate) this_vars: Vec<Var>,
    /// Variables live across a suspension somewhere in this subtree.
    pub(crate) async_vars: HashSet<VarId>,
}

/// A subtree with no suspension structure: both phases are the same
/// already-rewritten expression.
fn leaf(expr: Expr) -> Conversion {
    Conversion {
        phase1: expr.clone(),
        phase2: Box::new(move |_, _| expr),
        entry_points: Vec::new(),
        state_vars: Vec::new(),
        this_vars: Vec::new(),
        async_vars: HashSet::new(),
    }
}

/// Two-way branch that always runs `first` dynamically but keeps the
/// resumed branch statically reachable so dispatch can jump into it.
fn transparent_branch(span: Span, resumed: Expr, first: Expr) -> Expr {
    Expr::new(
        ExprKind::Cond {
            guard: Box::new(build::boolean(false)),
            then_branch: Box::new(resumed),
            else_branch: Box::new(first),
        },
        span,
    )
}

/// Prepend the backward-edge slot reset: a loop iteration must not re-run
/// under a stale resume value.
fn with_slot_clear(slot: Option<VarId>, body: Expr) -> Expr {
    match slot {
        Some(var) => build::seq(build::assign(var, build::int(0)), body),
        None => body,
    }
}

impl Lowering<'_> {
    pub(crate) fn convert(&mut self, expr: &Expr, ctx: &ConvertCtx) -> Option<Conversion> {
        match &expr.kind {
            ExprKind::Reentry {
                first,
                pc_var,
                resumed,
            } => self.convert_reentry(expr.span, first, pc_var, resumed, ctx),
            ExprKind::ResumeAt { pc } => self.convert_resume_at(expr.span, pc, ctx),
            ExprKind::Seq { first, second } => self.convert_seq(expr.span, first, second, ctx),
            ExprKind::Let { var, rhs, body } if var.expansion => {
                let def = self.expand(rhs, &ctx.macros)?;
                let extended = ctx.with_macro(var, def);
                // The binding disappears; uses were substituted.
                self.convert(body, &extended)
            }
            ExprKind::Let { var, rhs, body } if var.is_stack_transient() => {
                self.convert_stack_let(expr.span, var, rhs, body, ctx)
            }
            ExprKind::Let { var, rhs, body } => {
                self.convert_let(expr.span, var, rhs, body, ctx)
            }
            ExprKind::LetRec { .. } => {
                self.warn(LowerWarningKind::RecursiveBinding, expr.span);
                None
            }
            ExprKind::While { guard, body } => self.convert_while(expr.span, guard, body, ctx),
            ExprKind::For {
                var,
                start,
                stop,
                body,
            } => self.convert_for(expr.span, var, start, stop, body, ctx),
            ExprKind::TryFinally { body, compensation } => {
                self.convert_try_finally(expr.span, body, compensation, ctx)
            }
            ExprKind::TryWith {
                body,
                filter,
                handler,
            } => self.convert_try_with(expr.span, body, filter, handler, ctx),
            ExprKind::Match { scrutinee, arms } => {
                self.convert_match(expr.span, scrutinee, arms, ctx)
            }
            ExprKind::Cond {
                guard,
                then_branch,
                else_branch,
            } => self.convert_cond(expr.span, guard, then_branch, else_branch, ctx),
            _ => {
                let rewritten = self.expand(expr, &ctx.macros)?;
                Some(leaf(rewritten))
            }
        }
    }

    fn convert_reentry(
        &mut self,
        span: Span,
        first: &Expr,
        pc_var: &Var,
        resumed: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let pc = self.pcs.fresh();
        if trace::enabled() {
            eprintln!("[tarn-lower] reentry `{}` gets pc {pc}", pc_var.name);
        }
        let conv_first = self.convert(first, ctx)?;
        // The resumed branch sees its own PC as a compile-time constant.
        let resumed_ctx = ctx.with_macro(pc_var, build::int(i64::from(pc.0)));
        let conv_resumed = self.convert(resumed, &resumed_ctx)?;

        let Conversion {
            phase1: first1,
            phase2: first2,
            entry_points: first_eps,
            mut state_vars,
            mut this_vars,
            mut async_vars,
        } = conv_first;
        let Conversion {
            phase1: resumed1,
            phase2: resumed2,
            entry_points: resumed_eps,
            state_vars: resumed_sv,
            this_vars: resumed_tv,
            async_vars: _,
        } = conv_resumed;

        let mut entry_points = vec![pc];
        entry_points.extend(first_eps);
        entry_points.extend(resumed_eps);
        state_vars.extend(resumed_sv);
        this_vars.extend(resumed_tv);
        // Everything the resumed branch touches is live across the
        // suspension, whether or not it suspends again itself.
        async_vars.extend(free_vars(&resumed1));

        let phase1 = transparent_branch(span, resumed1, first1);
        let phase2: Phase2 = Box::new(move |labels, supply| {
            let mark = build::label_mark(labels.expect_label(pc));
            let resumed = build::seq(mark, resumed2(labels, supply));
            transparent_branch(span, resumed, first2(labels, supply))
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }

    fn convert_resume_at(
        &mut self,
        span: Span,
        pc_expr: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let reduced = self.expand(pc_expr, &ctx.macros)?;
        let pc = match reduced.kind {
            ExprKind::Const(Const::Int(n)) if n > 0 && n <= i64::from(u32::MAX) => Pc(n as u32),
            _ => {
                self.warn(LowerWarningKind::NonConstantResumeTarget, span);
                return None;
            }
        };
        let phase1 = Expr::new(
            ExprKind::ResumeAt {
                pc: Box::new(build::int(i64::from(pc.0))),
            },
            span,
        );
        Some(Conversion {
            phase1,
            phase2: Box::new(move |labels, _| {
                Expr::new(ExprKind::Goto(labels.expect_label(pc)), span)
            }),
            entry_points: Vec::new(),
            state_vars: Vec::new(),
            this_vars: Vec::new(),
            async_vars: HashSet::new(),
        })
    }

    fn convert_seq(
        &mut self,
        span: Span,
        first: &Expr,
        second: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let conv_first = self.convert(first, ctx)?;
        let conv_second = self.convert(second, ctx)?;

        let Conversion {
            phase1: first1,
            phase2: first2,
            mut entry_points,
            mut state_vars,
            mut this_vars,
            mut async_vars,
        } = conv_first;
        let Conversion {
            phase1: second1,
            phase2: second2,
            entry_points: second_eps,
            state_vars: second_sv,
            this_vars: second_tv,
            async_vars: second_av,
        } = conv_second;

        let left_suspends = !entry_points.is_empty();
        entry_points.extend(second_eps);
        state_vars.extend(second_sv);
        this_vars.extend(second_tv);
        if left_suspends {
            // A resumption inside the left side re-enters ahead of the
            // whole right side, so all of it counts as live-across.
            async_vars.extend(free_vars(&second1));
        } else {
            async_vars = second_av;
        }

        let phase1 = Expr::new(
            ExprKind::Seq {
                first: Box::new(first1),
                second: Box::new(second1),
            },
            span,
        );
        let phase2: Phase2 = Box::new(move |labels, supply| {
            Expr::new(
                ExprKind::Seq {
                    first: Box::new(first2(labels, supply)),
                    second: Box::new(second2(labels, supply)),
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }

    /// `let __stack_x = rhs in body` is sequencing, not storage: the
    /// protocol re-establishes the transient on every resumption, so the
    /// rhs converts as resumable code and the binder never becomes state.
    fn convert_stack_let(
        &mut self,
        span: Span,
        var: &Var,
        rhs: &Expr,
        body: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let conv_rhs = self.convert(rhs, ctx)?;
        let conv_body = self.convert(body, ctx)?;

        let Conversion {
            phase1: rhs1,
            phase2: rhs2,
            mut entry_points,
            mut state_vars,
            mut this_vars,
            mut async_vars,
        } = conv_rhs;
        let Conversion {
            phase1: body1,
            phase2: body2,
            entry_points: body_eps,
            state_vars: body_sv,
            this_vars: body_tv,
            async_vars: body_av,
        } = conv_body;

        let left_suspends = !entry_points.is_empty();
        entry_points.extend(body_eps);
        state_vars.extend(body_sv);
        this_vars.extend(body_tv);
        if left_suspends {
            async_vars.extend(free_vars(&body1));
        } else {
            async_vars = body_av;
        }
        async_vars.remove(&var.id);

        let var1 = var.clone();
        let var2 = var.clone();
        let phase1 = Expr::new(
            ExprKind::Let {
                var: var1,
                rhs: Box::new(rhs1),
                body: Box::new(body1),
            },
            span,
        );
        let phase2: Phase2 = Box::new(move |labels, supply| {
            Expr::new(
                ExprKind::Let {
                    var: var2,
                    rhs: Box::new(rhs2(labels, supply)),
                    body: Box::new(body2(labels, supply)),
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }

    /// Ordinary `let`: leaf-rewrite the rhs, convert the body, then
    /// classify the binder as local, self rebinding, or machine state.
    fn convert_let(
        &mut self,
        span: Span,
        var: &Var,
        rhs: &Expr,
        body: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let rhs = self.expand(rhs, &ctx.macros)?;
        let conv_body = self.convert(body, ctx)?;
        let Conversion {
            phase1: body1,
            phase2: body2,
            entry_points,
            mut state_vars,
            mut this_vars,
            mut async_vars,
        } = conv_body;
        let lives_across = async_vars.remove(&var.id);

        if var.top_level || var.keep_local || !lives_across {
            let var1 = var.clone();
            let var2 = var.clone();
            let rhs2 = rhs.clone();
            let phase1 = Expr::new(
                ExprKind::Let {
                    var: var1,
                    rhs: Box::new(rhs),
                    body: Box::new(body1),
                },
                span,
            );
            let phase2: Phase2 = Box::new(move |labels, supply| {
                Expr::new(
                    ExprKind::Let {
                        var: var2,
                        rhs: Box::new(rhs2),
                        body: Box::new(body2(labels, supply)),
                    },
                    span,
                )
            });
            return Some(Conversion {
                phase1,
                phase2,
                entry_points,
                state_vars,
                this_vars,
                async_vars,
            });
        }

        let rebinds_self = match (&var.ty, &ctx.template_ty) {
            (Ty::ByRef(inner), Some(template)) => inner.as_ref() == template,
            _ => false,
        };
        if rebinds_self {
            // The rhs is just the machine's own address; drop the binding
            // and let rebuild redirect the uses to the step self binder.
            if trace::enabled() {
                eprintln!("[tarn-lower] `{}` rebinds the machine address", var.name);
            }
            this_vars.insert(0, var.clone());
            return Some(Conversion {
                phase1: body1,
                phase2: body2,
                entry_points,
                state_vars,
                this_vars,
                async_vars,
            });
        }

        if trace::enabled() {
            eprintln!("[tarn-lower] `{}` promoted to machine state", var.name);
        }
        state_vars.insert(0, var.clone());
        let var_id = var.id;
        let rhs2 = rhs.clone();
        let phase1 = Expr::new(
            ExprKind::Seq {
                first: Box::new(build::assign(var_id, rhs)),
                second: Box::new(body1),
            },
            span,
        );
        let phase2: Phase2 = Box::new(move |labels, supply| {
            Expr::new(
                ExprKind::Seq {
                    first: Box::new(build::assign(var_id, rhs2)),
                    second: Box::new(body2(labels, supply)),
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }

    fn convert_while(
        &mut self,
        span: Span,
        guard: &Expr,
        body: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let conv_guard = self.convert(guard, ctx)?;
        let conv_body = self.convert(body, ctx)?;

        let Conversion {
            phase1: guard1,
            phase2: guard2,
            mut entry_points,
            mut state_vars,
            mut this_vars,
            mut async_vars,
        } = conv_guard;
        let Conversion {
            phase1: body1,
            phase2: body2,
            entry_points: body_eps,
            state_vars: body_sv,
            this_vars: body_tv,
            async_vars: body_av,
        } = conv_body;

        entry_points.extend(body_eps);
        state_vars.extend(body_sv);
        this_vars.extend(body_tv);
        if entry_points.is_empty() {
            async_vars.extend(body_av);
        } else {
            // The loop may run the guard and body again after resuming,
            // so everything both touch is live-across.
            async_vars.extend(free_vars(&guard1));
            async_vars.extend(free_vars(&body1));
        }

        let slot = ctx.resume_slot.as_ref().map(|slot| slot.var);
        let phase1 = Expr::new(
            ExprKind::While {
                guard: Box::new(guard1),
                body: Box::new(with_slot_clear(slot, body1)),
            },
            span,
        );
        let phase2: Phase2 = Box::new(move |labels, supply| {
            Expr::new(
                ExprKind::While {
                    guard: Box::new(guard2(labels, supply)),
                    body: Box::new(with_slot_clear(slot, body2(labels, supply))),
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }

    fn convert_for(
        &mut self,
        span: Span,
        var: &Var,
        start: &Expr,
        stop: &Expr,
        body: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let conv_start = self.convert(start, ctx)?;
        let conv_stop = self.convert(stop, ctx)?;
        let conv_body = self.convert(body, ctx)?;
        if !conv_start.entry_points.is_empty()
            || !conv_stop.entry_points.is_empty()
            || !conv_body.entry_points.is_empty()
        {
            self.warn(LowerWarningKind::ForLoopSuspension, span);
            return None;
        }

        let mut async_vars = conv_start.async_vars;
        async_vars.extend(conv_stop.async_vars);
        async_vars.extend(conv_body.async_vars);
        async_vars.remove(&var.id);
        let mut state_vars = conv_start.state_vars;
        state_vars.extend(conv_stop.state_vars);
        state_vars.extend(conv_body.state_vars);
        let mut this_vars = conv_start.this_vars;
        this_vars.extend(conv_stop.this_vars);
        this_vars.extend(conv_body.this_vars);

        let slot = ctx.resume_slot.as_ref().map(|slot| slot.var);
        let var1 = var.clone();
        let var2 = var.clone();
        let phase1 = Expr::new(
            ExprKind::For {
                var: var1,
                start: Box::new(conv_start.phase1),
                stop: Box::new(conv_stop.phase1),
                body: Box::new(with_slot_clear(slot, conv_body.phase1)),
            },
            span,
        );
        let (start2, stop2, body2) = (conv_start.phase2, conv_stop.phase2, conv_body.phase2);
        let phase2: Phase2 = Box::new(move |labels, supply| {
            Expr::new(
                ExprKind::For {
                    var: var2,
                    start: Box::new(start2(labels, supply)),
                    stop: Box::new(stop2(labels, supply)),
                    body: Box::new(with_slot_clear(slot, body2(labels, supply))),
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points: Vec::new(),
            state_vars,
            this_vars,
            async_vars,
        })
    }

    fn convert_try_finally(
        &mut self,
        span: Span,
        body: &Expr,
        compensation: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let conv_body = self.convert(body, ctx)?;
        let conv_comp = self.convert(compensation, ctx)?;
        if !conv_body.entry_points.is_empty() || !conv_comp.entry_points.is_empty() {
            self.warn(LowerWarningKind::TryFinallySuspension, span);
            return None;
        }

        let mut async_vars = conv_body.async_vars;
        async_vars.extend(conv_comp.async_vars);
        let mut state_vars = conv_body.state_vars;
        state_vars.extend(conv_comp.state_vars);
        let mut this_vars = conv_body.this_vars;
        this_vars.extend(conv_comp.this_vars);

        let phase1 = Expr::new(
            ExprKind::TryFinally {
                body: Box::new(conv_body.phase1),
                compensation: Box::new(conv_comp.phase1),
            },
            span,
        );
        let (body2, comp2) = (conv_body.phase2, conv_comp.phase2);
        let phase2: Phase2 = Box::new(move |labels, supply| {
            Expr::new(
                ExprKind::TryFinally {
                    body: Box::new(body2(labels, supply)),
                    compensation: Box::new(comp2(labels, supply)),
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points: Vec::new(),
            state_vars,
            this_vars,
            async_vars,
        })
    }

    /// `try ... with` tolerates suspensions in its body but never in the
    /// filter or handler. A suspending body cannot be jumped into from
    /// outside the protected region, so phase 2 lands the outer labels
    /// just before the region and re-dispatches inside it on the resume
    /// slot, through fresh inner labels.
    fn convert_try_with(
        &mut self,
        span: Span,
        body: &Expr,
        filter: &Handler,
        handler: &Handler,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let conv_body = self.convert(body, ctx)?;
        let conv_filter = self.convert(&filter.body, ctx)?;
        let conv_handler = self.convert(&handler.body, ctx)?;
        if !conv_filter.entry_points.is_empty() || !conv_handler.entry_points.is_empty() {
            self.warn(LowerWarningKind::HandlerSuspension, span);
            return None;
        }

        let Conversion {
            phase1: body1,
            phase2: body2,
            entry_points,
            mut state_vars,
            mut this_vars,
            mut async_vars,
        } = conv_body;
        state_vars.extend(conv_filter.state_vars);
        state_vars.extend(conv_handler.state_vars);
        this_vars.extend(conv_filter.this_vars);
        this_vars.extend(conv_handler.this_vars);
        if entry_points.is_empty() {
            async_vars.extend(conv_filter.async_vars.iter().copied());
            async_vars.extend(conv_handler.async_vars.iter().copied());
        } else {
            // An exception raised after a resumption still reaches the
            // filter and handler, so their free variables are live-across.
            let mut filter_free = free_vars(&conv_filter.phase1);
            filter_free.remove(&filter.var.id);
            let mut handler_free = free_vars(&conv_handler.phase1);
            handler_free.remove(&handler.var.id);
            async_vars.extend(filter_free);
            async_vars.extend(handler_free);
        }

        let phase1 = Expr::new(
            ExprKind::TryWith {
                body: Box::new(body1),
                filter: Handler {
                    var: filter.var.clone(),
                    body: Box::new(conv_filter.phase1),
                },
                handler: Handler {
                    var: handler.var.clone(),
                    body: Box::new(conv_handler.phase1),
                },
            },
            span,
        );

        let filter_var = filter.var.clone();
        let handler_var = handler.var.clone();
        let (filter2, handler2) = (conv_filter.phase2, conv_handler.phase2);

        let phase2: Phase2 = if entry_points.is_empty() {
            Box::new(move |labels, supply| {
                Expr::new(
                    ExprKind::TryWith {
                        body: Box::new(body2(labels, supply)),
                        filter: Handler {
                            var: filter_var,
                            body: Box::new(filter2(labels, supply)),
                        },
                        handler: Handler {
                            var: handler_var,
                            body: Box::new(handler2(labels, supply)),
                        },
                    },
                    span,
                )
            })
        } else {
            let slot_read = match &ctx.resume_slot {
                Some(slot) => slot.read.clone(),
                None => {
                    self.warn(LowerWarningKind::ProtectedRegionWithoutSlot, span);
                    return None;
                }
            };
            let pcs = entry_points.clone();
            Box::new(move |labels, supply| {
                let overrides: Vec<_> = pcs.iter().map(|&pc| (pc, supply.fresh())).collect();
                let inner = labels.with_overrides(&overrides);
                let body = body2(&inner, supply);
                let body = jump_table::build(&pcs, &inner, slot_read, body, supply);
                let protected = Expr::new(
                    ExprKind::TryWith {
                        body: Box::new(body),
                        filter: Handler {
                            var: filter_var,
                            body: Box::new(filter2(labels, supply)),
                        },
                        handler: Handler {
                            var: handler_var,
                            body: Box::new(handler2(labels, supply)),
                        },
                    },
                    span,
                );
                // Outer labels sit just before the region and fall into
                // the inner dispatch.
                pcs.iter().rev().fold(protected, |acc, &pc| {
                    build::seq(build::label_mark(labels.expect_label(pc)), acc)
                })
            })
        };
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }

    fn convert_match(
        &mut self,
        span: Span,
        scrutinee: &Expr,
        arms: &[MatchArm],
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let scrutinee = self.expand(scrutinee, &ctx.macros)?;
        let mut entry_points = Vec::new();
        let mut state_vars = Vec::new();
        let mut this_vars = Vec::new();
        let mut async_vars = HashSet::new();
        let mut phase1_arms = Vec::with_capacity(arms.len());
        let mut phase2_arms = Vec::with_capacity(arms.len());
        // Every arm must convert; there is no partial success.
        for arm in arms {
            let conv = self.convert(&arm.body, ctx)?;
            let Conversion {
                phase1,
                phase2,
                entry_points: arm_eps,
                state_vars: arm_sv,
                this_vars: arm_tv,
                async_vars: mut arm_av,
            } = conv;
            entry_points.extend(arm_eps);
            state_vars.extend(arm_sv);
            this_vars.extend(arm_tv);
            // A binder live across a suspension in its own arm becomes
            // machine state; the decision tree then writes the field.
            for binder in &arm.binders {
                if arm_av.remove(&binder.id) {
                    state_vars.push(binder.clone());
                }
            }
            async_vars.extend(arm_av);
            phase1_arms.push(MatchArm {
                pat: arm.pat.clone(),
                binders: arm.binders.clone(),
                body: phase1,
            });
            phase2_arms.push((arm.pat.clone(), arm.binders.clone(), phase2));
        }

        let phase1 = Expr::new(
            ExprKind::Match {
                scrutinee: Box::new(scrutinee.clone()),
                arms: phase1_arms,
            },
            span,
        );
        let phase2: Phase2 = Box::new(move |labels, supply| {
            let arms: Vec<MatchArm> = phase2_arms
                .into_iter()
                .map(|(pat, binders, p2)| MatchArm {
                    pat,
                    binders,
                    body: p2(labels, supply),
                })
                .collect();
            Expr::new(
                ExprKind::Match {
                    scrutinee: Box::new(scrutinee),
                    arms,
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }

    fn convert_cond(
        &mut self,
        span: Span,
        guard: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
        ctx: &ConvertCtx,
    ) -> Option<Conversion> {
        let guard = self.expand(guard, &ctx.macros)?;
        let conv_then = self.convert(then_branch, ctx)?;
        let conv_else = self.convert(else_branch, ctx)?;

        let Conversion {
            phase1: then1,
            phase2: then2,
            mut entry_points,
            mut state_vars,
            mut this_vars,
            mut async_vars,
        } = conv_then;
        let Conversion {
            phase1: else1,
            phase2: else2,
            entry_points: else_eps,
            state_vars: else_sv,
            this_vars: else_tv,
            async_vars: else_av,
        } = conv_else;
        entry_points.extend(else_eps);
        state_vars.extend(else_sv);
        this_vars.extend(else_tv);
        async_vars.extend(else_av);

        let guard1 = guard.clone();
        let phase1 = Expr::new(
            ExprKind::Cond {
                guard: Box::new(guard1),
                then_branch: Box::new(then1),
                else_branch: Box::new(else1),
            },
            span,
        );
        let phase2: Phase2 = Box::new(move |labels, supply| {
            Expr::new(
                ExprKind::Cond {
                    guard: Box::new(guard),
                    then_branch: Box::new(then2(labels, supply)),
                    else_branch: Box::new(else2(labels, supply)),
                },
                span,
            )
        });
        Some(Conversion {
            phase1,
            phase2,
            entry_points,
            state_vars,
            this_vars,
            async_vars,
        })
    }
}
