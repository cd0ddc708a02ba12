// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Whole-pipeline lowering scenarios: machines built the way the builder
//! protocol emits them, checked against the rewritten machine that comes
//! out. Structural assertions only; rendering order of labels inside one
//! machine is pinned by the PC discovery order.

use std::collections::HashSet;

use tarn_lower::{is_candidate, lower, LowerWarningKind, Pc};
use tarn_tir::{
    build, Expr, ExprKind, Handler, LabelId, MachineMethod, Pat, RefMachine, SetStateMethod,
    StructMachine, Ty, Var, VarId, VarTable,
};

/// Heap machine whose step body leads with the protocol resume head.
fn slot_machine(slot: &Var, body: Expr) -> Expr {
    Expr::synth(ExprKind::RefMachine(Box::new(RefMachine {
        machine_ty: Ty::named("Resumable"),
        state_vars: vec![],
        step_body: build::seq(build::resume_at(build::var(slot)), body),
    })))
}

/// Heap machine with no resume head.
fn bare_machine(body: Expr) -> Expr {
    Expr::synth(ExprKind::RefMachine(Box::new(RefMachine {
        machine_ty: Ty::named("Resumable"),
        state_vars: vec![],
        step_body: body,
    })))
}

/// Reentry test: the first branch parks the machine; the resumed branch
/// is entered only through dispatch.
fn suspend_then(vars: &mut VarTable, resumed: Expr) -> Expr {
    let pc_var = vars.fresh("cont", Ty::Int);
    Expr::synth(ExprKind::Reentry {
        first: Box::new(build::intrinsic("park", vec![])),
        pc_var,
        resumed: Box::new(resumed),
    })
}

fn as_seq(expr: &Expr) -> (&Expr, &Expr) {
    match &expr.kind {
        ExprKind::Seq { first, second } => (first.as_ref(), second.as_ref()),
        other => panic!("expected sequence, got {:?}", other),
    }
}

fn as_mark(expr: &Expr) -> LabelId {
    match expr.kind {
        ExprKind::LabelMark(label) => label,
        ref other => panic!("expected label mark, got {:?}", other),
    }
}

fn as_goto(expr: &Expr) -> LabelId {
    match expr.kind {
        ExprKind::Goto(label) => label,
        ref other => panic!("expected goto, got {:?}", other),
    }
}

/// Visit every node of the rewritten tree, including method bodies of
/// rebuilt machines.
fn walk<'e>(expr: &'e Expr, f: &mut impl FnMut(&'e Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Const(_)
        | ExprKind::Var(_)
        | ExprKind::AddrOf(_)
        | ExprKind::Goto(_)
        | ExprKind::LabelMark(_) => {}
        ExprKind::Apply { callee, args } => {
            walk(callee, f);
            for arg in args {
                walk(arg, f);
            }
        }
        ExprKind::Lambda { body, .. } => walk(body, f),
        ExprKind::Let { rhs, body, .. } => {
            walk(rhs, f);
            walk(body, f);
        }
        ExprKind::LetRec { bindings, body } => {
            for binding in bindings {
                walk(&binding.rhs, f);
            }
            walk(body, f);
        }
        ExprKind::Seq { first, second } => {
            walk(first, f);
            walk(second, f);
        }
        ExprKind::Cond {
            guard,
            then_branch,
            else_branch,
        } => {
            walk(guard, f);
            walk(then_branch, f);
            walk(else_branch, f);
        }
        ExprKind::Match { scrutinee, arms } => {
            walk(scrutinee, f);
            for arm in arms {
                walk(&arm.body, f);
            }
        }
        ExprKind::While { guard, body } => {
            walk(guard, f);
            walk(body, f);
        }
        ExprKind::For {
            start, stop, body, ..
        } => {
            walk(start, f);
            walk(stop, f);
            walk(body, f);
        }
        ExprKind::TryFinally { body, compensation } => {
            walk(body, f);
            walk(compensation, f);
        }
        ExprKind::TryWith {
            body,
            filter,
            handler,
        } => {
            walk(body, f);
            walk(&filter.body, f);
            walk(&handler.body, f);
        }
        ExprKind::Assign { value, .. } => walk(value, f),
        ExprKind::ResumeAt { pc } => walk(pc, f),
        ExprKind::Reentry { first, resumed, .. } => {
            walk(first, f);
            walk(resumed, f);
        }
        ExprKind::SupportsResume { machine, fallback } => {
            walk(machine, f);
            walk(fallback, f);
        }
        ExprKind::RefMachine(machine) => walk(&machine.step_body, f),
        ExprKind::StructMachine(machine) => {
            walk(&machine.step.body, f);
            walk(&machine.set_state.body, f);
            walk(&machine.after.body, f);
        }
        ExprKind::Intrinsic { args, .. } => {
            for arg in args {
                walk(arg, f);
            }
        }
    }
}

fn marked_labels(expr: &Expr) -> Vec<LabelId> {
    let mut marks = Vec::new();
    walk(expr, &mut |e| {
        if let ExprKind::LabelMark(label) = e.kind {
            marks.push(label);
        }
    });
    marks
}

fn goto_targets(expr: &Expr) -> HashSet<LabelId> {
    let mut targets = HashSet::new();
    walk(expr, &mut |e| {
        if let ExprKind::Goto(label) = e.kind {
            targets.insert(label);
        }
    });
    targets
}

fn used_vars(expr: &Expr) -> HashSet<VarId> {
    let mut ids = HashSet::new();
    walk(expr, &mut |e| {
        if let ExprKind::Var(id) = e.kind {
            ids.insert(id);
        }
    });
    ids
}

fn let_binders(expr: &Expr) -> HashSet<VarId> {
    let mut ids = HashSet::new();
    walk(expr, &mut |e| {
        if let ExprKind::Let { var, .. } = &e.kind {
            ids.insert(var.id);
        }
    });
    ids
}

#[test]
fn non_candidates_are_skipped_without_warnings() {
    let mut vars = VarTable::new();
    let x = vars.fresh("x", Ty::Int);
    let x_id = x.id;
    let plain = build::let_(x, build::int(1), build::var_id(x_id));
    assert!(!is_candidate(&plain));
    let result = lower(&plain, &mut vars);
    assert!(result.lowered.is_none());
    assert!(result.warnings.is_empty());
}

#[test]
fn linear_suspension_yields_one_field_one_pc_and_a_two_arm_table() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let a = vars.fresh("a", Ty::Int);
    let a_id = a.id;
    let after = build::seq(
        suspend_then(&mut vars, build::unit()),
        build::intrinsic("use", vec![build::var_id(a_id)]),
    );
    let body = build::let_(a, build::intrinsic("synchronous_value", vec![]), after);
    let machine = slot_machine(&slot, body);

    let result = lower(&machine, &mut vars);
    assert!(result.warnings.is_empty());
    let lowered = result.lowered.expect("machine lowers");
    assert_eq!(lowered.resume_points, vec![Pc(1)]);
    assert_eq!(lowered.state_fields.len(), 1);
    assert_eq!(lowered.state_fields[0].name, "a");

    let step = match &lowered.expr.kind {
        ExprKind::RefMachine(machine) => {
            assert_eq!(machine.state_vars, lowered.state_fields);
            &machine.step_body
        }
        other => panic!("expected heap machine, got {:?}", other),
    };

    // Dispatch first: the PC arm and the unset-sentinel default.
    let (switch, rest) = as_seq(step);
    let (resume_label, initial_label) = match &switch.kind {
        ExprKind::Match { scrutinee, arms } => {
            assert_eq!(scrutinee.kind, ExprKind::Var(slot.id));
            assert_eq!(arms.len(), 2);
            assert_eq!(arms[0].pat, Pat::Int(1));
            assert_eq!(arms[1].pat, Pat::Wildcard);
            (as_goto(&arms[0].body), as_goto(&arms[1].body))
        }
        other => panic!("expected dispatch, got {:?}", other),
    };

    // Then the initial label, then the first-run body opening with the
    // field store.
    let (initial_mark, first_run) = as_seq(rest);
    assert_eq!(as_mark(initial_mark), initial_label);
    let (store, tail) = as_seq(first_run);
    match &store.kind {
        ExprKind::Assign { var, .. } => assert_eq!(*var, a_id),
        other => panic!("expected field store, got {:?}", other),
    }
    // The resume arm jumps exactly onto the resumed branch's label.
    let (branch, _) = as_seq(tail);
    match &branch.kind {
        ExprKind::Cond { then_branch, .. } => {
            let (mark, _) = as_seq(then_branch);
            assert_eq!(as_mark(mark), resume_label);
        }
        other => panic!("expected transparent branch, got {:?}", other),
    }
}

#[test]
fn loop_without_suspension_in_a_bare_machine_is_untouched() {
    let mut vars = VarTable::new();
    let body = Expr::synth(ExprKind::While {
        guard: Box::new(build::intrinsic("more", vec![])),
        body: Box::new(build::intrinsic("work", vec![])),
    });
    let machine = bare_machine(body.clone());
    let result = lower(&machine, &mut vars);
    let lowered = result.lowered.expect("machine lowers");
    assert!(lowered.resume_points.is_empty());
    assert!(lowered.state_fields.is_empty());
    match &lowered.expr.kind {
        ExprKind::RefMachine(machine) => assert_eq!(machine.step_body, body),
        other => panic!("expected heap machine, got {:?}", other),
    }
}

#[test]
fn loop_in_a_slot_machine_clears_the_slot_on_every_iteration() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let body = Expr::synth(ExprKind::While {
        guard: Box::new(build::intrinsic("more", vec![])),
        body: Box::new(build::intrinsic("work", vec![])),
    });
    let machine = slot_machine(&slot, body);
    let result = lower(&machine, &mut vars);
    let lowered = result.lowered.expect("machine lowers");
    assert!(lowered.resume_points.is_empty());

    // No suspension means no dispatch table, but the back edge still
    // resets the slot so downstream regions never see a stale value.
    let step = match &lowered.expr.kind {
        ExprKind::RefMachine(machine) => &machine.step_body,
        other => panic!("expected heap machine, got {:?}", other),
    };
    match &step.kind {
        ExprKind::While { body, .. } => {
            let (reset, _) = as_seq(body);
            match &reset.kind {
                ExprKind::Assign { var, value } => {
                    assert_eq!(*var, slot.id);
                    assert_eq!(*value.as_ref(), build::int(0));
                }
                other => panic!("expected slot reset, got {:?}", other),
            }
        }
        other => panic!("expected ordinary loop, got {:?}", other),
    }
}

#[test]
fn try_with_wrapping_a_suspension_gets_two_level_labels() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let reentry = suspend_then(&mut vars, build::unit());
    let exn = vars.fresh("exn", Ty::named("Error"));
    let exn2 = vars.fresh("exn", Ty::named("Error"));
    let handler_body = build::intrinsic("recover", vec![]);
    let protected = Expr::synth(ExprKind::TryWith {
        body: Box::new(reentry),
        filter: Handler {
            var: exn,
            body: Box::new(build::boolean(true)),
        },
        handler: Handler {
            var: exn2,
            body: Box::new(handler_body.clone()),
        },
    });
    let machine = slot_machine(&slot, protected);

    let result = lower(&machine, &mut vars);
    assert!(result.warnings.is_empty());
    let lowered = result.lowered.expect("machine lowers");
    assert_eq!(lowered.resume_points, vec![Pc(1)]);

    let step = match &lowered.expr.kind {
        ExprKind::RefMachine(machine) => &machine.step_body,
        other => panic!("expected heap machine, got {:?}", other),
    };

    // Top table: the PC's outer label, then the default.
    let (top_switch, rest) = as_seq(step);
    let (outer_label, top_initial) = match &top_switch.kind {
        ExprKind::Match { arms, .. } => {
            assert_eq!(arms.len(), 2);
            (as_goto(&arms[0].body), as_goto(&arms[1].body))
        }
        other => panic!("expected top dispatch, got {:?}", other),
    };
    let (top_mark, rest) = as_seq(rest);
    assert_eq!(as_mark(top_mark), top_initial);

    // The outer label lands just before the protected region.
    let (outer_mark, region) = as_seq(rest);
    assert_eq!(as_mark(outer_mark), outer_label);
    let (region_body, filter, handler) = match &region.kind {
        ExprKind::TryWith {
            body,
            filter,
            handler,
        } => (body.as_ref(), filter, handler),
        other => panic!("expected protected region, got {:?}", other),
    };
    // Handler and filter come through verbatim.
    assert_eq!(*filter.body, build::boolean(true));
    assert_eq!(*handler.body, handler_body);

    // Inside the region: re-dispatch on the slot through an inner label.
    let (inner_switch, inner_rest) = as_seq(region_body);
    let inner_label = match &inner_switch.kind {
        ExprKind::Match { scrutinee, arms } => {
            assert_eq!(scrutinee.kind, ExprKind::Var(slot.id));
            assert_eq!(arms[0].pat, Pat::Int(1));
            as_goto(&arms[0].body)
        }
        other => panic!("expected inner dispatch, got {:?}", other),
    };
    assert_ne!(inner_label, outer_label);
    let (_, branch) = as_seq(inner_rest);
    match &branch.kind {
        ExprKind::Cond { then_branch, .. } => {
            let (mark, _) = as_seq(then_branch);
            assert_eq!(as_mark(mark), inner_label);
        }
        other => panic!("expected transparent branch, got {:?}", other),
    }
}

#[test]
fn reentry_keeps_the_first_branch_unlabeled() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let reentry = suspend_then(&mut vars, build::intrinsic("resume_work", vec![]));
    let machine = slot_machine(&slot, reentry);
    let result = lower(&machine, &mut vars);
    let lowered = result.lowered.expect("machine lowers");
    assert_eq!(lowered.resume_points, vec![Pc(1)]);

    let step = match &lowered.expr.kind {
        ExprKind::RefMachine(machine) => &machine.step_body,
        other => panic!("expected heap machine, got {:?}", other),
    };
    let (_, rest) = as_seq(step);
    let (_, branch) = as_seq(rest);
    match &branch.kind {
        ExprKind::Cond {
            then_branch,
            else_branch,
            ..
        } => {
            // Resumed branch is marked; the first-run branch is not.
            let (mark, resumed) = as_seq(then_branch);
            assert!(matches!(mark.kind, ExprKind::LabelMark(_)));
            assert_eq!(*resumed, build::intrinsic("resume_work", vec![]));
            assert_eq!(*else_branch.as_ref(), build::intrinsic("park", vec![]));
        }
        other => panic!("expected transparent branch, got {:?}", other),
    }
}

#[test]
fn every_goto_in_the_output_lands_on_a_unique_mark() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let first = suspend_then(&mut vars, build::unit());
    let second = suspend_then(&mut vars, build::unit());
    let body = build::cond(build::intrinsic("flip", vec![]), first, second);
    let machine = slot_machine(&slot, body);

    let result = lower(&machine, &mut vars);
    let lowered = result.lowered.expect("machine lowers");
    assert_eq!(lowered.resume_points, vec![Pc(1), Pc(2)]);

    let marks = marked_labels(&lowered.expr);
    let unique: HashSet<LabelId> = marks.iter().copied().collect();
    assert_eq!(marks.len(), unique.len(), "a label was marked twice");
    assert_eq!(goto_targets(&lowered.expr), unique);
}

#[test]
fn bindings_classify_into_local_state_and_self_reference() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let step_self = vars.fresh("sm", Ty::by_ref(Ty::named("Gen")));
    let local = vars.fresh("local", Ty::Int);
    let this = vars.fresh("this", Ty::by_ref(Ty::named("Gen")));
    let saved = vars.fresh_mut("saved", Ty::Int);
    let (local_id, this_id, saved_id) = (local.id, this.id, saved.id);

    let resumed = build::intrinsic("emit", vec![build::var_id(saved_id), build::var_id(this_id)]);
    let tail = build::seq(
        build::intrinsic("use", vec![build::var_id(local_id)]),
        suspend_then(&mut vars, resumed),
    );
    let body = build::let_(
        local,
        build::intrinsic("calc", vec![]),
        build::let_(
            this,
            build::addr_of(step_self.id),
            build::let_(saved.clone(), build::intrinsic("read", vec![]), tail),
        ),
    );
    let set_self = vars.fresh("sm", Ty::by_ref(Ty::named("Gen")));
    let set_arg = vars.fresh("state", Ty::Int);
    let after_self = vars.fresh("sm", Ty::by_ref(Ty::named("Gen")));
    let machine = Expr::synth(ExprKind::StructMachine(Box::new(StructMachine {
        template_ty: Ty::named("Gen"),
        state_vars: vec![],
        step: MachineMethod {
            self_var: step_self.clone(),
            body: build::seq(build::resume_at(build::var(&slot)), body),
        },
        set_state: SetStateMethod {
            self_var: set_self,
            state_var: set_arg.clone(),
            body: build::assign(slot.id, build::var_id(set_arg.id)),
        },
        after: MachineMethod {
            self_var: after_self,
            body: build::intrinsic("start", vec![]),
        },
    })));

    let result = lower(&machine, &mut vars);
    assert!(result.warnings.is_empty());
    let lowered = result.lowered.expect("machine lowers");
    assert_eq!(lowered.state_fields, vec![saved]);

    let machine = match &lowered.expr.kind {
        ExprKind::StructMachine(machine) => machine,
        other => panic!("expected template machine, got {:?}", other),
    };
    assert_eq!(machine.state_vars, lowered.state_fields);
    // set_state and after bodies come through the leaf rewrite unchanged.
    assert_eq!(
        machine.set_state.body,
        build::assign(slot.id, build::var_id(set_arg.id))
    );
    assert_eq!(machine.after.body, build::intrinsic("start", vec![]));

    let step = &machine.step.body;
    let binders = let_binders(step);
    assert!(binders.contains(&local_id), "local binding survives");
    assert!(!binders.contains(&saved_id), "state binding becomes a store");
    assert!(!binders.contains(&this_id), "self rebinding is dropped");
    let uses = used_vars(step);
    assert!(!uses.contains(&this_id), "alias uses collapse onto self");
    assert!(uses.contains(&step_self.id));
}

#[test]
fn expansion_prefix_is_inlined_into_the_step_body() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let emit = vars.fresh_expansion("emit", Ty::Unknown);
    let param = vars.fresh("v", Ty::Int);
    let param_id = param.id;
    let def = build::lambda(
        vec![param],
        build::intrinsic("deliver", vec![build::var_id(param_id)]),
    );
    let body = build::apply(build::var(&emit), vec![build::int(7)]);
    let machine = build::let_(emit.clone(), def, slot_machine(&slot, body));

    let result = lower(&machine, &mut vars);
    assert!(result.warnings.is_empty());
    let lowered = result.lowered.expect("machine lowers");
    // No expansion variable survives in the output.
    let emit_id = emit.id;
    assert!(!used_vars(&lowered.expr).contains(&emit_id));
    match &lowered.expr.kind {
        ExprKind::RefMachine(machine) => {
            assert_eq!(
                machine.step_body,
                build::intrinsic("deliver", vec![build::int(7)])
            );
        }
        other => panic!("expected heap machine, got {:?}", other),
    }
}

#[test]
fn under_applied_expansion_aborts_with_the_arity_warning() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let pair = vars.fresh_expansion("pair", Ty::Unknown);
    let a = vars.fresh("a", Ty::Int);
    let b = vars.fresh("b", Ty::Int);
    let a_id = a.id;
    let def = build::lambda(vec![a, b], build::var_id(a_id));
    let body = build::apply(build::var(&pair), vec![build::int(1)]);
    let machine = build::let_(pair, def, slot_machine(&slot, body));

    let result = lower(&machine, &mut vars);
    assert!(result.lowered.is_none());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(
        result.warnings[0].kind,
        LowerWarningKind::ExpansionArity {
            name: "__expand_pair".to_string(),
            expected: 2,
            found: 1,
        }
    );
}

#[test]
fn suspension_in_try_finally_aborts_the_whole_machine() {
    let mut vars = VarTable::new();
    let slot = vars.fresh_mut("resume_pc", Ty::Int);
    let reentry = suspend_then(&mut vars, build::unit());
    let body = Expr::synth(ExprKind::TryFinally {
        body: Box::new(reentry),
        compensation: Box::new(build::intrinsic("release", vec![])),
    });
    let machine = slot_machine(&slot, body);
    let result = lower(&machine, &mut vars);
    assert!(result.lowered.is_none());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(
        result.warnings[0].kind,
        LowerWarningKind::TryFinallySuspension
    );
}

#[test]
fn suspending_protected_region_needs_the_resume_slot() {
    let mut vars = VarTable::new();
    let reentry = suspend_then(&mut vars, build::unit());
    let exn = vars.fresh("exn", Ty::named("Error"));
    let exn2 = vars.fresh("exn", Ty::named("Error"));
    let body = Expr::synth(ExprKind::TryWith {
        body: Box::new(reentry),
        filter: Handler {
            var: exn,
            body: Box::new(build::boolean(true)),
        },
        handler: Handler {
            var: exn2,
            body: Box::new(build::unit()),
        },
    });
    let machine = bare_machine(body);
    let result = lower(&machine, &mut vars);
    assert!(result.lowered.is_none());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(
        result.warnings[0].kind,
        LowerWarningKind::ProtectedRegionWithoutSlot
    );
}

#[test]
fn nested_machine_is_lowered_inside_the_outer_leaf() {
    let mut vars = VarTable::new();
    let inner_slot = vars.fresh_mut("resume_pc", Ty::Int);
    let inner = slot_machine(&inner_slot, suspend_then(&mut vars, build::unit()));
    let outer_body = build::intrinsic("spawn", vec![inner]);
    let outer = bare_machine(outer_body);

    let result = lower(&outer, &mut vars);
    assert!(result.warnings.is_empty());
    let lowered = result.lowered.expect("outer machine lowers");

    // The inner machine inside the intrinsic argument now carries its own
    // dispatch table.
    let mut inner_steps = Vec::new();
    walk(&lowered.expr, &mut |e| {
        if let ExprKind::RefMachine(machine) = &e.kind {
            inner_steps.push(&machine.step_body);
        }
    });
    // Outer machine plus the rewritten inner one.
    assert_eq!(inner_steps.len(), 2);
    let rewritten_inner = inner_steps[1];
    let (switch, _) = as_seq(rewritten_inner);
    assert!(matches!(switch.kind, ExprKind::Match { .. }));
}

#[test]
fn failed_nested_machine_keeps_the_subtree_and_surfaces_its_warning() {
    let mut vars = VarTable::new();
    let inner_slot = vars.fresh_mut("resume_pc", Ty::Int);
    let i = vars.fresh("i", Ty::Int);
    let bad_loop = Expr::synth(ExprKind::For {
        var: i,
        start: Box::new(build::int(0)),
        stop: Box::new(build::int(3)),
        body: Box::new(suspend_then(&mut vars, build::unit())),
    });
    let inner = slot_machine(&inner_slot, bad_loop);
    let outer = bare_machine(build::intrinsic("spawn", vec![inner.clone()]));

    let result = lower(&outer, &mut vars);
    // The inner rejection surfaces but the outer machine still lowers.
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, LowerWarningKind::ForLoopSuspension);
    let lowered = result.lowered.expect("outer machine lowers");
    match &lowered.expr.kind {
        ExprKind::RefMachine(machine) => {
            assert_eq!(
                machine.step_body,
                build::intrinsic("spawn", vec![inner])
            );
        }
        other => panic!("expected heap machine, got {:?}", other),
    }
}
