// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Node constructors.
//!
//! Composite constructors derive their span from the children, so rewrites
//! that rebuild around original subtrees keep usable source locations.
//! Leaves synthesized from nothing get [`Span::DUMMY`].

use crate::expr::{Const, Expr, ExprKind, LabelId, MatchArm, Pat};
use crate::span::Span;
use crate::vars::{Var, VarId};

pub fn unit() -> Expr {
    Expr::synth(ExprKind::Const(Const::Unit))
}

pub fn int(value: i64) -> Expr {
    Expr::synth(ExprKind::Const(Const::Int(value)))
}

pub fn boolean(value: bool) -> Expr {
    Expr::synth(ExprKind::Const(Const::Bool(value)))
}

/// Zero value of the context's type (incomplete-match fallthrough).
pub fn zero() -> Expr {
    Expr::synth(ExprKind::Const(Const::Zero))
}

pub fn var(v: &Var) -> Expr {
    Expr::synth(ExprKind::Var(v.id))
}

pub fn var_id(id: VarId) -> Expr {
    Expr::synth(ExprKind::Var(id))
}

pub fn addr_of(id: VarId) -> Expr {
    Expr::synth(ExprKind::AddrOf(id))
}

pub fn seq(first: Expr, second: Expr) -> Expr {
    let span = first.span.to(second.span);
    Expr::new(
        ExprKind::Seq {
            first: Box::new(first),
            second: Box::new(second),
        },
        span,
    )
}

/// Right-fold a statement list in front of `last`.
pub fn seqs(stmts: Vec<Expr>, last: Expr) -> Expr {
    stmts.into_iter().rev().fold(last, |acc, stmt| seq(stmt, acc))
}

pub fn let_(var: Var, rhs: Expr, body: Expr) -> Expr {
    let span = rhs.span.to(body.span);
    Expr::new(
        ExprKind::Let {
            var,
            rhs: Box::new(rhs),
            body: Box::new(body),
        },
        span,
    )
}

pub fn lambda(params: Vec<Var>, body: Expr) -> Expr {
    let span = body.span;
    Expr::new(
        ExprKind::Lambda {
            params,
            body: Box::new(body),
        },
        span,
    )
}

pub fn apply(callee: Expr, args: Vec<Expr>) -> Expr {
    let span = args
        .iter()
        .fold(callee.span, |acc, arg| acc.to(arg.span));
    Expr::new(
        ExprKind::Apply {
            callee: Box::new(callee),
            args,
        },
        span,
    )
}

pub fn cond(guard: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    let span = guard.span.to(then_branch.span).to(else_branch.span);
    Expr::new(
        ExprKind::Cond {
            guard: Box::new(guard),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        },
        span,
    )
}

pub fn assign(var: VarId, value: Expr) -> Expr {
    let span = value.span;
    Expr::new(
        ExprKind::Assign {
            var,
            value: Box::new(value),
        },
        span,
    )
}

pub fn goto(label: LabelId) -> Expr {
    Expr::synth(ExprKind::Goto(label))
}

pub fn label_mark(label: LabelId) -> Expr {
    Expr::synth(ExprKind::LabelMark(label))
}

pub fn resume_at(pc: Expr) -> Expr {
    let span = pc.span;
    Expr::new(ExprKind::ResumeAt { pc: Box::new(pc) }, span)
}

pub fn intrinsic(name: &str, args: Vec<Expr>) -> Expr {
    let span = args
        .iter()
        .fold(Span::DUMMY, |acc, arg| acc.to(arg.span));
    Expr::new(
        ExprKind::Intrinsic {
            name: name.to_string(),
            args,
        },
        span,
    )
}

/// Integer switch as a compiled decision tree: one arm per key plus a
/// wildcard default. This is the dispatch primitive jump tables use.
pub fn int_switch(scrutinee: Expr, arms: Vec<(i64, Expr)>, default: Expr) -> Expr {
    let span = scrutinee.span;
    let mut all_arms: Vec<MatchArm> = arms
        .into_iter()
        .map(|(key, body)| MatchArm {
            pat: Pat::Int(key),
            binders: Vec::new(),
            body,
        })
        .collect();
    all_arms.push(MatchArm {
        pat: Pat::Wildcard,
        binders: Vec::new(),
        body: default,
    });
    Expr::new(
        ExprKind::Match {
            scrutinee: Box::new(scrutinee),
            arms: all_arms,
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Ty;
    use crate::vars::VarTable;

    #[test]
    fn seq_folding_keeps_order() {
        let e = seqs(vec![int(1), int(2)], int(3));
        match e.kind {
            ExprKind::Seq { first, second } => {
                assert_eq!(first.kind, ExprKind::Const(Const::Int(1)));
                match second.kind {
                    ExprKind::Seq { first, second } => {
                        assert_eq!(first.kind, ExprKind::Const(Const::Int(2)));
                        assert_eq!(second.kind, ExprKind::Const(Const::Int(3)));
                    }
                    other => panic!("expected nested seq, got {:?}", other),
                }
            }
            other => panic!("expected seq, got {:?}", other),
        }
    }

    #[test]
    fn spans_come_from_children() {
        let mut vars = VarTable::new();
        let x = vars.fresh("x", Ty::Int);
        let rhs = Expr::new(ExprKind::Const(Const::Int(1)), Span::new(10, 11));
        let body = Expr::new(ExprKind::Var(x.id), Span::new(20, 21));
        let e = let_(x, rhs, body);
        assert_eq!(e.span, Span::new(10, 21));
    }

    #[test]
    fn int_switch_has_trailing_wildcard() {
        let sw = int_switch(int(0), vec![(1, int(10)), (2, int(20))], int(99));
        match sw.kind {
            ExprKind::Match { arms, .. } => {
                assert_eq!(arms.len(), 3);
                assert_eq!(arms[0].pat, Pat::Int(1));
                assert_eq!(arms[1].pat, Pat::Int(2));
                assert_eq!(arms[2].pat, Pat::Wildcard);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }
}
