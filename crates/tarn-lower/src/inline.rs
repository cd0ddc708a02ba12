// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Expansion inlining and beta-reduction: the leaf rewrite.
//!
//! Expansion bindings are closures standing in for builder method bodies.
//! The rewrite substitutes their definitions at use sites and reduces
//! fully-applied occurrences, pushing pending applications through `let`,
//! sequence, branch, and structured-exception wrappers so a reduction can
//! reach a lambda nested under them. On an expression with no expansion
//! variables and no reducible applications it returns a structurally
//! equal tree.
//!
//! Machine candidates met during the walk are lowered recursively with a
//! fresh PC scope; if the nested lowering declines, the subtree stays
//! unchanged and keeps its own fallback path.

use std::collections::HashMap;

use tarn_tir::{build, subst_vars, Const, Expr, ExprKind, Handler, MatchArm, Span, Var};

use crate::env::MacroEnv;
use crate::warn::LowerWarningKind;
use crate::{shape, Lowering};

/// Outcome of pushing an argument list at a callee.
enum Applied {
    /// A lambda consumed the arguments.
    Reduced(Expr),
    /// No lambda in reach; the application stays as a runtime call.
    Stuck(Expr, Vec<Expr>),
}

impl Lowering<'_> {
    /// Rewrite `expr` with every expansion definition substituted and
    /// every fully-applied lambda reduced. `None` means an arity violation
    /// was found and warned about; the caller abandons the candidate.
    pub(crate) fn expand(&mut self, expr: &Expr, macros: &MacroEnv) -> Option<Expr> {
        if shape::is_candidate(expr) {
            return Some(self.lower_nested(expr));
        }
        let kind = match &expr.kind {
            ExprKind::Var(id) => match macros.lookup(*id) {
                // Definitions enter the environment already expanded.
                Some(def) => return Some(def.def.clone()),
                None => ExprKind::Var(*id),
            },
            ExprKind::Const(c) => ExprKind::Const(c.clone()),
            ExprKind::AddrOf(id) => ExprKind::AddrOf(*id),
            ExprKind::Goto(l) => ExprKind::Goto(*l),
            ExprKind::LabelMark(l) => ExprKind::LabelMark(*l),
            ExprKind::Apply { callee, args } => {
                let origin = match &callee.kind {
                    ExprKind::Var(id) => macros.lookup(*id).map(|def| def.name.clone()),
                    _ => None,
                };
                let callee = self.expand(callee, macros)?;
                let args = self.expand_all(args, macros)?;
                return self.reduce_apply(callee, args, origin.as_deref(), expr.span, macros);
            }
            ExprKind::Lambda { params, body } => ExprKind::Lambda {
                params: params.clone(),
                body: Box::new(self.expand(body, macros)?),
            },
            ExprKind::Let { var, rhs, body } if var.expansion => {
                // Bind the definition and drop the binding: every use site
                // gets the substituted body.
                let def = self.expand(rhs, macros)?;
                let extended = macros.bind(var, def);
                return self.expand(body, &extended);
            }
            ExprKind::Let { var, rhs, body } => ExprKind::Let {
                var: var.clone(),
                rhs: Box::new(self.expand(rhs, macros)?),
                body: Box::new(self.expand(body, macros)?),
            },
            ExprKind::LetRec { bindings, body } => ExprKind::LetRec {
                bindings: bindings
                    .iter()
                    .map(|b| {
                        Some(tarn_tir::Binding {
                            var: b.var.clone(),
                            rhs: self.expand(&b.rhs, macros)?,
                        })
                    })
                    .collect::<Option<Vec<_>>>()?,
                body: Box::new(self.expand(body, macros)?),
            },
            ExprKind::Seq { first, second } => ExprKind::Seq {
                first: Box::new(self.expand(first, macros)?),
                second: Box::new(self.expand(second, macros)?),
            },
            ExprKind::Cond {
                guard,
                then_branch,
                else_branch,
            } => ExprKind::Cond {
                guard: Box::new(self.expand(guard, macros)?),
                then_branch: Box::new(self.expand(then_branch, macros)?),
                else_branch: Box::new(self.expand(else_branch, macros)?),
            },
            ExprKind::Match { scrutinee, arms } => ExprKind::Match {
                scrutinee: Box::new(self.expand(scrutinee, macros)?),
                arms: arms
                    .iter()
                    .map(|arm| {
                        Some(MatchArm {
                            pat: arm.pat.clone(),
                            binders: arm.binders.clone(),
                            body: self.expand(&arm.body, macros)?,
                        })
                    })
                    .collect::<Option<Vec<_>>>()?,
            },
            ExprKind::While { guard, body } => ExprKind::While {
                guard: Box::new(self.expand(guard, macros)?),
                body: Box::new(self.expand(body, macros)?),
            },
            ExprKind::For {
                var,
                start,
                stop,
                body,
            } => ExprKind::For {
                var: var.clone(),
                start: Box::new(self.expand(start, macros)?),
                stop: Box::new(self.expand(stop, macros)?),
                body: Box::new(self.expand(body, macros)?),
            },
            ExprKind::TryFinally { body, compensation } => ExprKind::TryFinally {
                body: Box::new(self.expand(body, macros)?),
                compensation: Box::new(self.expand(compensation, macros)?),
            },
            ExprKind::TryWith {
                body,
                filter,
                handler,
            } => ExprKind::TryWith {
                body: Box::new(self.expand(body, macros)?),
                filter: self.expand_handler(filter, macros)?,
                handler: self.expand_handler(handler, macros)?,
            },
            ExprKind::Assign { var, value } => ExprKind::Assign {
                var: *var,
                value: Box::new(self.expand(value, macros)?),
            },
            ExprKind::ResumeAt { pc } => ExprKind::ResumeAt {
                pc: Box::new(self.expand(pc, macros)?),
            },
            ExprKind::Reentry {
                first,
                pc_var,
                resumed,
            } => ExprKind::Reentry {
                first: Box::new(self.expand(first, macros)?),
                pc_var: pc_var.clone(),
                resumed: Box::new(self.expand(resumed, macros)?),
            },
            ExprKind::SupportsResume { machine, fallback } => ExprKind::SupportsResume {
                machine: Box::new(self.expand(machine, macros)?),
                fallback: Box::new(self.expand(fallback, macros)?),
            },
            // Machine nodes head a candidate spine and were intercepted above.
            ExprKind::RefMachine(_) | ExprKind::StructMachine(_) => {
                unreachable!("machine nodes are recognized before the walk")
            }
            ExprKind::Intrinsic { name, args } => ExprKind::Intrinsic {
                name: name.clone(),
                args: self.expand_all(args, macros)?,
            },
        };
        Some(Expr::new(kind, expr.span))
    }

    fn expand_all(&mut self, exprs: &[Expr], macros: &MacroEnv) -> Option<Vec<Expr>> {
        exprs.iter().map(|e| self.expand(e, macros)).collect()
    }

    fn expand_handler(&mut self, handler: &Handler, macros: &MacroEnv) -> Option<Handler> {
        Some(Handler {
            var: handler.var.clone(),
            body: Box::new(self.expand(&handler.body, macros)?),
        })
    }

    /// Reduce an application whose parts are already expanded. A reduction
    /// may surface new redexes (a substituted lambda applied further down),
    /// so the result is rewritten again.
    fn reduce_apply(
        &mut self,
        callee: Expr,
        args: Vec<Expr>,
        origin: Option<&str>,
        span: Span,
        macros: &MacroEnv,
    ) -> Option<Expr> {
        match self.push_apply(callee, args, origin, span)? {
            Applied::Reduced(expr) => self.expand(&expr, macros),
            Applied::Stuck(callee, args) => Some(Expr::new(
                ExprKind::Apply {
                    callee: Box::new(callee),
                    args,
                },
                span,
            )),
        }
    }

    /// Push an argument list down to the lambda that consumes it,
    /// threading through the wrappers the builder leaves between an
    /// expansion's definition and its parameters.
    fn push_apply(
        &mut self,
        callee: Expr,
        mut args: Vec<Expr>,
        origin: Option<&str>,
        span: Span,
    ) -> Option<Applied> {
        match callee.kind {
            ExprKind::Lambda { params, body } => {
                if args.len() < params.len() {
                    self.warn(
                        LowerWarningKind::ExpansionArity {
                            name: origin.unwrap_or("<fun>").to_string(),
                            expected: params.len(),
                            found: args.len(),
                        },
                        span,
                    );
                    return None;
                }
                let rest = args.split_off(params.len());
                let reduced = beta(params, args, *body);
                if rest.is_empty() {
                    Some(Applied::Reduced(reduced))
                } else {
                    self.push_apply(reduced, rest, origin, span)
                }
            }
            // A synthesized empty-else value absorbs the application.
            ExprKind::Const(Const::Zero) => Some(Applied::Reduced(Expr::new(
                ExprKind::Const(Const::Zero),
                callee.span,
            ))),
            ExprKind::Let { var, rhs, body } => {
                Some(match self.push_apply(*body, args, origin, span)? {
                    Applied::Reduced(body) => Applied::Reduced(build::let_(var, *rhs, body)),
                    Applied::Stuck(body, args) => {
                        Applied::Stuck(build::let_(var, *rhs, body), args)
                    }
                })
            }
            ExprKind::Seq { first, second } => {
                Some(match self.push_apply(*second, args, origin, span)? {
                    Applied::Reduced(second) => Applied::Reduced(build::seq(*first, second)),
                    Applied::Stuck(second, args) => {
                        Applied::Stuck(build::seq(*first, second), args)
                    }
                })
            }
            ExprKind::Cond {
                guard,
                then_branch,
                else_branch,
            } => {
                let then_branch = self.push_branch(*then_branch, &args, origin, span)?;
                let else_branch = self.push_branch(*else_branch, &args, origin, span)?;
                Some(Applied::Reduced(build::cond(
                    *guard,
                    then_branch,
                    else_branch,
                )))
            }
            ExprKind::Match { scrutinee, arms } => {
                let arms = arms
                    .into_iter()
                    .map(|arm| {
                        let MatchArm { pat, binders, body } = arm;
                        Some(MatchArm {
                            pat,
                            binders,
                            body: self.push_branch(body, &args, origin, span)?,
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(Applied::Reduced(Expr::new(
                    ExprKind::Match { scrutinee, arms },
                    span,
                )))
            }
            ExprKind::TryFinally { body, compensation } => {
                let body = self.push_branch(*body, &args, origin, span)?;
                Some(Applied::Reduced(Expr::new(
                    ExprKind::TryFinally {
                        body: Box::new(body),
                        compensation,
                    },
                    span,
                )))
            }
            ExprKind::TryWith {
                body,
                filter,
                handler,
            } => {
                let body = self.push_branch(*body, &args, origin, span)?;
                let handler = Handler {
                    var: handler.var,
                    body: Box::new(self.push_branch(*handler.body, &args, origin, span)?),
                };
                Some(Applied::Reduced(Expr::new(
                    ExprKind::TryWith {
                        body: Box::new(body),
                        filter,
                        handler,
                    },
                    span,
                )))
            }
            kind => Some(Applied::Stuck(Expr::new(kind, callee.span), args)),
        }
    }

    /// Push a copy of the argument list into one branch of a multi-way
    /// callee. Exactly one branch runs, so each still evaluates the
    /// arguments once.
    fn push_branch(
        &mut self,
        branch: Expr,
        args: &[Expr],
        origin: Option<&str>,
        span: Span,
    ) -> Option<Expr> {
        match self.push_apply(branch, args.to_vec(), origin, span)? {
            Applied::Reduced(expr) => Some(expr),
            Applied::Stuck(callee, args) => Some(Expr::new(
                ExprKind::Apply {
                    callee: Box::new(callee),
                    args,
                },
                span,
            )),
        }
    }
}

/// Substitute arguments for parameters. Constants, variable reads, and
/// lambdas substitute directly; anything that may have effects is
/// let-bound in parameter order in front of the body so it still runs
/// exactly once, in order.
fn beta(params: Vec<Var>, args: Vec<Expr>, body: Expr) -> Expr {
    debug_assert_eq!(params.len(), args.len());
    let mut direct = HashMap::new();
    let mut bound = Vec::new();
    for (param, arg) in params.into_iter().zip(args) {
        match &arg.kind {
            ExprKind::Const(_) | ExprKind::Var(_) | ExprKind::Lambda { .. } => {
                direct.insert(param.id, arg);
            }
            _ => bound.push((param, arg)),
        }
    }
    let body = subst_vars(&body, &direct);
    bound
        .into_iter()
        .rev()
        .fold(body, |acc, (param, arg)| build::let_(param, arg, acc))
}
