// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Display implementations for the expression tree.
//!
//! Compact s-expression rendering, used by the lowering's trace switch and
//! by test failure output. Variable uses print as `%id`, binders as
//! `name%id`, labels as `L<n>`.

use crate::expr::{Const, Expr, ExprKind, Handler, Pat};
use crate::ty::Ty;
use crate::vars::Var;
use std::fmt;

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Unit => write!(f, "unit"),
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
            Ty::Str => write!(f, "str"),
            Ty::Named(name) => write!(f, "{}", name),
            Ty::ByRef(inner) => write!(f, "&{}", inner),
            Ty::Fn { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Ty::Unknown => write!(f, "?"),
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Unit => write!(f, "()"),
            Const::Bool(v) => write!(f, "{}", v),
            Const::Int(v) => write!(f, "{}", v),
            Const::Str(s) => write!(f, "{:?}", s),
            Const::Zero => write!(f, "zero"),
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%{}", self.name, self.id.0)
    }
}

impl fmt::Display for Pat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pat::Wildcard => write!(f, "_"),
            Pat::Int(v) => write!(f, "{}", v),
            Pat::Bool(v) => write!(f, "{}", v),
            Pat::Ctor(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Const(c) => write!(f, "{}", c),
            ExprKind::Var(id) => write!(f, "%{}", id.0),
            ExprKind::AddrOf(id) => write!(f, "(addr %{})", id.0),
            ExprKind::Apply { callee, args } => {
                write!(f, "(apply {}", callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Lambda { params, body } => {
                write!(f, "(fn [")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "] {})", body)
            }
            ExprKind::Let { var, rhs, body } => {
                write!(f, "(let {} {} {})", var, rhs, body)
            }
            ExprKind::LetRec { bindings, body } => {
                write!(f, "(letrec [")?;
                for (i, b) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{} {}", b.var, b.rhs)?;
                }
                write!(f, "] {})", body)
            }
            ExprKind::Seq { first, second } => write!(f, "(seq {} {})", first, second),
            ExprKind::Cond {
                guard,
                then_branch,
                else_branch,
            } => write!(f, "(if {} {} {})", guard, then_branch, else_branch),
            ExprKind::Match { scrutinee, arms } => {
                write!(f, "(match {}", scrutinee)?;
                for arm in arms {
                    write!(f, " [{}", arm.pat)?;
                    for b in &arm.binders {
                        write!(f, " {}", b)?;
                    }
                    write!(f, " => {}]", arm.body)?;
                }
                write!(f, ")")
            }
            ExprKind::While { guard, body } => write!(f, "(while {} {})", guard, body),
            ExprKind::For {
                var,
                start,
                stop,
                body,
            } => write!(f, "(for {} {} {} {})", var, start, stop, body),
            ExprKind::TryFinally { body, compensation } => {
                write!(f, "(try-finally {} {})", body, compensation)
            }
            ExprKind::TryWith {
                body,
                filter,
                handler,
            } => {
                write!(f, "(try-with {}", body)?;
                write_handler(f, "filter", filter)?;
                write_handler(f, "with", handler)?;
                write!(f, ")")
            }
            ExprKind::Assign { var, value } => write!(f, "(set %{} {})", var.0, value),
            ExprKind::ResumeAt { pc } => write!(f, "(resume-at {})", pc),
            ExprKind::Reentry {
                first,
                pc_var,
                resumed,
            } => write!(f, "(reentry {} [{}] {})", first, pc_var, resumed),
            ExprKind::SupportsResume { machine, fallback } => {
                write!(f, "(supports-resume {} {})", machine, fallback)
            }
            ExprKind::Goto(l) => write!(f, "(goto L{})", l.0),
            ExprKind::LabelMark(l) => write!(f, "L{}:", l.0),
            ExprKind::RefMachine(m) => {
                write!(f, "(ref-machine {}", m.machine_ty)?;
                write_state_vars(f, &m.state_vars)?;
                write!(f, " (step {}))", m.step_body)
            }
            ExprKind::StructMachine(m) => {
                write!(f, "(struct-machine {}", m.template_ty)?;
                write_state_vars(f, &m.state_vars)?;
                write!(f, " (step {} {})", m.step.self_var, m.step.body)?;
                write!(
                    f,
                    " (set-state {} {} {})",
                    m.set_state.self_var, m.set_state.state_var, m.set_state.body
                )?;
                write!(f, " (after {} {}))", m.after.self_var, m.after.body)
            }
            ExprKind::Intrinsic { name, args } => {
                write!(f, "({}!", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn write_handler(f: &mut fmt::Formatter<'_>, tag: &str, h: &Handler) -> fmt::Result {
    write!(f, " ({} {} {})", tag, h.var, h.body)
}

fn write_state_vars(f: &mut fmt::Formatter<'_>, state_vars: &[Var]) -> fmt::Result {
    write!(f, " [")?;
    for (i, v) in state_vars.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", v)?;
    }
    write!(f, "]")
}

#[cfg(test)]
mod tests {
    use crate::build;
    use crate::ty::Ty;
    use crate::vars::VarTable;

    #[test]
    fn renders_compact_sexprs() {
        let mut vars = VarTable::new();
        let x = vars.fresh("x", Ty::Int);
        let x_id = x.id;
        let e = build::let_(x, build::int(1), build::var_id(x_id));
        assert_eq!(e.to_string(), "(let x%0 1 %0)");
    }

    #[test]
    fn renders_jump_constructs() {
        use crate::expr::LabelId;
        let e = build::seq(build::label_mark(LabelId(2)), build::goto(LabelId(5)));
        assert_eq!(e.to_string(), "(seq L2: (goto L5))");
    }
}
