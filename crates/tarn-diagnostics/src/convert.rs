// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Conversions from compiler warning types to `Diagnostic`.
//!
//! The terminal formatter and the JSON reporter both start from these.
//! `ToDiagnostic` is implemented for every phase warning type.

use crate::{Diagnostic, ToDiagnostic};

// ============================================================================
// Lowering Warnings
// ============================================================================

impl ToDiagnostic for tarn_lower::LowerWarning {
    fn to_diagnostic(&self) -> Diagnostic {
        use tarn_lower::LowerWarningKind::*;

        match &self.kind {
            TryFinallySuspension => {
                Diagnostic::warning("cannot suspend inside `try ... finally`")
                    .with_code("W0801")
                    .with_primary(self.span, "suspension point in the protected body")
                    .with_help("run the suspending call before or after the `try` block")
            }

            ForLoopSuspension => Diagnostic::warning("cannot suspend inside a `for` loop")
                .with_code("W0802")
                .with_primary(self.span, "suspension point in the loop")
                .with_help("rewrite the loop as `while` to allow suspension"),

            HandlerSuspension => {
                Diagnostic::warning("cannot suspend inside an exception filter or handler")
                    .with_code("W0803")
                    .with_primary(self.span, "suspension point in the handler")
            }

            RecursiveBinding => {
                Diagnostic::warning("recursive bindings are not supported in resumable code")
                    .with_code("W0804")
                    .with_primary(self.span, "recursive binding here")
                    .with_help("define the recursive function outside the resumable block")
            }

            ExpansionArity {
                name,
                expected,
                found,
            } => Diagnostic::warning(format!(
                "`{}` expects {} argument{}, found {}",
                name,
                expected,
                if *expected == 1 { "" } else { "s" },
                found
            ))
            .with_code("W0805")
            .with_primary(
                self.span,
                format!(
                    "takes {} argument{}",
                    expected,
                    if *expected == 1 { "" } else { "s" }
                ),
            ),

            NonConstantResumeTarget => {
                Diagnostic::warning("resume target does not reduce to a constant program counter")
                    .with_code("W0806")
                    .with_primary(self.span, "not a literal after expansion")
                    .with_note(
                        "dispatch is compiled to a jump table, so every resume target \
                         must be a compile-time constant",
                    )
            }

            UnexpandedExpansion { name } => Diagnostic::warning(format!(
                "expansion `{}` has no definition in this candidate",
                name
            ))
            .with_code("W0807")
            .with_primary(self.span, "in this machine candidate")
            .with_note("expansion bindings are only meaningful while their definition is in scope"),

            ProtectedRegionWithoutSlot => Diagnostic::warning(
                "cannot resume inside a protected region: the machine has no resume slot",
            )
            .with_code("W0808")
            .with_primary(self.span, "`try ... with` body suspends here")
            .with_help("give the step body a leading `resume_at` over the machine's slot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::ErrorCodeRegistry;
    use crate::Severity;
    use tarn_lower::{LowerWarning, LowerWarningKind};
    use tarn_tir::Span;

    fn all_kinds() -> Vec<LowerWarningKind> {
        vec![
            LowerWarningKind::TryFinallySuspension,
            LowerWarningKind::ForLoopSuspension,
            LowerWarningKind::HandlerSuspension,
            LowerWarningKind::RecursiveBinding,
            LowerWarningKind::ExpansionArity {
                name: "__expand_body".to_string(),
                expected: 2,
                found: 1,
            },
            LowerWarningKind::NonConstantResumeTarget,
            LowerWarningKind::UnexpandedExpansion {
                name: "__expand_body".to_string(),
            },
            LowerWarningKind::ProtectedRegionWithoutSlot,
        ]
    }

    #[test]
    fn every_kind_maps_to_a_registered_code() {
        let registry = ErrorCodeRegistry::default();
        for kind in all_kinds() {
            let diag = LowerWarning::new(kind.clone(), Span::new(3, 9)).to_diagnostic();
            assert_eq!(diag.severity, Severity::Warning, "{kind}");
            let code = diag.code.as_ref().expect("code set").0.clone();
            assert!(registry.get(&code).is_some(), "{code} not registered");
            assert_eq!(diag.primary_span(), Some(Span::new(3, 9)));
        }
    }

    #[test]
    fn arity_message_pluralizes() {
        let one = LowerWarning::new(
            LowerWarningKind::ExpansionArity {
                name: "__expand_one".to_string(),
                expected: 1,
                found: 0,
            },
            Span::DUMMY,
        )
        .to_diagnostic();
        assert_eq!(one.message, "`__expand_one` expects 1 argument, found 0");

        let two = LowerWarning::new(
            LowerWarningKind::ExpansionArity {
                name: "__expand_two".to_string(),
                expected: 2,
                found: 3,
            },
            Span::DUMMY,
        )
        .to_diagnostic();
        assert_eq!(two.message, "`__expand_two` expects 2 arguments, found 3");
    }
}
