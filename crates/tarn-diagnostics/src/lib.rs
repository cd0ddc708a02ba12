// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Shared diagnostic type for the tarn compiler.
//!
//! Phase crates keep their own small error enums and convert them here
//! through [`ToDiagnostic`]. Everything user facing funnels into one
//! [`Diagnostic`] value that the terminal formatter and the JSON
//! reporter both render.

pub mod codes;
pub mod convert;
pub mod formatter;
pub mod json;

use serde::Serialize;

use tarn_tir::Span;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// Code attached to a diagnostic, like W0802.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ErrorCode(pub String);

/// Role of a labeled span in the rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    /// The location the diagnostic is about. Underlined with carets.
    Primary,
    /// Supporting context. Underlined with dashes.
    Secondary,
}

/// A span plus the message to print under it.
#[derive(Debug, Clone, Serialize)]
pub struct Label {
    pub span: Span,
    pub style: LabelStyle,
    pub message: Option<String>,
}

/// One user-facing diagnostic, built up fluently.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(ErrorCode(code.into()));
        self
    }

    pub fn with_label(mut self, span: Span, style: LabelStyle, msg: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            style,
            message: Some(msg.into()),
        });
        self
    }

    /// Label the span the diagnostic is about.
    pub fn with_primary(self, span: Span, msg: impl Into<String>) -> Self {
        self.with_label(span, LabelStyle::Primary, msg)
    }

    /// Label a span that gives supporting context.
    pub fn with_secondary(self, span: Span, msg: impl Into<String>) -> Self {
        self.with_label(span, LabelStyle::Secondary, msg)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// The span of the first primary label, or of the first label when
    /// no primary exists.
    pub fn primary_span(&self) -> Option<Span> {
        let labeled = self
            .labels
            .iter()
            .find(|l| l.style == LabelStyle::Primary)
            .or_else(|| self.labels.first());
        labeled.map(|l| l.span)
    }
}

/// Implemented by each phase's warning and error types.
pub trait ToDiagnostic {
    fn to_diagnostic(&self) -> Diagnostic;
}
