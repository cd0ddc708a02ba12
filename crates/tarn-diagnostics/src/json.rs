//! Machine-readable diagnostic reports.
//!
//! Serializes a batch of diagnostics into one JSON document that editor
//! integrations can consume without parsing terminal output. Every span
//! is resolved to 1-based line/column pairs with the source line text
//! attached, and codes are joined against the registry for their
//! category.

use serde::Serialize;

use tarn_tir::LineMap;

use crate::codes::ErrorCodeRegistry;
use crate::{Diagnostic, Label, LabelStyle, Severity};

/// Top-level report for one compilation run.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    /// Schema version, bumped on breaking layout changes.
    pub version: u32,
    /// File the run compiled.
    pub file: String,
    /// True when no errors were produced.
    pub success: bool,
    /// Phase that emitted the diagnostics.
    pub phase: String,
    /// The diagnostics themselves, in emission order.
    pub diagnostics: Vec<JsonDiagnostic>,
    /// Number of error-severity entries.
    pub error_count: usize,
    /// Number of warning-severity entries.
    pub warning_count: usize,
}

/// One diagnostic with its source context resolved.
#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    /// "error", "warning", or "note".
    pub severity: String,
    /// Registry code such as "W0802", when assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Category of the code, looked up from the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Headline message.
    pub message: String,
    /// Where the primary label points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Every labeled span.
    pub labels: Vec<JsonLabel>,
    /// Footer notes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Footer help, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// A resolved position plus the line it falls on.
#[derive(Debug, Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
    /// Text of the line, for display without reopening the file.
    pub source_line: String,
}

/// A labeled span with both endpoints resolved.
#[derive(Debug, Serialize)]
pub struct JsonLabel {
    /// "primary" or "secondary".
    pub role: String,
    /// Message attached to the label, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Where the span opens.
    pub start: LineCol,
    /// Where the span closes.
    pub end: LineCol,
    /// Text of the line the span opens on.
    pub source_line: String,
}

/// 1-based line/column with the raw byte offset kept alongside.
#[derive(Debug, Serialize)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
    pub byte_offset: usize,
}

/// Lookup state shared across one report: the source, its line index,
/// and the code registry.
struct ReportCtx<'s> {
    source: &'s str,
    line_map: LineMap,
    registry: ErrorCodeRegistry,
}

impl ReportCtx<'_> {
    fn at(&self, offset: usize) -> LineCol {
        let (line, column) = self.line_map.line_col(offset);
        LineCol {
            line: line as usize,
            column: column as usize,
            byte_offset: offset,
        }
    }

    fn text_of(&self, line: usize) -> String {
        self.line_map
            .line(self.source, line as u32)
            .unwrap_or("")
            .to_string()
    }

    fn location(&self, label: &Label) -> SourceLocation {
        let at = self.at(label.span.start);
        SourceLocation {
            line: at.line,
            column: at.column,
            byte_offset: at.byte_offset,
            source_line: self.text_of(at.line),
        }
    }

    fn label(&self, label: &Label) -> JsonLabel {
        let start = self.at(label.span.start);
        let end = self.at(label.span.end);
        let source_line = self.text_of(start.line);
        JsonLabel {
            role: role_tag(label.style).to_string(),
            message: label.message.clone(),
            start,
            end,
            source_line,
        }
    }

    fn diagnostic(&self, diag: &Diagnostic) -> JsonDiagnostic {
        let code = diag.code.as_ref().map(|c| c.0.clone());
        let category = code
            .as_deref()
            .and_then(|c| self.registry.get(c))
            .map(|info| info.category.to_string());
        // The location mirrors the primary label, falling back to the
        // first label of any style.
        let primary = diag
            .labels
            .iter()
            .find(|l| l.style == LabelStyle::Primary)
            .or_else(|| diag.labels.first());
        JsonDiagnostic {
            severity: severity_tag(diag.severity).to_string(),
            code,
            category,
            message: diag.message.clone(),
            location: primary.map(|l| self.location(l)),
            labels: diag.labels.iter().map(|l| self.label(l)).collect(),
            notes: diag.notes.clone(),
            help: diag.help.clone(),
        }
    }
}

/// Build the report for one run. Counts are tallied here so callers can
/// branch on `success` without reparsing the diagnostics.
pub fn to_json_report(
    diagnostics: &[Diagnostic],
    source: &str,
    file: &str,
    phase: &str,
) -> DiagnosticReport {
    let ctx = ReportCtx {
        source,
        line_map: LineMap::new(source),
        registry: ErrorCodeRegistry::default(),
    };
    let error_count = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warning_count = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();
    DiagnosticReport {
        version: 1,
        file: file.to_string(),
        success: error_count == 0,
        phase: phase.to_string(),
        diagnostics: diagnostics.iter().map(|d| ctx.diagnostic(d)).collect(),
        error_count,
        warning_count,
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
    }
}

fn role_tag(style: LabelStyle) -> &'static str {
    match style {
        LabelStyle::Primary => "primary",
        LabelStyle::Secondary => "secondary",
    }
}

/// Pretty-print a report. Serialization failure is folded into the
/// output rather than propagated, since this feeds logs and pipes.
pub fn to_json_string(report: &DiagnosticReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|err| format!("{{\"error\": \"{}\"}}", err))
}
