// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Terminal renderer for diagnostics.
//!
//! Output follows the familiar compiler layout: a severity header, a
//! pointer into the source, the offending lines with underlines, then
//! notes and help:
//!
//! ```text
//! warning[W0802]: cannot suspend inside a `for` loop
//!   --> machine.tn:4:9
//!    |
//!  4 |         pause()
//!    |         ^^^^^^^ suspension point in the loop
//!    = help: rewrite the loop as `while` to allow suspension
//! ```

use colored::Colorize;

use tarn_tir::LineMap;

use crate::{Diagnostic, LabelStyle, Severity};

/// Renders diagnostics against one source text.
pub struct DiagnosticFormatter<'a> {
    source: &'a str,
    file_name: Option<&'a str>,
    line_map: LineMap,
}

/// One source line and the underlines attached to it.
struct SourceBlock {
    line: usize,
    text: String,
    marks: Vec<Mark>,
}

/// A single underline: 1-based column range, half open.
struct Mark {
    start: usize,
    end: usize,
    style: LabelStyle,
    note: Option<String>,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new(source: &'a str) -> Self {
        DiagnosticFormatter {
            source,
            file_name: None,
            line_map: LineMap::new(source),
        }
    }

    pub fn with_file_name(mut self, name: &'a str) -> Self {
        self.file_name = Some(name);
        self
    }

    pub fn format(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();
        self.header(&mut out, diagnostic);

        let blocks = self.blocks(diagnostic);
        if blocks.is_empty() {
            self.tail(&mut out, diagnostic);
            return out;
        }

        // The pointer names the earliest annotated line, at the column of
        // the diagnostic's first label.
        if let Some(first) = diagnostic.labels.first() {
            let origin = self.file_name.unwrap_or("<source>");
            let col = self.line_col(first.span.start).1;
            out.push_str(&format!(
                "  {} {}:{}:{}\n",
                "-->".blue(),
                origin,
                blocks[0].line,
                col
            ));
        }

        let last_line = blocks.last().map(|b| b.line).unwrap_or(1);
        let gutter = last_line.to_string().len().max(2);

        gutter_pipe(&mut out, gutter);
        let mut prev: Option<usize> = None;
        for block in &blocks {
            if let Some(prev) = prev {
                if block.line > prev + 1 {
                    gutter_gap(&mut out, gutter);
                }
            }
            out.push_str(&format!(
                "{:>width$} {} {}\n",
                block.line.to_string().blue().bold(),
                "|".blue(),
                block.text,
                width = gutter + 1,
            ));
            underline(&mut out, block, gutter);
            prev = Some(block.line);
        }

        self.tail(&mut out, diagnostic);
        out
    }

    fn header(&self, out: &mut String, diagnostic: &Diagnostic) {
        let word = match diagnostic.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        match &diagnostic.code {
            Some(code) => out.push_str(&format!(
                "{}[{}]: {}\n",
                severity_paint(diagnostic.severity, word),
                severity_paint(diagnostic.severity, &code.0),
                diagnostic.message.bold()
            )),
            None => out.push_str(&format!(
                "{}: {}\n",
                severity_paint(diagnostic.severity, word),
                diagnostic.message.bold()
            )),
        }
    }

    /// Notes and help, rendered after the source context.
    fn tail(&self, out: &mut String, diagnostic: &Diagnostic) {
        for note in &diagnostic.notes {
            meta_line(out, "note", note);
        }
        if let Some(help) = &diagnostic.help {
            meta_line(out, "help", help);
        }
    }

    /// Group the labels by source line, ascending. A span that crosses
    /// lines is pinned to its first line and underlined to the line end.
    fn blocks(&self, diagnostic: &Diagnostic) -> Vec<SourceBlock> {
        let mut blocks: Vec<SourceBlock> = Vec::new();
        for label in &diagnostic.labels {
            let (line, start) = self.line_col(label.span.start);
            let (end_line, end_col) = self.line_col(label.span.end);
            let text = self.line_text(line).unwrap_or("").to_string();
            let end = if end_line == line {
                end_col
            } else {
                text.len() + 1
            };
            let mark = Mark {
                start,
                end: end.max(start + 1),
                style: label.style,
                note: label.message.clone(),
            };
            match blocks.iter().position(|b| b.line == line) {
                Some(i) => blocks[i].marks.push(mark),
                None => blocks.push(SourceBlock {
                    line,
                    text,
                    marks: vec![mark],
                }),
            }
        }
        blocks.sort_by_key(|b| b.line);
        blocks
    }

    /// Byte offset to 1-based (line, column).
    fn line_col(&self, offset: usize) -> (usize, usize) {
        let (line, col) = self.line_map.line_col(offset);
        (line as usize, col as usize)
    }

    /// Source text of a 1-based line.
    fn line_text(&self, line: usize) -> Option<&str> {
        self.line_map.line(self.source, line as u32)
    }
}

/// `   |` continuation line.
fn gutter_pipe(out: &mut String, gutter: usize) {
    out.push_str(&format!("{} {}\n", " ".repeat(gutter + 1), "|".blue()));
}

/// `  ...` separator between non-adjacent annotated lines.
fn gutter_gap(out: &mut String, gutter: usize) {
    out.push_str(&format!("{} {}\n", " ".repeat(gutter), "...".blue()));
}

/// `   | <content>` annotation line under a source line.
fn gutter_annot(out: &mut String, gutter: usize, content: &str) {
    out.push_str(&format!(
        "{} {} {}\n",
        " ".repeat(gutter + 1),
        "|".blue(),
        content
    ));
}

/// `    = tag: text` footer line.
fn meta_line(out: &mut String, tag: &str, text: &str) {
    out.push_str(&format!(
        "{} {} {}: {}\n",
        " ".repeat(3),
        "=".cyan(),
        tag.cyan().bold(),
        text
    ));
}

/// Underline a block's marks and attach their messages. Primary marks
/// render first so a secondary overlapping one keeps its own glyph.
fn underline(out: &mut String, block: &SourceBlock, gutter: usize) {
    let mut ordered: Vec<&Mark> = block.marks.iter().collect();
    ordered.sort_by_key(|m| (style_rank(m.style), m.start));

    let width = block.text.len() + 10;
    let mut lane = vec![' '; width];
    for mark in &ordered {
        let glyph = match mark.style {
            LabelStyle::Primary => '^',
            LabelStyle::Secondary => '-',
        };
        let from = mark.start - 1;
        let to = mark.end.saturating_sub(1).min(width);
        if let Some(cells) = lane.get_mut(from..to) {
            for cell in cells {
                *cell = glyph;
            }
        }
    }
    let lane: String = lane.into_iter().collect();
    let lane = lane.trim_end();
    if lane.is_empty() {
        return;
    }
    let painted = paint_lane(lane);

    let notes: Vec<(usize, LabelStyle, &str)> = ordered
        .iter()
        .filter_map(|m| {
            m.note
                .as_deref()
                .map(|note| (m.end.saturating_sub(1), m.style, note))
        })
        .collect();

    match notes.as_slice() {
        [] => gutter_annot(out, gutter, &painted),
        [(_, style, note)] => {
            let content = format!("{} {}", painted, note_paint(*style, note));
            gutter_annot(out, gutter, &content);
        }
        stacked => {
            // Each message gets its own connector line, rightmost first.
            gutter_annot(out, gutter, &painted);
            for (col, style, note) in stacked.iter().rev() {
                let content = format!(
                    "{}{} {}",
                    " ".repeat(col.saturating_sub(1)),
                    note_paint(*style, "|"),
                    note_paint(*style, note)
                );
                gutter_annot(out, gutter, &content);
            }
        }
    }
}

fn style_rank(style: LabelStyle) -> u8 {
    match style {
        LabelStyle::Primary => 0,
        LabelStyle::Secondary => 1,
    }
}

fn severity_paint(severity: Severity, text: &str) -> String {
    match severity {
        Severity::Error => text.red().bold().to_string(),
        Severity::Warning => text.yellow().bold().to_string(),
        Severity::Note => text.blue().bold().to_string(),
    }
}

fn note_paint(style: LabelStyle, text: &str) -> String {
    match style {
        LabelStyle::Primary => text.red().bold().to_string(),
        LabelStyle::Secondary => text.blue().to_string(),
    }
}

/// Color each run of underline glyphs, leaving the gaps plain.
fn paint_lane(lane: &str) -> String {
    let mut painted = String::new();
    let mut rest = lane;
    while let Some(lead) = rest.chars().next() {
        let run_len = rest.chars().take_while(|&c| c == lead).count();
        let (run, tail) = rest.split_at(run_len);
        match lead {
            '^' => painted.push_str(&run.red().bold().to_string()),
            '-' => painted.push_str(&run.blue().to_string()),
            _ => painted.push_str(run),
        }
        rest = tail;
    }
    painted
}
