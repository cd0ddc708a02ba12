// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Byte spans and line/column lookup.

/// A byte range in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Span of nodes synthesized by the compiler.
    pub const DUMMY: Span = Span { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_dummy(self) -> bool {
        self == Span::DUMMY
    }
}

/// Line-start table for byte-offset → line:col conversion.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Byte offset of the first byte of each line; starts[0] is 0.
    starts: Vec<u32>,
}

impl LineMap {
    /// Scan `source` once for newlines.
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i as u32 + 1);
            }
        }
        LineMap { starts }
    }

    /// (line, col) of a byte offset, both 1-based.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let off = offset as u32;
        let idx = match self.starts.binary_search(&off) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        (idx as u32 + 1, off - self.starts[idx] + 1)
    }

    /// Text of a 1-based line, without its trailing newline.
    pub fn line<'s>(&self, source: &'s str, line: u32) -> Option<&'s str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.starts.get(idx)? as usize;
        let end = match self.starts.get(idx + 1) {
            Some(&next) => (next as usize).saturating_sub(1),
            None => source.len(),
        };
        source.get(start..end)
    }

    pub fn line_count(&self) -> u32 {
        self.starts.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_spans() {
        let a = Span::new(4, 9);
        let b = Span::new(12, 20);
        assert_eq!(a.to(b), Span::new(4, 20));
        assert_eq!(b.to(a), Span::new(4, 20));
        assert!(Span::DUMMY.to(Span::DUMMY).is_dummy());
    }

    #[test]
    fn line_col_lookup() {
        let src = "flow {\n  pause\n}\n";
        let lm = LineMap::new(src);
        assert_eq!(lm.line_count(), 4);
        assert_eq!(lm.line_col(0), (1, 1)); // 'f'
        assert_eq!(lm.line_col(9), (2, 3)); // 'p'
        assert_eq!(lm.line_col(15), (3, 1)); // '}'
        assert_eq!(lm.line(src, 2), Some("  pause"));
        assert_eq!(lm.line(src, 4), Some(""));
        assert_eq!(lm.line(src, 5), None);
    }

    #[test]
    fn lookup_past_last_newline() {
        let lm = LineMap::new("ab\ncd");
        assert_eq!(lm.line_col(4), (2, 2));
        assert_eq!(lm.line("ab\ncd", 2), Some("cd"));
    }
}
