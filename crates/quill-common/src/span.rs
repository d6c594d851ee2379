use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Byte-offset span into source text. Start is inclusive, end is exclusive.
///
/// The JSON tree writes spans as `[start, end]` pairs and may leave them
/// out. Nodes without position information carry [`Span::default`], the
/// unknown span, which diagnostics render as a zero-width label at the start
/// of the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the span came from the input rather than a default.
    pub fn is_known(&self) -> bool {
        *self != Span::default()
    }

    /// Smallest span covering both. Unknown spans are ignored.
    pub fn cover(self, other: Span) -> Span {
        match (self.is_known(), other.is_known()) {
            (_, false) => self,
            (false, true) => other,
            (true, true) => Span {
                start: self.start.min(other.start),
                end: self.end.max(other.end),
            },
        }
    }

    /// The span as a byte range inside a source of `len` bytes. A tree
    /// paired with the wrong source can point past its end, so both ends are
    /// clamped and the range never runs backwards.
    pub fn source_range(&self, len: usize) -> Range<usize> {
        let start = (self.start as usize).min(len);
        let end = (self.end as usize).min(len).max(start);
        start..end
    }
}

impl From<(u32, u32)> for Span {
    fn from((start, end): (u32, u32)) -> Self {
        Span::new(start.min(end), end.max(start))
    }
}

impl From<Span> for (u32, u32) {
    fn from(span: Span) -> Self {
        (span.start, span.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_ignores_unknown_spans() {
        let known = Span::new(5, 10);
        assert_eq!(known.cover(Span::default()), known);
        assert_eq!(Span::default().cover(known), known);
        assert_eq!(known.cover(Span::new(8, 15)), Span::new(5, 15));
        assert!(!Span::default().cover(Span::default()).is_known());
    }

    #[test]
    fn source_range_stays_inside_the_source() {
        assert_eq!(Span::new(2, 8).source_range(10), 2..8);
        assert_eq!(Span::new(2, 40).source_range(10), 2..10);
        assert_eq!(Span::new(30, 40).source_range(10), 10..10);
    }

    #[test]
    fn reads_reversed_pairs_from_json() {
        let span: Span = serde_json::from_str("[9, 3]").unwrap();
        assert_eq!(span, Span::new(3, 9));
        assert_eq!(serde_json::to_string(&span).unwrap(), "[3,9]");
    }
}
