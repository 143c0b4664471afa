//! Visual-line geometry for match overlays under soft wrapping.

use bodyscope_core::MatchRange;
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

/// Part of a range on one visual line, in grapheme columns (`end_column` exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineFragment {
    pub line: usize,
    pub start_column: usize,
    pub end_column: usize,
}

/// One fragment per visual line that `range` covers.
///
/// Each grapheme takes one column, `\n` starts a new line, and lines wrap after `wrap_columns`
/// graphemes (`0` disables wrapping). Line breaks themselves are never part of a fragment.
pub fn match_regions(text: &str, range: MatchRange, wrap_columns: usize) -> Vec<LineFragment> {
    let mut out: Vec<LineFragment> = Vec::new();
    if range.is_empty() {
        return out;
    }
    let (mut line, mut col) = (0usize, 0usize);
    for (offset, g) in text.grapheme_indices(true) {
        if offset >= range.end {
            break;
        }
        if g == "\n" || g == "\r\n" {
            line += 1;
            col = 0;
            continue;
        }
        if wrap_columns > 0 && col == wrap_columns {
            line += 1;
            col = 0;
        }
        if offset >= range.start {
            match out.last_mut() {
                Some(f) if f.line == line => f.end_column = col + 1,
                _ => out.push(LineFragment {
                    line,
                    start_column: col,
                    end_column: col + 1,
                }),
            }
        }
        col += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(line: usize, start_column: usize, end_column: usize) -> LineFragment {
        LineFragment {
            line,
            start_column,
            end_column,
        }
    }

    #[test]
    fn single_line_range() {
        assert_eq!(
            match_regions("hello world", MatchRange::new(6, 11), 0),
            vec![frag(0, 6, 11)]
        );
    }

    #[test]
    fn soft_wrap_splits_range() {
        // "abcdef" wrapped at 4 => "abcd" / "ef"
        assert_eq!(
            match_regions("abcdef", MatchRange::new(2, 6), 4),
            vec![frag(0, 2, 4), frag(1, 0, 2)]
        );
    }

    #[test]
    fn hard_break_inside_range() {
        assert_eq!(
            match_regions("ab\ncd", MatchRange::new(1, 4), 0),
            vec![frag(0, 1, 2), frag(1, 0, 1)]
        );
    }

    #[test]
    fn grapheme_clusters_take_one_column() {
        let text = "e\u{301}x";
        let start = text.find('x').unwrap_or(0);
        assert_eq!(
            match_regions(text, MatchRange::new(start, start + 1), 0),
            vec![frag(0, 1, 2)]
        );
        assert!(match_regions(text, MatchRange::new(1, 1), 0).is_empty());
    }
}
