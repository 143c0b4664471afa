//! Two-tier highlighted text.
//!
//! Tier 1 carries every match and depends only on (snapshot version, query). Tier 2 adds the
//! current-match overlay on top of a shared tier 1, so moving between matches never rebuilds
//! the span list.

use bodyscope_core::{HighlightedText, MatchRange, MatchSet, StyleSpan, StyleTag};
use std::sync::Arc;

fn valid_range(text: &str, r: &MatchRange) -> bool {
    r.start < r.end
        && r.end <= text.len()
        && text.is_char_boundary(r.start)
        && text.is_char_boundary(r.end)
}

/// Tier 1: all matches, coalesced into sorted non-overlapping spans.
///
/// Ranges that are not valid for `text` (stale offsets) are dropped.
pub fn build_base(text: Arc<str>, matches: &[MatchRange]) -> HighlightedText {
    let mut ranges: Vec<MatchRange> = matches
        .iter()
        .filter(|r| valid_range(&text, r))
        .copied()
        .collect();
    ranges.sort_unstable();

    let mut merged: Vec<MatchRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match merged.last_mut() {
            Some(last) if last.overlaps_or_touches(&r) => last.end = last.end.max(r.end),
            _ => merged.push(r),
        }
    }
    let spans: Vec<StyleSpan> = merged
        .into_iter()
        .map(|range| StyleSpan {
            range,
            style: StyleTag::AllMatches,
        })
        .collect();
    HighlightedText {
        text,
        spans: Arc::from(spans),
        current: None,
    }
}

/// Tier 2: `base` plus the overlay for `matches[current]`.
///
/// An out-of-range (or invalid) index returns `base` unchanged.
pub fn overlay_current(
    base: &HighlightedText,
    matches: &[MatchRange],
    current: Option<usize>,
) -> HighlightedText {
    let overlay = current
        .and_then(|i| matches.get(i))
        .filter(|r| valid_range(&base.text, r))
        .map(|r| StyleSpan {
            range: *r,
            style: StyleTag::CurrentMatch,
        });
    HighlightedText {
        text: Arc::clone(&base.text),
        spans: Arc::clone(&base.spans),
        current: overlay,
    }
}

/// Uncached form of tier 1 + tier 2.
pub fn build_highlight(text: &str, matches: &[MatchRange], current: Option<usize>) -> HighlightedText {
    let base = build_base(Arc::from(text), matches);
    overlay_current(&base, matches, current)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BaseKey {
    version: u64,
    query: String,
}

/// Cache holding the latest tier 1 and tier 2.
#[derive(Debug, Default)]
pub struct HighlightCache {
    base: Option<(BaseKey, HighlightedText)>,
    display: Option<(BaseKey, Option<usize>, HighlightedText)>,
    base_builds: u64,
}

impl HighlightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&mut self, set: &MatchSet) -> HighlightedText {
        let key = BaseKey {
            version: set.snapshot.version,
            query: set.query.clone(),
        };
        if let Some((k, h)) = &self.base {
            if *k == key {
                return h.clone();
            }
        }
        let built = build_base(Arc::clone(&set.snapshot.text), &set.ranges);
        self.base_builds += 1;
        self.display = None;
        self.base = Some((key, built.clone()));
        built
    }

    pub fn display(&mut self, set: &MatchSet, current: Option<usize>) -> HighlightedText {
        let base = self.base(set);
        if let Some((k, idx, h)) = &self.display {
            if k.version == set.snapshot.version && k.query == set.query && *idx == current {
                return h.clone();
            }
        }
        let shown = overlay_current(&base, &set.ranges, current);
        self.display = Some((
            BaseKey {
                version: set.snapshot.version,
                query: set.query.clone(),
            },
            current,
            shown.clone(),
        ));
        shown
    }

    /// Number of tier-1 builds so far.
    pub fn base_builds(&self) -> u64 {
        self.base_builds
    }

    pub fn invalidate(&mut self) {
        self.base = None;
        self.display = None;
    }
}
