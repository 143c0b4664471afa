//! Case-insensitive match finding and match navigation.
//!
//! Folding is per char (simple lowercase mapping), so a range always spans exactly as many chars
//! as the query. Scanning resumes one char past each match start: overlapping occurrences are
//! each reported.

use crate::highlight::HighlightCache;
use bodyscope_core::{HighlightedText, MatchRange, MatchSet, TextSnapshot};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn fold(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        // Multi-char expansions (e.g. 'İ') keep the original char so lengths stay 1:1.
        _ => c,
    }
}

/// All case-insensitive occurrences of `query` in `text`, in increasing start order.
///
/// An empty query means "search inactive" and yields no ranges.
pub fn find_matches(text: &str, query: &str) -> Vec<MatchRange> {
    let needle: Vec<char> = query.chars().map(fold).collect();
    if needle.is_empty() {
        return Vec::new();
    }
    let hay: Vec<(usize, char)> = text.char_indices().map(|(i, c)| (i, fold(c))).collect();
    if hay.len() < needle.len() {
        return Vec::new();
    }

    let byte_at = |ci: usize| hay.get(ci).map(|(b, _)| *b).unwrap_or(text.len());
    let mut out = Vec::new();
    for i in 0..=hay.len() - needle.len() {
        let hit = hay[i..i + needle.len()]
            .iter()
            .zip(&needle)
            .all(|((_, h), n)| h == n);
        if hit {
            out.push(MatchRange::new(byte_at(i), byte_at(i + needle.len())));
        }
    }
    out
}

/// Async search entry point where only the most recently issued request delivers results.
///
/// Ordering is by issue order (sequence number), not completion order.
#[derive(Debug, Clone, Default)]
pub struct MatchSearcher {
    seq: Arc<AtomicU64>,
}

impl MatchSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a search. The sequence number is taken now; the returned future resolves to `None`
    /// if another search was issued before this one finished.
    pub fn search(
        &self,
        snapshot: TextSnapshot,
        query: impl Into<String>,
    ) -> impl Future<Output = Option<MatchSet>> + Send + 'static {
        let query = query.into();
        let ticket = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let seq = Arc::clone(&self.seq);
        async move {
            let text = Arc::clone(&snapshot.text);
            let q = query.clone();
            let ranges = match tokio::task::spawn_blocking(move || find_matches(&text, &q)).await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "search task failed");
                    return None;
                }
            };
            let latest = seq.load(Ordering::SeqCst);
            if latest != ticket {
                tracing::debug!(ticket, latest, "discarding superseded search");
                return None;
            }
            Some(MatchSet {
                snapshot,
                query,
                ranges: Arc::from(ranges),
            })
        }
    }
}

/// Current match set, current index, and the highlight cache that renders them.
#[derive(Debug, Default)]
pub struct SearchNavigator {
    matches: Option<MatchSet>,
    current: usize,
    cache: HighlightCache,
}

impl SearchNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active match set and jump to its first match.
    pub fn set_matches(&mut self, matches: MatchSet) -> HighlightedText {
        self.matches = Some(matches);
        self.current = 0;
        self.display()
    }

    pub fn clear(&mut self) {
        self.matches = None;
        self.current = 0;
    }

    pub fn matches(&self) -> Option<&MatchSet> {
        self.matches.as_ref()
    }

    pub fn len(&self) -> usize {
        self.matches.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.is_empty()).then_some(self.current)
    }

    pub fn current_range(&self) -> Option<MatchRange> {
        let m = self.matches.as_ref()?;
        m.ranges.get(self.current).copied()
    }

    pub fn next(&mut self) -> Option<HighlightedText> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        self.current = (self.current + 1) % n;
        Some(self.display())
    }

    pub fn previous(&mut self) -> Option<HighlightedText> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        self.current = (self.current + n - 1) % n;
        Some(self.display())
    }

    /// Tier-2 highlight for the current state (plain text when there is no match set).
    pub fn display(&mut self) -> HighlightedText {
        match &self.matches {
            Some(m) => self.cache.display(m, Some(self.current)),
            None => HighlightedText::plain(""),
        }
    }

    pub fn cache(&self) -> &HighlightCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot(v: u64, s: &str) -> TextSnapshot {
        TextSnapshot::new(v, s)
    }

    #[test]
    fn finds_case_insensitive_and_overlapping() {
        assert_eq!(
            find_matches("Hello hello HELLO", "hello"),
            vec![
                MatchRange::new(0, 5),
                MatchRange::new(6, 11),
                MatchRange::new(12, 17)
            ]
        );
        assert_eq!(
            find_matches("aaaa", "aa"),
            vec![
                MatchRange::new(0, 2),
                MatchRange::new(1, 3),
                MatchRange::new(2, 4)
            ]
        );
        assert!(find_matches("abc", "abcd").is_empty());
    }

    #[test]
    fn multibyte_ranges_land_on_char_boundaries() {
        let text = "Grüße GRÜSSE grüße";
        let m = find_matches(text, "GRÜẞE");
        // 'ẞ' folds to 'ß', so only the first and last occurrences match.
        assert_eq!(m.len(), 2);
        for r in &m {
            assert!(text.is_char_boundary(r.start) && text.is_char_boundary(r.end));
            assert_eq!(text[r.start..r.end].chars().count(), 5);
        }
    }

    proptest! {
        #[test]
        fn empty_query_is_inactive(text in ".{0,64}") {
            prop_assert!(find_matches(&text, "").is_empty());
        }

        #[test]
        fn ranges_are_ordered_and_query_sized(text in "[aAbB ]{0,64}", query in "[aAbB]{1,3}") {
            let ranges = find_matches(&text, &query);
            let qlen = query.chars().count();
            for w in ranges.windows(2) {
                prop_assert!(w[0].start <= w[1].start);
            }
            for r in &ranges {
                prop_assert_eq!(text[r.start..r.end].chars().count(), qlen);
                prop_assert_eq!(text[r.start..r.end].to_lowercase(), query.to_lowercase());
            }
        }
    }

    #[tokio::test]
    async fn newer_search_supersedes_older_one() {
        let searcher = MatchSearcher::new();
        let older = searcher.search(snapshot(1, "alpha beta"), "alpha");
        let newer = searcher.search(snapshot(1, "alpha beta"), "beta");
        let (older, newer) = tokio::join!(older, newer);
        assert!(older.is_none());
        let newer = newer.expect("latest search delivers");
        assert_eq!(newer.key(), (1, "beta"));
        assert_eq!(&newer.ranges[..], &[MatchRange::new(6, 10)]);
    }

    #[tokio::test]
    async fn lone_search_delivers_even_when_empty() {
        let searcher = MatchSearcher::new();
        let set = searcher.search(snapshot(3, "abc"), "").await.expect("delivered");
        assert!(set.is_empty());
    }

    #[test]
    fn navigator_wraps_both_ways() {
        let text = "x ab ab ab";
        let mut nav = SearchNavigator::new();
        assert!(nav.next().is_none());
        let set = MatchSet {
            snapshot: snapshot(1, text),
            query: "ab".to_string(),
            ranges: Arc::from(find_matches(text, "ab")),
        };
        let first = nav.set_matches(set);
        assert_eq!(first.current.map(|c| c.range), Some(MatchRange::new(2, 4)));

        nav.previous();
        assert_eq!(nav.current_index(), Some(2));
        nav.next();
        assert_eq!(nav.current_index(), Some(0));
        let h = nav.next().expect("has matches");
        assert_eq!(h.current.map(|c| c.range), Some(MatchRange::new(5, 7)));
        assert_eq!(nav.cache().base_builds(), 1);

        nav.clear();
        assert_eq!(nav.current_index(), None);
    }
}
