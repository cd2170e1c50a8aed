//! Relevance scoring.
//!
//! The filename component is worth 1.0 (exact), 0.8 (prefix) or 0.5
//! (substring). Content adds up to 0.3, growing linearly with the number of
//! matches until [`CONTENT_SATURATION`] of them. Entries scoring 0.0 are not
//! results.

use super::context::{match_context, DEFAULT_CONTEXT_RADIUS};
use super::filter::MetadataFilter;
use super::matcher::{ContentMatcher, NameMatch, NameMatcher};
use crate::types::{IndexEntry, MatchSpan, SearchQuery, SearchResult};

pub const EXACT_NAME_SCORE: f32 = 1.0;
pub const PREFIX_NAME_SCORE: f32 = 0.8;
pub const SUBSTRING_NAME_SCORE: f32 = 0.5;
pub const CONTENT_WEIGHT: f32 = 0.3;
/// Match count at which the content component stops growing.
pub const CONTENT_SATURATION: usize = 10;
/// Score given to every entry that passes the filters of an empty query.
pub const FILTER_ONLY_SCORE: f32 = 1.0;

pub fn name_score(kind: NameMatch) -> f32 {
    match kind {
        NameMatch::Exact => EXACT_NAME_SCORE,
        NameMatch::Prefix => PREFIX_NAME_SCORE,
        NameMatch::Substring => SUBSTRING_NAME_SCORE,
        NameMatch::None => 0.0,
    }
}

pub fn content_score(match_count: usize) -> f32 {
    let ratio = match_count.min(CONTENT_SATURATION) as f32 / CONTENT_SATURATION as f32;
    CONTENT_WEIGHT * ratio
}

/// A query with its matchers and filters built once.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    filter: MetadataFilter,
    name: Option<NameMatcher>,
    content: Option<ContentMatcher>,
    filter_only: bool,
}

impl CompiledQuery {
    pub fn new(query: &SearchQuery) -> Self {
        Self {
            filter: MetadataFilter::from_query(query),
            name: query.search_filenames.then(|| NameMatcher::new(query)),
            content: query.search_content.then(|| ContentMatcher::new(query)),
            filter_only: query.text.is_empty(),
        }
    }

    /// Cheap metadata check, run before scoring.
    pub fn admits(&self, entry: &IndexEntry) -> bool {
        self.filter.matches(entry)
    }

    /// Scores an entry that already passed [`Self::admits`].
    ///
    /// Returns `None` when the entry does not match at all.
    pub fn evaluate(&self, entry: &IndexEntry) -> Option<SearchResult> {
        if self.filter_only {
            return Some(SearchResult {
                entry: entry.clone(),
                score: FILTER_ONLY_SCORE,
                matches: Vec::new(),
                match_context: String::new(),
            });
        }

        let mut score = self
            .name
            .as_ref()
            .map(|matcher| name_score(matcher.classify(&entry.filename)))
            .unwrap_or(0.0);

        let mut matches: Vec<MatchSpan> = Vec::new();
        let mut match_context_text = String::new();
        if let (Some(matcher), Some(content)) = (&self.content, entry.content.as_deref()) {
            matches = matcher.find_matches(content);
            score += content_score(matches.len());
            match_context_text = match_context(content, &matches, DEFAULT_CONTEXT_RADIUS);
        }

        (score > 0.0).then(|| SearchResult {
            entry: entry.clone(),
            score,
            matches,
            match_context: match_context_text,
        })
    }
}

/// Scores one entry against a query, ignoring metadata filters.
pub fn score(entry: &IndexEntry, query: &SearchQuery) -> f32 {
    CompiledQuery::new(query)
        .evaluate(entry)
        .map(|result| result.score)
        .unwrap_or(0.0)
}
