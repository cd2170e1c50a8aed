//! Query evaluation over a catalog snapshot.

use std::path::PathBuf;

use crate::cancel::CancellationToken;
use crate::catalog::EntryMap;
use crate::query::CompiledQuery;
use crate::types::{SearchQuery, SearchResult};

/// Searches the catalog entries held by the caller's read guard.
///
/// Entries are visited in key order and the token is checked before each
/// one. Metadata filters run before scoring.
/// Collection stops once `max_results` hits were found (0 means unlimited)
/// or the token is cancelled; cancellation returns what was collected so far.
/// Results are sorted by descending score, ties kept in key order.
pub fn search_catalog(
    entries: &EntryMap,
    query: &SearchQuery,
    cancel_token: &CancellationToken,
) -> Vec<SearchResult> {
    let compiled = CompiledQuery::new(query);
    let cap = effective_cap(query.max_results);
    let mut results = Vec::new();

    for (i, entry) in entries.values().enumerate() {
        if cancel_token.is_cancelled().is_none() {
            log::debug!("search cancelled after {i} entries");
            break;
        }
        if !compiled.admits(entry) {
            continue;
        }
        if let Some(result) = compiled.evaluate(entry) {
            results.push(result);
            if results.len() >= cap {
                break;
            }
        }
    }

    // Stable sort keeps key order among equal scores.
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results
}

/// Case-insensitive filename substring search without scoring.
pub fn quick_search(
    entries: &EntryMap,
    pattern: &str,
    max_results: usize,
    cancel_token: &CancellationToken,
) -> Vec<PathBuf> {
    let needle = pattern.to_lowercase();
    let cap = effective_cap(max_results);
    let mut paths = Vec::new();

    for entry in entries.values() {
        if cancel_token.is_cancelled().is_none() || paths.len() >= cap {
            break;
        }
        if entry.filename.to_lowercase().contains(&needle) {
            paths.push(entry.path.clone());
        }
    }
    paths
}

fn effective_cap(max_results: usize) -> usize {
    if max_results == 0 {
        usize::MAX
    } else {
        max_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;
    use crate::catalog::CatalogKey;
    use crate::types::IndexEntry;
    use std::time::SystemTime;

    fn catalog(names: &[&str]) -> EntryMap {
        let now = SystemTime::now();
        names
            .iter()
            .map(|name| {
                let entry = IndexEntry::file(PathBuf::from(format!("/r/{name}")), 1, now, now);
                (CatalogKey::new(&entry.path), entry)
            })
            .collect()
    }

    fn filenames(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.entry.filename.as_str()).collect()
    }

    #[test]
    fn results_sorted_by_score_then_path() {
        let entries = catalog(&["zfoo", "barfoo", "foobar", "foo", "afoo"]);
        let query = SearchQuery::new("foo");
        let results = search_catalog(&entries, &query, &CancellationToken::noop());
        assert_eq!(filenames(&results), ["foo", "foobar", "afoo", "barfoo", "zfoo"]);
    }

    #[test]
    fn cap_applies_in_path_order_before_sorting() {
        let entries = catalog(&["b-foo", "c-foo", "foo"]);
        let results = search_catalog(
            &entries,
            &SearchQuery::new("foo").max_results(2),
            &CancellationToken::noop(),
        );
        assert_eq!(filenames(&results), ["b-foo", "c-foo"]);

        let unlimited = search_catalog(
            &entries,
            &SearchQuery::new("foo").max_results(0),
            &CancellationToken::noop(),
        );
        assert_eq!(unlimited.len(), 3);
    }

    #[test]
    fn cancelled_search_returns_partial_results() {
        let entries = catalog(&["foo", "foo2"]);
        let source = CancellationSource::new();
        let token = source.token();
        source.cancel();
        assert!(search_catalog(&entries, &SearchQuery::new("foo"), &token).is_empty());
    }

    #[test]
    fn cancel_stops_a_search_in_progress() {
        let now = SystemTime::now();
        let body = "needle ".repeat(4096);
        let total = 500;
        let entries: EntryMap = (0..total)
            .map(|i| {
                let path = PathBuf::from(format!("/r/{i:04}.txt"));
                let entry = IndexEntry::file(path, body.len() as u64, now, now)
                    .with_content(body.clone(), 1);
                (CatalogKey::new(&entry.path), entry)
            })
            .collect();
        let query = SearchQuery::new("NEEDLE")
            .filenames(false)
            .content(true)
            .whole_word(true)
            .max_results(0);

        let source = CancellationSource::new();
        let token = source.token();
        let search = std::thread::spawn(move || search_catalog(&entries, &query, &token).len());
        std::thread::sleep(std::time::Duration::from_millis(1));
        source.cancel();

        let found = search.join().unwrap();
        assert!(found < total, "search ignored cancellation: {found} of {total}");
    }

    #[test]
    fn quick_search_matches_filename_substrings() {
        let entries = catalog(&["Alpha.txt", "beta.txt", "gamma.md"]);
        let token = CancellationToken::noop();
        assert_eq!(
            quick_search(&entries, "ALP", 10, &token),
            vec![PathBuf::from("/r/Alpha.txt")]
        );
        assert_eq!(quick_search(&entries, ".txt", 1, &token).len(), 1);
        assert_eq!(quick_search(&entries, "", 0, &token).len(), 3);
    }
}
