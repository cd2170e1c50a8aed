//! Text matchers compiled once per query.
//!
//! Literal case-sensitive content search goes through `memchr::memmem`;
//! everything else (case folding, whole words, user patterns) is expressed
//! as a `regex::Regex`. An invalid user pattern never fails the query: the
//! text is searched for literally instead.

use memchr::memmem;
use regex::{Regex, RegexBuilder};

use crate::types::{MatchSpan, SearchQuery};

/// Finds query occurrences inside entry content.
#[derive(Debug, Clone)]
pub enum ContentMatcher {
    /// Case-sensitive literal without word boundaries.
    Literal(memmem::Finder<'static>),
    Pattern(Regex),
    /// Empty query text matches nothing.
    Never,
}

impl ContentMatcher {
    pub fn new(query: &SearchQuery) -> Self {
        let text = query.text.as_str();
        if text.is_empty() {
            return Self::Never;
        }

        if query.use_regex {
            match build_regex(text, query.case_sensitive, query.whole_word) {
                Ok(regex) => return Self::Pattern(regex),
                Err(error) => {
                    log::debug!("invalid pattern {text:?}, searching literally: {error}");
                }
            }
        }

        if query.case_sensitive && !query.whole_word {
            return Self::Literal(memmem::Finder::new(text.as_bytes()).into_owned());
        }

        match build_regex(&regex::escape(text), query.case_sensitive, query.whole_word) {
            Ok(regex) => Self::Pattern(regex),
            // An escaped literal always compiles unless it exceeds the size limit.
            Err(error) => {
                log::debug!("literal pattern rejected, falling back to exact match: {error}");
                Self::Literal(memmem::Finder::new(text.as_bytes()).into_owned())
            }
        }
    }

    /// Collects all non-overlapping, non-empty match spans as byte offsets.
    pub fn find_matches(&self, content: &str) -> Vec<MatchSpan> {
        match self {
            Self::Literal(finder) => {
                let length = finder.needle().len();
                finder
                    .find_iter(content.as_bytes())
                    .map(|offset| MatchSpan::new(offset, length))
                    .collect()
            }
            Self::Pattern(regex) => regex
                .find_iter(content)
                .filter(|found| !found.is_empty())
                .map(|found| MatchSpan::new(found.start(), found.len()))
                .collect(),
            Self::Never => Vec::new(),
        }
    }
}

/// Filename match strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NameMatch {
    None,
    Substring,
    Prefix,
    Exact,
}

/// Classifies how a filename matches the query text.
#[derive(Debug, Clone)]
pub enum NameMatcher {
    /// Needle already case-folded when the query is case-insensitive.
    Literal { needle: String, case_sensitive: bool },
    Pattern {
        any: Regex,
        prefix: Regex,
        exact: Regex,
    },
    Never,
}

impl NameMatcher {
    pub fn new(query: &SearchQuery) -> Self {
        let text = query.text.as_str();
        if text.is_empty() {
            return Self::Never;
        }

        if query.use_regex {
            let compiled = (
                build_regex(text, query.case_sensitive, false),
                build_regex(&format!("^(?:{text})"), query.case_sensitive, false),
                build_regex(&format!("^(?:{text})$"), query.case_sensitive, false),
            );
            match compiled {
                (Ok(any), Ok(prefix), Ok(exact)) => return Self::Pattern { any, prefix, exact },
                (Err(error), _, _) | (_, Err(error), _) | (_, _, Err(error)) => {
                    log::debug!("invalid filename pattern {text:?}, matching literally: {error}");
                }
            }
        }

        Self::Literal {
            needle: fold_case(text, query.case_sensitive),
            case_sensitive: query.case_sensitive,
        }
    }

    pub fn classify(&self, filename: &str) -> NameMatch {
        match self {
            Self::Literal {
                needle,
                case_sensitive,
            } => {
                let name = fold_case(filename, *case_sensitive);
                if name == *needle {
                    NameMatch::Exact
                } else if name.starts_with(needle.as_str()) {
                    NameMatch::Prefix
                } else if name.contains(needle.as_str()) {
                    NameMatch::Substring
                } else {
                    NameMatch::None
                }
            }
            Self::Pattern { any, prefix, exact } => {
                if exact.is_match(filename) {
                    NameMatch::Exact
                } else if prefix.is_match(filename) {
                    NameMatch::Prefix
                } else if any.is_match(filename) {
                    NameMatch::Substring
                } else {
                    NameMatch::None
                }
            }
            Self::Never => NameMatch::None,
        }
    }
}

/// Finds content matches for a one-off query.
pub fn find_matches(content: &str, query: &SearchQuery) -> Vec<MatchSpan> {
    ContentMatcher::new(query).find_matches(content)
}

fn build_regex(
    pattern: &str,
    case_sensitive: bool,
    whole_word: bool,
) -> Result<Regex, regex::Error> {
    let pattern = if whole_word {
        format!(r"\b(?:{pattern})\b")
    } else {
        pattern.to_string()
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()
}

fn fold_case(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}
