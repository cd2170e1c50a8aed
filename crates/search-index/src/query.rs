//! Query evaluation.
//!
//! Provides:
//! - Filename and content matchers (literal, case-folded, regex)
//! - Metadata filters (extension, size, time, kind)
//! - Scoring and match-context extraction

mod context;
mod filter;
mod matcher;
mod score;

pub use context::{match_context, DEFAULT_CONTEXT_RADIUS};
pub use filter::MetadataFilter;
pub use matcher::{find_matches, ContentMatcher, NameMatch, NameMatcher};
pub use score::{
    content_score, name_score, score, CompiledQuery, CONTENT_SATURATION, CONTENT_WEIGHT,
    EXACT_NAME_SCORE, FILTER_ONLY_SCORE, PREFIX_NAME_SCORE, SUBSTRING_NAME_SCORE,
};
