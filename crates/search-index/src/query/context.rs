//! Match context snippets.

use crate::types::MatchSpan;

/// Characters kept on each side of the first match.
pub const DEFAULT_CONTEXT_RADIUS: usize = 50;

const ELLIPSIS: &str = "...";

/// Extracts `radius` characters around the first match.
///
/// Newlines and tabs are flattened to spaces. An ellipsis marks each side
/// where the window stops short of the content boundary. Returns an empty
/// string when there are no matches.
pub fn match_context(content: &str, matches: &[MatchSpan], radius: usize) -> String {
    let Some(first) = matches.first() else {
        return String::new();
    };

    let start = floor_char_boundary(content, first.offset);
    let end = floor_char_boundary(content, first.end()).max(start);

    let window_start = content[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(index, _)| index)
        .unwrap_or(start);
    let tail = &content[end..];
    let window_end = end
        + tail
            .char_indices()
            .nth(radius)
            .map(|(index, _)| index)
            .unwrap_or(tail.len());

    let mut snippet = String::with_capacity(window_end - window_start + 2 * ELLIPSIS.len());
    if window_start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(
        content[window_start..window_end]
            .chars()
            .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c }),
    );
    if window_end < content.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

fn floor_char_boundary(content: &str, index: usize) -> usize {
    let mut index = index.min(content.len());
    while !content.is_char_boundary(index) {
        index -= 1;
    }
    index
}
