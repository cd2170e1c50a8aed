//! Path eligibility rules.
//!
//! Pure functions: callers pass in everything already known about a path
//! (including whether it is a directory) and nothing here touches the disk.

use std::path::{Component, Path};

use crate::config::IndexConfig;

/// Extensions whose files are read as text for content search.
const TEXT_EXTENSIONS: &[&str] = &[
    // plain text and docs
    "txt", "md", "markdown", "rst", "adoc", "org", "tex", "log", "csv", "tsv",
    // config
    "json", "jsonc", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "properties", "xml",
    "plist", "lock",
    // web
    "html", "htm", "css", "scss", "sass", "less", "svg", "vue", "svelte",
    // code
    "rs", "c", "h", "cc", "cpp", "cxx", "hpp", "hxx", "m", "mm", "cs", "java", "kt", "kts",
    "scala", "go", "py", "pyi", "rb", "php", "pl", "pm", "lua", "swift", "dart", "js", "jsx",
    "mjs", "cjs", "ts", "tsx", "sql", "r", "jl", "ex", "exs", "erl", "hs", "ml", "mli", "fs",
    "fsx", "clj", "zig", "nim", "v", "sv", "vhd", "proto", "graphql", "gradle", "cmake",
    // shell
    "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd",
];

/// Extension-less file names that are text by convention.
const TEXT_FILENAMES: &[&str] = &[
    "makefile", "dockerfile", "readme", "license", "changelog", "gemfile", "rakefile",
    "procfile", "justfile",
];

/// Returns true when the file's text may be captured for content search.
pub fn is_text_candidate(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            TEXT_EXTENSIONS.contains(&ext.as_str())
        }
        None => path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|name| TEXT_FILENAMES.contains(&name.as_str())),
    }
}

/// Returns false when the path must stay out of the catalog.
///
/// A path is rejected when it lies under an excluded directory fragment, is
/// hidden while hidden indexing is off, or (for files) fails the extension
/// filters. The exclude list always wins over the include list.
pub fn should_index(path: &Path, is_directory: bool, config: &IndexConfig) -> bool {
    let relative = relative_to_roots(path, &config.roots);

    if in_excluded_dir(relative, is_directory, &config.excluded_dirs) {
        return false;
    }

    if !config.index_hidden && is_hidden(relative) {
        return false;
    }

    is_directory || extension_allowed(path, config)
}

/// Checks the include/exclude extension lists for a file.
pub fn extension_allowed(path: &Path, config: &IndexConfig) -> bool {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if config
        .exclude_extensions
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(&ext))
    {
        return false;
    }

    config.include_extensions.is_empty()
        || config
            .include_extensions
            .iter()
            .any(|included| included.eq_ignore_ascii_case(&ext))
}

/// Returns true when any component (relative to the root) is a dotfile.
pub fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Checks whether the path sits under (or, for directories, is) an excluded
/// directory.
///
/// Single-segment fragments must equal a directory component; fragments that
/// contain a separator match anywhere in the `/`-joined directory path.
pub fn in_excluded_dir(relative: &Path, is_directory: bool, fragments: &[String]) -> bool {
    if fragments.is_empty() {
        return false;
    }

    let mut dirs: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if !is_directory {
        dirs.pop();
    }
    if dirs.is_empty() {
        return false;
    }

    let joined = format!("/{}/", dirs.join("/"));
    fragments.iter().any(|fragment| {
        let fragment = fragment.replace('\\', "/");
        let trimmed = fragment.trim_matches('/');
        if trimmed.is_empty() {
            false
        } else if trimmed.contains('/') {
            joined.contains(&format!("/{trimmed}/"))
        } else {
            dirs.iter().any(|dir| dir == trimmed)
        }
    })
}

/// Strips the longest configured root that prefixes `path`.
///
/// Paths outside every root are returned unchanged.
pub fn relative_to_roots<'a>(path: &'a Path, roots: &[std::path::PathBuf]) -> &'a Path {
    roots
        .iter()
        .filter_map(|root| path.strip_prefix(root).ok())
        .min_by_key(|relative| relative.components().count())
        .unwrap_or(path)
}
