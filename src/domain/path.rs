//! Path handling for the preferences tree.
//!
//! Two notations are in play:
//! - node paths, `/`-separated, rooted at [`PATH_SEPARATOR`] (`/server/http`)
//! - dotted references naming a property, `node.path.key` (`server.http.port`)

use itertools::Itertools;

/// Hierarchical separator; also the path of the root node.
pub const PATH_SEPARATOR: &str = "/";

const SEPARATOR_CHAR: char = '/';
const DOT: char = '.';

/// A dotted reference split into its node path and property key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    /// Node path with dots turned into separators (`a/b`).
    pub node_path: String,
    /// Property key, `None` when the reference carries no dot.
    pub key: Option<String>,
}

/// Splits `"a.b.c"` into node path `"a/b"` and key `"c"`.
///
/// A reference without a dot yields the whole string as node path and no key.
/// A leading dot (`".c"`) also yields no key, matching the "no usable key" case.
pub fn parse_dotted(path: &str) -> ParsedPath {
    match path.rfind(DOT) {
        Some(split) if split > 0 => ParsedPath {
            node_path: path[..split].replace(DOT, PATH_SEPARATOR),
            key: Some(path[split + 1..].to_string()),
        },
        Some(split) => ParsedPath {
            node_path: path[..split].replace(DOT, PATH_SEPARATOR),
            key: None,
        },
        None => ParsedPath {
            node_path: path.to_string(),
            key: None,
        },
    }
}

/// Non-empty segments of a node path. `""`, `"/"` and `"//"` have none.
pub fn segments(path: &str) -> Vec<&str> {
    path.split(SEPARATOR_CHAR)
        .filter(|s| !s.trim().is_empty())
        .collect()
}

/// Normalizes a node path to its absolute form (`a//b/` → `/a/b`).
pub fn normalize(path: &str) -> String {
    join(&segments(path))
}

/// Joins segments into an absolute node path. No segments means root.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    if parts.is_empty() {
        return PATH_SEPARATOR.to_string();
    }
    format!(
        "{}{}",
        PATH_SEPARATOR,
        parts.iter().map(|p| p.as_ref()).join(PATH_SEPARATOR)
    )
}

/// Appends a child name to a parent path.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == PATH_SEPARATOR {
        format!("{}{}", PATH_SEPARATOR, name)
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, name)
    }
}

/// True when `path` is `ancestor` itself or lies beneath it.
pub fn is_same_or_descendant(path: &str, ancestor: &str) -> bool {
    let path = normalize(path);
    let ancestor = normalize(ancestor);
    if ancestor == PATH_SEPARATOR {
        return true;
    }
    path == ancestor || path.starts_with(&format!("{}{}", ancestor, PATH_SEPARATOR))
}

/// Canonical dotted form of a property: `/a/b` + `key` → `a.b.key`, root + `key` → `key`.
///
/// Bindings and change events are matched on this form, so explicit keys
/// (`server.timeout`) and synthesized ones (`/app/Server.timeout`) compare alike.
pub fn dotted(node_path: &str, key: &str) -> String {
    let parts = segments(node_path);
    if parts.is_empty() {
        key.to_string()
    } else {
        format!("{}{}{}", parts.iter().join("."), DOT, key)
    }
}

/// Maps a Rust type name to a node path: `app::config::Server` → `/app/config/Server`.
pub fn type_path(type_name: &str) -> String {
    let parts: Vec<&str> = type_name
        .split("::")
        .filter(|s| !s.is_empty())
        .collect();
    join(&parts)
}

/// Human-readable type name used in qualified attribute names: `app::Server` → `app.Server`.
pub fn qualified_type_name(type_name: &str) -> String {
    type_name.replace("::", ".")
}
