//! Terminal output formatting with colors
//!
//! Respects NO_COLOR, CLICOLOR, CLICOLOR_FORCE automatically.

use colored::Colorize;
use termtree::Tree;

use crate::domain::Node;

/// Print error (red bold "error:" prefix) to stderr
pub fn error(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// Print warning (yellow "Warning:" prefix) to stderr
pub fn warning(msg: &(impl std::fmt::Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

/// Print completed action (green label)
pub fn action(label: &str, msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}: {}", label.green(), msg);
}

/// Print section header (cyan bold)
pub fn header(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

/// Print indented detail (no color)
pub fn detail(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("  {}", msg);
}

/// Print plain output (no color, for values and dumps)
pub fn info(msg: &(impl std::fmt::Display + ?Sized)) {
    println!("{}", msg);
}

/// Renders a node, its properties and its descendants.
///
/// Properties come first as `key = value` leaves, then child nodes.
pub fn node_tree(node: &Node) -> Tree<String> {
    let label = if node.is_root() {
        node.path()
    } else {
        node.name().to_string()
    };
    let properties = node
        .properties()
        .into_iter()
        .map(|(key, value)| Tree::new(format!("{key} = {value}")));
    let children = node.children().iter().map(node_tree).collect::<Vec<_>>();

    Tree::new(label)
        .with_leaves(properties)
        .with_leaves(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Preferences;

    #[test]
    fn given_nested_nodes_when_rendering_then_properties_before_children() {
        let prefs = Preferences::new();
        prefs.root().put("theme", "dark").unwrap();
        prefs.node("server").unwrap().put("timeout", 30).unwrap();

        let rendered = node_tree(&prefs.root()).to_string();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], "/");
        assert!(lines[1].ends_with("theme = \"dark\""));
        assert!(lines[2].ends_with("server"));
        assert!(lines[3].ends_with("timeout = 30"));
    }
}
