//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};

use crate::infrastructure::Format;

/// Hierarchical preferences store: inspect and edit a persisted preferences file
#[derive(Parser, Debug)]
#[command(name = "preftree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Preferences file (default: ~/.preftree/preferences/default.<ext>)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    /// Format of the preferences file
    #[arg(long, global = true, value_enum)]
    pub format: Option<Format>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a value, e.g. `server.timeout`
    Get {
        /// Dotted reference: node path segments joined by '.', key last
        path: String,
    },

    /// Store a value
    Set {
        /// Dotted reference: node path segments joined by '.', key last
        path: String,
        /// Value to store
        value: String,
        /// How to interpret the value
        #[arg(short, long, value_enum, default_value_t = ValueKind::Text)]
        kind: ValueKind,
    },

    /// Remove a value
    Unset {
        /// Dotted reference: node path segments joined by '.', key last
        path: String,
    },

    /// Show nodes and values as a tree
    Tree {
        /// Node path (default: root)
        path: Option<String>,
    },

    /// Print the whole file, optionally converted to another format
    Dump {
        /// Output format (default: the file's format)
        #[arg(long, value_enum)]
        to: Option<Format>,
    },

    /// Merge another preferences file into this one; imported values win
    Import {
        /// File to import
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Format of the imported file (default: from its extension)
        #[arg(long, value_enum)]
        from: Option<Format>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Print a commented config template
    Template,
    /// Show config and preferences file locations
    Path,
}

/// Interpretation of a value given on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Int,
    Float,
    Bool,
}
