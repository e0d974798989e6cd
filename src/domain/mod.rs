//! Domain layer: the preferences tree, its values and change events
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod convert;
pub mod error;
pub mod event;
pub mod node;
pub mod path;
pub mod tree;
pub mod value;

pub use convert::{AttributeValue, Converter, ConverterRegistry, NOOP_CONVERTER};
pub use error::{DomainError, DomainResult};
pub use event::{
    ChangeNotifier, ListenerError, ListenerId, NodeChangeEvent, NodeChangeKind,
    NodeChangeListener, PreferenceChangeEvent, PreferenceChangeListener,
};
pub use node::{Node, NodeSnapshot};
pub use path::{parse_dotted, ParsedPath, PATH_SEPARATOR};
pub use tree::Preferences;
pub use value::{Callable, FromPrefValue, PrefValue, ScalarKind};
