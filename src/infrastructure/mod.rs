//! Infrastructure layer: I/O implementations and DI container
//!
//! This layer implements I/O boundary traits and wires up services.

pub mod codec;
pub mod di;
pub mod error;
pub mod traits;

pub use codec::{Format, JsonCodec, TomlCodec, YamlCodec};
pub use error::{InfraError, InfraResult};
