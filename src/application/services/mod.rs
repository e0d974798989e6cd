//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem, Codec)
//! but are themselves concrete structs, not traits.

mod persistence;

pub use persistence::{export, read_into, to_map, PersistenceService, ReadOutcome};
