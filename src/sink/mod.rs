//! Writer-facing entry point: parse, filter, modify, submit

pub mod filters;
pub mod layer;
pub mod modifiers;
pub mod writer;

pub use filters::{Filter, FilterChain, Level, LevelFilter, DEFAULT_LEVEL_KEY};
pub use layer::SinkLayer;
pub use modifiers::{Modifier, ModifierChain, RemapLevel, RenameField};
pub use writer::{Sink, SinkBuilder};
