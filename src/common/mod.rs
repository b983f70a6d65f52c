// src/common/mod.rs
// Shared configuration records and error types
pub mod errors;
pub mod item;

// Re-export specific items to simplify imports elsewhere
pub use errors::{ConfigError, ConsumerError, ForwardError, MappingError};
pub use item::{Item, PairEntry};
