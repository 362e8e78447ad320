// Public modules
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod package;
pub mod pipeline;
pub mod project;
pub mod transformer;
pub mod version;
pub mod watch;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
