//! Shared infrastructure for Tessera.
//!
//! Currently this is the tracing setup used by processes hosting
//! controllers. Library crates only emit `tracing` events; installing a
//! subscriber is left to the binary, usually through [`TracingConfig`].

mod tracing_config;

pub use tracing_config::{TracingConfig, TracingFormat};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::tracing_config::{TracingConfig, TracingFormat};
}
