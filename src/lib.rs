//! A controller runtime that composes addressable blocks out of pluggable
//! parts and coordinates their lifecycle hooks concurrently.

pub use tessera_controller;
pub use tessera_core;
pub use tessera_model;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use tessera_controller::prelude::*;
    pub use tessera_core::prelude::*;
    pub use tessera_model::prelude::*;
}
