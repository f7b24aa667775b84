//! Parts, lifecycle hooks, controllers and the process registry for Tessera
//! (Layer 2).
//!
//! A [`Controller`] publishes one block of endpoints built from its own
//! fields and from the [`Part`]s attached to it. Parts also bind functions to
//! lifecycle [hooks](hook), which the controller runs concurrently across
//! parts with a shared failure policy.
//!
//! # Core Concepts
//!
//! - [`Part`] / [`PartCore`] - Pluggable units contributing endpoints and hooks
//! - [`HookId`] / [`Hook`] - Type-identity hooks such as [`hook::Reset`]
//! - [`HookBinding`] - A part function bound to a hook
//! - [`HookRun`] - One concurrent fan-out of a hook, waited on as a whole
//! - [`PartContexts`] / [`HookContext`] - Cooperative cancellation
//! - [`Process`] - Registry and request router for every controller
//!
//! # Example
//!
//! ```
//! use serde_json::{Map, Value, json};
//! use tessera_controller::prelude::*;
//!
//! struct Shutter {
//!     core: PartCore,
//! }
//!
//! async fn close(_ctx: HookContext, _args: Vec<Value>) -> Result<Value, HookError> {
//!     Ok(json!("closed"))
//! }
//!
//! impl Part for Shutter {
//!     fn core(&self) -> &PartCore {
//!         &self.core
//!     }
//!
//!     fn hooks(&self) -> Vec<HookBinding> {
//!         vec![HookBinding::new::<hook::Reset, _, _>("close", close)]
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let process = Process::new("example").unwrap();
//! let controller = Controller::builder("DEV")
//!     .hook::<hook::Reset>()
//!     .part(Shutter { core: PartCore::new("shutter") })
//!     .build(&process)
//!     .unwrap();
//!
//! let contexts = controller.create_part_contexts();
//! let results = controller
//!     .run_hook(HookId::of::<hook::Reset>(), &contexts, &[], &Map::new())
//!     .await
//!     .unwrap();
//! assert_eq!(results["shutter"], json!("closed"));
//! # }
//! ```
//!
//! # Architecture
//!
//! This crate is Layer 2 of Tessera:
//!
//! - **Layer 1** (`tessera_model`): endpoint tree, notifier, protocol
//! - **Layer 2** (`tessera_controller`): parts, hooks, controller, process (this crate)

/// Cancellable execution contexts.
pub mod context;

/// Controllers and their builder.
pub mod controller;

/// Error types.
pub mod error;

/// Hook identities and the standard lifecycle hooks.
pub mod hook;

/// Parts and the fields they contribute.
pub mod part;

/// Process-scoped controller registry.
pub mod process;

/// Declared hooks and part bindings.
pub mod registry;

/// Hook runners and runs.
pub mod runner;

pub use context::{HookContext, PartContext, PartContexts};
pub use controller::{Controller, ControllerBuilder, SquashGuard, WeakController};
pub use error::{ConstructionError, HookError, ProcessError, RequestError};
pub use hook::{Hook, HookId};
pub use part::{Field, Handler, HandlerResult, Part, PartCore, PostHandler, PutHandler};
pub use process::Process;
pub use registry::HookRegistry;
pub use runner::{HookBinding, HookRun, HookRunner};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::context::{HookContext, PartContext, PartContexts};
    pub use crate::controller::{Controller, ControllerBuilder};
    pub use crate::error::{ConstructionError, HookError, ProcessError, RequestError};
    pub use crate::hook::{self, Hook, HookId};
    pub use crate::part::{Field, Part, PartCore};
    pub use crate::process::Process;
    pub use crate::runner::{HookBinding, HookRun};
}
