//! Hook identities and the standard lifecycle hooks.
//!
//! A hook is one lifecycle extension point (reset, configure, abort...). It is
//! identified by a marker type, not a string: a [`HookId`] wraps the marker's
//! `TypeId`, so two controllers that both declare [`Reset`] agree on what
//! "reset" means even if they publish it under different names.
//!
//! Hooks are layered:
//!
//! - this module defines the identity and a set of standard markers;
//! - a controller declares the hooks it supports, each with a name, via
//!   [`ControllerBuilder::hook`](crate::ControllerBuilder::hook);
//! - parts bind functions to hooks with
//!   [`HookBinding`](crate::HookBinding) and the controller runs them with
//!   [`Controller::run_hook`](crate::Controller::run_hook).
//!
//! # Example
//!
//! ```
//! use tessera_controller::hook::{Hook, HookId};
//!
//! // A controller-specific hook
//! pub struct Seek;
//! impl Hook for Seek {
//!     const NAME: &'static str = "seek";
//! }
//!
//! assert_eq!(HookId::of::<Seek>(), HookId::of::<Seek>());
//! ```

use core::any::TypeId;
use core::fmt;

/// Identifier for a hook, derived from a marker type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId {
    type_id: TypeId,
    type_name: &'static str,
}

impl HookId {
    /// Creates a `HookId` for the given hook marker type.
    #[must_use]
    pub fn of<H: Hook>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            type_name: core::any::type_name::<H>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Marker trait for hook types.
pub trait Hook: 'static {
    /// Name a controller publishes this hook under unless told otherwise.
    const NAME: &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Standard Hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Called once after the controller is built and registered.
pub struct Init;
impl Hook for Init {
    const NAME: &'static str = "init";
}

/// Bring the device back to a known idle state.
pub struct Reset;
impl Hook for Reset {
    const NAME: &'static str = "reset";
}

/// Stop all activity and refuse further work until reset.
pub struct Disable;
impl Hook for Disable {
    const NAME: &'static str = "disable";
}

/// Ask parts to report information for their owner.
pub struct Report;
impl Hook for Report {
    const NAME: &'static str = "report";
}

/// Apply a configuration in preparation for a run.
pub struct Configure;
impl Hook for Configure {
    const NAME: &'static str = "configure";
}

/// Perform the configured work.
pub struct Run;
impl Hook for Run {
    const NAME: &'static str = "run";
}

/// Stop the current run as soon as possible.
pub struct Abort;
impl Hook for Abort {
    const NAME: &'static str = "abort";
}
