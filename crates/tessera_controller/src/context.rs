//! Cancellable execution contexts for parts.
//!
//! A [`PartContext`] is created per part by
//! [`Controller::create_part_contexts`] and owned by whoever drives a
//! lifecycle sequence. Every hook run derives a child token from it for each
//! participating runner, so stopping a `PartContext` stops that part's work
//! in every run using it, while a run stopping its own runners leaves the
//! part contexts usable for the next run.
//!
//! Cancellation is advisory. Hook functions observe it through
//! [`HookContext`] at their own suspension points; a function that never
//! checks simply runs to completion.

use core::time::Duration;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::controller::{Controller, WeakController};
use crate::error::HookError;

/// Cancellation handle for one part across a lifecycle sequence.
#[derive(Debug, Clone)]
pub struct PartContext {
    part: String,
    token: CancellationToken,
}

impl PartContext {
    /// Creates a fresh, uncancelled context.
    #[must_use]
    pub fn new(part: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            token: CancellationToken::new(),
        }
    }

    /// Returns the part name.
    #[must_use]
    pub fn part(&self) -> &str {
        &self.part
    }

    /// Asks every hook function running under this context to stop.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// One [`PartContext`] per attached part, keyed by part name.
#[derive(Debug, Clone, Default)]
pub struct PartContexts {
    contexts: IndexMap<String, PartContext>,
}

impl PartContexts {
    pub(crate) fn from_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            contexts: parts
                .into_iter()
                .map(|part| (part.to_owned(), PartContext::new(part)))
                .collect(),
        }
    }

    /// Returns the context for `part`.
    #[must_use]
    pub fn get(&self, part: &str) -> Option<&PartContext> {
        self.contexts.get(part)
    }

    /// Iterates over contexts in attach order.
    pub fn iter(&self) -> impl Iterator<Item = &PartContext> {
        self.contexts.values()
    }

    /// Returns the number of contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if there are no contexts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Stops every part, as an abort of the whole sequence.
    pub fn stop_all(&self) {
        for context in self.contexts.values() {
            context.stop();
        }
    }
}

/// What a hook function receives: its part's name, a cancellation token for
/// this run, and the controller it runs under.
///
/// The controller is held weakly. A runner left detached after an abort does
/// not keep a shut-down controller alive.
#[derive(Debug, Clone)]
pub struct HookContext {
    part: String,
    token: CancellationToken,
    controller: WeakController,
}

impl HookContext {
    pub(crate) fn new(
        part: impl Into<String>,
        token: CancellationToken,
        controller: WeakController,
    ) -> Self {
        Self {
            part: part.into(),
            token,
            controller,
        }
    }

    /// Returns the name of the part this function belongs to.
    #[must_use]
    pub fn part(&self) -> &str {
        &self.part
    }

    /// Returns the owning controller, or `None` once it has been dropped.
    #[must_use]
    pub fn controller(&self) -> Option<Controller> {
        self.controller.upgrade()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once this runner has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this runner has been asked to stop.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns [`HookError::Aborted`] if this runner has been asked to stop.
    pub fn check_cancelled(&self) -> Result<(), HookError> {
        if self.is_cancelled() {
            return Err(HookError::aborted(format!("{} stopped", self.part)));
        }
        Ok(())
    }

    /// Sleeps for `duration`, or returns [`HookError::Aborted`] as soon as
    /// this runner is asked to stop.
    pub async fn sleep(&self, duration: Duration) -> Result<(), HookError> {
        tokio::select! {
            () = self.token.cancelled() => {
                Err(HookError::aborted(format!("{} stopped while sleeping", self.part)))
            }
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
