//! Hook bindings, runners and the fan-in of a hook run.
//!
//! A part exposes its lifecycle behavior as [`HookBinding`]s. When a hook is
//! started, each participating binding becomes a [`HookRunner`]: a Tokio task
//! that calls the bound function and posts exactly one
//! `(part, outcome)` message on the run's completion channel. The resulting
//! [`HookRun`] is then waited on with [`HookRun::wait`].
//!
//! # Failure policy
//!
//! - An abort outcome is returned at once. The other runners are neither
//!   stopped nor joined, because whoever raised the abort is already
//!   stopping them.
//! - Any other error stops every remaining runner, joins them all, and is
//!   then returned. Later outcomes are discarded.
//! - Otherwise each runner is joined as it reports, and the run yields
//!   `{part name: result}` in completion order.

use core::any::Any;
use core::fmt;
use core::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tessera_model::{MapMeta, MethodModel, ValidationError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::HookContext;
use crate::controller::Controller;
use crate::error::HookError;
use crate::hook::{Hook, HookId};

/// Future returned by a hook function.
pub type HookFuture = BoxFuture<'static, Result<Value, HookError>>;

/// Type-erased hook function: context plus positional arguments.
pub type HookFn = Arc<dyn Fn(HookContext, Vec<Value>) -> HookFuture + Send + Sync>;

/// One `(part, outcome)` message on a run's completion channel.
pub type HookOutcome = (String, Result<Value, HookError>);

/// Sending half of a run's completion channel.
pub type CompletionSender = mpsc::UnboundedSender<HookOutcome>;

/// Receiving half of a run's completion channel.
pub type CompletionQueue = mpsc::UnboundedReceiver<HookOutcome>;

// ─────────────────────────────────────────────────────────────────────────────
// HookBinding
// ─────────────────────────────────────────────────────────────────────────────

/// A part function bound to a hook.
///
/// The binding's [`MethodModel`] declares which named parameters the function
/// accepts. Parameters passed to a hook run that the function does not
/// declare are dropped for this binding, so one run can pass a superset of
/// parameters to parts with different signatures.
///
/// # Example
///
/// ```
/// use serde_json::Value;
/// use tessera_controller::hook::Configure;
/// use tessera_controller::{HookBinding, HookContext, HookError};
/// use tessera_model::{MapMeta, NumberMeta, NumberType};
///
/// async fn configure(ctx: HookContext, args: Vec<Value>) -> Result<Value, HookError> {
///     ctx.check_cancelled()?;
///     Ok(args.into_iter().next().unwrap_or(Value::Null))
/// }
///
/// let binding = HookBinding::new::<Configure, _, _>("configure", configure)
///     .with_takes(MapMeta::new().required("exposure", NumberMeta::new(NumberType::Float64, "s")));
/// assert_eq!(binding.func_name(), "configure");
/// ```
#[derive(Clone)]
pub struct HookBinding {
    hook: HookId,
    func_name: String,
    takes: MethodModel,
    func: HookFn,
}

impl fmt::Debug for HookBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBinding")
            .field("hook", &self.hook)
            .field("func_name", &self.func_name)
            .finish_non_exhaustive()
    }
}

impl HookBinding {
    /// Binds `func` to hook `H`. The function takes no named parameters
    /// until [`with_takes`](Self::with_takes) is called.
    pub fn new<H, F, Fut>(func_name: impl Into<String>, func: F) -> Self
    where
        H: Hook,
        F: Fn(HookContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HookError>> + Send + 'static,
    {
        let func_name = func_name.into();
        Self {
            hook: HookId::of::<H>(),
            takes: MethodModel::new(func_name.clone(), ""),
            func_name,
            func: Arc::new(move |ctx, args| func(ctx, args).boxed()),
        }
    }

    /// Declares the named parameters the function accepts.
    #[must_use]
    pub fn with_takes(mut self, takes: MapMeta) -> Self {
        self.takes = self.takes.with_takes(takes);
        self
    }

    /// Declares a default for an optional parameter.
    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, value: Value) -> Self {
        self.takes = self.takes.with_default(name, value);
        self
    }

    /// Returns the hook this function is bound to.
    #[must_use]
    pub fn hook(&self) -> HookId {
        self.hook
    }

    /// Returns the function name.
    #[must_use]
    pub fn func_name(&self) -> &str {
        &self.func_name
    }

    /// Returns the descriptor of accepted parameters.
    #[must_use]
    pub fn takes(&self) -> &MethodModel {
        &self.takes
    }

    /// Builds the positional arguments for one call: `args` followed by the
    /// declared parameters prepared from `params`.
    pub fn call_args(
        &self,
        args: &[Value],
        params: &Map<String, Value>,
    ) -> Result<Vec<Value>, ValidationError> {
        let filtered: Map<String, Value> = params
            .iter()
            .filter(|(name, _)| self.takes.takes().contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let mut call_args = args.to_vec();
        call_args.extend(self.takes.prepare_call_args(&filtered)?);
        Ok(call_args)
    }

    /// Starts the function on `controller`'s runtime as a runner that
    /// reports on `queue`.
    ///
    /// `call_args` come from [`call_args`](Self::call_args), prepared before
    /// any runner of the run is started.
    pub(crate) fn make_hook_runner(
        &self,
        controller: &Controller,
        queue: CompletionSender,
        context: HookContext,
        call_args: Vec<Value>,
    ) -> HookRunner {
        let part = context.part().to_owned();
        let token = context.token().clone();
        let func = Arc::clone(&self.func);

        let reporter = part.clone();
        let handle = controller.spawn(async move {
            let call = async move { func(context, call_args).await };
            let outcome = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(HookError::Panicked {
                    part: reporter.clone(),
                    message: panic_message(&*panic),
                }),
            };
            if queue.send((reporter, outcome)).is_err() {
                tracing::debug!("hook run dropped before runner reported");
            }
        });

        HookRunner {
            part,
            handle,
            token,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookRunner
// ─────────────────────────────────────────────────────────────────────────────

/// A running hook function for one part.
#[derive(Debug)]
pub struct HookRunner {
    part: String,
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl HookRunner {
    /// Returns the part name.
    #[must_use]
    pub fn part(&self) -> &str {
        &self.part
    }

    /// Asks the function to stop. Advisory: the function must observe it.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the runner task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the runner task to terminate.
    pub async fn wait(self) {
        if let Err(err) = self.handle.await {
            tracing::warn!(part = %self.part, error = %err, "hook runner did not complete");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookRun
// ─────────────────────────────────────────────────────────────────────────────

/// One fan-out of a hook across its participating parts.
///
/// Returned by [`Controller::start_hook`](crate::Controller::start_hook) and
/// consumed by [`wait`](Self::wait).
#[derive(Debug)]
pub struct HookRun {
    hook: HookId,
    queue: CompletionQueue,
    runners: IndexMap<String, HookRunner>,
}

impl HookRun {
    pub(crate) fn new(
        hook: HookId,
        queue: CompletionQueue,
        runners: IndexMap<String, HookRunner>,
    ) -> Self {
        Self {
            hook,
            queue,
            runners,
        }
    }

    /// Returns the hook being run.
    #[must_use]
    pub fn hook(&self) -> HookId {
        self.hook
    }

    /// Returns the names of parts whose runners have not reported yet.
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.runners.keys().map(String::as_str)
    }

    /// Returns `true` if no runners are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Asks every outstanding runner to stop.
    pub fn stop_all(&self) {
        for runner in self.runners.values() {
            runner.stop();
        }
    }

    /// Drains the completion channel until every runner has reported.
    pub async fn wait(mut self) -> Result<IndexMap<String, Value>, HookError> {
        let mut results = IndexMap::new();
        while !self.runners.is_empty() {
            let Some((part, outcome)) = self.queue.recv().await else {
                return Err(HookError::Unexpected(format!(
                    "completion channel closed with {} runners outstanding",
                    self.runners.len()
                )));
            };
            let Some(runner) = self.runners.shift_remove(&part) else {
                tracing::warn!(part = %part, "outcome from unknown runner");
                continue;
            };

            match outcome {
                Err(err) if err.is_abort() => {
                    tracing::debug!(
                        part = %part,
                        hook = %self.hook,
                        "aborted, not waiting on the rest"
                    );
                    return Err(err);
                }
                Err(err) => {
                    runner.wait().await;
                    tracing::debug!(
                        part = %part,
                        hook = %self.hook,
                        error = %err,
                        stopping = ?self.runners.keys().collect::<Vec<_>>(),
                        "part failed"
                    );
                    self.stop_all();
                    for (_, runner) in self.runners.drain(..) {
                        runner.wait().await;
                    }
                    return Err(err);
                }
                Ok(value) => {
                    runner.wait().await;
                    tracing::debug!(
                        part = %part,
                        hook = %self.hook,
                        waiting = ?self.runners.keys().collect::<Vec<_>>(),
                        "part returned"
                    );
                    results.insert(part, value);
                }
            }
        }
        Ok(results)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
