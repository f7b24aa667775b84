//! The controller: one block, its parts, its hooks and its request handling.
//!
//! A [`Controller`] owns exactly one endpoint tree and serializes every read
//! and mutation of it through a single re-entrant tree lock. Requests are
//! handled on their own Tokio tasks; put and post handlers always run with
//! the lock released so they can block or call back into the tree.
//!
//! # Construction
//!
//! [`ControllerBuilder::build`] validates everything up front: the hook map,
//! the parts and their hook bindings, and the endpoint names. The block is
//! populated in a fixed order: `meta`, `health`, the controller's own
//! attributes, its own methods, then each part's attributes and methods in
//! the order parts were added.
//!
//! # Example
//!
//! ```
//! use serde_json::{Map, Value, json};
//! use tessera_controller::hook::{HookId, Reset};
//! use tessera_controller::{Controller, Field, Process, RequestError};
//! use tessera_model::{MethodModel, Request, Response, response_channel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! async fn reset(controller: Controller, _args: Vec<Value>) -> Result<Value, RequestError> {
//!     let contexts = controller.create_part_contexts();
//!     let results = controller
//!         .run_hook(HookId::of::<Reset>(), &contexts, &[], &Map::new())
//!         .await?;
//!     Ok(json!(results))
//! }
//!
//! let process = Process::new("example").unwrap();
//! let controller = Controller::builder("DEV")
//!     .hook::<Reset>()
//!     .method(Field::method("reset", MethodModel::new("reset", "Reset"), reset))
//!     .build(&process)
//!     .unwrap();
//!
//! let (sink, mut responses) = response_channel();
//! controller.handle_request(Request::post(1, ["DEV", "reset"], Map::new(), sink));
//! let response = responses.recv().await.unwrap();
//! assert_eq!(response, Response::Return { id: 1, value: json!({}) });
//! # }
//! ```

use core::cell::RefCell;
use core::fmt;
use core::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use hashbrown::HashMap;
use indexmap::IndexMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde_json::{Map, Value};
use tessera_model::{
    Alarm, AttributeModel, BlockMeta, Get, Meta, ModelError, Path, Post, Put, Request, Subscribe,
    Tree, Unsubscribe, ValidationError,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::context::{HookContext, PartContexts};
use crate::error::{ConstructionError, HookError, RequestError};
use crate::hook::{Hook, HookId};
use crate::part::{Field, Handler, Part};
use crate::process::Process;
use crate::registry::HookRegistry;
use crate::runner::{HookRun, panic_message};

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

const HEALTH: &str = "health";
const HEALTHY: &str = "OK";

/// Descriptor of the built-in `health` attribute.
#[derive(Debug, Clone, Copy)]
struct HealthMeta;

impl Meta for HealthMeta {
    fn typeid(&self) -> &'static str {
        "tessera:core/HealthMeta:1.0"
    }

    fn description(&self) -> &str {
        "Displays OK or an error message"
    }

    fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        match value {
            Value::Null => Ok(Value::from(HEALTHY)),
            Value::String(_) => Ok(value),
            other => Err(ValidationError::InvalidValue {
                typeid: self.typeid(),
                reason: format!("expected a string, got {other}"),
            }),
        }
    }

    fn default_value(&self) -> Value {
        Value::from(HEALTHY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// Everything guarded by the tree lock.
struct State {
    tree: Tree,
    /// Put/post handlers keyed by top-level endpoint name.
    handlers: HashMap<String, Handler>,
    /// Faults reported by parts, least recently set first.
    faults: IndexMap<String, Alarm>,
}

struct ControllerInner {
    mri: String,
    runtime: Handle,
    hooks: HookRegistry,
    parts: IndexMap<String, Arc<dyn Part>>,
    state: ReentrantMutex<RefCell<State>>,
}

/// Orchestrates one block: its tree, parts, hooks and requests.
///
/// Cheap to clone; clones share the same controller.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("mri", &self.inner.mri)
            .field("parts", &self.inner.parts.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Non-owning reference to a [`Controller`], held by its parts.
#[derive(Debug, Clone, Default)]
pub struct WeakController(Weak<ControllerInner>);

impl WeakController {
    /// A reference that never upgrades.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the controller if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Controller> {
        self.0.upgrade().map(|inner| Controller { inner })
    }
}

/// Holds the tree lock and a squash scope until dropped.
///
/// Changes made while the guard lives reach subscribers as one batch per
/// subscriber when the outermost guard is dropped. The guard cannot be held
/// across an `.await` in a spawned task.
#[must_use = "changes are only squashed while the guard is alive"]
pub struct SquashGuard<'a> {
    guard: ReentrantMutexGuard<'a, RefCell<State>>,
}

impl Drop for SquashGuard<'_> {
    fn drop(&mut self) {
        self.guard.borrow_mut().tree.end_squash();
    }
}

impl Controller {
    /// Starts building a controller published under `mri`.
    pub fn builder(mri: impl Into<String>) -> ControllerBuilder {
        ControllerBuilder::new(mri)
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn mri(&self) -> &str {
        &self.inner.mri
    }

    /// Returns a non-owning reference.
    #[must_use]
    pub fn downgrade(&self) -> WeakController {
        WeakController(Arc::downgrade(&self.inner))
    }

    /// Returns the attached part called `name`.
    #[must_use]
    pub fn part(&self, name: &str) -> Option<&Arc<dyn Part>> {
        self.inner.parts.get(name)
    }

    /// Returns part names in attach order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.inner.parts.keys().map(String::as_str)
    }

    /// Returns the name `hook` is declared under, if it is declared.
    #[must_use]
    pub fn hook_name(&self, hook: HookId) -> Option<&str> {
        self.inner.hooks.name_of(hook)
    }

    /// Schedules `future` on this controller's runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.runtime.spawn(future)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut *state)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tree access
    // ─────────────────────────────────────────────────────────────────────

    /// Opens a squash scope that lasts as long as the returned guard.
    pub fn changes_squashed(&self) -> SquashGuard<'_> {
        let guard = self.inner.state.lock();
        guard.borrow_mut().tree.begin_squash();
        SquashGuard { guard }
    }

    /// Serializes whatever `path` (relative to the block root) addresses.
    pub fn get(&self, path: &Path) -> Result<Value, ModelError> {
        self.with_state(|state| state.tree.block().resolve(path))
    }

    /// Validates and stores the value of the attribute at `path`.
    pub fn set_attribute_value(&self, path: &Path, value: Value) -> Result<(), ModelError> {
        self.with_state(|state| state.tree.set_value(path, value))
    }

    /// Stores the alarm of the attribute at `path`.
    pub fn set_attribute_alarm(&self, path: &Path, alarm: Alarm) -> Result<(), ModelError> {
        self.with_state(|state| state.tree.set_alarm(path, alarm))
    }

    /// Records `part`'s fault, or clears it when `alarm` is `None`, and
    /// republishes `health` as one squashed change.
    ///
    /// `health` shows the message and alarm of the most severe fault. Among
    /// equally severe faults the most recently set wins. With no faults it
    /// reads `"OK"` with no alarm.
    pub fn set_health(&self, part: &str, alarm: Option<Alarm>) {
        let _squashed = self.changes_squashed();
        self.with_state(|state| {
            state.faults.shift_remove(part);
            if let Some(alarm) = alarm {
                state.faults.insert(part.to_owned(), alarm);
            }
            let worst = state.faults.values().reduce(|worst, alarm| {
                if alarm.severity >= worst.severity {
                    alarm
                } else {
                    worst
                }
            });
            let (message, alarm) = match worst {
                Some(alarm) => (alarm.message.clone(), alarm.clone()),
                None => (HEALTHY.to_owned(), Alarm::ok()),
            };

            let updated = state.tree.set_value_alarm(
                &Path::from(HEALTH),
                Value::String(message),
                alarm,
            );
            if let Err(err) = updated {
                tracing::error!(mri = %self.inner.mri, part, error = %err, "health not updated");
            }
        });
    }

    pub(crate) fn clear_subscriptions(&self) {
        self.with_state(|state| state.tree.clear_subscriptions());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────

    /// Handles `request` on a new task. Never blocks the caller.
    ///
    /// Every failure, including a panicking handler, becomes an error
    /// response on the request's sink.
    pub fn handle_request(&self, request: Request) -> JoinHandle<()> {
        let controller = self.clone();
        self.spawn(async move {
            controller.run_handler(request).await;
        })
    }

    /// Dispatches `request` and sends its response. Returns `false` if the
    /// request failed and an error response was sent.
    pub(crate) async fn run_handler(&self, request: Request) -> bool {
        let outcome = AssertUnwindSafe(self.dispatch(&request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RequestError::Unexpected(panic_message(&*panic))));

        match outcome {
            Ok(Some(value)) => {
                if !request.respond_with_return(value) {
                    tracing::debug!(mri = %self.inner.mri, id = request.id(), "caller gone");
                }
                true
            }
            Ok(None) => true,
            Err(err) => {
                tracing::error!(
                    mri = %self.inner.mri,
                    kind = request.kind(),
                    id = request.id(),
                    error = %err,
                    "request failed"
                );
                request.respond_with_error(err.to_string());
                false
            }
        }
    }

    /// Routes a request. `None` means the response was already sent.
    async fn dispatch(&self, request: &Request) -> Result<Option<Value>, RequestError> {
        match request {
            Request::Get(get) => self.handle_get(get).map(Some),
            Request::Put(put) => self.handle_put(put).await.map(Some),
            Request::Post(post) => self.handle_post(post).await.map(Some),
            Request::Subscribe(subscribe) => self.handle_subscribe(subscribe).map(|()| None),
            Request::Unsubscribe(unsubscribe) => {
                self.handle_unsubscribe(unsubscribe).map(|()| None)
            }
        }
    }

    fn handle_get(&self, get: &Get) -> Result<Value, RequestError> {
        Ok(self.with_state(|state| state.tree.resolve(&get.path))?)
    }

    async fn handle_put(&self, put: &Put) -> Result<Value, RequestError> {
        let (value, handler) = self.with_state(|state| -> Result<_, RequestError> {
            let path = state.tree.block_path(&put.path)?;
            let name = match path.segments() {
                [name] => name.as_str(),
                [name, field] if field == "value" => name.as_str(),
                _ => return Err(ModelError::NotFound(put.path.clone()).into()),
            };
            let attribute = state.tree.block().attribute(&Path::from(name))?;
            if !attribute.is_writeable() {
                return Err(ValidationError::NotWriteable(name.to_owned()).into());
            }
            let value = attribute.meta().validate(put.value.clone())?;
            match state.handlers.get(name) {
                Some(Handler::Put(handler)) => Ok((value, Arc::clone(handler))),
                _ => Err(ValidationError::NotWriteable(name.to_owned()).into()),
            }
        })?;

        handler(self.clone(), value).await
    }

    async fn handle_post(&self, post: &Post) -> Result<Value, RequestError> {
        let (method, args, handler) = self.with_state(|state| -> Result<_, RequestError> {
            let path = state.tree.block_path(&post.path)?;
            let [name] = path.segments() else {
                return Err(ModelError::NotFound(post.path.clone()).into());
            };
            let method = state.tree.block().method(&path)?;
            if !method.is_writeable() {
                return Err(ValidationError::NotWriteable(name.clone()).into());
            }
            let args = method.prepare_call_args(&post.parameters)?;
            match state.handlers.get(name) {
                Some(Handler::Post(handler)) => Ok((method.clone(), args, Arc::clone(handler))),
                _ => Err(ValidationError::NotWriteable(name.clone()).into()),
            }
        })?;

        let result = handler(self.clone(), args).await?;
        Ok(method.validate_result(result)?)
    }

    fn handle_subscribe(&self, subscribe: &Subscribe) -> Result<(), RequestError> {
        Ok(self.with_state(|state| state.tree.handle_subscribe(subscribe.clone()))?)
    }

    fn handle_unsubscribe(&self, unsubscribe: &Unsubscribe) -> Result<(), RequestError> {
        Ok(self.with_state(|state| state.tree.handle_unsubscribe(unsubscribe))?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Hooks
    // ─────────────────────────────────────────────────────────────────────

    /// Creates one fresh cancellable context per attached part.
    ///
    /// The caller owns them for as long as its lifecycle sequence lasts and
    /// may reuse them across several hook runs.
    #[must_use]
    pub fn create_part_contexts(&self) -> PartContexts {
        PartContexts::from_parts(self.inner.parts.keys().map(String::as_str))
    }

    /// Starts every part function bound to `hook` and returns without
    /// waiting.
    ///
    /// `args` are passed positionally to every function; `params` are
    /// filtered per function down to the names it declares. All arguments
    /// are validated before any function starts.
    ///
    /// # Errors
    ///
    /// [`HookError::UndeclaredHook`] if this controller does not declare
    /// `hook`, [`HookError::MissingContext`] if `contexts` lacks a
    /// participating part, and [`HookError::Validation`] for bad parameters.
    pub fn start_hook(
        &self,
        hook: HookId,
        contexts: &PartContexts,
        args: &[Value],
        params: &Map<String, Value>,
    ) -> Result<HookRun, HookError> {
        let Some(hook_name) = self.inner.hooks.name_of(hook) else {
            return Err(HookError::UndeclaredHook(hook.type_name()));
        };
        let hooked = self.inner.hooks.find_hooked_functions(hook);

        let mut participants = Vec::with_capacity(hooked.len());
        for (part, binding) in hooked {
            let context = contexts.get(part).ok_or_else(|| HookError::MissingContext {
                part: part.to_owned(),
            })?;
            let call_args = binding.call_args(args, params)?;
            participants.push((part, binding, context, call_args));
        }

        let (queue, completions) = mpsc::unbounded_channel();
        let mut runners = IndexMap::with_capacity(participants.len());
        for (part, binding, context, call_args) in participants {
            let hook_context = HookContext::new(part, context.child_token(), self.downgrade());
            let runner = binding.make_hook_runner(self, queue.clone(), hook_context, call_args);
            runners.insert(part.to_owned(), runner);
        }

        tracing::debug!(
            mri = %self.inner.mri,
            hook = hook_name,
            parts = ?runners.keys().collect::<Vec<_>>(),
            "hook started"
        );
        Ok(HookRun::new(hook, completions, runners))
    }

    /// Waits for a run started by [`start_hook`](Self::start_hook).
    ///
    /// See [`HookRun::wait`] for the failure policy.
    pub async fn wait_hook(&self, run: HookRun) -> Result<IndexMap<String, Value>, HookError> {
        let hook = run.hook();
        let result = run.wait().await;
        match &result {
            Ok(results) => tracing::debug!(
                mri = %self.inner.mri,
                hook = %hook,
                parts = results.len(),
                "hook finished"
            ),
            Err(err) => tracing::debug!(
                mri = %self.inner.mri,
                hook = %hook,
                error = %err,
                "hook failed"
            ),
        }
        result
    }

    /// [`start_hook`](Self::start_hook) followed by
    /// [`wait_hook`](Self::wait_hook).
    pub async fn run_hook(
        &self,
        hook: HookId,
        contexts: &PartContexts,
        args: &[Value],
        params: &Map<String, Value>,
    ) -> Result<IndexMap<String, Value>, HookError> {
        let run = self.start_hook(hook, contexts, args, params)?;
        self.wait_hook(run).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControllerBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    mri: String,
    description: String,
    hooks: Vec<(HookId, String)>,
    attributes: Vec<Field>,
    methods: Vec<Field>,
    parts: Vec<Arc<dyn Part>>,
}

impl ControllerBuilder {
    /// Creates a builder for a controller published under `mri`.
    pub fn new(mri: impl Into<String>) -> Self {
        Self {
            mri: mri.into(),
            description: String::new(),
            hooks: Vec::new(),
            attributes: Vec::new(),
            methods: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Sets the block description published in `meta`.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares hook `H` under its default name.
    #[must_use]
    pub fn hook<H: Hook>(self) -> Self {
        self.hook_named::<H>(H::NAME)
    }

    /// Declares hook `H` under `name`.
    #[must_use]
    pub fn hook_named<H: Hook>(mut self, name: impl Into<String>) -> Self {
        self.hooks.push((HookId::of::<H>(), name.into()));
        self
    }

    /// Adds one of the controller's own attributes.
    #[must_use]
    pub fn attribute(mut self, field: Field) -> Self {
        self.attributes.push(field);
        self
    }

    /// Adds one of the controller's own methods.
    #[must_use]
    pub fn method(mut self, field: Field) -> Self {
        self.methods.push(field);
        self
    }

    /// Adds a part.
    #[must_use]
    pub fn part(self, part: impl Part) -> Self {
        self.shared_part(Arc::new(part))
    }

    /// Adds a part the caller keeps a handle to.
    #[must_use]
    pub fn shared_part(mut self, part: Arc<dyn Part>) -> Self {
        self.parts.push(part);
        self
    }

    /// Validates, builds and registers the controller with `process`.
    ///
    /// # Errors
    ///
    /// Any [`ConstructionError`]. Nothing is registered on failure.
    pub fn build(self, process: &Process) -> Result<Controller, ConstructionError> {
        let Self {
            mri,
            description,
            hooks: declared,
            attributes,
            methods,
            parts: added,
        } = self;

        let mut hooks = HookRegistry::new();
        for (hook, name) in declared {
            hooks.declare(hook, name)?;
        }

        let mut parts: IndexMap<String, Arc<dyn Part>> = IndexMap::with_capacity(added.len());
        for part in added {
            let name = part.name().to_owned();
            if parts.contains_key(&name) {
                return Err(ConstructionError::DuplicatePart(name));
            }
            hooks.register_part(&name, part.hooks())?;
            parts.insert(name, part);
        }

        let mut fields = vec![
            Field::meta(BlockMeta::new(description)),
            Field::attribute(HEALTH, AttributeModel::new(HealthMeta)),
        ];
        fields.extend(attributes);
        fields.extend(methods);
        for part in parts.values() {
            fields.extend(part.create_attributes());
            fields.extend(part.create_methods());
        }

        let mut tree = Tree::new(mri.clone());
        let mut handlers = HashMap::new();
        for field in fields {
            let (name, endpoint, handler) = field.into_parts();
            if tree.block().contains(&name) {
                return Err(ConstructionError::DuplicateEndpoint(name));
            }
            tree.set_endpoint(name.clone(), endpoint);
            if let Some(handler) = handler {
                handlers.insert(name, handler);
            }
        }

        let controller = Controller {
            inner: Arc::new(ControllerInner {
                mri,
                runtime: process.runtime().clone(),
                hooks,
                parts,
                state: ReentrantMutex::new(RefCell::new(State {
                    tree,
                    handlers,
                    faults: IndexMap::new(),
                })),
            }),
        };

        for part in controller.inner.parts.values() {
            part.core().attach_to_controller(controller.downgrade())?;
        }

        process
            .add_controller(controller.clone())
            .map_err(|_| ConstructionError::DuplicateController(controller.mri().to_owned()))?;

        tracing::info!(
            mri = %controller.inner.mri,
            parts = controller.inner.parts.len(),
            hooks = controller.inner.hooks.hooks().count(),
            "controller built"
        );
        Ok(controller)
    }
}
