//! Parts: pluggable units of behavior attached to one controller.
//!
//! A part contributes endpoints to its controller's block through
//! [`Part::create_attributes`] and [`Part::create_methods`], and lifecycle
//! behavior through [`Part::hooks`]. It owns no tree node itself.
//!
//! # Example
//!
//! ```
//! use serde_json::Value;
//! use tessera_controller::hook::Reset;
//! use tessera_controller::{Field, HookBinding, HookContext, HookError, Part, PartCore};
//! use tessera_model::{AttributeModel, NumberMeta, NumberType};
//!
//! struct Motor {
//!     core: PartCore,
//! }
//!
//! async fn home(ctx: HookContext, _args: Vec<Value>) -> Result<Value, HookError> {
//!     ctx.check_cancelled()?;
//!     Ok(Value::Null)
//! }
//!
//! impl Part for Motor {
//!     fn core(&self) -> &PartCore {
//!         &self.core
//!     }
//!
//!     fn create_attributes(&self) -> Vec<Field> {
//!         vec![Field::settable(
//!             "position",
//!             AttributeModel::new(NumberMeta::new(NumberType::Float64, "Position")),
//!         )]
//!     }
//!
//!     fn hooks(&self) -> Vec<HookBinding> {
//!         vec![HookBinding::new::<Reset, _, _>("home", home)]
//!     }
//! }
//! ```

use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tessera_model::{Alarm, AttributeModel, BlockMeta, BlockModel, Endpoint, MethodModel, Path};
use tokio::task::JoinHandle;

use crate::controller::{Controller, WeakController};
use crate::error::{ConstructionError, RequestError};
use crate::runner::HookBinding;

/// Result of a put or post handler.
pub type HandlerResult = Result<Value, RequestError>;

/// Handles a write to an attribute. Receives the already validated value.
pub type PutHandler =
    Arc<dyn Fn(Controller, Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Handles a method call. Receives positional arguments in declared order.
pub type PostHandler =
    Arc<dyn Fn(Controller, Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Write function registered alongside an endpoint.
#[derive(Clone)]
pub enum Handler {
    /// For writeable attributes.
    Put(PutHandler),
    /// For methods.
    Post(PostHandler),
}

// ─────────────────────────────────────────────────────────────────────────────
// Field
// ─────────────────────────────────────────────────────────────────────────────

/// One `(name, endpoint, handler)` contribution to a block.
pub struct Field {
    name: String,
    endpoint: Endpoint,
    handler: Option<Handler>,
}

impl Field {
    /// A read-only attribute.
    pub fn attribute(name: impl Into<String>, attribute: AttributeModel) -> Self {
        Self {
            name: name.into(),
            endpoint: attribute.into(),
            handler: None,
        }
    }

    /// A writeable attribute whose writes go to `handler`.
    pub fn writeable<F, Fut>(
        name: impl Into<String>,
        attribute: AttributeModel,
        handler: F,
    ) -> Self
    where
        F: Fn(Controller, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            endpoint: attribute.writeable(true).into(),
            handler: Some(Handler::Put(Arc::new(move |controller, value| {
                handler(controller, value).boxed()
            }))),
        }
    }

    /// A writeable attribute whose writes are stored as its new value.
    pub fn settable(name: impl Into<String>, attribute: AttributeModel) -> Self {
        let name = name.into();
        let path = Path::from(name.as_str());
        Self::writeable(name, attribute, move |controller, value| {
            let path = path.clone();
            async move {
                controller.set_attribute_value(&path, value)?;
                Ok::<Value, RequestError>(Value::Null)
            }
        })
    }

    /// A method whose calls go to `handler`.
    pub fn method<F, Fut>(name: impl Into<String>, method: MethodModel, handler: F) -> Self
    where
        F: Fn(Controller, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            endpoint: method.into(),
            handler: Some(Handler::Post(Arc::new(move |controller, args| {
                handler(controller, args).boxed()
            }))),
        }
    }

    /// A nested, read-only block.
    pub fn block(name: impl Into<String>, block: BlockModel) -> Self {
        Self {
            name: name.into(),
            endpoint: block.into(),
            handler: None,
        }
    }

    /// The block's own descriptor, always named `meta`.
    #[must_use]
    pub fn meta(meta: BlockMeta) -> Self {
        Self {
            name: "meta".to_owned(),
            endpoint: meta.into(),
            handler: None,
        }
    }

    /// Returns the endpoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn into_parts(self) -> (String, Endpoint, Option<Handler>) {
        (self.name, self.endpoint, self.handler)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PartCore
// ─────────────────────────────────────────────────────────────────────────────

/// State every part carries: its name and a one-time link to its controller.
///
/// The link is weak, so a part never keeps its controller alive.
#[derive(Debug)]
pub struct PartCore {
    name: String,
    controller: OnceLock<WeakController>,
}

impl PartCore {
    /// Creates an unattached core.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            controller: OnceLock::new(),
        }
    }

    /// Returns the part name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Links this part to `controller`.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::AlreadyAttached`] on a second call.
    pub fn attach_to_controller(
        &self,
        controller: WeakController,
    ) -> Result<(), ConstructionError> {
        self.controller
            .set(controller)
            .map_err(|_| ConstructionError::AlreadyAttached(self.name.clone()))
    }

    /// Returns the controller, if attached and still alive.
    #[must_use]
    pub fn controller(&self) -> Option<Controller> {
        self.controller.get().and_then(WeakController::upgrade)
    }

    /// Reports this part's fault (or its absence) to the controller's health
    /// aggregation.
    pub fn set_health(&self, alarm: Option<Alarm>) {
        match self.controller() {
            Some(controller) => controller.set_health(&self.name, alarm),
            None => tracing::warn!(part = %self.name, "set_health on a detached part"),
        }
    }

    /// Schedules `future` on the controller's runtime.
    ///
    /// Returns `None` if the part is not attached.
    pub fn spawn<F>(&self, future: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let Some(controller) = self.controller() else {
            tracing::warn!(part = %self.name, "spawn on a detached part");
            return None;
        };
        Some(controller.spawn(future))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Part Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A pluggable unit of behavior.
///
/// Everything here is evaluated once, while the controller is built.
pub trait Part: Send + Sync + 'static {
    /// Returns the part's shared state.
    fn core(&self) -> &PartCore;

    /// Returns the part name, unique within its controller.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Attributes this part adds to the block.
    fn create_attributes(&self) -> Vec<Field> {
        Vec::new()
    }

    /// Methods this part adds to the block.
    fn create_methods(&self) -> Vec<Field> {
        Vec::new()
    }

    /// Functions this part binds to lifecycle hooks.
    ///
    /// Hook functions must observe cancellation through their
    /// [`HookContext`](crate::HookContext) at their own suspension points;
    /// the controller cannot interrupt them.
    fn hooks(&self) -> Vec<HookBinding> {
        Vec::new()
    }
}
