//! Process-scoped controller registry and request router.
//!
//! A [`Process`] hosts every controller of one program. It owns the Tokio
//! runtime handle controllers spawn on, routes requests to controllers by
//! the first segment of their path, and remembers where each subscription
//! went so a later unsubscribe reaches the same controller.
//!
//! # Example
//!
//! ```
//! use tessera_controller::{Controller, Process};
//! use tessera_model::{Request, Response, response_channel};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let process = Process::new("example").unwrap();
//! Controller::builder("DEV").build(&process).unwrap();
//! assert_eq!(process.mris(), ["DEV"]);
//!
//! let (sink, mut responses) = response_channel();
//! process.handle_request(Request::get(1, ["NOPE"], sink));
//! assert!(matches!(responses.recv().await, Some(Response::Error { id: 1, .. })));
//! # }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tessera_model::{ModelError, Request, ResponseSink};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::controller::Controller;
use crate::error::{ProcessError, RequestError};

/// Where a subscription was routed.
#[derive(Debug)]
struct Route {
    id: u64,
    sink: ResponseSink,
    mri: String,
}

#[derive(Debug)]
struct ProcessInner {
    name: String,
    runtime: Handle,
    controllers: RwLock<IndexMap<String, Controller>>,
    routes: Mutex<Vec<Route>>,
}

/// Registry of the controllers in one program.
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Process {
    inner: Arc<ProcessInner>,
}

impl Process {
    /// Creates a process on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NoRuntime`] outside a runtime.
    pub fn new(name: impl Into<String>) -> Result<Self, ProcessError> {
        let runtime = Handle::try_current().map_err(|_| ProcessError::NoRuntime)?;
        Ok(Self::with_runtime(name, runtime))
    }

    /// Creates a process whose controllers spawn on `runtime`.
    #[must_use]
    pub fn with_runtime(name: impl Into<String>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(ProcessInner {
                name: name.into(),
                runtime,
                controllers: RwLock::new(IndexMap::new()),
                routes: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the process name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the runtime controllers spawn on.
    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Schedules `future` on the process runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.runtime.spawn(future)
    }

    /// Registers `controller` under its mri.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::DuplicateController`] if the mri is taken.
    pub fn add_controller(&self, controller: Controller) -> Result<(), ProcessError> {
        let mri = controller.mri().to_owned();
        let mut controllers = self.inner.controllers.write();
        if controllers.contains_key(&mri) {
            return Err(ProcessError::DuplicateController(mri));
        }
        tracing::info!(process = %self.inner.name, mri = %mri, "controller registered");
        controllers.insert(mri, controller);
        Ok(())
    }

    /// Returns the controller registered under `mri`.
    #[must_use]
    pub fn get_controller(&self, mri: &str) -> Option<Controller> {
        self.inner.controllers.read().get(mri).cloned()
    }

    /// Returns registered mris in registration order.
    #[must_use]
    pub fn mris(&self) -> Vec<String> {
        self.inner.controllers.read().keys().cloned().collect()
    }

    /// Routes `request` to its controller.
    ///
    /// Returns the handling task, or `None` if the request could not be
    /// routed, in which case an error response has already been sent.
    pub fn handle_request(&self, request: Request) -> Option<JoinHandle<()>> {
        match self.route(&request) {
            Ok(controller) => {
                let Request::Subscribe(subscribe) = &request else {
                    return Some(controller.handle_request(request));
                };
                let (id, sink) = (subscribe.id, subscribe.sink.clone());
                let process = self.clone();
                Some(self.spawn(async move {
                    if !controller.run_handler(request).await {
                        process.forget_route(id, &sink);
                    }
                }))
            }
            Err(err) => {
                tracing::warn!(
                    process = %self.inner.name,
                    kind = request.kind(),
                    id = request.id(),
                    error = %err,
                    "request not routed"
                );
                request.respond_with_error(err.to_string());
                None
            }
        }
    }

    /// Returns the number of live subscriptions routed through this process.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let mut routes = self.inner.routes.lock();
        routes.retain(|route| !route.sink.is_closed());
        routes.len()
    }

    fn forget_route(&self, id: u64, sink: &ResponseSink) {
        self.inner
            .routes
            .lock()
            .retain(|route| !(route.id == id && route.sink.same_channel(sink)));
    }

    /// Picks the controller for `request`. A subscribe is recorded before it
    /// is handled so that an unsubscribe sent right after the first update
    /// finds it; a rejected subscribe is forgotten again by its task.
    fn route(&self, request: &Request) -> Result<Controller, RequestError> {
        self.inner
            .routes
            .lock()
            .retain(|route| !route.sink.is_closed());
        let mri = match request {
            Request::Unsubscribe(unsubscribe) => {
                let mut routes = self.inner.routes.lock();
                let index = routes
                    .iter()
                    .position(|route| {
                        route.id == unsubscribe.id && route.sink.same_channel(&unsubscribe.sink)
                    })
                    .ok_or(ModelError::UnknownSubscription(unsubscribe.id))?;
                routes.remove(index).mri
            }
            other => other
                .path()
                .and_then(|path| path.first())
                .unwrap_or_default()
                .to_owned(),
        };

        let controller = self
            .get_controller(&mri)
            .ok_or_else(|| RequestError::UnknownController(mri.clone()))?;
        if let Request::Subscribe(subscribe) = request {
            self.inner.routes.lock().push(Route {
                id: subscribe.id,
                sink: subscribe.sink.clone(),
                mri,
            });
        }
        Ok(controller)
    }

    /// Drops every controller and every subscription.
    ///
    /// Subscribers see their streams end; nothing further is delivered.
    pub fn shutdown(&self) {
        let controllers: Vec<Controller> = self
            .inner
            .controllers
            .write()
            .drain(..)
            .map(|(_, controller)| controller)
            .collect();
        self.inner.routes.lock().clear();
        for controller in &controllers {
            controller.clear_subscriptions();
        }
        tracing::info!(
            process = %self.inner.name,
            controllers = controllers.len(),
            "process shut down"
        );
    }
}
