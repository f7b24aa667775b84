//! Request and response protocol.
//!
//! Every request carries the id chosen by the caller and a [`ResponseSink`]
//! on which responses for that id are delivered. How requests physically
//! arrive is up to the transport; the controller only sees these types.

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::notifier::Delta;
use crate::path::Path;

/// Channel on which responses to a request are delivered.
pub type ResponseSink = mpsc::UnboundedSender<Response>;

/// Receiving end of a [`ResponseSink`].
pub type ResponseStream = mpsc::UnboundedReceiver<Response>;

/// Creates a connected sink/stream pair.
#[must_use]
pub fn response_channel() -> (ResponseSink, ResponseStream) {
    mpsc::unbounded_channel()
}

/// A message sent back to the originator of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "typeid")]
pub enum Response {
    /// Successful completion with a value.
    #[serde(rename = "tessera:core/Return:1.0")]
    Return {
        /// Request id.
        id: u64,
        /// Returned value.
        value: Value,
    },
    /// Failure.
    #[serde(rename = "tessera:core/Error:1.0")]
    Error {
        /// Request id.
        id: u64,
        /// Failure description.
        message: String,
    },
    /// Full value at a subscribed path.
    #[serde(rename = "tessera:core/Update:1.0")]
    Update {
        /// Subscription id.
        id: u64,
        /// Current value.
        value: Value,
    },
    /// Ordered changes under a subscribed path.
    #[serde(rename = "tessera:core/Delta:1.0")]
    Delta {
        /// Subscription id.
        id: u64,
        /// Changes relative to the subscribed path.
        changes: Vec<Delta>,
    },
}

impl Response {
    /// Returns the id of the request this responds to.
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Response::Return { id, .. }
            | Response::Error { id, .. }
            | Response::Update { id, .. }
            | Response::Delta { id, .. } => *id,
        }
    }
}

/// Read the value at a path.
#[derive(Debug, Clone)]
pub struct Get {
    /// Caller-chosen id.
    pub id: u64,
    /// Target, starting with the controller's mri.
    pub path: Path,
    /// Where the response goes.
    pub sink: ResponseSink,
}

/// Write a value to an attribute.
#[derive(Debug, Clone)]
pub struct Put {
    /// Caller-chosen id.
    pub id: u64,
    /// Target attribute, starting with the controller's mri.
    pub path: Path,
    /// New value.
    pub value: Value,
    /// Where the response goes.
    pub sink: ResponseSink,
}

/// Invoke a method with named parameters.
#[derive(Debug, Clone)]
pub struct Post {
    /// Caller-chosen id.
    pub id: u64,
    /// Target method, starting with the controller's mri.
    pub path: Path,
    /// Named parameters.
    pub parameters: Map<String, Value>,
    /// Where the response goes.
    pub sink: ResponseSink,
}

/// Stream changes under a path.
#[derive(Debug, Clone)]
pub struct Subscribe {
    /// Caller-chosen id, reused by every update.
    pub id: u64,
    /// Watched path, starting with the controller's mri.
    pub path: Path,
    /// Deliver deltas rather than full values.
    pub delta: bool,
    /// Where updates go.
    pub sink: ResponseSink,
}

/// Stop a subscription made with the same id on the same sink.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    /// Id of the subscription to cancel.
    pub id: u64,
    /// Sink the subscription was made on.
    pub sink: ResponseSink,
}

/// A request addressed to one controller.
#[derive(Debug, Clone)]
pub enum Request {
    /// See [`Get`].
    Get(Get),
    /// See [`Put`].
    Put(Put),
    /// See [`Post`].
    Post(Post),
    /// See [`Subscribe`].
    Subscribe(Subscribe),
    /// See [`Unsubscribe`].
    Unsubscribe(Unsubscribe),
}

impl Request {
    /// Builds a [`Get`] request.
    pub fn get(id: u64, path: impl Into<Path>, sink: ResponseSink) -> Self {
        Request::Get(Get {
            id,
            path: path.into(),
            sink,
        })
    }

    /// Builds a [`Put`] request.
    pub fn put(id: u64, path: impl Into<Path>, value: Value, sink: ResponseSink) -> Self {
        Request::Put(Put {
            id,
            path: path.into(),
            value,
            sink,
        })
    }

    /// Builds a [`Post`] request.
    pub fn post(
        id: u64,
        path: impl Into<Path>,
        parameters: Map<String, Value>,
        sink: ResponseSink,
    ) -> Self {
        Request::Post(Post {
            id,
            path: path.into(),
            parameters,
            sink,
        })
    }

    /// Builds a [`Subscribe`] request.
    pub fn subscribe(id: u64, path: impl Into<Path>, delta: bool, sink: ResponseSink) -> Self {
        Request::Subscribe(Subscribe {
            id,
            path: path.into(),
            delta,
            sink,
        })
    }

    /// Builds an [`Unsubscribe`] request.
    #[must_use]
    pub fn unsubscribe(id: u64, sink: ResponseSink) -> Self {
        Request::Unsubscribe(Unsubscribe { id, sink })
    }

    /// Returns the caller-chosen id.
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Request::Get(Get { id, .. })
            | Request::Put(Put { id, .. })
            | Request::Post(Post { id, .. })
            | Request::Subscribe(Subscribe { id, .. })
            | Request::Unsubscribe(Unsubscribe { id, .. }) => *id,
        }
    }

    /// Returns the target path; unsubscribes have none.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Request::Get(Get { path, .. })
            | Request::Put(Put { path, .. })
            | Request::Post(Post { path, .. })
            | Request::Subscribe(Subscribe { path, .. }) => Some(path),
            Request::Unsubscribe(_) => None,
        }
    }

    /// Returns the response sink.
    #[must_use]
    pub fn sink(&self) -> &ResponseSink {
        match self {
            Request::Get(Get { sink, .. })
            | Request::Put(Put { sink, .. })
            | Request::Post(Post { sink, .. })
            | Request::Subscribe(Subscribe { sink, .. })
            | Request::Unsubscribe(Unsubscribe { sink, .. }) => sink,
        }
    }

    /// Short name of the request kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Get(_) => "Get",
            Request::Put(_) => "Put",
            Request::Post(_) => "Post",
            Request::Subscribe(_) => "Subscribe",
            Request::Unsubscribe(_) => "Unsubscribe",
        }
    }

    /// Sends a [`Response::Return`]. Returns `false` if the caller has gone.
    pub fn respond_with_return(&self, value: Value) -> bool {
        self.sink()
            .send(Response::Return {
                id: self.id(),
                value,
            })
            .is_ok()
    }

    /// Sends a [`Response::Error`]. Returns `false` if the caller has gone.
    pub fn respond_with_error(&self, message: impl Into<String>) -> bool {
        self.sink()
            .send(Response::Error {
                id: self.id(),
                message: message.into(),
            })
            .is_ok()
    }
}
