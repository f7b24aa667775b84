//! Endpoint tree and request protocol for Tessera (Layer 1).
//!
//! `tessera_model` holds the pure data side of a controller: the ordered tree
//! of attributes, methods and nested blocks that a controller publishes, the
//! notifier that turns mutations into ordered deltas for subscribers, and the
//! request/response types that callers exchange with a controller.
//!
//! Nothing here locks or spawns. The controller in `tessera_controller` owns
//! a [`Tree`] behind its tree lock and drives it from request tasks.
//!
//! # Core Concepts
//!
//! - [`Path`] - Ordered names addressing an endpoint
//! - [`Endpoint`] - Attribute, method, nested block or block descriptor
//! - [`Meta`] - Narrow interface to the value descriptor system
//! - [`Notifier`] - Squashed, ordered change delivery
//! - [`Request`] / [`Response`] - The request protocol
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use tessera_model::prelude::*;
//!
//! let mut tree = Tree::new("dev");
//! tree.set_endpoint(
//!     "gain",
//!     AttributeModel::new(NumberMeta::new(NumberType::Int32, "gain"))
//!         .writeable(true)
//!         .into(),
//! );
//! tree.set_value(&Path::from("gain"), json!(4)).unwrap();
//! assert_eq!(tree.resolve(&Path::from(["dev", "gain", "value"])).unwrap(), json!(4));
//! ```
//!
//! # Architecture
//!
//! This crate is Layer 1 of Tessera:
//!
//! - **Layer 1** (`tessera_model`): endpoint tree, notifier, protocol (this crate)
//! - **Layer 2** (`tessera_controller`): parts, hooks, controller, process

/// Alarm and timestamp values.
pub mod alarm;

/// Attribute endpoints.
pub mod attribute;

/// Nested blocks and the endpoint enum.
pub mod block;

/// Model and validation errors.
pub mod error;

/// Value descriptors.
pub mod meta;

/// Method endpoints.
pub mod method;

/// Change notification.
pub mod notifier;

/// Endpoint addresses.
pub mod path;

/// Request and response protocol.
pub mod request;

/// Block plus notifier.
pub mod tree;

pub use alarm::{Alarm, AlarmSeverity, AlarmStatus, TimeStamp};
pub use attribute::AttributeModel;
pub use block::{BlockMeta, BlockModel, Endpoint, serialize};
pub use error::{ModelError, ValidationError};
pub use meta::{
    AnyMeta, BooleanMeta, ChoiceMeta, MapMeta, Meta, MetaRef, NumberMeta, NumberType, StringMeta,
};
pub use method::MethodModel;
pub use notifier::{Delta, Notifier};
pub use path::Path;
pub use request::{
    Get, Post, Put, Request, Response, ResponseSink, ResponseStream, Subscribe, Unsubscribe,
    response_channel,
};
pub use tree::Tree;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::alarm::{Alarm, AlarmSeverity, AlarmStatus, TimeStamp};
    pub use crate::attribute::AttributeModel;
    pub use crate::block::{BlockMeta, BlockModel, Endpoint};
    pub use crate::error::{ModelError, ValidationError};
    pub use crate::meta::{
        AnyMeta, BooleanMeta, ChoiceMeta, MapMeta, Meta, NumberMeta, NumberType, StringMeta,
    };
    pub use crate::method::MethodModel;
    pub use crate::notifier::Delta;
    pub use crate::path::Path;
    pub use crate::request::{Request, Response, ResponseSink, ResponseStream, response_channel};
    pub use crate::tree::Tree;
}
