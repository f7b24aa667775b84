//! The endpoint tree.
//!
//! A [`BlockModel`] is an ordered mapping from name to [`Endpoint`]. It is
//! pure data with no locking of its own: the owning controller holds its tree
//! lock around every read it wants to observe consistently and around every
//! mutation. Structural changes return a [`Delta`] so that [`Tree`]
//! can forward them to the notifier.
//!
//! [`Tree`]: crate::tree::Tree

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::attribute::AttributeModel;
use crate::error::{ModelError, ValidationError};
use crate::method::MethodModel;
use crate::notifier::Delta;
use crate::path::Path;

/// Descriptor of a block itself, published as the `meta` endpoint.
#[derive(Debug, Clone, Default)]
pub struct BlockMeta {
    description: String,
    label: String,
}

impl BlockMeta {
    /// Creates a block descriptor.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            label: String::new(),
        }
    }

    /// Sets the display label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Structured representation with a `typeid` discriminator.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "typeid": "tessera:core/BlockMeta:1.0",
            "description": self.description,
            "label": self.label,
        })
    }
}

/// A node of the endpoint tree.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// A value with alarm and timestamp.
    Attribute(AttributeModel),
    /// An invokable operation.
    Method(MethodModel),
    /// A nested structure.
    Block(BlockModel),
    /// The descriptor of the enclosing block.
    Meta(BlockMeta),
}

impl Endpoint {
    /// Structured representation with a `typeid` discriminator.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Endpoint::Attribute(attribute) => attribute.to_value(),
            Endpoint::Method(method) => method.to_value(),
            Endpoint::Block(block) => block.to_value(),
            Endpoint::Meta(meta) => meta.to_value(),
        }
    }

    /// Returns the attribute, if this endpoint is one.
    #[must_use]
    pub fn as_attribute(&self) -> Option<&AttributeModel> {
        match self {
            Endpoint::Attribute(attribute) => Some(attribute),
            _ => None,
        }
    }

    /// Returns the method, if this endpoint is one.
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodModel> {
        match self {
            Endpoint::Method(method) => Some(method),
            _ => None,
        }
    }
}

impl From<AttributeModel> for Endpoint {
    fn from(attribute: AttributeModel) -> Self {
        Endpoint::Attribute(attribute)
    }
}

impl From<MethodModel> for Endpoint {
    fn from(method: MethodModel) -> Self {
        Endpoint::Method(method)
    }
}

impl From<BlockModel> for Endpoint {
    fn from(block: BlockModel) -> Self {
        Endpoint::Block(block)
    }
}

impl From<BlockMeta> for Endpoint {
    fn from(meta: BlockMeta) -> Self {
        Endpoint::Meta(meta)
    }
}

/// Serializes an endpoint into its type-tagged structured form.
#[must_use]
pub fn serialize(endpoint: &Endpoint) -> Value {
    endpoint.to_value()
}

/// Walks `segments` through the object keys of `value`.
#[must_use]
pub fn value_at<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Ordered mapping from name to endpoint.
#[derive(Debug, Clone, Default)]
pub struct BlockModel {
    children: IndexMap<String, Endpoint>,
}

impl BlockModel {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a child called `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    /// Returns child names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Returns the endpoint reached by following `path`.
    pub fn get(&self, path: &Path) -> Result<&Endpoint, ModelError> {
        let not_found = || ModelError::NotFound(path.clone());
        let (last, parents) = path.segments().split_last().ok_or_else(not_found)?;
        let mut block = self;
        for segment in parents {
            match block.children.get(segment) {
                Some(Endpoint::Block(child)) => block = child,
                _ => return Err(not_found()),
            }
        }
        block.children.get(last).ok_or_else(not_found)
    }

    /// Mutable version of [`get`](Self::get).
    pub fn get_mut(&mut self, path: &Path) -> Result<&mut Endpoint, ModelError> {
        let not_found = || ModelError::NotFound(path.clone());
        let (last, parents) = path.segments().split_last().ok_or_else(not_found)?;
        let mut block = self;
        for segment in parents {
            match block.children.get_mut(segment) {
                Some(Endpoint::Block(child)) => block = child,
                _ => return Err(not_found()),
            }
        }
        block.children.get_mut(last).ok_or_else(not_found)
    }

    /// Returns the attribute at `path`.
    pub fn attribute(&self, path: &Path) -> Result<&AttributeModel, ModelError> {
        self.get(path)?
            .as_attribute()
            .ok_or_else(|| ValidationError::NotAttribute(path.to_string()).into())
    }

    /// Returns the attribute at `path` for mutation.
    pub fn attribute_mut(&mut self, path: &Path) -> Result<&mut AttributeModel, ModelError> {
        match self.get_mut(path)? {
            Endpoint::Attribute(attribute) => Ok(attribute),
            _ => Err(ValidationError::NotAttribute(path.to_string()).into()),
        }
    }

    /// Returns the method at `path`.
    pub fn method(&self, path: &Path) -> Result<&MethodModel, ModelError> {
        self.get(path)?
            .as_method()
            .ok_or_else(|| ValidationError::NotMethod(path.to_string()).into())
    }

    /// Replaces or inserts the child `name`, returning the structural change.
    ///
    /// A replaced child keeps its position; a new child goes last.
    pub fn set_endpoint(&mut self, name: impl Into<String>, endpoint: Endpoint) -> Delta {
        let name = name.into();
        let value = endpoint.to_value();
        self.children.insert(name.clone(), endpoint);
        Delta::set(Path::from(name.as_str()), value)
    }

    /// Serializes the endpoint reached by `path` and walks any remaining
    /// segments into its serialized fields.
    ///
    /// The root path serializes the whole block.
    pub fn resolve(&self, path: &Path) -> Result<Value, ModelError> {
        let not_found = || ModelError::NotFound(path.clone());
        let mut block = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            match block.children.get(segment) {
                Some(Endpoint::Block(child)) => block = child,
                Some(endpoint) => {
                    let value = endpoint.to_value();
                    return value_at(&value, &path.segments()[depth + 1..])
                        .cloned()
                        .ok_or_else(not_found);
                }
                None => return Err(not_found()),
            }
        }
        Ok(block.to_value())
    }

    /// Structured representation with a `typeid` discriminator.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("typeid".into(), json!("tessera:core/Block:1.0"));
        for (name, child) in &self.children {
            fields.insert(name.clone(), child.to_value());
        }
        Value::Object(fields)
    }
}
