//! Change notification.
//!
//! The [`Notifier`] turns tree mutations into ordered [`Delta`]s and delivers
//! them to subscribers. Bursts of changes can be coalesced with a squash
//! scope: while [`begin_squash`](Notifier::begin_squash) calls outnumber
//! [`end_squash`](Notifier::end_squash) calls, deltas are buffered, and the
//! final `end_squash` flushes them as one batch per subscriber.
//!
//! # Ordering
//!
//! Deltas reach a given subscriber in the order they were produced. Nothing
//! buffered inside a squash scope is delivered before the scope exits.
//!
//! # Matching
//!
//! A delta is relevant to a subscription when either path is a prefix of the
//! other. Deltas below the subscribed path are re-rooted relative to it;
//! deltas above it are projected down to the subscribed path.

use core::mem;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::block::{BlockModel, value_at};
use crate::error::ModelError;
use crate::path::Path;
use crate::request::{Response, ResponseSink, Subscribe, Unsubscribe};

/// One change to the tree: a new value at a path, or a removal.
///
/// Serialized as `[path, value]` for a change and `[path]` for a removal.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// Where the change happened.
    pub path: Path,
    /// The new value, or `None` if the path was removed.
    pub value: Option<Value>,
}

impl Delta {
    /// A change to `value` at `path`.
    #[must_use]
    pub fn set(path: Path, value: Value) -> Self {
        Self {
            path,
            value: Some(value),
        }
    }

    /// A removal of `path`.
    #[must_use]
    pub fn remove(path: Path) -> Self {
        Self { path, value: None }
    }

    /// Returns this delta with `prefix` prepended to its path.
    #[must_use]
    pub fn under(self, prefix: &Path) -> Self {
        Self {
            path: prefix.join(&self.path),
            value: self.value,
        }
    }

    /// Re-expresses this delta relative to `root`, if it is relevant there.
    fn relative_to(&self, root: &Path) -> Option<Delta> {
        if let Some(rest) = self.path.strip_prefix(root) {
            return Some(Delta {
                path: rest,
                value: self.value.clone(),
            });
        }
        let rest = root.strip_prefix(&self.path)?;
        let value = self
            .value
            .as_ref()
            .and_then(|value| value_at(value, rest.segments()))
            .cloned();
        Some(Delta {
            path: Path::root(),
            value,
        })
    }
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.value.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.path)?;
        if let Some(value) = &self.value {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

/// An active subscription.
#[derive(Debug)]
struct Subscription {
    id: u64,
    /// Relative to the block root.
    path: Path,
    delta: bool,
    sink: ResponseSink,
}

impl Subscription {
    fn matches(&self, id: u64, sink: &ResponseSink) -> bool {
        self.id == id && self.sink.same_channel(sink)
    }
}

/// Buffers and delivers tree changes for one block.
#[derive(Debug)]
pub struct Notifier {
    mri: String,
    squashed: usize,
    changes: Vec<Delta>,
    subscriptions: Vec<Subscription>,
}

impl Notifier {
    /// Creates a notifier for the block published under `mri`.
    #[must_use]
    pub fn new(mri: impl Into<String>) -> Self {
        Self {
            mri: mri.into(),
            squashed: 0,
            changes: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Returns the resource identifier this notifier publishes under.
    #[must_use]
    pub fn mri(&self) -> &str {
        &self.mri
    }

    /// Returns `true` while a squash scope is open.
    #[must_use]
    pub fn is_squashed(&self) -> bool {
        self.squashed > 0
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Opens a (possibly nested) squash scope.
    pub fn begin_squash(&mut self) {
        self.squashed += 1;
    }

    /// Closes a squash scope, flushing buffered changes when the outermost
    /// scope closes.
    pub fn end_squash(&mut self, block: &BlockModel) {
        self.squashed = self.squashed.saturating_sub(1);
        if self.squashed == 0 {
            self.flush(block);
        }
    }

    /// Records a change. Outside a squash scope it is delivered at once.
    pub fn add_change(&mut self, block: &BlockModel, delta: Delta) {
        self.changes.push(delta);
        if self.squashed == 0 {
            self.flush(block);
        }
    }

    /// Registers a subscription and sends it the current snapshot.
    pub fn handle_subscribe(
        &mut self,
        block: &BlockModel,
        request: Subscribe,
    ) -> Result<(), ModelError> {
        let path = self.block_path(&request.path)?;
        let snapshot = block.resolve(&path)?;
        let initial = if request.delta {
            Response::Delta {
                id: request.id,
                changes: vec![Delta::set(Path::root(), snapshot)],
            }
        } else {
            Response::Update {
                id: request.id,
                value: snapshot,
            }
        };
        if request.sink.send(initial).is_err() {
            tracing::debug!(mri = %self.mri, id = request.id, "subscriber left early");
            return Ok(());
        }
        tracing::debug!(mri = %self.mri, id = request.id, path = %path, "subscribed");
        self.subscriptions.push(Subscription {
            id: request.id,
            path,
            delta: request.delta,
            sink: request.sink,
        });
        Ok(())
    }

    /// Removes a subscription and acknowledges it.
    ///
    /// Updates already queued on the sink are not recalled.
    pub fn handle_unsubscribe(&mut self, request: &Unsubscribe) -> Result<(), ModelError> {
        let index = self
            .subscriptions
            .iter()
            .position(|sub| sub.matches(request.id, &request.sink))
            .ok_or(ModelError::UnknownSubscription(request.id))?;
        self.subscriptions.remove(index);
        tracing::debug!(mri = %self.mri, id = request.id, "unsubscribed");
        let _ = request.sink.send(Response::Return {
            id: request.id,
            value: Value::Null,
        });
        Ok(())
    }

    /// Drops every subscription without notifying subscribers.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.changes.clear();
    }

    /// Converts a request path (starting with the mri) to a block path.
    pub(crate) fn block_path(&self, path: &Path) -> Result<Path, ModelError> {
        match path.first() {
            Some(mri) if mri == self.mri => Ok(path.tail()),
            _ => Err(ModelError::NotFound(path.clone())),
        }
    }

    fn flush(&mut self, block: &BlockModel) {
        let changes = mem::take(&mut self.changes);
        if changes.is_empty() {
            return;
        }
        let mri = &self.mri;
        self.subscriptions.retain(|sub| {
            let relevant: Vec<Delta> = changes
                .iter()
                .filter_map(|change| change.relative_to(&sub.path))
                .collect();
            if relevant.is_empty() {
                return true;
            }
            let response = if sub.delta {
                Response::Delta {
                    id: sub.id,
                    changes: relevant,
                }
            } else {
                Response::Update {
                    id: sub.id,
                    value: block.resolve(&sub.path).unwrap_or(Value::Null),
                }
            };
            let delivered = sub.sink.send(response).is_ok();
            if !delivered {
                tracing::warn!(mri = %mri, id = sub.id, "dropping subscription with closed sink");
            }
            delivered
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeModel;
    use crate::block::Endpoint;
    use crate::meta::{NumberMeta, NumberType};
    use crate::request::{ResponseStream, response_channel};
    use serde_json::json;

    fn block() -> BlockModel {
        let mut block = BlockModel::new();
        block.set_endpoint(
            "count",
            Endpoint::Attribute(AttributeModel::new(NumberMeta::new(NumberType::Int32, "c"))),
        );
        block
    }

    fn subscribe(
        notifier: &mut Notifier,
        block: &BlockModel,
        path: Path,
        delta: bool,
    ) -> (ResponseSink, ResponseStream) {
        let (sink, mut stream) = response_channel();
        notifier
            .handle_subscribe(
                block,
                Subscribe {
                    id: 1,
                    path,
                    delta,
                    sink: sink.clone(),
                },
            )
            .unwrap();
        // discard the initial snapshot
        stream.try_recv().unwrap();
        (sink, stream)
    }

    #[test]
    fn delta_serializes_as_list() {
        let set = serde_json::to_value(Delta::set(Path::from(["a", "b"]), json!(1))).unwrap();
        assert_eq!(set, json!([["a", "b"], 1]));
        let removed = serde_json::to_value(Delta::remove(Path::from("a"))).unwrap();
        assert_eq!(removed, json!([["a"]]));
    }

    #[test]
    fn initial_snapshot_is_first_message() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (sink, mut stream) = response_channel();
        notifier
            .handle_subscribe(
                &block,
                Subscribe {
                    id: 9,
                    path: Path::from(["mri", "count", "value"]),
                    delta: true,
                    sink,
                },
            )
            .unwrap();
        assert_eq!(
            stream.try_recv().unwrap(),
            Response::Delta {
                id: 9,
                changes: vec![Delta::set(Path::root(), json!(0))]
            }
        );
    }

    #[test]
    fn subscribe_to_unknown_path_fails() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (sink, _stream) = response_channel();
        let result = notifier.handle_subscribe(
            &block,
            Subscribe {
                id: 1,
                path: Path::from(["other", "count"]),
                delta: false,
                sink,
            },
        );
        assert!(result.is_err());
        assert_eq!(notifier.subscription_count(), 0);
    }

    #[test]
    fn unsquashed_changes_deliver_individually() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (_sink, mut stream) = subscribe(&mut notifier, &block, Path::from("mri"), true);

        notifier.add_change(&block, Delta::set(Path::from(["count", "value"]), json!(1)));
        notifier.add_change(&block, Delta::set(Path::from(["count", "value"]), json!(2)));

        for expected in [1, 2] {
            assert_eq!(
                stream.try_recv().unwrap(),
                Response::Delta {
                    id: 1,
                    changes: vec![Delta::set(Path::from(["count", "value"]), json!(expected))]
                }
            );
        }
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn squashed_changes_flush_once_in_order() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (_sink, mut stream) = subscribe(&mut notifier, &block, Path::from("mri"), true);

        notifier.begin_squash();
        notifier.begin_squash();
        notifier.add_change(&block, Delta::set(Path::from("a"), json!(1)));
        notifier.end_squash(&block);
        notifier.add_change(&block, Delta::set(Path::from("b"), json!(2)));
        assert!(stream.try_recv().is_err(), "nothing before the outer scope exits");
        notifier.end_squash(&block);

        let Response::Delta { changes, .. } = stream.try_recv().unwrap() else {
            panic!("expected a delta batch");
        };
        let paths: Vec<String> = changes.iter().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, ["a", "b"]);
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn changes_above_subscription_are_projected() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (_sink, mut stream) =
            subscribe(&mut notifier, &block, Path::from(["mri", "count", "value"]), true);

        notifier.add_change(&block, Delta::set(Path::from("count"), json!({"value": 5})));
        notifier.add_change(&block, Delta::set(Path::from("other"), json!(1)));

        assert_eq!(
            stream.try_recv().unwrap(),
            Response::Delta {
                id: 1,
                changes: vec![Delta::set(Path::root(), json!(5))]
            }
        );
        assert!(stream.try_recv().is_err(), "unrelated path not delivered");
    }

    #[test]
    fn update_subscribers_get_current_value() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (_sink, mut stream) =
            subscribe(&mut notifier, &block, Path::from(["mri", "count", "value"]), false);

        notifier.add_change(&block, Delta::set(Path::from(["count", "value"]), json!(0)));
        assert_eq!(
            stream.try_recv().unwrap(),
            Response::Update {
                id: 1,
                value: json!(0)
            }
        );
    }

    #[test]
    fn unsubscribe_stops_delivery_and_acknowledges() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (sink, mut stream) = subscribe(&mut notifier, &block, Path::from("mri"), true);

        notifier
            .handle_unsubscribe(&Unsubscribe { id: 1, sink: sink.clone() })
            .unwrap();
        assert_eq!(
            stream.try_recv().unwrap(),
            Response::Return {
                id: 1,
                value: Value::Null
            }
        );
        notifier.add_change(&block, Delta::set(Path::from("a"), json!(1)));
        assert!(stream.try_recv().is_err());

        assert_eq!(
            notifier.handle_unsubscribe(&Unsubscribe { id: 1, sink }),
            Err(ModelError::UnknownSubscription(1))
        );
    }

    #[test]
    fn closed_sinks_are_dropped_on_flush() {
        let block = block();
        let mut notifier = Notifier::new("mri");
        let (_sink, stream) = subscribe(&mut notifier, &block, Path::from("mri"), true);
        drop(stream);
        notifier.add_change(&block, Delta::set(Path::from("a"), json!(1)));
        assert_eq!(notifier.subscription_count(), 0);
    }
}
