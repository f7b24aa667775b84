//! A block paired with its notifier.

use serde_json::{Value, json};

use crate::alarm::Alarm;
use crate::block::{BlockModel, Endpoint};
use crate::error::ModelError;
use crate::notifier::{Delta, Notifier};
use crate::path::Path;
use crate::request::{Subscribe, Unsubscribe};

/// The root endpoint tree of one controller and the notifier observing it.
///
/// Every mutation goes through `Tree` so that a delta is always recorded.
/// `Tree` has no locking of its own; the controller keeps it behind its
/// tree lock.
#[derive(Debug)]
pub struct Tree {
    block: BlockModel,
    notifier: Notifier,
}

impl Tree {
    /// Creates an empty tree published under `mri`.
    #[must_use]
    pub fn new(mri: impl Into<String>) -> Self {
        Self {
            block: BlockModel::new(),
            notifier: Notifier::new(mri),
        }
    }

    /// Returns the resource identifier.
    #[must_use]
    pub fn mri(&self) -> &str {
        self.notifier.mri()
    }

    /// Returns the block for reading.
    #[must_use]
    pub fn block(&self) -> &BlockModel {
        &self.block
    }

    /// Returns the notifier.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Converts a request path (starting with the mri) to a block path.
    pub fn block_path(&self, path: &Path) -> Result<Path, ModelError> {
        self.notifier.block_path(path)
    }

    /// Serializes whatever a request path addresses.
    pub fn resolve(&self, path: &Path) -> Result<Value, ModelError> {
        self.block.resolve(&self.block_path(path)?)
    }

    /// Opens a squash scope.
    pub fn begin_squash(&mut self) {
        self.notifier.begin_squash();
    }

    /// Closes a squash scope.
    pub fn end_squash(&mut self) {
        self.notifier.end_squash(&self.block);
    }

    /// Replaces or inserts a top-level endpoint.
    pub fn set_endpoint(&mut self, name: impl Into<String>, endpoint: Endpoint) {
        let delta = self.block.set_endpoint(name, endpoint);
        self.notifier.add_change(&self.block, delta);
    }

    /// Validates and stores an attribute value.
    ///
    /// `path` is relative to the block root. A rejected value records
    /// nothing.
    pub fn set_value(&mut self, path: &Path, value: Value) -> Result<(), ModelError> {
        let attribute = self.block.attribute_mut(path)?;
        attribute.set_value(value)?;
        let value = attribute.value().clone();
        let timestamp = json!(attribute.timestamp());

        self.notifier.begin_squash();
        self.notifier
            .add_change(&self.block, Delta::set(path.child("value"), value));
        self.notifier
            .add_change(&self.block, Delta::set(path.child("timeStamp"), timestamp));
        self.notifier.end_squash(&self.block);
        Ok(())
    }

    /// Stores an attribute alarm. `path` is relative to the block root.
    pub fn set_alarm(&mut self, path: &Path, alarm: Alarm) -> Result<(), ModelError> {
        let attribute = self.block.attribute_mut(path)?;
        if attribute.alarm() == &alarm {
            return Ok(());
        }
        let serialized = json!(alarm);
        attribute.set_alarm(alarm);
        self.notifier
            .add_change(&self.block, Delta::set(path.child("alarm"), serialized));
        Ok(())
    }

    /// Stores a value and an alarm as one squashed change.
    pub fn set_value_alarm(
        &mut self,
        path: &Path,
        value: Value,
        alarm: Alarm,
    ) -> Result<(), ModelError> {
        self.notifier.begin_squash();
        let result = self
            .set_value(path, value)
            .and_then(|()| self.set_alarm(path, alarm));
        self.notifier.end_squash(&self.block);
        result
    }

    /// Registers a subscription. See [`Notifier::handle_subscribe`].
    pub fn handle_subscribe(&mut self, request: Subscribe) -> Result<(), ModelError> {
        self.notifier.handle_subscribe(&self.block, request)
    }

    /// Removes a subscription. See [`Notifier::handle_unsubscribe`].
    pub fn handle_unsubscribe(&mut self, request: &Unsubscribe) -> Result<(), ModelError> {
        self.notifier.handle_unsubscribe(request)
    }

    /// Drops every subscription.
    pub fn clear_subscriptions(&mut self) {
        self.notifier.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeModel;
    use crate::meta::{NumberMeta, NumberType};
    use crate::request::{Response, response_channel};

    fn tree() -> Tree {
        let mut tree = Tree::new("dev");
        tree.set_endpoint(
            "count",
            AttributeModel::new(NumberMeta::new(NumberType::Int32, "count")).into(),
        );
        tree
    }

    #[test]
    fn set_value_records_value_and_timestamp() {
        let mut tree = tree();
        let (sink, mut stream) = response_channel();
        tree.handle_subscribe(Subscribe {
            id: 1,
            path: Path::from("dev"),
            delta: true,
            sink,
        })
        .unwrap();
        stream.try_recv().unwrap();

        tree.set_value(&Path::from("count"), json!(3)).unwrap();
        let Response::Delta { changes, .. } = stream.try_recv().unwrap() else {
            panic!("expected a delta batch");
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], Delta::set(Path::from(["count", "value"]), json!(3)));
        assert_eq!(changes[1].path, Path::from(["count", "timeStamp"]));
        assert_eq!(
            tree.resolve(&Path::from(["dev", "count", "value"])).unwrap(),
            json!(3)
        );
    }

    #[test]
    fn rejected_value_records_nothing() {
        let mut tree = tree();
        let (sink, mut stream) = response_channel();
        tree.handle_subscribe(Subscribe {
            id: 1,
            path: Path::from("dev"),
            delta: true,
            sink,
        })
        .unwrap();
        stream.try_recv().unwrap();

        assert!(tree.set_value(&Path::from("count"), json!("x")).is_err());
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn value_and_alarm_arrive_together() {
        let mut tree = tree();
        let (sink, mut stream) = response_channel();
        tree.handle_subscribe(Subscribe {
            id: 1,
            path: Path::from(["dev", "count"]),
            delta: true,
            sink,
        })
        .unwrap();
        stream.try_recv().unwrap();

        tree.set_value_alarm(&Path::from("count"), json!(9), Alarm::major("too high"))
            .unwrap();
        let Response::Delta { changes, .. } = stream.try_recv().unwrap() else {
            panic!("expected a delta batch");
        };
        let paths: Vec<String> = changes.iter().map(|d| d.path.to_string()).collect();
        assert_eq!(paths, ["value", "timeStamp", "alarm"]);
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn request_paths_must_start_with_mri() {
        let tree = tree();
        assert!(tree.resolve(&Path::from(["other", "count"])).is_err());
        assert!(tree.resolve(&Path::root()).is_err());
        assert_eq!(tree.resolve(&Path::from("dev")).unwrap()["count"]["value"], 0);
    }
}
