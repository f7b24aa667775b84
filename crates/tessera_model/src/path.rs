//! Addresses into a block's endpoint tree.

use core::fmt;

use serde::{Deserialize, Serialize};

/// An ordered sequence of names addressing an endpoint from a root.
///
/// Request paths start with the resource identifier of the owning
/// controller; paths held by a block or notifier are relative to the block
/// root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<String>);

impl Path {
    /// Creates a path from any sequence of segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The empty path, addressing the root itself.
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns the segments of this path.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first segment, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns a new path with all of `other`'s segments appended.
    #[must_use]
    pub fn join(&self, other: &Path) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Returns the path without its first segment.
    #[must_use]
    pub fn tail(&self) -> Self {
        Self(self.0.iter().skip(1).cloned().collect())
    }

    /// Returns `true` if `prefix` is a (non-strict) prefix of this path.
    #[must_use]
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Strips `prefix` from this path, returning the remainder.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Self(rest.to_vec()))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for Path {
    fn from(segment: &str) -> Self {
        Self(vec![segment.to_owned()])
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_checks() {
        let path = Path::from(["mri", "health", "value"]);
        assert!(path.starts_with(&Path::from(["mri", "health"])));
        assert!(path.starts_with(&Path::root()));
        assert!(!path.starts_with(&Path::from(["mri", "state"])));
        assert_eq!(
            path.strip_prefix(&Path::from("mri")),
            Some(Path::from(["health", "value"]))
        );
        assert_eq!(path.strip_prefix(&Path::from("other")), None);
    }

    #[test]
    fn tail_drops_first_segment() {
        let path = Path::from(["mri", "health"]);
        assert_eq!(path.first(), Some("mri"));
        assert_eq!(path.tail(), Path::from("health"));
        assert!(Path::root().tail().is_empty());
    }

    #[test]
    fn display_joins_with_dots() {
        assert_eq!(Path::from(["a", "b", "c"]).to_string(), "a.b.c");
    }
}
