//! Node tokens
//!
//! Library names, jar paths and task names all travel through the orderer
//! as the same opaque token. What a node means is up to the resolver that
//! produced it.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

/// Interned, cheaply clonable node identifier
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(Arc<str>);

impl Node {
    /// Create a node from anything string-like
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Node {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for Node {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&String> for Node {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl AsRef<str> for Node {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Node {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Build a node list from string literals
pub fn nodes<I, S>(names: I) -> Vec<Node>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(Node::new).collect()
}
