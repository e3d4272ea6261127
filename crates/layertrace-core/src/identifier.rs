//! Opaque identifiers used across a trace session.
//!
//! None of these types carry meaning beyond equality and ordering:
//!
//! - [`LayerId`] is issued by the host when it describes its model, one per
//!   submodule. The host must hand out the same id every time the same layer
//!   object executes.
//! - [`BlockId`] is the sequence id of a diagram block. Ids are allocated in
//!   creation order, so comparing two ids tells which block was created first.
//! - [`StorageToken`] stands for "the buffer behind a tensor". Two tensors with
//!   equal tokens share storage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle for one submodule of the traced model.
///
/// # Examples
///
/// ```
/// use layertrace_core::identifier::LayerId;
///
/// let conv = LayerId::new(3);
/// assert_eq!(conv.index(), 3);
/// assert_eq!(conv.to_string(), "layer#3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(u32);

impl LayerId {
    /// Creates a layer id from the host's arena index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index this id was created from.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Sequence id of a block in the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Creates a block id.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw sequence number.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns the id allocated right after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying the storage behind a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageToken(u64);

impl StorageToken {
    /// Creates a token from the host's storage handle.
    pub fn new(token: u64) -> Self {
        Self(token)
    }
}
