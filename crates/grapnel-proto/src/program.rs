//! Opaque traversal programs.

use serde::{Deserialize, Serialize};

/// A serialized traversal program.
///
/// The driver never inspects or interprets program contents; it carries
/// them to the engine as-is. How a program is produced (a bytecode
/// builder, a script, a recorded traversal) is the application's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program(Vec<u8>);

impl Program {
    /// Wrap already-serialized program bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Program(bytes.into())
    }

    /// Borrow the program bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the program, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Program length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the program is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Program {
    fn from(bytes: Vec<u8>) -> Self {
        Program(bytes)
    }
}

impl From<&[u8]> for Program {
    fn from(bytes: &[u8]) -> Self {
        Program(bytes.to_vec())
    }
}

impl From<&str> for Program {
    fn from(text: &str) -> Self {
        Program(text.as_bytes().to_vec())
    }
}

impl From<String> for Program {
    fn from(text: String) -> Self {
        Program(text.into_bytes())
    }
}
