//! Error types returned by tree navigation and memory access.

use thiserror::Error;

/// Result alias used across the crate.
pub type RegResult<T> = Result<T, RegError>;

// region: Error Types

/// Errors raised while building, navigating or accessing a register tree.
///
/// Navigation errors are surfaced as is and never retried. Memory errors carry the raw code
/// reported by the transport; retry policy belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegError {
    /// The node being added already has a parent.
    #[error("error adding '{name}' to '{parent}': node is already attached")]
    AlreadyAttached { parent: String, name: String },
    /// The node being added is the target itself or one of its ancestors.
    #[error("error adding '{name}' to '{parent}': node is an ancestor of the target")]
    Cycle { parent: String, name: String },
    /// A sibling with the same name exists.
    #[error("error adding '{name}' to '{parent}': name collision")]
    NameCollision { parent: String, name: String },
    /// The parent subtree has been attached to a root and its shape is frozen.
    #[error("error adding '{name}' to '{parent}': tree is already rooted")]
    TreeAlreadyRooted { parent: String, name: String },
    /// No child (or array member) matches the requested name.
    #[error("'{path}' has no node '{name}'")]
    NotFound { path: String, name: String },
    /// An index expression such as `name[0:4]` could not be parsed.
    #[error("invalid index expression '{expr}'")]
    InvalidExpression { expr: String },
    /// A word is wider than the stride (or the 64-bit word) it is packed into.
    #[error("'{path}': word width of {word_bits} bits does not fit a stride of {stride} bytes")]
    InvalidWidth {
        path: String,
        word_bits: u32,
        stride: usize,
    },
    /// The transport reported a non-zero error code.
    #[error("memory error on '{path}' at address {address:#x}: code {code:#x}")]
    MemoryAccess { path: String, address: u64, code: u32 },
    /// A verify read returned bits that differ from the written content.
    #[error("verify mismatch on '{path}' at address {address:#x}")]
    VerifyMismatch { path: String, address: u64 },
    /// A hardware access was requested but no transport exists in the ancestor chain.
    #[error("'{path}' has no memory transport")]
    NoTransport { path: String },
    /// A hardware-backed variable has no block yet (tree not started, or no offset).
    #[error("'{path}' is not backed by a block")]
    NotAttached { path: String },
    /// The operation does not apply to this kind of node.
    #[error("'{path}' is not a {expected}")]
    WrongKind { path: String, expected: &'static str },
    /// The value does not fit the variable.
    #[error("'{path}' cannot hold value {value}")]
    InvalidValue { path: String, value: String },
    /// Write requested on a read-only variable.
    #[error("'{path}' is read-only")]
    ReadOnly { path: String },
    /// Hardware read requested on a write-only variable.
    #[error("'{path}' is write-only")]
    WriteOnly { path: String },
}

// endregion
