//! Interface to the memory transport that performs bus transactions.
//!
//! A transport queues transactions without blocking and keeps the completion and error state
//! of each one under the [TransactionId] it returned. Buffers are shared so that a queued
//! transaction can fill (or drain) its slice of the caller's buffer after the request call
//! returns.
//!
//! Callers serialize the requests of one logical access on the device memory lock. The lock
//! is a plain spin lock and is never held while listeners, commands or reset hooks run, so
//! those may issue further accesses on the same device.

mod emulator;

pub use emulator::{MemoryEmulator, TransactionRecord};

use spin::Mutex;
use std::sync::Arc;

/// Kind of a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Read,
    Write,
    /// Read back for comparison against the last written content.
    Verify,
}

/// Identifier returned by [Transport::request_transaction].
pub type TransactionId = u32;

/// Byte buffer shared between the requester and the transport.
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Wrap `data` into a [SharedBuffer].
pub fn shared_buffer(data: Vec<u8>) -> SharedBuffer {
    Arc::new(Mutex::new(data))
}

/// A memory transport reached through a device acting as a hub.
pub trait Transport: Send + Sync {
    /// Queue one transaction of `size` bytes at `address`, using bytes
    /// `[buffer_offset, buffer_offset + size)` of `buffer`. Does not block.
    fn request_transaction(
        &self,
        address: u64,
        buffer: &SharedBuffer,
        size: usize,
        buffer_offset: usize,
        kind: TransactionKind,
    ) -> TransactionId;

    /// Block until transaction `id` and every transaction requested before it have completed.
    fn wait_transaction(&self, id: TransactionId);

    /// Error code of the completed transaction `id`. Zero means success.
    fn query_error(&self, id: TransactionId) -> u32;

    /// Minimum access granularity in bytes.
    fn query_min_access_size(&self) -> u32;

    /// Maximum size of a single transaction in bytes.
    fn query_max_access_size(&self) -> u32;

    /// Timeout applied to waits, in microseconds.
    fn set_timeout(&self, micros: u64);
}
