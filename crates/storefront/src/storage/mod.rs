//! Durable client-side key/value storage.
//!
//! The guest identifier and payment verification records live here. Both
//! uses are namespaced by the fixed prefixes in [`keys`] and must survive
//! process restarts, but nothing breaks if the store is cleared: a cleared
//! store simply regenerates the guest id and re-verifies payments.

mod file;
mod memory;

use std::sync::Arc;

use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors that can occur when reading or writing the store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store contents could not be encoded or decoded.
    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The store lock was poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
}

/// A synchronous string key/value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion cannot be persisted.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Store handle shared between components.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Storage keys and key prefixes.
pub mod keys {
    /// Key for the device's guest identifier.
    pub const GUEST_ID: &str = "bitebox.guest_id";

    /// Prefix for payment verification records.
    pub const PAYMENT_VERIFICATION_PREFIX: &str = "bitebox.payment_verification:";

    /// Key for the verification record of one `(session, guest)` pair.
    #[must_use]
    pub fn payment_verification(session_id: &str, guest_id: &str) -> String {
        format!("{PAYMENT_VERIFICATION_PREFIX}{session_id}:{guest_id}")
    }
}
