mod batch;
mod error;
mod key;
mod traits;

pub mod filesystem;
pub mod memory;

pub use error::StorageError;
pub use key::StorageKey;
pub use traits::{BlobBatch, BlobStore, BoxReader};
