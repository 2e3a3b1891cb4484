#![forbid(unsafe_code)]

pub mod aggregate;
pub mod backend;
pub mod checkpoint;
pub mod records;
pub mod repository;
pub mod sqlite;

pub use backend::{ProgressBackend, ProgressStorage};
pub use checkpoint::{Checkpoint, InMemoryCheckpoint};
pub use repository::StorageError;
