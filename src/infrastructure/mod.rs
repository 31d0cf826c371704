//! Adapters for the domain ports: stores and security collaborators.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod security;
