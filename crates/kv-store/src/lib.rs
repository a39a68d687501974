//! Key-value storage shared by the shop services.
//!
//! The store exposes plain GET/SET/DEL, set and sorted-set operations, and a
//! versioned SET that only commits when the key is still at the revision the
//! caller observed. That conditional write is the building block for every
//! optimistic read-modify-write loop in the services.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;
pub mod version;

pub use error::{KvStoreError, Result};
pub use memory::InMemoryKvStore;
pub use redis_store::RedisKvStore;
pub use store::{Entry, KvStore, KvStoreExt, SetOptions};
pub use version::Version;
