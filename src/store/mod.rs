//! Session store implementations

mod memory;
mod traits;

pub use memory::MemoryStore;
pub use traits::{IdGenerator, SessionStore};

#[cfg(feature = "redis-store")]
mod redis_store;

#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

#[cfg(feature = "postgres-store")]
mod postgres;

#[cfg(feature = "postgres-store")]
pub use postgres::PostgresStore;
