pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;
