//! Infrastructure layer: the Redis-backed transport that carries
//! `swarmlink-core` traffic between processes.

pub mod redis;

pub use redis::{RedisTransport, TransportError};
