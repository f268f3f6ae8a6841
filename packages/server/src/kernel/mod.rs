//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod memory_store;
pub mod pg_store;
pub mod stream_hub;
pub mod stream_relay;
pub mod traits;

pub use deps::ServerDeps;
pub use memory_store::InMemoryCandidateStore;
pub use pg_store::PgCandidateStore;
pub use stream_hub::StreamHub;
pub use stream_relay::{StreamMessage, StreamRelay};
pub use traits::*;
