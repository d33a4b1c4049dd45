//! Roster Server - process bootstrap and message bus adapter
//!
//! Wires the configured persistent store and the Redis coordination store
//! into the sync engine and feeds it from Redis Streams.

pub mod bus;
pub mod model;
pub mod startup;
