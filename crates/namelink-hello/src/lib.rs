//! Hello protocol: neighbor liveness probing for the namelink routing daemon.
//!
//! This crate holds the adjacency registry and the hello protocol engine. The
//! engine is a pure state machine: every entry point consumes one protocol
//! event, mutates only engine-owned state, and returns the observable events
//! it emitted plus the I/O and scheduling actions the driver must perform.
//! All I/O, signing, validation, and timers live in the node crate.

pub mod adjacency;
pub mod engine;
pub mod probe;
pub mod stats;

pub use adjacency::{Adjacency, AdjacencyList, Status};
pub use engine::{HelloAction, HelloConfig, HelloEngine, HelloEvent, HelloOutput};
pub use stats::{PacketCounters, PacketKind};
