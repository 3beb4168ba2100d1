//! The namelink routing daemon.
//!
//! Wires the hello protocol engine and the link-cost pipeline into a single
//! async event loop, together with configuration, logging, faces, signing,
//! and one-shot scheduling.

pub mod config;
pub mod error;
pub mod face;
pub mod logging;
pub mod node;
pub mod scheduler;
pub mod signing;

pub use config::NodeConfig;
pub use error::NodeError;
pub use face::{AnyFace, FaceError, MemoryFace, UdpFace};
pub use node::{Node, NodeEvent, ShutdownHandle};
pub use scheduler::{CancelHandle, Scheduler, monotonic_now};
pub use signing::{
    AcceptAllValidator, Ed25519Signer, Ed25519Validator, Sign, Validate, ValidationError,
};
