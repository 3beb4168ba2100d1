//! Core types, constants, and wire formats for the namelink routing daemon.
//!
//! This crate defines hierarchical router names with their prefix/suffix
//! operations, the TLV wire codec for hello packets (probe, data, nack),
//! and the shared protocol constants used by the hello and routing layers.

pub mod constants;
pub mod error;
pub mod name;
pub mod wire;

pub use constants::{INFO_COMPONENT, NLSR_COMPONENT};
pub use error::{NameError, WireError};
pub use name::{NameComponent, RouterName};
pub use wire::{DataPacket, Nack, NackReason, Packet, Probe};
