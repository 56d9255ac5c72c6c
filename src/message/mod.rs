//! A minimal distributed message-passing API.
//!
//! This module exports a minimal message-passing API, encapsulated by the
//! [`Communicator`] trait. Implementors only need to write `send` and `recv`
//! operations for a given transport layer (a pure-Rust TCP example is
//! included in [`tcp::TcpCommunicator`]; an in-process example used by tests
//! and demos is in [`loopback::LoopbackCommunicator`]). The trait then
//! provides default implementations for broadcast and gather, which
//! [`crate::group::GroupComm`] uses to drive master/slave coordination within
//! one participant, and which [`crate::m2n::M2N`] uses, with a two-rank
//! group per link, as the inter-participant channel.

mod comm;
mod loopback;
mod null;
mod tcp;
pub(crate) mod util;

pub use comm::Communicator;
pub use loopback::LoopbackCommunicator;
pub use null::NullCommunicator;
pub use tcp::TcpCommunicator;
