//! Transport backends for the shared mailbox.
//!
//! Only the in-process memory transport ships with the crate; hardware
//! deployments provide their own [`SignalRegisters`] implementation and
//! a `ComArea` mapped over the real shared memory.
//!
//! [`SignalRegisters`]: crate::signal::SignalRegisters

mod memory;

pub use memory::{memory_link, LocalRegisters, MemoryEndpoint, Peer};
