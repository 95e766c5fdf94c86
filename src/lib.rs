//! NVMe over Fabrics host initiator.
//!
//! Callers program against the [`Initiator`] trait. [`NvmeInitiator`] drives the `nvme` command
//! line tool, optionally inside a chroot, and [`MockNvmeInitiator`] synthesizes results for
//! tests of dependent code.

pub mod cli;
pub mod devices;
pub mod discovery;
pub mod host;
pub mod initiator;
pub mod lifecycle;
pub mod mock;
pub mod sessions;

#[cfg(test)]
mod testutils;

pub use initiator::{Initiator, NvmeInitiator};
pub use initiator_api::{config, error, model};
pub use mock::{Cardinality, Fault, FaultInjection, MockNvmeInitiator};
