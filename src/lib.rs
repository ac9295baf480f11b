//! Lifecycle dispatch layer between a USB device-stack core and
//! pluggable class drivers.
//!
//! Every class driver (audio, mass storage, ...) exposes one entry
//! point to the device stack: [`ClassEntry::entry`], called with a
//! [`ClassCommand`] as the host enumerates, configures, reconfigures,
//! or removes the device. This crate provides:
//!
//! - the command/status contract ([`command`], [`error`]),
//! - the lifecycle state machine a [`ClassDriver`] runs for its
//!   [`ClassHandler`] ([`dispatch`], [`instance`]),
//! - the registry the stack core selects drivers from ([`registry`]),
//! - the endpoint-claim boundary to the device controller ([`bus`]),
//! - the port primitives class drivers need under interrupt
//!   preemption ([`port`]).
//!
//! Class-protocol logic (descriptor parsing, SCSI, audio streaming)
//! stays in the class handlers; this crate is protocol-agnostic.
//!
//! The crate is `no_std`, allocation-free, and host-testable: the
//! default build has no logging backend, the `defmt` feature wires the
//! on-target one.

#![cfg_attr(not(test), no_std)]

// This module must come first so the others see its macros.
mod fmt;

pub mod bus;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod instance;
pub mod port;
pub mod registry;

pub use bus::{ClaimTable, EndpointBus, EndpointHandle};
pub use command::{
    ClassCommand, ClassIdentity, ClassRequest, ControlTransfer, EndpointAddress, SetupPacket,
};
pub use dispatch::{ClassDriver, ClassEntry, ClassHandler};
pub use error::{ClassError, ClassResult};
pub use instance::{ClaimedEndpoint, ClassInstance, LifecycleState, WorkerExit, WorkerHandle};
pub use registry::ClassRegistry;
