//! Compile-time limits consumed by the dispatcher and registry.
//!
//! The device-stack core owns these numbers; they live here so a port
//! can tune them in one place. All state is sized statically - there is
//! no heap anywhere in this crate.

// Registry

/// Maximum number of class drivers that can be registered at once.
pub const MAX_CLASS_DRIVERS: usize = 4;

// Endpoints

/// Maximum endpoints a single interface (one alternate setting) declares.
pub const MAX_INTERFACE_ENDPOINTS: usize = 4;

/// Capacity of a [`ClaimTable`](crate::bus::ClaimTable) - total endpoints
/// the device controller exposes across all interfaces.
pub const MAX_CLAIMED_ENDPOINTS: usize = 8;

// Control transfers

/// Maximum payload carried by one control transfer (bytes).
pub const MAX_CONTROL_PAYLOAD: usize = 256;

// Storage-style classes

/// Maximum logical units a storage-type class driver may expose.
pub const MAX_LOGICAL_UNITS: usize = 2;

// Worker tasks

/// Default upper bound on cooperative worker-task cancellation (ms).
///
/// A class handler may override this per instance; once the bound is
/// reached the dispatcher releases resources unconditionally.
pub const WORKER_CANCEL_TIMEOUT_MS: u32 = 1_000;

// Port layer

/// Maximum simultaneous context-extension bindings (tasks + timers).
pub const MAX_CONTEXT_BINDINGS: usize = 8;
