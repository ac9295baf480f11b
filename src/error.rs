//! Status taxonomy returned by every class-driver entry point.
//!
//! We avoid `alloc` - every variant is fieldless so the status stays
//! `Copy` and costs one byte on the wire between stack and driver.

/// Failure statuses a lifecycle command can report.
///
/// Commands that complete return `Ok(())`; nothing is retried inside
/// the dispatcher - retry policy belongs to the device stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClassError {
    /// Malformed descriptor or command payload (Initialize / Query).
    Parameter,

    /// Instance allocation or endpoint claim failed. Any partial claims
    /// have already been rolled back when this is returned.
    Resource,

    /// Command issued against an instance whose state forbids it, or
    /// against a context with no known instance.
    InvalidState,

    /// Query found no matching class/subclass/protocol, or Request
    /// addressed an interface with no bound instance.
    NoClassMatch,

    /// Command kind is not recognized or not implemented by this class.
    /// Terminal but non-fatal; reported upward, never a panic.
    NotSupported,
}

/// Result alias used by every dispatch operation.
pub type ClassResult = Result<(), ClassError>;
