//! Device-controller boundary: endpoint claim and release.
//!
//! The concrete controller driver lives outside this crate; the
//! dispatcher only needs the claim/release pair. The contract is
//! strict one-owner: a claim for an endpoint that is already held
//! fails with `Resource`, which is how cross-instance exclusivity is
//! enforced at mount time.
//!
//! [`ClaimTable`] is a fixed-capacity claim tracker a controller port
//! can embed to get the exclusivity rule right without re-deriving it.

use heapless::Vec;

use crate::command::EndpointAddress;
use crate::config;
use crate::error::ClassError;

/// Controller-issued handle for one claimed endpoint. Opaque to the
/// dispatcher; only valid for a single claim/release cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointHandle(pub u16);

/// Endpoint claim/release primitives supplied by the device controller.
///
/// `release` must be pure bookkeeping: it runs on the removal path,
/// possibly with the transport already physically gone, so it can
/// neither block nor fail.
pub trait EndpointBus {
    /// Reserve `address` for exclusive use by one active instance.
    ///
    /// Fails with [`ClassError::Resource`] if the endpoint is already
    /// held or the controller is out of endpoint resources.
    fn claim(&mut self, address: EndpointAddress) -> Result<EndpointHandle, ClassError>;

    /// Return a previously claimed endpoint.
    fn release(&mut self, handle: EndpointHandle);

    /// Number of endpoints currently held across all instances.
    fn claimed_count(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct ClaimSlot {
    address: EndpointAddress,
    handle: EndpointHandle,
}

/// Fixed-capacity endpoint claim tracker.
///
/// Handles are never reused within the lifetime of the table, so a
/// stale release (e.g. after forced teardown already returned the
/// endpoint) is ignored instead of freeing someone else's claim.
#[derive(Debug, Default)]
pub struct ClaimTable {
    slots: Vec<ClaimSlot, { config::MAX_CLAIMED_ENDPOINTS }>,
    next_handle: u16,
}

impl ClaimTable {
    /// Empty table.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            next_handle: 0,
        }
    }

    /// `true` if `address` is currently held.
    pub fn is_claimed(&self, address: EndpointAddress) -> bool {
        self.slots.iter().any(|s| s.address == address)
    }
}

impl EndpointBus for ClaimTable {
    fn claim(&mut self, address: EndpointAddress) -> Result<EndpointHandle, ClassError> {
        if self.is_claimed(address) {
            warn!("endpoint {} already claimed", address.0);
            return Err(ClassError::Resource);
        }

        let handle = EndpointHandle(self.next_handle);
        self.slots
            .push(ClaimSlot { address, handle })
            .map_err(|_| ClassError::Resource)?;
        self.next_handle = self.next_handle.wrapping_add(1);

        trace!("claimed endpoint {} -> handle {}", address.0, handle.0);
        Ok(handle)
    }

    fn release(&mut self, handle: EndpointHandle) {
        if let Some(pos) = self.slots.iter().position(|s| s.handle == handle) {
            let slot = self.slots.swap_remove(pos);
            trace!("released endpoint {}", slot.address.0);
        }
    }

    fn claimed_count(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release_roundtrip() {
        let mut bus = ClaimTable::new();
        let ep = EndpointAddress::ep_in(1);

        let handle = bus.claim(ep).unwrap();
        assert!(bus.is_claimed(ep));
        assert_eq!(bus.claimed_count(), 1);

        bus.release(handle);
        assert!(!bus.is_claimed(ep));
        assert_eq!(bus.claimed_count(), 0);
    }

    #[test]
    fn double_claim_is_rejected() {
        let mut bus = ClaimTable::new();
        let ep = EndpointAddress::ep_out(2);

        bus.claim(ep).unwrap();
        assert_eq!(bus.claim(ep), Err(ClassError::Resource));
        // The failed claim must not disturb the original.
        assert_eq!(bus.claimed_count(), 1);
    }

    #[test]
    fn in_and_out_with_same_number_are_distinct() {
        let mut bus = ClaimTable::new();
        bus.claim(EndpointAddress::ep_in(1)).unwrap();
        bus.claim(EndpointAddress::ep_out(1)).unwrap();
        assert_eq!(bus.claimed_count(), 2);
    }

    #[test]
    fn capacity_exhaustion_reports_resource() {
        let mut bus = ClaimTable::new();
        for n in 0..config::MAX_CLAIMED_ENDPOINTS {
            // Alternate directions so every address is unique.
            let ep = if n % 2 == 0 {
                EndpointAddress::ep_in((n / 2) as u8 + 1)
            } else {
                EndpointAddress::ep_out((n / 2) as u8 + 1)
            };
            bus.claim(ep).unwrap();
        }
        assert_eq!(
            bus.claim(EndpointAddress::ep_in(15)),
            Err(ClassError::Resource)
        );
    }

    #[test]
    fn stale_release_is_ignored() {
        let mut bus = ClaimTable::new();
        let handle = bus.claim(EndpointAddress::ep_in(1)).unwrap();
        bus.release(handle);
        // Second release of the same handle: no-op, no panic.
        bus.release(handle);
        assert_eq!(bus.claimed_count(), 0);

        // A fresh claim gets a fresh handle; the stale one stays dead.
        let handle2 = bus.claim(EndpointAddress::ep_in(1)).unwrap();
        assert_ne!(handle, handle2);
        bus.release(handle);
        assert_eq!(bus.claimed_count(), 1);
        bus.release(handle2);
        assert_eq!(bus.claimed_count(), 0);
    }
}
