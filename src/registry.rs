//! Class-driver registry owned by the device-stack collaborator.
//!
//! The enumeration engine does not know concrete driver types; it
//! holds a bounded table of [`ClassEntry`] references built at
//! startup, probes it with Query while walking interface descriptors,
//! and drives the selected slot through the lifecycle commands. There
//! is no hidden global state: the registry is a value the stack owns
//! and tears down at shutdown.

use heapless::Vec;

use crate::bus::EndpointBus;
use crate::command::ClassCommand;
use crate::config;
use crate::dispatch::ClassEntry;
use crate::error::{ClassError, ClassResult};

struct Slot<'a> {
    name: &'static str,
    driver: &'a mut dyn ClassEntry,
}

/// Bounded table of registered class drivers, scanned in registration
/// order during enumeration.
#[derive(Default)]
pub struct ClassRegistry<'a> {
    slots: Vec<Slot<'a>, { config::MAX_CLASS_DRIVERS }>,
}

impl<'a> ClassRegistry<'a> {
    /// Empty registry.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Add a class driver. Fails with `Resource` when all
    /// [`MAX_CLASS_DRIVERS`](config::MAX_CLASS_DRIVERS) slots are taken.
    pub fn register(&mut self, name: &'static str, driver: &'a mut dyn ClassEntry) -> ClassResult {
        self.slots
            .push(Slot { name, driver })
            .map_err(|_| ClassError::Resource)?;
        info!("registered class driver '{}'", name);
        Ok(())
    }

    /// Number of registered drivers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Name a slot was registered under.
    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.slots.get(index).map(|s| s.name)
    }

    /// Probe all drivers with Query for the given interface descriptor
    /// codes; the first match (in registration order) wins.
    pub fn select(
        &mut self,
        bus: &mut dyn EndpointBus,
        class: u8,
        subclass: u8,
        protocol: u8,
    ) -> Option<usize> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot
                .driver
                .entry(ClassCommand::query(class, subclass, protocol), bus)
            {
                Ok(()) => {
                    debug!("class {}/{}/{} -> '{}'", class, subclass, protocol, slot.name);
                    return Some(index);
                }
                Err(ClassError::NoClassMatch) => {}
                Err(_) => {
                    // Query is contractually side-effect-free; any
                    // other status is a misbehaving driver. Skip it.
                    warn!("driver '{}' returned a non-query status", slot.name);
                }
            }
        }
        None
    }

    /// Issue a command to the driver in `index`.
    pub fn dispatch(
        &mut self,
        index: usize,
        command: ClassCommand<'_>,
        bus: &mut dyn EndpointBus,
    ) -> ClassResult {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ClassError::NoClassMatch)?;
        slot.driver.entry(command, bus)
    }

    /// Issue a command given only its raw wire code (no payload).
    /// Unknown codes come back as `NotSupported` without ever reaching
    /// a driver's lifecycle logic.
    pub fn dispatch_raw(&mut self, index: usize, raw: u8, bus: &mut dyn EndpointBus) -> ClassResult {
        self.dispatch(index, ClassCommand::from_raw(raw), bus)
    }

    /// Tear the table down: every driver that still has an instance is
    /// uninitialized (forcing release if mounted), then the slots are
    /// dropped. Drivers that were never initialized report
    /// `InvalidState`, which is expected and ignored here.
    pub fn shutdown(&mut self, bus: &mut dyn EndpointBus) {
        for slot in self.slots.iter_mut() {
            match slot.driver.entry(ClassCommand::uninitialize(), bus) {
                Ok(()) => debug!("driver '{}' uninitialized", slot.name),
                Err(ClassError::InvalidState) => {}
                Err(_) => warn!("driver '{}' failed to uninitialize", slot.name),
            }
        }
        self.slots.clear();
        info!("class registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ClaimTable;
    use crate::command::{ClassIdentity, EndpointAddress};
    use crate::dispatch::{ClassDriver, ClassHandler};
    use crate::instance::LifecycleState;

    struct FixedIdentity(ClassIdentity);

    impl ClassHandler for FixedIdentity {
        fn identities(&self) -> &[ClassIdentity] {
            core::slice::from_ref(&self.0)
        }
    }

    #[test]
    fn select_walks_registration_order() {
        let mut bus = ClaimTable::new();
        let mut audio = ClassDriver::new(FixedIdentity(ClassIdentity::subclass(1, 1)));
        let mut storage = ClassDriver::new(FixedIdentity(ClassIdentity::class(8)));

        let mut registry = ClassRegistry::new();
        registry.register("audio", &mut audio).unwrap();
        registry.register("storage", &mut storage).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.name(0), Some("audio"));

        assert_eq!(registry.select(&mut bus, 1, 1, 0), Some(0));
        assert_eq!(registry.select(&mut bus, 8, 6, 0x50), Some(1));
        assert_eq!(registry.select(&mut bus, 0xFF, 0, 0), None);
    }

    #[test]
    fn registry_capacity_is_bounded() {
        let mut drivers: std::vec::Vec<_> = (0..=crate::config::MAX_CLASS_DRIVERS)
            .map(|n| ClassDriver::new(FixedIdentity(ClassIdentity::class(n as u8))))
            .collect();

        let mut registry = ClassRegistry::new();
        let mut result = Ok(());
        for driver in drivers.iter_mut() {
            result = registry.register("driver", driver);
        }
        // The final registration overflowed the table.
        assert_eq!(result, Err(ClassError::Resource));
        assert_eq!(registry.len(), crate::config::MAX_CLASS_DRIVERS);
    }

    #[test]
    fn dispatch_to_unknown_slot_is_no_class_match() {
        let mut bus = ClaimTable::new();
        let mut registry = ClassRegistry::new();
        assert_eq!(
            registry.dispatch(0, ClassCommand::initialize(0), &mut bus),
            Err(ClassError::NoClassMatch)
        );
    }

    #[test]
    fn raw_codes_route_and_unknown_is_not_supported() {
        let mut bus = ClaimTable::new();
        let mut driver = ClassDriver::new(FixedIdentity(ClassIdentity::class(8)));
        let mut registry = ClassRegistry::new();
        registry.register("storage", &mut driver).unwrap();

        // 1 = Initialize on the wire.
        assert_eq!(registry.dispatch_raw(0, 1, &mut bus), Ok(()));
        // Out-of-range code: reported upward, nothing dispatched.
        assert_eq!(
            registry.dispatch_raw(0, 0x7F, &mut bus),
            Err(ClassError::NotSupported)
        );
    }

    #[test]
    fn shutdown_uninitializes_bound_drivers() {
        let mut bus = ClaimTable::new();
        let mut mounted = ClassDriver::new(FixedIdentity(ClassIdentity::class(8)));
        let mut idle = ClassDriver::new(FixedIdentity(ClassIdentity::class(9)));

        let eps = [EndpointAddress::ep_in(1), EndpointAddress::ep_out(1)];
        {
            let mut registry = ClassRegistry::new();
            registry.register("mounted", &mut mounted).unwrap();
            registry.register("idle", &mut idle).unwrap();

            registry
                .dispatch(0, ClassCommand::initialize(0), &mut bus)
                .unwrap();
            registry
                .dispatch(0, ClassCommand::activate(&eps), &mut bus)
                .unwrap();
            assert_eq!(bus.claimed_count(), 2);

            registry.shutdown(&mut bus);
            assert!(registry.is_empty());
        }

        // The mounted driver was forced through release; the idle one
        // is untouched.
        assert_eq!(bus.claimed_count(), 0);
        assert_eq!(mounted.state(), LifecycleState::Uninitialized);
        assert_eq!(idle.state(), LifecycleState::Uninitialized);
    }
}
