//! Class-driver dispatcher: the single entry point per class driver.
//!
//! The device stack's enumeration engine drives every class driver
//! through one call surface, [`ClassEntry::entry`], handing it a
//! [`ClassCommand`] and getting exactly one status back. The dispatcher
//! owns the lifecycle state machine; the class-specific bodies
//! (descriptor parsing, control-request handling, the worker itself)
//! live behind the [`ClassHandler`] trait.
//!
//! Transition rules enforced here:
//!
//! ```text
//! Uninitialized --Initialize--> Initialized
//! Initialized   --Activate---> Active
//! Active        --Change-----> AltActive (alt != 0) / Active (alt 0)
//! Active/Alt    --Deactivate-> Deactivated
//! Deactivated   --Activate---> Active          (host reconfiguration)
//! any           --Uninitialize-> Uninitialized (forced release if mounted)
//! ```
//!
//! Activate and Change never leave partial endpoint claims behind on
//! failure; Change rolls back to the prior alternate setting.

use heapless::Vec;

use crate::bus::EndpointBus;
use crate::command::{ClassCommand, ClassIdentity, ClassRequest, ControlTransfer};
use crate::config;
use crate::error::{ClassError, ClassResult};
use crate::instance::{ClaimedEndpoint, ClassInstance, LifecycleState, WorkerExit, WorkerHandle};

/// Class-specific operations invoked from the lifecycle commands.
///
/// Implementations must be safe to call with interrupts disabled on the
/// deactivation path (`cancel_worker`, `on_deactivate`): no blocking,
/// no unbounded waits, no assumption that the transport still answers.
pub trait ClassHandler {
    /// Class/subclass/protocol triples this driver answers Query for.
    fn identities(&self) -> &[ClassIdentity];

    /// Parse class configuration and allocate class-side resources.
    /// Runs before the instance is created; a `Parameter` or `Resource`
    /// error here leaves the driver uninitialized.
    fn on_initialize(&mut self, command: &ClassCommand<'_>) -> ClassResult {
        let _ = command;
        Ok(())
    }

    /// Release class-side resources. The instance is gone when this
    /// returns; any held endpoints/worker were already torn down.
    fn on_uninitialize(&mut self) {}

    /// Interface mounted; endpoints are claimed when this runs.
    fn on_activate(&mut self, command: &ClassCommand<'_>) -> ClassResult {
        let _ = command;
        Ok(())
    }

    /// Alternate setting switched; new endpoints are claimed when this
    /// runs. Only called if [`supports_alternate_settings`] is true.
    ///
    /// [`supports_alternate_settings`]: Self::supports_alternate_settings
    fn on_change(&mut self, command: &ClassCommand<'_>) -> ClassResult {
        let _ = command;
        Ok(())
    }

    /// Interface unmounted; endpoints are already released.
    fn on_deactivate(&mut self) {}

    /// Whether this class exposes alternate settings. Drivers that do
    /// not (e.g. mass storage) report Change as `NotSupported`.
    fn supports_alternate_settings(&self) -> bool {
        false
    }

    /// Start the class worker task, if the class moves data in the
    /// background. `Ok(None)` means no worker is needed.
    fn start_worker(&mut self) -> Result<Option<WorkerHandle>, ClassError> {
        Ok(None)
    }

    /// Cancel the worker task. Cooperative, but bounded: the handler
    /// must give up after `timeout_ms` and report [`WorkerExit::TimedOut`];
    /// the dispatcher releases resources either way.
    fn cancel_worker(&mut self, worker: WorkerHandle, timeout_ms: u32) -> WorkerExit {
        let _ = (worker, timeout_ms);
        WorkerExit::Graceful
    }

    /// Upper bound for one worker cancellation (ms).
    fn cancel_timeout_ms(&self) -> u32 {
        config::WORKER_CANCEL_TIMEOUT_MS
    }

    /// Service a control-endpoint transfer addressed to this interface.
    fn control_request(&mut self, transfer: &mut ControlTransfer) -> ClassResult {
        let _ = transfer;
        Err(ClassError::NotSupported)
    }
}

/// Object-safe entry-point contract, the only surface the device stack
/// calls. One command in, exactly one status out.
///
/// Dispatch is synchronous and non-reentrant per driver: the stack must
/// not issue a second command for the same driver until the previous
/// one has returned.
pub trait ClassEntry {
    fn entry(&mut self, command: ClassCommand<'_>, bus: &mut dyn EndpointBus) -> ClassResult;
}

/// Dispatcher for one class driver: routes commands to `H` and keeps
/// the per-interface [`ClassInstance`] between Initialize and
/// Uninitialize.
#[derive(Debug)]
pub struct ClassDriver<H: ClassHandler> {
    handler: H,
    instance: Option<ClassInstance>,
}

/// Which class hook runs while mounting an interface setting.
#[derive(Clone, Copy)]
enum MountHook {
    Activate,
    Change,
}

impl<H: ClassHandler> ClassDriver<H> {
    /// Wrap a class handler. No instance exists until Initialize.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            instance: None,
        }
    }

    /// The bound runtime instance, if Initialize has run.
    pub fn instance(&self) -> Option<&ClassInstance> {
        self.instance.as_ref()
    }

    /// Shared access to the class handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Exclusive access to the class handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Current lifecycle state ([`LifecycleState::Uninitialized`] when
    /// no instance exists).
    pub fn state(&self) -> LifecycleState {
        self.instance
            .as_ref()
            .map_or(LifecycleState::Uninitialized, ClassInstance::state)
    }

    fn query(&self, command: &ClassCommand<'_>) -> ClassResult {
        // Pure classification: no instance state is touched.
        let matched = self.handler.identities().iter().any(|id| {
            id.matches(
                command.class_code,
                command.subclass_code,
                command.protocol_code,
            )
        });
        if matched {
            Ok(())
        } else {
            Err(ClassError::NoClassMatch)
        }
    }

    fn initialize(&mut self, command: &ClassCommand<'_>) -> ClassResult {
        if self.instance.is_some() {
            // Double Initialize is a caller contract violation; report
            // it instead of leaking the existing instance.
            return Err(ClassError::InvalidState);
        }

        self.handler.on_initialize(command)?;
        self.instance = Some(ClassInstance::new(command.interface_number));
        debug!("interface {} initialized", command.interface_number);
        Ok(())
    }

    fn uninitialize(&mut self, bus: &mut dyn EndpointBus) -> ClassResult {
        let Some(inst) = self.instance.as_mut() else {
            return Err(ClassError::InvalidState);
        };
        let interface = inst.interface_number();

        // A mounted instance is torn down as an implicit Deactivate
        // before the instance itself goes away.
        if inst.state().is_mounted() {
            if !inst.take_release_token() {
                return Err(ClassError::InvalidState);
            }
            warn!("interface {} uninitialized while mounted, forcing release", interface);
            // Token is intentionally not returned: the instance is
            // dropped below, so no later release path may run on it.
        }
        Self::release_resources(&mut self.handler, inst, bus);

        self.handler.on_uninitialize();
        self.instance = None;
        debug!("interface {} uninitialized", interface);
        Ok(())
    }

    fn activate(&mut self, command: &ClassCommand<'_>, bus: &mut dyn EndpointBus) -> ClassResult {
        let Some(inst) = self.instance.as_mut() else {
            return Err(ClassError::InvalidState);
        };
        match inst.state() {
            LifecycleState::Initialized | LifecycleState::Deactivated => {}
            _ => return Err(ClassError::InvalidState),
        }

        let (claimed, worker) =
            match Self::mount_setting(&mut self.handler, bus, command, MountHook::Activate) {
                Ok(mounted) => mounted,
                Err(err) => {
                    warn!(
                        "interface {} activate failed, no claims retained",
                        inst.interface_number()
                    );
                    return Err(err);
                }
            };

        for ep in &claimed {
            // Capacity was checked during the claim loop.
            let _ = inst.push_endpoint(*ep);
        }
        inst.set_worker(worker);
        inst.set_alternate_setting(command.alternate_setting);
        inst.set_state(if command.alternate_setting == 0 {
            LifecycleState::Active
        } else {
            LifecycleState::AltActive
        });
        info!(
            "interface {} mounted ({} endpoints)",
            inst.interface_number(),
            claimed.len()
        );
        Ok(())
    }

    fn change(&mut self, command: &ClassCommand<'_>, bus: &mut dyn EndpointBus) -> ClassResult {
        if !self.handler.supports_alternate_settings() {
            return Err(ClassError::NotSupported);
        }
        let Some(inst) = self.instance.as_mut() else {
            return Err(ClassError::InvalidState);
        };
        if !inst.state().is_mounted() {
            return Err(ClassError::InvalidState);
        }
        if !inst.take_release_token() {
            return Err(ClassError::InvalidState);
        }

        let prior_alt = inst.alternate_setting();

        // Tear down the old setting first; its endpoints may overlap
        // the new setting's.
        if let Some(worker) = inst.worker() {
            Self::cancel_bounded(&mut self.handler, inst, worker);
        }
        let old = inst.take_endpoints();
        let old_addresses: Vec<_, { config::MAX_INTERFACE_ENDPOINTS }> =
            old.iter().map(|ep| ep.address).collect();
        Self::release_set(bus, &old);

        let outcome = Self::mount_setting(&mut self.handler, bus, command, MountHook::Change);

        let result = match outcome {
            Ok((claimed, worker)) => {
                for ep in &claimed {
                    let _ = inst.push_endpoint(*ep);
                }
                inst.set_worker(worker);
                inst.set_alternate_setting(command.alternate_setting);
                info!(
                    "interface {} switched to alternate setting {}",
                    inst.interface_number(),
                    command.alternate_setting
                );
                Ok(())
            }
            Err(err) => {
                // Roll back to the prior alternate setting. Its
                // endpoints were just freed, so the re-claim only
                // fails if the controller itself is failing; then the
                // safe terminal state is Deactivated.
                warn!(
                    "interface {} change to alt {} failed, rolling back to alt {}",
                    inst.interface_number(),
                    command.alternate_setting,
                    prior_alt
                );
                match Self::restore_setting(&mut self.handler, inst, bus, &old_addresses) {
                    Ok(()) => inst.set_alternate_setting(prior_alt),
                    Err(()) => {
                        error!(
                            "interface {} rollback failed, deactivating",
                            inst.interface_number()
                        );
                        // Everything is released at this point, so the
                        // class gets the same unmount notification as a
                        // regular Deactivate.
                        self.handler.on_deactivate();
                        inst.set_alternate_setting(0);
                        inst.set_state(LifecycleState::Deactivated);
                        inst.return_release_token();
                        return Err(err);
                    }
                }
                Err(err)
            }
        };

        inst.set_state(if inst.alternate_setting() == 0 {
            LifecycleState::Active
        } else {
            LifecycleState::AltActive
        });
        inst.return_release_token();
        result
    }

    fn deactivate(&mut self, bus: &mut dyn EndpointBus) -> ClassResult {
        let Some(inst) = self.instance.as_mut() else {
            return Err(ClassError::InvalidState);
        };
        if !inst.state().is_mounted() {
            // Second Deactivate in a row lands here: reported, and no
            // further release is performed.
            return Err(ClassError::InvalidState);
        }
        if !inst.take_release_token() {
            return Err(ClassError::InvalidState);
        }

        Self::release_resources(&mut self.handler, inst, bus);
        self.handler.on_deactivate();
        inst.set_alternate_setting(0);
        inst.set_state(LifecycleState::Deactivated);
        inst.return_release_token();
        info!("interface {} unmounted", inst.interface_number());
        Ok(())
    }

    fn request(&mut self, command: &mut ClassCommand<'_>) -> ClassResult {
        if self.instance.is_none() {
            return Err(ClassError::NoClassMatch);
        }
        let Some(transfer) = command.transfer.take() else {
            return Err(ClassError::Parameter);
        };
        // The handler's status is returned unchanged.
        self.handler.control_request(transfer)
    }

    /// Claim every endpoint in `set`, releasing all partial claims on
    /// the first failure so the bus is left exactly as it was found.
    fn claim_set(
        bus: &mut dyn EndpointBus,
        set: &[crate::command::EndpointAddress],
    ) -> Result<Vec<ClaimedEndpoint, { config::MAX_INTERFACE_ENDPOINTS }>, ClassError> {
        let mut claimed: Vec<ClaimedEndpoint, { config::MAX_INTERFACE_ENDPOINTS }> = Vec::new();
        for &address in set {
            let handle = match bus.claim(address) {
                Ok(handle) => handle,
                Err(err) => {
                    Self::release_set(bus, &claimed);
                    return Err(err);
                }
            };
            if claimed.push(ClaimedEndpoint { address, handle }).is_err() {
                bus.release(handle);
                Self::release_set(bus, &claimed);
                return Err(ClassError::Resource);
            }
        }
        Ok(claimed)
    }

    /// Claim the target setting's endpoints, run the class hook, and
    /// start the worker, unwinding all claims on any failure.
    fn mount_setting(
        handler: &mut H,
        bus: &mut dyn EndpointBus,
        command: &ClassCommand<'_>,
        hook: MountHook,
    ) -> Result<
        (
            Vec<ClaimedEndpoint, { config::MAX_INTERFACE_ENDPOINTS }>,
            Option<WorkerHandle>,
        ),
        ClassError,
    > {
        let claimed = Self::claim_set(bus, command.endpoints)?;

        let hooked = match hook {
            MountHook::Activate => handler.on_activate(command),
            MountHook::Change => handler.on_change(command),
        };
        if let Err(err) = hooked {
            Self::release_set(bus, &claimed);
            return Err(err);
        }

        match handler.start_worker() {
            Ok(worker) => Ok((claimed, worker)),
            Err(err) => {
                Self::release_set(bus, &claimed);
                Err(err)
            }
        }
    }

    fn release_set(bus: &mut dyn EndpointBus, set: &[ClaimedEndpoint]) {
        for ep in set {
            bus.release(ep.handle);
        }
    }

    /// Cancel the worker with the class-defined bound, then forget it.
    fn cancel_bounded(handler: &mut H, inst: &mut ClassInstance, worker: WorkerHandle) {
        let timeout = handler.cancel_timeout_ms();
        if handler.cancel_worker(worker, timeout) == WorkerExit::TimedOut {
            warn!(
                "interface {} worker did not stop within {} ms, releasing anyway",
                inst.interface_number(),
                timeout
            );
        }
        inst.set_worker(None);
    }

    /// Release the worker and all endpoints held by `inst`. Runs on
    /// the removal path too, so it only does bounded cancellation and
    /// infallible bookkeeping releases.
    fn release_resources(handler: &mut H, inst: &mut ClassInstance, bus: &mut dyn EndpointBus) {
        if let Some(worker) = inst.worker() {
            Self::cancel_bounded(handler, inst, worker);
        }
        let endpoints = inst.take_endpoints();
        Self::release_set(bus, &endpoints);
    }

    /// Re-claim the prior setting's endpoints and restart the worker
    /// after a failed Change.
    fn restore_setting(
        handler: &mut H,
        inst: &mut ClassInstance,
        bus: &mut dyn EndpointBus,
        addresses: &[crate::command::EndpointAddress],
    ) -> Result<(), ()> {
        let claimed = Self::claim_set(bus, addresses).map_err(|_| ())?;
        let worker = match handler.start_worker() {
            Ok(worker) => worker,
            Err(_) => {
                Self::release_set(bus, &claimed);
                return Err(());
            }
        };
        for ep in &claimed {
            let _ = inst.push_endpoint(*ep);
        }
        inst.set_worker(worker);
        Ok(())
    }
}

impl<H: ClassHandler> ClassEntry for ClassDriver<H> {
    /// Route one lifecycle command. Every command kind yields exactly
    /// one status; unrecognized kinds report `NotSupported` rather
    /// than faulting.
    fn entry(&mut self, mut command: ClassCommand<'_>, bus: &mut dyn EndpointBus) -> ClassResult {
        match command.request {
            Some(ClassRequest::Initialize) => self.initialize(&command),
            Some(ClassRequest::Uninitialize) => self.uninitialize(bus),
            Some(ClassRequest::Query) => self.query(&command),
            Some(ClassRequest::Activate) => self.activate(&command, bus),
            Some(ClassRequest::Change) => self.change(&command, bus),
            Some(ClassRequest::Deactivate) => self.deactivate(bus),
            Some(ClassRequest::Request) => self.request(&mut command),
            None => {
                warn!("unrecognized class command");
                Err(ClassError::NotSupported)
            }
        }
    }
}
