//! Per-mounted-interface runtime state.
//!
//! A [`ClassInstance`] is created by Initialize and destroyed by
//! Uninitialize; between those two events it survives any number of
//! Activate / Change / Deactivate cycles (repeated host
//! reconfiguration). The instance is owned by the dispatcher/handler
//! pair; the device stack only ever holds an opaque reference.
//!
//! Invariant maintained by the dispatcher: `endpoints` and `worker`
//! are non-empty exactly while the state is `Active` or `AltActive`.

use heapless::Vec;

use crate::bus::EndpointHandle;
use crate::command::EndpointAddress;
use crate::config;

/// Lifecycle states of a class-driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LifecycleState {
    /// No instance exists for the interface.
    Uninitialized,
    /// Instance created, interface not mounted.
    Initialized,
    /// Interface mounted on the default (zero) alternate setting.
    Active,
    /// Interface mounted on a non-zero alternate setting.
    AltActive,
    /// Interface unmounted after having been active.
    Deactivated,
}

impl LifecycleState {
    /// `true` while the interface is mounted (endpoints held, worker
    /// possibly running).
    pub const fn is_mounted(self) -> bool {
        matches!(self, Self::Active | Self::AltActive)
    }
}

/// Handle to a class worker task, issued by the class handler when the
/// dispatcher starts it on Activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WorkerHandle(pub u32);

/// How a worker-task cancellation concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkerExit {
    /// The worker acknowledged cancellation within the timeout.
    Graceful,
    /// The timeout expired; resources are released unconditionally.
    TimedOut,
}

/// One endpoint held by an active instance: the descriptor address it
/// was claimed for plus the controller handle to release it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClaimedEndpoint {
    pub address: EndpointAddress,
    pub handle: EndpointHandle,
}

/// Runtime state of one mounted interface.
#[derive(Debug)]
pub struct ClassInstance {
    state: LifecycleState,
    endpoints: Vec<ClaimedEndpoint, { config::MAX_INTERFACE_ENDPOINTS }>,
    worker: Option<WorkerHandle>,
    alternate_setting: u8,
    /// Ownership token for resource release. Deactivate may arrive from
    /// an interrupt-level removal notification while a task-level
    /// teardown is mid-flight; whoever takes the token performs the
    /// release, the loser reports `InvalidState`.
    releasing: bool,
    interface_number: u8,
}

impl ClassInstance {
    /// Fresh instance in the `Initialized` state.
    pub(crate) fn new(interface_number: u8) -> Self {
        Self {
            state: LifecycleState::Initialized,
            endpoints: Vec::new(),
            worker: None,
            alternate_setting: 0,
            releasing: false,
            interface_number,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Endpoints currently held.
    pub fn endpoints(&self) -> &[ClaimedEndpoint] {
        &self.endpoints
    }

    /// Worker-task handle, if a worker is running.
    pub fn worker(&self) -> Option<WorkerHandle> {
        self.worker
    }

    /// Currently selected alternate setting.
    pub fn alternate_setting(&self) -> u8 {
        self.alternate_setting
    }

    /// Interface number this instance is bound to.
    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// `true` if the endpoints/worker invariant holds for the current
    /// state. Checked by tests after every transition.
    pub fn invariant_holds(&self) -> bool {
        if self.state.is_mounted() {
            !self.endpoints.is_empty()
        } else {
            self.endpoints.is_empty() && self.worker.is_none()
        }
    }

    /// Take the release-ownership token. Runs under interrupt lockout:
    /// the check and the set must not be separated by a preempting
    /// removal notification.
    pub(crate) fn take_release_token(&mut self) -> bool {
        critical_section::with(|_| {
            if self.releasing {
                false
            } else {
                self.releasing = true;
                true
            }
        })
    }

    /// Return the release token after teardown completed.
    pub(crate) fn return_release_token(&mut self) {
        critical_section::with(|_| self.releasing = false);
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    pub(crate) fn set_alternate_setting(&mut self, alt: u8) {
        self.alternate_setting = alt;
    }

    pub(crate) fn set_worker(&mut self, worker: Option<WorkerHandle>) {
        self.worker = worker;
    }

    pub(crate) fn push_endpoint(&mut self, ep: ClaimedEndpoint) -> Result<(), ClaimedEndpoint> {
        self.endpoints.push(ep)
    }

    /// Drain all held endpoints for release, oldest first.
    pub(crate) fn take_endpoints(
        &mut self,
    ) -> Vec<ClaimedEndpoint, { config::MAX_INTERFACE_ENDPOINTS }> {
        core::mem::take(&mut self.endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_is_initialized_and_empty() {
        let inst = ClassInstance::new(2);
        assert_eq!(inst.state(), LifecycleState::Initialized);
        assert_eq!(inst.interface_number(), 2);
        assert_eq!(inst.alternate_setting(), 0);
        assert!(inst.endpoints().is_empty());
        assert!(inst.worker().is_none());
        assert!(inst.invariant_holds());
    }

    #[test]
    fn mounted_states_require_endpoints() {
        let mut inst = ClassInstance::new(0);
        inst.set_state(LifecycleState::Active);
        // Mounted with no endpoints: invariant broken.
        assert!(!inst.invariant_holds());

        inst.push_endpoint(ClaimedEndpoint {
            address: EndpointAddress::ep_in(1),
            handle: EndpointHandle(7),
        })
        .unwrap();
        assert!(inst.invariant_holds());
    }

    #[test]
    fn unmounted_states_forbid_resources() {
        let mut inst = ClassInstance::new(0);
        inst.set_worker(Some(WorkerHandle(1)));
        assert!(!inst.invariant_holds());

        inst.set_worker(None);
        assert!(inst.invariant_holds());
    }

    #[test]
    fn release_token_is_exclusive() {
        let mut inst = ClassInstance::new(0);
        assert!(inst.take_release_token());
        assert!(!inst.take_release_token());
        inst.return_release_token();
        assert!(inst.take_release_token());
    }

    #[test]
    fn state_mounted_predicate() {
        assert!(LifecycleState::Active.is_mounted());
        assert!(LifecycleState::AltActive.is_mounted());
        assert!(!LifecycleState::Initialized.is_mounted());
        assert!(!LifecycleState::Deactivated.is_mounted());
        assert!(!LifecycleState::Uninitialized.is_mounted());
    }
}
