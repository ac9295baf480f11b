//! Per-execution-context opaque extension pointer.
//!
//! Associates one opaque pointer (typically a class-driver instance)
//! with a task or timer context, so code running in that context can
//! find its state without threading a parameter through every call.
//! The table is bounded by
//! [`MAX_CONTEXT_BINDINGS`](crate::config::MAX_CONTEXT_BINDINGS) and
//! only ever touched under interrupt lockout.
//!
//! The platform integration installs a [provider](set_context_provider)
//! that names the currently executing context; [`current`] then
//! resolves the running task's binding with no extra parameters.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use heapless::Vec;

use crate::config;
use crate::error::{ClassError, ClassResult};

/// Identifier of one execution context (task or timer), assigned by
/// the platform integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ContextId(pub u32);

/// Opaque pointer bound to a context.
///
/// The table never dereferences it; only code running in the bound
/// context may, and only for as long as the pointee outlives the
/// binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionPtr(*mut ());

impl ExtensionPtr {
    /// Wrap a raw pointer for binding.
    pub fn new(ptr: *mut ()) -> Self {
        Self(ptr)
    }

    /// The wrapped raw pointer.
    pub fn as_ptr(self) -> *mut () {
        self.0
    }
}

// The pointer is a token here: stored and returned, never dereferenced
// by the table.
unsafe impl Send for ExtensionPtr {}

struct Binding {
    context: ContextId,
    extension: ExtensionPtr,
}

struct ExtensionTable {
    bindings: Vec<Binding, { config::MAX_CONTEXT_BINDINGS }>,
}

impl ExtensionTable {
    const fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    fn bind(&mut self, context: ContextId, extension: ExtensionPtr) -> ClassResult {
        if let Some(slot) = self.bindings.iter_mut().find(|b| b.context == context) {
            slot.extension = extension;
            return Ok(());
        }
        self.bindings
            .push(Binding { context, extension })
            .map_err(|_| ClassError::Resource)
    }

    fn get(&self, context: ContextId) -> Option<ExtensionPtr> {
        self.bindings
            .iter()
            .find(|b| b.context == context)
            .map(|b| b.extension)
    }

    fn unbind(&mut self, context: ContextId) -> Option<ExtensionPtr> {
        let pos = self.bindings.iter().position(|b| b.context == context)?;
        Some(self.bindings.swap_remove(pos).extension)
    }
}

static BINDINGS: Mutex<RefCell<ExtensionTable>> = Mutex::new(RefCell::new(ExtensionTable::new()));

static PROVIDER: Mutex<Cell<Option<fn() -> ContextId>>> = Mutex::new(Cell::new(None));

/// Bind `extension` to `context`, replacing any previous binding for
/// the same context. Fails with `Resource` when the table is full.
pub fn bind(context: ContextId, extension: ExtensionPtr) -> ClassResult {
    critical_section::with(|cs| BINDINGS.borrow_ref_mut(cs).bind(context, extension))
}

/// The extension bound to `context`, if any.
pub fn get(context: ContextId) -> Option<ExtensionPtr> {
    critical_section::with(|cs| BINDINGS.borrow_ref(cs).get(context))
}

/// Remove and return the binding for `context`.
pub fn unbind(context: ContextId) -> Option<ExtensionPtr> {
    critical_section::with(|cs| BINDINGS.borrow_ref_mut(cs).unbind(context))
}

/// Install the platform hook that names the currently executing
/// context. Called once by the platform integration at startup.
pub fn set_context_provider(provider: fn() -> ContextId) {
    critical_section::with(|cs| PROVIDER.borrow(cs).set(Some(provider)));
}

/// The extension bound to the currently executing context.
///
/// `None` if no provider is installed or the running context has no
/// binding.
pub fn current() -> Option<ExtensionPtr> {
    let provider = critical_section::with(|cs| PROVIDER.borrow(cs).get())?;
    get(provider())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global binding table is shared across the test binary, so
    // each test here works on its own context ids.

    #[test]
    fn bind_get_unbind_roundtrip() {
        let mut value = 5u32;
        let ext = ExtensionPtr::new(&mut value as *mut u32 as *mut ());

        bind(ContextId(100), ext).unwrap();
        assert_eq!(get(ContextId(100)), Some(ext));
        assert_eq!(get(ContextId(100)).map(ExtensionPtr::as_ptr), Some(ext.as_ptr()));

        assert_eq!(unbind(ContextId(100)), Some(ext));
        assert_eq!(get(ContextId(100)), None);
        assert_eq!(unbind(ContextId(100)), None);
    }

    #[test]
    fn rebind_replaces_existing_binding() {
        let mut a = 1u8;
        let mut b = 2u8;
        let ext_a = ExtensionPtr::new(&mut a as *mut u8 as *mut ());
        let ext_b = ExtensionPtr::new(&mut b as *mut u8 as *mut ());

        bind(ContextId(200), ext_a).unwrap();
        bind(ContextId(200), ext_b).unwrap();
        assert_eq!(get(ContextId(200)), Some(ext_b));

        unbind(ContextId(200));
    }

    #[test]
    fn unknown_context_has_no_binding() {
        assert_eq!(get(ContextId(0xDEAD)), None);
    }

    #[test]
    fn current_resolves_through_provider() {
        fn fixed_context() -> ContextId {
            ContextId(300)
        }

        let mut value = 9u32;
        let ext = ExtensionPtr::new(&mut value as *mut u32 as *mut ());
        bind(ContextId(300), ext).unwrap();

        set_context_provider(fixed_context);
        assert_eq!(current(), Some(ext));

        // Retrieval is read-only: the binding survives.
        assert_eq!(get(ContextId(300)), Some(ext));
        unbind(ContextId(300));
        assert_eq!(current(), None);
    }

    #[test]
    fn table_capacity_is_bounded() {
        let mut table = ExtensionTable::new();
        let mut values = [0u32; crate::config::MAX_CONTEXT_BINDINGS];

        for (n, value) in values.iter_mut().enumerate() {
            let ext = ExtensionPtr::new(value as *mut u32 as *mut ());
            table.bind(ContextId(n as u32), ext).unwrap();
        }

        let mut extra = 0u32;
        let ext = ExtensionPtr::new(&mut extra as *mut u32 as *mut ());
        assert_eq!(
            table.bind(ContextId(0xFFFF), ext),
            Err(ClassError::Resource)
        );

        // Rebinding an existing context does not need a free slot.
        assert_eq!(table.bind(ContextId(0), ext), Ok(()));
        assert_eq!(table.get(ContextId(0)), Some(ext));
    }
}
