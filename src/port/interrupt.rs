//! Scoped interrupt lockout.
//!
//! Thin facade over the `critical-section` crate: preemption is
//! disabled on entry and the prior state is restored on every exit
//! path, including early returns and panics that unwind through the
//! closure. No lockout can leak across an error return.
//!
//! Resource-release code on the removal path runs inside one of these
//! regions, so closures must stay short and must not block.

pub use critical_section::CriticalSection;

/// Run `f` with interrupts locked out.
///
/// The [`CriticalSection`] token proves the lockout to callees without
/// them re-acquiring it. Nesting is permitted; the outermost region
/// restores the original state.
pub fn with_interrupts_locked<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
    critical_section::with(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_closure_value() {
        let value = with_interrupts_locked(|_cs| 42u32);
        assert_eq!(value, 42);
    }

    #[test]
    fn regions_nest() {
        let value = with_interrupts_locked(|_outer| with_interrupts_locked(|_inner| 7u8));
        assert_eq!(value, 7);
    }

    #[test]
    fn lockout_released_after_error_path() {
        // An early Err return must not leave the lockout held; a
        // subsequent region would deadlock if it did.
        let result: Result<(), ()> = with_interrupts_locked(|_cs| Err(()));
        assert!(result.is_err());
        assert_eq!(with_interrupts_locked(|_cs| 1u8), 1);
    }
}
