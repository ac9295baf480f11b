//! Port abstraction layer: the OS/platform primitives class drivers
//! and the dispatcher rely on.
//!
//! Pure platform adaptation, no policy: a scoped interrupt lockout, a
//! per-execution-context extension pointer, and a platform-width
//! integer alias. Everything else the dispatcher touches is portable
//! by construction.

pub mod extension;
pub mod interrupt;

pub use extension::{ContextId, ExtensionPtr};
pub use interrupt::with_interrupts_locked;

/// Unsigned integer wide enough to hold a pointer on the target.
///
/// Used where driver state is carried through pointer-width fields of
/// platform structures (task extensions, register words).
#[cfg(target_pointer_width = "64")]
pub type UWord = u64;

/// Unsigned integer wide enough to hold a pointer on the target.
#[cfg(not(target_pointer_width = "64"))]
pub type UWord = u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uword_is_pointer_width() {
        assert_eq!(
            core::mem::size_of::<UWord>(),
            core::mem::size_of::<usize>()
        );
    }
}
