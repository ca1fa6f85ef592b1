//! Memory orderings chosen per target architecture.
//!
//! Weak-memory targets get acquire/release on plain loads, stores and
//! read-modify-writes. x86 already orders those in hardware, so relaxed is
//! used there. Callers that need happens-before across threads pair these
//! with [`acquire_fence`] / [`release_fence`], which on x86 only stop the
//! compiler from reordering and cost nothing at runtime.

use std::sync::atomic::{fence, Ordering};

#[cfg(any(
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "riscv32",
    target_arch = "riscv64",
))]
mod arch {
    use std::sync::atomic::Ordering;

    pub const LOAD: Ordering = Ordering::Acquire;
    pub const STORE: Ordering = Ordering::Release;
    pub const RMW: Ordering = Ordering::AcqRel;
}

#[cfg(not(any(
    target_arch = "aarch64",
    target_arch = "arm",
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "riscv32",
    target_arch = "riscv64",
)))]
mod arch {
    use std::sync::atomic::Ordering;

    pub const LOAD: Ordering = Ordering::Relaxed;
    pub const STORE: Ordering = Ordering::Relaxed;
    pub const RMW: Ordering = Ordering::Relaxed;
}

/// Ordering for atomic loads on the fast path.
pub const LOAD: Ordering = arch::LOAD;
/// Ordering for atomic stores on the fast path.
pub const STORE: Ordering = arch::STORE;
/// Ordering for successful read-modify-write operations on the fast path.
pub const RMW: Ordering = arch::RMW;

/// Failure ordering to go with [`RMW`] in compare-exchange calls.
///
/// A failure ordering may not contain a release component.
pub const RMW_FAILURE: Ordering = match arch::RMW {
    Ordering::AcqRel => Ordering::Acquire,
    _ => Ordering::Relaxed,
};

#[inline]
pub fn acquire_fence() {
    fence(Ordering::Acquire);
}

#[inline]
pub fn release_fence() {
    fence(Ordering::Release);
}
