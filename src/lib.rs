//! Kernel object introspection.
//!
//! This crate re-exports the core types from [`kscope_core`] and, with the
//! `os-windows` feature, the Windows engine under [`os::windows`].

pub use kscope_core::*;

/// Kernel flavors.
pub mod os {
    #[cfg(feature = "os-windows")]
    pub use kscope_windows as windows;
}
