//! Core types and backend contracts for kernel object introspection.
//!
//! This crate holds everything the introspection engine shares across
//! kernel flavors: address and handle newtypes, the status taxonomy,
//! validated access to caller buffers, structure snapshots and the traits
//! a backend implements to expose the platform's own primitives.

mod access;
pub mod backend;
mod core;
mod error;
mod fingerprint;
pub mod native;
mod scratch;
mod struct_reader;
mod unicode;

pub use self::{
    access::{AccessMode, CallerAccess, CallerBuffer, USER_PROBE_ADDRESS},
    backend::{
        CallerMemory, HandleTableServices, IoServices, KernelBackend, KernelInformation,
        KernelMemory, ObjectServices, ProcessServices, SectionServices,
    },
    core::{Handle, Hex, PointerWidth, ProcessId, Va},
    error::{LengthStatus, NativeResult, Status},
    fingerprint::KernelFingerprint,
    native::{
        FileNameQuery, HandleAttributes, ObjectAttributes, ObjectInformationClass, ObjectKind,
        ProcessInformationClass, SectionInformationClass, ThreadInformationClass,
    },
    scratch::{ScratchBuffer, query_sized, scratch},
    struct_reader::{Field, StructReader},
    unicode::{UnicodeString, utf16},
};
