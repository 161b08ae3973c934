//! # Windows kernel object introspection
//!
//! This crate lets a trusted component inspect the kernel objects of
//! another process: its open handles, the objects behind them and the
//! names of file objects. It works on top of a [`KernelBackend`] that
//! exposes the platform's own primitives, and addresses undocumented
//! structure fields only through a validated [`OffsetTable`].
//!
//! ## Components
//!
//! - [`dyndata`]: build-fingerprinted offsets of undocumented fields
//! - [`HandleTableSession`]: handle enumeration under per-entry locking
//! - [`WindowsFileObject`]: best-effort file object naming
//! - [`query`]: the object information dispatcher reachable by callers
//!
//! ## Example
//!
//! ```no_run
//! # use kscope_core::{AccessMode, CallerBuffer, Handle, KernelBackend};
//! # use kscope_windows::{WindowsKernel, dyndata::DynConfiguration, query::{InformationClass, ObjectQueryRequest}};
//! # fn example<Backend: KernelBackend>(
//! #     backend: Backend,
//! #     config: DynConfiguration,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let kernel = WindowsKernel::new(backend);
//! kernel.load_configuration(&config, true);
//!
//! let request = ObjectQueryRequest {
//!     process_handle: Handle(0x40),
//!     handle: Handle(0x44),
//!     class: InformationClass::Name as u32,
//!     input: CallerBuffer::none(),
//!     output: CallerBuffer::none(),
//!     return_length: None,
//!     access_mode: AccessMode::KernelMode,
//! };
//!
//! // Probe for the required length first.
//! let required = kernel.query_information_object(&request).unwrap_err().required;
//! # Ok(())
//! # }
//! ```

// Allow Windows-specific naming conventions to be used throughout this module.
#![allow(
    non_snake_case,         // example: FILE_OBJECT.DeviceObject
    non_upper_case_globals,
)]

pub mod comps;
pub mod dyndata;
mod enumerate;
mod guard;
pub mod layout;
pub mod query;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use kscope_core::{
    AccessMode, Handle, KernelBackend, ObjectKind, PointerWidth, ProcessId, Status, Va,
};

pub use self::{
    comps::{
        DecodedHandleEntry, EntryLayout, FileObjectFlags, HandleTableSession, ObjectHeaderFlags,
        WindowsFileObject, WindowsHandleTableEntry, WindowsObject,
    },
    dyndata::{ConfigurationSource, DynConfiguration, DynField, OffsetResolver, OffsetTable},
    enumerate::HandleEnumerationRequest,
    guard::{AttachGuard, ObjectReference},
};

/// The introspection engine for a running Windows kernel.
pub struct WindowsKernel<Backend>
where
    Backend: KernelBackend,
{
    backend: Backend,
    dyndata: OffsetResolver,
}

impl<Backend> WindowsKernel<Backend>
where
    Backend: KernelBackend,
{
    /// Creates a new engine with no offset table loaded.
    ///
    /// Features that depend on undocumented fields fail with
    /// [`Status::NoInterface`] until [`load_configuration`] succeeds.
    ///
    /// [`load_configuration`]: Self::load_configuration
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            dyndata: OffsetResolver::new(),
        }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Returns the offset resolver.
    pub fn dyndata(&self) -> &OffsetResolver {
        &self.dyndata
    }

    /// Returns the offset table in effect.
    pub fn offsets(&self) -> Result<Arc<OffsetTable>, Status> {
        self.dyndata.resolve()
    }

    /// Validates a configuration against the running kernel and publishes it.
    pub fn load_configuration(&self, config: &DynConfiguration, signature_valid: bool) -> bool {
        let running = self.backend.kernel_fingerprint();
        self.dyndata.load(config, signature_valid, &running)
    }

    /// Reacts to a failed capability check naming `process_id`.
    ///
    /// See [`OffsetResolver::notify_verification_failed`].
    pub fn notify_verification_failed(
        &self,
        process_id: ProcessId,
        source: &impl ConfigurationSource,
    ) -> bool {
        let current = self.backend.process_id(self.backend.current_process());
        let running = self.backend.kernel_fingerprint();
        self.dyndata
            .notify_verification_failed(process_id, current, &running, source)
    }

    /// Returns the pointer width of the running kernel.
    pub fn pointer_width(&self) -> Result<PointerWidth, Status> {
        self.backend
            .kernel_fingerprint()
            .pointer_width()
            .ok_or(Status::NotSupported)
    }

    /// Returns the object with the given body address.
    pub fn object(&self, va: Va) -> WindowsObject<'_, Backend> {
        WindowsObject::new(self, va)
    }

    /// Returns the file object with the given body address.
    pub fn file_object(&self, va: Va) -> WindowsFileObject<'_, Backend> {
        WindowsFileObject::new(self, va)
    }

    /// Resolves a handle in the current context to a referenced object.
    pub fn reference_object(
        &self,
        handle: Handle,
        desired_access: u32,
        kind: Option<ObjectKind>,
        mode: AccessMode,
    ) -> Result<ObjectReference<'_, Backend>, Status> {
        let object = self
            .backend
            .reference_object_by_handle(handle, desired_access, kind, mode)?;
        Ok(ObjectReference::new(&self.backend, object))
    }

    /// Attaches the calling thread to `process` until the guard is dropped.
    pub fn attach(&self, process: Va) -> AttachGuard<'_, Backend> {
        AttachGuard::new(&self.backend, process)
    }

    /// Reads the character data of a `UNICODE_STRING` located at `va`.
    pub(crate) fn read_unicode_string(&self, va: Va) -> Result<Vec<u8>, Status> {
        let width = self.pointer_width()?;
        let length = self.backend.read_u16(va)? as usize;
        let buffer = self.backend.read_va(va + width.size() as u64, width)?;

        if buffer.is_null() {
            return Ok(Vec::new());
        }

        let mut data = vec![0u8; length];
        self.backend.read(buffer, &mut data)?;
        Ok(data)
    }
}
