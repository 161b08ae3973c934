//! Scoped ownership of kernel resources.
//!
//! Each guard undoes exactly one acquisition when dropped, so the release
//! runs on every exit path, including early returns through `?`.

use kscope_core::{AccessMode, Handle, KernelBackend, Va};

/// A referenced object, dereferenced on drop.
pub struct ObjectReference<'a, Backend>
where
    Backend: KernelBackend,
{
    backend: &'a Backend,
    object: Va,
}

impl<'a, Backend> ObjectReference<'a, Backend>
where
    Backend: KernelBackend,
{
    pub(crate) fn new(backend: &'a Backend, object: Va) -> Self {
        Self { backend, object }
    }

    /// Returns the address of the object body.
    pub fn va(&self) -> Va {
        self.object
    }
}

impl<Backend> Drop for ObjectReference<'_, Backend>
where
    Backend: KernelBackend,
{
    fn drop(&mut self) {
        self.backend.dereference_object(self.object);
    }
}

/// The calling thread attached to another process, detached on drop.
pub struct AttachGuard<'a, Backend>
where
    Backend: KernelBackend,
{
    backend: &'a Backend,
    state: Option<Backend::ApcState>,
}

impl<'a, Backend> AttachGuard<'a, Backend>
where
    Backend: KernelBackend,
{
    pub(crate) fn new(backend: &'a Backend, process: Va) -> Self {
        let state = backend.stack_attach_process(process);
        Self {
            backend,
            state: Some(state),
        }
    }
}

impl<Backend> Drop for AttachGuard<'_, Backend>
where
    Backend: KernelBackend,
{
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.backend.unstack_detach_process(state);
        }
    }
}

/// An open handle, closed on drop.
pub(crate) struct OwnedHandle<'a, Backend>
where
    Backend: KernelBackend,
{
    backend: &'a Backend,
    handle: Handle,
    mode: AccessMode,
}

impl<'a, Backend> OwnedHandle<'a, Backend>
where
    Backend: KernelBackend,
{
    pub(crate) fn new(backend: &'a Backend, handle: Handle, mode: AccessMode) -> Self {
        Self {
            backend,
            handle,
            mode,
        }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    /// Gives up ownership without closing the handle.
    pub(crate) fn into_inner(self) -> Handle {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }
}

impl<Backend> Drop for OwnedHandle<'_, Backend>
where
    Backend: KernelBackend,
{
    fn drop(&mut self) {
        self.backend.close_handle(self.handle, self.mode);
    }
}

/// A mapped view of a section, unmapped on drop.
pub(crate) struct MappedView<'a, Backend>
where
    Backend: KernelBackend,
{
    backend: &'a Backend,
    base: Va,
}

impl<'a, Backend> MappedView<'a, Backend>
where
    Backend: KernelBackend,
{
    pub(crate) fn new(backend: &'a Backend, base: Va) -> Self {
        Self { backend, base }
    }

    pub(crate) fn base(&self) -> Va {
        self.base
    }
}

impl<Backend> Drop for MappedView<'_, Backend>
where
    Backend: KernelBackend,
{
    fn drop(&mut self) {
        self.backend.unmap_view_of_section(self.base);
    }
}

/// The VPB spin lock, released on drop.
pub(crate) struct VpbLock<'a, Backend>
where
    Backend: KernelBackend,
{
    backend: &'a Backend,
    irql: u8,
}

impl<'a, Backend> VpbLock<'a, Backend>
where
    Backend: KernelBackend,
{
    pub(crate) fn acquire(backend: &'a Backend) -> Self {
        let irql = backend.acquire_vpb_spin_lock();
        Self { backend, irql }
    }
}

impl<Backend> Drop for VpbLock<'_, Backend>
where
    Backend: KernelBackend,
{
    fn drop(&mut self) {
        self.backend.release_vpb_spin_lock(self.irql);
    }
}
