use std::{ops::ControlFlow, sync::Arc};

use kscope_core::{KernelBackend, PointerWidth, Status, Va};

use super::{DecodedHandleEntry, EntryLayout, WindowsHandleTableEntry, macros::impl_backend};
use crate::{DynField, OffsetTable, WindowsKernel};

/// A process handle table held open for enumeration.
///
/// While the session exists, the owning process cannot complete its exit.
/// The exit barrier is released exactly once, when the session is dropped.
///
/// # Implementation Details
///
/// Corresponds to `_HANDLE_TABLE`, guarded by
/// `PsAcquireProcessExitSynchronization`.
pub struct HandleTableSession<'a, Backend>
where
    Backend: KernelBackend,
{
    /// The engine.
    kernel: &'a WindowsKernel<Backend>,

    /// The offset table the session was opened with.
    offsets: Arc<OffsetTable>,

    /// The process owning the table.
    process: Va,

    /// The virtual address of the `_HANDLE_TABLE` structure.
    table: Va,
}

impl<'a, Backend> HandleTableSession<'a, Backend>
where
    Backend: KernelBackend,
{
    impl_backend!();

    fn acquire(kernel: &'a WindowsKernel<Backend>, process: Va) -> Result<Self, Status> {
        let offsets = kernel.offsets()?;
        let object_table = offsets.get(DynField::EpObjectTable)?;
        offsets.get(DynField::HtHandleContentionEvent)?;
        EntryLayout::select(&offsets)?;

        if let Err(err) = kernel.backend().acquire_process_exit_synchronization(process) {
            tracing::debug!(%process, %err, "process is exiting");
            return Err(Status::TooLate);
        }

        // From here on, dropping the session releases the exit barrier.
        let mut session = Self {
            kernel,
            offsets,
            process,
            table: Va(0),
        };

        let width = session.offsets.pointer_width();
        let table = kernel
            .backend()
            .read_va(process + object_table as u64, width)?;

        if table.is_null() {
            tracing::debug!(%process, "process has no handle table");
            return Err(Status::NotFound);
        }

        session.table = table;
        Ok(session)
    }

    /// Returns the address of the `_HANDLE_TABLE` structure.
    pub fn va(&self) -> Va {
        self.table
    }

    /// Returns the process owning the table.
    pub fn process(&self) -> Va {
        self.process
    }

    /// Visits every used entry of the table in slot order.
    ///
    /// The visitor runs while the entry is locked. The entry is unlocked
    /// as soon as the visitor returns, whether it continues, breaks or
    /// unwinds.
    ///
    /// An entry that cannot be decoded is skipped and the enumeration
    /// continues. The first such failure is returned once the walk ends.
    ///
    /// # Implementation Details
    ///
    /// The functionality is similar to the Windows kernel's internal
    /// `ExEnumHandleTable()` callback followed by
    /// `ExUnlockHandleTableEntry()`.
    pub fn enumerate<F>(&self, mut visitor: F) -> Result<(), Status>
    where
        F: FnMut(&DecodedHandleEntry) -> ControlFlow<()>,
    {
        let contention = self.offsets.get(DynField::HtHandleContentionEvent)?;
        let width = self.offsets.pointer_width();
        let layout = EntryLayout::select(&self.offsets)?;
        let contention_event = self.table + contention as u64;

        let mut first_error = None;

        self.backend().enum_handle_table(self.table, &mut |va, handle| {
            let _lock = EntryLock {
                backend: self.backend(),
                entry: va,
                contention_event,
                width,
            };

            let entry = WindowsHandleTableEntry::new(self.kernel, layout, va);
            match entry.decode(handle) {
                Ok(decoded) => {
                    tracing::trace!(%handle, object = %decoded.object, "handle table entry");
                    visitor(&decoded).is_break()
                }
                Err(err) => {
                    tracing::debug!(%handle, entry = %va, %err, "failed to decode entry");
                    first_error.get_or_insert(err);
                    false
                }
            }
        });

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<Backend> Drop for HandleTableSession<'_, Backend>
where
    Backend: KernelBackend,
{
    fn drop(&mut self) {
        self.backend()
            .release_process_exit_synchronization(self.process);
    }
}

/// A locked handle table entry, unlocked on drop.
///
/// # Implementation Details
///
/// Sets the unlocked bit of `_HANDLE_TABLE_ENTRY.Value` and wakes the
/// waiters of `_HANDLE_TABLE.HandleContentionEvent`.
struct EntryLock<'a, Backend>
where
    Backend: KernelBackend,
{
    backend: &'a Backend,
    entry: Va,
    contention_event: Va,
    width: PointerWidth,
}

impl<Backend> Drop for EntryLock<'_, Backend>
where
    Backend: KernelBackend,
{
    fn drop(&mut self) {
        if let Err(err) = self
            .backend
            .interlocked_exchange_add(self.entry, 1, self.width)
        {
            tracing::error!(entry = %self.entry, %err, "failed to unlock handle table entry");
            return;
        }

        match self.backend.read_va(self.contention_event, self.width) {
            Ok(waiters) if waiters.is_null() => {}
            Ok(_) => self.backend.unblock_push_lock(self.contention_event),
            Err(err) => {
                tracing::warn!(event = %self.contention_event, %err, "waking contention event");
                self.backend.unblock_push_lock(self.contention_event);
            }
        }
    }
}

impl<Backend> WindowsKernel<Backend>
where
    Backend: KernelBackend,
{
    /// Opens the handle table of `process` for enumeration.
    ///
    /// Fails with [`Status::TooLate`] if the process is already exiting and
    /// with [`Status::NotFound`] if it has no handle table.
    pub fn acquire_handle_table(
        &self,
        process: Va,
    ) -> Result<HandleTableSession<'_, Backend>, Status> {
        HandleTableSession::acquire(self, process)
    }

    /// Visits every handle of `process`.
    ///
    /// See [`HandleTableSession::enumerate`].
    pub fn enumerate_handles<F>(&self, process: Va, visitor: F) -> Result<(), Status>
    where
        F: FnMut(&DecodedHandleEntry) -> ControlFlow<()>,
    {
        self.acquire_handle_table(process)?.enumerate(visitor)
    }
}
