//! Contracts with the platform primitives the engine builds on.
//!
//! None of these services is reimplemented by the engine. A backend wraps
//! the running kernel (or a simulation of it) and exposes exactly the
//! operations below.

use crate::{
    AccessMode, FileNameQuery, Handle, HandleAttributes, KernelFingerprint, NativeResult,
    ObjectAttributes, ObjectInformationClass, ObjectKind, PointerWidth, ProcessId,
    ProcessInformationClass, SectionInformationClass, Status, ThreadInformationClass, Va,
};

/// Access to kernel virtual memory.
pub trait KernelMemory {
    /// Reads kernel memory at `va` into `buffer`.
    fn read(&self, va: Va, buffer: &mut [u8]) -> Result<(), Status>;

    /// Atomically adds `value` to the pointer-sized integer at `va` and
    /// returns the previous value.
    fn interlocked_exchange_add(
        &self,
        va: Va,
        value: u64,
        width: PointerWidth,
    ) -> Result<u64, Status>;

    /// Reads a single byte.
    fn read_u8(&self, va: Va) -> Result<u8, Status> {
        let mut buffer = [0u8; 1];
        self.read(va, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Reads a 16-bit little-endian integer.
    fn read_u16(&self, va: Va) -> Result<u16, Status> {
        let mut buffer = [0u8; 2];
        self.read(va, &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    /// Reads a 32-bit little-endian integer.
    fn read_u32(&self, va: Va) -> Result<u32, Status> {
        let mut buffer = [0u8; 4];
        self.read(va, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit little-endian integer.
    fn read_u64(&self, va: Va) -> Result<u64, Status> {
        let mut buffer = [0u8; 8];
        self.read(va, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads a pointer of the given width.
    fn read_va(&self, va: Va, width: PointerWidth) -> Result<Va, Status> {
        match width {
            PointerWidth::U32 => Ok(Va(self.read_u32(va)? as u64)),
            PointerWidth::U64 => Ok(Va(self.read_u64(va)?)),
        }
    }
}

/// Access to memory owned by the caller of the engine.
///
/// Both operations contain faults: touching an inaccessible address
/// results in [`Status::AccessViolation`] rather than a crash.
pub trait CallerMemory {
    /// Copies `data` into the caller's memory at `va`.
    fn copy_to_caller(&self, va: Va, data: &[u8]) -> Result<(), Status>;

    /// Copies the caller's memory at `va` into `data`.
    fn copy_from_caller(&self, va: Va, data: &mut [u8]) -> Result<(), Status>;
}

/// Facts about the running kernel.
pub trait KernelInformation {
    /// Returns the fingerprint of the running kernel image.
    fn kernel_fingerprint(&self) -> KernelFingerprint;

    /// Returns the process the calling thread belongs to.
    fn current_process(&self) -> Va;

    /// Returns the system process (`PsInitialSystemProcess`).
    fn initial_system_process(&self) -> Va;

    /// Returns the identifier of a process.
    fn process_id(&self, process: Va) -> ProcessId;
}

/// Process lifetime, context and native process/thread queries.
pub trait ProcessServices {
    /// Saved state returned by an attach and consumed by the matching detach.
    type ApcState;

    /// Prevents the process from completing its exit.
    ///
    /// Fails if the process is already exiting.
    fn acquire_process_exit_synchronization(&self, process: Va) -> Result<(), Status>;

    /// Releases a previous [`acquire_process_exit_synchronization`].
    ///
    /// [`acquire_process_exit_synchronization`]: Self::acquire_process_exit_synchronization
    fn release_process_exit_synchronization(&self, process: Va);

    /// Attaches the calling thread to the address space of `process`.
    fn stack_attach_process(&self, process: Va) -> Self::ApcState;

    /// Detaches the calling thread, restoring the saved state.
    fn unstack_detach_process(&self, state: Self::ApcState);

    /// Returns the image file name tracked for the process, as UTF-16.
    fn process_image_file_name(&self, process_id: ProcessId) -> Option<Vec<u16>>;

    /// `ZwQueryInformationProcess`.
    fn query_information_process(
        &self,
        handle: Handle,
        class: ProcessInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult;

    /// `ZwQueryInformationThread`.
    fn query_information_thread(
        &self,
        handle: Handle,
        class: ThreadInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult;
}

/// Handle table primitives.
pub trait HandleTableServices {
    /// Iterates every used slot of the handle table at `table`.
    ///
    /// The callback receives the address of the handle table entry and the
    /// handle value. The entry is locked while the callback runs and is
    /// **not** unlocked by this primitive. Returning `true` from the callback
    /// stops the iteration.
    ///
    /// Returns `true` if the iteration was stopped by the callback.
    fn enum_handle_table(&self, table: Va, callback: &mut dyn FnMut(Va, Handle) -> bool)
    -> bool;

    /// Wakes the waiters blocked on the push lock at `push_lock`.
    fn unblock_push_lock(&self, push_lock: Va);
}

/// Object manager primitives.
pub trait ObjectServices {
    /// Resolves a handle to a referenced object body.
    ///
    /// The reference must be released with [`dereference_object`].
    ///
    /// [`dereference_object`]: Self::dereference_object
    fn reference_object_by_handle(
        &self,
        handle: Handle,
        desired_access: u32,
        kind: Option<ObjectKind>,
        mode: AccessMode,
    ) -> Result<Va, Status>;

    /// Releases a reference taken by [`reference_object_by_handle`].
    ///
    /// [`reference_object_by_handle`]: Self::reference_object_by_handle
    fn dereference_object(&self, object: Va);

    /// Returns the type descriptor (`_OBJECT_TYPE`) of an object body.
    fn object_type(&self, object: Va) -> Option<Va>;

    /// Classifies an object body.
    fn object_kind(&self, object: Va) -> Option<ObjectKind>;

    /// `ObQueryNameString`.
    ///
    /// Fills `buffer` with an `OBJECT_NAME_INFORMATION`.
    fn query_name_string(&self, object: Va, buffer: &mut [u8]) -> NativeResult;

    /// `ZwQueryObject`.
    fn query_object(
        &self,
        handle: Handle,
        class: ObjectInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult;

    /// `ObSetHandleAttributes`.
    fn set_handle_attributes(
        &self,
        handle: Handle,
        attributes: HandleAttributes,
        mode: AccessMode,
    ) -> Result<(), Status>;

    /// `ObOpenObjectByPointer`.
    fn open_object_by_pointer(
        &self,
        object: Va,
        attributes: ObjectAttributes,
        desired_access: u32,
        kind: ObjectKind,
        mode: AccessMode,
    ) -> Result<Handle, Status>;

    /// `ObDuplicateObject`.
    fn duplicate_object(
        &self,
        source_process: Va,
        source_handle: Handle,
        target_process: Va,
        desired_access: u32,
        attributes: ObjectAttributes,
        mode: AccessMode,
    ) -> Result<Handle, Status>;

    /// `ObCloseHandle`.
    fn close_handle(&self, handle: Handle, mode: AccessMode);
}

/// Section primitives.
pub trait SectionServices {
    /// `ZwQuerySection`.
    fn query_section(
        &self,
        handle: Handle,
        class: SectionInformationClass,
        buffer: &mut [u8],
    ) -> NativeResult;

    /// Maps a view of the section into the current process.
    fn map_view_of_section(&self, section: Handle) -> Result<Va, Status>;

    /// Unmaps a view mapped by [`map_view_of_section`].
    ///
    /// [`map_view_of_section`]: Self::map_view_of_section
    fn unmap_view_of_section(&self, base: Va);

    /// `ZwQueryVirtualMemory` with `MemoryMappedFilenameInformation`.
    fn query_mapped_file_name(&self, base: Va, buffer: &mut [u8]) -> NativeResult;
}

/// I/O manager and filter manager primitives.
pub trait IoServices {
    /// `IoGetTopLevelIrp() != NULL`.
    fn top_level_irp_present(&self) -> bool;

    /// `KeAreAllApcsDisabled()`.
    fn all_apcs_disabled(&self) -> bool;

    /// `FltGetFileNameInformationUnsafe`, returning the normalized name.
    fn file_name_information(&self, file: Va, query: FileNameQuery) -> Result<Vec<u16>, Status>;

    /// `IoGetAttachedDevice`.
    fn attached_device(&self, device: Va) -> Va;

    /// `IoGetRelatedDeviceObject`.
    fn related_device_object(&self, file: Va) -> Va;

    /// `MmDoesFileHaveUserWritableReferences`.
    fn file_has_user_writable_references(&self, section_object_pointer: Va) -> bool;

    /// `IoGetTransactionParameterBlock`.
    fn transaction_parameter_block(&self, file: Va) -> Option<Va>;

    /// `IoIsFileObjectIgnoringSharing`.
    fn is_file_object_ignoring_sharing(&self, file: Va) -> bool;

    /// `IoAcquireVpbSpinLock`, returning the previous IRQL.
    fn acquire_vpb_spin_lock(&self) -> u8;

    /// `IoReleaseVpbSpinLock`.
    fn release_vpb_spin_lock(&self, irql: u8);
}

/// A backend providing every platform primitive the engine uses.
pub trait KernelBackend:
    KernelMemory
    + CallerMemory
    + KernelInformation
    + ProcessServices
    + HandleTableServices
    + ObjectServices
    + SectionServices
    + IoServices
{
}

impl<T> KernelBackend for T where
    T: KernelMemory
        + CallerMemory
        + KernelInformation
        + ProcessServices
        + HandleTableServices
        + ObjectServices
        + SectionServices
        + IoServices
{
}
