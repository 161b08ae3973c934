//! The object information dispatcher.
//!
//! Every request names a process, a handle in that process' handle table
//! and an [`InformationClass`]. The dispatcher resolves the handle in the
//! right context, runs the class-specific query and copies the result to
//! the caller's buffer, reporting the exact length required whenever the
//! buffer is too small.

mod class;
pub mod info;
mod negotiate;
mod set;


use kscope_core::{
    AccessMode, CallerAccess, CallerBuffer, Handle, KernelBackend, LengthStatus, NativeResult,
    ObjectAttributes, ObjectInformationClass, ObjectKind, ProcessInformationClass,
    SectionInformationClass, Status, ThreadInformationClass, UnicodeString, Va,
    native::access::{SECTION_MAP_READ, SECTION_QUERY, SYNCHRONIZE},
    utf16,
};
use zerocopy::{FromBytes, Immutable, IntoBytes};

pub use self::class::{InformationClass, Shape};
use self::info::{
    EtwRegBasicInformation, FileObjectDriverInformation, KernelUserTimes,
    OBJECT_TYPE_INFORMATION_SIZE, ObjectAttributesInformation, ObjectBasicInformation,
    ObjectHandleFlagInformation, ProcessBasicInformation, SectionAddressInformation,
    SectionBasicInformation, SectionImageInformation, SectionInternalImageInformation,
    ThreadBasicInformation, ThreadIsTerminated,
};
use crate::{
    DynField, ObjectReference, WindowsKernel,
    guard::{MappedView, OwnedHandle},
};

/// Name of the object type of event tracing provider registrations.
const ETW_REGISTRATION_TYPE: &str = "EtwRegistration";

/// A request to query or set information about an object.
#[derive(Debug, Clone, Copy)]
pub struct ObjectQueryRequest {
    /// Handle to the process owning `handle`, in the caller's handle table.
    pub process_handle: Handle,

    /// Handle to the object, in the handle table of the process.
    pub handle: Handle,

    /// Raw information class, see [`InformationClass`].
    pub class: u32,

    /// Input buffer, used only when setting information.
    pub input: CallerBuffer,

    /// Output buffer, used only when querying information.
    pub output: CallerBuffer,

    /// Optional location receiving the number of bytes written or required.
    pub return_length: Option<Va>,

    /// Privilege mode of the caller.
    pub access_mode: AccessMode,
}

/// A query in flight, with the handle already resolved to its context.
pub(crate) struct QueryContext<'a, Backend>
where
    Backend: KernelBackend,
{
    kernel: &'a WindowsKernel<Backend>,
    access: &'a CallerAccess<'a, Backend>,

    /// The process owning the handle.
    process: Va,

    /// The handle, tagged as a kernel handle for the system process.
    handle: Handle,

    /// The mode the handle is resolved with.
    mode: AccessMode,

    output: CallerBuffer,
}

impl<Backend> WindowsKernel<Backend>
where
    Backend: KernelBackend,
{
    /// Queries information about an object owned by another process.
    ///
    /// Returns the number of bytes written. On failure, the error carries
    /// the number of bytes required, if known. Either value is also stored
    /// at `return_length` when present.
    ///
    /// A `return_length` the caller may not write is never written.
    pub fn query_information_object(
        &self,
        request: &ObjectQueryRequest,
    ) -> Result<u32, LengthStatus> {
        let access = CallerAccess::new(self.backend(), request.access_mode);

        if let Err(err) = access.probe_output::<u32>(request.return_length) {
            tracing::debug!(return_length = ?request.return_length, %err, "invalid return length");
            return Err(err.into());
        }

        let result = self.query_information_object_inner(&access, request);

        if let Some(return_length) = request.return_length {
            let length = match &result {
                Ok(written) => *written,
                Err(err) => err.required,
            };

            if let Err(err) = access.write_value(return_length, &length) {
                tracing::debug!(%return_length, %err, "failed to store return length");
            }
        }

        result
    }

    fn query_information_object_inner(
        &self,
        access: &CallerAccess<'_, Backend>,
        request: &ObjectQueryRequest,
    ) -> Result<u32, LengthStatus> {
        if let Some(output) = request.output.va {
            access.probe_for_write(output, request.output.len, 1)?;
        }

        let process = self.reference_object(
            request.process_handle,
            0,
            Some(ObjectKind::Process),
            request.access_mode,
        )?;

        let (handle, mode) =
            self.resolve_handle_context(process.va(), request.handle, request.access_mode)?;

        let class = InformationClass::try_from(request.class)?;
        tracing::trace!(?class, %handle, process = %process.va(), "query object information");

        let context = QueryContext {
            kernel: self,
            access,
            process: process.va(),
            handle,
            mode,
            output: request.output,
        };

        context.dispatch(class)
    }

    /// Returns the handle and access mode to resolve a handle of `process`
    /// with.
    ///
    /// Handles of the system process are kernel handles and are resolved
    /// in kernel mode. Any other process cannot own a kernel handle, so a
    /// kernel-tagged value is rejected unless it is a pseudo handle.
    pub(crate) fn resolve_handle_context(
        &self,
        process: Va,
        handle: Handle,
        mode: AccessMode,
    ) -> Result<(Handle, AccessMode), Status> {
        if process == self.backend().initial_system_process() {
            return Ok((handle.to_kernel(), AccessMode::KernelMode));
        }

        if handle.is_kernel() && !handle.is_pseudo() {
            tracing::debug!(%process, %handle, "kernel handle outside of the system process");
            return Err(Status::InvalidHandle);
        }

        Ok((handle, mode))
    }
}

impl<'a, Backend> QueryContext<'a, Backend>
where
    Backend: KernelBackend,
{
    fn backend(&self) -> &'a Backend {
        self.kernel.backend()
    }

    fn dispatch(&self, class: InformationClass) -> Result<u32, LengthStatus> {
        let backend = self.backend();
        let handle = self.handle;

        match class {
            InformationClass::Basic => self.native_fixed::<ObjectBasicInformation, _>(|buffer| {
                backend.query_object(handle, ObjectInformationClass::Basic, buffer)
            }),
            InformationClass::Name => self.name(),
            InformationClass::Type => self.negotiate(OBJECT_TYPE_INFORMATION_SIZE, |buffer| {
                let _attach = self.kernel.attach(self.process);
                backend.query_object(handle, ObjectInformationClass::Type, buffer)
            }),
            InformationClass::HandleFlag => {
                self.native_fixed::<ObjectHandleFlagInformation, _>(|buffer| {
                    backend.query_object(handle, ObjectInformationClass::HandleFlag, buffer)
                })
            }
            InformationClass::ProcessBasic => {
                self.native_fixed::<ProcessBasicInformation, _>(|buffer| {
                    backend.query_information_process(
                        handle,
                        ProcessInformationClass::Basic,
                        buffer,
                    )
                })
            }
            InformationClass::ThreadBasic => {
                self.native_fixed::<ThreadBasicInformation, _>(|buffer| {
                    backend.query_information_thread(handle, ThreadInformationClass::Basic, buffer)
                })
            }
            InformationClass::EtwRegBasic => self.etw_registration(),
            InformationClass::FileObjectInformation => self.fixed(|| {
                let file = self.reference(Some(ObjectKind::File))?;
                self.kernel.file_object(file.va()).information()
            }),
            InformationClass::FileObjectDriver => self.file_object_driver(),
            InformationClass::ProcessTimes => self.native_fixed::<KernelUserTimes, _>(|buffer| {
                backend.query_information_process(handle, ProcessInformationClass::Times, buffer)
            }),
            InformationClass::ThreadTimes => self.native_fixed::<KernelUserTimes, _>(|buffer| {
                backend.query_information_thread(handle, ThreadInformationClass::Times, buffer)
            }),
            InformationClass::ProcessImageFileName => self.process_image_file_name(),
            InformationClass::ThreadNameInformation => {
                self.negotiate(UnicodeString::SIZE, |buffer| {
                    let _attach = self.kernel.attach(self.process);
                    backend.query_information_thread(handle, ThreadInformationClass::Name, buffer)
                })
            }
            InformationClass::ThreadIsTerminated => {
                self.native_fixed::<ThreadIsTerminated, _>(|buffer| {
                    backend.query_information_thread(
                        handle,
                        ThreadInformationClass::IsTerminated,
                        buffer,
                    )
                })
            }
            InformationClass::SectionBasic => {
                self.section::<SectionBasicInformation>(SectionInformationClass::Basic)
            }
            InformationClass::SectionFileName => {
                self.negotiate(UnicodeString::SIZE, |buffer| self.section_file_name(buffer))
            }
            InformationClass::SectionImage => {
                self.section::<SectionImageInformation>(SectionInformationClass::Image)
            }
            InformationClass::SectionRelocation => {
                self.section::<SectionAddressInformation>(SectionInformationClass::Relocation)
            }
            InformationClass::SectionOriginalBase => {
                self.section::<SectionAddressInformation>(SectionInformationClass::OriginalBase)
            }
            InformationClass::SectionInternalImage => self
                .section::<SectionInternalImageInformation>(
                    SectionInformationClass::InternalImage,
                ),
            InformationClass::Attributes => self.fixed(|| {
                let object = self.reference(None)?;
                let flags = self.kernel.object(object.va()).header_flags()?;

                Ok(ObjectAttributesInformation {
                    flags: flags.bits() as u32,
                })
            }),
        }
    }

    /// References the object behind the handle from within the owning
    /// process.
    fn reference(&self, kind: Option<ObjectKind>) -> Result<ObjectReference<'a, Backend>, Status> {
        let _attach = self.kernel.attach(self.process);
        self.kernel.reference_object(self.handle, 0, kind, self.mode)
    }

    fn section<T>(&self, class: SectionInformationClass) -> Result<u32, LengthStatus>
    where
        T: FromBytes + IntoBytes + Immutable,
    {
        self.native_fixed::<T, _>(|buffer| self.backend().query_section(self.handle, class, buffer))
    }

    fn name(&self) -> Result<u32, LengthStatus> {
        let object = self.reference(None)?;

        self.negotiate(UnicodeString::SIZE, |buffer| {
            self.kernel.object(object.va()).query_name(buffer)
        })
    }

    fn etw_registration(&self) -> Result<u32, LengthStatus> {
        let offsets = self.kernel.offsets()?;
        let guid_offset = offsets.get(DynField::EgeGuid)?;
        let guid_entry_offset = offsets.get(DynField::EreGuidEntry)?;
        offsets.get(DynField::OtName)?;

        self.fixed(|| {
            let registration = self.reference(None)?;
            let object = self.kernel.object(registration.va());

            if object.type_name()? != utf16(ETW_REGISTRATION_TYPE) {
                return Err(Status::ObjectTypeMismatch);
            }

            let guid_entry = self.backend().read_va(
                registration.va() + guid_entry_offset as u64,
                offsets.pointer_width(),
            )?;

            let mut info = EtwRegBasicInformation::default();
            if !guid_entry.is_null() {
                self.backend()
                    .read(guid_entry + guid_offset as u64, &mut info.guid)?;
            }

            Ok(info)
        })
    }

    fn file_object_driver(&self) -> Result<u32, LengthStatus> {
        let output = self.fixed_output::<FileObjectDriverInformation>()?;

        let file = self.reference(Some(ObjectKind::File))?;
        let driver = self.kernel.file_object(file.va()).driver_object()?;

        let caller_mode = self.access.mode();
        let attributes = match caller_mode {
            AccessMode::KernelMode => ObjectAttributes::KERNEL_HANDLE,
            AccessMode::UserMode => ObjectAttributes::empty(),
        };

        let backend = self.backend();
        let driver_handle = backend.open_object_by_pointer(
            driver,
            attributes,
            SYNCHRONIZE,
            ObjectKind::Driver,
            caller_mode,
        )?;

        let driver_handle = OwnedHandle::new(backend, driver_handle, caller_mode);

        let info = FileObjectDriverInformation {
            driver_handle: driver_handle.handle().0,
        };

        self.access.write_value(output, &info)?;
        driver_handle.into_inner();

        Ok(size_of::<FileObjectDriverInformation>() as u32)
    }

    fn process_image_file_name(&self) -> Result<u32, LengthStatus> {
        let backend = self.backend();

        let target = self.reference(Some(ObjectKind::Process))?;
        let name = backend
            .process_image_file_name(backend.process_id(target.va()))
            .ok_or(Status::InsufficientResources)?;
        drop(target);

        let length = name.len() * size_of::<u16>();
        let length = u16::try_from(length).map_err(|_| Status::NameTooLong)?;
        let required = (UnicodeString::SIZE + length as usize) as u32;

        let Some(output) = self.output.fits(required)
        else {
            return Err(LengthStatus::new(Status::BufferTooSmall, required));
        };

        let data = output + UnicodeString::SIZE as u64;

        self.access
            .write_value(output, &UnicodeString::new(length, data))?;
        self.access.write(data, name.as_bytes())?;

        Ok(required)
    }

    /// Names the file backing a section by mapping a view of it into the
    /// system process.
    fn section_file_name(&self, buffer: &mut [u8]) -> NativeResult {
        let backend = self.backend();
        let system = backend.initial_system_process();

        let section = backend.duplicate_object(
            self.process,
            self.handle,
            system,
            SECTION_QUERY | SECTION_MAP_READ,
            ObjectAttributes::KERNEL_HANDLE,
            AccessMode::KernelMode,
        )?;

        // Released in reverse order: unmap, close, detach.
        let _attach = self.kernel.attach(system);
        let section = OwnedHandle::new(backend, section, AccessMode::KernelMode);
        let view = MappedView::new(backend, backend.map_view_of_section(section.handle())?);

        backend.query_mapped_file_name(view.base(), buffer)
    }
}
