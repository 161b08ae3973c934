use kscope_core::{
    AccessMode, CallerAccess, Handle, HandleAttributes, KernelBackend, ObjectAttributes,
    ObjectKind, Status, Va,
    native::access::{ACCESS_SYSTEM_SECURITY, PROCESS_SET_INFORMATION, READ_CONTROL, SYNCHRONIZE},
};

use super::{InformationClass, ObjectQueryRequest, info::ObjectHandleFlagInformation};
use crate::{WindowsKernel, guard::OwnedHandle};

/// Access that may be requested when duplicating a handle.
const DUPLICATE_ALLOWED_ACCESS: u32 = READ_CONTROL | ACCESS_SYSTEM_SECURITY | SYNCHRONIZE;

impl<Backend> WindowsKernel<Backend>
where
    Backend: KernelBackend,
{
    /// Changes information about an object owned by another process.
    ///
    /// Only [`InformationClass::HandleFlag`] can be set. The input buffer
    /// must hold exactly one [`ObjectHandleFlagInformation`].
    pub fn set_information_object(&self, request: &ObjectQueryRequest) -> Result<(), Status> {
        let access = CallerAccess::new(self.backend(), request.access_mode);

        let input = request.input.va.ok_or(Status::InvalidParameterN(4))?;
        access.probe_for_read(input, request.input.len, 1)?;

        let process = self.reference_object(
            request.process_handle,
            PROCESS_SET_INFORMATION,
            Some(ObjectKind::Process),
            request.access_mode,
        )?;

        let (handle, _) =
            self.resolve_handle_context(process.va(), request.handle, request.access_mode)?;

        match InformationClass::try_from(request.class)? {
            InformationClass::HandleFlag => {
                if request.input.len as usize != size_of::<ObjectHandleFlagInformation>() {
                    return Err(Status::InfoLengthMismatch);
                }

                let info = access.read_value::<ObjectHandleFlagInformation>(input)?;

                let mut attributes = HandleAttributes::empty();
                attributes.set(HandleAttributes::INHERIT, info.inherit != 0);
                attributes.set(HandleAttributes::PROTECT_CLOSE, info.protect_from_close != 0);

                tracing::trace!(%handle, ?attributes, "set handle attributes");

                let _attach = self.attach(process.va());
                self.backend()
                    .set_handle_attributes(handle, attributes, AccessMode::KernelMode)
            }
            _ => Err(Status::InvalidInfoClass),
        }
    }

    /// Duplicates a handle of another process into the calling process.
    ///
    /// Only `READ_CONTROL`, `ACCESS_SYSTEM_SECURITY` and `SYNCHRONIZE` may
    /// be requested. The new handle is stored at `target_handle` and
    /// returned. It is a kernel handle if the caller is in kernel mode.
    pub fn duplicate_object(
        &self,
        process_handle: Handle,
        source_handle: Handle,
        desired_access: u32,
        target_handle: Option<Va>,
        mode: AccessMode,
    ) -> Result<Handle, Status> {
        if desired_access & !DUPLICATE_ALLOWED_ACCESS != 0 {
            tracing::debug!(desired_access, "duplicate access not allowed");
            return Err(Status::AccessDenied);
        }

        let access = CallerAccess::new(self.backend(), mode);

        let target_handle = target_handle.ok_or(Status::InvalidParameter)?;
        access.probe_output::<u64>(Some(target_handle))?;

        let source = self.reference_object(process_handle, 0, Some(ObjectKind::Process), mode)?;
        let (source_handle, _) = self.resolve_handle_context(source.va(), source_handle, mode)?;

        let attributes = match mode {
            AccessMode::KernelMode => ObjectAttributes::KERNEL_HANDLE,
            AccessMode::UserMode => ObjectAttributes::empty(),
        };

        let backend = self.backend();
        let handle = backend.duplicate_object(
            source.va(),
            source_handle,
            backend.current_process(),
            desired_access,
            attributes,
            AccessMode::KernelMode,
        )?;

        let handle = OwnedHandle::new(backend, handle, mode);
        access.write_value(target_handle, &handle.handle().0)?;

        Ok(handle.into_inner())
    }
}
