mod file;


use kscope_core::{KernelBackend, NativeResult, ObjectKind, PointerWidth, Status, Va};

pub use self::file::{FileObjectFlags, WindowsFileObject};
use super::macros::impl_backend;
use crate::{
    DynField, WindowsKernel,
    layout::{OBJECT_HEADER, OBJECT_HEADER_32},
};

bitflags::bitflags! {
    /// Object header flags.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_HEADER.Flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectHeaderFlags: u8 {
        /// The object has not been inserted into the namespace yet.
        const NEW_OBJECT = 0x01;
        /// The object was created in kernel mode.
        const KERNEL_OBJECT = 0x02;
        /// Only kernel-mode callers may open the object.
        const KERNEL_ONLY_ACCESS = 0x04;
        /// Only one process may hold handles to the object.
        const EXCLUSIVE_OBJECT = 0x08;
        /// The object survives its last handle being closed.
        const PERMANENT_OBJECT = 0x10;
        /// The object uses the default security quota.
        const DEFAULT_SECURITY_QUOTA = 0x20;
        /// The object has a single handle entry.
        const SINGLE_HANDLE_ENTRY = 0x40;
        /// The object is being deleted inline.
        const DELETED_INLINE = 0x80;
    }
}

/// A Windows object.
///
/// # Implementation Details
///
/// Corresponds to `_OBJECT_HEADER.Body`.
pub struct WindowsObject<'a, Backend>
where
    Backend: KernelBackend,
{
    /// The engine.
    kernel: &'a WindowsKernel<Backend>,

    /// The virtual address of the object body.
    va: Va,
}

impl<'a, Backend> WindowsObject<'a, Backend>
where
    Backend: KernelBackend,
{
    impl_backend!();

    /// Creates a new Windows object.
    pub fn new(kernel: &'a WindowsKernel<Backend>, va: Va) -> Self {
        Self { kernel, va }
    }

    /// Returns the virtual address of the object body.
    pub fn va(&self) -> Va {
        self.va
    }

    /// Returns the virtual address of the `_OBJECT_HEADER` structure.
    ///
    /// # Implementation Details
    ///
    /// `_OBJECT_HEADER` immediately precedes the object body.
    pub fn header(&self) -> Result<Va, Status> {
        let body = match self.kernel.pointer_width()? {
            PointerWidth::U32 => OBJECT_HEADER_32.Body,
            PointerWidth::U64 => OBJECT_HEADER.Body,
        };

        Ok(self.va - body.offset())
    }

    /// Returns the object header flags.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_HEADER.Flags`.
    pub fn header_flags(&self) -> Result<ObjectHeaderFlags, Status> {
        let flags = match self.kernel.pointer_width()? {
            PointerWidth::U32 => OBJECT_HEADER_32.Flags,
            PointerWidth::U64 => OBJECT_HEADER.Flags,
        };

        let flags = self.backend().read_u8(self.header()? + flags.offset())?;
        Ok(ObjectHeaderFlags::from_bits_retain(flags))
    }

    /// Returns the address of the object's type descriptor.
    pub fn object_type(&self) -> Option<Va> {
        self.backend().object_type(self.va)
    }

    /// Returns the kind of the object, if the engine knows it.
    pub fn kind(&self) -> Option<ObjectKind> {
        self.backend().object_kind(self.va)
    }

    /// Returns the index of the object's type.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_TYPE.Index`.
    pub fn type_index(&self) -> Result<u8, Status> {
        let offset = self.kernel.offsets()?.get(DynField::OtIndex)?;
        let object_type = self.object_type().ok_or(Status::NotSupported)?;
        self.backend().read_u8(object_type + offset as u64)
    }

    /// Returns the name of the object's type as UTF-16.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_OBJECT_TYPE.Name`.
    pub fn type_name(&self) -> Result<Vec<u16>, Status> {
        let offset = self.kernel.offsets()?.get(DynField::OtName)?;
        let object_type = self.object_type().ok_or(Status::NotSupported)?;

        let name = self
            .kernel
            .read_unicode_string(object_type + offset as u64)?;

        Ok(name
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Returns the object as a file object, if it is one.
    pub fn as_file(&self) -> Option<WindowsFileObject<'a, Backend>> {
        match self.kind() {
            Some(ObjectKind::File) => Some(WindowsFileObject::new(self.kernel, self.va)),
            _ => None,
        }
    }

    /// Queries the name of the object into `buffer`.
    ///
    /// On success, `buffer` starts with a `UNICODE_STRING` whose buffer
    /// pointer refers to the character data following it within `buffer`.
    /// File objects are named by [`WindowsFileObject::query_name`].
    pub fn query_name(&self, buffer: &mut [u8]) -> NativeResult {
        if let Some(file) = self.as_file() {
            return file.query_name(buffer);
        }

        self.backend()
            .query_name_string(self.va, buffer)
            .map_err(|err| err.normalized())
    }
}
