use kscope_core::{
    Handle, HandleAttributes, KernelBackend, PointerWidth, Status, StructReader, Va,
    native::access::GRANTED_ACCESS_MASK,
};

use super::macros::impl_backend;
use crate::{
    DynField, OffsetTable, WindowsKernel,
    layout::{
        HANDLE_TABLE_ENTRY, HANDLE_TABLE_ENTRY_32, HandleTableEntryLayout, OBJECT_HEADER,
        OBJECT_HEADER_32,
    },
};

/// How the object pointer and attributes are packed into a handle table
/// entry.
#[derive(Debug, Clone, Copy)]
pub enum EntryLayout<'a> {
    /// 32-bit kernels: the attributes occupy the low bits of the object
    /// header pointer.
    Static(&'a OffsetTable),

    /// 64-bit kernels: the object header pointer and the attributes are
    /// packed with build-specific shifts.
    Dynamic(&'a OffsetTable),
}

impl<'a> EntryLayout<'a> {
    /// Selects the encoding used by the kernel described by `offsets`.
    ///
    /// Fails with [`Status::NoInterface`] if the 64-bit encoding is in use
    /// and either of its shifts is unknown.
    pub fn select(offsets: &'a OffsetTable) -> Result<Self, Status> {
        match offsets.pointer_width() {
            PointerWidth::U32 => Ok(Self::Static(offsets)),
            PointerWidth::U64 => {
                offsets.get(DynField::ObDecodeShift)?;
                offsets.get(DynField::ObAttributesShift)?;
                Ok(Self::Dynamic(offsets))
            }
        }
    }

    fn entry(&self) -> &'static HandleTableEntryLayout {
        match self {
            Self::Static(_) => &HANDLE_TABLE_ENTRY_32,
            Self::Dynamic(_) => &HANDLE_TABLE_ENTRY,
        }
    }

    fn body_offset(&self) -> u64 {
        match self {
            Self::Static(_) => OBJECT_HEADER_32.Body.offset(),
            Self::Dynamic(_) => OBJECT_HEADER.Body.offset(),
        }
    }
}

/// A handle table entry decoded into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedHandleEntry {
    /// The handle value.
    pub handle: Handle,

    /// Address of the object body, or null if the entry does not reference
    /// an object.
    pub object: Va,

    /// Access granted to the handle.
    pub granted_access: u32,

    /// Index of the object type, or `u16::MAX` if it cannot be determined.
    pub object_type_index: u16,

    /// Handle attributes.
    pub attributes: HandleAttributes,
}

/// Protect-from-close lives in the granted access bits on 32-bit kernels.
const STATIC_PROTECT_CLOSE: u32 = 0x0200_0000;

/// The low bits of the object pointer on 32-bit kernels.
const STATIC_ATTRIBUTE_MASK: u64 = 0x7;

/// The low bits of a decoded object header on 64-bit kernels.
const DYNAMIC_HEADER_MASK: u64 = 0xf;

/// A Windows handle table entry.
///
/// # Implementation Details
///
/// Corresponds to `_HANDLE_TABLE_ENTRY`.
pub struct WindowsHandleTableEntry<'a, Backend>
where
    Backend: KernelBackend,
{
    /// The engine.
    kernel: &'a WindowsKernel<Backend>,

    /// The entry encoding.
    layout: EntryLayout<'a>,

    /// The virtual address of the `_HANDLE_TABLE_ENTRY` structure.
    va: Va,
}

impl<'a, Backend> WindowsHandleTableEntry<'a, Backend>
where
    Backend: KernelBackend,
{
    impl_backend!();

    /// Creates a new handle table entry.
    pub fn new(kernel: &'a WindowsKernel<Backend>, layout: EntryLayout<'a>, va: Va) -> Self {
        Self { kernel, layout, va }
    }

    /// Returns the address of the entry.
    pub fn va(&self) -> Va {
        self.va
    }

    fn snapshot(&self) -> Result<StructReader, Status> {
        let entry = self.layout.entry();
        StructReader::new(self.backend(), self.va, entry.Len.size() as usize)
    }

    /// Returns the address of the object body the entry points to, or null.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_HANDLE_TABLE_ENTRY.ObjectPointerBits` on 64-bit
    /// kernels and `_HANDLE_TABLE_ENTRY.Object` on 32-bit kernels.
    fn object(&self, reader: &StructReader) -> Result<Va, Status> {
        let value = reader.read(self.layout.entry().Value)?;
        let header = self.decode_header(value)?;
        Ok(self.body(header))
    }

    /// Returns the handle attributes.
    fn attributes(&self, reader: &StructReader) -> Result<HandleAttributes, Status> {
        let entry = self.layout.entry();

        let value = reader.read(entry.Value)?;
        let granted = reader.read(entry.GrantedAccess)? as u32;
        self.decode_attributes(value, granted)
    }

    /// Returns the access granted to the handle.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_HANDLE_TABLE_ENTRY.GrantedAccessBits`.
    fn granted_access(&self, reader: &StructReader) -> Result<u32, Status> {
        let granted = reader.read(self.layout.entry().GrantedAccess)?;
        Ok(granted as u32 & GRANTED_ACCESS_MASK)
    }

    /// Decodes the whole entry from a single snapshot.
    pub fn decode(&self, handle: Handle) -> Result<DecodedHandleEntry, Status> {
        let reader = self.snapshot()?;
        let object = self.object(&reader)?;

        Ok(DecodedHandleEntry {
            handle,
            object,
            granted_access: self.granted_access(&reader)?,
            object_type_index: self.type_index(object),
            attributes: self.attributes(&reader)?,
        })
    }

    fn decode_header(&self, value: u64) -> Result<Va, Status> {
        match self.layout {
            EntryLayout::Static(_) => Ok(Va(value & !STATIC_ATTRIBUTE_MASK)),
            EntryLayout::Dynamic(offsets) => {
                let shift = offsets.get(DynField::ObDecodeShift)?;
                let header = ((value as i64) >> shift) as u64;
                Ok(Va(header & !DYNAMIC_HEADER_MASK))
            }
        }
    }

    fn decode_attributes(&self, value: u64, granted: u32) -> Result<HandleAttributes, Status> {
        let bits = match self.layout {
            EntryLayout::Static(_) => {
                let mut bits = value as u32
                    & (HandleAttributes::INHERIT | HandleAttributes::AUDIT_OBJECT_CLOSE).bits();

                if granted & STATIC_PROTECT_CLOSE != 0 {
                    bits |= HandleAttributes::PROTECT_CLOSE.bits();
                }

                bits
            }
            EntryLayout::Dynamic(offsets) => {
                let shift = offsets.get(DynField::ObAttributesShift)?;
                ((value >> shift) & 0x3) as u32
            }
        };

        Ok(HandleAttributes::from_bits_truncate(bits))
    }

    fn body(&self, header: Va) -> Va {
        if header.is_null() {
            return header;
        }

        header + self.layout.body_offset()
    }

    fn type_index(&self, object: Va) -> u16 {
        if object.is_null() {
            return u16::MAX;
        }

        self.kernel
            .object(object)
            .type_index()
            .map_or(u16::MAX, u16::from)
    }
}
