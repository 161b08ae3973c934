use kscope_core::{
    Field, FileNameQuery, KernelBackend, KernelMemory, LengthStatus, NativeResult, PointerWidth,
    Status, StructReader, UnicodeString, Va, query_sized,
};
use once_cell::unsync::OnceCell;
use smallvec::SmallVec;
use zerocopy::IntoBytes as _;

use super::super::macros::impl_backend;
use crate::{
    WindowsKernel,
    guard::VpbLock,
    layout::{DEVICE_OBJECT, FILE_OBJECT, UNICODE_STRING, VPB},
    query::info::{DeviceInformation, FileObjectInformation, VpbInformation},
};

bitflags::bitflags! {
    /// File object flags.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_FILE_OBJECT.Flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileObjectFlags: u32 {
        /// `FO_FILE_OPEN`
        const FILE_OPEN = 0x0000_0001;
        /// `FO_SYNCHRONOUS_IO`
        const SYNCHRONOUS_IO = 0x0000_0002;
        /// `FO_ALERTABLE_IO`
        const ALERTABLE_IO = 0x0000_0004;
        /// `FO_NO_INTERMEDIATE_BUFFERING`
        const NO_INTERMEDIATE_BUFFERING = 0x0000_0008;
        /// `FO_WRITE_THROUGH`
        const WRITE_THROUGH = 0x0000_0010;
        /// `FO_SEQUENTIAL_ONLY`
        const SEQUENTIAL_ONLY = 0x0000_0020;
        /// `FO_CACHE_SUPPORTED`
        const CACHE_SUPPORTED = 0x0000_0040;
        /// `FO_NAMED_PIPE`
        const NAMED_PIPE = 0x0000_0080;
        /// `FO_STREAM_FILE`
        const STREAM_FILE = 0x0000_0100;
        /// `FO_MAILSLOT`
        const MAILSLOT = 0x0000_0200;
        /// `FO_GENERATE_AUDIT_ON_CLOSE`
        const GENERATE_AUDIT_ON_CLOSE = 0x0000_0400;
        /// `FO_DIRECT_DEVICE_OPEN`
        const DIRECT_DEVICE_OPEN = 0x0000_0800;
        /// `FO_FILE_MODIFIED`
        const FILE_MODIFIED = 0x0000_1000;
        /// `FO_FILE_SIZE_CHANGED`
        const FILE_SIZE_CHANGED = 0x0000_2000;
        /// `FO_CLEANUP_COMPLETE`: the last handle to the file object has been closed.
        const CLEANUP_COMPLETE = 0x0000_4000;
        /// `FO_TEMPORARY_FILE`
        const TEMPORARY_FILE = 0x0000_8000;
        /// `FO_DELETE_ON_CLOSE`
        const DELETE_ON_CLOSE = 0x0001_0000;
        /// `FO_OPENED_CASE_SENSITIVE`
        const OPENED_CASE_SENSITIVE = 0x0002_0000;
        /// `FO_HANDLE_CREATED`
        const HANDLE_CREATED = 0x0004_0000;
        /// `FO_FILE_FAST_IO_READ`
        const FILE_FAST_IO_READ = 0x0008_0000;
        /// `FO_RANDOM_ACCESS`
        const RANDOM_ACCESS = 0x0010_0000;
        /// `FO_FILE_OPEN_CANCELLED`
        const FILE_OPEN_CANCELLED = 0x0020_0000;
        /// `FO_VOLUME_OPEN`
        const VOLUME_OPEN = 0x0040_0000;
        /// `FO_REMOTE_ORIGIN`
        const REMOTE_ORIGIN = 0x0100_0000;
        /// `FO_SKIP_COMPLETION_PORT`
        const SKIP_COMPLETION_PORT = 0x0200_0000;
        /// `FO_SKIP_SET_EVENT`
        const SKIP_SET_EVENT = 0x0400_0000;
        /// `FO_SKIP_SET_FAST_IO`
        const SKIP_SET_FAST_IO = 0x0800_0000;
    }
}

/// Longest chain of related file objects followed when building a name.
const MAX_RELATED_DEPTH: usize = 32;

/// `_FILE_OBJECT.FileName.Length`
const FILE_NAME_LENGTH: Field = Field::new(
    FILE_OBJECT.FileName.offset() + UNICODE_STRING.Length.offset(),
    UNICODE_STRING.Length.size(),
);

/// `_FILE_OBJECT.FileName.Buffer`
const FILE_NAME_BUFFER: Field = Field::new(
    FILE_OBJECT.FileName.offset() + UNICODE_STRING.Buffer.offset(),
    UNICODE_STRING.Buffer.size(),
);

/// A Windows file object.
///
/// Only 64-bit kernels are supported; every accessor fails with
/// [`Status::NotSupported`] elsewhere.
///
/// # Implementation Details
///
/// Corresponds to `_FILE_OBJECT`.
pub struct WindowsFileObject<'a, Backend>
where
    Backend: KernelBackend,
{
    /// The engine.
    kernel: &'a WindowsKernel<Backend>,

    /// The virtual address of the `_FILE_OBJECT` structure.
    va: Va,

    /// Snapshot of the `_FILE_OBJECT` structure.
    snapshot: OnceCell<StructReader>,
}

impl<'a, Backend> WindowsFileObject<'a, Backend>
where
    Backend: KernelBackend,
{
    impl_backend!();

    /// Creates a new Windows file object.
    pub fn new(kernel: &'a WindowsKernel<Backend>, va: Va) -> Self {
        Self {
            kernel,
            va,
            snapshot: OnceCell::new(),
        }
    }

    /// Returns the virtual address of the file object.
    pub fn va(&self) -> Va {
        self.va
    }

    fn ensure_supported(&self) -> Result<(), Status> {
        match self.kernel.pointer_width()? {
            PointerWidth::U64 => Ok(()),
            PointerWidth::U32 => Err(Status::NotSupported),
        }
    }

    /// Returns the `_FILE_OBJECT` snapshot, taking it on first use.
    fn snapshot(&self) -> Result<&StructReader, Status> {
        self.snapshot.get_or_try_init(|| {
            self.ensure_supported()?;
            StructReader::new(self.backend(), self.va, FILE_OBJECT.Len.size() as usize)
        })
    }

    /// Returns the file object flags.
    ///
    /// Reads the flags field alone, without touching any other part of
    /// the structure.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_FILE_OBJECT.Flags`.
    pub fn flags(&self) -> Result<FileObjectFlags, Status> {
        self.ensure_supported()?;

        let flags = self
            .backend()
            .read_u32(self.va + FILE_OBJECT.Flags.offset())?;

        Ok(FileObjectFlags::from_bits_retain(flags))
    }

    /// Returns the device object the file was opened on, or null.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_FILE_OBJECT.DeviceObject`.
    pub fn device_object(&self) -> Result<Va, Status> {
        Ok(Va(self.snapshot()?.read(FILE_OBJECT.DeviceObject)?))
    }

    /// Returns the related file object, or null.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_FILE_OBJECT.RelatedFileObject`.
    pub fn related_file_object(&self) -> Result<Va, Status> {
        Ok(Va(self.snapshot()?.read(FILE_OBJECT.RelatedFileObject)?))
    }

    /// Returns the driver object owning the file's device.
    ///
    /// Fails with [`Status::InvalidDeviceRequest`] if the file has no
    /// device or the device has no driver.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `_FILE_OBJECT.DeviceObject->DriverObject`.
    pub fn driver_object(&self) -> Result<Va, Status> {
        let device = self.device_object()?;
        if device.is_null() {
            return Err(Status::InvalidDeviceRequest);
        }

        let driver = self
            .backend()
            .read_va(device + DEVICE_OBJECT.DriverObject.offset(), PointerWidth::U64)?;

        if driver.is_null() {
            return Err(Status::InvalidDeviceRequest);
        }

        Ok(driver)
    }

    /// Queries the best-effort full name of the file into `buffer`.
    ///
    /// On success, `buffer` starts with a `UNICODE_STRING` whose buffer
    /// pointer refers to the character data following it within `buffer`.
    /// If `buffer` is too small, nothing is written and the error carries
    /// the exact length required.
    ///
    /// A file object whose cleanup has completed is reported as
    /// [`Status::FileClosed`] without reading any of its name fields.
    ///
    /// # Implementation Details
    ///
    /// The name is first requested from the filter manager. If that fails,
    /// it is assembled from the name of `_FILE_OBJECT.DeviceObject` and the
    /// `_FILE_OBJECT.FileName` of every object in the
    /// `_FILE_OBJECT.RelatedFileObject` chain, root first.
    pub fn query_name(&self, buffer: &mut [u8]) -> NativeResult {
        if self.flags()?.contains(FileObjectFlags::CLEANUP_COMPLETE) {
            tracing::trace!(file = %self.va, "file object is closed");
            return Err(LengthStatus::new(Status::FileClosed, 0));
        }

        match self.query_name_cached(buffer) {
            Ok(written) => return Ok(written),
            Err(err) if err.status == Status::BufferTooSmall => return Err(err),
            Err(err) => {
                tracing::trace!(file = %self.va, err = %err.status, "filter name unavailable");
            }
        }

        self.extract_name()?.emit(self.backend(), buffer)
    }

    /// Asks the filter manager for the normalized name.
    ///
    /// When blocking would be unsafe, only the name cache is consulted.
    fn query_name_cached(&self, buffer: &mut [u8]) -> NativeResult {
        let backend = self.backend();

        let query = if backend.top_level_irp_present() || backend.all_apcs_disabled() {
            FileNameQuery::CacheOnly
        }
        else {
            FileNameQuery::Default
        };

        let name = backend.file_name_information(self.va, query)?;
        NameAccumulator::new(name.as_bytes().to_vec()).emit(backend, buffer)
    }

    /// Collects the device name and the related object chain without
    /// copying any of the chain's character data.
    fn extract_name(&self) -> Result<NameAccumulator, Status> {
        let device = self.device_object()?;

        let device_name = if device.is_null() {
            Vec::new()
        }
        else {
            let info = query_sized(|buffer| self.backend().query_name_string(device, buffer))?;
            UnicodeString::inline_data(&info)
                .ok_or(Status::Unsuccessful)?
                .to_vec()
        };

        let mut name = NameAccumulator::new(device_name);

        let reader = self.snapshot()?;
        if reader.read(FILE_NAME_BUFFER)? == 0 {
            return Ok(name);
        }

        name.push(NameFragment::read(reader)?);

        let mut current = self.va;
        let mut related = Va(reader.read(FILE_OBJECT.RelatedFileObject)?);

        while !related.is_null() && related != current {
            if name.fragments.len() >= MAX_RELATED_DEPTH {
                tracing::warn!(file = %self.va, "related file object chain too deep");
                return Err(Status::Unsuccessful);
            }

            let reader =
                StructReader::new(self.backend(), related, FILE_OBJECT.Len.size() as usize)?;
            name.push(NameFragment::read(&reader)?);

            current = related;
            related = Va(reader.read(FILE_OBJECT.RelatedFileObject)?);
        }

        Ok(name)
    }

    /// Captures the state of the file object and its devices.
    ///
    /// # Implementation Details
    ///
    /// Volume parameter blocks are read under the VPB spin lock.
    pub fn information(&self) -> Result<FileObjectInformation, Status> {
        let backend = self.backend();
        let reader = self.snapshot()?;

        let mut info = FileObjectInformation {
            lock_operation: reader.read(FILE_OBJECT.LockOperation)? as u8,
            delete_pending: reader.read(FILE_OBJECT.DeletePending)? as u8,
            read_access: reader.read(FILE_OBJECT.ReadAccess)? as u8,
            write_access: reader.read(FILE_OBJECT.WriteAccess)? as u8,
            delete_access: reader.read(FILE_OBJECT.DeleteAccess)? as u8,
            shared_read: reader.read(FILE_OBJECT.SharedRead)? as u8,
            shared_write: reader.read(FILE_OBJECT.SharedWrite)? as u8,
            shared_delete: reader.read(FILE_OBJECT.SharedDelete)? as u8,
            current_byte_offset: reader.read(FILE_OBJECT.CurrentByteOffset)? as i64,
            flags: reader.read(FILE_OBJECT.Flags)? as u32,
            waiters: reader.read(FILE_OBJECT.Waiters)? as u32,
            busy: reader.read(FILE_OBJECT.Busy)? as u32,
            ..Default::default()
        };

        let section_object_pointer = Va(reader.read(FILE_OBJECT.SectionObjectPointer)?);
        if !section_object_pointer.is_null() {
            info.user_writable_references =
                backend.file_has_user_writable_references(section_object_pointer) as u8;
        }

        info.has_active_transaction = backend.transaction_parameter_block(self.va).is_some() as u8;
        info.is_ignoring_sharing = backend.is_file_object_ignoring_sharing(self.va) as u8;

        let device = Va(reader.read(FILE_OBJECT.DeviceObject)?);
        let (attached, related) = if device.is_null() {
            (Va(0), Va(0))
        }
        else {
            (
                backend.attached_device(device),
                backend.related_device_object(self.va),
            )
        };

        info.device = self.device_information(device)?;
        info.attached_device = self.device_information(attached)?;
        info.related_device = self.device_information(related)?;

        let _lock = VpbLock::acquire(backend);
        info.vpb = self.vpb_information(Va(reader.read(FILE_OBJECT.Vpb)?))?;
        info.device.vpb = self.vpb_information(self.device_vpb(device)?)?;
        info.attached_device.vpb = self.vpb_information(self.device_vpb(attached)?)?;
        info.related_device.vpb = self.vpb_information(self.device_vpb(related)?)?;

        Ok(info)
    }

    fn device_information(&self, device: Va) -> Result<DeviceInformation, Status> {
        if device.is_null() {
            return Ok(DeviceInformation::default());
        }

        let reader = StructReader::new(self.backend(), device, DEVICE_OBJECT.Len.size() as usize)?;

        Ok(DeviceInformation {
            device_type: reader.read(DEVICE_OBJECT.DeviceType)? as u32,
            characteristics: reader.read(DEVICE_OBJECT.Characteristics)? as u32,
            flags: reader.read(DEVICE_OBJECT.Flags)? as u32,
            vpb: VpbInformation::default(),
        })
    }

    fn device_vpb(&self, device: Va) -> Result<Va, Status> {
        if device.is_null() {
            return Ok(Va(0));
        }

        self.backend()
            .read_va(device + DEVICE_OBJECT.Vpb.offset(), PointerWidth::U64)
    }

    fn vpb_information(&self, vpb: Va) -> Result<VpbInformation, Status> {
        if vpb.is_null() {
            return Ok(VpbInformation::default());
        }

        let reader = StructReader::new(self.backend(), vpb, VPB.Len.size() as usize)?;

        let mut volume_label = [0u16; 32];
        for (dst, src) in volume_label
            .iter_mut()
            .zip(reader.bytes(VPB.VolumeLabel)?.chunks_exact(2))
        {
            *dst = u16::from_le_bytes([src[0], src[1]]);
        }

        Ok(VpbInformation {
            type_: reader.read(VPB.Type)? as i16,
            size: reader.read(VPB.Size)? as i16,
            flags: reader.read(VPB.Flags)? as u16,
            volume_label_length: reader.read(VPB.VolumeLabelLength)? as u16,
            serial_number: reader.read(VPB.SerialNumber)? as u32,
            reference_count: reader.read(VPB.ReferenceCount)? as u32,
            volume_label,
        })
    }
}

/// The `_FILE_OBJECT.FileName` of one object in a related chain.
#[derive(Debug, Clone, Copy)]
struct NameFragment {
    buffer: Va,
    length: u16,
}

impl NameFragment {
    fn read(reader: &StructReader) -> Result<Self, Status> {
        Ok(Self {
            buffer: Va(reader.read(FILE_NAME_BUFFER)?),
            length: reader.read(FILE_NAME_LENGTH)? as u16,
        })
    }
}

/// A file name under construction.
///
/// Fragments are collected leaf first and emitted root first.
struct NameAccumulator {
    device: Vec<u8>,
    fragments: SmallVec<[NameFragment; 4]>,
    total: usize,
}

impl NameAccumulator {
    fn new(device: Vec<u8>) -> Self {
        let total = device.len();
        Self {
            device,
            fragments: SmallVec::new(),
            total,
        }
    }

    fn push(&mut self, fragment: NameFragment) {
        if fragment.buffer.is_null() {
            return;
        }

        self.total += fragment.length as usize;
        self.fragments.push(fragment);
    }

    /// Writes the name into `buffer` if it fits.
    ///
    /// Nothing is written unless the whole name fits.
    fn emit<Memory>(&self, memory: &Memory, buffer: &mut [u8]) -> NativeResult
    where
        Memory: KernelMemory + ?Sized,
    {
        let length = u16::try_from(self.total).map_err(|_| Status::NameTooLong)?;
        let required = UnicodeString::SIZE + self.total;

        if buffer.len() < required {
            return Err(LengthStatus::new(Status::BufferTooSmall, required as u32));
        }

        let (header, data) = buffer.split_at_mut(UnicodeString::SIZE);

        data[..self.device.len()].copy_from_slice(&self.device);
        let mut position = self.device.len();

        for fragment in self.fragments.iter().rev() {
            let end = position + fragment.length as usize;
            memory.read(fragment.buffer, &mut data[position..end])?;
            position = end;
        }

        let name = UnicodeString::new(length, Va(data.as_ptr() as u64));
        header.copy_from_slice(name.as_bytes());

        Ok(required as u32)
    }
}
