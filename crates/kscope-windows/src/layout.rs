//! Layouts of documented kernel structures on 64-bit kernels.
//!
//! These structures are part of the public driver interface and do not
//! change between builds, unlike the ones covered by [`dyndata`].
//!
//! [`dyndata`]: crate::dyndata

#![allow(missing_docs)]

use kscope_core::Field;

/// `_UNICODE_STRING`
#[derive(Debug)]
pub struct UnicodeStringLayout {
    pub Length: Field,                  // USHORT
    pub MaximumLength: Field,           // USHORT
    pub Buffer: Field,                  // PWSTR
}

/// `_HANDLE_TABLE_ENTRY`
#[derive(Debug)]
pub struct HandleTableEntryLayout {
    pub Value: Field,                   // ULONG_PTR (Object on 32-bit kernels)
    pub GrantedAccess: Field,           // ULONG
    pub Len: Field,
}

/// `_OBJECT_HEADER`
#[derive(Debug)]
pub struct ObjectHeaderLayout {
    pub PointerCount: Field,            // LONG_PTR
    pub HandleCount: Field,             // LONG_PTR
    pub TypeIndex: Field,               // UCHAR
    pub InfoMask: Field,                // UCHAR
    pub Flags: Field,                   // UCHAR
    pub Body: Field,                    // QUAD
}

/// `_FILE_OBJECT`
#[derive(Debug)]
pub struct FileObjectLayout {
    pub Type: Field,                    // CSHORT
    pub Size: Field,                    // CSHORT
    pub DeviceObject: Field,            // PDEVICE_OBJECT
    pub Vpb: Field,                     // PVPB
    pub FsContext: Field,               // PVOID
    pub FsContext2: Field,              // PVOID
    pub SectionObjectPointer: Field,    // PSECTION_OBJECT_POINTERS
    pub RelatedFileObject: Field,       // PFILE_OBJECT
    pub LockOperation: Field,           // BOOLEAN
    pub DeletePending: Field,           // BOOLEAN
    pub ReadAccess: Field,              // BOOLEAN
    pub WriteAccess: Field,             // BOOLEAN
    pub DeleteAccess: Field,            // BOOLEAN
    pub SharedRead: Field,              // BOOLEAN
    pub SharedWrite: Field,             // BOOLEAN
    pub SharedDelete: Field,            // BOOLEAN
    pub Flags: Field,                   // ULONG
    pub FileName: Field,                // UNICODE_STRING
    pub CurrentByteOffset: Field,       // LARGE_INTEGER
    pub Waiters: Field,                 // ULONG
    pub Busy: Field,                    // ULONG
    pub Len: Field,
}

/// `_DEVICE_OBJECT`
#[derive(Debug)]
pub struct DeviceObjectLayout {
    pub DriverObject: Field,            // PDRIVER_OBJECT
    pub AttachedDevice: Field,          // PDEVICE_OBJECT
    pub Flags: Field,                   // ULONG
    pub Characteristics: Field,         // ULONG
    pub Vpb: Field,                     // PVPB
    pub DeviceType: Field,              // DEVICE_TYPE
    pub Len: Field,
}

/// `_VPB`
#[derive(Debug)]
pub struct VpbLayout {
    pub Type: Field,                    // CSHORT
    pub Size: Field,                    // CSHORT
    pub Flags: Field,                   // USHORT
    pub VolumeLabelLength: Field,       // USHORT
    pub SerialNumber: Field,            // ULONG
    pub ReferenceCount: Field,          // ULONG
    pub VolumeLabel: Field,             // WCHAR[32]
    pub Len: Field,
}

pub const UNICODE_STRING: UnicodeStringLayout = UnicodeStringLayout {
    Length: Field::new(0x00, 2),
    MaximumLength: Field::new(0x02, 2),
    Buffer: Field::new(0x08, 8),
};

pub const HANDLE_TABLE_ENTRY: HandleTableEntryLayout = HandleTableEntryLayout {
    Value: Field::new(0x00, 8),
    GrantedAccess: Field::new(0x08, 4),
    Len: Field::new(0, 0x10),
};

/// `_HANDLE_TABLE_ENTRY` on 32-bit kernels.
pub const HANDLE_TABLE_ENTRY_32: HandleTableEntryLayout = HandleTableEntryLayout {
    Value: Field::new(0x00, 4),
    GrantedAccess: Field::new(0x04, 4),
    Len: Field::new(0, 0x08),
};

pub const OBJECT_HEADER: ObjectHeaderLayout = ObjectHeaderLayout {
    PointerCount: Field::new(0x00, 8),
    HandleCount: Field::new(0x08, 8),
    TypeIndex: Field::new(0x18, 1),
    InfoMask: Field::new(0x1a, 1),
    Flags: Field::new(0x1b, 1),
    Body: Field::new(0x30, 8),
};

/// `_OBJECT_HEADER` on 32-bit kernels.
pub const OBJECT_HEADER_32: ObjectHeaderLayout = ObjectHeaderLayout {
    PointerCount: Field::new(0x00, 4),
    HandleCount: Field::new(0x04, 4),
    TypeIndex: Field::new(0x0c, 1),
    InfoMask: Field::new(0x0e, 1),
    Flags: Field::new(0x0f, 1),
    Body: Field::new(0x18, 4),
};

pub const FILE_OBJECT: FileObjectLayout = FileObjectLayout {
    Type: Field::new(0x00, 2),
    Size: Field::new(0x02, 2),
    DeviceObject: Field::new(0x08, 8),
    Vpb: Field::new(0x10, 8),
    FsContext: Field::new(0x18, 8),
    FsContext2: Field::new(0x20, 8),
    SectionObjectPointer: Field::new(0x28, 8),
    RelatedFileObject: Field::new(0x40, 8),
    LockOperation: Field::new(0x48, 1),
    DeletePending: Field::new(0x49, 1),
    ReadAccess: Field::new(0x4a, 1),
    WriteAccess: Field::new(0x4b, 1),
    DeleteAccess: Field::new(0x4c, 1),
    SharedRead: Field::new(0x4d, 1),
    SharedWrite: Field::new(0x4e, 1),
    SharedDelete: Field::new(0x4f, 1),
    Flags: Field::new(0x50, 4),
    FileName: Field::new(0x58, 16),
    CurrentByteOffset: Field::new(0x68, 8),
    Waiters: Field::new(0x70, 4),
    Busy: Field::new(0x74, 4),
    Len: Field::new(0, 0xd8),
};

pub const DEVICE_OBJECT: DeviceObjectLayout = DeviceObjectLayout {
    DriverObject: Field::new(0x08, 8),
    AttachedDevice: Field::new(0x18, 8),
    Flags: Field::new(0x30, 4),
    Characteristics: Field::new(0x34, 4),
    Vpb: Field::new(0x38, 8),
    DeviceType: Field::new(0x48, 4),
    Len: Field::new(0, 0x150),
};

pub const VPB: VpbLayout = VpbLayout {
    Type: Field::new(0x00, 2),
    Size: Field::new(0x02, 2),
    Flags: Field::new(0x04, 2),
    VolumeLabelLength: Field::new(0x06, 2),
    SerialNumber: Field::new(0x18, 4),
    ReferenceCount: Field::new(0x1c, 4),
    VolumeLabel: Field::new(0x20, 64),
    Len: Field::new(0, 0x60),
};
