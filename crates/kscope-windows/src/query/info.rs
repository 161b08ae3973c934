//! Result records returned to callers, laid out as on 64-bit kernels.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

macro_rules! record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident [$size:literal] {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident: $type:ty,
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
        #[repr(C)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $type,
            )+
        }

        const _: () = assert!(size_of::<$name>() == $size);
    };
}

record! {
    /// `OBJECT_BASIC_INFORMATION`
    pub struct ObjectBasicInformation [56] {
        /// Handle attributes.
        pub attributes: u32,
        /// Access granted to the handle.
        pub granted_access: u32,
        /// Number of handles to the object.
        pub handle_count: u32,
        /// Number of references to the object.
        pub pointer_count: u32,
        /// Paged pool charge.
        pub paged_pool_charge: u32,
        /// Non-paged pool charge.
        pub non_paged_pool_charge: u32,
        /// Reserved.
        pub reserved: [u32; 3],
        /// Size of the name information.
        pub name_info_size: u32,
        /// Size of the type information.
        pub type_info_size: u32,
        /// Size of the security descriptor.
        pub security_descriptor_size: u32,
        /// Creation time of symbolic links.
        pub creation_time: i64,
    }
}

record! {
    /// `OBJECT_HANDLE_FLAG_INFORMATION`
    pub struct ObjectHandleFlagInformation [2] {
        /// The handle is inherited by child processes.
        pub inherit: u8,
        /// The handle cannot be closed.
        pub protect_from_close: u8,
    }
}

record! {
    /// `PROCESS_BASIC_INFORMATION`
    pub struct ProcessBasicInformation [48] {
        /// Exit status of the process.
        pub exit_status: i32,
        /// Alignment padding.
        pub reserved1: u32,
        /// Address of the PEB.
        pub peb_base_address: u64,
        /// Processor affinity.
        pub affinity_mask: u64,
        /// Base priority.
        pub base_priority: i32,
        /// Alignment padding.
        pub reserved2: u32,
        /// Process identifier.
        pub unique_process_id: u64,
        /// Parent process identifier.
        pub inherited_from_unique_process_id: u64,
    }
}

record! {
    /// `THREAD_BASIC_INFORMATION`
    pub struct ThreadBasicInformation [48] {
        /// Exit status of the thread.
        pub exit_status: i32,
        /// Alignment padding.
        pub reserved: u32,
        /// Address of the TEB.
        pub teb_base_address: u64,
        /// Owning process identifier.
        pub unique_process: u64,
        /// Thread identifier.
        pub unique_thread: u64,
        /// Processor affinity.
        pub affinity_mask: u64,
        /// Current priority.
        pub priority: i32,
        /// Base priority.
        pub base_priority: i32,
    }
}

record! {
    /// `KERNEL_USER_TIMES`
    pub struct KernelUserTimes [32] {
        /// Creation time.
        pub create_time: i64,
        /// Exit time.
        pub exit_time: i64,
        /// Time spent in kernel mode.
        pub kernel_time: i64,
        /// Time spent in user mode.
        pub user_time: i64,
    }
}

record! {
    /// Identifier of an event tracing provider registration.
    pub struct EtwRegBasicInformation [24] {
        /// Provider GUID.
        pub guid: [u8; 16],
        /// Tracing session identifier.
        pub session_id: u64,
    }
}

record! {
    /// Snapshot of a volume parameter block.
    pub struct VpbInformation [80] {
        /// `VPB.Type`
        pub type_: i16,
        /// `VPB.Size`
        pub size: i16,
        /// `VPB.Flags`
        pub flags: u16,
        /// `VPB.VolumeLabelLength`
        pub volume_label_length: u16,
        /// `VPB.SerialNumber`
        pub serial_number: u32,
        /// `VPB.ReferenceCount`
        pub reference_count: u32,
        /// `VPB.VolumeLabel`
        pub volume_label: [u16; 32],
    }
}

record! {
    /// Snapshot of a device object.
    pub struct DeviceInformation [92] {
        /// `DEVICE_OBJECT.DeviceType`
        pub device_type: u32,
        /// `DEVICE_OBJECT.Characteristics`
        pub characteristics: u32,
        /// `DEVICE_OBJECT.Flags`
        pub flags: u32,
        /// The device's volume parameter block.
        pub vpb: VpbInformation,
    }
}

record! {
    /// Snapshot of a file object.
    pub struct FileObjectInformation [392] {
        /// `FILE_OBJECT.LockOperation`
        pub lock_operation: u8,
        /// `FILE_OBJECT.DeletePending`
        pub delete_pending: u8,
        /// `FILE_OBJECT.ReadAccess`
        pub read_access: u8,
        /// `FILE_OBJECT.WriteAccess`
        pub write_access: u8,
        /// `FILE_OBJECT.DeleteAccess`
        pub delete_access: u8,
        /// `FILE_OBJECT.SharedRead`
        pub shared_read: u8,
        /// `FILE_OBJECT.SharedWrite`
        pub shared_write: u8,
        /// `FILE_OBJECT.SharedDelete`
        pub shared_delete: u8,
        /// `FILE_OBJECT.CurrentByteOffset`
        pub current_byte_offset: i64,
        /// `FILE_OBJECT.Flags`
        pub flags: u32,
        /// The file has user-writable mapped views.
        pub user_writable_references: u8,
        /// The file participates in a transaction.
        pub has_active_transaction: u8,
        /// The file object ignores share access.
        pub is_ignoring_sharing: u8,
        /// Alignment padding.
        pub reserved1: u8,
        /// `FILE_OBJECT.Waiters`
        pub waiters: u32,
        /// `FILE_OBJECT.Busy`
        pub busy: u32,
        /// The file object's volume parameter block.
        pub vpb: VpbInformation,
        /// The device the file object was opened on.
        pub device: DeviceInformation,
        /// The highest device attached to that device.
        pub attached_device: DeviceInformation,
        /// The device requests for the file are sent to.
        pub related_device: DeviceInformation,
        /// Alignment padding.
        pub reserved2: u32,
    }
}

record! {
    /// Handle to the driver owning a file object's device.
    pub struct FileObjectDriverInformation [8] {
        /// Handle to the driver object.
        pub driver_handle: u64,
    }
}

record! {
    /// Whether a thread has terminated.
    pub struct ThreadIsTerminated [4] {
        /// Non-zero if the thread has terminated.
        pub is_terminated: u32,
    }
}

record! {
    /// `SECTION_BASIC_INFORMATION`
    pub struct SectionBasicInformation [24] {
        /// Base address of an image section.
        pub base_address: u64,
        /// `SEC_*` attributes.
        pub allocation_attributes: u32,
        /// Alignment padding.
        pub reserved: u32,
        /// Size of the section.
        pub maximum_size: i64,
    }
}

record! {
    /// `SECTION_IMAGE_INFORMATION`
    pub struct SectionImageInformation [64] {
        /// Entry point.
        pub transfer_address: u64,
        /// Zero bits of the image base.
        pub zero_bits: u32,
        /// Alignment padding.
        pub reserved: u32,
        /// Stack reserve.
        pub maximum_stack_size: u64,
        /// Stack commit.
        pub committed_stack_size: u64,
        /// Subsystem.
        pub sub_system_type: u32,
        /// Subsystem version (minor in the low word).
        pub sub_system_version: u32,
        /// Operating system version (minor in the low word).
        pub operating_system_version: u32,
        /// PE characteristics.
        pub image_characteristics: u16,
        /// PE DLL characteristics.
        pub dll_characteristics: u16,
        /// PE machine.
        pub machine: u16,
        /// The image contains code.
        pub image_contains_code: u8,
        /// Image flags.
        pub image_flags: u8,
        /// Loader flags.
        pub loader_flags: u32,
        /// Size of the image file.
        pub image_file_size: u32,
        /// PE checksum.
        pub check_sum: u32,
    }
}

record! {
    /// `SECTION_INTERNAL_IMAGE_INFORMATION`
    pub struct SectionInternalImageInformation [72] {
        /// Image information.
        pub image: SectionImageInformation,
        /// Extended image flags.
        pub extended_flags: u32,
        /// Alignment padding.
        pub reserved: u32,
    }
}

record! {
    /// A pointer-sized section attribute (relocation delta or original base).
    pub struct SectionAddressInformation [8] {
        /// The address.
        pub address: u64,
    }
}

record! {
    /// Object header attribute flags.
    pub struct ObjectAttributesInformation [4] {
        /// `_OBJECT_HEADER.Flags`
        pub flags: u32,
    }
}

record! {
    /// A decoded handle table entry as returned by whole-process enumeration.
    pub struct ProcessHandleRecord [32] {
        /// Handle value.
        pub handle: u64,
        /// Address of the object body.
        pub object: u64,
        /// Access granted to the handle.
        pub granted_access: u32,
        /// Object type index, or `u16::MAX` if unknown.
        pub object_type_index: u16,
        /// Reserved.
        pub reserved1: u16,
        /// Handle attributes.
        pub handle_attributes: u32,
        /// Reserved.
        pub reserved2: u32,
    }
}

/// Size of the `OBJECT_TYPE_INFORMATION` header preceding the type name.
pub const OBJECT_TYPE_INFORMATION_SIZE: usize = 104;
