//! Selectors, flags and access masks understood by the platform's native
//! query services.

use serde::{Deserialize, Serialize};

/// The kind of a kernel object, as far as the engine needs to tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// `PsProcessType`.
    Process,

    /// `PsThreadType`.
    Thread,

    /// `IoFileObjectType`.
    File,

    /// `MmSectionObjectType`.
    Section,

    /// `IoDriverObjectType`.
    Driver,

    /// `IoDeviceObjectType`.
    Device,
}

/// Object information classes of `NtQueryObject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ObjectInformationClass {
    /// `ObjectBasicInformation`.
    Basic = 0,

    /// `ObjectTypeInformation`.
    Type = 2,

    /// `ObjectHandleFlagInformation`.
    HandleFlag = 4,
}

/// Process information classes of `NtQueryInformationProcess`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcessInformationClass {
    /// `ProcessBasicInformation`.
    Basic = 0,

    /// `ProcessTimes`.
    Times = 4,
}

/// Thread information classes of `NtQueryInformationThread`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadInformationClass {
    /// `ThreadBasicInformation`.
    Basic = 0,

    /// `ThreadTimes`.
    Times = 1,

    /// `ThreadIsTerminated`.
    IsTerminated = 20,

    /// `ThreadNameInformation`.
    Name = 38,
}

/// Section information classes of `NtQuerySection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SectionInformationClass {
    /// `SectionBasicInformation`.
    Basic = 0,

    /// `SectionImageInformation`.
    Image = 1,

    /// `SectionRelocationInformation`.
    Relocation = 2,

    /// `SectionOriginalBaseInformation`.
    OriginalBase = 3,

    /// `SectionInternalImageInformation`.
    InternalImage = 4,
}

/// How a filter-manager name query may be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNameQuery {
    /// Use the name cache, querying the file system on a miss.
    Default,

    /// Use the name cache only, never issuing I/O.
    CacheOnly,
}

bitflags::bitflags! {
    /// Attributes of a handle table entry.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct HandleAttributes: u32 {
        /// `OBJ_PROTECT_CLOSE`
        const PROTECT_CLOSE = 0x0000_0001;

        /// `OBJ_INHERIT`
        const INHERIT = 0x0000_0002;

        /// `OBJ_AUDIT_OBJECT_CLOSE`
        const AUDIT_OBJECT_CLOSE = 0x0000_0004;
    }
}

bitflags::bitflags! {
    /// Attributes used when opening or duplicating an object.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectAttributes: u32 {
        /// `OBJ_INHERIT`
        const INHERIT = 0x0000_0002;

        /// `OBJ_KERNEL_HANDLE`
        const KERNEL_HANDLE = 0x0000_0200;
    }
}

/// Access mask constants.
pub mod access {
    /// `SYNCHRONIZE`
    pub const SYNCHRONIZE: u32 = 0x0010_0000;

    /// `READ_CONTROL`
    pub const READ_CONTROL: u32 = 0x0002_0000;

    /// `ACCESS_SYSTEM_SECURITY`
    pub const ACCESS_SYSTEM_SECURITY: u32 = 0x0100_0000;

    /// `PROCESS_SET_INFORMATION`
    pub const PROCESS_SET_INFORMATION: u32 = 0x0000_0200;

    /// `SECTION_QUERY`
    pub const SECTION_QUERY: u32 = 0x0000_0001;

    /// `SECTION_MAP_READ`
    pub const SECTION_MAP_READ: u32 = 0x0000_0004;

    /// Mask of the access bits stored in a handle table entry.
    pub const GRANTED_ACCESS_MASK: u32 = 0x01ff_ffff;
}
