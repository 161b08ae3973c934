use serde::{Deserialize, Serialize};

use crate::PointerWidth;

/// Identifies a kernel image build.
///
/// Offset tables are only ever applied to the exact build they were
/// generated for; any difference in these four values is a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelFingerprint {
    /// The kernel image class, see [`KernelFingerprint::CLASS_NTOSKRNL`].
    pub class: u16,

    /// The PE machine type of the kernel image.
    pub machine: u16,

    /// The PE `TimeDateStamp` of the kernel image.
    pub time_date_stamp: u32,

    /// The PE `SizeOfImage` of the kernel image.
    pub size_of_image: u32,
}

impl KernelFingerprint {
    /// `ntoskrnl.exe`.
    pub const CLASS_NTOSKRNL: u16 = 0x0001;

    /// `ntkrla57.exe`, the five-level paging kernel.
    pub const CLASS_NTKRLA57: u16 = 0x0002;

    /// `IMAGE_FILE_MACHINE_I386`.
    pub const MACHINE_I386: u16 = 0x014c;

    /// `IMAGE_FILE_MACHINE_AMD64`.
    pub const MACHINE_AMD64: u16 = 0x8664;

    /// `IMAGE_FILE_MACHINE_ARM64`.
    pub const MACHINE_ARM64: u16 = 0xaa64;

    /// Returns the pointer width of the kernel, or `None` if the machine
    /// type is not supported.
    pub const fn pointer_width(&self) -> Option<PointerWidth> {
        match self.machine {
            Self::MACHINE_I386 => Some(PointerWidth::U32),
            Self::MACHINE_AMD64 | Self::MACHINE_ARM64 => Some(PointerWidth::U64),
            _ => None,
        }
    }
}
