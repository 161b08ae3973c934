use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::Va;

/// A counted UTF-16 string (`UNICODE_STRING`) as laid out on 64-bit kernels.
///
/// Also the full header of `OBJECT_NAME_INFORMATION`,
/// `THREAD_NAME_INFORMATION` and `MEMORY_MAPPED_FILE_NAME_INFORMATION`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct UnicodeString {
    /// Length of the string in bytes, without a terminator.
    pub length: u16,

    /// Size of the buffer in bytes.
    pub maximum_length: u16,

    /// Alignment padding.
    pub reserved: u32,

    /// Address of the character data.
    pub buffer: u64,
}

impl UnicodeString {
    /// Size of the header in bytes.
    pub const SIZE: usize = size_of::<Self>();

    /// Creates a string header describing `length` bytes at `buffer`.
    pub const fn new(length: u16, buffer: Va) -> Self {
        Self {
            length,
            maximum_length: length,
            reserved: 0,
            buffer: buffer.0,
        }
    }

    /// Reads the header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_prefix(bytes).ok().map(|(header, _)| header)
    }

    /// Returns the character data that follows an inline header.
    ///
    /// The data is taken from right after the header, trusting `length`
    /// rather than the `buffer` pointer.
    pub fn inline_data(bytes: &[u8]) -> Option<&[u8]> {
        let header = Self::parse(bytes)?;
        bytes.get(Self::SIZE..Self::SIZE + header.length as usize)
    }

    /// Moves the `buffer` pointer of the header at the start of `bytes` from
    /// `old_base` to `new_base`, preserving its offset.
    ///
    /// A null pointer is left null.
    pub fn rebase(bytes: &mut [u8], old_base: Va, new_base: Va) {
        let Some(mut header) = Self::parse(bytes)
        else {
            return;
        };

        if header.buffer == 0 {
            return;
        }

        header.buffer = header
            .buffer
            .wrapping_sub(old_base.0)
            .wrapping_add(new_base.0);

        // The header was just parsed from the same prefix, so it fits.
        let _ = header.write_to_prefix(bytes);
    }
}

/// Encodes a string as UTF-16 for comparisons against kernel strings.
pub fn utf16(value: &str) -> Vec<u16> {
    value.encode_utf16().collect()
}
