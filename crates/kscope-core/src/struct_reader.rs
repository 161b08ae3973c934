use crate::{KernelMemory, Status, Va};

/// The location of a field inside a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    offset: u64,
    size: u64,
}

impl Field {
    /// Creates a new field descriptor.
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Returns the offset of the field from the start of the structure.
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the size of the field in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the offset just past the end of the field.
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// A snapshot of a kernel structure.
///
/// The structure is read from kernel memory once, and individual fields
/// are decoded from the captured bytes afterwards. This keeps every field
/// of one structure consistent with each other.
///
/// # Examples
///
/// ```no_run
/// # use kscope_core::{Field, KernelMemory, Status, StructReader, Va};
/// # fn example(memory: &impl KernelMemory, file: Va) -> Result<(), Status> {
/// const DEVICE_OBJECT: Field = Field::new(0x08, 8);
/// const FLAGS: Field = Field::new(0x50, 4);
///
/// let reader = StructReader::new(memory, file, 0xd8)?;
/// let device = reader.read(DEVICE_OBJECT)?;
/// let flags = reader.read(FLAGS)? as u32;
/// # Ok(())
/// # }
/// ```
pub struct StructReader(Vec<u8>);

impl StructReader {
    /// Creates a new structure reader.
    ///
    /// Reads `len` bytes from kernel memory at the specified address.
    pub fn new<Memory>(memory: &Memory, va: Va, len: usize) -> Result<Self, Status>
    where
        Memory: KernelMemory + ?Sized,
    {
        let mut buffer = vec![0u8; len];
        memory.read(va, &mut buffer)?;
        Ok(Self(buffer))
    }

    /// Reads a field value from the snapshot.
    ///
    /// The value is interpreted as a little-endian integer of the field's
    /// size (1, 2, 4 or 8 bytes) and zero-extended to `u64`.
    pub fn read(&self, field: Field) -> Result<u64, Status> {
        let data = self.bytes(field)?;

        match data.len() {
            1 => Ok(data[0] as u64),
            2 => Ok(u16::from_le_bytes([data[0], data[1]]) as u64),
            4 => Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as u64),
            8 => Ok(u64::from_le_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ])),
            _ => Err(Status::InvalidParameter),
        }
    }

    /// Returns the raw bytes of a field.
    pub fn bytes(&self, field: Field) -> Result<&[u8], Status> {
        let offset = field.offset as usize;
        let end = offset
            .checked_add(field.size as usize)
            .ok_or(Status::InvalidParameter)?;

        self.0.get(offset..end).ok_or(Status::InvalidParameter)
    }
}
