use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::{CallerMemory, Status, Va};

/// Highest address a user-mode buffer may reach (`MM_USER_PROBE_ADDRESS`).
pub const USER_PROBE_ADDRESS: u64 = 0x0000_7fff_ffff_0000;

/// The privilege mode of the caller that issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// A trusted kernel-mode caller.
    KernelMode,

    /// An untrusted user-mode caller.
    UserMode,
}

/// A buffer in the caller's address space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallerBuffer {
    /// The address of the buffer, or `None` for a probe-only call.
    pub va: Option<Va>,

    /// The declared length of the buffer in bytes.
    pub len: u32,
}

impl CallerBuffer {
    /// Creates a new caller buffer descriptor.
    pub const fn new(va: Va, len: u32) -> Self {
        Self { va: Some(va), len }
    }

    /// An absent buffer.
    pub const fn none() -> Self {
        Self { va: None, len: 0 }
    }

    /// Returns the address if the buffer is present and can hold `len` bytes.
    pub fn fits(&self, len: u32) -> Option<Va> {
        self.va.filter(|_| self.len >= len)
    }
}

/// Validated, fault-contained access to caller buffers.
///
/// For a user-mode caller every buffer is probed before it is touched.
/// Kernel-mode callers skip the probe, but every copy in both modes goes
/// through the same fault-contained [`CallerMemory`] helpers.
pub struct CallerAccess<'a, Memory>
where
    Memory: CallerMemory + ?Sized,
{
    memory: &'a Memory,
    mode: AccessMode,
}

impl<'a, Memory> CallerAccess<'a, Memory>
where
    Memory: CallerMemory + ?Sized,
{
    /// Creates a new accessor for a caller in the given mode.
    pub fn new(memory: &'a Memory, mode: AccessMode) -> Self {
        Self { memory, mode }
    }

    /// Returns the caller's access mode.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Validates that a caller buffer may be written.
    ///
    /// # Implementation Details
    ///
    /// Mirrors `ProbeForWrite`: a zero-length buffer always passes, the
    /// address must be aligned to `alignment` and the whole range must lie
    /// below [`USER_PROBE_ADDRESS`].
    pub fn probe_for_write(&self, va: Va, len: u32, alignment: u32) -> Result<(), Status> {
        if self.mode == AccessMode::KernelMode {
            return Ok(());
        }

        probe(va, len, alignment)
    }

    /// Validates that a caller buffer may be read.
    pub fn probe_for_read(&self, va: Va, len: u32, alignment: u32) -> Result<(), Status> {
        if self.mode == AccessMode::KernelMode {
            return Ok(());
        }

        probe(va, len, alignment)
    }

    /// Probes an optional output value of type `T`.
    pub fn probe_output<T>(&self, va: Option<Va>) -> Result<(), Status> {
        match va {
            Some(va) => self.probe_for_write(va, size_of::<T>() as u32, align_of::<T>() as u32),
            None => Ok(()),
        }
    }

    /// Copies bytes into the caller's buffer.
    pub fn write(&self, va: Va, data: &[u8]) -> Result<(), Status> {
        self.memory.copy_to_caller(va, data)
    }

    /// Copies a value into the caller's buffer.
    pub fn write_value<T>(&self, va: Va, value: &T) -> Result<(), Status>
    where
        T: IntoBytes + Immutable,
    {
        self.memory.copy_to_caller(va, value.as_bytes())
    }

    /// Copies a value out of the caller's buffer.
    pub fn read_value<T>(&self, va: Va) -> Result<T, Status>
    where
        T: FromBytes + IntoBytes,
    {
        let mut value = T::new_zeroed();
        self.memory.copy_from_caller(va, value.as_mut_bytes())?;
        Ok(value)
    }
}

fn probe(va: Va, len: u32, alignment: u32) -> Result<(), Status> {
    if len == 0 {
        return Ok(());
    }

    if alignment > 1 && va.0 % alignment as u64 != 0 {
        return Err(Status::DatatypeMisalignment(va));
    }

    match va.0.checked_add(len as u64) {
        Some(end) if end <= USER_PROBE_ADDRESS => Ok(()),
        _ => Err(Status::AccessViolation(va)),
    }
}
