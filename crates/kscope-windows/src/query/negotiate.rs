//! Buffer negotiation shared by every information class.

use kscope_core::{KernelBackend, LengthStatus, NativeResult, Status, UnicodeString, Va, scratch};
use zerocopy::{FromBytes, Immutable, IntoBytes};

use super::QueryContext;

impl<Backend> QueryContext<'_, Backend>
where
    Backend: KernelBackend,
{
    /// Checks that the output buffer can hold a `T` and returns its address.
    ///
    /// A missing or short buffer fails with [`Status::InfoLengthMismatch`]
    /// and the size of `T` as the required length.
    pub(super) fn fixed_output<T>(&self) -> Result<Va, LengthStatus> {
        let size = size_of::<T>() as u32;

        self.output
            .fits(size)
            .ok_or(LengthStatus::new(Status::InfoLengthMismatch, size))
    }

    /// Produces a fixed-size record and copies it to the caller.
    ///
    /// `produce` runs only once the output buffer is known to be large
    /// enough.
    pub(super) fn fixed<T, F>(&self, produce: F) -> Result<u32, LengthStatus>
    where
        T: IntoBytes + Immutable,
        F: FnOnce() -> Result<T, Status>,
    {
        let output = self.fixed_output::<T>()?;
        let value = produce()?;

        self.access.write_value(output, &value)?;
        Ok(size_of::<T>() as u32)
    }

    /// Runs a fixed-size native query in the context of the target process
    /// and copies the result to the caller.
    pub(super) fn native_fixed<T, F>(&self, query: F) -> Result<u32, LengthStatus>
    where
        T: FromBytes + IntoBytes + Immutable,
        F: FnOnce(&mut [u8]) -> NativeResult,
    {
        self.fixed(|| {
            let mut value = T::new_zeroed();

            let _attach = self.kernel.attach(self.process);
            query(value.as_mut_bytes()).map_err(|err| err.status)?;

            Ok(value)
        })
    }

    /// Runs a variable-length query into a private buffer and copies the
    /// result to the caller once it is known to fit.
    ///
    /// The query receives a buffer of exactly the caller's declared length
    /// and reports how many bytes it produced. Its output starts with a
    /// `UNICODE_STRING` pointing into that buffer; the pointer is moved to
    /// the caller's buffer before the copy.
    ///
    /// Size failures of the query are reported as
    /// [`Status::BufferTooSmall`] with the length it asked for. A call
    /// without an output buffer learns the required length the same way.
    pub(super) fn negotiate<F>(&self, header_size: usize, query: F) -> Result<u32, LengthStatus>
    where
        F: FnOnce(&mut [u8]) -> NativeResult,
    {
        let len = self.output.len as usize;

        // Some natives write slightly past the header size they report.
        let mut buffer = scratch(len.max(header_size) + size_of::<u64>())?;
        let written = query(&mut buffer[..len]).map_err(LengthStatus::normalized)?;

        let Some(output) = self.output.va
        else {
            return Err(LengthStatus::new(Status::BufferTooSmall, written));
        };

        let base = Va(buffer.as_ptr() as u64);
        UnicodeString::rebase(&mut buffer, base, output);

        let data = buffer
            .get(..written as usize)
            .ok_or(Status::BufferOverflow)?;

        self.access.write(output, data)?;
        Ok(written)
    }
}
