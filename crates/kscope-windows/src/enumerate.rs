//! Whole-process handle enumeration into a caller buffer.

use std::ops::ControlFlow;

use kscope_core::{
    AccessMode, CallerAccess, CallerBuffer, Handle, KernelBackend, LengthStatus, ObjectKind,
    Status, Va,
};

use crate::{DecodedHandleEntry, WindowsKernel, query::info::ProcessHandleRecord};

/// Size of the `{ HandleCount, Reserved }` header preceding the records.
const HEADER_SIZE: u64 = 8;

/// Size of one [`ProcessHandleRecord`].
const RECORD_SIZE: u64 = size_of::<ProcessHandleRecord>() as u64;

/// A request to enumerate every handle of a process.
#[derive(Debug, Clone, Copy)]
pub struct HandleEnumerationRequest {
    /// Handle to the process, in the caller's handle table.
    pub process_handle: Handle,

    /// Output buffer receiving the handle count and the records.
    pub output: CallerBuffer,

    /// Optional location receiving the number of bytes required.
    pub return_length: Option<Va>,

    /// Privilege mode of the caller.
    pub access_mode: AccessMode,
}

impl From<&DecodedHandleEntry> for ProcessHandleRecord {
    fn from(entry: &DecodedHandleEntry) -> Self {
        Self {
            handle: entry.handle.0,
            object: entry.object.0,
            granted_access: entry.granted_access,
            object_type_index: entry.object_type_index,
            reserved1: 0,
            handle_attributes: entry.attributes.bits(),
            reserved2: 0,
        }
    }
}

/// Progress of an enumeration into the caller's buffer.
struct Cursor {
    base: Va,
    limit: u64,
    count: u32,
    status: Option<Status>,
}

impl Cursor {
    fn position(&self) -> u64 {
        HEADER_SIZE + self.count as u64 * RECORD_SIZE
    }

    fn record_error(&mut self, status: Status) {
        self.status.get_or_insert(status);
    }
}

impl<Backend> WindowsKernel<Backend>
where
    Backend: KernelBackend,
{
    /// Enumerates every handle of a process into the caller's buffer.
    ///
    /// The buffer receives a `u32` handle count, four bytes of padding and
    /// one [`ProcessHandleRecord`] per handle. Records that do not fit are
    /// counted but not written, so the count and the required length
    /// always describe the whole table.
    ///
    /// Returns the number of handles. On failure, the error carries the
    /// number of bytes required.
    pub fn enumerate_process_handles(
        &self,
        request: &HandleEnumerationRequest,
    ) -> Result<u32, LengthStatus> {
        let access = CallerAccess::new(self.backend(), request.access_mode);

        let base = request.output.va.ok_or(Status::InvalidParameterN(2))?;
        access.probe_for_write(base, request.output.len, 1)?;
        access.probe_output::<u32>(request.return_length)?;

        let process = self.reference_object(
            request.process_handle,
            0,
            Some(ObjectKind::Process),
            request.access_mode,
        )?;

        let mut cursor = Cursor {
            base,
            limit: request.output.len as u64,
            count: 0,
            status: None,
        };

        let session = self.acquire_handle_table(process.va())?;
        let result = session.enumerate(|entry| {
            let offset = cursor.position();
            cursor.count += 1;

            if offset + RECORD_SIZE <= cursor.limit {
                let record = ProcessHandleRecord::from(entry);
                if let Err(err) = access.write_value(cursor.base + offset, &record) {
                    tracing::debug!(handle = %entry.handle, %err, "failed to write record");
                    cursor.record_error(err);
                }
            }
            else {
                cursor.record_error(Status::BufferTooSmall);
            }

            ControlFlow::Continue(())
        });

        drop(session);
        drop(process);

        if let Err(err) = result {
            cursor.record_error(err);
        }

        let required = cursor.position();

        if cursor.limit >= HEADER_SIZE {
            access.write_value(base, &cursor.count)?;
        }
        else {
            cursor.record_error(Status::BufferTooSmall);
        }

        let required = u32::try_from(required).map_err(|_| Status::IntegerOverflow)?;

        if let Some(return_length) = request.return_length {
            access.write_value(return_length, &required)?;
        }

        match cursor.status {
            Some(status) => Err(LengthStatus::new(status, required)),
            None => Ok(cursor.count),
        }
    }
}
