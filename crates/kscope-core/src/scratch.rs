use smallvec::SmallVec;

use crate::{NativeResult, Status};

/// A private buffer for native queries.
///
/// Requests up to 64 bytes stay on the stack.
pub type ScratchBuffer = SmallVec<[u8; 64]>;

/// How many times [`query_sized`] retries when the required size keeps
/// changing between the sizing call and the real call.
const QUERY_ATTEMPTS: usize = 3;

/// Allocates a zeroed scratch buffer of `len` bytes.
///
/// Allocation failure is reported as [`Status::InsufficientResources`].
pub fn scratch(len: usize) -> Result<ScratchBuffer, Status> {
    let mut buffer = ScratchBuffer::new();
    buffer
        .try_reserve(len)
        .map_err(|_| Status::InsufficientResources)?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Runs a variable-length native query into a private buffer.
///
/// The query is first issued into the inline stack buffer. If it reports
/// a size mismatch, a buffer of the reported size is allocated and the
/// query is issued again. On success, the returned buffer is truncated to
/// the number of bytes the query produced.
pub fn query_sized<F>(mut query: F) -> Result<ScratchBuffer, Status>
where
    F: FnMut(&mut [u8]) -> NativeResult,
{
    let mut buffer = scratch(64)?;

    for _ in 0..QUERY_ATTEMPTS {
        match query(&mut buffer) {
            Ok(written) => {
                buffer.truncate(written as usize);
                return Ok(buffer);
            }
            Err(err) if err.status.is_size_mismatch() && err.required as usize > buffer.len() => {
                buffer = scratch(err.required as usize)?;
            }
            Err(err) => return Err(err.status),
        }
    }

    Err(Status::BufferTooSmall)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LengthStatus;

    #[test]
    fn grows_once() -> Result<(), Status> {
        let mut calls = 0;
        let data = query_sized(|buffer| {
            calls += 1;
            if buffer.len() < 100 {
                return Err(LengthStatus::new(Status::InfoLengthMismatch, 100));
            }

            buffer[..100].fill(0xaa);
            Ok(100)
        })?;

        assert_eq!(calls, 2);
        assert_eq!(data.len(), 100);
        assert!(data.iter().all(|&byte| byte == 0xaa));
        Ok(())
    }

    #[test]
    fn propagates_other_failures() {
        let result = query_sized(|_| Err(LengthStatus::new(Status::AccessDenied, 0)));
        assert_eq!(result.err(), Some(Status::AccessDenied));
    }
}
