use crate::{Hex, Va};

/// A failure status returned by the engine or by a platform primitive.
///
/// Every variant maps onto exactly one NT status code, see [`Status::code`].
/// Success is expressed through `Ok(_)` and never through this type.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation failed for an unspecified reason.
    #[error("The operation was unsuccessful.")]
    Unsuccessful,

    /// The information class is not recognized.
    #[error("Invalid information class.")]
    InvalidInfoClass,

    /// The declared buffer length does not match the information class.
    #[error("Information length mismatch.")]
    InfoLengthMismatch,

    /// A caller buffer could not be accessed.
    #[error("Access violation at {0}.")]
    AccessViolation(Va),

    /// The handle is not valid in the handle table it was presented to.
    #[error("Invalid handle.")]
    InvalidHandle,

    /// A parameter is invalid.
    #[error("Invalid parameter.")]
    InvalidParameter,

    /// The numbered parameter (1-based) is invalid.
    #[error("Invalid parameter {0}.")]
    InvalidParameterN(u8),

    /// The device does not support the request.
    #[error("Invalid device request.")]
    InvalidDeviceRequest,

    /// The requested access is not allowed.
    #[error("Access denied.")]
    AccessDenied,

    /// The buffer is too small to hold the result.
    #[error("Buffer too small.")]
    BufferTooSmall,

    /// The buffer was too small and the result was truncated.
    #[error("Buffer overflow.")]
    BufferOverflow,

    /// The object is not of the expected type.
    #[error("Object type mismatch.")]
    ObjectTypeMismatch,

    /// A caller buffer is not aligned as required.
    #[error("Datatype misalignment at {0}.")]
    DatatypeMisalignment(Va),

    /// Not enough resources to complete the request.
    #[error("Insufficient resources.")]
    InsufficientResources,

    /// An arithmetic overflow occurred while computing a length.
    #[error("Integer overflow.")]
    IntegerOverflow,

    /// The operation is not supported on this kernel.
    #[error("Operation not supported.")]
    NotSupported,

    /// A name exceeds the maximum length of a counted string.
    #[error("Name too long.")]
    NameTooLong,

    /// The file object has already been cleaned up.
    #[error("File closed.")]
    FileClosed,

    /// The process is already exiting.
    #[error("Too late.")]
    TooLate,

    /// Completing the request here could deadlock.
    #[error("Possible deadlock.")]
    PossibleDeadlock,

    /// A required dynamic offset is not available.
    #[error("No interface.")]
    NoInterface,

    /// The requested entity does not exist.
    #[error("Not found.")]
    NotFound,

    /// Any other status reported by a platform primitive.
    #[error("Native status {}.", Hex(*.0))]
    Native(u32),
}

impl Status {
    /// Returns the NT status code.
    pub const fn code(self) -> u32 {
        match self {
            Self::Unsuccessful => 0xc000_0001,
            Self::InvalidInfoClass => 0xc000_0003,
            Self::InfoLengthMismatch => 0xc000_0004,
            Self::AccessViolation(_) => 0xc000_0005,
            Self::InvalidHandle => 0xc000_0008,
            Self::InvalidParameter => 0xc000_000d,
            Self::InvalidParameterN(n) => 0xc000_00ef + (n as u32).saturating_sub(1),
            Self::InvalidDeviceRequest => 0xc000_0010,
            Self::AccessDenied => 0xc000_0022,
            Self::BufferTooSmall => 0xc000_0023,
            Self::BufferOverflow => 0x8000_0005,
            Self::ObjectTypeMismatch => 0xc000_0024,
            Self::DatatypeMisalignment(_) => 0x8000_0002,
            Self::InsufficientResources => 0xc000_009a,
            Self::IntegerOverflow => 0xc000_0095,
            Self::NotSupported => 0xc000_00bb,
            Self::NameTooLong => 0xc000_0106,
            Self::FileClosed => 0xc000_0128,
            Self::TooLate => 0xc000_0189,
            Self::PossibleDeadlock => 0xc000_0194,
            Self::NoInterface => 0xc000_02b9,
            Self::NotFound => 0xc000_0225,
            Self::Native(code) => code,
        }
    }

    /// Converts a raw NT status code back into a status.
    ///
    /// Returns `None` for success and informational codes. Codes that
    /// carry an address lose it in the conversion.
    pub const fn from_code(code: u32) -> Option<Self> {
        if code < 0x8000_0000 {
            return None;
        }

        Some(match code {
            0xc000_0001 => Self::Unsuccessful,
            0xc000_0003 => Self::InvalidInfoClass,
            0xc000_0004 => Self::InfoLengthMismatch,
            0xc000_0005 => Self::AccessViolation(Va(0)),
            0xc000_0008 => Self::InvalidHandle,
            0xc000_000d => Self::InvalidParameter,
            0xc000_00ef..=0xc000_00fa => Self::InvalidParameterN((code - 0xc000_00ef + 1) as u8),
            0xc000_0010 => Self::InvalidDeviceRequest,
            0xc000_0022 => Self::AccessDenied,
            0xc000_0023 => Self::BufferTooSmall,
            0x8000_0005 => Self::BufferOverflow,
            0xc000_0024 => Self::ObjectTypeMismatch,
            0x8000_0002 => Self::DatatypeMisalignment(Va(0)),
            0xc000_009a => Self::InsufficientResources,
            0xc000_0095 => Self::IntegerOverflow,
            0xc000_00bb => Self::NotSupported,
            0xc000_0106 => Self::NameTooLong,
            0xc000_0128 => Self::FileClosed,
            0xc000_0189 => Self::TooLate,
            0xc000_0194 => Self::PossibleDeadlock,
            0xc000_02b9 => Self::NoInterface,
            0xc000_0225 => Self::NotFound,
            _ => Self::Native(code),
        })
    }

    /// Checks whether the status reports a buffer that is too small,
    /// regardless of which subsystem produced it.
    pub const fn is_size_mismatch(self) -> bool {
        matches!(
            self,
            Self::BufferTooSmall | Self::BufferOverflow | Self::InfoLengthMismatch
        )
    }
}

/// A failure status together with the length the caller must provide.
///
/// Returned by every operation that can fail because of buffer sizing, so
/// the caller can retry with a buffer of `required` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthStatus {
    /// The failure status.
    pub status: Status,

    /// The number of bytes required, or zero if not meaningful.
    pub required: u32,
}

impl LengthStatus {
    /// Creates a new length status.
    pub const fn new(status: Status, required: u32) -> Self {
        Self { status, required }
    }

    /// Replaces any "wrong size" status with [`Status::BufferTooSmall`].
    pub const fn normalized(self) -> Self {
        if self.status.is_size_mismatch() {
            Self::new(Status::BufferTooSmall, self.required)
        }
        else {
            self
        }
    }
}

impl From<Status> for LengthStatus {
    fn from(status: Status) -> Self {
        Self::new(status, 0)
    }
}

impl std::fmt::Display for LengthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} (required: {})", self.status, self.required)
    }
}

impl std::error::Error for LengthStatus {}

/// The outcome of a native variable-length query.
///
/// On success, holds the number of bytes written into the supplied buffer.
pub type NativeResult = Result<u32, LengthStatus>;
