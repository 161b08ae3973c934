use super::macros::{impl_arith, impl_ops};

impl_ops!(Va, u64, "Kernel or caller virtual address");
impl_arith!(Va, u64);

impl_ops!(ProcessId, u64, "Process identifier");

/// The width of a native pointer on the inspected kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    /// 32-bit pointers.
    U32,

    /// 64-bit pointers.
    U64,
}

impl PointerWidth {
    /// Returns the size of a pointer in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}
