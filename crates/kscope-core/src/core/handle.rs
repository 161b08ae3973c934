use super::macros::impl_ops;

impl_ops!(Handle, u64, "Handle value scoped to a process handle table");

impl Handle {
    /// Tag that marks a handle as belonging to the system handle table.
    ///
    /// Kernel handles are negative when interpreted as a signed pointer,
    /// which keeps them out of reach of user-mode handle values.
    pub const KERNEL_HANDLE_BIT: u64 = 0xffff_ffff_8000_0000;

    /// The pseudo handle for the current process.
    pub const CURRENT_PROCESS: Self = Self(u64::MAX);

    /// The pseudo handle for the current thread.
    pub const CURRENT_THREAD: Self = Self(u64::MAX - 1);

    /// Lowest pseudo handle value (`-6` as a signed pointer).
    const PSEUDO_HANDLE_FLOOR: u64 = u64::MAX - 5;

    /// Checks whether the handle carries the kernel-handle tag.
    ///
    /// # Implementation Details
    ///
    /// Corresponds to `(LONG_PTR)Handle < 0`.
    pub const fn is_kernel(self) -> bool {
        (self.0 as i64) < 0
    }

    /// Checks whether the handle is one of the well-known pseudo handles
    /// (current process, current thread, current token and friends).
    pub const fn is_pseudo(self) -> bool {
        self.0 >= Self::PSEUDO_HANDLE_FLOOR
    }

    /// Returns the handle with the kernel-handle tag applied.
    pub const fn to_kernel(self) -> Self {
        Self(self.0 | Self::KERNEL_HANDLE_BIT)
    }
}
