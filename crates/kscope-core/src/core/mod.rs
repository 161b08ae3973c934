mod address;
mod handle;
mod hex;
pub(crate) mod macros;

pub use self::{
    address::{PointerWidth, ProcessId, Va},
    handle::Handle,
    hex::Hex,
};
