mod handle_table;
mod handle_table_entry;
pub(crate) mod macros;
mod object;

pub use self::{
    handle_table::HandleTableSession,
    handle_table_entry::{DecodedHandleEntry, EntryLayout, WindowsHandleTableEntry},
    object::{FileObjectFlags, ObjectHeaderFlags, WindowsFileObject, WindowsObject},
};
