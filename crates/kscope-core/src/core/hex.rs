/// A wrapper that formats an integer as zero-padded hexadecimal.
///
/// The padding follows the width of the wrapped type, so a `u32` access
/// mask prints as `0x001f0fff` and a `u64` address as `0xffffa00000001000`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Hex<T>(pub T);

macro_rules! impl_hex {
    ($($type:ty => $width:literal),+ $(,)?) => {
        $(
            impl ::std::fmt::Debug for Hex<$type> {
                fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                    write!(f, "0x{:0width$x}", self.0, width = $width)
                }
            }

            impl ::std::fmt::Display for Hex<$type> {
                fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                    write!(f, "0x{:0width$x}", self.0, width = $width)
                }
            }
        )+
    };
}

impl_hex! {
    u8 => 2,
    u16 => 4,
    u32 => 8,
    u64 => 16,
}
