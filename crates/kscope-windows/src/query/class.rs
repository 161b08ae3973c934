use kscope_core::Status;

use super::info::{
    EtwRegBasicInformation, FileObjectDriverInformation, FileObjectInformation, KernelUserTimes,
    ObjectAttributesInformation, ObjectBasicInformation, ObjectHandleFlagInformation,
    ProcessBasicInformation, SectionAddressInformation, SectionBasicInformation,
    SectionImageInformation, SectionInternalImageInformation, ThreadBasicInformation,
    ThreadIsTerminated,
};

macro_rules! information_classes {
    (
        $(
            $(#[$meta:meta])*
            $name:ident = $value:literal => $shape:expr
        ),+ $(,)?
    ) => {
        /// An object information class understood by the dispatcher.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum InformationClass {
            $(
                $(#[$meta])*
                $name = $value,
            )+
        }

        impl InformationClass {
            /// Every information class.
            pub const ALL: &'static [InformationClass] = &[$(Self::$name),+];

            /// Returns the shape of the result.
            pub const fn shape(self) -> Shape {
                match self {
                    $(Self::$name => $shape,)+
                }
            }
        }

        impl TryFrom<u32> for InformationClass {
            type Error = Status;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$name),)+
                    _ => Err(Status::InvalidInfoClass),
                }
            }
        }
    };
}

/// The shape of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A record of exactly this many bytes.
    Fixed(u32),

    /// A header of this many bytes followed by variable-length data.
    Variable(u32),
}

const fn fixed<T>() -> Shape {
    Shape::Fixed(size_of::<T>() as u32)
}

/// `UNICODE_STRING`, the header of every name result.
const NAME: Shape = Shape::Variable(16);

information_classes! {
    /// [`ObjectBasicInformation`]
    Basic = 0 => fixed::<ObjectBasicInformation>(),

    /// The name of the object, `OBJECT_NAME_INFORMATION`.
    Name = 1 => NAME,

    /// `OBJECT_TYPE_INFORMATION`
    Type = 2 => Shape::Variable(super::info::OBJECT_TYPE_INFORMATION_SIZE as u32),

    /// [`ObjectHandleFlagInformation`]
    HandleFlag = 3 => fixed::<ObjectHandleFlagInformation>(),

    /// [`ProcessBasicInformation`]
    ProcessBasic = 4 => fixed::<ProcessBasicInformation>(),

    /// [`ThreadBasicInformation`]
    ThreadBasic = 5 => fixed::<ThreadBasicInformation>(),

    /// [`EtwRegBasicInformation`]
    EtwRegBasic = 6 => fixed::<EtwRegBasicInformation>(),

    /// [`FileObjectInformation`]
    FileObjectInformation = 7 => fixed::<FileObjectInformation>(),

    /// [`FileObjectDriverInformation`]
    FileObjectDriver = 8 => fixed::<FileObjectDriverInformation>(),

    /// [`KernelUserTimes`] of a process.
    ProcessTimes = 9 => fixed::<KernelUserTimes>(),

    /// [`KernelUserTimes`] of a thread.
    ThreadTimes = 10 => fixed::<KernelUserTimes>(),

    /// The image file name of a process.
    ProcessImageFileName = 11 => NAME,

    /// `THREAD_NAME_INFORMATION`
    ThreadNameInformation = 12 => NAME,

    /// [`ThreadIsTerminated`]
    ThreadIsTerminated = 13 => fixed::<ThreadIsTerminated>(),

    /// [`SectionBasicInformation`]
    SectionBasic = 14 => fixed::<SectionBasicInformation>(),

    /// The name of the file backing a section.
    SectionFileName = 15 => NAME,

    /// [`SectionImageInformation`]
    SectionImage = 16 => fixed::<SectionImageInformation>(),

    /// Relocation delta of an image section.
    SectionRelocation = 17 => fixed::<SectionAddressInformation>(),

    /// Original base of an image section.
    SectionOriginalBase = 18 => fixed::<SectionAddressInformation>(),

    /// [`SectionInternalImageInformation`]
    SectionInternalImage = 19 => fixed::<SectionInternalImageInformation>(),

    /// [`ObjectAttributesInformation`]
    Attributes = 20 => fixed::<ObjectAttributesInformation>(),
}
