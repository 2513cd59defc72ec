use boot_arena::ArenaError;
use boot_elf::{AllocationError, ElfError};
use boot_iso9660::{DeviceError, Iso9660Error};
use boot_x86::{PagingError, TransitionError};

/// Why a boot failed. Every variant aborts the boot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("The boot volume is corrupted: {0}")]
    CorruptedVolume(&'static str),
    #[error("Unsupported kernel image: {0}")]
    UnsupportedFormat(&'static str),
    #[error("File not found")]
    FileNotFound,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Reading from the boot device failed")]
    ReadError,
    #[error("Unsupported: {0}")]
    UnsupportedFeature(&'static str),
    #[error("Fatal: {0}")]
    Fatal(&'static str),
}

impl From<Iso9660Error> for BootError {
    fn from(e: Iso9660Error) -> Self {
        match e {
            Iso9660Error::InvalidArgument => Self::InvalidArgument("path"),
            Iso9660Error::CorruptedVolume(what) => Self::CorruptedVolume(what),
            Iso9660Error::FileNotFound => Self::FileNotFound,
            Iso9660Error::ReadError(e) => e.into(),
            Iso9660Error::OutOfMemory(e) => e.into(),
        }
    }
}

impl From<DeviceError> for BootError {
    fn from(_: DeviceError) -> Self {
        Self::ReadError
    }
}

impl From<ArenaError> for BootError {
    fn from(e: ArenaError) -> Self {
        match e {
            ArenaError::OutOfMemory { .. } => Self::OutOfMemory,
            ArenaError::InvalidAlignment(_) => Self::InvalidArgument("alignment"),
        }
    }
}

impl From<ElfError> for BootError {
    fn from(e: ElfError) -> Self {
        match e {
            ElfError::UnsupportedFormat(what) => Self::UnsupportedFormat(what),
            ElfError::TooManySegments(_) => Self::UnsupportedFormat("too many loadable segments"),
            ElfError::Allocation(e) => e.into(),
        }
    }
}

impl From<AllocationError> for BootError {
    fn from(_: AllocationError) -> Self {
        Self::OutOfMemory
    }
}

impl From<PagingError> for BootError {
    fn from(e: PagingError) -> Self {
        match e {
            PagingError::OutOfMemory(e) => e.into(),
        }
    }
}

impl From<TransitionError> for BootError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::UnsupportedFeature(what) => Self::UnsupportedFeature(what),
        }
    }
}

#[cfg(feature = "uefi")]
impl From<BootError> for uefi::Status {
    fn from(e: BootError) -> Self {
        match e {
            BootError::InvalidArgument(_) => Self::INVALID_PARAMETER,
            BootError::CorruptedVolume(_) => Self::VOLUME_CORRUPTED,
            BootError::UnsupportedFormat(_) => Self::LOAD_ERROR,
            BootError::FileNotFound => Self::NOT_FOUND,
            BootError::OutOfMemory => Self::OUT_OF_RESOURCES,
            BootError::ReadError => Self::DEVICE_ERROR,
            BootError::UnsupportedFeature(_) => Self::UNSUPPORTED,
            BootError::Fatal(_) => Self::ABORTED,
        }
    }
}
