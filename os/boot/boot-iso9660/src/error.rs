use crate::DeviceError;
use boot_arena::ArenaError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Iso9660Error {
    #[error("The path is not a well-formed absolute path")]
    InvalidArgument,
    #[error("The volume is corrupted: {0}")]
    CorruptedVolume(&'static str),
    #[error("No such file or directory")]
    FileNotFound,
    #[error("Reading from the boot device failed")]
    ReadError(#[from] DeviceError),
    #[error("Out of memory while reading the volume")]
    OutOfMemory(#[from] ArenaError),
}
