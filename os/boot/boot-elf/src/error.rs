/// The physical memory provider could not hand out the requested pages.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("Unable to allocate {pages} pages at physical address {phys:#x}")]
pub struct AllocationError {
    pub phys: u64,
    pub pages: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfError {
    #[error("Unsupported executable: {0}")]
    UnsupportedFormat(&'static str),
    #[error("The executable declares more than {0} loadable segments")]
    TooManySegments(usize),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}
