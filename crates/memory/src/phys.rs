use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuestMemoryError {
    #[error("offset {offset:#x}+{len} is outside a {size:#x}-byte backing store")]
    OutOfRange { offset: u64, len: usize, size: u64 },
    #[error("backing store of {size:#x} bytes cannot be allocated on this host")]
    SizeTooLarge { size: u64 },
}

pub type GuestMemoryResult<T> = Result<T, GuestMemoryError>;

/// Byte store behind a RAM or ROM region. Offsets are relative to the start of the region.
pub trait GuestMemory {
    fn size(&self) -> u64;
    fn read_into(&self, offset: u64, dst: &mut [u8]) -> GuestMemoryResult<()>;
    fn write_from(&mut self, offset: u64, src: &[u8]) -> GuestMemoryResult<()>;
}

/// Contiguous, zero-filled storage. Erased flash and cold SRAM both read as zero.
#[derive(Debug, Clone)]
pub struct DenseMemory {
    bytes: Vec<u8>,
}

impl DenseMemory {
    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        let len = usize::try_from(size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        Ok(Self {
            bytes: vec![0; len],
        })
    }

    fn span(&self, offset: u64, len: usize) -> GuestMemoryResult<core::ops::Range<usize>> {
        let out_of_range = || GuestMemoryError::OutOfRange {
            offset,
            len,
            size: self.size(),
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = start.checked_add(len).ok_or_else(out_of_range)?;
        if end > self.bytes.len() {
            return Err(out_of_range());
        }
        Ok(start..end)
    }
}

impl GuestMemory for DenseMemory {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_into(&self, offset: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        let span = self.span(offset, dst.len())?;
        dst.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    fn write_from(&mut self, offset: u64, src: &[u8]) -> GuestMemoryResult<()> {
        let span = self.span(offset, src.len())?;
        self.bytes[span].copy_from_slice(src);
        Ok(())
    }
}
