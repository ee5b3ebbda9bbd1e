use crate::BusResult;

/// Abstraction for guest physical memory access.
///
/// Reads take `&mut self` because the target may be an MMIO register with side effects.
pub trait MemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) -> BusResult<()>;
    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> BusResult<()>;

    fn read_u8(&mut self, paddr: u64) -> BusResult<u8> {
        let mut buf = [0u8; 1];
        self.read_physical(paddr, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self, paddr: u64) -> BusResult<u16> {
        let mut buf = [0u8; 2];
        self.read_physical(paddr, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self, paddr: u64) -> BusResult<u32> {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u8(&mut self, paddr: u64, val: u8) -> BusResult<()> {
        self.write_physical(paddr, &[val])
    }

    fn write_u16(&mut self, paddr: u64, val: u16) -> BusResult<()> {
        self.write_physical(paddr, &val.to_le_bytes())
    }

    fn write_u32(&mut self, paddr: u64, val: u32) -> BusResult<()> {
        self.write_physical(paddr, &val.to_le_bytes())
    }
}

/// Device-side handler for a memory-mapped I/O region.
///
/// `offset` is relative to the region base; `size` is 1, 2, 4 or 8 bytes.
pub trait MmioHandler {
    fn read(&mut self, offset: u64, size: usize) -> u64;
    fn write(&mut self, offset: u64, size: usize, value: u64);
}
