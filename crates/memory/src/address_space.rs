use crate::bus::{MemoryBus, MmioHandler};
use crate::phys::GuestMemory;
use crate::region::{Access, Backing, MemoryRegion, RegionKind, BITBAND_ALIAS_SIZE};
use crate::{BusError, BusResult};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Size of the 32-bit physical address space.
pub const PHYS_ADDR_SPACE_SIZE: u64 = 1 << 32;

/// Link handle shared between the machine and the devices that need to reach system memory.
pub type SharedAddressSpace = Rc<RefCell<AddressSpace>>;

/// What happens on an access that no region claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionFailurePolicy {
    /// Report a [`BusError::Unmapped`].
    #[default]
    Fault,
    /// Reads return zero and writes are discarded.
    Ignore,
}

/// Errors mapping a region into an [`AddressSpace`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error(
        "region {name:?} [{base:#x}, {end:#x}) lies outside the {space_size:#x}-byte address space"
    )]
    OutOfRange {
        name: String,
        base: u64,
        end: u64,
        space_size: u64,
    },
    #[error(
        "region {name:?} [{base:#x}, {end:#x}) overlaps {existing:?} [{existing_base:#x}, {existing_end:#x})"
    )]
    Overlap {
        name: String,
        base: u64,
        end: u64,
        existing: String,
        existing_base: u64,
        existing_end: u64,
    },
}

/// Snapshot of one mapping, for inspection and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub kind: RegionKind,
    pub access: Access,
}

impl RegionInfo {
    pub fn end(&self) -> u64 {
        self.base + self.size
    }
}

struct Mapping {
    base: u64,
    region: MemoryRegion,
}

impl Mapping {
    #[inline]
    fn end(&self) -> u64 {
        self.base + self.region.size()
    }
}

/// The machine's physical address space: a set of disjoint regions inside `[0, 4 GiB)`.
///
/// Mappings are kept sorted by base address; `add_subregion` refuses anything that would
/// overlap an existing mapping.
pub struct AddressSpace {
    name: String,
    policy: TransactionFailurePolicy,
    mappings: Vec<Mapping>,
}

impl AddressSpace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: TransactionFailurePolicy::default(),
            mappings: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedAddressSpace {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> TransactionFailurePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: TransactionFailurePolicy) {
        self.policy = policy;
    }

    /// Map `region` at `base`.
    pub fn add_subregion(&mut self, base: u64, region: MemoryRegion) -> Result<(), MapError> {
        let size = region.size();
        let end = match base.checked_add(size) {
            Some(end) if end <= PHYS_ADDR_SPACE_SIZE => end,
            _ => {
                return Err(MapError::OutOfRange {
                    name: region.name().to_string(),
                    base,
                    end: base.saturating_add(size),
                    space_size: PHYS_ADDR_SPACE_SIZE,
                })
            }
        };

        let idx = self.mappings.partition_point(|m| m.base < base);
        let neighbours = [idx.checked_sub(1), Some(idx)];
        for existing in neighbours.into_iter().flatten() {
            let Some(m) = self.mappings.get(existing) else {
                continue;
            };
            if base < m.end() && m.base < end {
                return Err(MapError::Overlap {
                    name: region.name().to_string(),
                    base,
                    end,
                    existing: m.region.name().to_string(),
                    existing_base: m.base,
                    existing_end: m.end(),
                });
            }
        }

        tracing::trace!(
            space = %self.name,
            region = region.name(),
            base = format_args!("{base:#010x}"),
            size = format_args!("{size:#x}"),
            "mapped region"
        );
        self.mappings.insert(idx, Mapping { base, region });
        Ok(())
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionInfo> + '_ {
        self.mappings.iter().map(|m| RegionInfo {
            name: m.region.name().to_string(),
            base: m.base,
            size: m.region.size(),
            kind: m.region.kind(),
            access: m.region.access(),
        })
    }

    pub fn find_region(&self, name: &str) -> Option<RegionInfo> {
        self.regions().find(|r| r.name == name)
    }

    /// Returns the mapping covering `paddr`, if any.
    pub fn region_at(&self, paddr: u64) -> Option<RegionInfo> {
        let idx = self.index_for(paddr)?;
        self.regions().nth(idx)
    }

    #[inline]
    fn index_for(&self, paddr: u64) -> Option<usize> {
        let idx = self.mappings.partition_point(|m| m.end() <= paddr);
        let m = self.mappings.get(idx)?;
        (m.base <= paddr).then_some(idx)
    }

    /// First mapped address above `paddr`, bounded by the end of the address space.
    #[inline]
    fn next_mapped(&self, paddr: u64) -> u64 {
        let idx = self.mappings.partition_point(|m| m.base <= paddr);
        self.mappings
            .get(idx)
            .map_or(PHYS_ADDR_SPACE_SIZE, |m| m.base)
    }

    /// Guest read of `dst.len()` bytes starting at `paddr`.
    pub fn read(&mut self, paddr: u64, dst: &mut [u8]) -> BusResult<()> {
        self.read_inner(paddr, dst, false)
    }

    /// Guest write. Writes to regions without [`Access::WRITE`] are discarded.
    pub fn write(&mut self, paddr: u64, src: &[u8]) -> BusResult<()> {
        self.write_inner(paddr, src, false)
    }

    /// Loader write path: stores into RAM or ROM even when the guest cannot write there.
    ///
    /// Every byte must land in a RAM or ROM mapping.
    pub fn write_rom(&mut self, paddr: u64, src: &[u8]) -> BusResult<()> {
        let mut pos = 0usize;
        while pos < src.len() {
            let addr = paddr + pos as u64;
            let Some(idx) = self.index_for(addr) else {
                return Err(BusError::Unmapped {
                    addr,
                    len: src.len() - pos,
                    write: true,
                });
            };
            let m = &mut self.mappings[idx];
            let span = (src.len() - pos).min((m.end() - addr) as usize);
            let offset = addr - m.base;
            match &mut m.region.backing {
                Backing::Memory(mem) => mem.write_from(offset, &src[pos..pos + span])?,
                Backing::Mmio(_) | Backing::BitBand { .. } => {
                    return Err(BusError::NotLoadable {
                        addr,
                        region: m.region.name().to_string(),
                    })
                }
            }
            pos += span;
        }
        Ok(())
    }

    fn unmapped(&self, addr: u64, len: usize, write: bool) -> BusResult<()> {
        match self.policy {
            TransactionFailurePolicy::Fault => Err(BusError::Unmapped { addr, len, write }),
            TransactionFailurePolicy::Ignore => {
                tracing::trace!(
                    space = %self.name,
                    addr = format_args!("{addr:#010x}"),
                    len,
                    write,
                    "ignored unassigned access"
                );
                Ok(())
            }
        }
    }

    fn read_inner(&mut self, paddr: u64, dst: &mut [u8], via_alias: bool) -> BusResult<()> {
        let mut pos = 0usize;
        while pos < dst.len() {
            let addr = paddr.saturating_add(pos as u64);
            let remaining = dst.len() - pos;
            let Some(idx) = self.index_for(addr) else {
                let span = if addr >= PHYS_ADDR_SPACE_SIZE {
                    remaining
                } else {
                    remaining.min((self.next_mapped(addr) - addr) as usize)
                };
                self.unmapped(addr, span, false)?;
                dst[pos..pos + span].fill(0);
                pos += span;
                continue;
            };

            let (base, end) = (self.mappings[idx].base, self.mappings[idx].end());
            let span = remaining.min((end - addr) as usize);
            let offset = addr - base;
            let chunk = &mut dst[pos..pos + span];
            match &mut self.mappings[idx].region.backing {
                Backing::Memory(mem) => mem.read_into(offset, chunk)?,
                Backing::Mmio(handler) => mmio_read(handler.as_mut(), offset, chunk),
                Backing::BitBand { source_base } => {
                    let source_base = *source_base;
                    if via_alias {
                        return Err(BusError::AliasLoop { addr });
                    }
                    self.bitband_read(source_base, offset, chunk)?;
                }
            }
            pos += span;
        }
        Ok(())
    }

    fn write_inner(&mut self, paddr: u64, src: &[u8], via_alias: bool) -> BusResult<()> {
        let mut pos = 0usize;
        while pos < src.len() {
            let addr = paddr.saturating_add(pos as u64);
            let remaining = src.len() - pos;
            let Some(idx) = self.index_for(addr) else {
                let span = if addr >= PHYS_ADDR_SPACE_SIZE {
                    remaining
                } else {
                    remaining.min((self.next_mapped(addr) - addr) as usize)
                };
                self.unmapped(addr, span, true)?;
                pos += span;
                continue;
            };

            let m = &mut self.mappings[idx];
            let span = remaining.min((m.end() - addr) as usize);
            let offset = addr - m.base;
            let chunk = &src[pos..pos + span];
            if !m.region.access().contains(Access::WRITE) {
                tracing::trace!(
                    region = m.region.name(),
                    addr = format_args!("{addr:#010x}"),
                    "discarded write to read-only region"
                );
                pos += span;
                continue;
            }
            match &mut m.region.backing {
                Backing::Memory(mem) => mem.write_from(offset, chunk)?,
                Backing::Mmio(handler) => mmio_write(handler.as_mut(), offset, chunk),
                Backing::BitBand { source_base } => {
                    let source_base = *source_base;
                    if via_alias {
                        return Err(BusError::AliasLoop { addr });
                    }
                    self.bitband_write(source_base, offset, chunk)?;
                }
            }
            pos += span;
        }
        Ok(())
    }

    /// Reads the bit selected by alias `offset` and returns it zero-extended to `dst.len()` bytes.
    fn bitband_read(&mut self, source_base: u64, offset: u64, dst: &mut [u8]) -> BusResult<()> {
        let size = access_size(dst.len());
        let (addr, bitpos) = bitband_target(source_base, offset, size);
        let mut buf = [0u8; 8];
        self.read_inner(addr, &mut buf[..size], true)?;
        let word = u64::from_le_bytes(buf);
        let bit = (word >> bitpos) & 1;
        dst.fill(0);
        dst[0] = bit as u8;
        Ok(())
    }

    fn bitband_write(&mut self, source_base: u64, offset: u64, src: &[u8]) -> BusResult<()> {
        let size = access_size(src.len());
        let (addr, bitpos) = bitband_target(source_base, offset, size);
        let mut buf = [0u8; 8];
        self.read_inner(addr, &mut buf[..size], true)?;
        let mut word = u64::from_le_bytes(buf);
        if src[0] & 1 != 0 {
            word |= 1 << bitpos;
        } else {
            word &= !(1 << bitpos);
        }
        self.write_inner(addr, &word.to_le_bytes()[..size], true)
    }
}

impl MemoryBus for AddressSpace {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) -> BusResult<()> {
        self.read(paddr, buf)
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) -> BusResult<()> {
        self.write(paddr, buf)
    }
}

/// Largest power-of-two access width (up to 8 bytes) not exceeding `len`.
#[inline]
fn access_size(len: usize) -> usize {
    match len {
        0 | 1 => 1,
        2 | 3 => 2,
        4..=7 => 4,
        _ => 8,
    }
}

/// Source address (aligned down to `size`) and bit position for a bit-band alias offset.
#[inline]
fn bitband_target(source_base: u64, offset: u64, size: usize) -> (u64, u32) {
    let size = size as u64;
    let byte_addr = source_base | ((offset & (BITBAND_ALIAS_SIZE - 1)) >> 5);
    let addr = byte_addr & !(size - 1);
    let bitpos = ((offset >> 2) & (size * 8 - 1)) as u32;
    (addr, bitpos)
}

fn mmio_read(handler: &mut dyn MmioHandler, offset: u64, dst: &mut [u8]) {
    if matches!(dst.len(), 1 | 2 | 4 | 8) {
        let value = handler.read(offset, dst.len());
        dst.copy_from_slice(&value.to_le_bytes()[..dst.len()]);
        return;
    }
    for (i, byte) in dst.iter_mut().enumerate() {
        *byte = handler.read(offset + i as u64, 1) as u8;
    }
}

fn mmio_write(handler: &mut dyn MmioHandler, offset: u64, src: &[u8]) {
    if matches!(src.len(), 1 | 2 | 4 | 8) {
        let mut buf = [0u8; 8];
        buf[..src.len()].copy_from_slice(src);
        handler.write(offset, src.len(), u64::from_le_bytes(buf));
        return;
    }
    for (i, &byte) in src.iter().enumerate() {
        handler.write(offset + i as u64, 1, u64::from(byte));
    }
}
