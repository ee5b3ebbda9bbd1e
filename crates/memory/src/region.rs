use crate::bus::MmioHandler;
use crate::phys::{DenseMemory, GuestMemoryError};
use bitflags::bitflags;
use core::fmt;
use thiserror::Error;

/// Size of a bit-band alias window. Each bit of the 1 MiB source window is exposed as one
/// 32-bit word of the alias.
pub const BITBAND_ALIAS_SIZE: u64 = 0x0200_0000;

bitflags! {
    /// Guest-visible access permissions of a region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl Access {
    pub const RX: Access = Access::READ.union(Access::EXEC);
    pub const RW: Access = Access::READ.union(Access::WRITE);
    pub const RWX: Access = Access::RW.union(Access::EXEC);
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |bit: Access, c: char| if self.contains(bit) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(Access::READ, 'r'),
            flag(Access::WRITE, 'w'),
            flag(Access::EXEC, 'x')
        )
    }
}

/// Errors creating a [`MemoryRegion`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("memory region {name:?} has zero size")]
    ZeroSize { name: String },
    #[error("memory region {name:?} cannot be allocated: {source}")]
    Allocation {
        name: String,
        #[source]
        source: GuestMemoryError,
    },
}

/// Region type tag, as reported by [`AddressSpace::regions`](crate::AddressSpace::regions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Ram,
    /// Read-only to the guest; writable through the loader path.
    Rom,
    Mmio,
    /// Bit-band alias of the 1 MiB window starting at `source_base`.
    BitBand { source_base: u64 },
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Ram => f.write_str("ram"),
            RegionKind::Rom => f.write_str("rom"),
            RegionKind::Mmio => f.write_str("i/o"),
            RegionKind::BitBand { source_base } => write!(f, "bitband@{source_base:#010x}"),
        }
    }
}

pub(crate) enum Backing {
    Memory(DenseMemory),
    Mmio(Box<dyn MmioHandler>),
    BitBand { source_base: u64 },
}

/// A named, sized, permission-tagged span of memory that can be mapped into an
/// [`AddressSpace`](crate::AddressSpace).
pub struct MemoryRegion {
    name: String,
    size: u64,
    kind: RegionKind,
    access: Access,
    pub(crate) backing: Backing,
}

impl MemoryRegion {
    /// Zero-initialised read/write memory.
    pub fn ram(name: impl Into<String>, size: u64) -> Result<Self, RegionError> {
        Self::with_memory(name.into(), size, RegionKind::Ram, Access::RWX)
    }

    /// Zero-initialised memory that discards guest writes.
    pub fn rom(name: impl Into<String>, size: u64) -> Result<Self, RegionError> {
        Self::with_memory(name.into(), size, RegionKind::Rom, Access::RX)
    }

    pub fn mmio(
        name: impl Into<String>,
        size: u64,
        handler: Box<dyn MmioHandler>,
    ) -> Result<Self, RegionError> {
        let name = name.into();
        if size == 0 {
            return Err(RegionError::ZeroSize { name });
        }
        Ok(Self {
            name,
            size,
            kind: RegionKind::Mmio,
            access: Access::RW,
            backing: Backing::Mmio(handler),
        })
    }

    /// A [`BITBAND_ALIAS_SIZE`] alias window whose words address single bits of the source
    /// window at `source_base`.
    pub fn bitband(name: impl Into<String>, source_base: u64) -> Self {
        Self {
            name: name.into(),
            size: BITBAND_ALIAS_SIZE,
            kind: RegionKind::BitBand { source_base },
            access: Access::RW,
            backing: Backing::BitBand { source_base },
        }
    }

    fn with_memory(
        name: String,
        size: u64,
        kind: RegionKind,
        access: Access,
    ) -> Result<Self, RegionError> {
        if size == 0 {
            return Err(RegionError::ZeroSize { name });
        }
        let mem = match DenseMemory::new(size) {
            Ok(mem) => mem,
            Err(source) => return Err(RegionError::Allocation { name, source }),
        };
        Ok(Self {
            name,
            size,
            kind,
            access,
            backing: Backing::Memory(mem),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn access(&self) -> Access {
        self.access
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("kind", &self.kind)
            .field("access", &self.access)
            .finish()
    }
}
