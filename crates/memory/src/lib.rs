//! Guest physical memory for the `virt_cortex_m` board.
//!
//! - [`DenseMemory`] is the byte store behind RAM and ROM regions.
//! - [`MemoryRegion`] is a named, permission-tagged span (RAM, ROM, MMIO or bit-band alias).
//! - [`AddressSpace`] maps regions at fixed physical addresses and routes guest accesses.
#![forbid(unsafe_code)]

mod address_space;
pub mod bus;
mod phys;
mod region;

pub use address_space::{
    AddressSpace, MapError, RegionInfo, SharedAddressSpace, TransactionFailurePolicy,
    PHYS_ADDR_SPACE_SIZE,
};
pub use bus::{MemoryBus, MmioHandler};
pub use phys::{DenseMemory, GuestMemory, GuestMemoryError, GuestMemoryResult};
pub use region::{Access, MemoryRegion, RegionError, RegionKind, BITBAND_ALIAS_SIZE};

use thiserror::Error;

/// Errors surfaced by guest accesses on an [`AddressSpace`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("unassigned {} of {len} bytes at {addr:#010x}", access_kind(.write))]
    Unmapped { addr: u64, len: usize, write: bool },
    #[error("cannot load data into region {region:?} at {addr:#010x}")]
    NotLoadable { addr: u64, region: String },
    #[error("bit-band alias at {addr:#010x} targets another alias")]
    AliasLoop { addr: u64 },
    #[error(transparent)]
    Backing(#[from] GuestMemoryError),
}

pub type BusResult<T> = Result<T, BusError>;

fn access_kind(write: &bool) -> &'static str {
    if *write {
        "write"
    } else {
        "read"
    }
}
