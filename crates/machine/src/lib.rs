//! `virt_cortex_m`: a minimal virtual ARM Cortex-M board.
//!
//! The board has boot flash at address 0, SRAM at `0x2000_0000` and an ARMv7-M container
//! (Cortex-M core, NVIC, bit-band aliases). [`VirtCortexM`] holds the three board parameters;
//! [`VirtCortexM::assemble`] consumes it and returns a reset, ready-to-run [`Machine`].
//!
//! ```no_run
//! use machine::{SystemRequest, VirtCortexM};
//!
//! let mut board = VirtCortexM::new();
//! board.set_flash_kb(256);
//! let machine = board
//!     .assemble(&SystemRequest::new(64 * 1024).with_kernel("firmware.elf"))
//!     .unwrap();
//! assert_eq!(machine.time_base().ns_per_cycle(), 20);
//! ```
#![forbid(unsafe_code)]

mod board;
mod boot;
mod config;
pub mod layout;
mod machine_type;
mod props;
mod time_base;

pub use board::{Machine, SystemRequest, VirtCortexM};
pub use boot::{Armv7mBootLoader, BootLoader};
pub use config::{
    BoardConfig, ConfigError, DEFAULT_FLASH_KB, DEFAULT_FREQ_MHZ, DEFAULT_NUM_IRQ, MAX_FREQ_MHZ,
};
pub use layout::{LayoutEntry, LayoutKind, MemoryLayout};
pub use machine_type::{MachineClass, MachineInit, MachineRegistry, RegistryError};
pub use props::{describe, parse_int, PropertyError, PropertyInfo, PROPERTIES};
pub use time_base::{time_base_for_mhz, TimeBase, NS_PER_SEC};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid board configuration")]
    Config(#[from] ConfigError),
    #[error("failed to allocate board memory")]
    Memory(#[from] memory::RegionError),
    #[error("failed to map board memory")]
    Map(#[from] memory::MapError),
    #[error(transparent)]
    Property(#[from] armv7m::PropertyFrozen),
    #[error("failed to realize the ARMv7-M container")]
    Realize(#[from] armv7m::RealizeError),
    #[error("ARMv7-M container realized without a CPU")]
    NoCpu,
    #[error("failed to boot")]
    Boot(#[from] armv7m::BootError),
}
