//! ARMv7-M system: Cortex-M core, NVIC, System Control Space and bit-band aliases.
#![forbid(unsafe_code)]

pub mod boot;
mod container;
pub mod cpu;
pub mod nvic;

pub use boot::{load_kernel, BootError, BootInfo, ImageFormat, LoadedImage};
pub use container::{
    Armv7m, IrqError, PropertyFrozen, RealizeError, BITBAND_WINDOWS, DEFAULT_NUM_IRQ,
};
pub use cpu::{ArchProfile, ArmCpu, CpuType, TimeBase, UnknownCpuType, CPU_TYPE_SUFFIX};
pub use nvic::{NvicState, NVIC_MAX_IRQ, SCS_BASE, SCS_SIZE};
