use armv7m::{ArmCpu, BootError, BootInfo};
use memory::AddressSpace;
use std::path::Path;

/// Final assembly step: place the firmware image and reset the CPU.
pub trait BootLoader {
    fn load(
        &mut self,
        cpu: &mut ArmCpu,
        mem: &mut AddressSpace,
        kernel: Option<&Path>,
        mem_size: u64,
    ) -> Result<BootInfo, BootError>;
}

/// ELF-or-raw loader from [`armv7m::boot`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Armv7mBootLoader;

impl BootLoader for Armv7mBootLoader {
    fn load(
        &mut self,
        cpu: &mut ArmCpu,
        mem: &mut AddressSpace,
        kernel: Option<&Path>,
        mem_size: u64,
    ) -> Result<BootInfo, BootError> {
        armv7m::load_kernel(cpu, mem, kernel, mem_size)
    }
}
