use crate::boot::{Armv7mBootLoader, BootLoader};
use crate::config::{BoardConfig, ConfigError};
use crate::layout::{LayoutEntry, MemoryLayout};
use crate::machine_type::MachineClass;
use crate::props::PropertyError;
use crate::time_base::{time_base_for_mhz, TimeBase};
use crate::MachineError;
use armv7m::{ArmCpu, Armv7m, BootInfo, IrqError, NvicState};
use memory::{
    AddressSpace, BusError, MemoryBus, MemoryRegion, SharedAddressSpace, TransactionFailurePolicy,
};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

/// Machine-level inputs supplied by the caller rather than the board properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRequest {
    pub ram_size_bytes: u64,
    /// `None` selects the machine type's default CPU.
    pub cpu_type: Option<String>,
    pub kernel_filename: Option<PathBuf>,
}

impl SystemRequest {
    pub fn new(ram_size_bytes: u64) -> Self {
        Self {
            ram_size_bytes,
            cpu_type: None,
            kernel_filename: None,
        }
    }

    pub fn with_cpu_type(mut self, cpu_type: impl Into<String>) -> Self {
        self.cpu_type = Some(cpu_type.into());
        self
    }

    pub fn with_kernel(mut self, path: impl Into<PathBuf>) -> Self {
        self.kernel_filename = Some(path.into());
        self
    }
}

/// An unassembled `virt_cortex_m` board. Parameters can be changed until [`VirtCortexM::assemble`]
/// consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtCortexM {
    config: BoardConfig,
}

impl VirtCortexM {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: BoardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn flash_kb(&self) -> i64 {
        self.config.flash_size_kb
    }

    pub fn set_flash_kb(&mut self, value: i64) {
        self.config.flash_size_kb = value;
    }

    pub fn freq_mhz(&self) -> i64 {
        self.config.freq_mhz
    }

    pub fn set_freq_mhz(&mut self, value: i64) {
        self.config.freq_mhz = value;
    }

    pub fn num_irq(&self) -> i64 {
        self.config.num_irq
    }

    pub fn set_num_irq(&mut self, value: i64) {
        self.config.num_irq = value;
    }

    pub fn property(&self, name: &str) -> Result<i64, PropertyError> {
        self.config.get(name)
    }

    pub fn set_property(&mut self, name: &str, value: i64) -> Result<(), PropertyError> {
        self.config.set(name, value)
    }

    pub fn set_property_str(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        self.config.set_from_str(name, value)
    }

    pub fn assemble(self, request: &SystemRequest) -> Result<Machine, MachineError> {
        self.assemble_with(request, &mut Armv7mBootLoader)
    }

    /// Builds the board: flash and SRAM, the ARMv7-M container, the CPU clock, then the boot
    /// loader. Any failure aborts assembly; later steps do not run.
    pub fn assemble_with(
        self,
        request: &SystemRequest,
        loader: &mut dyn BootLoader,
    ) -> Result<Machine, MachineError> {
        let class = MachineClass::VIRT_CORTEX_M;
        let config = self.config;

        config.validate().inspect_err(warn_config)?;
        let flash_size = config.flash_size_bytes()?;
        let num_irq = config.irq_count()?;
        let layout =
            MemoryLayout::new(flash_size, request.ram_size_bytes).inspect_err(warn_config)?;
        let (flash, sram) = (*layout.flash(), *layout.sram());

        tracing::info!(
            flash_kb = config.flash_size_kb,
            ram = request.ram_size_bytes,
            freq_mhz = config.freq_mhz,
            num_irq,
            "assembling {}",
            class.name
        );

        let mut space = AddressSpace::new("system");
        if class.ignore_memory_transaction_failures {
            space.set_policy(TransactionFailurePolicy::Ignore);
        }
        map_entry(&mut space, &flash, MemoryRegion::rom(flash.name, flash.size)?)?;
        map_entry(&mut space, &sram, MemoryRegion::ram(sram.name, sram.size)?)?;
        let memory = space.into_shared();

        let cpu_type = request
            .cpu_type
            .clone()
            .unwrap_or_else(|| class.default_cpu_type.to_string());
        let mut armv7m = Armv7m::new();
        armv7m.set_num_irq(num_irq)?;
        armv7m.set_cpu_type(cpu_type)?;
        armv7m.set_enable_bitband(true)?;
        armv7m.set_memory(memory.clone())?;
        armv7m.realize().inspect_err(|err| {
            tracing::warn!(%err, "ARMv7-M container failed to realize");
        })?;

        let time_base = time_base_for_mhz(config.freq_mhz)?;
        let cpu = armv7m.cpu_mut().ok_or(MachineError::NoCpu)?;
        cpu.set_time_base(time_base);
        tracing::debug!(
            ns_per_cycle = time_base.ns_per_cycle(),
            "installed CPU time base"
        );

        let boot_info = loader
            .load(
                cpu,
                &mut memory.borrow_mut(),
                request.kernel_filename.as_deref(),
                flash_size,
            )
            .inspect_err(|err| tracing::warn!(%err, "boot loader failed"))?;

        Ok(Machine {
            class,
            config,
            layout,
            memory,
            armv7m,
            time_base,
            boot_info,
        })
    }
}

fn warn_config(err: &ConfigError) {
    tracing::warn!(%err, "invalid board configuration");
}

fn map_entry(
    space: &mut AddressSpace,
    entry: &LayoutEntry,
    region: MemoryRegion,
) -> Result<(), MachineError> {
    space.add_subregion(entry.base, region)?;
    tracing::debug!(
        name = entry.name,
        base = format_args!("{:#010x}", entry.base),
        size = format_args!("{:#x}", entry.size),
        "mapped board region"
    );
    Ok(())
}

/// An assembled board, ready for an execution engine.
pub struct Machine {
    class: MachineClass,
    config: BoardConfig,
    layout: MemoryLayout,
    memory: SharedAddressSpace,
    armv7m: Armv7m,
    time_base: TimeBase,
    boot_info: BootInfo,
}

impl Machine {
    pub fn class(&self) -> &MachineClass {
        &self.class
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    pub fn memory(&self) -> &SharedAddressSpace {
        &self.memory
    }

    pub fn armv7m(&self) -> &Armv7m {
        &self.armv7m
    }

    /// Always present: assembly fails unless the container realized its core.
    pub fn cpu(&self) -> Option<&ArmCpu> {
        self.armv7m.cpu()
    }

    pub fn nvic(&self) -> Option<&Rc<RefCell<NvicState>>> {
        self.armv7m.nvic()
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub fn boot_info(&self) -> &BootInfo {
        &self.boot_info
    }

    pub fn set_irq(&self, line: u32, level: bool) -> Result<(), IrqError> {
        self.armv7m.set_irq(line, level)
    }

    pub fn read_physical_bytes(&self, paddr: u64, len: usize) -> Result<Vec<u8>, BusError> {
        let mut buf = vec![0u8; len];
        self.memory.borrow_mut().read_physical(paddr, &mut buf)?;
        Ok(buf)
    }

    pub fn read_physical_u32(&self, paddr: u64) -> Result<u32, BusError> {
        self.memory.borrow_mut().read_u32(paddr)
    }
}
