use crate::cpu::{ArmCpu, CpuType, UnknownCpuType};
use crate::nvic::{NvicState, ScsRegisters, NVIC_MAX_IRQ, SCS_BASE, SCS_SIZE};
use memory::{MapError, MemoryRegion, RegionError, SharedAddressSpace};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;

/// Bit-band alias windows: `(alias base, source base)`.
pub const BITBAND_WINDOWS: [(u64, u64); 2] = [
    (0x2200_0000, 0x2000_0000),
    (0x4200_0000, 0x4000_0000),
];

pub const DEFAULT_NUM_IRQ: u32 = 64;

#[derive(Debug, Error)]
pub enum RealizeError {
    #[error("device is already realized")]
    AlreadyRealized,
    #[error("memory property was not set")]
    MemoryNotSet,
    #[error("cpu-type property was not set")]
    CpuTypeNotSet,
    #[error(transparent)]
    UnknownCpuType(#[from] UnknownCpuType),
    #[error("num-irq {num_irq} exceeds the NVIC maximum of {max}")]
    TooManyIrqs { num_irq: u32, max: u32 },
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    Map(#[from] MapError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("property {0:?} cannot be changed on a realized device")]
pub struct PropertyFrozen(pub &'static str);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IrqError {
    #[error("interrupt controller is not realized")]
    NotRealized,
    #[error("IRQ line {line} out of range (num-irq is {num_irq})")]
    OutOfRange { line: u32, num_irq: u32 },
}

struct Realized {
    cpu: ArmCpu,
    nvic: Rc<RefCell<NvicState>>,
}

/// ARMv7-M container: one Cortex-M core, its NVIC and the SCS, plus optional bit-band aliases.
///
/// Properties are configured first; [`Armv7m::realize`] then creates the core and maps the
/// container's regions into the linked address space. Properties are frozen afterwards.
pub struct Armv7m {
    num_irq: u32,
    cpu_type: Option<String>,
    enable_bitband: bool,
    memory: Option<SharedAddressSpace>,
    realized: Option<Realized>,
}

impl Default for Armv7m {
    fn default() -> Self {
        Self::new()
    }
}

impl Armv7m {
    pub fn new() -> Self {
        Self {
            num_irq: DEFAULT_NUM_IRQ,
            cpu_type: None,
            enable_bitband: false,
            memory: None,
            realized: None,
        }
    }

    fn check_unrealized(&self, prop: &'static str) -> Result<(), PropertyFrozen> {
        if self.realized.is_some() {
            return Err(PropertyFrozen(prop));
        }
        Ok(())
    }

    pub fn set_num_irq(&mut self, num_irq: u32) -> Result<(), PropertyFrozen> {
        self.check_unrealized("num-irq")?;
        self.num_irq = num_irq;
        Ok(())
    }

    pub fn set_cpu_type(&mut self, cpu_type: impl Into<String>) -> Result<(), PropertyFrozen> {
        self.check_unrealized("cpu-type")?;
        self.cpu_type = Some(cpu_type.into());
        Ok(())
    }

    pub fn set_enable_bitband(&mut self, enable: bool) -> Result<(), PropertyFrozen> {
        self.check_unrealized("enable-bitband")?;
        self.enable_bitband = enable;
        Ok(())
    }

    pub fn set_memory(&mut self, memory: SharedAddressSpace) -> Result<(), PropertyFrozen> {
        self.check_unrealized("memory")?;
        self.memory = Some(memory);
        Ok(())
    }

    pub fn num_irq(&self) -> u32 {
        self.num_irq
    }

    pub fn cpu_type(&self) -> Option<&str> {
        self.cpu_type.as_deref()
    }

    pub fn enable_bitband(&self) -> bool {
        self.enable_bitband
    }

    pub fn memory(&self) -> Option<&SharedAddressSpace> {
        self.memory.as_ref()
    }

    pub fn is_realized(&self) -> bool {
        self.realized.is_some()
    }

    pub fn realize(&mut self) -> Result<(), RealizeError> {
        if self.realized.is_some() {
            return Err(RealizeError::AlreadyRealized);
        }
        let memory = self.memory.clone().ok_or(RealizeError::MemoryNotSet)?;
        let cpu_type: CpuType = self
            .cpu_type
            .as_deref()
            .ok_or(RealizeError::CpuTypeNotSet)?
            .parse()?;
        if self.num_irq > NVIC_MAX_IRQ {
            return Err(RealizeError::TooManyIrqs {
                num_irq: self.num_irq,
                max: NVIC_MAX_IRQ,
            });
        }

        let vtor = Rc::new(Cell::new(0));
        let nvic = Rc::new(RefCell::new(NvicState::new(self.num_irq)));
        let scs = ScsRegisters::new(nvic.clone(), vtor.clone(), cpu_type.cpuid());

        {
            let mut space = memory.borrow_mut();
            space.add_subregion(
                SCS_BASE,
                MemoryRegion::mmio("armv7m.scs", SCS_SIZE, Box::new(scs))?,
            )?;
            if self.enable_bitband {
                for (i, (alias, source)) in BITBAND_WINDOWS.into_iter().enumerate() {
                    space.add_subregion(
                        alias,
                        MemoryRegion::bitband(format!("armv7m.bitband{i}"), source),
                    )?;
                }
            }
        }

        tracing::info!(
            cpu = %cpu_type,
            num_irq = self.num_irq,
            bitband = self.enable_bitband,
            "armv7m realized"
        );
        self.realized = Some(Realized {
            cpu: ArmCpu::new(cpu_type, vtor),
            nvic,
        });
        Ok(())
    }

    pub fn cpu(&self) -> Option<&ArmCpu> {
        self.realized.as_ref().map(|r| &r.cpu)
    }

    pub fn cpu_mut(&mut self) -> Option<&mut ArmCpu> {
        self.realized.as_mut().map(|r| &mut r.cpu)
    }

    pub fn nvic(&self) -> Option<&Rc<RefCell<NvicState>>> {
        self.realized.as_ref().map(|r| &r.nvic)
    }

    /// Drives external interrupt line `line`.
    pub fn set_irq(&self, line: u32, level: bool) -> Result<(), IrqError> {
        let realized = self.realized.as_ref().ok_or(IrqError::NotRealized)?;
        let mut nvic = realized.nvic.borrow_mut();
        if line >= nvic.num_irq() {
            return Err(IrqError::OutOfRange {
                line,
                num_irq: nvic.num_irq(),
            });
        }
        nvic.set_level(line, level);
        Ok(())
    }

    pub fn irq_pending(&self, line: u32) -> bool {
        self.nvic().is_some_and(|n| n.borrow().is_pending(line))
    }
}
