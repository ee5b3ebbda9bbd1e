//! Cortex-M CPU variants and the architectural reset sequence.
//!
//! Instruction execution is out of scope; [`ArmCpu`] carries just enough state for the board to
//! reset the core from its vector table and hand a ready-to-run register file to an execution
//! engine.

use core::fmt;
use core::str::FromStr;
use memory::{BusResult, MemoryBus};
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

/// Suffix of full CPU type names (`cortex-m3-arm-cpu`).
pub const CPU_TYPE_SUFFIX: &str = "-arm-cpu";

/// xPSR Thumb state bit.
pub const XPSR_T: u32 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchProfile {
    V6M,
    V7M,
    V7EM,
    V8M,
}

impl fmt::Display for ArchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArchProfile::V6M => "armv6-m",
            ArchProfile::V7M => "armv7-m",
            ArchProfile::V7EM => "armv7e-m",
            ArchProfile::V8M => "armv8-m",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuType {
    CortexM0,
    CortexM3,
    CortexM4,
    CortexM7,
    CortexM33,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown Cortex-M CPU type {0:?}")]
pub struct UnknownCpuType(pub String);

impl CpuType {
    pub const ALL: [CpuType; 5] = [
        CpuType::CortexM0,
        CpuType::CortexM3,
        CpuType::CortexM4,
        CpuType::CortexM7,
        CpuType::CortexM33,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CpuType::CortexM0 => "cortex-m0",
            CpuType::CortexM3 => "cortex-m3",
            CpuType::CortexM4 => "cortex-m4",
            CpuType::CortexM7 => "cortex-m7",
            CpuType::CortexM33 => "cortex-m33",
        }
    }

    /// Full type name, e.g. `cortex-m3-arm-cpu`.
    pub fn type_name(self) -> String {
        format!("{}{CPU_TYPE_SUFFIX}", self.name())
    }

    pub fn profile(self) -> ArchProfile {
        match self {
            CpuType::CortexM0 => ArchProfile::V6M,
            CpuType::CortexM3 => ArchProfile::V7M,
            CpuType::CortexM4 | CpuType::CortexM7 => ArchProfile::V7EM,
            CpuType::CortexM33 => ArchProfile::V8M,
        }
    }

    /// Reset value of the SCB CPUID register.
    pub fn cpuid(self) -> u32 {
        match self {
            CpuType::CortexM0 => 0x410C_C200,
            CpuType::CortexM3 => 0x410F_C231,
            CpuType::CortexM4 => 0x410F_C240,
            CpuType::CortexM7 => 0x411F_C272,
            CpuType::CortexM33 => 0x410F_D213,
        }
    }
}

impl FromStr for CpuType {
    type Err = UnknownCpuType;

    /// Accepts both the short name (`cortex-m4`) and the type name (`cortex-m4-arm-cpu`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.strip_suffix(CPU_TYPE_SUFFIX).unwrap_or(s);
        CpuType::ALL
            .into_iter()
            .find(|t| t.name() == short)
            .ok_or_else(|| UnknownCpuType(s.to_string()))
    }
}

impl fmt::Display for CpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CPU clock: frequency and the number of nanoseconds one cycle takes.
///
/// Handed to the CPU at board assembly; the timing model reads it from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    freq_hz: u64,
    ns_per_cycle: u64,
}

impl TimeBase {
    pub const fn new(freq_hz: u64, ns_per_cycle: u64) -> Self {
        Self {
            freq_hz,
            ns_per_cycle,
        }
    }

    pub const fn freq_hz(&self) -> u64 {
        self.freq_hz
    }

    pub const fn ns_per_cycle(&self) -> u64 {
        self.ns_per_cycle
    }

    pub fn cycles_to_ns(&self, cycles: u64) -> u64 {
        cycles.saturating_mul(self.ns_per_cycle)
    }
}

/// Register file of a Cortex-M core.
#[derive(Debug, Clone)]
pub struct ArmCpu {
    cpu_type: CpuType,
    /// r0-r12, sp (r13, MSP after reset), lr (r14), pc (r15).
    pub regs: [u32; 16],
    pub xpsr: u32,
    vtor: Rc<Cell<u32>>,
    time_base: Option<TimeBase>,
}

impl ArmCpu {
    pub const SP: usize = 13;
    pub const LR: usize = 14;
    pub const PC: usize = 15;

    pub fn new(cpu_type: CpuType, vtor: Rc<Cell<u32>>) -> Self {
        Self {
            cpu_type,
            regs: [0; 16],
            xpsr: 0,
            vtor,
            time_base: None,
        }
    }

    pub fn cpu_type(&self) -> CpuType {
        self.cpu_type
    }

    pub fn vtor(&self) -> u32 {
        self.vtor.get()
    }

    pub fn time_base(&self) -> Option<TimeBase> {
        self.time_base
    }

    pub fn set_time_base(&mut self, time_base: TimeBase) {
        self.time_base = Some(time_base);
    }

    pub fn sp(&self) -> u32 {
        self.regs[Self::SP]
    }

    pub fn pc(&self) -> u32 {
        self.regs[Self::PC]
    }

    pub fn thumb(&self) -> bool {
        self.xpsr & XPSR_T != 0
    }

    /// Architectural reset: VTOR goes back to 0, MSP and PC are fetched from the vector table.
    pub fn reset(&mut self, mem: &mut dyn MemoryBus) -> BusResult<()> {
        self.regs = [0; 16];
        self.xpsr = 0;
        self.vtor.set(0);

        let vtor = u64::from(self.vtor.get());
        let initial_msp = mem.read_u32(vtor)?;
        let initial_pc = mem.read_u32(vtor + 4)?;

        self.regs[Self::SP] = initial_msp & !3;
        self.regs[Self::LR] = 0xFFFF_FFFF;
        self.regs[Self::PC] = initial_pc & !1;
        if initial_pc & 1 != 0 {
            self.xpsr |= XPSR_T;
        }

        tracing::debug!(
            cpu = %self.cpu_type,
            msp = format_args!("{:#010x}", self.sp()),
            pc = format_args!("{:#010x}", self.pc()),
            "cpu reset"
        );
        Ok(())
    }
}
