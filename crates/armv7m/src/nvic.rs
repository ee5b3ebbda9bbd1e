//! Nested vectored interrupt controller and the System Control Space register window.

use memory::MmioHandler;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Maximum number of external interrupt lines (512 exception vectors minus the 16 internal ones).
pub const NVIC_MAX_IRQ: u32 = 496;

pub const SCS_BASE: u64 = 0xE000_E000;
pub const SCS_SIZE: u64 = 0x1000;

const ICTR: u64 = 0x004;
const ISER: u64 = 0x100;
const ICER: u64 = 0x180;
const ISPR: u64 = 0x200;
const ICPR: u64 = 0x280;
const CPUID: u64 = 0xD00;
const VTOR: u64 = 0xD08;

const BANK_WORDS: u64 = 16;
const VTOR_MASK: u32 = 0xFFFF_FF80;

/// Enable and pending latches for the external interrupt lines.
#[derive(Debug)]
pub struct NvicState {
    num_irq: u32,
    enabled: Vec<u32>,
    pending: Vec<u32>,
    levels: Vec<u32>,
}

impl NvicState {
    pub fn new(num_irq: u32) -> Self {
        let words = num_irq.div_ceil(32) as usize;
        Self {
            num_irq,
            enabled: vec![0; words],
            pending: vec![0; words],
            levels: vec![0; words],
        }
    }

    pub fn num_irq(&self) -> u32 {
        self.num_irq
    }

    /// Drives input line `irq`. A rising level latches the line pending.
    pub fn set_level(&mut self, irq: u32, level: bool) {
        if irq >= self.num_irq {
            return;
        }
        let (word, mask) = split(irq);
        if level {
            if self.levels[word] & mask == 0 {
                self.pending[word] |= mask;
            }
            self.levels[word] |= mask;
        } else {
            self.levels[word] &= !mask;
        }
    }

    pub fn is_pending(&self, irq: u32) -> bool {
        irq < self.num_irq && {
            let (word, mask) = split(irq);
            self.pending[word] & mask != 0
        }
    }

    pub fn is_enabled(&self, irq: u32) -> bool {
        irq < self.num_irq && {
            let (word, mask) = split(irq);
            self.enabled[word] & mask != 0
        }
    }

    /// Lowest-numbered line that is both enabled and pending.
    pub fn highest_pending(&self) -> Option<u32> {
        self.enabled
            .iter()
            .zip(&self.pending)
            .enumerate()
            .find_map(|(word, (en, pend))| {
                let active = en & pend;
                (active != 0).then(|| word as u32 * 32 + active.trailing_zeros())
            })
            .filter(|&irq| irq < self.num_irq)
    }

    /// INTLINESNUM: number of implemented 32-line groups, minus one.
    fn ictr(&self) -> u32 {
        self.num_irq.div_ceil(32).saturating_sub(1)
    }

    fn valid_mask(&self, word: usize) -> u32 {
        let first = word as u32 * 32;
        match self.num_irq.saturating_sub(first) {
            0 => 0,
            n if n >= 32 => u32::MAX,
            n => (1u32 << n) - 1,
        }
    }

    fn bank_read(bank: &[u32], word: usize) -> u32 {
        bank.get(word).copied().unwrap_or(0)
    }
}

fn split(irq: u32) -> (usize, u32) {
    ((irq / 32) as usize, 1 << (irq % 32))
}

/// MMIO view of the SCS: ICTR, the NVIC enable/pending banks, CPUID and VTOR.
///
/// Unimplemented registers read as zero and ignore writes.
pub struct ScsRegisters {
    nvic: Rc<RefCell<NvicState>>,
    vtor: Rc<Cell<u32>>,
    cpuid: u32,
}

impl ScsRegisters {
    pub fn new(nvic: Rc<RefCell<NvicState>>, vtor: Rc<Cell<u32>>, cpuid: u32) -> Self {
        Self { nvic, vtor, cpuid }
    }

    fn read_word(&self, offset: u64) -> u32 {
        let nvic = self.nvic.borrow();
        match offset {
            ICTR => nvic.ictr(),
            CPUID => self.cpuid,
            VTOR => self.vtor.get(),
            o if (ISER..ISER + BANK_WORDS * 4).contains(&o) => {
                NvicState::bank_read(&nvic.enabled, ((o - ISER) / 4) as usize)
            }
            o if (ICER..ICER + BANK_WORDS * 4).contains(&o) => {
                NvicState::bank_read(&nvic.enabled, ((o - ICER) / 4) as usize)
            }
            o if (ISPR..ISPR + BANK_WORDS * 4).contains(&o) => {
                NvicState::bank_read(&nvic.pending, ((o - ISPR) / 4) as usize)
            }
            o if (ICPR..ICPR + BANK_WORDS * 4).contains(&o) => {
                NvicState::bank_read(&nvic.pending, ((o - ICPR) / 4) as usize)
            }
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u64, value: u32) {
        let mut nvic = self.nvic.borrow_mut();
        let bank = |base: u64| ((offset - base) / 4) as usize;
        match offset {
            VTOR => self.vtor.set(value & VTOR_MASK),
            o if (ISER..ISER + BANK_WORDS * 4).contains(&o) => {
                let word = bank(ISER);
                let mask = nvic.valid_mask(word);
                if let Some(w) = nvic.enabled.get_mut(word) {
                    *w |= value & mask;
                }
            }
            o if (ICER..ICER + BANK_WORDS * 4).contains(&o) => {
                if let Some(w) = nvic.enabled.get_mut(bank(ICER)) {
                    *w &= !value;
                }
            }
            o if (ISPR..ISPR + BANK_WORDS * 4).contains(&o) => {
                let word = bank(ISPR);
                let mask = nvic.valid_mask(word);
                if let Some(w) = nvic.pending.get_mut(word) {
                    *w |= value & mask;
                }
            }
            o if (ICPR..ICPR + BANK_WORDS * 4).contains(&o) => {
                if let Some(w) = nvic.pending.get_mut(bank(ICPR)) {
                    *w &= !value;
                }
            }
            _ => tracing::trace!(offset = format_args!("{offset:#x}"), "SCS write ignored"),
        }
    }
}

impl MmioHandler for ScsRegisters {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        let word = self.read_word(offset & !3);
        let shift = (offset & 3) * 8;
        let mask = match size {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => u64::from(u32::MAX),
        };
        (u64::from(word) >> shift) & mask
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        // Sub-word stores to the NVIC banks are unpredictable; only word stores take effect.
        if size != 4 || offset & 3 != 0 {
            tracing::trace!(
                offset = format_args!("{offset:#x}"),
                size,
                "SCS sub-word write ignored"
            );
            return;
        }
        self.write_word(offset, value as u32);
    }
}
