//! Declarative memory map of the board.

use crate::config::ConfigError;
use armv7m::{BITBAND_WINDOWS, SCS_BASE, SCS_SIZE};
use memory::{Access, BITBAND_ALIAS_SIZE, PHYS_ADDR_SPACE_SIZE};

pub const FLASH_BASE: u64 = 0;
pub const SRAM_BASE: u64 = 0x2000_0000;

pub const FLASH_REGION: &str = "virt_cortex_m.flash";
pub const SRAM_REGION: &str = "virt_cortex_m.sram";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Flash,
    Sram,
    /// Mapped by the ARMv7-M container when it is realized.
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: &'static str,
    pub base: u64,
    pub size: u64,
    pub access: Access,
    pub kind: LayoutKind,
}

impl LayoutEntry {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

/// Board memory map, sorted by base address and free of overlaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    flash: LayoutEntry,
    sram: LayoutEntry,
    entries: Vec<LayoutEntry>,
}

impl MemoryLayout {
    pub fn new(flash_size: u64, ram_size: u64) -> Result<Self, ConfigError> {
        if ram_size == 0 {
            return Err(ConfigError::ZeroRam);
        }

        let reserved = |name, base, size| LayoutEntry {
            name,
            base,
            size,
            access: Access::RW,
            kind: LayoutKind::Reserved,
        };
        let flash = LayoutEntry {
            name: FLASH_REGION,
            base: FLASH_BASE,
            size: flash_size,
            access: Access::RX,
            kind: LayoutKind::Flash,
        };
        let sram = LayoutEntry {
            name: SRAM_REGION,
            base: SRAM_BASE,
            size: ram_size,
            access: Access::RWX,
            kind: LayoutKind::Sram,
        };
        let mut entries = vec![
            flash,
            sram,
            reserved("armv7m.bitband0", BITBAND_WINDOWS[0].0, BITBAND_ALIAS_SIZE),
            reserved("armv7m.bitband1", BITBAND_WINDOWS[1].0, BITBAND_ALIAS_SIZE),
            reserved("armv7m.scs", SCS_BASE, SCS_SIZE),
        ];
        entries.sort_by_key(|e| e.base);

        for entry in &entries {
            if entry.size == 0 {
                return Err(ConfigError::EmptyRegion { name: entry.name });
            }
            if entry.end() > PHYS_ADDR_SPACE_SIZE {
                return Err(ConfigError::OutOfRange {
                    name: entry.name,
                    base: entry.base,
                    end: entry.end(),
                });
            }
        }
        for pair in entries.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if lo.end() > hi.base {
                return Err(ConfigError::Overlap {
                    name: lo.name,
                    base: lo.base,
                    end: lo.end(),
                    other: hi.name,
                    other_base: hi.base,
                    other_end: hi.end(),
                });
            }
        }

        Ok(Self {
            flash,
            sram,
            entries,
        })
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn flash(&self) -> &LayoutEntry {
        &self.flash
    }

    pub fn sram(&self) -> &LayoutEntry {
        &self.sram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_layout_is_sorted() {
        let layout = MemoryLayout::new(1024 * 1024, 16 * 1024 * 1024).unwrap();
        let bases: Vec<_> = layout.entries().iter().map(|e| (e.name, e.base)).collect();
        assert_eq!(
            bases,
            vec![
                (FLASH_REGION, 0),
                (SRAM_REGION, 0x2000_0000),
                ("armv7m.bitband0", 0x2200_0000),
                ("armv7m.bitband1", 0x4200_0000),
                ("armv7m.scs", 0xE000_E000),
            ]
        );
        assert_eq!(layout.flash().access, Access::RX);
        assert_eq!(layout.sram().size, 16 * 1024 * 1024);
    }

    #[test]
    fn flash_reaching_sram_is_rejected() {
        // Exactly up to the SRAM base is fine.
        MemoryLayout::new(SRAM_BASE, 0x1000).unwrap();

        let err = MemoryLayout::new(SRAM_BASE + 1024, 0x1000).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Overlap {
                name: FLASH_REGION,
                base: 0,
                end: SRAM_BASE + 1024,
                other: SRAM_REGION,
                other_base: SRAM_BASE,
                other_end: SRAM_BASE + 0x1000,
            }
        );
    }

    #[test]
    fn sram_reaching_bitband_window_is_rejected() {
        MemoryLayout::new(0x1000, 0x0200_0000).unwrap();
        assert!(matches!(
            MemoryLayout::new(0x1000, 0x0200_0001),
            Err(ConfigError::Overlap {
                name: SRAM_REGION,
                other: "armv7m.bitband0",
                ..
            })
        ));
    }

    #[test]
    fn empty_regions_are_rejected() {
        assert_eq!(MemoryLayout::new(0x1000, 0), Err(ConfigError::ZeroRam));
        assert_eq!(
            MemoryLayout::new(0, 0x1000),
            Err(ConfigError::EmptyRegion { name: FLASH_REGION })
        );
    }
}
