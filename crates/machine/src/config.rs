use armv7m::NVIC_MAX_IRQ;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_FLASH_KB: i64 = 1024;
pub const DEFAULT_FREQ_MHZ: i64 = 50;
pub const DEFAULT_NUM_IRQ: i64 = 64;

/// Highest frequency for which one cycle still lasts at least a nanosecond.
pub const MAX_FREQ_MHZ: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("flash_kb must be positive (got {0})")]
    FlashSize(i64),
    #[error("flash_kb {0} is too large")]
    FlashTooLarge(i64),
    #[error("freq_mhz must be in 1..={MAX_FREQ_MHZ} (got {0})")]
    Frequency(i64),
    #[error("num_irq must be in 0..={max} (got {value})")]
    IrqCount { value: i64, max: u32 },
    #[error("RAM size must be non-zero")]
    ZeroRam,
    #[error("region {name} is empty")]
    EmptyRegion { name: &'static str },
    #[error("region {name} [{base:#010x}, {end:#x}) lies outside the 32-bit address space")]
    OutOfRange {
        name: &'static str,
        base: u64,
        end: u64,
    },
    #[error(
        "region {name} [{base:#010x}, {end:#010x}) overlaps {other} [{other_base:#010x}, {other_end:#010x})"
    )]
    Overlap {
        name: &'static str,
        base: u64,
        end: u64,
        other: &'static str,
        other_base: u64,
        other_end: u64,
    },
}

/// Board parameters of `virt_cortex_m`.
///
/// Values are stored unchecked; [`BoardConfig::validate`] runs before assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardConfig {
    #[serde(rename = "flash_kb")]
    pub flash_size_kb: i64,
    pub freq_mhz: i64,
    pub num_irq: i64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            flash_size_kb: DEFAULT_FLASH_KB,
            freq_mhz: DEFAULT_FREQ_MHZ,
            num_irq: DEFAULT_NUM_IRQ,
        }
    }
}

impl BoardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.flash_size_bytes()?;
        if !(1..=MAX_FREQ_MHZ).contains(&self.freq_mhz) {
            return Err(ConfigError::Frequency(self.freq_mhz));
        }
        self.irq_count()?;
        Ok(())
    }

    pub fn flash_size_bytes(&self) -> Result<u64, ConfigError> {
        if self.flash_size_kb <= 0 {
            return Err(ConfigError::FlashSize(self.flash_size_kb));
        }
        self.flash_size_kb
            .checked_mul(1024)
            .and_then(|bytes| u64::try_from(bytes).ok())
            .ok_or(ConfigError::FlashTooLarge(self.flash_size_kb))
    }

    pub fn irq_count(&self) -> Result<u32, ConfigError> {
        u32::try_from(self.num_irq)
            .ok()
            .filter(|&n| n <= NVIC_MAX_IRQ)
            .ok_or(ConfigError::IrqCount {
                value: self.num_irq,
                max: NVIC_MAX_IRQ,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        let config = BoardConfig::default();
        assert_eq!(config.flash_size_kb, 1024);
        assert_eq!(config.freq_mhz, 50);
        assert_eq!(config.num_irq, 64);
        config.validate().unwrap();
        assert_eq!(config.flash_size_bytes().unwrap(), 1024 * 1024);
    }

    #[test]
    fn json_uses_property_names_and_fills_defaults() {
        let config: BoardConfig = serde_json::from_str(r#"{"flash_kb": 256}"#).unwrap();
        assert_eq!(
            config,
            BoardConfig {
                flash_size_kb: 256,
                ..BoardConfig::default()
            }
        );

        let err = serde_json::from_str::<BoardConfig>(r#"{"flash_size": 256}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{err}");

        let json = serde_json::to_value(BoardConfig::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"flash_kb": 1024, "freq_mhz": 50, "num_irq": 64})
        );
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let check = |config: BoardConfig| config.validate().unwrap_err();
        let base = BoardConfig::default();

        assert_eq!(
            check(BoardConfig { flash_size_kb: 0, ..base }),
            ConfigError::FlashSize(0)
        );
        assert_eq!(
            check(BoardConfig { flash_size_kb: i64::MAX, ..base }),
            ConfigError::FlashTooLarge(i64::MAX)
        );
        assert_eq!(
            check(BoardConfig { freq_mhz: 0, ..base }),
            ConfigError::Frequency(0)
        );
        assert_eq!(
            check(BoardConfig { freq_mhz: 1001, ..base }),
            ConfigError::Frequency(1001)
        );
        assert_eq!(
            check(BoardConfig { num_irq: -1, ..base }),
            ConfigError::IrqCount { value: -1, max: 496 }
        );
        assert_eq!(
            check(BoardConfig { num_irq: 497, ..base }),
            ConfigError::IrqCount { value: 497, max: 496 }
        );

        BoardConfig { num_irq: 0, freq_mhz: 1000, ..base }
            .validate()
            .unwrap();
        BoardConfig { num_irq: 496, ..base }.validate().unwrap();
    }
}
