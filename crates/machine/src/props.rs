//! Named-property surface of [`BoardConfig`], used by the configuration layer (`-M` overrides).

use crate::config::{BoardConfig, DEFAULT_FLASH_KB, DEFAULT_FREQ_MHZ, DEFAULT_NUM_IRQ};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub type_name: &'static str,
    pub default: i64,
}

pub const PROPERTIES: &[PropertyInfo] = &[
    PropertyInfo {
        name: "flash_kb",
        description: "Flash size in KB",
        type_name: "int",
        default: DEFAULT_FLASH_KB,
    },
    PropertyInfo {
        name: "freq_mhz",
        description: "MCU frequency in MHz",
        type_name: "int",
        default: DEFAULT_FREQ_MHZ,
    },
    PropertyInfo {
        name: "num_irq",
        description: "Number of IRQs",
        type_name: "int",
        default: DEFAULT_NUM_IRQ,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("property {0:?} not found")]
    Unknown(String),
    #[error("property {name}: invalid integer {value:?}")]
    InvalidValue { name: String, value: String },
}

pub fn describe(name: &str) -> Option<&'static PropertyInfo> {
    PROPERTIES.iter().find(|p| p.name == name)
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer, optionally negative.
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u64>().ok()?,
    };
    let magnitude = i64::try_from(magnitude).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

impl BoardConfig {
    fn slot(&mut self, name: &str) -> Result<&mut i64, PropertyError> {
        match name {
            "flash_kb" => Ok(&mut self.flash_size_kb),
            "freq_mhz" => Ok(&mut self.freq_mhz),
            "num_irq" => Ok(&mut self.num_irq),
            _ => Err(PropertyError::Unknown(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Result<i64, PropertyError> {
        match name {
            "flash_kb" => Ok(self.flash_size_kb),
            "freq_mhz" => Ok(self.freq_mhz),
            "num_irq" => Ok(self.num_irq),
            _ => Err(PropertyError::Unknown(name.to_string())),
        }
    }

    /// Overwrites a parameter. Range checks are left to [`BoardConfig::validate`].
    pub fn set(&mut self, name: &str, value: i64) -> Result<(), PropertyError> {
        *self.slot(name)? = value;
        Ok(())
    }

    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<(), PropertyError> {
        let slot = self.slot(name)?;
        *slot = parse_int(value).ok_or_else(|| PropertyError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }
}
