use crate::board::{Machine, SystemRequest, VirtCortexM};
use crate::config::BoardConfig;
use crate::props::{PropertyInfo, PROPERTIES};
use crate::MachineError;
use core::fmt;
use thiserror::Error;

pub type MachineInit = fn(BoardConfig, &SystemRequest) -> Result<Machine, MachineError>;

/// Registration surface of a board type.
#[derive(Clone, Copy)]
pub struct MachineClass {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub desc: &'static str,
    pub default_cpu_type: &'static str,
    /// Unassigned accesses read as zero and drop writes instead of faulting.
    pub ignore_memory_transaction_failures: bool,
    pub default_ram_size: u64,
    pub properties: &'static [PropertyInfo],
    pub init: MachineInit,
}

impl fmt::Debug for MachineClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineClass")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("desc", &self.desc)
            .field("default_cpu_type", &self.default_cpu_type)
            .field(
                "ignore_memory_transaction_failures",
                &self.ignore_memory_transaction_failures,
            )
            .field("default_ram_size", &self.default_ram_size)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

fn init_virt_cortex_m(
    config: BoardConfig,
    request: &SystemRequest,
) -> Result<Machine, MachineError> {
    VirtCortexM::from_config(config).assemble(request)
}

impl MachineClass {
    pub const VIRT_CORTEX_M: MachineClass = MachineClass {
        name: "virt_cortex_m-machine",
        alias: Some("virt_cortex_m"),
        desc: "Virtual ARM Cortex-M",
        default_cpu_type: "cortex-m3-arm-cpu",
        ignore_memory_transaction_failures: true,
        default_ram_size: 16 * 1024 * 1024,
        properties: PROPERTIES,
        init: init_virt_cortex_m,
    };

    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.alias == Some(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("machine type {0:?} is already registered")]
    Duplicate(&'static str),
    #[error("unknown machine type {0:?}")]
    Unknown(String),
}

#[derive(Debug, Default)]
pub struct MachineRegistry {
    classes: Vec<MachineClass>,
}

impl MachineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every board this crate provides.
    pub fn builtin() -> Self {
        Self {
            classes: vec![MachineClass::VIRT_CORTEX_M],
        }
    }

    pub fn register(&mut self, class: MachineClass) -> Result<(), RegistryError> {
        let clash = self.classes.iter().any(|c| {
            c.matches(class.name) || class.alias.is_some_and(|alias| c.matches(alias))
        });
        if clash {
            return Err(RegistryError::Duplicate(class.name));
        }
        tracing::debug!(name = class.name, "registered machine type");
        self.classes.push(class);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Result<&MachineClass, RegistryError> {
        self.classes
            .iter()
            .find(|c| c.matches(name))
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MachineClass> {
        self.classes.iter()
    }
}
