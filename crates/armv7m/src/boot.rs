//! Kernel image loading for M-profile boards.
//!
//! An ELF image has its `PT_LOAD` segments placed at their physical addresses. Anything else is
//! copied verbatim to address 0. Either way the core is then reset, so execution starts from
//! the vector table at the bottom of the image.

use crate::cpu::ArmCpu;
use goblin::elf::header::EM_ARM;
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use memory::{AddressSpace, BusError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Elf,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub format: ImageFormat,
    /// Bytes copied from the file into guest memory.
    pub size: u64,
    /// ELF entry point. Informational only; M-profile cores start from the vector table.
    pub entry: Option<u64>,
}

/// Outcome of [`load_kernel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootInfo {
    pub image: Option<LoadedImage>,
    pub initial_sp: u32,
    pub reset_pc: u32,
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error("failed to read kernel image {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: unsupported ELF image: {reason}", .path.display())]
    UnsupportedElf { path: PathBuf, reason: String },
    #[error("{}: ELF machine {machine} is not ARM", .path.display())]
    WrongMachine { path: PathBuf, machine: u16 },
    #[error("{}: image of {size} bytes does not fit in {max} bytes of flash", .path.display())]
    ImageTooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("{}: segment at {paddr:#010x} ({len:#x} bytes) lies outside flash", .path.display())]
    SegmentOutOfRange { path: PathBuf, paddr: u64, len: u64 },
    #[error("boot memory access failed")]
    Bus(#[from] BusError),
}

/// Loads `kernel` (if given) into the first `mem_size` bytes of `mem` and resets `cpu`.
///
/// An ELF image built for a machine other than ARM is rejected with [`BootError::WrongMachine`]
/// rather than being loaded as a raw binary.
pub fn load_kernel(
    cpu: &mut ArmCpu,
    mem: &mut AddressSpace,
    kernel: Option<&Path>,
    mem_size: u64,
) -> Result<BootInfo, BootError> {
    let image = match kernel {
        Some(path) => {
            let data = std::fs::read(path).map_err(|source| BootError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Some(load_image(mem, path, &data, mem_size)?)
        }
        None => {
            tracing::debug!("no kernel image, resetting from existing flash contents");
            None
        }
    };

    cpu.reset(mem)?;
    Ok(BootInfo {
        image,
        initial_sp: cpu.sp(),
        reset_pc: cpu.pc(),
    })
}

fn load_image(
    mem: &mut AddressSpace,
    path: &Path,
    data: &[u8],
    mem_size: u64,
) -> Result<LoadedImage, BootError> {
    match Elf::parse(data) {
        Ok(elf) => load_elf(mem, path, data, &elf, mem_size),
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "not an ELF image, loading raw");
            load_raw(mem, path, data, mem_size)
        }
    }
}

fn load_elf(
    mem: &mut AddressSpace,
    path: &Path,
    data: &[u8],
    elf: &Elf<'_>,
    mem_size: u64,
) -> Result<LoadedImage, BootError> {
    let unsupported = |reason: &str| BootError::UnsupportedElf {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if elf.is_64 {
        return Err(unsupported("64-bit ELF"));
    }
    if !elf.little_endian {
        return Err(unsupported("big-endian ELF"));
    }
    if elf.header.e_machine != EM_ARM {
        return Err(BootError::WrongMachine {
            path: path.to_path_buf(),
            machine: elf.header.e_machine,
        });
    }

    let mut loaded = 0u64;
    for ph in elf.program_headers.iter().filter(|ph| ph.p_type == PT_LOAD) {
        // Zero-initialised segments (.bss) are cleared by the guest's startup code.
        if ph.p_filesz == 0 {
            continue;
        }
        let paddr = ph.p_paddr;
        // The zero-filled tail must fit as well as the file bytes.
        let extent = ph.p_memsz.max(ph.p_filesz);
        let in_flash = paddr
            .checked_add(extent)
            .is_some_and(|end| end <= mem_size);
        if !in_flash {
            return Err(BootError::SegmentOutOfRange {
                path: path.to_path_buf(),
                paddr,
                len: extent,
            });
        }

        let start = usize::try_from(ph.p_offset).map_err(|_| unsupported("bad segment offset"))?;
        let bytes = usize::try_from(ph.p_filesz)
            .ok()
            .and_then(|len| data.get(start..start.checked_add(len)?))
            .ok_or_else(|| unsupported("segment data out of bounds"))?;
        mem.write_rom(paddr, bytes)?;

        if ph.p_memsz > ph.p_filesz {
            let tail = usize::try_from(ph.p_memsz - ph.p_filesz)
                .map_err(|_| unsupported("segment too large"))?;
            mem.write_rom(paddr + ph.p_filesz, &vec![0u8; tail])?;
        }

        tracing::debug!(
            paddr = format_args!("{paddr:#010x}"),
            filesz = ph.p_filesz,
            memsz = ph.p_memsz,
            "loaded ELF segment"
        );
        loaded += ph.p_filesz;
    }

    tracing::info!(path = %path.display(), bytes = loaded, "loaded ELF kernel");
    Ok(LoadedImage {
        path: path.to_path_buf(),
        format: ImageFormat::Elf,
        size: loaded,
        entry: Some(elf.entry),
    })
}

fn load_raw(
    mem: &mut AddressSpace,
    path: &Path,
    data: &[u8],
    mem_size: u64,
) -> Result<LoadedImage, BootError> {
    let size = data.len() as u64;
    if size > mem_size {
        return Err(BootError::ImageTooLarge {
            path: path.to_path_buf(),
            size,
            max: mem_size,
        });
    }
    mem.write_rom(0, data)?;

    tracing::info!(path = %path.display(), bytes = size, "loaded raw kernel");
    Ok(LoadedImage {
        path: path.to_path_buf(),
        format: ImageFormat::Raw,
        size,
        entry: None,
    })
}
