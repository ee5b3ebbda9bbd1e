#![forbid(unsafe_code)]

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use machine::{BoardConfig, Machine, MachineClass, MachineRegistry, SystemRequest};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "virt-cortex-m",
    about = "Assemble a virtual Cortex-M board and print the resulting machine state"
)]
struct Args {
    /// Machine type, optionally followed by `,prop=value` board property overrides.
    #[arg(short = 'M', long, default_value = "virt_cortex_m")]
    machine: String,

    /// JSON file with board properties (applied before `-M` overrides).
    #[arg(long)]
    config: Option<PathBuf>,

    /// CPU type; defaults to the machine type's CPU.
    #[arg(long)]
    cpu: Option<String>,

    /// Firmware image (ELF or raw binary) to place in flash.
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// RAM size in bytes, or with a `K`, `M` or `G` suffix.
    #[arg(long, value_parser = parse_size)]
    ram: Option<u64>,

    /// Print the machine type's properties and exit.
    #[arg(long)]
    list_props: bool,
}

fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.char_indices().last() {
        Some((i, 'k' | 'K')) => (&s[..i], 10),
        Some((i, 'm' | 'M')) => (&s[..i], 20),
        Some((i, 'g' | 'G')) => (&s[..i], 30),
        _ => (s, 0),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size {s:?}"))?;
    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size {s:?} is too large"))
}

/// Splits `type[,prop=value...]` into the machine type and its property overrides.
fn parse_machine_opt(opt: &str) -> Result<(&str, Vec<(&str, &str)>)> {
    let mut parts = opt.split(',');
    let type_name = parts.next().unwrap_or_default();
    if type_name.is_empty() {
        bail!("missing machine type in {opt:?}");
    }
    let overrides = parts
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.split_once('=')
                .with_context(|| format!("expected prop=value, got {part:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((type_name, overrides))
}

fn load_config(path: &Path) -> Result<BoardConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn print_props(out: &mut impl Write, class: &MachineClass) -> io::Result<()> {
    writeln!(out, "{} options:", class.name)?;
    for prop in class.properties {
        writeln!(
            out,
            "  {}=<{}> - {} (default: {})",
            prop.name, prop.type_name, prop.description, prop.default
        )?;
    }
    Ok(())
}

fn print_machine(out: &mut impl Write, machine: &Machine) -> io::Result<()> {
    let class = machine.class();
    writeln!(out, "machine: {} ({})", class.name, class.desc)?;
    if let Some(cpu) = machine.cpu() {
        let cpu_type = cpu.cpu_type();
        writeln!(out, "cpu: {} ({})", cpu_type.type_name(), cpu_type.profile())?;
    }

    writeln!(out, "memory map:")?;
    for region in machine.memory().borrow().regions() {
        writeln!(
            out,
            "  {:#010x}-{:#010x} {:<18} {} {}",
            region.base,
            region.end() - 1,
            region.kind.to_string(),
            region.access,
            region.name
        )?;
    }

    if let Some(nvic) = machine.nvic() {
        writeln!(out, "nvic: {} irq lines", nvic.borrow().num_irq())?;
    }
    let time_base = machine.time_base();
    writeln!(
        out,
        "clock: {} MHz, {} ns/cycle",
        time_base.freq_hz() / 1_000_000,
        time_base.ns_per_cycle()
    )?;

    let boot = machine.boot_info();
    if let Some(image) = &boot.image {
        writeln!(
            out,
            "kernel: {} ({:?}, {} bytes)",
            image.path.display(),
            image.format,
            image.size
        )?;
    }
    writeln!(
        out,
        "reset: sp={:#010x} pc={:#010x}",
        boot.initial_sp, boot.reset_pc
    )?;
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let registry = MachineRegistry::builtin();
    let (type_name, overrides) = parse_machine_opt(&args.machine)?;
    let class = registry.find(type_name)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.list_props {
        print_props(&mut out, class)?;
        out.flush()?;
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BoardConfig::default(),
    };
    for (name, value) in overrides {
        config
            .set_from_str(name, value)
            .with_context(|| format!("invalid machine option {name}={value}"))?;
    }

    let request = SystemRequest {
        ram_size_bytes: args.ram.unwrap_or(class.default_ram_size),
        cpu_type: args.cpu,
        kernel_filename: args.kernel,
    };
    tracing::debug!(?config, ?request, "assembling machine");
    let machine = (class.init)(config, &request)
        .with_context(|| format!("failed to assemble {}", class.name))?;

    print_machine(&mut out, &machine)?;
    out.flush()?;
    Ok(())
}
