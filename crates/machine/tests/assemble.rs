use armv7m::{ArmCpu, BootError, BootInfo, CpuType, RealizeError};
use machine::{
    BoardConfig, BootLoader, ConfigError, MachineError, SystemRequest, TimeBase, VirtCortexM,
};
use memory::{AddressSpace, Access, MemoryBus, RegionKind, TransactionFailurePolicy};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::{Path, PathBuf};

const RAM: u64 = 64 * 1024;

#[derive(Default)]
struct RecordingLoader {
    calls: Vec<(Option<PathBuf>, u64, Option<TimeBase>)>,
}

impl BootLoader for RecordingLoader {
    fn load(
        &mut self,
        cpu: &mut ArmCpu,
        mem: &mut AddressSpace,
        kernel: Option<&Path>,
        mem_size: u64,
    ) -> Result<BootInfo, BootError> {
        self.calls
            .push((kernel.map(Path::to_path_buf), mem_size, cpu.time_base()));
        armv7m::load_kernel(cpu, mem, None, mem_size)
    }
}

fn kernel_file(sp: u32, pc: u32) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&sp.to_le_bytes()).unwrap();
    file.write_all(&pc.to_le_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn default_board_assembles() {
    let board = VirtCortexM::new();
    assert_eq!(
        (board.flash_kb(), board.freq_mhz(), board.num_irq()),
        (1024, 50, 64)
    );

    let machine = board.assemble(&SystemRequest::new(RAM)).unwrap();

    let regions: Vec<_> = machine
        .memory()
        .borrow()
        .regions()
        .map(|r| (r.name, r.base, r.size, r.kind, r.access))
        .collect();
    assert_eq!(
        regions,
        vec![
            (
                "virt_cortex_m.flash".to_string(),
                0,
                1024 * 1024,
                RegionKind::Rom,
                Access::RX
            ),
            (
                "virt_cortex_m.sram".to_string(),
                0x2000_0000,
                RAM,
                RegionKind::Ram,
                Access::RWX
            ),
            (
                "armv7m.bitband0".to_string(),
                0x2200_0000,
                0x0200_0000,
                RegionKind::BitBand { source_base: 0x2000_0000 },
                Access::RW
            ),
            (
                "armv7m.bitband1".to_string(),
                0x4200_0000,
                0x0200_0000,
                RegionKind::BitBand { source_base: 0x4000_0000 },
                Access::RW
            ),
            (
                "armv7m.scs".to_string(),
                0xE000_E000,
                0x1000,
                RegionKind::Mmio,
                Access::RW
            ),
        ]
    );

    assert_eq!(machine.time_base().ns_per_cycle(), 20);
    assert_eq!(machine.time_base().freq_hz(), 50_000_000);
    let cpu = machine.cpu().unwrap();
    assert_eq!(cpu.cpu_type(), CpuType::CortexM3);
    assert_eq!(cpu.time_base(), Some(machine.time_base()));
    assert_eq!(machine.nvic().unwrap().borrow().num_irq(), 64);
    assert_eq!(
        machine.memory().borrow().policy(),
        TransactionFailurePolicy::Ignore
    );

    // Erased flash: the vector table is all zeros.
    let boot = machine.boot_info();
    assert_eq!((boot.image.as_ref(), boot.initial_sp, boot.reset_pc), (None, 0, 0));
}

#[test]
fn board_parameters_shape_the_machine() {
    let mut board = VirtCortexM::new();
    board.set_flash_kb(256);
    board.set_freq_mhz(25);
    board.set_num_irq(32);

    let mut loader = RecordingLoader::default();
    let request = SystemRequest::new(RAM)
        .with_cpu_type("cortex-m4")
        .with_kernel("fw.bin");
    let machine = board.assemble_with(&request, &mut loader).unwrap();

    let flash = machine.memory().borrow().find_region("virt_cortex_m.flash").unwrap();
    assert_eq!(flash.size, 256 * 1024);
    assert_eq!(machine.time_base().ns_per_cycle(), 40);
    assert_eq!(machine.nvic().unwrap().borrow().num_irq(), 32);
    assert_eq!(machine.cpu().unwrap().cpu_type(), CpuType::CortexM4);
    // ICTR: one group of 32 lines.
    assert_eq!(machine.read_physical_u32(0xE000_E004).unwrap(), 0);

    // The loader runs once, after the time base is installed, bounded by the flash size.
    assert_eq!(
        loader.calls,
        vec![(
            Some(PathBuf::from("fw.bin")),
            256 * 1024,
            Some(machine.time_base())
        )]
    );
}

#[test]
fn small_board_with_sixteen_kib_of_sram() {
    let mut board = VirtCortexM::new();
    board.set_flash_kb(64);
    board.set_freq_mhz(25);
    board.set_num_irq(32);
    let machine = board.assemble(&SystemRequest::new(16384)).unwrap();

    let memory = machine.memory().borrow();
    let flash = memory.find_region("virt_cortex_m.flash").unwrap();
    assert_eq!((flash.base, flash.end()), (0, 65536));
    let sram = memory.find_region("virt_cortex_m.sram").unwrap();
    assert_eq!((sram.base, sram.end()), (0x2000_0000, 0x2000_4000));
    drop(memory);

    assert_eq!(machine.time_base().ns_per_cycle(), 40);
    assert_eq!(machine.nvic().unwrap().borrow().num_irq(), 32);
}

#[test]
fn largest_interrupt_count_is_accepted() {
    let mut board = VirtCortexM::new();
    board.set_num_irq(496);
    let machine = board.assemble(&SystemRequest::new(RAM)).unwrap();
    assert_eq!(machine.nvic().unwrap().borrow().num_irq(), 496);
    // ICTR: sixteen groups of 32 lines.
    assert_eq!(machine.read_physical_u32(0xE000_E004).unwrap(), 15);
    machine.set_irq(495, true).unwrap();
    assert!(machine.armv7m().irq_pending(495));
}

#[test]
fn one_mhz_gives_a_microsecond_cycle() {
    let mut board = VirtCortexM::new();
    board.set_freq_mhz(1);
    let machine = board.assemble(&SystemRequest::new(RAM)).unwrap();
    assert_eq!(machine.time_base().ns_per_cycle(), 1000);
}

#[test]
fn property_surface_feeds_assembly() {
    let mut board = VirtCortexM::new();
    board.set_property_str("flash_kb", "0x100").unwrap();
    board.set_property("num_irq", 16).unwrap();
    assert_eq!(board.property("flash_kb").unwrap(), 256);

    let machine = board.assemble(&SystemRequest::new(RAM)).unwrap();
    assert_eq!(machine.config().flash_size_kb, 256);
    assert_eq!(machine.layout().flash().size, 256 * 1024);
    assert_eq!(machine.nvic().unwrap().borrow().num_irq(), 16);
}

#[test]
fn raw_kernel_sets_reset_state() {
    let kernel = kernel_file(0x2000_8000, 0x0000_0401);
    let machine = VirtCortexM::new()
        .assemble(&SystemRequest::new(RAM).with_kernel(kernel.path()))
        .unwrap();

    let boot = machine.boot_info();
    assert_eq!(boot.initial_sp, 0x2000_8000);
    assert_eq!(boot.reset_pc, 0x400);
    assert!(machine.cpu().unwrap().thumb());
    assert_eq!(
        machine.read_physical_bytes(0, 4).unwrap(),
        vec![0x00, 0x80, 0x00, 0x20]
    );
}

#[test]
fn realize_failure_stops_before_boot() {
    let mut loader = RecordingLoader::default();
    let err = VirtCortexM::new()
        .assemble_with(
            &SystemRequest::new(RAM).with_cpu_type("cortex-a15-arm-cpu"),
            &mut loader,
        )
        .map(|_| ())
        .unwrap_err();

    assert!(
        matches!(err, MachineError::Realize(RealizeError::UnknownCpuType(_))),
        "{err:?}"
    );
    assert!(loader.calls.is_empty());
}

#[test]
fn invalid_configuration_stops_before_any_step() {
    let mut loader = RecordingLoader::default();
    let mut assemble = |config: BoardConfig, ram: u64| {
        VirtCortexM::from_config(config)
            .assemble_with(&SystemRequest::new(ram), &mut loader)
            .map(|_| ())
            .unwrap_err()
    };
    let base = BoardConfig::default();

    assert!(matches!(
        assemble(BoardConfig { freq_mhz: 0, ..base }, RAM),
        MachineError::Config(ConfigError::Frequency(0))
    ));
    assert!(matches!(
        assemble(BoardConfig { flash_size_kb: -4, ..base }, RAM),
        MachineError::Config(ConfigError::FlashSize(-4))
    ));
    assert!(matches!(
        assemble(BoardConfig { num_irq: 1000, ..base }, RAM),
        MachineError::Config(ConfigError::IrqCount { value: 1000, .. })
    ));
    assert!(matches!(
        assemble(base, 0),
        MachineError::Config(ConfigError::ZeroRam)
    ));
    assert!(matches!(
        assemble(BoardConfig { flash_size_kb: 512 * 1024 + 1, ..base }, RAM),
        MachineError::Config(ConfigError::Overlap { .. })
    ));
    assert!(matches!(
        assemble(base, 0x0200_0000 + 1),
        MachineError::Config(ConfigError::Overlap { .. })
    ));
    assert!(loader.calls.is_empty());
}

#[test]
fn missing_kernel_is_a_boot_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = VirtCortexM::new()
        .assemble(&SystemRequest::new(RAM).with_kernel(dir.path().join("nope.elf")))
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, MachineError::Boot(BootError::Io { .. })), "{err:?}");
}

#[test]
fn guest_view_of_the_assembled_bus() {
    let machine = VirtCortexM::new().assemble(&SystemRequest::new(RAM)).unwrap();
    let mut mem = machine.memory().borrow_mut();

    // Flash is read-only to the guest.
    mem.write_u32(0x100, 0xFFFF_FFFF).unwrap();
    assert_eq!(mem.read_u32(0x100).unwrap(), 0);

    mem.write_u32(0x2000_0010, 0x1234_5678).unwrap();
    assert_eq!(mem.read_u32(0x2000_0010).unwrap(), 0x1234_5678);

    // Bit 2 of SRAM byte 0x10 through the alias window.
    let alias = 0x2200_0000 + 0x10 * 32 + 2 * 4;
    assert_eq!(mem.read_u32(alias).unwrap(), 0);
    mem.write_u32(alias, 1).unwrap();
    assert_eq!(mem.read_u8(0x2000_0010).unwrap(), 0x78 | 0x04);

    // Unassigned space reads as zero and drops writes.
    mem.write_u32(0x6000_0000, 0xDEAD_BEEF).unwrap();
    assert_eq!(mem.read_u32(0x6000_0000).unwrap(), 0);
}

#[test]
fn irq_lines_can_be_raised_after_assembly() {
    let machine = VirtCortexM::new().assemble(&SystemRequest::new(RAM)).unwrap();
    machine.set_irq(63, true).unwrap();
    assert!(machine.armv7m().irq_pending(63));
    assert_eq!(machine.read_physical_u32(0xE000_E204).unwrap(), 1 << 31);
    assert!(machine.set_irq(64, true).is_err());
}
