use armv7m::{Armv7m, IrqError, PropertyFrozen, RealizeError, NVIC_MAX_IRQ, SCS_BASE};
use memory::{AddressSpace, MemoryBus, MemoryRegion, RegionKind};
use pretty_assertions::assert_eq;

fn container_with(space: &memory::SharedAddressSpace) -> Armv7m {
    let mut armv7m = Armv7m::new();
    armv7m.set_cpu_type("cortex-m3-arm-cpu").unwrap();
    armv7m.set_memory(space.clone()).unwrap();
    armv7m
}

#[test]
fn realize_maps_scs_and_bitband_windows() {
    let space = AddressSpace::new("system").into_shared();
    space
        .borrow_mut()
        .add_subregion(0x2000_0000, MemoryRegion::ram("sram", 0x1000).unwrap())
        .unwrap();

    let mut armv7m = container_with(&space);
    armv7m.set_enable_bitband(true).unwrap();
    armv7m.realize().unwrap();

    let kinds: Vec<_> = space
        .borrow()
        .regions()
        .map(|r| (r.base, r.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (0x2000_0000, RegionKind::Ram),
            (0x2200_0000, RegionKind::BitBand { source_base: 0x2000_0000 }),
            (0x4200_0000, RegionKind::BitBand { source_base: 0x4000_0000 }),
            (SCS_BASE, RegionKind::Mmio),
        ]
    );

    let mut space = space.borrow_mut();
    // CPUID of the Cortex-M3 r2p1.
    assert_eq!(space.read_u32(SCS_BASE + 0xD00).unwrap(), 0x410F_C231);
    // 64 lines are two groups of 32.
    assert_eq!(space.read_u32(SCS_BASE + 0x004).unwrap(), 1);

    space.write_u32(0x2200_0000 + 4 * 5, 1).unwrap();
    assert_eq!(space.read_u8(0x2000_0000).unwrap(), 1 << 5);
}

#[test]
fn realize_without_bitband_maps_only_the_scs() {
    let space = AddressSpace::new("system").into_shared();
    let mut armv7m = container_with(&space);
    armv7m.realize().unwrap();

    let names: Vec<_> = space.borrow().regions().map(|r| r.name).collect();
    assert_eq!(names, vec!["armv7m.scs".to_string()]);
}

#[test]
fn realize_reports_missing_configuration() {
    let mut armv7m = Armv7m::new();
    armv7m.set_cpu_type("cortex-m3").unwrap();
    assert!(matches!(armv7m.realize(), Err(RealizeError::MemoryNotSet)));

    let space = AddressSpace::new("system").into_shared();
    let mut armv7m = Armv7m::new();
    armv7m.set_memory(space.clone()).unwrap();
    assert!(matches!(armv7m.realize(), Err(RealizeError::CpuTypeNotSet)));

    armv7m.set_cpu_type("cortex-a9-arm-cpu").unwrap();
    let err = armv7m.realize().unwrap_err();
    assert!(matches!(err, RealizeError::UnknownCpuType(_)));
    assert_eq!(
        err.to_string(),
        "unknown Cortex-M CPU type \"cortex-a9-arm-cpu\""
    );
    assert!(!armv7m.is_realized());
}

#[test]
fn realize_rejects_too_many_irqs() {
    let space = AddressSpace::new("system").into_shared();
    let mut armv7m = container_with(&space);
    armv7m.set_num_irq(NVIC_MAX_IRQ + 1).unwrap();
    assert!(matches!(
        armv7m.realize(),
        Err(RealizeError::TooManyIrqs { num_irq: 497, max: 496 })
    ));

    armv7m.set_num_irq(NVIC_MAX_IRQ).unwrap();
    armv7m.realize().unwrap();
    assert_eq!(armv7m.nvic().unwrap().borrow().num_irq(), 496);
    armv7m.set_irq(495, true).unwrap();
    assert!(armv7m.irq_pending(495));
}

#[test]
fn realize_fails_when_a_window_is_taken() {
    let space = AddressSpace::new("system").into_shared();
    space
        .borrow_mut()
        .add_subregion(0x2000_0000, MemoryRegion::ram("big", 0x0300_0000).unwrap())
        .unwrap();

    let mut armv7m = container_with(&space);
    armv7m.set_enable_bitband(true).unwrap();
    assert!(matches!(armv7m.realize(), Err(RealizeError::Map(_))));
    assert!(armv7m.cpu().is_none());
}

#[test]
fn properties_freeze_after_realize() {
    let space = AddressSpace::new("system").into_shared();
    let mut armv7m = container_with(&space);
    armv7m.realize().unwrap();

    assert_eq!(armv7m.set_num_irq(8), Err(PropertyFrozen("num-irq")));
    assert_eq!(armv7m.set_cpu_type("cortex-m4"), Err(PropertyFrozen("cpu-type")));
    assert_eq!(
        armv7m.set_enable_bitband(true),
        Err(PropertyFrozen("enable-bitband"))
    );
    assert!(matches!(armv7m.realize(), Err(RealizeError::AlreadyRealized)));
}

#[test]
fn irq_lines_latch_pending_state() {
    let space = AddressSpace::new("system").into_shared();
    let mut armv7m = container_with(&space);
    assert_eq!(armv7m.set_irq(0, true), Err(IrqError::NotRealized));

    armv7m.set_num_irq(16).unwrap();
    armv7m.realize().unwrap();

    armv7m.set_irq(7, true).unwrap();
    assert!(armv7m.irq_pending(7));
    assert_eq!(
        space.borrow_mut().read_u32(SCS_BASE + 0x200).unwrap(),
        1 << 7
    );
    assert_eq!(
        armv7m.set_irq(16, true),
        Err(IrqError::OutOfRange { line: 16, num_irq: 16 })
    );
}
