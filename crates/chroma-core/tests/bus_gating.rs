use chroma_core::gb::bus::Bus;
use chroma_core::gb::cartridge::Cartridge;
use chroma_core::AudioFilter;

fn bus() -> Bus {
    let mut bus = Bus::new(false, false, AudioFilter::Nearest);
    bus.if_reg = 0;
    bus
}

fn bus_with_cart() -> Bus {
    let mut bus = bus();
    let mut rom = vec![0u8; 0x8000];
    for (i, byte) in rom.iter_mut().enumerate() {
        *byte = i as u8;
    }
    bus.load_cart(Cartridge::new(rom, false));
    bus
}

#[test]
fn oam_dma_blocks_external_bus_but_not_hram() {
    let mut bus = bus_with_cart();
    for i in 0..0xA0u16 {
        bus.write_byte(0xC000 + i, (0xA0 + i) as u8);
    }
    bus.write_byte(0xFF80, 0x5A);

    bus.write_byte(0xFF46, 0xC0);
    assert!(!bus.dma_blocking());
    bus.tick(2);
    assert!(bus.dma_blocking());

    // Everything below the IO window reads open bus while the engine runs.
    assert_eq!(bus.read_byte(0x0000), 0xFF);
    assert_eq!(bus.read_byte(0xC000), 0xFF);
    assert_eq!(bus.read_byte(0xFE00), 0xFF);
    // The HRAM+IO window stays usable.
    assert_eq!(bus.read_byte(0xFF80), 0x5A);
    assert_eq!(bus.read_byte(0xFF46), 0xC0);

    bus.tick(160);
    assert!(!bus.dma_blocking());
    assert_eq!(bus.ppu.oam[0x00], 0xA0);
    assert_eq!(bus.ppu.oam[0x9F], 0x3F);
    assert_eq!(bus.read_byte(0xC000), 0xA0);
}

#[test]
fn oam_dma_restart_keeps_bus_blocked() {
    let mut bus = bus_with_cart();
    for i in 0..0xA0u16 {
        bus.write_byte(0xC000 + i, 0x11);
        bus.write_byte(0xD000 + i, 0x22);
    }

    bus.write_byte(0xFF46, 0xC0);
    bus.tick(10);
    assert!(bus.dma_blocking());

    // Restart mid-flight: the state machine rolls back to its armed state
    // without releasing the bus.
    bus.write_byte(0xFF46, 0xD0);
    assert!(bus.dma_blocking());
    bus.tick(1);
    assert!(bus.dma_blocking());
    assert_eq!(bus.read_byte(0x8000), 0xFF);

    bus.tick(161);
    assert!(!bus.dma_blocking());
    assert_eq!(bus.ppu.oam[0x9F], 0x22);
}

#[test]
fn dma_source_above_wram_folds_back() {
    let mut bus = bus();
    for i in 0..0xA0u16 {
        bus.write_byte(0xC000 + i, (i + 1) as u8);
    }
    // Source 0xE0 reads through the echo region into WRAM.
    bus.write_byte(0xFF46, 0xE0);
    bus.tick(162);
    assert_eq!(bus.ppu.oam[0x00], 0x01);
    assert_eq!(bus.ppu.oam[0x10], 0x11);
}

#[test]
fn echo_region_mirrors_wram() {
    let mut bus = bus();
    bus.write_byte(0xC123, 0xAB);
    assert_eq!(bus.read_byte(0xE123), 0xAB);
    bus.write_byte(0xFDFF, 0xCD);
    assert_eq!(bus.read_byte(0xDDFF), 0xCD);
}

#[test]
fn unusable_region_reads_zero() {
    let mut bus = bus();
    bus.write_byte(0xFEA0, 0x12);
    assert_eq!(bus.read_byte(0xFEA0), 0x00);
    assert_eq!(bus.read_byte(0xFEFF), 0x00);
}

#[test]
fn io_registers_read_back_with_open_bits() {
    let mut bus = bus();

    // TAC: only the low three bits exist.
    bus.write_byte(0xFF07, 0xFF);
    assert_eq!(bus.read_byte(0xFF07), 0xFF);
    bus.write_byte(0xFF07, 0x02);
    assert_eq!(bus.read_byte(0xFF07), 0xFA);

    // IF: upper three bits always read set.
    bus.write_byte(0xFF0F, 0x00);
    assert_eq!(bus.read_byte(0xFF0F) & 0xE0, 0xE0);

    // STAT: bit 7 is wired high, the mode bits are read-only.
    bus.write_byte(0xFF41, 0x00);
    assert_eq!(bus.read_byte(0xFF41) & 0x80, 0x80);

    // CGB-only ports read open bus on DMG.
    assert_eq!(bus.read_byte(0xFF4D), 0xFF);
    assert_eq!(bus.read_byte(0xFF4F), 0xFF);
    assert_eq!(bus.read_byte(0xFF70), 0xFF);

    // SB round-trips unmasked.
    bus.write_byte(0xFF01, 0x5A);
    assert_eq!(bus.read_byte(0xFF01), 0x5A);
}

#[test]
fn cgb_wram_banking_and_key1() {
    let mut bus = Bus::new(true, false, AudioFilter::Nearest);
    bus.write_byte(0xFF70, 0x02);
    bus.write_byte(0xD000, 0x22);
    bus.write_byte(0xFF70, 0x03);
    bus.write_byte(0xD000, 0x33);
    bus.write_byte(0xFF70, 0x02);
    assert_eq!(bus.read_byte(0xD000), 0x22);
    // Bank 0 selects bank 1.
    bus.write_byte(0xFF70, 0x00);
    assert_eq!(bus.read_byte(0xFF70) & 0x07, 0x01);

    // KEY1: only the armed bit is writable.
    bus.write_byte(0xFF4D, 0xFF);
    assert_eq!(bus.read_byte(0xFF4D), 0x7F);
}

#[test]
fn hdma_general_transfer_copies_and_stalls() {
    let mut bus = Bus::new(true, false, AudioFilter::Nearest);
    for i in 0..0x20u16 {
        bus.write_byte(0xC000 + i, (0x40 + i) as u8);
    }
    bus.write_byte(0xFF51, 0xC0);
    bus.write_byte(0xFF52, 0x00);
    bus.write_byte(0xFF53, 0x00);
    bus.write_byte(0xFF54, 0x00);
    // Two 16-byte blocks, general-purpose mode.
    bus.write_byte(0xFF55, 0x01);

    assert!(bus.gdma_active());
    assert_eq!(bus.ppu.vram[0][0x00], 0x40);
    assert_eq!(bus.ppu.vram[0][0x1F], 0x5F);
    assert_eq!(bus.read_byte(0xFF55), 0xFF);
}

#[test]
fn hdma_hblank_mode_reports_remaining_blocks() {
    let mut bus = Bus::new(true, false, AudioFilter::Nearest);
    // LCD off: the armed transfer moves its first block immediately.
    bus.write_byte(0xFF40, 0x00);
    bus.write_byte(0xFF51, 0xC0);
    bus.write_byte(0xFF52, 0x00);
    bus.write_byte(0xFF53, 0x00);
    bus.write_byte(0xFF54, 0x00);
    bus.write_byte(0xFF55, 0x83); // 4 blocks, H-blank mode

    let remaining = bus.read_byte(0xFF55);
    assert_eq!(remaining & 0x80, 0x00, "busy flag reads low while active");

    bus.hdma_hblank_transfer();
    bus.hdma_hblank_transfer();
    bus.hdma_hblank_transfer();
    assert_eq!(bus.read_byte(0xFF55), 0xFF);

    // Cancelling an active transfer leaves bit 7 set.
    bus.write_byte(0xFF55, 0x85);
    bus.write_byte(0xFF55, 0x00);
    assert_eq!(bus.read_byte(0xFF55), 0x80);
}
