use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Mapper families the core understands. `Mbc1Multi` is the multicart wiring
/// of MBC1 where the bank-high register shifts by 4 instead of 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    None,
    Mbc1,
    Mbc1Multi,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Writes into 0x0000-0x7FFF never touch ROM; they program one of these.
#[derive(Debug)]
enum Mapper {
    None,
    Mbc1 {
        bank_lo: u8,
        bank_hi: u8,
        mode: u8,
        ram_enabled: bool,
        multicart: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enabled: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enabled: bool,
        rtc: RtcShadow,
        latch_armed: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enabled: bool,
        rumble: bool,
    },
}

/// MBC3 clock shadow registers. The clock itself never advances; the
/// registers only change through CPU writes, and latching copies them so the
/// usual read protocol still works and save files stay compatible.
#[derive(Debug, Default, Clone, Copy)]
struct RtcShadow {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days_lo: u8,
    /// Day bit 8, halt (bit 6) and day-carry (bit 7).
    control: u8,
    latched: [u8; 5],
}

impl RtcShadow {
    fn latch(&mut self) {
        self.latched = [
            self.seconds % 60,
            self.minutes % 60,
            self.hours % 24,
            self.days_lo,
            self.control & 0xC1,
        ];
    }

    fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08..=0x0C => self.latched[(reg - 0x08) as usize],
            _ => 0xFF,
        }
    }

    fn write(&mut self, reg: u8, val: u8) {
        match reg {
            0x08 => self.seconds = val & 0x3F,
            0x09 => self.minutes = val & 0x3F,
            0x0A => self.hours = val & 0x1F,
            0x0B => self.days_lo = val,
            0x0C => self.control = val & 0xC1,
            _ => {}
        }
    }
}

#[derive(Debug)]
pub struct Cartridge {
    rom: Vec<u8>,
    pub ram: Vec<u8>,
    mapper: Mapper,
    pub kind: MapperKind,
    pub title: String,
    pub cgb: bool,
    has_battery: bool,
    save_path: Option<PathBuf>,
}

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

impl Cartridge {
    /// Parse a ROM image. `force_multicart` selects the MBC1M wiring, which
    /// cannot be reliably identified from the header alone.
    pub fn new(rom: Vec<u8>, force_multicart: bool) -> Self {
        let header = Header(&rom);
        let kind = header.mapper_kind(force_multicart);
        let title = header.title();
        let cgb = header.cgb_supported();
        let has_battery = header.has_battery();
        let ram_size = header.ram_size();

        let mapper = match kind {
            MapperKind::None => Mapper::None,
            MapperKind::Mbc1 | MapperKind::Mbc1Multi => Mapper::Mbc1 {
                bank_lo: 1,
                bank_hi: 0,
                mode: 0,
                ram_enabled: false,
                multicart: kind == MapperKind::Mbc1Multi,
            },
            MapperKind::Mbc2 => Mapper::Mbc2 {
                rom_bank: 1,
                ram_enabled: false,
            },
            MapperKind::Mbc3 => Mapper::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enabled: false,
                rtc: RtcShadow::default(),
                latch_armed: false,
            },
            MapperKind::Mbc5 => Mapper::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enabled: false,
                rumble: header.has_rumble(),
            },
        };

        log::debug!(
            target: "chroma_core::cartridge",
            "loaded \"{title}\" mapper={kind:?} rom={}KiB ram={}KiB cgb={cgb}",
            rom.len() / 1024,
            ram_size / 1024
        );

        Self {
            rom,
            ram: vec![0; ram_size],
            mapper,
            kind,
            title,
            cgb,
            has_battery,
            save_path: None,
        }
    }

    /// Load from disk, pulling in an adjacent `.sav` image if present.
    pub fn from_file<P: AsRef<Path>>(path: P, force_multicart: bool) -> io::Result<Self> {
        let data = fs::read(&path)?;
        let mut cart = Self::new(data, force_multicart);

        if cart.has_battery {
            let mut save = PathBuf::from(path.as_ref());
            save.set_extension("sav");
            match fs::read(&save) {
                Ok(bytes) => {
                    if bytes.len() != cart.ram.len() {
                        log::warn!(
                            target: "chroma_core::cartridge",
                            "save file {} has size {} (expected {}); starting with cleared RAM",
                            save.display(),
                            bytes.len(),
                            cart.ram.len()
                        );
                    } else {
                        cart.ram.copy_from_slice(&bytes);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!(
                        target: "chroma_core::cartridge",
                        "could not read {}: {e}; starting with cleared RAM",
                        save.display()
                    );
                }
            }
            cart.save_path = Some(save);
        }

        Ok(cart)
    }

    /// Persist external RAM as a flat byte image next to the ROM.
    pub fn save_ram(&self) -> io::Result<()> {
        if let (true, Some(path)) = (self.has_battery, &self.save_path) {
            if !self.ram.is_empty() {
                fs::write(path, &self.ram)?;
            }
        }
        Ok(())
    }

    fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    fn ram_bank_count(&self) -> usize {
        self.ram.len() / RAM_BANK_SIZE
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => {
                // Bank 0 stays mapped here, except MBC1 mode 1 where the
                // high-bank bits leak into the fixed window.
                let bank = match &self.mapper {
                    Mapper::Mbc1 {
                        bank_hi,
                        mode: 1,
                        multicart,
                        ..
                    } => {
                        let shift = if *multicart { 4 } else { 5 };
                        ((*bank_hi as usize) << shift) % self.rom_bank_count()
                    }
                    _ => 0,
                };
                self.rom
                    .get(bank * ROM_BANK_SIZE + addr as usize)
                    .copied()
                    .unwrap_or(0xFF)
            }
            0x4000..=0x7FFF => {
                let bank = self.switchable_rom_bank();
                self.rom
                    .get(bank * ROM_BANK_SIZE + (addr as usize - 0x4000))
                    .copied()
                    .unwrap_or(0xFF)
            }
            0xA000..=0xBFFF => self.read_ram(addr),
            _ => 0xFF,
        }
    }

    fn switchable_rom_bank(&self) -> usize {
        let count = self.rom_bank_count();
        match &self.mapper {
            Mapper::None => 1,
            Mapper::Mbc1 {
                bank_lo,
                bank_hi,
                multicart,
                ..
            } => {
                let bank = if *multicart {
                    ((*bank_hi as usize) << 4) | (*bank_lo as usize & 0x0F)
                } else {
                    ((*bank_hi as usize) << 5) | *bank_lo as usize
                };
                bank % count
            }
            Mapper::Mbc2 { rom_bank, .. } => (*rom_bank as usize) % count,
            Mapper::Mbc3 { rom_bank, .. } => (*rom_bank as usize) % count,
            Mapper::Mbc5 { rom_bank, .. } => (*rom_bank as usize) % count,
        }
    }

    fn read_ram(&self, addr: u16) -> u8 {
        match &self.mapper {
            Mapper::None => self
                .ram
                .get(addr as usize - 0xA000)
                .copied()
                .unwrap_or(0xFF),
            Mapper::Mbc1 {
                ram_enabled: false, ..
            }
            | Mapper::Mbc2 {
                ram_enabled: false, ..
            }
            | Mapper::Mbc3 {
                ram_enabled: false, ..
            }
            | Mapper::Mbc5 {
                ram_enabled: false, ..
            } => 0xFF,
            Mapper::Mbc1 { mode, bank_hi, .. } => {
                let bank = if *mode == 1 { *bank_hi as usize } else { 0 };
                self.banked_ram(bank, addr)
            }
            Mapper::Mbc2 { .. } => {
                // 512 half-byte cells mirrored across the window; the upper
                // nibble is open bus.
                let nibble = self
                    .ram
                    .get((addr as usize - 0xA000) & 0x1FF)
                    .copied()
                    .unwrap_or(0x0F);
                0xF0 | (nibble & 0x0F)
            }
            Mapper::Mbc3 { ram_bank, rtc, .. } => match *ram_bank {
                0x00..=0x07 => self.banked_ram(*ram_bank as usize, addr),
                0x08..=0x0C => rtc.read(*ram_bank),
                _ => 0xFF,
            },
            Mapper::Mbc5 { ram_bank, .. } => self.banked_ram(*ram_bank as usize, addr),
        }
    }

    fn banked_ram(&self, bank: usize, addr: u16) -> u8 {
        let count = self.ram_bank_count();
        if count == 0 {
            return 0xFF;
        }
        let idx = (bank % count) * RAM_BANK_SIZE + (addr as usize - 0xA000);
        self.ram.get(idx).copied().unwrap_or(0xFF)
    }

    fn banked_ram_write(&mut self, bank: usize, addr: u16, val: u8) {
        let count = self.ram_bank_count();
        if count == 0 {
            return;
        }
        let idx = (bank % count) * RAM_BANK_SIZE + (addr as usize - 0xA000);
        if let Some(b) = self.ram.get_mut(idx) {
            *b = val;
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.write_control(addr, val),
            0xA000..=0xBFFF => self.write_ram(addr, val),
            _ => {}
        }
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        match &mut self.mapper {
            Mapper::None => {}
            Mapper::Mbc1 {
                bank_lo,
                bank_hi,
                mode,
                ram_enabled,
                ..
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    // A zero in the 5-bit field always bumps to 1, so banks
                    // 0x00/0x20/0x40/0x60 cannot be selected through it.
                    let mut bank = val & 0x1F;
                    if bank == 0 {
                        bank = 1;
                    }
                    *bank_lo = bank;
                }
                0x4000..=0x5FFF => *bank_hi = val & 0x03,
                0x6000..=0x7FFF => *mode = val & 0x01,
                _ => unreachable!(),
            },
            Mapper::Mbc2 {
                rom_bank,
                ram_enabled,
            } => {
                if addr <= 0x3FFF {
                    // Address bit 8 picks the register: clear = RAM gate,
                    // set = ROM bank.
                    if addr & 0x0100 == 0 {
                        *ram_enabled = val & 0x0F == 0x0A;
                    } else {
                        *rom_bank = val & 0x0F;
                        if *rom_bank == 0 {
                            *rom_bank = 1;
                        }
                    }
                }
            }
            Mapper::Mbc3 {
                rom_bank,
                ram_bank,
                ram_enabled,
                rtc,
                latch_armed,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    *rom_bank = val & 0x7F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
                0x4000..=0x5FFF => *ram_bank = val & 0x0F,
                0x6000..=0x7FFF => {
                    // A 0x00 then 0x01 sequence copies the live registers
                    // into the latch.
                    if val == 0x00 {
                        *latch_armed = true;
                    } else {
                        if val == 0x01 && *latch_armed {
                            rtc.latch();
                        }
                        *latch_armed = false;
                    }
                }
                _ => unreachable!(),
            },
            Mapper::Mbc5 {
                rom_bank,
                ram_bank,
                ram_enabled,
                rumble,
            } => match addr {
                0x0000..=0x1FFF => *ram_enabled = val & 0x0F == 0x0A,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x100) | val as u16,
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8),
                0x4000..=0x5FFF => {
                    // Rumble carts wire bit 3 to the motor instead of RAM.
                    *ram_bank = if *rumble { val & 0x07 } else { val & 0x0F };
                }
                _ => {}
            },
        }
    }

    fn write_ram(&mut self, addr: u16, val: u8) {
        match &mut self.mapper {
            Mapper::None => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            Mapper::Mbc1 {
                ram_enabled: false, ..
            }
            | Mapper::Mbc2 {
                ram_enabled: false, ..
            }
            | Mapper::Mbc3 {
                ram_enabled: false, ..
            }
            | Mapper::Mbc5 {
                ram_enabled: false, ..
            } => {}
            Mapper::Mbc1 { mode, bank_hi, .. } => {
                let bank = if *mode == 1 { *bank_hi as usize } else { 0 };
                self.banked_ram_write(bank, addr, val);
            }
            Mapper::Mbc2 { .. } => {
                let idx = (addr as usize - 0xA000) & 0x1FF;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val & 0x0F;
                }
            }
            Mapper::Mbc3 { ram_bank, .. } => {
                let bank = *ram_bank;
                match bank {
                    0x00..=0x07 => self.banked_ram_write(bank as usize, addr, val),
                    0x08..=0x0C => {
                        if let Mapper::Mbc3 { rtc, .. } = &mut self.mapper {
                            rtc.write(bank, val);
                        }
                    }
                    _ => {}
                }
            }
            Mapper::Mbc5 { ram_bank, .. } => {
                let bank = *ram_bank as usize;
                self.banked_ram_write(bank, addr, val);
            }
        }
    }
}

struct Header<'a>(&'a [u8]);

impl<'a> Header<'a> {
    fn title(&self) -> String {
        let end = 0x0143.min(self.0.len());
        let start = 0x0134.min(end);
        let mut slice = &self.0[start..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cgb_supported(&self) -> bool {
        self.0.get(0x0143).copied().unwrap_or(0) & 0x80 != 0
    }

    fn cart_type(&self) -> u8 {
        self.0.get(0x0147).copied().unwrap_or(0)
    }

    fn mapper_kind(&self, force_multicart: bool) -> MapperKind {
        match self.cart_type() {
            0x01..=0x03 => {
                if force_multicart {
                    MapperKind::Mbc1Multi
                } else {
                    MapperKind::Mbc1
                }
            }
            0x05 | 0x06 => MapperKind::Mbc2,
            0x0F..=0x13 => MapperKind::Mbc3,
            0x19..=0x1E => MapperKind::Mbc5,
            other => {
                if other != 0x00 && other != 0x08 && other != 0x09 {
                    log::warn!(
                        target: "chroma_core::cartridge",
                        "unknown cartridge type {other:#04X}; treating as ROM-only"
                    );
                }
                MapperKind::None
            }
        }
    }

    fn has_battery(&self) -> bool {
        matches!(
            self.cart_type(),
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    fn has_rumble(&self) -> bool {
        matches!(self.cart_type(), 0x1C | 0x1D | 0x1E)
    }

    fn ram_size(&self) -> usize {
        // MBC2 carries its own 512-nibble array regardless of the header.
        if matches!(self.cart_type(), 0x05 | 0x06) {
            return 0x200;
        }
        match self.0.get(0x0149).copied().unwrap_or(0) {
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(cart_type: u8, ram_code: u8, banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[0x0147] = cart_type;
        rom[0x0149] = ram_code;
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        rom
    }

    #[test]
    fn mbc1_zero_bank_bump() {
        let mut cart = Cartridge::new(rom_with(0x01, 0x00, 64), false);
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 1);
        cart.write(0x2000, 0x20);
        cart.write(0x4000, 0x01);
        // 5-bit field 0x20 truncates to 0, bumps to 1, high bits add 0x20.
        assert_eq!(cart.read(0x4000), 0x21);
    }

    #[test]
    fn mbc1_mode_one_maps_high_bank_at_zero() {
        let mut cart = Cartridge::new(rom_with(0x01, 0x00, 64), false);
        cart.write(0x4000, 0x01);
        assert_eq!(cart.read(0x0000), 0);
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0x0000), 0x20);
    }

    #[test]
    fn mbc2_register_select_by_address_bit_eight() {
        let mut cart = Cartridge::new(rom_with(0x06, 0x00, 16), false);
        cart.write(0x0000, 0x0A); // bit 8 clear: RAM enable
        cart.write(0x0100, 0x03); // bit 8 set: ROM bank
        assert_eq!(cart.read(0x4000), 3);

        cart.write(0xA000, 0xFF);
        assert_eq!(cart.read(0xA000), 0xFF);
        // Mirrors every 0x200 bytes and exposes only the low nibble.
        assert_eq!(cart.read(0xA200), 0xFF);
        cart.write(0xA1FF, 0x05);
        assert_eq!(cart.read(0xA3FF), 0xF5);
    }

    #[test]
    fn mbc3_rtc_shadow_latches() {
        let mut cart = Cartridge::new(rom_with(0x10, 0x03, 16), false);
        cart.write(0x0000, 0x0A);
        cart.write(0x4000, 0x08); // seconds register
        cart.write(0xA000, 30);
        // Latch the live registers.
        cart.write(0x6000, 0x00);
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0xA000), 30);

        // Further writes modify the live register; the latch holds.
        cart.write(0xA000, 45);
        cart.write(0x6000, 0x00);
        cart.write(0x6000, 0x01);
        assert_eq!(cart.read(0xA000), 45);
    }

    #[test]
    fn mbc5_nine_bit_bank_and_bank_zero() {
        let mut cart = Cartridge::new(rom_with(0x19, 0x00, 0x200), false);
        cart.write(0x2000, 0x34);
        cart.write(0x3000, 0x01);
        assert_eq!(cart.read(0x4000), 0x34); // bank 0x134 % 0x200, low byte marker
        // Unlike MBC1/3, bank 0 is selectable in the switchable window.
        cart.write(0x2000, 0x00);
        cart.write(0x3000, 0x00);
        assert_eq!(cart.read(0x4000), 0);
    }

    #[test]
    fn disabled_ram_reads_open_bus() {
        let mut cart = Cartridge::new(rom_with(0x03, 0x02, 4), false);
        cart.write(0xA000, 0x55);
        assert_eq!(cart.read(0xA000), 0xFF);
        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0x55);
        assert_eq!(cart.read(0xA000), 0x55);
    }
}
