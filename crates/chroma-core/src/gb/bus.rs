use crate::gb::apu::Apu;
use crate::gb::cartridge::Cartridge;
use crate::gb::joypad::Joypad;
use crate::gb::ppu::Ppu;
use crate::gb::serial::Serial;
use crate::gb::timer::Timer;

const WRAM_BANK_SIZE: usize = 0x1000;

/// OAM DMA engine states. The external bus is blocked from the moment the
/// first source byte is fetched until the engine returns to `Inactive`; a
/// restart rolls back to `RegWritten` without ever unblocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OamDma {
    Inactive,
    /// FF46 written this cycle; the engine arms next cycle.
    RegWritten { src: u16 },
    /// First source byte is being fetched; nothing written yet.
    Starting { src: u16 },
    /// One byte per machine cycle: fetch `index`, store `index - 1`.
    Active { src: u16, index: u8, latch: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VramDmaMode {
    General,
    Hblank,
}

struct VramDma {
    src: u16,
    dst: u16,
    blocks: u8,
    mode: VramDmaMode,
    active: bool,
    cancelled: bool,
}

/// The system bus: owner of every memory region and peripheral. Each CPU
/// access lands here, and each access charges one machine cycle that drives
/// the whole machine forward.
pub struct Bus {
    pub wram: [[u8; WRAM_BANK_SIZE]; 8],
    pub wram_bank: usize,
    pub hram: [u8; 0x7F],
    pub cart: Option<Cartridge>,
    pub if_reg: u8,
    pub ie_reg: u8,
    /// Set when software stored to IF this machine cycle; a timer reload on
    /// the same cycle defers to the written value. Cleared by `tick`.
    pub if_written_this_cycle: bool,

    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub serial: Serial,
    pub joypad: Joypad,

    oam_dma: OamDma,
    /// High while the external bus belongs to the OAM DMA engine.
    dma_bus_blocked: bool,
    dma_reg: u8,

    vram_dma: VramDma,
    /// Remaining machine cycles the CPU owes for a general-purpose VRAM DMA.
    gdma_stall: u32,

    pub key1: u8,
    rp: u8,
    cgb_mode: bool,
}

impl Bus {
    pub fn new(cgb: bool, dmg_compat: bool, filter: crate::AudioFilter) -> Self {
        Self {
            wram: [[0; WRAM_BANK_SIZE]; 8],
            wram_bank: 1,
            hram: [0; 0x7F],
            cart: None,
            if_reg: 0xE1,
            ie_reg: 0,
            if_written_this_cycle: false,
            ppu: Ppu::new(cgb, dmg_compat),
            apu: Apu::new(filter),
            timer: Timer::new(),
            serial: Serial::new(cgb),
            joypad: Joypad::new(),
            oam_dma: OamDma::Inactive,
            dma_bus_blocked: false,
            dma_reg: 0xFF,
            vram_dma: VramDma {
                src: 0,
                dst: 0x8000,
                blocks: 0,
                mode: VramDmaMode::General,
                active: false,
                cancelled: false,
            },
            gdma_stall: 0,
            key1: if cgb { 0x7E } else { 0 },
            rp: 0,
            cgb_mode: cgb,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb_mode
    }

    pub fn double_speed(&self) -> bool {
        self.key1 & 0x80 != 0
    }

    /// True while the OAM DMA engine owns the external bus.
    pub fn dma_blocking(&self) -> bool {
        self.dma_bus_blocked
    }

    pub fn gdma_active(&self) -> bool {
        self.gdma_stall > 0
    }

    pub fn consume_gdma_stall(&mut self, m_cycles: u32) {
        self.gdma_stall = self.gdma_stall.saturating_sub(m_cycles);
    }

    /// Advance every peripheral by `m_cycles` machine cycles. Called by the
    /// CPU once per memory access or internal cycle; the fixed order below
    /// decides which peripheral wins same-cycle IF conflicts.
    pub fn tick(&mut self, m_cycles: u8) {
        self.tick_inner(m_cycles, true);
    }

    /// STOP-mode variant: the divider is frozen, the rest keeps running.
    pub fn tick_stopped(&mut self, m_cycles: u8) {
        self.tick_inner(m_cycles, false);
    }

    fn tick_inner(&mut self, m_cycles: u8, timer_running: bool) {
        let cpu_cycles = 4 * m_cycles as u16;
        let (dots, apu_cycles) = if self.double_speed() {
            (2 * m_cycles as u16, m_cycles as u16)
        } else {
            (4 * m_cycles as u16, 2 * m_cycles as u16)
        };

        let if_written = self.if_written_this_cycle;
        if timer_running {
            self.timer.step(cpu_cycles, &mut self.if_reg, if_written);
        }
        self.serial.step(cpu_cycles, &mut self.if_reg);
        if self.ppu.step(dots, &mut self.if_reg) {
            self.hdma_hblank_transfer();
        }
        self.apu.step(apu_cycles);
        self.step_oam_dma(m_cycles);

        self.if_written_this_cycle = false;
    }

    fn step_oam_dma(&mut self, m_cycles: u8) {
        for _ in 0..m_cycles {
            match self.oam_dma {
                OamDma::Inactive => {}
                OamDma::RegWritten { src } => {
                    self.oam_dma = OamDma::Starting { src };
                }
                OamDma::Starting { src } => {
                    // First source byte is fetched; the write waits a cycle,
                    // and the external bus belongs to the engine from here.
                    let latch = self.dma_read(src);
                    self.dma_bus_blocked = true;
                    self.oam_dma = OamDma::Active {
                        src,
                        index: 0,
                        latch,
                    };
                }
                OamDma::Active { src, index, latch } => {
                    self.ppu.oam[index as usize] = latch;
                    if index as usize == 0x9F {
                        self.oam_dma = OamDma::Inactive;
                        self.dma_bus_blocked = false;
                    } else {
                        let next = index + 1;
                        let byte = self.dma_read(src.wrapping_add(next as u16));
                        self.oam_dma = OamDma::Active {
                            src,
                            index: next,
                            latch: byte,
                        };
                    }
                }
            }
        }
    }

    /// DMA-engine source read: bypasses bus blocking, and the region above
    /// 0xDFFF folds back onto WRAM.
    fn dma_read(&mut self, addr: u16) -> u8 {
        let addr = if addr >= 0xE000 {
            addr.wrapping_sub(0x2000)
        } else {
            addr
        };
        self.read_unblocked(addr)
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        if self.dma_bus_blocked && !matches!(addr, 0xFF00..=0xFFFF) {
            return 0xFF;
        }
        self.read_unblocked(addr)
    }

    fn read_unblocked(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[self.ppu.vram_bank][(addr - 0x8000) as usize]
                } else {
                    0xFF
                }
            }
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize],
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize],
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize],
            0xF000..=0xFDFF => self.wram[self.wram_bank][(addr - 0xF000) as usize],
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize]
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0x00,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
        }
    }

    fn read_io(&mut self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => self.ppu.read_reg(addr),
            0xFF46 => self.dma_reg,
            0xFF4D => {
                if self.cgb_mode {
                    (self.key1 & 0x81) | 0x7E
                } else {
                    0xFF
                }
            }
            0xFF4F => {
                if self.cgb_mode {
                    self.ppu.vram_bank as u8 | 0xFE
                } else {
                    0xFF
                }
            }
            0xFF51 => {
                if self.cgb_mode {
                    (self.vram_dma.src >> 8) as u8
                } else {
                    0xFF
                }
            }
            0xFF52 => {
                if self.cgb_mode {
                    (self.vram_dma.src & 0xF0) as u8
                } else {
                    0xFF
                }
            }
            0xFF53 => {
                if self.cgb_mode {
                    ((self.vram_dma.dst >> 8) & 0x1F) as u8
                } else {
                    0xFF
                }
            }
            0xFF54 => {
                if self.cgb_mode {
                    (self.vram_dma.dst & 0xF0) as u8
                } else {
                    0xFF
                }
            }
            0xFF55 => self.read_hdma_status(),
            0xFF56 => {
                if self.cgb_mode {
                    self.rp | 0x3E
                } else {
                    0xFF
                }
            }
            0xFF68..=0xFF6C => self.ppu.read_reg(addr),
            0xFF70 => {
                if self.cgb_mode {
                    self.wram_bank as u8 | 0xF8
                } else {
                    0xFF
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        if self.dma_bus_blocked && !matches!(addr, 0xFF00..=0xFFFF) {
            return;
        }
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.vram[self.ppu.vram_bank][(addr - 0x8000) as usize] = val;
                }
            }
            0xC000..=0xCFFF => self.wram[0][(addr - 0xC000) as usize] = val,
            0xD000..=0xDFFF => self.wram[self.wram_bank][(addr - 0xD000) as usize] = val,
            0xE000..=0xEFFF => self.wram[0][(addr - 0xE000) as usize] = val,
            0xF000..=0xFDFF => self.wram[self.wram_bank][(addr - 0xF000) as usize] = val,
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() {
                    self.ppu.oam[(addr - 0xFE00) as usize] = val;
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.joypad.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => {
                let if_written = self.if_written_this_cycle;
                self.timer.write(addr, val, &mut self.if_reg, if_written);
            }
            0xFF0F => {
                self.if_reg = (val & 0x1F) | (self.if_reg & 0xE0);
                self.if_written_this_cycle = true;
            }
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => {
                let lcd_was_on = self.ppu.lcd_enabled();
                self.ppu.write_reg(addr, val, &mut self.if_reg);
                if addr == 0xFF40 && lcd_was_on && !self.ppu.lcd_enabled() {
                    // An H-blank DMA cannot outlive the display.
                    self.finish_pending_hdma();
                }
            }
            0xFF46 => {
                self.dma_reg = val;
                // A restart from Starting/Active rolls back to RegWritten
                // without visiting Inactive, so `dma_bus_blocked` survives.
                self.oam_dma = OamDma::RegWritten {
                    src: (val as u16) << 8,
                };
            }
            0xFF4D => {
                if self.cgb_mode {
                    self.key1 = (self.key1 & 0x80) | (val & 0x01);
                }
            }
            0xFF4F => {
                if self.cgb_mode {
                    self.ppu.vram_bank = (val & 0x01) as usize;
                }
            }
            0xFF51 => {
                if self.cgb_mode && !self.vram_dma.active {
                    self.vram_dma.src = ((val as u16) << 8) | (self.vram_dma.src & 0x00FF);
                }
            }
            0xFF52 => {
                if self.cgb_mode && !self.vram_dma.active {
                    self.vram_dma.src = (self.vram_dma.src & 0xFF00) | (val & 0xF0) as u16;
                }
            }
            0xFF53 => {
                if self.cgb_mode && !self.vram_dma.active {
                    self.vram_dma.dst =
                        Self::vram_dma_dest((((val & 0x1F) as u16) << 8) | (self.vram_dma.dst & 0xF0));
                }
            }
            0xFF54 => {
                if self.cgb_mode && !self.vram_dma.active {
                    self.vram_dma.dst =
                        Self::vram_dma_dest((self.vram_dma.dst & 0x1F00) | (val & 0xF0) as u16);
                }
            }
            0xFF55 => self.write_hdma_control(val),
            0xFF56 => {
                if self.cgb_mode {
                    self.rp = val & 0xC1;
                }
            }
            0xFF68..=0xFF6C => self.ppu.write_reg(addr, val, &mut self.if_reg),
            0xFF70 => {
                if self.cgb_mode {
                    let bank = (val & 0x07) as usize;
                    self.wram_bank = if bank == 0 { 1 } else { bank };
                }
            }
            _ => {}
        }
    }

    #[inline]
    fn vram_dma_dest(raw: u16) -> u16 {
        0x8000 | (raw & 0x1FF0)
    }

    fn read_hdma_status(&self) -> u8 {
        if !self.cgb_mode {
            0xFF
        } else if self.vram_dma.active {
            self.vram_dma.blocks.saturating_sub(1) & 0x7F
        } else if self.vram_dma.cancelled {
            0x80
        } else {
            0xFF
        }
    }

    fn write_hdma_control(&mut self, val: u8) {
        if !self.cgb_mode {
            return;
        }
        let blocks = (val & 0x7F) + 1;
        if self.vram_dma.active && val & 0x80 == 0 {
            self.vram_dma.active = false;
            self.vram_dma.blocks = 0;
            self.vram_dma.cancelled = true;
        } else if val & 0x80 == 0 {
            self.run_gdma(blocks);
        } else {
            self.vram_dma.mode = VramDmaMode::Hblank;
            self.vram_dma.blocks = blocks;
            self.vram_dma.active = true;
            self.vram_dma.cancelled = false;
            if !self.ppu.lcd_enabled() || self.ppu.in_hblank() {
                self.hdma_hblank_transfer();
            }
        }
    }

    fn run_gdma(&mut self, blocks: u8) {
        self.vram_dma.mode = VramDmaMode::General;
        self.vram_dma.blocks = blocks;
        self.vram_dma.active = true;
        self.vram_dma.cancelled = false;
        for _ in 0..blocks {
            self.copy_vram_dma_block();
        }
        self.vram_dma.active = false;
    }

    /// Move one 16-byte block during H-blank if an H-blank DMA is armed.
    pub fn hdma_hblank_transfer(&mut self) {
        if self.vram_dma.active && self.vram_dma.mode == VramDmaMode::Hblank {
            self.copy_vram_dma_block();
            if self.vram_dma.blocks == 0 {
                self.vram_dma.active = false;
                self.vram_dma.cancelled = false;
            }
        }
    }

    fn finish_pending_hdma(&mut self) {
        while self.vram_dma.active && self.vram_dma.mode == VramDmaMode::Hblank {
            self.copy_vram_dma_block();
            if self.vram_dma.blocks == 0 {
                self.vram_dma.active = false;
            }
        }
    }

    fn copy_vram_dma_block(&mut self) {
        self.vram_dma.dst = Self::vram_dma_dest(self.vram_dma.dst);
        for _ in 0..0x10 {
            let byte = self.dma_read(self.vram_dma.src);
            let dst = self.vram_dma.dst;
            if self.ppu.vram_accessible() {
                self.ppu.vram[self.ppu.vram_bank][(dst - 0x8000) as usize] = byte;
            }
            self.vram_dma.src = self.vram_dma.src.wrapping_add(1);
            self.vram_dma.dst = 0x8000 | ((dst.wrapping_add(1)) & 0x1FFF);
        }
        self.vram_dma.blocks = self.vram_dma.blocks.saturating_sub(1);
        // Each block charges the CPU, double in double-speed mode.
        self.gdma_stall += if self.double_speed() { 16 } else { 8 };
    }

    pub fn save_cart_ram(&mut self) {
        if let Some(cart) = &self.cart {
            if let Err(e) = cart.save_ram() {
                log::warn!(target: "chroma_core::bus", "failed to save cartridge RAM: {e}");
            }
        }
    }
}
