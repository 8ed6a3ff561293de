/// Direct-sound FIFOs and PSG mixing.
pub mod apu;
/// Region map, wait states and IO registers.
pub mod bus;
/// ARM7TDMI core.
pub mod cpu;
/// DMA channel state.
pub mod dma;
/// KEYINPUT/KEYCNT.
pub mod keypad;
/// LCD controller.
pub mod lcd;
/// Cascade timers.
pub mod timer;

use std::io;
use std::path::{Path, PathBuf};

use crate::audio_queue::SampleProducer;
use crate::Button;
use bus::AgbBus;
use cpu::Arm7;
use lcd::{AGB_HEIGHT, AGB_WIDTH};

/// System cycles per frame: 228 lines of 1232 cycles.
pub const CYCLES_PER_FRAME: u64 = 280_896;

/// An AGB machine: ARM7TDMI plus the bus-owned peripherals.
pub struct Advance {
    pub cpu: Arm7,
    pub bus: AgbBus,
    cycle_debt: i64,
    save_path: Option<PathBuf>,
}

impl Advance {
    /// Build from a ROM image and an optional 16 KiB BIOS. Without a BIOS,
    /// execution starts at the cart entry point with BIOS state faked.
    pub fn new(rom: Vec<u8>, bios: Option<Vec<u8>>) -> Self {
        let skip_bios = bios.is_none();
        Self {
            cpu: Arm7::new(skip_bios),
            bus: AgbBus::new(bios.unwrap_or_else(|| vec![0; crate::AGB_BIOS_SIZE]), rom),
            cycle_debt: 0,
            save_path: None,
        }
    }

    /// Attach a `.sav` path and pull in an existing flat SRAM image.
    pub fn attach_save<P: AsRef<Path>>(&mut self, rom_path: P) {
        let mut save = PathBuf::from(rom_path.as_ref());
        save.set_extension("sav");
        match std::fs::read(&save) {
            Ok(bytes) if bytes.len() == self.bus.sram.len() => {
                self.bus.sram.copy_from_slice(&bytes);
            }
            Ok(bytes) => {
                log::warn!(
                    target: "chroma_core::gba",
                    "save file {} has size {} (expected {}); starting with cleared SRAM",
                    save.display(),
                    bytes.len(),
                    self.bus.sram.len()
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn!(
                    target: "chroma_core::gba",
                    "could not read {}: {e}; starting with cleared SRAM",
                    save.display()
                );
            }
        }
        self.save_path = Some(save);
    }

    pub fn save(&self) {
        if let Some(path) = &self.save_path {
            if let Err(e) = std::fs::write(path, &self.bus.sram) {
                log::warn!(target: "chroma_core::gba", "failed to save SRAM: {e}");
            }
        }
    }

    pub fn connect_audio(&mut self, producer: SampleProducer) {
        self.bus.audio.connect_output(producer);
    }

    /// Run one frame of system cycles, with DMA stealing the bus from the
    /// CPU and HALT burning idle cycles until an interrupt line rises.
    pub fn run_frame(&mut self) {
        let budget = CYCLES_PER_FRAME as i64 + self.cycle_debt;
        let start = self.bus.cycles;
        let mut spent = 0i64;
        while spent < budget {
            if self.bus.dma_pending() {
                self.bus.run_pending_dma();
            } else if self.bus.halted {
                self.bus.tick(1);
                if self.bus.halt_wakeup() {
                    self.bus.halted = false;
                }
            } else {
                self.cpu.step(&mut self.bus);
            }
            spent = (self.bus.cycles - start) as i64;
        }
        self.cycle_debt = budget - spent;
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.bus.keypad.set_button(button, pressed, &mut self.bus.if_reg);
    }

    pub fn frame_ready(&self) -> bool {
        self.bus.lcd.frame_ready()
    }

    pub fn swap_frame(&mut self, front: &mut Box<[u16; AGB_WIDTH * AGB_HEIGHT]>) {
        self.bus.lcd.swap_frame(front);
    }
}
