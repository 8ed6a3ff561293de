/// Audio unit: frame sequencer, channels and the host-rate resampler.
pub mod apu;
/// System bus, IO map and the DMA engines.
pub mod bus;
/// Cartridge header and mapper families.
pub mod cartridge;
/// LR35902 interpreter.
pub mod cpu;
/// Joypad matrix register.
pub mod joypad;
/// LCD controller.
pub mod ppu;
/// Serial transfer stub.
pub mod serial;
/// Divider/timer unit.
pub mod timer;

use crate::audio_queue::SampleProducer;
use crate::{AudioFilter, Button, Console, CoreError};
use bus::Bus;
use cartridge::Cartridge;
use cpu::Cpu;
use ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Master cycles per frame: 154 lines of 456 dots.
pub const CYCLES_PER_FRAME: u64 = 70_224;

/// A DMG or CGB machine wired together: CPU plus bus-owned peripherals.
pub struct GameBoy {
    pub cpu: Cpu,
    pub bus: Bus,
    /// Overshoot from the previous frame, always <= 0.
    cycle_debt: i64,
}

impl GameBoy {
    pub fn new(console: Console, cart: Cartridge, filter: AudioFilter) -> Self {
        let cgb = console == Console::Cgb;
        let dmg_compat = cgb && !cart.cgb;
        let mut bus = Bus::new(cgb, dmg_compat, filter);
        bus.load_cart(cart);
        Self {
            cpu: Cpu::new(cgb),
            bus,
            cycle_debt: 0,
        }
    }

    /// Attach the host audio queue.
    pub fn connect_audio(&mut self, producer: SampleProducer) {
        self.bus.apu.connect_output(producer);
    }

    /// Run one frame's worth of cycles, carrying overshoot into the next
    /// call so long instructions do not drift the timebase.
    pub fn run_frame(&mut self) -> Result<(), CoreError> {
        let budget = (CYCLES_PER_FRAME << self.cpu.double_speed as u32) as i64 + self.cycle_debt;
        let start = self.cpu.cycles;
        let mut spent = 0i64;
        while spent < budget {
            self.cpu.step(&mut self.bus)?;
            spent = (self.cpu.cycles - start) as i64;
        }
        self.cycle_debt = budget - spent;
        Ok(())
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.bus.joypad.set_button(button, pressed, &mut self.bus.if_reg);
    }

    pub fn frame_ready(&self) -> bool {
        self.bus.ppu.frame_ready()
    }

    /// Swap the finished frame into the host's front buffer.
    pub fn swap_frame(&mut self, front: &mut Box<[u16; SCREEN_WIDTH * SCREEN_HEIGHT]>) {
        self.bus.ppu.swap_frame(front);
    }

    pub fn save(&mut self) {
        self.bus.save_cart_ram();
    }
}
