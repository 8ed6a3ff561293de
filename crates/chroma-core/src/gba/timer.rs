/// The four cascade-capable timers. Each counts up at a prescaled rate (or
/// on the previous timer's overflow), reloads on overflow, and can raise an
/// interrupt. Timers 0 and 1 clock the direct-sound FIFOs.
pub struct Timers {
    channels: [Timer; 4],
}

#[derive(Default, Clone, Copy)]
struct Timer {
    counter: u16,
    reload: u16,
    control: u16,
    /// Prescaler remainder cycles not yet consumed.
    prescale_acc: u32,
}

const PRESCALE: [u32; 4] = [1, 64, 256, 1024];

const TIMER_IRQ_BASE: u16 = 0x0008;

impl Timer {
    fn enabled(&self) -> bool {
        self.control & 0x0080 != 0
    }

    fn cascaded(&self) -> bool {
        self.control & 0x0004 != 0
    }

    fn irq_enabled(&self) -> bool {
        self.control & 0x0040 != 0
    }

    fn prescale(&self) -> u32 {
        PRESCALE[(self.control & 0x03) as usize]
    }

    /// Count `ticks` increments; returns how many times the timer wrapped.
    fn count(&mut self, ticks: u32) -> u32 {
        let mut overflows = 0;
        let mut remaining = ticks;
        while remaining > 0 {
            let until_wrap = 0x1_0000 - self.counter as u32;
            if remaining >= until_wrap {
                remaining -= until_wrap;
                self.counter = self.reload;
                overflows += 1;
            } else {
                self.counter += remaining as u16;
                remaining = 0;
            }
        }
        overflows
    }
}

impl Timers {
    pub fn new() -> Self {
        Self {
            channels: [Timer::default(); 4],
        }
    }

    /// Advance all four timers by `cycles` and report per-timer overflow
    /// counts (the APU watches timers 0/1 for FIFO pacing).
    pub fn step(&mut self, cycles: u32, if_reg: &mut u16) -> [u32; 4] {
        let mut overflows = [0u32; 4];
        for i in 0..4 {
            let timer = &mut self.channels[i];
            if !timer.enabled() {
                continue;
            }

            let ticks = if timer.cascaded() {
                if i == 0 {
                    // Cascade on timer 0 has nothing upstream; it never ticks.
                    0
                } else {
                    overflows[i - 1]
                }
            } else {
                timer.prescale_acc += cycles;
                let ticks = timer.prescale_acc / timer.prescale();
                timer.prescale_acc %= timer.prescale();
                ticks
            };

            if ticks > 0 {
                overflows[i] = self.channels[i].count(ticks);
                if overflows[i] > 0 && self.channels[i].irq_enabled() {
                    *if_reg |= TIMER_IRQ_BASE << i;
                }
            }
        }
        overflows
    }

    pub fn read16(&self, offset: u32) -> u16 {
        let i = (offset as usize >> 2) & 0x3;
        if offset & 0x2 == 0 {
            self.channels[i].counter
        } else {
            self.channels[i].control
        }
    }

    pub fn write16(&mut self, offset: u32, val: u16) {
        let i = (offset as usize >> 2) & 0x3;
        if offset & 0x2 == 0 {
            // Writes land in the reload register, not the live counter.
            self.channels[i].reload = val;
        } else {
            let was_enabled = self.channels[i].enabled();
            self.channels[i].control = val & 0x00C7;
            if !was_enabled && self.channels[i].enabled() {
                self.channels[i].counter = self.channels[i].reload;
                self.channels[i].prescale_acc = 0;
            }
        }
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prescaled_count_and_overflow_irq() {
        let mut timers = Timers::new();
        let mut if_reg = 0u16;
        timers.write16(0x0, 0xFFFE); // reload
        timers.write16(0x2, 0x00C0); // enable, irq, prescale 1
        // Counter starts at the reload value on the enable edge.
        assert_eq!(timers.read16(0x0), 0xFFFE);

        timers.step(2, &mut if_reg);
        assert_eq!(if_reg & 0x0008, 0x0008);
        assert_eq!(timers.read16(0x0), 0xFFFE);
    }

    #[test]
    fn cascade_ticks_on_upstream_overflow() {
        let mut timers = Timers::new();
        let mut if_reg = 0u16;
        timers.write16(0x0, 0xFFFF);
        timers.write16(0x2, 0x0080); // timer 0: every cycle
        timers.write16(0x4, 0x0000);
        timers.write16(0x6, 0x0084); // timer 1: cascade

        timers.step(3, &mut if_reg);
        // Timer 0 wrapped three times; timer 1 counted three.
        assert_eq!(timers.read16(0x4), 3);
    }
}
