/// ARM7TDMI processor modes, encoded in CPSR bits 4-0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    User = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Supervisor = 0x13,
    Abort = 0x17,
    Undefined = 0x1B,
    System = 0x1F,
}

impl Mode {
    pub fn from_bits(bits: u32) -> Mode {
        match bits & 0x1F {
            0x10 => Mode::User,
            0x11 => Mode::Fiq,
            0x12 => Mode::Irq,
            0x13 => Mode::Supervisor,
            0x17 => Mode::Abort,
            0x1B => Mode::Undefined,
            0x1F => Mode::System,
            other => {
                // The BIOS occasionally leaves junk in SPSR mode bits.
                log::warn!(
                    target: "chroma_core::gba",
                    "invalid mode bits {other:#07b}, treating as System"
                );
                Mode::System
            }
        }
    }

    /// Index into the banked r13/r14/SPSR arrays. User and System share a
    /// bank; the five exception modes each get their own.
    pub fn bank(self) -> usize {
        match self {
            Mode::User | Mode::System => 0,
            Mode::Fiq => 1,
            Mode::Irq => 2,
            Mode::Supervisor => 3,
            Mode::Abort => 4,
            Mode::Undefined => 5,
        }
    }

    pub fn has_spsr(self) -> bool {
        !matches!(self, Mode::User | Mode::System)
    }

    pub fn is_privileged(self) -> bool {
        self != Mode::User
    }
}

const N: u32 = 1 << 31;
const Z: u32 = 1 << 30;
const C: u32 = 1 << 29;
const V: u32 = 1 << 28;
const IRQ_DISABLE: u32 = 1 << 7;
const FIQ_DISABLE: u32 = 1 << 6;
const THUMB: u32 = 1 << 5;

/// Program status register (CPSR or a banked SPSR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Psr(pub u32);

impl Psr {
    pub fn new(mode: Mode) -> Self {
        Psr(IRQ_DISABLE | FIQ_DISABLE | mode as u32)
    }

    pub fn negative(self) -> bool {
        self.0 & N != 0
    }

    pub fn zero(self) -> bool {
        self.0 & Z != 0
    }

    pub fn carry(self) -> bool {
        self.0 & C != 0
    }

    pub fn overflow(self) -> bool {
        self.0 & V != 0
    }

    pub fn thumb(self) -> bool {
        self.0 & THUMB != 0
    }

    pub fn irq_disabled(self) -> bool {
        self.0 & IRQ_DISABLE != 0
    }

    pub fn mode(self) -> Mode {
        Mode::from_bits(self.0)
    }

    fn set(&mut self, mask: u32, value: bool) {
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    pub fn set_negative(&mut self, value: bool) {
        self.set(N, value);
    }

    pub fn set_zero(&mut self, value: bool) {
        self.set(Z, value);
    }

    pub fn set_carry(&mut self, value: bool) {
        self.set(C, value);
    }

    pub fn set_overflow(&mut self, value: bool) {
        self.set(V, value);
    }

    pub fn set_thumb(&mut self, value: bool) {
        self.set(THUMB, value);
    }

    pub fn set_irq_disabled(&mut self, value: bool) {
        self.set(IRQ_DISABLE, value);
    }

    pub fn set_fiq_disabled(&mut self, value: bool) {
        self.set(FIQ_DISABLE, value);
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.0 = (self.0 & !0x1F) | mode as u32;
    }

    /// Set N and Z from a 32-bit result.
    pub fn set_nz(&mut self, result: u32) {
        self.set_negative(result & 0x8000_0000 != 0);
        self.set_zero(result == 0);
    }

    /// Evaluate a 4-bit condition field against the flags.
    pub fn passes(self, cond: u32) -> bool {
        match cond & 0x0F {
            0x0 => self.zero(),                                      // EQ
            0x1 => !self.zero(),                                     // NE
            0x2 => self.carry(),                                     // CS
            0x3 => !self.carry(),                                    // CC
            0x4 => self.negative(),                                  // MI
            0x5 => !self.negative(),                                 // PL
            0x6 => self.overflow(),                                  // VS
            0x7 => !self.overflow(),                                 // VC
            0x8 => self.carry() && !self.zero(),                     // HI
            0x9 => !self.carry() || self.zero(),                     // LS
            0xA => self.negative() == self.overflow(),               // GE
            0xB => self.negative() != self.overflow(),               // LT
            0xC => !self.zero() && self.negative() == self.overflow(), // GT
            0xD => self.zero() || self.negative() != self.overflow(), // LE
            0xE => true,                                             // AL
            _ => false,                                              // NV
        }
    }
}
