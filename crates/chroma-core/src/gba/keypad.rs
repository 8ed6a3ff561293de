use crate::Button;

/// KEYINPUT/KEYCNT. Lines are active-low; KEYCNT can raise the keypad
/// interrupt when its selected set is pressed (OR) or fully held (AND).
pub struct Keypad {
    input: u16,
    control: u16,
}

const ALL_RELEASED: u16 = 0x03FF;
const KEYPAD_IRQ: u16 = 0x1000;

impl Keypad {
    pub fn new() -> Self {
        Self {
            input: ALL_RELEASED,
            control: 0,
        }
    }

    pub fn input(&self) -> u16 {
        self.input
    }

    pub fn control(&self) -> u16 {
        self.control
    }

    pub fn set_control(&mut self, val: u16, if_reg: &mut u16) {
        self.control = val & 0xC3FF;
        self.check_irq(if_reg);
    }

    pub fn set_button(&mut self, button: Button, pressed: bool, if_reg: &mut u16) {
        let bit = match button {
            Button::A => 0x0001,
            Button::B => 0x0002,
            Button::Select => 0x0004,
            Button::Start => 0x0008,
            Button::Right => 0x0010,
            Button::Left => 0x0020,
            Button::Up => 0x0040,
            Button::Down => 0x0080,
            Button::R => 0x0100,
            Button::L => 0x0200,
        };
        if pressed {
            self.input &= !bit;
        } else {
            self.input |= bit;
        }
        self.check_irq(if_reg);
    }

    fn check_irq(&self, if_reg: &mut u16) {
        if self.control & 0x4000 == 0 {
            return;
        }
        let selected = self.control & ALL_RELEASED;
        let pressed = !self.input & ALL_RELEASED;
        let hit = if self.control & 0x8000 != 0 {
            selected != 0 && pressed & selected == selected
        } else {
            pressed & selected != 0
        };
        if hit {
            *if_reg |= KEYPAD_IRQ;
        }
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}
