//! Joypad register (0xFF00). The eight buttons sit on a 2x4 matrix: the
//! CPU grounds row P14 (directions) or P15 (buttons) via bits 4..5 and
//! reads the selected row, active-low, in bits 3..0.

use bitflags::bitflags;

bitflags! {
    /// Button bits as delivered by the frontend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Button: u8 {
        const A = 0x01;
        const B = 0x02;
        const SELECT = 0x04;
        const START = 0x08;
        const RIGHT = 0x10;
        const LEFT = 0x20;
        const UP = 0x40;
        const DOWN = 0x80;

        const BUTTONS = Self::A.bits() | Self::B.bits() | Self::SELECT.bits() | Self::START.bits();
        const DIRECTIONS = Self::RIGHT.bits() | Self::LEFT.bits() | Self::UP.bits() | Self::DOWN.bits();
    }
}

pub struct Joypad {
    /// Register byte: bit 5 = P15 select, bit 4 = P14 select, both
    /// active-low. Low bits are derived from `state` on read.
    reg: u8,
    state: Button,
    irq_pending: bool,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            reg: 0x3F,
            state: Button::empty(),
            irq_pending: false,
        }
    }

    /// Read the selected row, inverted (pressed = 0). With no row selected
    /// the low nibble floats high.
    pub fn read(&self) -> u8 {
        if self.directions_selected() {
            return self.reg & !(self.state.bits() >> 4);
        }
        if self.buttons_selected() {
            return self.reg & !(self.state.bits() & 0x0F);
        }
        self.reg | 0x0F
    }

    /// Only the row-select bits are writable.
    pub fn write(&mut self, value: u8) {
        self.reg = (self.reg & 0xCF) | (value & 0x30);
    }

    /// Press a button. A fresh press on a line of the currently selected
    /// row latches a joypad interrupt for the driver to pick up.
    pub fn press(&mut self, button: Button) {
        let on_selected_row = (self.directions_selected()
            && button.intersects(Button::DIRECTIONS))
            || (self.buttons_selected() && button.intersects(Button::BUTTONS));
        if on_selected_row && !self.state.contains(button) {
            self.irq_pending = true;
        }
        self.state.insert(button);
    }

    pub fn release(&mut self, button: Button) {
        self.state.remove(button);
    }

    /// Take the latched press-edge interrupt, clearing it.
    pub fn take_irq(&mut self) -> bool {
        std::mem::take(&mut self.irq_pending)
    }

    fn directions_selected(&self) -> bool {
        self.reg & 0x10 == 0
    }

    fn buttons_selected(&self) -> bool {
        self.reg & 0x20 == 0
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}
