use serde::{Deserialize, Serialize};

/// Logical buttons, numbered by host key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
    A = 4,
    B = 5,
    Select = 6,
    Start = 7,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];

    /// Key codes 0..8; anything else is rejected.
    pub fn from_keycode(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let button = match name.to_ascii_lowercase().as_str() {
            "right" => Button::Right,
            "left" => Button::Left,
            "up" => Button::Up,
            "down" => Button::Down,
            "a" => Button::A,
            "b" => Button::B,
            "select" => Button::Select,
            "start" => Button::Start,
            _ => return None,
        };
        Some(button)
    }
}

/// P1/JOYP (0xFF00).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joypad {
    /// Active-low button state: low nibble directions, high nibble buttons.
    state: u8,
    /// Selection bits 4-5 as last written.
    select: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            state: 0xFF,
            select: 0x30,
        }
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.lines()
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    fn lines(&self) -> u8 {
        let directions = if self.select & 0x10 == 0 {
            self.state & 0x0F
        } else {
            0x0F
        };
        let buttons = if self.select & 0x20 == 0 {
            self.state >> 4
        } else {
            0x0F
        };
        directions & buttons
    }

    /// Fold one transition into the state. Returns true when a selected
    /// input line went from high to low.
    pub fn set(&mut self, button: Button, pressed: bool) -> bool {
        let before = self.lines();
        let bit = 1u8 << button as u8;
        if pressed {
            self.state &= !bit;
        } else {
            self.state |= bit;
        }
        before & !self.lines() != 0
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_row_reports_presses() {
        let mut pad = Joypad::new();
        pad.write(0x20); // directions
        assert!(pad.set(Button::Left, true), "left line falls");
        assert_eq!(pad.read() & 0x0F, 0x0D);
        assert!(!pad.set(Button::Start, true), "buttons row not selected");
        pad.write(0x10);
        assert_eq!(pad.read() & 0x0F, 0x07, "start reads low on the button row");
    }

    #[test]
    fn keycodes_outside_range_are_rejected() {
        assert_eq!(Button::from_keycode(7), Some(Button::Start));
        assert_eq!(Button::from_keycode(8), None);
    }
}
