use serde::{Deserialize, Serialize};

/// The five interrupt lines in priority order (bit 0 is served first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    LcdStat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    pub const fn mask(self) -> u8 {
        1 << self as u8
    }

    /// Fixed dispatch address: `0x40 + 8 * bit`.
    pub const fn vector(self) -> u16 {
        0x40 + 8 * self as u16
    }
}

/// IE (0xFFFF) and IF (0xFF0F).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interrupts {
    pub enabled: u8,
    pub requested: u8,
}

impl Interrupts {
    pub fn request(&mut self, interrupt: Interrupt) {
        self.requested |= interrupt.mask();
    }

    /// Lines that are both requested and enabled.
    pub fn pending(&self) -> u8 {
        self.enabled & self.requested & 0x1F
    }

    /// Highest priority pending line, if any.
    pub fn highest_pending(&self) -> Option<Interrupt> {
        let pending = self.pending();
        Interrupt::ALL
            .into_iter()
            .find(|line| pending & line.mask() != 0)
    }

    pub fn acknowledge(&mut self, interrupt: Interrupt) {
        self.requested &= !interrupt.mask();
    }

    pub fn read_if(&self) -> u8 {
        self.requested | 0xE0
    }

    pub fn write_if(&mut self, value: u8) {
        self.requested = value & 0x1F;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_bit_wins() {
        let mut irq = Interrupts {
            enabled: 0x1F,
            requested: 0,
        };
        irq.request(Interrupt::Serial);
        irq.request(Interrupt::LcdStat);
        assert_eq!(irq.highest_pending(), Some(Interrupt::LcdStat));
        assert_eq!(Interrupt::LcdStat.vector(), 0x48);
        assert_eq!(Interrupt::Joypad.vector(), 0x60);
    }

    #[test]
    fn disabled_lines_do_not_pend() {
        let mut irq = Interrupts {
            enabled: Interrupt::Timer.mask(),
            requested: 0,
        };
        irq.request(Interrupt::VBlank);
        assert_eq!(irq.highest_pending(), None, "v-blank is not enabled");
        assert_eq!(irq.read_if(), 0xE1, "upper IF bits read as set");
    }
}
