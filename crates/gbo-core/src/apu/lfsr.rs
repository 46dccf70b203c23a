//! Precomputed noise sequences.
//!
//! Entry `volume * steps + step` holds the channel level after `step`
//! shifts from the all-ones seed, already scaled by the envelope volume.

use std::sync::LazyLock;

const LONG_STEPS: usize = 0x8000;
const SHORT_STEPS: usize = 0x80;

struct LfsrTables {
    long: Vec<u8>,
    short: Vec<u8>,
}

fn build(steps: usize, feedback_bit: u32) -> Vec<u8> {
    let mut table = vec![0u8; steps * 16];
    let mut lfsr: u32 = (1 << (feedback_bit + 1)) - 1;
    for step in 0..steps {
        let bit = (1 - (lfsr & 1)) as u8;
        for volume in 0..16usize {
            table[volume * steps + step] = bit * volume as u8;
        }
        let shifted = lfsr >> 1;
        lfsr = shifted | (((shifted ^ lfsr) & 1) << feedback_bit);
    }
    table
}

static TABLES: LazyLock<LfsrTables> = LazyLock::new(|| LfsrTables {
    long: build(LONG_STEPS, 14),
    short: build(SHORT_STEPS, 6),
});

/// Mask applied to the step counter for the selected width.
pub fn step_mask(short: bool) -> usize {
    if short { SHORT_STEPS - 1 } else { LONG_STEPS - 1 }
}

/// Noise level (0..=15) at `step` for `volume`.
#[inline]
pub fn level(short: bool, step: usize, volume: u8) -> u8 {
    let volume = (volume & 0x0F) as usize;
    if short {
        TABLES.short[volume * SHORT_STEPS + (step & (SHORT_STEPS - 1))]
    } else {
        TABLES.long[volume * LONG_STEPS + (step & (LONG_STEPS - 1))]
    }
}
