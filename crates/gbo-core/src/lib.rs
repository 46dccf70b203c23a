//! Game Boy / Game Boy Color emulation core.
//!
//! The whole machine lives in one [`GameBoy`] context. Opcode handlers and
//! memory handlers are plain function pointers that receive that context by
//! exclusive reference, and the host drives it one iteration (one video frame
//! worth of cycles) at a time through [`GameBoy::run_frame`].

#[macro_use]
mod trace;

/// Audio Processing Unit: four channel generators, frame sequencer and the
/// first-pass downsampler.
pub mod apu;

/// Host-facing audio buffering: owns the resampler and the resampled ring.
pub mod audio_output;

/// Cartridge header decoding, bank controllers and the MBC3 clock.
pub mod cartridge;

/// SM83 interpreter with function-pointer opcode tables.
pub mod cpu;

/// OAM DMA and GBC VRAM DMA.
pub mod dma;

/// Error types surfaced to the host.
pub mod error;

/// The machine context and its per-frame run loop.
pub mod gameboy;

/// Interrupt request/enable lines.
pub mod interrupt;

/// Joypad matrix.
pub mod joypad;

/// Flat memory, WRAM banks and the per-address handler tables.
pub mod memory;

/// Pixel Processing Unit: STAT mode machine and the lazy scanline renderer.
pub mod ppu;

/// Sample-rate conversion used by the audio output stage.
pub mod resampler;

/// Versioned save-state schema.
pub mod save_state;

/// Serial port (local shift register only).
pub mod serial;

/// Host persistence seam for SRAM, RTC and save states.
pub mod storage;

/// DIV/TIMA timer unit.
pub mod timer;

pub use audio_output::AudioOutput;
pub use error::{CoreError, ResampleError, SaveStateError};
pub use gameboy::{AudioSettings, CoreConfig, GameBoy};
pub use joypad::Button;
pub use storage::{MemoryStore, SaveStore};

/// Base clock of the DMG/CGB in single-speed mode.
pub const CYCLES_PER_SECOND: u32 = 4_194_304;

/// Cycles in one video frame (154 scanlines of 456 cycles).
pub const CYCLES_PER_FRAME: u32 = 70_224;
