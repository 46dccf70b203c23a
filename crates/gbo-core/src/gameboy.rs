use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::apu::{Apu, MAX_MIX};
use crate::audio_output::AudioOutput;
use crate::cartridge::{Cartridge, CartridgeHeader};
use crate::cpu::Cpu;
use crate::dma::Dma;
use crate::error::{CoreError, ResampleError};
use crate::interrupt::{Interrupt, Interrupts};
use crate::joypad::{Button, Joypad};
use crate::memory::{HandlerTables, Memory};
use crate::ppu::{Ppu, PpuEvent};
use crate::serial::Serial;
use crate::storage::{SaveStore, rtc_key, sram_key};
use crate::timer::Timer;
use crate::{CYCLES_PER_FRAME, CYCLES_PER_SECOND};

/// Host audio buffering, in iterations' worth of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    /// Output gain, 0..=1.
    pub volume: f32,
    pub min_buffer_span: u32,
    pub max_buffer_span: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            min_buffer_span: 8,
            max_buffer_span: 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Run GBC-capable cartridges in DMG mode.
    pub force_dmg: bool,
    /// Show DMG games through the GBC compatibility palettes.
    pub colorize_dmg: bool,
    /// DMG (256 byte) or GBC (2304 byte) boot ROM image.
    pub boot_rom: Option<Vec<u8>>,
    /// Base-clock cycles per host iteration; fractions carry over.
    pub iteration_cycles: f64,
    pub audio: AudioSettings,
    /// Whether joypad presses request the joypad interrupt.
    pub joypad_interrupt: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            force_dmg: false,
            colorize_dmg: false,
            boot_rom: None,
            iteration_cycles: CYCLES_PER_FRAME as f64,
            audio: AudioSettings::default(),
            joypad_interrupt: true,
        }
    }
}

/// Per-iteration cycle budget. The budget is a multiple of four; the
/// fractional part of the configured length is carried from one iteration
/// into the next so the long-run rate does not drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationClock {
    base: u32,
    total: u32,
    roundoff: f64,
    current: f64,
    /// Base-clock cycles run so far in this iteration.
    pub(crate) ticks: u32,
}

impl IterationClock {
    pub fn new(iteration_cycles: f64) -> Self {
        let cycles = iteration_cycles.max(4.0);
        let roundoff = cycles % 4.0;
        let base = (cycles - roundoff) as u32;
        Self {
            base,
            total: base,
            roundoff,
            current: 0.0,
            ticks: 0,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.ticks)
    }

    /// Lengthen the current iteration, at most by two base iterations.
    pub fn extend(&mut self, cycles: u32) {
        self.total += (cycles & !3).min(self.base * 2);
    }

    fn end_iteration(&mut self) {
        self.ticks = self.ticks.saturating_sub(self.total);
        self.current += self.roundoff;
        let end_modulus = self.current % 4.0;
        self.total = self.base + (self.current - end_modulus) as u32;
        self.current = end_modulus;
    }
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub memory: Memory,
    pub cartridge: Cartridge,
    pub header: CartridgeHeader,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub serial: Serial,
    pub joypad: Joypad,
    pub interrupts: Interrupts,
    pub dma: Dma,
    pub(crate) handlers: HandlerTables,
    pub cgb: bool,
    pub double_speed: bool,
    pub speed_switch_armed: bool,
    pub used_boot_rom: bool,
    pub(crate) clock: IterationClock,
    pub(crate) audio: Option<AudioOutput>,
    pub(crate) config: CoreConfig,
    /// Opcode and address of an illegal instruction, once executed.
    pub(crate) fault: Option<(u8, u16)>,
}

impl GameBoy {
    /// Build a machine around `rom`, restoring battery RAM and the cartridge
    /// clock from `store` when present.
    pub fn new(rom: Vec<u8>, config: CoreConfig, store: &dyn SaveStore) -> Result<Self, CoreError> {
        let (mut cartridge, header) = Cartridge::load(rom)?;
        if cartridge.has_battery {
            if let Some(sram) = store.load(&sram_key(&header.title)) {
                debug!("restoring {} bytes of battery RAM", sram.len());
                cartridge.load_sram(&sram);
            }
        }
        if cartridge.rtc.is_some()
            && let Some(blob) = store.load(&rtc_key(&header.title))
            && !cartridge.load_rtc(&blob, unix_now())
        {
            warn!("ignoring malformed RTC data for \"{}\"", header.title);
        }

        let cgb = Self::initial_mode(&header, &config);
        let mut gb = Self {
            cpu: Cpu::default(),
            memory: Memory::new(config.boot_rom.clone()),
            cartridge,
            header,
            ppu: Ppu::new(cgb, config.colorize_dmg),
            apu: Apu::new(),
            timer: Timer::new(),
            serial: Serial::new(cgb),
            joypad: Joypad::new(),
            interrupts: Interrupts::default(),
            dma: Dma::new(),
            handlers: HandlerTables::new(),
            cgb,
            double_speed: false,
            speed_switch_armed: false,
            used_boot_rom: config.boot_rom.is_some(),
            clock: IterationClock::new(config.iteration_cycles),
            audio: None,
            config,
            fault: None,
        };
        gb.power_up();
        info!(
            "{} mode{}",
            if gb.cgb { "GBC" } else { "DMG" },
            if gb.used_boot_rom { ", running boot ROM" } else { "" }
        );
        Ok(gb)
    }

    /// GBC mode follows the boot ROM when one is supplied (a GBC boot ROM
    /// steps down for DMG cartridges later), otherwise the cartridge header.
    fn initial_mode(header: &CartridgeHeader, config: &CoreConfig) -> bool {
        if config.force_dmg {
            return false;
        }
        match &config.boot_rom {
            Some(boot) => boot.len() > 0x100,
            None => header.cgb,
        }
    }

    /// Put every component in its power-up state for the current mode.
    fn power_up(&mut self) {
        let cgb = self.cgb;
        let colorize = self.config.colorize_dmg;
        let factor = self.apu.output_factor();
        self.memory = Memory::new(self.config.boot_rom.clone());
        self.ppu = Ppu::new(cgb, colorize);
        self.serial = Serial::new(cgb);
        self.joypad = Joypad::new();
        self.interrupts = Interrupts::default();
        self.dma = Dma::new();
        self.double_speed = false;
        self.speed_switch_armed = false;
        self.clock = IterationClock::new(self.config.iteration_cycles);
        self.fault = None;

        if self.used_boot_rom {
            self.cpu = Cpu::power_on();
            self.timer = Timer::new();
            self.apu = Apu::new();
        } else {
            self.cpu = Cpu::post_boot(cgb);
            self.timer = Timer::post_boot(cgb);
            self.apu = Apu::post_boot();
            self.ppu.apply_post_boot(&mut self.interrupts);
            self.interrupts.requested = Interrupt::VBlank.mask();
        }
        if let Some(audio) = self.audio.as_mut() {
            self.apu.configure_output(factor);
            audio.reset();
        }
        self.rebuild_handlers();
    }

    /// Re-derive the whole machine from power-up, keeping the cartridge
    /// image and its battery RAM. Clears an illegal-opcode fault.
    pub fn reset(&mut self) {
        let rom = std::mem::take(&mut self.cartridge.rom);
        match Cartridge::load(rom) {
            Ok((mut fresh, _)) => {
                fresh.ram = std::mem::take(&mut self.cartridge.ram);
                fresh.rtc = self.cartridge.rtc.take();
                self.cartridge = fresh;
            }
            Err(err) => warn!("cartridge reload failed during reset: {err}"),
        }
        self.cgb = Self::initial_mode(&self.header, &self.config);
        self.power_up();
        info!("reset");
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Opcode and address of the illegal instruction that stopped the core.
    pub fn fault(&self) -> Option<(u8, u16)> {
        self.fault
    }

    fn fault_error(&self) -> Option<CoreError> {
        self.fault
            .map(|(opcode, pc)| CoreError::IllegalOpcode { opcode, pc })
    }

    /// Run one iteration's worth of cycles. Returns whether a frame was
    /// finished and is available through [`GameBoy::frame_rgb`].
    pub fn run_frame(&mut self) -> Result<bool, CoreError> {
        if let Some(err) = self.fault_error() {
            return Err(err);
        }
        self.audio_underrun_adjustment();
        while self.clock.ticks < self.clock.total {
            self.step()?;
        }
        self.end_iteration();
        Ok(self.ppu.take_frame_ready())
    }

    /// Execute one instruction (or one halted/stopped slice) and advance
    /// the rest of the machine by its cost. Returns clock cycles spent.
    pub fn step(&mut self) -> Result<u32, CoreError> {
        if let Some(err) = self.fault_error() {
            return Err(err);
        }

        let cycles = if self.cpu.stopped {
            4
        } else if self.cpu.halted && self.interrupts.pending() == 0 {
            let budget = self.clock.remaining() << self.double_speed as u32;
            let wake = self.cycles_until_wake().unwrap_or(budget);
            wake.min(budget).max(4)
        } else {
            self.cpu.halted = false;
            let cycles = self.execute();
            if let Some(err) = self.fault_error() {
                return Err(err);
            }
            cycles
        };

        let cycles = cycles + std::mem::take(&mut self.dma.stall);
        self.advance(cycles);
        Ok(cycles)
    }

    /// Advance every clocked component. Timer and serial count CPU cycles;
    /// the PPU, APU and cartridge clock count base-clock dots.
    pub(crate) fn advance(&mut self, cycles: u32) {
        self.timer.step(cycles, &mut self.interrupts);
        self.serial.step(cycles, &mut self.interrupts);

        let dots = cycles >> self.double_speed as u32;
        self.clock.ticks += dots;
        self.cartridge.step_rtc(dots);
        self.apu.queue(dots);

        let mut remaining = dots;
        while remaining > 0 {
            let chunk = remaining.min(self.ppu.dots_to_boundary().max(1));
            if let PpuEvent::HBlank = self.ppu.step(chunk, &mut self.interrupts) {
                self.hdma_hblank();
            }
            remaining -= chunk;
        }
    }

    /// Synthesise any queued audio so sound registers are observed at the
    /// right moment.
    pub(crate) fn audio_jit(&mut self) {
        self.apu.flush();
    }

    fn end_iteration(&mut self) {
        self.audio_jit();
        let samples = self.apu.drain_samples();
        if let Some(audio) = self.audio.as_mut() {
            audio.write(&samples);
        }
        self.clock.end_iteration();
    }

    /// Lengthen the coming iteration when the host buffer is running low.
    fn audio_underrun_adjustment(&mut self) {
        let Some(audio) = self.audio.as_ref() else {
            return;
        };
        let deficit = audio.deficit() as u32;
        if deficit > 0 {
            let cycles = (deficit >> 1) * self.apu.output_factor();
            debug!("audio underrun: {deficit} samples short, +{cycles} cycles");
            self.clock.extend(cycles);
        }
    }

    /// FF50: drop the boot ROM overlay. A GBC boot running a DMG cartridge
    /// steps down to compatibility mode here.
    pub(crate) fn unmap_boot_rom(&mut self) {
        self.memory.boot_mapped = false;
        if self.cgb && !self.header.cgb {
            info!("DMG cartridge: entering compatibility mode");
            self.cgb = false;
            self.ppu.enter_dmg_compat();
            self.serial.set_cgb(false);
        }
        self.rebuild_handlers();
    }

    /// STOP with KEY1 armed.
    pub(crate) fn switch_speed(&mut self) {
        self.double_speed = !self.double_speed;
        self.speed_switch_armed = false;
        debug!(
            "speed switch: {} speed",
            if self.double_speed { "double" } else { "normal" }
        );
    }

    /// Create the host audio output for a device running at `device_rate`.
    pub fn attach_audio(&mut self, device_rate: u32) -> Result<(), CoreError> {
        if device_rate == 0 {
            return Err(ResampleError::InvalidSettings.into());
        }
        let factor = (CYCLES_PER_SECOND / device_rate).clamp(1, 0xFFFF / MAX_MIX);
        let source_rate = CYCLES_PER_SECOND as f64 / factor as f64;
        let per_iteration = self.config.iteration_cycles / factor as f64 * 2.0;
        let settings = &self.config.audio;
        let audio = AudioOutput::new(
            2,
            source_rate,
            device_rate as f64,
            (per_iteration * settings.min_buffer_span as f64) as usize,
            (per_iteration * settings.max_buffer_span as f64) as usize,
            settings.volume,
        )?;
        self.apu.configure_output(factor);
        self.audio = Some(audio);
        Ok(())
    }

    pub fn audio_output(&self) -> Option<&AudioOutput> {
        self.audio.as_ref()
    }

    pub fn audio_output_mut(&mut self) -> Option<&mut AudioOutput> {
        self.audio.as_mut()
    }

    /// Press or release a button. Any transition releases STOP.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        let fell = self.joypad.set(button, pressed);
        self.cpu.stopped = false;
        if fell && self.config.joypad_interrupt {
            self.interrupts.request(Interrupt::Joypad);
        }
    }

    /// Host key code (0 right .. 7 start). Unknown codes are ignored.
    pub fn joypad_event(&mut self, keycode: u8, down: bool) {
        match Button::from_keycode(keycode) {
            Some(button) => self.set_button(button, down),
            None => debug!("ignoring key code {keycode}"),
        }
    }

    /// Last finished frame, 160x144 packed RGB.
    pub fn frame_rgb(&self) -> &[u8] {
        self.ppu.frame_rgb()
    }

    /// Working frame buffer including the opaque/priority flag bits.
    pub fn framebuffer(&self) -> &[u32] {
        self.ppu.framebuffer()
    }

    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    /// Write battery RAM and the cartridge clock to `store`.
    pub fn persist_battery(&self, store: &mut dyn SaveStore) -> io::Result<()> {
        if let Some(sram) = self.cartridge.sram() {
            store.store(&sram_key(&self.header.title), sram)?;
        }
        if self.cartridge.has_battery
            && let Some(blob) = self.cartridge.rtc_blob(unix_now())
        {
            store.store(&rtc_key(&self.header.title), &blob)?;
        }
        Ok(())
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
