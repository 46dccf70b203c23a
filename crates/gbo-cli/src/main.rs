mod audio;
mod config;
mod screenshot;
mod store;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::Parser;
use gbo_core::save_state::AUTO_SLOT;
use gbo_core::{Button, CYCLES_PER_FRAME, CYCLES_PER_SECOND, CoreConfig, CoreError, GameBoy};
use log::{error, info, warn};

use crate::config::{Config, ModeSetting};
use crate::store::FileStore;

/// Frames a `--press` keeps its button held.
const PRESS_FRAMES: u64 = 6;

/// Battery RAM is flushed this often, so runs without `--frames` keep it too.
const AUTOSAVE_FRAMES: u64 = 600;

#[derive(Parser)]
#[command(name = "gbo", about = "Game Boy / Game Boy Color emulator")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Config file (defaults to <config dir>/gbo/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Prefer CGB mode (uses the configured GBC boot ROM)
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// Path to boot ROM file
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Stop after this many frames (counted in emulated time)
    #[arg(long)]
    frames: Option<u64>,

    /// Write the last frame to a PNG file on exit
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Run without opening an audio device
    #[arg(long)]
    mute: bool,

    /// Pace emulation to the hardware frame rate
    #[arg(long)]
    realtime: bool,

    /// Directory for battery saves and save states
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Restore the save state in SLOT before running
    #[arg(long, value_name = "SLOT")]
    load_state: Option<String>,

    /// Save state on exit, to SLOT or the "auto" slot
    #[arg(long, value_name = "SLOT", num_args = 0..=1, default_missing_value = AUTO_SLOT)]
    save_state: Option<String>,

    /// Press BUTTON at frame FRAME, e.g. start@120 (repeatable)
    #[arg(long, value_name = "BUTTON@FRAME")]
    press: Vec<Press>,

    /// Echo serial output to stdout
    #[arg(long)]
    serial: bool,
}

/// A scripted button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Press {
    button: Button,
    frame: u64,
}

impl FromStr for Press {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, frame) = s
            .split_once('@')
            .ok_or_else(|| format!("expected BUTTON@FRAME, got `{s}`"))?;
        let button =
            Button::from_name(name).ok_or_else(|| format!("unknown button `{name}`"))?;
        let frame = frame
            .parse()
            .map_err(|e| format!("bad frame number `{frame}`: {e}"))?;
        Ok(Self { button, frame })
    }
}

/// Buttons that change state at `frame`: `(button, pressed)`.
fn press_events(presses: &[Press], frame: u64) -> impl Iterator<Item = (Button, bool)> + '_ {
    presses.iter().filter_map(move |p| {
        if p.frame == frame {
            Some((p.button, true))
        } else if p.frame + PRESS_FRAMES == frame {
            Some((p.button, false))
        } else {
            None
        }
    })
}

/// GBC flag from the header, when the image is large enough to have one.
fn header_wants_cgb(rom: &[u8]) -> bool {
    rom.get(0x143).is_some_and(|b| b & 0x80 != 0)
}

fn core_config(args: &Args, cfg: &Config, rom: &[u8]) -> Result<CoreConfig, std::io::Error> {
    let mode = if args.dmg {
        ModeSetting::ForceDmg
    } else if args.cgb {
        ModeSetting::ForceCgb
    } else {
        cfg.emulation.mode
    };
    let force_dmg = mode == ModeSetting::ForceDmg;
    let cgb = match mode {
        ModeSetting::Auto => header_wants_cgb(rom),
        ModeSetting::ForceDmg => false,
        ModeSetting::ForceCgb => true,
    };

    let boot_path = args.bootrom.as_deref().or_else(|| cfg.boot_rom(cgb));
    let boot_rom = match boot_path {
        Some(path) => {
            let data = std::fs::read(path)?;
            info!("boot ROM {} ({} bytes)", path.display(), data.len());
            Some(data)
        }
        None => None,
    };
    if mode == ModeSetting::ForceCgb && !header_wants_cgb(rom) && boot_rom.is_none() {
        warn!("GBC mode for a DMG cartridge needs a GBC boot ROM; running as DMG");
    }

    Ok(CoreConfig {
        force_dmg,
        colorize_dmg: cfg.emulation.colorize_dmg,
        boot_rom,
        audio: cfg.audio.settings(),
        ..CoreConfig::default()
    })
}

fn save_dir(args: &Args, cfg: &Config) -> PathBuf {
    args.save_dir
        .clone()
        .or_else(|| cfg.storage.save_dir.clone())
        .or_else(|| {
            args.rom
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

fn print_serial(bytes: &[u8]) {
    use std::io::Write;

    let mut out = std::io::stdout().lock();
    if let Err(e) = out.write_all(bytes).and_then(|()| out.flush()) {
        warn!("failed to write serial output: {e}");
    }
}

fn run(args: Args) -> Result<(), CoreError> {
    let cfg_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let cfg = config::load_from_file(&cfg_path);

    let rom = std::fs::read(&args.rom)
        .inspect_err(|e| error!("cannot read {}: {e}", args.rom.display()))?;
    let core_cfg = core_config(&args, &cfg, &rom)?;
    let mut store = FileStore::new(save_dir(&args, &cfg));
    let mut gb = GameBoy::new(rom, core_cfg, &store)?;
    info!("loaded \"{}\", saves in {}", gb.title(), store.dir().display());

    if let Some(slot) = &args.load_state {
        gb.restore_state(&store, slot)?;
    }

    let sink = if args.mute || !cfg.audio.enabled {
        None
    } else {
        audio::start_stream()
    };
    if let Some(sink) = &sink {
        gb.attach_audio(sink.sample_rate())?;
    }

    let frame_time =
        Duration::from_secs_f64(f64::from(CYCLES_PER_FRAME) / f64::from(CYCLES_PER_SECOND));
    let start = Instant::now();
    // Counts iterations, which keep coming while the LCD is off.
    let mut frame = 0u64;
    let mut shown = 0u64;

    let result = loop {
        if args.frames.is_some_and(|max| frame >= max) {
            break Ok(());
        }
        for (button, pressed) in press_events(&args.press, frame) {
            gb.set_button(button, pressed);
        }

        match gb.run_frame() {
            Ok(true) => shown += 1,
            Ok(false) => {}
            Err(e) => break Err(e),
        }
        frame += 1;

        if args.serial {
            let bytes = gb.take_serial_output();
            if !bytes.is_empty() {
                print_serial(&bytes);
            }
        }
        if let Some(sink) = &sink
            && let Err(e) = sink.pump(&mut gb)
        {
            break Err(e);
        }

        if args.realtime {
            let due = frame_time.mul_f64(frame as f64);
            if let Some(wait) = due.checked_sub(start.elapsed()) {
                std::thread::sleep(wait);
            }
        }
        if frame % AUTOSAVE_FRAMES == 0
            && let Err(e) = gb.persist_battery(&mut store)
        {
            warn!("auto-save failed: {e}");
        }
    };

    info!("ran {frame} frames ({shown} displayed) in {:.2?}", start.elapsed());

    if let Some(path) = &args.screenshot {
        screenshot::save_png(path, gb.frame_rgb())?;
        info!("screenshot written to {}", path.display());
    }
    gb.persist_battery(&mut store)?;
    if let Some(slot) = &args.save_state {
        gb.store_state(&mut store, Some(slot.as_str()))?;
    }

    result
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("gbo").chain(argv.iter().copied()))
    }

    #[test]
    fn press_parses_button_and_frame() {
        assert_eq!(
            "Start@120".parse::<Press>(),
            Ok(Press {
                button: Button::Start,
                frame: 120
            })
        );
        assert!("start".parse::<Press>().is_err());
        assert!("turbo@3".parse::<Press>().is_err());
        assert!("a@soon".parse::<Press>().is_err());
    }

    #[test]
    fn presses_release_after_a_few_frames() {
        let presses = [Press {
            button: Button::A,
            frame: 10,
        }];
        assert_eq!(press_events(&presses, 10).collect::<Vec<_>>(), [(Button::A, true)]);
        assert_eq!(press_events(&presses, 11).count(), 0);
        assert_eq!(
            press_events(&presses, 10 + PRESS_FRAMES).collect::<Vec<_>>(),
            [(Button::A, false)]
        );
    }

    #[test]
    fn mode_flags_conflict() {
        assert!(parse(&["game.gb", "--dmg", "--cgb"]).is_err());
    }

    #[test]
    fn save_state_slot_is_optional() {
        let args = parse(&["game.gb", "--save-state"]).unwrap();
        assert_eq!(args.save_state.as_deref(), Some(AUTO_SLOT));
        let args = parse(&["game.gb", "--save-state", "3"]).unwrap();
        assert_eq!(args.save_state.as_deref(), Some("3"));
        let args = parse(&["game.gb"]).unwrap();
        assert_eq!(args.save_state, None);
    }

    #[test]
    fn press_is_repeatable() {
        let args = parse(&["game.gb", "--press", "a@1", "--press", "b@2"]).unwrap();
        assert_eq!(args.press.len(), 2);
    }

    #[test]
    fn flags_override_the_config_file() {
        let mut cfg = Config::default();
        cfg.emulation.mode = ModeSetting::ForceDmg;
        cfg.audio.volume = 0.5;
        let mut rom = vec![0u8; 0x8000];
        rom[0x143] = 0x80;

        let args = parse(&["game.gb"]).unwrap();
        let core = core_config(&args, &cfg, &rom).unwrap();
        assert!(core.force_dmg);
        assert_eq!(core.audio.volume, 0.5);

        let args = parse(&["game.gb", "--cgb"]).unwrap();
        assert!(!core_config(&args, &cfg, &rom).unwrap().force_dmg);
    }

    #[test]
    fn boot_rom_follows_the_chosen_mode() {
        let dir = tempfile::tempdir().unwrap();
        let dmg = dir.path().join("dmg.bin");
        let cgb = dir.path().join("cgb.bin");
        std::fs::write(&dmg, vec![0u8; 0x100]).unwrap();
        std::fs::write(&cgb, vec![0u8; 0x900]).unwrap();
        let mut cfg = Config::default();
        cfg.emulation.boot_rom_dmg = Some(dmg);
        cfg.emulation.boot_rom_cgb = Some(cgb);
        let mut rom = vec![0u8; 0x8000];

        let args = parse(&["game.gb"]).unwrap();
        let boot = core_config(&args, &cfg, &rom).unwrap().boot_rom;
        assert_eq!(boot.map(|b| b.len()), Some(0x100));

        rom[0x143] = 0xC0;
        let boot = core_config(&args, &cfg, &rom).unwrap().boot_rom;
        assert_eq!(boot.map(|b| b.len()), Some(0x900));
    }

    #[test]
    fn save_dir_prefers_flag_then_config_then_rom_dir() {
        let mut cfg = Config::default();
        let args = parse(&["game.gb"]).unwrap();
        assert_eq!(save_dir(&args, &cfg), PathBuf::from("."));
        let args = parse(&["roms/game.gb"]).unwrap();
        assert_eq!(save_dir(&args, &cfg), PathBuf::from("roms"));

        cfg.storage.save_dir = Some(PathBuf::from("cfg-saves"));
        assert_eq!(save_dir(&args, &cfg), PathBuf::from("cfg-saves"));

        let args = parse(&["roms/game.gb", "--save-dir", "flag-saves"]).unwrap();
        assert_eq!(save_dir(&args, &cfg), PathBuf::from("flag-saves"));
    }
}
