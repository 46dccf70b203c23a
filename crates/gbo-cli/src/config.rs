use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeSetting {
    #[default]
    Auto,
    ForceDmg,
    ForceCgb,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    pub mode: ModeSetting,
    pub colorize_dmg: bool,
    pub boot_rom_dmg: Option<PathBuf>,
    pub boot_rom_cgb: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub volume: f32,
    pub min_buffer_span: u32,
    pub max_buffer_span: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let core = gbo_core::AudioSettings::default();
        Self {
            enabled: true,
            volume: core.volume,
            min_buffer_span: core.min_buffer_span,
            max_buffer_span: core.max_buffer_span,
        }
    }
}

impl AudioConfig {
    pub fn settings(&self) -> gbo_core::AudioSettings {
        gbo_core::AudioSettings {
            volume: self.volume.clamp(0.0, 1.0),
            min_buffer_span: self.min_buffer_span,
            max_buffer_span: self.max_buffer_span,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for battery saves and save states. Defaults to the ROM's
    /// directory.
    pub save_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub emulation: EmulationConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Boot ROM path configured for the given hardware mode.
    pub fn boot_rom(&self, cgb: bool) -> Option<&Path> {
        if cgb {
            self.emulation.boot_rom_cgb.as_deref()
        } else {
            self.emulation.boot_rom_dmg.as_deref()
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("gbo").join("config.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("gbo").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("gbo")
            .join("config.toml");
    }

    PathBuf::from("gbo.toml")
}

/// Missing files give the defaults silently; malformed ones with a warning.
pub fn load_from_file(path: &Path) -> Config {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Config::default(),
    };

    match toml::from_str::<Config>(&text) {
        Ok(cfg) => {
            info!("loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            warn!(
                "failed to parse config {}: {e}; using defaults",
                path.display()
            );
            Config::default()
        }
    }
}
