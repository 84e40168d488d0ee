//! Configuration loaded from `~/.config/cartally/config.ini`.
//!
//! ```text
//! ~/.config/cartally/
//!   config.ini        — acquisition backend, tuning constants, output paths
//!   events/           — daily event-log files
//!   samples/          — optional raw sample logs, for later replay
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use configparser::ini::Ini;

/// Which acquisition backend to construct at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionMode {
    GpioAdc { chip: String },
    FramedSerial { device: String, baud: u32, legacy_frames: bool },
    Replay { path: String },
}

/// Full application configuration, merging INI values over built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    // [acquisition]
    pub acquisition: AcquisitionMode,

    // [output]
    pub event_log_dir: PathBuf,
    pub sample_log_dir: PathBuf,

    // [detector]
    pub sample_min: u16,
    pub sample_max: u16,
    pub high_offset: u16,
    pub low_offset: u16,
    pub n_rise: u32,
    pub n_fall: u32,
    pub baseline_window: f64,

    // [pairing]
    pub pair_stale_ms: u64,
    pub wheelbase_max_ft: f64,
}

impl Config {
    /// Detector tuning derived from this config's `[detector]` fields.
    pub fn detector_tuning(&self) -> crate::detector::Tuning {
        crate::detector::Tuning {
            sample_min: self.sample_min,
            sample_max: self.sample_max,
            high_offset: self.high_offset,
            low_offset: self.low_offset,
            n_rise: self.n_rise,
            n_fall: self.n_fall,
            baseline_window: self.baseline_window,
        }
    }

    /// Pairing tuning derived from this config's `[pairing]` fields.
    pub fn pairing_tuning(&self) -> crate::pairing::PairingTuning {
        crate::pairing::PairingTuning {
            pair_stale_ms: self.pair_stale_ms,
            wheelbase_max_ft: self.wheelbase_max_ft,
        }
    }
}

impl Config {
    /// Build the default config, rooted at the given config directory.
    fn default_for(config_dir: &Path) -> Self {
        Self {
            acquisition: AcquisitionMode::GpioAdc {
                chip: "/dev/gpiochip0".to_string(),
            },
            event_log_dir: config_dir.join("events"),
            sample_log_dir: config_dir.join("samples"),
            sample_min: 0x0180,
            sample_max: 0x1000,
            high_offset: 0x0C0,
            low_offset: 0x020,
            n_rise: 20,
            n_fall: 60,
            baseline_window: 250.0,
            pair_stale_ms: 2000,
            wheelbase_max_ft: 25.0,
        }
    }

    /// Load config from an INI file, falling back to defaults for any
    /// missing key.
    pub fn load_from_ini(path: &Path, config_dir: &Path) -> Result<Self> {
        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;

        let defaults = Config::default_for(config_dir);

        let backend = ini.get("acquisition", "backend").unwrap_or_else(|| "gpio".to_string());
        let acquisition = match backend.as_str() {
            "serial" => AcquisitionMode::FramedSerial {
                device: ini
                    .get("acquisition", "serial_device")
                    .unwrap_or_else(|| "/dev/ttyUSB0".to_string()),
                baud: ini
                    .getuint("acquisition", "serial_baud")
                    .ok()
                    .flatten()
                    .map(|v| v as u32)
                    .unwrap_or(115200),
                legacy_frames: ini
                    .getbool("acquisition", "legacy_frames")
                    .ok()
                    .flatten()
                    .unwrap_or(false),
            },
            "replay" => AcquisitionMode::Replay {
                path: ini
                    .get("acquisition", "replay_path")
                    .unwrap_or_else(|| "sample_log.txt".to_string()),
            },
            _ => AcquisitionMode::GpioAdc {
                chip: ini
                    .get("acquisition", "gpio_chip")
                    .unwrap_or_else(|| "/dev/gpiochip0".to_string()),
            },
        };

        let event_log_dir = ini
            .get("output", "event_log_dir")
            .map(|s| expand_tilde(&s))
            .unwrap_or(defaults.event_log_dir);

        let sample_log_dir = ini
            .get("output", "sample_log_dir")
            .map(|s| expand_tilde(&s))
            .unwrap_or(defaults.sample_log_dir);

        let sample_min = ini
            .getuint("detector", "sample_min")
            .ok()
            .flatten()
            .map(|v| v as u16)
            .unwrap_or(defaults.sample_min);

        let sample_max = ini
            .getuint("detector", "sample_max")
            .ok()
            .flatten()
            .map(|v| v as u16)
            .unwrap_or(defaults.sample_max);

        let high_offset = ini
            .getuint("detector", "high_offset")
            .ok()
            .flatten()
            .map(|v| v as u16)
            .unwrap_or(defaults.high_offset);

        let low_offset = ini
            .getuint("detector", "low_offset")
            .ok()
            .flatten()
            .map(|v| v as u16)
            .unwrap_or(defaults.low_offset);

        let n_rise = ini
            .getuint("detector", "n_rise")
            .ok()
            .flatten()
            .map(|v| v as u32)
            .unwrap_or(defaults.n_rise);

        let n_fall = ini
            .getuint("detector", "n_fall")
            .ok()
            .flatten()
            .map(|v| v as u32)
            .unwrap_or(defaults.n_fall);

        let baseline_window = ini
            .getfloat("detector", "baseline_window")
            .ok()
            .flatten()
            .unwrap_or(defaults.baseline_window);

        let pair_stale_ms = ini
            .getuint("pairing", "pair_stale_ms")
            .ok()
            .flatten()
            .unwrap_or(defaults.pair_stale_ms);

        let wheelbase_max_ft = ini
            .getfloat("pairing", "wheelbase_max_ft")
            .ok()
            .flatten()
            .unwrap_or(defaults.wheelbase_max_ft);

        Ok(Self {
            acquisition,
            event_log_dir,
            sample_log_dir,
            sample_min,
            sample_max,
            high_offset,
            low_offset,
            n_rise,
            n_fall,
            baseline_window,
            pair_stale_ms,
            wheelbase_max_ft,
        })
    }

    /// Save config to an INI-style file with comments explaining each field.
    pub fn save_to_ini(&self, path: &Path) -> Result<()> {
        let (backend, serial_device, serial_baud, legacy_frames, gpio_chip, replay_path) =
            match &self.acquisition {
                AcquisitionMode::GpioAdc { chip } => {
                    ("gpio", String::new(), 115200, false, chip.clone(), String::new())
                }
                AcquisitionMode::FramedSerial { device, baud, legacy_frames } => {
                    ("serial", device.clone(), *baud, *legacy_frames, String::new(), String::new())
                }
                AcquisitionMode::Replay { path } => {
                    ("replay", String::new(), 115200, false, String::new(), path.clone())
                }
            };

        let content = format!(
            r#"; cartally configuration
; Location: {path}

[acquisition]
; backend: gpio | serial | replay
backend = {backend}
gpio_chip = {gpio_chip}
serial_device = {serial_device}
serial_baud = {serial_baud}
legacy_frames = {legacy_frames}
replay_path = {replay_path}

[output]
event_log_dir = {event_log_dir}
sample_log_dir = {sample_log_dir}

[detector]
sample_min = {sample_min}
sample_max = {sample_max}
high_offset = {high_offset}
low_offset = {low_offset}
n_rise = {n_rise}
n_fall = {n_fall}
baseline_window = {baseline_window}

[pairing]
pair_stale_ms = {pair_stale_ms}
wheelbase_max_ft = {wheelbase_max_ft}
"#,
            path = path.display(),
            backend = backend,
            gpio_chip = gpio_chip,
            serial_device = serial_device,
            serial_baud = serial_baud,
            legacy_frames = legacy_frames,
            replay_path = replay_path,
            event_log_dir = self.event_log_dir.to_string_lossy(),
            sample_log_dir = self.sample_log_dir.to_string_lossy(),
            sample_min = self.sample_min,
            sample_max = self.sample_max,
            high_offset = self.high_offset,
            low_offset = self.low_offset,
            n_rise = self.n_rise,
            n_fall = self.n_fall,
            baseline_window = self.baseline_window,
            pair_stale_ms = self.pair_stale_ms,
            wheelbase_max_ft = self.wheelbase_max_ft,
        );

        fs::write(path, content).with_context(|| format!("failed to write config to {path:?}"))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let fallback = resolve_config_dir().unwrap_or_else(|| PathBuf::from(".").join("cartally"));
        Config::default_for(&fallback)
    }
}

fn expand_tilde(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

/// Resolve the config directory to `~/.config/cartally/` regardless of OS.
pub fn resolve_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("cartally"))
}

/// Ensure the config directory tree exists, loading an existing config.ini
/// or writing out the defaults on first run.
pub fn load_or_init() -> Result<Config> {
    let config_dir = resolve_config_dir().context("could not determine home directory")?;
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("failed to create config dir {config_dir:?}"))?;

    let config_path = config_dir.join("config.ini");
    if !config_path.exists() {
        let defaults = Config::default_for(&config_dir);
        defaults.save_to_ini(&config_path)?;
        fs::create_dir_all(&defaults.event_log_dir)?;
        fs::create_dir_all(&defaults.sample_log_dir)?;
        return Ok(defaults);
    }

    let config = Config::load_from_ini(&config_path, &config_dir)?;
    fs::create_dir_all(&config.event_log_dir)?;
    fs::create_dir_all(&config.sample_log_dir)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let dir = std::env::temp_dir().join("cartally_config_test_missing_keys");
        fs::create_dir_all(&dir).unwrap();
        let ini_path = dir.join("config.ini");
        fs::write(&ini_path, "[acquisition]\nbackend = serial\n").unwrap();

        let config = Config::load_from_ini(&ini_path, &dir).expect("loads with fallbacks");
        assert_eq!(config.n_rise, 20);
        assert_eq!(config.n_fall, 60);
        assert_eq!(config.pair_stale_ms, 2000);
        match config.acquisition {
            AcquisitionMode::FramedSerial { baud, legacy_frames, .. } => {
                assert_eq!(baud, 115200);
                assert!(!legacy_frames);
            }
            other => panic!("expected FramedSerial, got {other:?}"),
        }

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn explicit_values_override_defaults() {
        let dir = std::env::temp_dir().join("cartally_config_test_explicit_values");
        fs::create_dir_all(&dir).unwrap();
        let ini_path = dir.join("config.ini");
        fs::write(&ini_path, "[detector]\nn_rise = 5\nn_fall = 9\n").unwrap();

        let config = Config::load_from_ini(&ini_path, &dir).expect("loads");
        assert_eq!(config.n_rise, 5);
        assert_eq!(config.n_fall, 9);

        fs::remove_dir_all(&dir).ok();
    }
}
