//! INI configuration with per-key defaults and clamps.
//!
//! Every key is optional; out-of-range values are pulled back to the
//! nearest admissible one, never rejected. A missing file is the only
//! fatal condition.

use std::path::Path;

use config::{Config, File, FileFormat};
use log::warn;

use crate::decode::SonicModel;
use crate::error::AcqError;
use crate::particles::{Source, MAX_SOURCES};
use crate::stats::MAX_WINDOWS;

/// Data directory the acquisition writes into (RAM disk on the target).
pub const DATA_SET: &str = "/mnt/ramdisk";

pub const DATA_PROCESSING_EXEC: &str = "/home/standard/bin/eddy_cov";
pub const DATA_PROCESSING_CONFIG: &str = "/home/standard/bin/eddy_cov.nml";
pub const DATA_PROCESSING_2D_EXEC: &str = "/home/standard/bin/proc2d";

pub const LOCK_FILE: &str = "/var/run/usa_acq.pid";
pub const LOCK_FILE_2D: &str = "/var/run/usa_2d.pid";

const MAX_SAMPLING_FREQUENCY: i64 = 10;
const MAX_OVERSAMPLING: i64 = 4;

const DEFAULT_AVG_DEPTHS: &[f64] = &[60.0, 300.0, 600.0];

/// Particle engine settings; the engines stay off unless enabled.
#[derive(Debug, Clone)]
pub struct ParticleConfig {
    pub enable: bool,
    pub per_step: usize,
    pub initial_altitude: f64,
    pub footprint_depth: f64,
    pub wind_pool: usize,
    pub max_particles: usize,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone)]
pub struct AcqConfig {
    pub fuse: i32,
    pub anemometer_height: f64,
    pub data_path: String,
    pub processing_interval: u32,
    pub eddy_interval: u32,
    pub status_interval: u32,
    pub raw_data_interval: u32,
    pub averaging_period: u32,
    pub sensor_model: SonicModel,
    pub sampling_frequency: u32,
    pub raw_per_sample: u32,
    pub analog_selection: u32,
    pub avg_depths: Vec<f64>,
    pub particles: ParticleConfig,
}

impl AcqConfig {
    pub fn load(path: &Path) -> Result<Self, AcqError> {
        if !path.is_file() {
            return Err(AcqError::ConfigMissing(path.display().to_string()));
        }
        let ini = Config::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()
            .map_err(|e| AcqError::ConfigParse(e.to_string()))?;

        let int = |key: &str, default: i64| ini.get_int(key).unwrap_or(default);
        let float = |key: &str, default: f64| ini.get_float(key).unwrap_or(default);

        let fuse = int("General.Fuse", 1).clamp(-12, 12) as i32;
        let anemometer_height = float("General.AnemometerHeight", 10.0).max(0.5);
        let data_path = ini
            .get_string("General.DataPath")
            .unwrap_or_else(|_| DATA_SET.to_string());

        let processing_interval = int("Timing.ProcessingInterval", 600).clamp(1, 600) as u32;
        let eddy_interval = int("Timing.EddyCovarianceInterval", 60).clamp(1, 60) as u32;
        let status_interval = int("Timing.StatusInterval", 10).clamp(1, 10) as u32;
        let raw_data_interval = int("Timing.RawDataInterval", 5).clamp(1, 5) as u32;
        let averaging_period = int("Timing.AveragingPeriod", 3600).clamp(1, 3600) as u32;

        let sensor_model = match int("SonicAnemometer.SensorType", 1) {
            0 => SonicModel::Usa1,
            _ => SonicModel::Usonic3,
        };
        let sampling_frequency = int("SonicAnemometer.SamplingFrequency", MAX_SAMPLING_FREQUENCY)
            .clamp(1, MAX_SAMPLING_FREQUENCY) as u32;
        let raw_per_sample = int("SonicAnemometer.ElementaryDataPerSample", 2)
            .clamp(1, MAX_OVERSAMPLING) as u32;
        let analog_selection = int("SonicAnemometer.AnalogSelection", 0).clamp(0, 3) as u32;

        let avg_depths = parse_depths(
            &ini.get_string("EddyCovariance.AveragingDepths")
                .unwrap_or_default(),
        );

        let particles = ParticleConfig {
            enable: int("Particles.Enable", 0) != 0,
            per_step: int("Particles.ParticlesPerStep", 10).clamp(2, 10) as usize,
            initial_altitude: float("Particles.InitialAltitude", 10.0).max(0.5),
            footprint_depth: float("Particles.FootprintDepth", 600.0).max(1.0),
            wind_pool: int("Particles.WindPool", 200).clamp(1, 10_000) as usize,
            max_particles: int("Particles.MaxParticles", 10_000).clamp(100, 1_000_000) as usize,
            sources: parse_sources(&ini.get_string("Particles.Sources").unwrap_or_default()),
        };

        Ok(Self {
            fuse,
            anemometer_height,
            data_path,
            processing_interval,
            eddy_interval,
            status_interval,
            raw_data_interval,
            averaging_period,
            sensor_model,
            sampling_frequency,
            raw_per_sample,
            analog_selection,
            avg_depths,
            particles,
        })
    }

    /// Output-descriptor code selecting the analog blocks (3D variants).
    pub fn od_code_3d(&self) -> u32 {
        1 + 4 * self.analog_selection
    }

    /// One hour of samples.
    pub fn ring_capacity(&self) -> usize {
        3600 * self.sampling_frequency as usize
    }
}

/// Comma-separated window depths; anything not strictly increasing, empty
/// or over-long falls back to the default vector.
fn parse_depths(text: &str) -> Vec<f64> {
    let parsed: Option<Vec<f64>> = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok().filter(|d| *d > 0.0))
        .collect();
    match parsed {
        Some(depths)
            if !depths.is_empty()
                && depths.len() <= MAX_WINDOWS
                && depths.windows(2).all(|p| p[0] < p[1]) =>
        {
            depths
        }
        _ => {
            if !text.trim().is_empty() {
                warn!("AveragingDepths '{}' rejected, using defaults", text);
            }
            DEFAULT_AVG_DEPTHS.to_vec()
        }
    }
}

/// `e,n,h,mass` quadruples separated by semicolons; malformed entries are
/// dropped with a warning, at most [`MAX_SOURCES`] kept.
fn parse_sources(text: &str) -> Vec<Source> {
    let mut sources = Vec::new();
    for chunk in text.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<f64> = chunk
            .split(',')
            .map(str::trim)
            .filter_map(|p| p.parse().ok())
            .collect();
        if parts.len() == 4 {
            sources.push(Source {
                e: parts[0],
                n: parts[1],
                h: parts[2],
                mass: parts[3],
            });
        } else {
            warn!("Particle source '{}' rejected", chunk);
        }
        if sources.len() == MAX_SOURCES {
            break;
        }
    }
    sources
}
