//! Process-wide configuration, read once at startup.
//!
//! The file lives at `~/.config/cluster-pipeline/config.toml` (or the path
//! in `CLUSTER_PIPELINE_CONFIG`). A missing file falls back to the built-in
//! defaults; a malformed file is a fatal `ConfigFailure` the operator must
//! repair.

use crate::error::ClusterError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Gravity solver family a simulation was run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GravityModel {
    Newtonian,
    Mond,
}

impl std::str::FromStr for GravityModel {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newtonian" | "newton" => Ok(GravityModel::Newtonian),
            "mond" => Ok(GravityModel::Mond),
            other => Err(ClusterError::ConfigFailure(format!(
                "unknown gravity model '{other}'"
            ))),
        }
    }
}

/// File-system roots for the catalogs and the pipeline output tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub ic_root: PathBuf,
    pub newtonian_root: PathBuf,
    pub mond_root: PathBuf,
    pub figures_root: PathBuf,
    pub movies_root: PathBuf,
    pub namelists_root: PathBuf,
    pub batch_root: PathBuf,
}

impl PathsConfig {
    /// Simulation-output root for the given gravity model.
    pub fn sim_root(&self, model: GravityModel) -> &Path {
        match model {
            GravityModel::Newtonian => &self.newtonian_root,
            GravityModel::Mond => &self.mond_root,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        let base = home.join("cluster-sims");
        PathsConfig {
            ic_root: base.join("initial-conditions"),
            newtonian_root: base.join("newtonian"),
            mond_root: base.join("mond"),
            figures_root: base.join("figures"),
            movies_root: base.join("movies"),
            namelists_root: base.join("namelists"),
            batch_root: base.join("batch"),
        }
    }
}

/// Physical factors the derivations consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericsConfig {
    /// Mean molecular weight of the ionized intracluster medium.
    #[serde(default = "default_mu")]
    pub mu: f64,
    /// rho_gas / (electron_factor * m_p) gives the electron number density.
    /// Tied to the IC hydrogen mass fraction, hence configurable.
    #[serde(default = "default_electron_factor")]
    pub electron_factor: f64,
    /// Frequency-integrated free-free Gaunt factor.
    #[serde(default = "default_gaunt_factor")]
    pub gaunt_factor: f64,
    /// MOND reference acceleration a0 (cm s^-2).
    #[serde(default = "default_mond_a0")]
    pub mond_a0: f64,
    /// Bins of the moving-average pass smoothing the hydrostatic-mass
    /// logarithmic derivative.
    #[serde(default = "default_hydro_bandwidth")]
    pub hydrostatic_bandwidth: usize,
}

fn default_mu() -> f64 {
    0.6
}
fn default_electron_factor() -> f64 {
    1.252
}
fn default_gaunt_factor() -> f64 {
    1.2
}
fn default_mond_a0() -> f64 {
    1.2e-8
}
fn default_hydro_bandwidth() -> usize {
    5
}

impl Default for NumericsConfig {
    fn default() -> Self {
        NumericsConfig {
            mu: default_mu(),
            electron_factor: default_electron_factor(),
            gaunt_factor: default_gaunt_factor(),
            mond_a0: default_mond_a0(),
            hydrostatic_bandwidth: default_hydro_bandwidth(),
        }
    }
}

/// Default display units, by unit string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsConfig {
    #[serde(default = "default_length_unit")]
    pub length: String,
    #[serde(default = "default_time_unit")]
    pub time: String,
    #[serde(default = "default_temperature_unit")]
    pub temperature: String,
    #[serde(default = "default_velocity_unit")]
    pub velocity: String,
}

fn default_length_unit() -> String {
    "kpc".to_string()
}
fn default_time_unit() -> String {
    "Gyr".to_string()
}
fn default_temperature_unit() -> String {
    "keV".to_string()
}
fn default_velocity_unit() -> String {
    "km s^-1".to_string()
}

impl Default for UnitsConfig {
    fn default() -> Self {
        UnitsConfig {
            length: default_length_unit(),
            time: default_time_unit(),
            temperature: default_temperature_unit(),
            velocity: default_velocity_unit(),
        }
    }
}

/// Logging policy defaults; the CLI flags override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 0 = error ... 4 = trace.
    #[serde(default = "default_log_level")]
    pub level: u32,
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> u32 {
    2
}
fn default_log_file() -> String {
    "cluster-pipeline.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main toolkit configuration, loaded from config.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClusterConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub numerics: NumericsConfig,
    #[serde(default)]
    pub units: UnitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClusterConfig {
    /// Loads the configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClusterError> {
        let path_ref = path.as_ref();
        let config_str = std::fs::read_to_string(path_ref).map_err(|e| {
            ClusterError::ConfigFailure(format!(
                "failed to read config file '{}': {e}",
                path_ref.display()
            ))
        })?;
        let config: ClusterConfig = toml::from_str(&config_str).map_err(|e| {
            ClusterError::ConfigFailure(format!(
                "failed to parse TOML from '{}': {e}",
                path_ref.display()
            ))
        })?;

        if config.numerics.mu <= 0.0 {
            return Err(ClusterError::ConfigFailure("mu must be positive".into()));
        }
        if config.numerics.electron_factor <= 0.0 {
            return Err(ClusterError::ConfigFailure(
                "electron_factor must be positive".into(),
            ));
        }
        if config.numerics.hydrostatic_bandwidth == 0 {
            return Err(ClusterError::ConfigFailure(
                "hydrostatic_bandwidth must be at least 1".into(),
            ));
        }
        Ok(config)
    }

    /// Default on-disk location of the configuration file.
    pub fn default_path() -> PathBuf {
        if let Some(p) = std::env::var_os("CLUSTER_PIPELINE_CONFIG") {
            return PathBuf::from(p);
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(".config/cluster-pipeline/config.toml")
    }

    /// Loads from the default path, falling back to built-in defaults when
    /// the file does not exist. A present-but-broken file is fatal.
    pub fn load_or_default() -> Result<Self, ClusterError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(ClusterConfig::default())
        }
    }
}

static GLOBAL: OnceLock<ClusterConfig> = OnceLock::new();

/// Installs the process-wide configuration. Later calls are ignored.
pub fn init_config(config: ClusterConfig) {
    let _ = GLOBAL.set(config);
}

/// The process-wide configuration; defaults if [`init_config`] never ran.
pub fn config() -> &'static ClusterConfig {
    GLOBAL.get_or_init(ClusterConfig::default)
}
