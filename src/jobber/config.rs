use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::jobber::job::DEFAULT_RESOLUTION;

const APP_NAME: &str = "jobber";
const DATA_FILE: &str = "jobber.dat";

/// Settings for one run, fixed before any job is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub file: PathBuf,
    /// Rounding granularity of reported hours.
    pub resolution: f64,
    /// Money per hour, shown next to hours when set.
    pub rate: Option<f64>,
    pub verbose: bool,
}

/// Optional settings from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub file: Option<PathBuf>,
    pub resolution: Option<f64>,
    pub rate: Option<f64>,
}

/// Settings given on the command line; they win over the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub file: Option<PathBuf>,
    pub resolution: Option<f64>,
    pub rate: Option<f64>,
    pub verbose: bool,
}

impl Config {
    /// Merge command line, config file and defaults.
    pub fn load(overrides: Overrides) -> Result<Self> {
        let file_config = match config_file()? {
            Some(path) if path.exists() => FileConfig::read(&path)?,
            _ => FileConfig::default(),
        };
        Self::resolve(overrides, file_config)
    }

    fn resolve(overrides: Overrides, file_config: FileConfig) -> Result<Self> {
        let file = match overrides.file.or(file_config.file) {
            Some(file) => file,
            None => data_dir()?.join(DATA_FILE),
        };
        let resolution = overrides
            .resolution
            .or(file_config.resolution)
            .unwrap_or(DEFAULT_RESOLUTION);
        if !(resolution.is_finite() && resolution > 0.0) {
            bail!("resolution must be a positive number of hours, got {resolution}");
        }
        Ok(Self {
            file,
            resolution,
            rate: overrides.rate.or(file_config.rate),
            verbose: overrides.verbose,
        })
    }
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// `JOBBER_CONFIG` or `config.toml` in the user's config directory.
fn config_file() -> Result<Option<PathBuf>> {
    if let Ok(path) = std::env::var("JOBBER_CONFIG") {
        return Ok(Some(PathBuf::from(path)));
    }
    Ok(dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml")))
}

fn data_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Failed to find user data directory"))?
        .join(APP_NAME))
}
