use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fiducial_sim_core::{
    SlotNaming, DEFAULT_LINK_PREFIX, DEFAULT_MATERIAL_PREFIX, DEFAULT_MODEL_PREFIX,
    LINE_COEFFICIENTS_ENDPOINT, MARKER_POOL_SIZE, TARGET_SLOT_COUNT,
};
use fiducial_sim_system_line_coefficients::{
    CoefficientRanges, DEFAULT_INTERCEPT_HIGH, DEFAULT_INTERCEPT_LOW, DEFAULT_SLOPE_HIGH,
    DEFAULT_SLOPE_LOW,
};
use fiducial_sim_system_marker_randomizer::RandomizerConfig;
use serde::Deserialize;

/// Settings file read by every subcommand.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Settings {
    pub(crate) randomizer: RandomizerSettings,
    pub(crate) coefficients: CoefficientSettings,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RandomizerSettings {
    pub(crate) pool_size: u8,
    pub(crate) slot_count: u8,
    pub(crate) model_prefix: String,
    pub(crate) link_prefix: String,
    pub(crate) material_prefix: String,
}

impl Default for RandomizerSettings {
    fn default() -> Self {
        Self {
            pool_size: MARKER_POOL_SIZE,
            slot_count: TARGET_SLOT_COUNT,
            model_prefix: DEFAULT_MODEL_PREFIX.to_owned(),
            link_prefix: DEFAULT_LINK_PREFIX.to_owned(),
            material_prefix: DEFAULT_MATERIAL_PREFIX.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CoefficientSettings {
    pub(crate) endpoint: String,
    pub(crate) slope: Bounds,
    pub(crate) intercept: Bounds,
}

impl Default for CoefficientSettings {
    fn default() -> Self {
        Self {
            endpoint: LINE_COEFFICIENTS_ENDPOINT.to_owned(),
            slope: Bounds {
                low: DEFAULT_SLOPE_LOW,
                high: DEFAULT_SLOPE_HIGH,
            },
            intercept: Bounds {
                low: DEFAULT_INTERCEPT_LOW,
                high: DEFAULT_INTERCEPT_HIGH,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Bounds {
    pub(crate) low: f32,
    pub(crate) high: f32,
}

impl Settings {
    /// Default settings path relative to the working directory.
    pub(crate) fn default_path() -> PathBuf {
        PathBuf::from("fiducial-sim.toml")
    }

    /// Loads settings from `path`, or defaults when no path was given and the
    /// default file is absent.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => {
                let fallback = Self::default_path();
                if fallback.exists() {
                    Self::from_path(&fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings at {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(contents).context("failed to parse settings toml contents")?;
        let _ = settings.randomizer_config()?;
        let _ = settings.coefficient_ranges()?;
        Ok(settings)
    }

    pub(crate) fn randomizer_config(&self) -> Result<RandomizerConfig> {
        let config = RandomizerConfig {
            pool_size: self.randomizer.pool_size,
            slot_count: self.randomizer.slot_count,
            naming: SlotNaming {
                model_prefix: self.randomizer.model_prefix.clone(),
                link_prefix: self.randomizer.link_prefix.clone(),
                material_prefix: self.randomizer.material_prefix.clone(),
            },
        };
        config.validate().context("invalid [randomizer] settings")?;
        Ok(config)
    }

    pub(crate) fn coefficient_ranges(&self) -> Result<CoefficientRanges> {
        let CoefficientSettings {
            slope, intercept, ..
        } = &self.coefficients;
        CoefficientRanges::new((slope.low, slope.high), (intercept.low, intercept.high))
            .context("invalid [coefficients] settings")
    }
}
