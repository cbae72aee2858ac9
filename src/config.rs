use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::net::core::NetConfig;
use crate::net::distribution::TimeUnit;
use crate::sim::{SimulationOptions, Verbosity};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SpnConfig {
    /// Dimensions every place and dimension change must draw from.
    /// Empty means unrestricted.
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub simulation: SimulationSection,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulationSection {
    #[serde(default = "default_max_time")]
    pub max_time: f64,
    #[serde(default)]
    pub verbosity: u8,
    #[serde(default)]
    pub protocol: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_vanishing_steps")]
    pub max_vanishing_steps: usize,
    #[serde(default)]
    pub time_unit: Option<String>,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            max_time: default_max_time(),
            verbosity: 0,
            protocol: false,
            seed: None,
            max_vanishing_steps: default_max_vanishing_steps(),
            time_unit: None,
        }
    }
}

impl Default for SpnConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            simulation: SimulationSection::default(),
        }
    }
}

impl SpnConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: SpnConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    pub fn net_config(&self) -> NetConfig {
        NetConfig::with_dimensions(self.dimensions.iter().cloned())
    }

    pub fn to_options(&self) -> Result<SimulationOptions> {
        let section = &self.simulation;
        let time_unit = section
            .time_unit
            .as_deref()
            .map(str::parse::<TimeUnit>)
            .transpose()
            .context("Invalid `simulation.time_unit`")?;
        Ok(SimulationOptions {
            max_time: section.max_time,
            verbosity: Verbosity::from_level(section.verbosity),
            protocol: section.protocol,
            seed: section.seed,
            max_vanishing_steps: section.max_vanishing_steps,
            time_unit,
        })
    }
}

// Unrestricted by default: a net may use any dimension name.
fn default_dimensions() -> Vec<String> {
    Vec::new()
}

fn default_max_time() -> f64 {
    SimulationOptions::default().max_time
}

fn default_max_vanishing_steps() -> usize {
    SimulationOptions::default().max_vanishing_steps
}
