use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::device::{BlockShape, DeviceConfig};
use crate::engine::{ComputeOptions, Engine};

/// Engine setup as read from a JSON file. Every section falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub block: BlockShape,
    pub device: DeviceConfig,
    pub compute: ComputeOptions,
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(&path).with_context(|| format!("open engine config: {}", path.as_ref().display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse engine config: {}", path.as_ref().display()))?;
        cfg.block.validate().context("engine config block shape")?;
        Ok(cfg)
    }

    pub fn build_engine(&self) -> Result<Engine> {
        Engine::open(&self.device, self.block).context("open block device")
    }
}
