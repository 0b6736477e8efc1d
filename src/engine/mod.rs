//! Identification engines.
//!
//! The service treats plant recognition as an external collaborator behind
//! [`PlantIdentifier`]. One instance is built at startup and shared by every
//! request, so implementations must be safe to call concurrently.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{config::Config, decoded::DecodedImage, envelope::RankedEntry, error::EngineError};

pub mod remote;
#[cfg(feature = "tensorflow")]
pub mod tensorflow;

/// What the engine reports about one identification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Completed,
    PreprocessFailed,
    InferenceFailed,
}

impl EngineStatus {
    /// Wire markers: 0 success, -1 preprocessing failure, -2 inference failure.
    pub fn from_marker(marker: i32) -> Option<Self> {
        match marker {
            0 => Some(EngineStatus::Completed),
            -1 => Some(EngineStatus::PreprocessFailed),
            -2 => Some(EngineStatus::InferenceFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub status: EngineStatus,
    pub results: Vec<RankedEntry>,
    pub family_results: Vec<RankedEntry>,
    pub genus_results: Vec<RankedEntry>,
}

impl EngineOutput {
    pub fn failed(status: EngineStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
            family_results: Vec::new(),
            genus_results: Vec::new(),
        }
    }
}

/// JSON shape exchanged with engines over the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireOutput {
    pub status: i32,
    #[serde(default)]
    pub results: Vec<RankedEntry>,
    #[serde(default)]
    pub family_results: Vec<RankedEntry>,
    #[serde(default)]
    pub genus_results: Vec<RankedEntry>,
}

impl TryFrom<WireOutput> for EngineOutput {
    type Error = EngineError;

    fn try_from(wire: WireOutput) -> Result<Self, Self::Error> {
        let status =
            EngineStatus::from_marker(wire.status).ok_or(EngineError::UnknownStatus(wire.status))?;
        Ok(Self {
            status,
            results: wire.results,
            family_results: wire.family_results,
            genus_results: wire.genus_results,
        })
    }
}

#[async_trait]
pub trait PlantIdentifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn identify(&self, image: &DecodedImage, topk: usize)
        -> Result<EngineOutput, EngineError>;
}

pub struct EngineFactory;

impl EngineFactory {
    pub async fn create(cfg: &Config) -> Result<Arc<dyn PlantIdentifier>> {
        match &cfg.engine {
            crate::config::EngineKind::Remote { url } => Ok(Arc::new(
                remote::RemoteIdentifier::new(url.clone(), cfg.engine_timeout)?,
            )),

            #[cfg(feature = "tensorflow")]
            crate::config::EngineKind::Tensorflow(tf_cfg) => Ok(Arc::new(
                tensorflow::TfPlantIdentifier::load(tf_cfg).await?,
            )),

            #[cfg(not(feature = "tensorflow"))]
            crate::config::EngineKind::Tensorflow(_) => anyhow::bail!(
                "PLANTID_ENGINE=tensorflow requires building with the 'tensorflow' feature"
            ),
        }
    }
}
