use std::sync::Arc;

use anyhow::Context;

use crate::{
    config::Config,
    engine::PlantIdentifier,
    ingest::{Fetcher, ImageDirs},
    render::Renderer,
    validate::ImageLimits,
};

/// Shared, read-only per-process state handed to every request.
pub struct AppState {
    pub config: Config,
    pub engine: Arc<dyn PlantIdentifier>,
    pub fetcher: Fetcher,
    pub renderer: Renderer,
    pub dirs: ImageDirs,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn PlantIdentifier>) -> anyhow::Result<Self> {
        let fetcher = Fetcher::new(config.download_timeout)?;
        let renderer = Renderer::new().context("Failed to load HTML templates")?;
        let dirs = ImageDirs::under(&config.static_dir);
        Ok(Self {
            config,
            engine,
            fetcher,
            renderer,
            dirs,
        })
    }

    pub fn limits(&self) -> ImageLimits {
        ImageLimits {
            min_edge: self.config.min_image_edge,
            max_edge: self.config.max_image_edge,
        }
    }
}
