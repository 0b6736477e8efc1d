use std::{io::Cursor, time::Duration};

use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;

use super::{EngineOutput, PlantIdentifier, WireOutput};
use crate::{decoded::DecodedImage, error::EngineError};

/// Engine reached over HTTP: the image goes out as a base64 PNG, the ranked
/// results come back as JSON.
pub struct RemoteIdentifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct IdentifyRequest<'a> {
    image: &'a str,
    topk: usize,
}

impl RemoteIdentifier {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    fn encode(image: &DecodedImage) -> Result<String, image::ImageError> {
        let mut png = Cursor::new(Vec::new());
        image
            .as_dynamic()
            .write_to(&mut png, image::ImageOutputFormat::Png)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(png.into_inner()))
    }
}

#[async_trait]
impl PlantIdentifier for RemoteIdentifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn identify(
        &self,
        image: &DecodedImage,
        topk: usize,
    ) -> Result<EngineOutput, EngineError> {
        let image = image.clone();
        let encoded = tokio::task::spawn_blocking(move || Self::encode(&image)).await??;

        let response = self
            .client
            .post(&self.url)
            .json(&IdentifyRequest {
                image: &encoded,
                topk,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EngineError::HttpStatus(response.status().as_u16()));
        }

        let wire: WireOutput = response.json().await?;
        tracing::debug!(status = wire.status, species = wire.results.len(), "Engine replied");
        EngineOutput::try_from(wire)
    }
}
