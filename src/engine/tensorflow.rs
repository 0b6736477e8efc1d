use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};
use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};

use super::{EngineOutput, EngineStatus, PlantIdentifier};
use crate::{
    config::TensorflowConfig, decoded::DecodedImage, envelope::RankedEntry, error::EngineError,
};

/// One line of the taxonomy file.
#[derive(Debug, Clone)]
struct Species {
    chinese_name: String,
    latin_name: String,
    genus: String,
    family: String,
}

struct Model {
    session: Session,
    graph: Graph,
}

/// Local frozen-graph classifier with genus and family roll-ups.
pub struct TfPlantIdentifier {
    classifier: Arc<Classifier>,
}

struct Classifier {
    model: Mutex<Model>,
    species: Vec<Species>,
    input_size: u32,
}

impl TfPlantIdentifier {
    pub async fn load(cfg: &TensorflowConfig) -> Result<Self> {
        ensure_file_exists(&cfg.model_path, cfg.model_url.as_deref(), "MODEL_URL").await?;
        ensure_file_exists(&cfg.labels_path, cfg.labels_url.as_deref(), "LABELS_URL").await?;

        let model_bytes = tokio::fs::read(&cfg.model_path)
            .await
            .with_context(|| format!("Failed to read model {}", cfg.model_path.display()))?;
        let mut graph = Graph::new();
        graph
            .import_graph_def(&model_bytes, &ImportGraphDefOptions::new())
            .context("Failed to import frozen graph")?;
        let session = Session::new(&SessionOptions::new(), &graph)
            .context("Failed to create TensorFlow session")?;

        let labels = tokio::fs::read_to_string(&cfg.labels_path)
            .await
            .with_context(|| format!("Failed to read labels {}", cfg.labels_path.display()))?;
        let species = parse_labels(&labels)?;

        tracing::info!(
            model = %cfg.model_path.display(),
            species = species.len(),
            input_size = cfg.input_size,
            "TensorFlow plant identifier loaded"
        );

        Ok(Self {
            classifier: Arc::new(Classifier {
                model: Mutex::new(Model { session, graph }),
                species,
                input_size: cfg.input_size,
            }),
        })
    }
}

impl Classifier {
    /// Preprocess, run the graph and rank. Blocks for the whole session run.
    fn classify(&self, image: &DynamicImage, topk: usize) -> EngineOutput {
        let Some(input) = self.preprocess(image) else {
            return EngineOutput::failed(EngineStatus::PreprocessFailed);
        };

        match self.run(&input) {
            Ok(probs) => self.rank(&probs, topk),
            Err(err) => {
                tracing::error!(error = %err, "TensorFlow inference failed");
                EngineOutput::failed(EngineStatus::InferenceFailed)
            }
        }
    }

    fn preprocess(&self, image: &DynamicImage) -> Option<Tensor<f32>> {
        let img = if image.color().has_alpha() || image.color().channel_count() == 1 {
            DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            image.clone()
        };

        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let resized = resize_long_edge(&img, self.input_size);
        let padded = pad_to_square(&resized, self.input_size);

        let size = self.input_size as u64;
        let mut flat = Vec::with_capacity((size * size * 3) as usize);
        for pixel in padded.pixels() {
            flat.extend(pixel.0.iter().map(|&c| c as f32));
        }

        let mut tensor = Tensor::new(&[1, size, size, 3]);
        tensor.copy_from_slice(&flat);
        Some(tensor)
    }

    fn run(&self, input: &Tensor<f32>) -> Result<Vec<f32>> {
        let model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("model lock poisoned"))?;
        let input_op = model
            .graph
            .operation_by_name("x")?
            .context("Input operation 'x' not found in graph")?;
        let output_op = model
            .graph
            .operation_by_name("Identity")?
            .context("Output operation 'Identity' not found in graph")?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_op, 0, input);
        let token = args.request_fetch(&output_op, 0);
        model.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(token)?;
        Ok(output.to_vec())
    }

    fn rank(&self, probs: &[f32], topk: usize) -> EngineOutput {
        let mut species: Vec<(usize, f32)> = probs
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| *i < self.species.len())
            .collect();
        species.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results = species
            .iter()
            .take(topk)
            .map(|&(i, p)| RankedEntry {
                chinese_name: self.species[i].chinese_name.clone(),
                latin_name: self.species[i].latin_name.clone(),
                probability: p,
            })
            .collect();

        EngineOutput {
            status: EngineStatus::Completed,
            results,
            family_results: roll_up(&self.species, &species, topk, |s| &s.family),
            genus_results: roll_up(&self.species, &species, topk, |s| &s.genus),
        }
    }
}

#[async_trait]
impl PlantIdentifier for TfPlantIdentifier {
    fn name(&self) -> &'static str {
        "tensorflow"
    }

    async fn identify(
        &self,
        image: &DecodedImage,
        topk: usize,
    ) -> Result<EngineOutput, EngineError> {
        let classifier = Arc::clone(&self.classifier);
        let image = image.clone();
        let output =
            tokio::task::spawn_blocking(move || classifier.classify(image.as_dynamic(), topk))
                .await?;
        Ok(output)
    }
}

/// Sum species probabilities per group and keep the `topk` best groups.
/// Group names are `chinese/latin`; the halves fill the two name columns.
fn roll_up<'a>(
    species: &'a [Species],
    ranked: &[(usize, f32)],
    topk: usize,
    group: impl Fn(&'a Species) -> &'a String,
) -> Vec<RankedEntry> {
    let mut totals: HashMap<&String, f32> = HashMap::new();
    for &(i, p) in ranked {
        *totals.entry(group(&species[i])).or_default() += p;
    }

    let mut groups: Vec<(&String, f32)> = totals.into_iter().collect();
    groups.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    groups
        .into_iter()
        .take(topk)
        .map(|(name, p)| {
            let (chinese, latin) = name.split_once('/').unwrap_or((name.as_str(), name.as_str()));
            RankedEntry {
                chinese_name: chinese.to_string(),
                latin_name: latin.to_string(),
                probability: p,
            }
        })
        .collect()
}

fn parse_labels(text: &str) -> Result<Vec<Species>> {
    let mut species = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
        if cols.len() != 4 {
            bail!(
                "labels line {}: expected 4 tab-separated columns, got {}",
                lineno + 1,
                cols.len()
            );
        }
        species.push(Species {
            chinese_name: cols[0].to_string(),
            latin_name: cols[1].to_string(),
            genus: cols[2].to_string(),
            family: cols[3].to_string(),
        });
    }
    if species.is_empty() {
        bail!("labels file contains no species");
    }
    Ok(species)
}

fn resize_long_edge(image: &DynamicImage, target_size: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let aspect_ratio = width as f32 / height as f32;

    if aspect_ratio >= 1.0 {
        let new_height = ((target_size as f32 / aspect_ratio).floor() as u32).max(1);
        image.resize_exact(target_size, new_height, image::imageops::FilterType::Lanczos3)
    } else {
        let new_width = ((target_size as f32 * aspect_ratio).floor() as u32).max(1);
        image.resize_exact(new_width, target_size, image::imageops::FilterType::Lanczos3)
    }
}

fn pad_to_square(image: &DynamicImage, target_size: u32) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    let (width, height) = image.dimensions();
    let mut output = ImageBuffer::from_pixel(target_size, target_size, Rgb([0, 0, 0]));

    let x_offset = (target_size.saturating_sub(width) / 2) as i64;
    let y_offset = (target_size.saturating_sub(height) / 2) as i64;
    image::imageops::overlay(&mut output, &image.to_rgb8(), x_offset, y_offset);

    output
}

async fn ensure_file_exists(path: &Path, url: Option<&str>, url_var: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let url = url.with_context(|| {
        format!("{} is missing and {} is not set", path.display(), url_var)
    })?;
    download_file(url, path).await
}

async fn download_file(url: &str, path: &Path) -> Result<()> {
    tracing::info!(url = %url, path = %path.display(), "Downloading model file");

    let mut request = reqwest::Client::new()
        .get(url)
        .header(reqwest::header::ACCEPT, "application/octet-stream");
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.context("Failed to send request")?;
    if !response.status().is_success() {
        bail!("Failed to download {}: {}", url, response.status());
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = response.bytes().await.context("Failed to read bytes")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
