use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, Context, Result};

/// Which identification engine backs the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    Remote { url: String },
    Tensorflow(TensorflowConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorflowConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub model_url: Option<String>,
    pub labels_url: Option<String>,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub static_dir: PathBuf,
    pub download_timeout: Duration,
    pub browser_topk: usize,
    pub api_topk: usize,
    pub min_image_edge: u32,
    pub max_image_edge: u32,
    pub preview_short_edge: u32,
    pub persist_api_uploads: bool,
    pub retention: Option<Duration>,
    pub retention_sweep_interval: Duration,
    pub engine: EngineKind,
    pub engine_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            body_limit_bytes: 16 * 1024 * 1024,
            static_dir: PathBuf::from("./static"),
            download_timeout: Duration::from_secs(30),
            browser_topk: 5,
            api_topk: 3,
            min_image_edge: 16,
            max_image_edge: 5160,
            preview_short_edge: 512,
            persist_api_uploads: true,
            retention: None,
            retention_sweep_interval: Duration::from_secs(3600),
            engine: EngineKind::Remote {
                url: "http://127.0.0.1:8501/identify".to_string(),
            },
            engine_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment (and `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let body_limit_mb: usize = parse_or(&lookup, "BODY_LIMIT_MB", 16)?;
        let body_limit_bytes = body_limit_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("BODY_LIMIT_MB ({body_limit_mb}) is too large"))?;
        let min_image_edge = parse_or(&lookup, "MIN_IMAGE_EDGE", defaults.min_image_edge)?;
        let max_image_edge = parse_or(&lookup, "MAX_IMAGE_EDGE", defaults.max_image_edge)?;
        if min_image_edge > max_image_edge {
            bail!(
                "MIN_IMAGE_EDGE ({}) must not exceed MAX_IMAGE_EDGE ({})",
                min_image_edge,
                max_image_edge
            );
        }

        let browser_topk = parse_or(&lookup, "BROWSER_TOPK", defaults.browser_topk)?;
        let api_topk = parse_or(&lookup, "API_TOPK", defaults.api_topk)?;
        if browser_topk == 0 || api_topk == 0 {
            bail!("BROWSER_TOPK and API_TOPK must be at least 1");
        }

        let retention = lookup("RETENTION_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("RETENTION_SECS must be a number of seconds, got {raw:?}"))
            })
            .transpose()?;

        let retention_sweep_secs: u64 = parse_or(&lookup, "RETENTION_SWEEP_SECS", 3600)?;
        if retention_sweep_secs == 0 {
            bail!("RETENTION_SWEEP_SECS must be at least 1");
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", defaults.port)?,
            body_limit_bytes,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            download_timeout: Duration::from_secs(parse_or(&lookup, "DOWNLOAD_TIMEOUT_SECS", 30)?),
            browser_topk,
            api_topk,
            min_image_edge,
            max_image_edge,
            preview_short_edge: parse_or(
                &lookup,
                "PREVIEW_SHORT_EDGE",
                defaults.preview_short_edge,
            )?,
            persist_api_uploads: parse_or(&lookup, "PERSIST_API_UPLOADS", true)?,
            retention,
            retention_sweep_interval: Duration::from_secs(retention_sweep_secs),
            engine: engine_from_lookup(&lookup)?,
            engine_timeout: Duration::from_secs(parse_or(&lookup, "ENGINE_TIMEOUT_SECS", 60)?),
        })
    }
}

fn engine_from_lookup<F>(lookup: &F) -> Result<EngineKind>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = lookup("PLANTID_ENGINE").unwrap_or_else(|| "remote".into());
    match kind.as_str() {
        "remote" => {
            let url = lookup("PLANTID_ENGINE_URL")
                .context("PLANTID_ENGINE_URL must be set when PLANTID_ENGINE=remote")?;
            Ok(EngineKind::Remote { url })
        }
        "tensorflow" => Ok(EngineKind::Tensorflow(TensorflowConfig {
            model_path: lookup("MODEL_PATH")
                .unwrap_or_else(|| "./model/frozen_graph.pb".into())
                .into(),
            labels_path: lookup("LABELS_PATH")
                .unwrap_or_else(|| "./model/labels.tsv".into())
                .into(),
            model_url: lookup("MODEL_URL"),
            labels_url: lookup("LABELS_URL"),
            input_size: parse_or(lookup, "PLANTID_INPUT_SIZE", 224)?,
        })),
        other => bail!("PLANTID_ENGINE must be 'remote' or 'tensorflow', got {other:?}"),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
