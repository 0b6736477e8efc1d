//! Getting image bytes onto disk: naming, sniffing, downloading, writing.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use base64::Engine as _;
use tokio::fs;

use crate::error::IngestError;

const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Image bytes that have been written to storage.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub path: PathBuf,
}

/// The three directories images land in, all below the static root.
#[derive(Debug, Clone)]
pub struct ImageDirs {
    pub raw: PathBuf,
    pub api: PathBuf,
    pub preview: PathBuf,
}

impl ImageDirs {
    pub fn under(static_dir: &Path) -> Self {
        Self {
            raw: static_dir.join("raw_images"),
            api: static_dir.join("api_images"),
            preview: static_dir.join("images"),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.raw, &self.api, &self.preview]
    }
}

/// `{epoch_ms}_{00000-99999}` followed by `ext`, which should carry its own
/// leading dot (or be empty).
pub fn storage_filename(ext: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::random_range(0..=99_999);
    format!("{}_{:05}{}", millis, suffix, ext)
}

/// Reduce a client supplied filename to a safe basename.
pub fn sanitize_filename(filename: &str) -> Result<String, IngestError> {
    const MAX_FILENAME_LENGTH: usize = 255;

    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    if basename == "." || basename == ".." {
        return Err(IngestError::InvalidFilename);
    }

    let sanitized: String = basename
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    match sanitized.trim_start_matches('.') {
        "" => Err(IngestError::InvalidFilename),
        name => Ok(name.to_string()),
    }
}

/// Extension of `filename` including the leading dot, or `""`.
pub fn extension_of(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[idx..],
        _ => "",
    }
}

pub fn ensure_allowed_extension(filename: &str) -> Result<(), IngestError> {
    let ext = extension_of(filename);
    let bare = ext.trim_start_matches('.').to_ascii_lowercase();
    if ALLOWED_EXTENSIONS.contains(&bare.as_str()) {
        Ok(())
    } else {
        Err(IngestError::FileType(ext.to_string()))
    }
}

/// Canonical extension of the format found in the leading bytes.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    format.extensions_str().first().copied()
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, IngestError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| IngestError::Content(e.to_string()))
}

/// Write bytes under a freshly generated name in `dir`, creating it if needed.
pub async fn persist(dir: &Path, ext: &str, bytes: Vec<u8>) -> Result<UploadedImage, IngestError> {
    fs::create_dir_all(dir).await?;
    let filename = storage_filename(ext);
    let path = dir.join(&filename);
    fs::write(&path, &bytes).await?;
    tracing::debug!(path = %path.display(), size = bytes.len(), "Stored image");
    Ok(UploadedImage {
        bytes,
        filename,
        path,
    })
}

/// Downloads image URLs with a fixed timeout.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

/// A downloaded body whose format was recognised.
#[derive(Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// GET `url` and sniff the body. The declared content type and the URL
    /// path are ignored.
    pub async fn fetch(&self, url: &str) -> Result<Fetched, IngestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IngestError::Download(format!(
                "URL returned status code: {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IngestError::Download(e.to_string()))?
            .to_vec();

        let extension = sniff_extension(&bytes).ok_or(IngestError::NotAnImage)?;
        Ok(Fetched { bytes, extension })
    }
}
