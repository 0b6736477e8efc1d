//! HTML pages for the browser route and the preview image they show.

use std::{io::Cursor, path::Path};

use image::{DynamicImage, ImageFormat, ImageOutputFormat};
use minijinja::{context, Environment};
use serde::Serialize;

use crate::{
    decoded::DecodedImage,
    envelope::{IdentificationResult, RankedEntry},
};

const LABELS: [&str; 3] = ["Chinese Name", "Latin Name", "Confidence"];

#[derive(Serialize)]
struct Section<'a> {
    title: &'static str,
    entries: &'a [RankedEntry],
}

pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("upload.html", include_str!("../templates/upload.html"))?;
        env.add_template("upload_ok.html", include_str!("../templates/upload_ok.html"))?;
        env.add_template(
            "upload_error.html",
            include_str!("../templates/upload_error.html"),
        )?;
        Ok(Self { env })
    }

    pub fn upload_form(&self) -> Result<String, minijinja::Error> {
        self.env.get_template("upload.html")?.render(context! {})
    }

    /// Results page. `image_filename` names the preview under `/static/images`.
    pub fn success(
        &self,
        outcome: &IdentificationResult,
        image_filename: &str,
        timestamp: i64,
    ) -> Result<String, minijinja::Error> {
        let sections = [
            Section {
                title: "Species",
                entries: outcome.results(),
            },
            Section {
                title: "Genus",
                entries: outcome.genus_results(),
            },
            Section {
                title: "Family",
                entries: outcome.family_results(),
            },
        ];
        self.env.get_template("upload_ok.html")?.render(context! {
            labels => LABELS,
            sections => sections,
            image_url => format!("/static/images/{}?t={}", image_filename, timestamp),
        })
    }

    pub fn failure(&self, outcome: &IdentificationResult) -> Result<String, minijinja::Error> {
        self.env.get_template("upload_error.html")?.render(context! {
            status => outcome.status().code(),
            message => outcome.message(),
        })
    }
}

/// Write the browser preview: shrunk so the shorter edge is at most
/// `short_edge`, encoded in the format the filename's extension names.
pub async fn write_preview(
    image: DecodedImage,
    dir: &Path,
    filename: &str,
    short_edge: u32,
) -> anyhow::Result<()> {
    let path = dir.join(filename);
    let format = ImageFormat::from_path(&path)?;

    let encoded = tokio::task::spawn_blocking(move || encode_preview(&image, format, short_edge))
        .await??;

    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, encoded).await?;
    Ok(())
}

fn encode_preview(
    image: &DecodedImage,
    format: ImageFormat,
    short_edge: u32,
) -> image::ImageResult<Vec<u8>> {
    let mut preview = image.resize_short_edge(short_edge);
    if format == ImageFormat::Jpeg && preview.color().has_alpha() {
        preview = DynamicImage::ImageRgb8(preview.to_rgb8());
    }

    let mut encoded = Cursor::new(Vec::new());
    preview.write_to(&mut encoded, ImageOutputFormat::from(format))?;
    Ok(encoded.into_inner())
}
