use std::{path::Path, sync::Arc};

use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Element type of the decoded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
    F32,
}

/// Pixels decoded from an uploaded file, alive for one request. Clones share
/// the pixel buffer, so handing a copy to a blocking task is cheap.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    inner: Arc<DynamicImage>,
}

impl DecodedImage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        Ok(Self::from(image::load_from_memory(bytes)?))
    }

    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        // Format comes from the content, not the (client supplied) extension.
        let inner = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?;
        Ok(Self::from(inner))
    }

    /// (height, width, channels)
    pub fn shape(&self) -> (u32, u32, u8) {
        let (width, height) = self.inner.dimensions();
        (height, width, self.inner.color().channel_count())
    }

    pub fn sample_type(&self) -> SampleType {
        use image::ColorType::*;
        match self.inner.color() {
            L16 | La16 | Rgb16 | Rgba16 => SampleType::U16,
            Rgb32F | Rgba32F => SampleType::F32,
            _ => SampleType::U8,
        }
    }

    pub fn short_edge(&self) -> u32 {
        let (h, w, _) = self.shape();
        h.min(w)
    }

    pub fn long_edge(&self) -> u32 {
        let (h, w, _) = self.shape();
        h.max(w)
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.inner
    }

    /// Shrink so the shorter edge equals `target`, keeping the aspect ratio.
    /// Images whose shorter edge is already `<= target` are returned as is.
    pub fn resize_short_edge(&self, target: u32) -> DynamicImage {
        let (h, w, _) = self.shape();
        if h.min(w) <= target {
            return self.inner.as_ref().clone();
        }
        let (new_w, new_h) = if w < h {
            let scaled = (h as f64 * target as f64 / w as f64).round() as u32;
            (target, scaled.max(1))
        } else {
            let scaled = (w as f64 * target as f64 / h as f64).round() as u32;
            (scaled.max(1), target)
        };
        self.inner.resize_exact(new_w, new_h, FilterType::Triangle)
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(inner: DynamicImage) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn shape_is_height_width_channels() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::<Rgba<u8>, _>::new(40, 20));
        let decoded = DecodedImage::from(img);
        assert_eq!(decoded.shape(), (20, 40, 4));
        assert_eq!(decoded.short_edge(), 20);
        assert_eq!(decoded.long_edge(), 40);
    }

    #[test]
    fn sixteen_bit_png_keeps_sample_type() {
        let img = DynamicImage::ImageRgb16(ImageBuffer::new(32, 32));
        let decoded = DecodedImage::from_bytes(&png_bytes(&img)).unwrap();
        assert_eq!(decoded.sample_type(), SampleType::U16);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(DecodedImage::from_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn resize_short_edge_preserves_aspect() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, _>::new(2048, 1024));
        let resized = DecodedImage::from(img).resize_short_edge(512);
        assert_eq!(resized.dimensions(), (1024, 512));

        let tall = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, _>::new(600, 1200));
        let resized = DecodedImage::from(tall).resize_short_edge(512);
        assert_eq!(resized.dimensions(), (512, 1024));
    }

    #[test]
    fn small_images_are_not_resized() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, _>::new(512, 900));
        let resized = DecodedImage::from(img).resize_short_edge(512);
        assert_eq!(resized.dimensions(), (512, 900));
    }
}
