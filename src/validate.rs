use crate::{
    decoded::{DecodedImage, SampleType},
    envelope::{IdentificationResult, Status},
};

/// Bounds an image must satisfy before it is handed to the engine.
#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub min_edge: u32,
    pub max_edge: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            min_edge: 16,
            max_edge: 5160,
        }
    }
}

/// Pre-inference checks, in order: decode, sample type, edge bounds.
///
/// Returns the error envelope for the first failing check, or the image
/// itself when it may proceed to identification.
pub fn validate<'a>(
    image: Option<&'a DecodedImage>,
    limits: ImageLimits,
) -> Result<&'a DecodedImage, IdentificationResult> {
    let Some(image) = image else {
        return Err(IdentificationResult::failure(
            Status::ParseError,
            "Image parsing error!",
        ));
    };

    if image.sample_type() != SampleType::U8 {
        return Err(IdentificationResult::failure(
            Status::DtypeError,
            "Image data type error, only support uint8 data type.",
        ));
    }

    if image.long_edge() > limits.max_edge || image.short_edge() < limits.min_edge {
        return Err(IdentificationResult::failure(
            Status::SizeError,
            format!(
                "Image size error, shorter edge must >= {}px, longer edge must <= {}px",
                limits.min_edge, limits.max_edge
            ),
        ));
    }

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};

    fn rgb(w: u32, h: u32) -> DecodedImage {
        DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, _>::new(w, h)).into()
    }

    fn status_of(result: Result<&DecodedImage, IdentificationResult>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(env) => env.status(),
        }
    }

    #[test]
    fn missing_image_is_parse_error() {
        let err = validate(None, ImageLimits::default()).unwrap_err();
        assert_eq!(err.status().code(), 1102);
        assert!(err.results().is_empty());
    }

    #[test]
    fn accepts_every_channel_layout() {
        let limits = ImageLimits::default();
        let images: Vec<DecodedImage> = vec![
            DynamicImage::ImageLuma8(ImageBuffer::<Luma<u8>, _>::new(16, 16)).into(),
            DynamicImage::ImageLumaA8(ImageBuffer::<LumaA<u8>, _>::new(16, 200)).into(),
            rgb(300, 5160),
            DynamicImage::ImageRgba8(ImageBuffer::<Rgba<u8>, _>::new(64, 64)).into(),
        ];
        for img in &images {
            assert_eq!(status_of(validate(Some(img), limits)), Status::Ok);
        }
    }

    #[test]
    fn rejects_wide_samples_before_size() {
        // 8x8 would also fail the size check; the sample type check must win.
        let img: DecodedImage = DynamicImage::ImageRgb16(ImageBuffer::new(8, 8)).into();
        let err = validate(Some(&img), ImageLimits::default()).unwrap_err();
        assert_eq!(err.status().code(), 1103);

        let img: DecodedImage = DynamicImage::ImageRgb32F(ImageBuffer::new(64, 64)).into();
        assert_eq!(status_of(validate(Some(&img), ImageLimits::default())), Status::DtypeError);
    }

    #[test]
    fn edge_bounds() {
        let limits = ImageLimits::default();
        assert_eq!(status_of(validate(Some(&rgb(15, 100)), limits)), Status::SizeError);
        assert_eq!(status_of(validate(Some(&rgb(100, 5161)), limits)), Status::SizeError);
        assert_eq!(status_of(validate(Some(&rgb(16, 5160)), limits)), Status::Ok);

        let err = validate(Some(&rgb(15, 15)), limits).unwrap_err();
        assert!(err.message().contains("16"));
        assert!(err.message().contains("5160"));
    }

    #[test]
    fn custom_limits_appear_in_message() {
        let limits = ImageLimits {
            min_edge: 32,
            max_edge: 1024,
        };
        let err = validate(Some(&rgb(20, 20)), limits).unwrap_err();
        assert_eq!(
            err.message(),
            "Image size error, shorter edge must >= 32px, longer edge must <= 1024px"
        );
    }
}
