use crate::{
    decoded::DecodedImage,
    engine::{EngineStatus, PlantIdentifier},
    envelope::{IdentificationResult, Status},
    validate::{validate, ImageLimits},
};

/// Validate `image` and, when it passes, ask the engine for the top `topk`
/// predictions. Always yields an envelope.
pub async fn identify(
    engine: &dyn PlantIdentifier,
    image: Option<&DecodedImage>,
    limits: ImageLimits,
    topk: usize,
) -> IdentificationResult {
    let image = match validate(image, limits) {
        Ok(image) => image,
        Err(rejected) => return rejected,
    };

    let output = match engine.identify(image, topk).await {
        Ok(output) => output,
        Err(err) => {
            tracing::error!(engine = engine.name(), error = %err, "Identification engine call failed");
            return IdentificationResult::failure(
                Status::EngineError,
                format!("Identification engine error: {}", err),
            );
        }
    };

    match output.status {
        EngineStatus::Completed => IdentificationResult::success(
            output.results,
            output.family_results,
            output.genus_results,
        ),
        EngineStatus::PreprocessFailed => {
            IdentificationResult::failure(Status::PreprocessError, "Image preprocess error.")
        }
        EngineStatus::InferenceFailed => {
            IdentificationResult::failure(Status::InferenceError, "Inference error.")
        }
    }
}
