use std::{path::PathBuf, sync::Arc};

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, FromRequest, Multipart, State},
    http::{header, Request, StatusCode},
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;

use crate::{
    decoded::DecodedImage,
    envelope::IdentificationResult,
    error::IngestError,
    identify::identify,
    ingest::{
        decode_base64, ensure_allowed_extension, extension_of, persist, sanitize_filename,
        sniff_extension, UploadedImage,
    },
    render::write_preview,
    state::AppState,
};

/// Fields of the browser upload form.
#[derive(Debug, Default)]
struct BrowserForm {
    file: Option<(String, Vec<u8>)>,
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiForm {
    image: Option<String>,
}

pub async fn upload_form(State(state): State<Arc<AppState>>) -> Response {
    html(state.renderer.upload_form())
}

/// Browser flow: multipart file or `image_url`, answered with an HTML page.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let stored = match multipart {
        Ok(multipart) => ingest_browser_upload(&state, multipart).await,
        Err(rejection) => Err(IngestError::Form(rejection.body_text())),
    };

    let stored = match stored {
        Ok(stored) => stored,
        Err(err) => {
            tracing::warn!(error = %err, status = err.status().code(), "Rejected browser upload");
            return html(state.renderer.failure(&err.to_envelope()));
        }
    };

    let decoded = decode_stored(stored.path.clone()).await;

    let outcome = identify(
        state.engine.as_ref(),
        decoded.as_ref(),
        state.limits(),
        state.config.browser_topk,
    )
    .await;
    tracing::info!(
        filename = %stored.filename,
        status = outcome.status().code(),
        species = outcome.results().len(),
        "Browser identification finished"
    );

    let Some(decoded) = decoded.filter(|_| outcome.status().is_ok()) else {
        return html(state.renderer.failure(&outcome));
    };

    if let Err(e) = write_preview(
        decoded,
        &state.dirs.preview,
        &stored.filename,
        state.config.preview_short_edge,
    )
    .await
    {
        tracing::error!(filename = %stored.filename, error = %e, "Failed to write preview image");
    }

    let timestamp = chrono::Utc::now().timestamp_millis();
    html(state.renderer.success(&outcome, &stored.filename, timestamp))
}

/// API flow: base64 `image` form field, urlencoded or multipart, answered
/// with the JSON envelope.
pub async fn identify_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Json<IdentificationResult> {
    let text = match read_api_image(&state, request).await {
        Ok(Some(text)) if !text.trim().is_empty() => text,
        Ok(_) => return Json(IdentificationResult::parameter_error()),
        Err(err) => {
            tracing::warn!(error = %err, "Rejected API request");
            return Json(IdentificationResult::parameter_error());
        }
    };

    let outcome = match ingest_base64(&state, &text).await {
        Ok(decoded) => {
            identify(
                state.engine.as_ref(),
                Some(&decoded),
                state.limits(),
                state.config.api_topk,
            )
            .await
        }
        Err(err) => {
            tracing::warn!(error = %err, status = err.status().code(), "Rejected API image");
            err.to_envelope()
        }
    };
    tracing::info!(
        status = outcome.status().code(),
        species = outcome.results().len(),
        "API identification finished"
    );

    Json(outcome)
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

async fn read_api_image(
    state: &Arc<AppState>,
    request: Request<Body>,
) -> Result<Option<String>, IngestError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        let Form(ApiForm { image }) = Form::<ApiForm>::from_request(request, state)
            .await
            .map_err(|rejection| IngestError::Form(rejection.body_text()))?;
        return Ok(image);
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| IngestError::Form(rejection.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IngestError::Form(e.to_string()))?
    {
        // File parts are not form values.
        if field.name() == Some("image") && field.file_name().is_none() {
            let text = field
                .text()
                .await
                .map_err(|e| IngestError::Form(e.to_string()))?;
            return Ok(Some(text));
        }
    }
    Ok(None)
}

async fn read_browser_form(mut multipart: Multipart) -> Result<BrowserForm, IngestError> {
    let mut form = BrowserForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IngestError::Form(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| IngestError::Form(e.to_string()))?;
                // Browsers send an empty part when no file was chosen.
                if !filename.is_empty() {
                    form.file = Some((filename, bytes.to_vec()));
                }
            }
            Some("image_url") => {
                let url = field
                    .text()
                    .await
                    .map_err(|e| IngestError::Form(e.to_string()))?;
                let url = url.trim();
                if !url.is_empty() {
                    form.image_url = Some(url.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn ingest_browser_upload(
    state: &AppState,
    multipart: Multipart,
) -> Result<UploadedImage, IngestError> {
    let form = read_browser_form(multipart).await?;

    let stored = match (form.file, form.image_url) {
        (Some((client_name, bytes)), _) => {
            let safe_name = sanitize_filename(&client_name)?;
            let extension = extension_of(&safe_name);
            tracing::debug!(
                filename = %safe_name,
                extension,
                size = bytes.len(),
                "Received upload"
            );
            persist(&state.dirs.raw, extension, bytes).await?
        }
        (None, Some(url)) => {
            tracing::info!(url = %url, "Downloading image");
            let fetched = state.fetcher.fetch(&url).await?;
            persist(&state.dirs.raw, &format!(".{}", fetched.extension), fetched.bytes).await?
        }
        (None, None) => return Err(IngestError::MissingField),
    };

    ensure_allowed_extension(&stored.filename)?;
    Ok(stored)
}

async fn ingest_base64(state: &AppState, text: &str) -> Result<DecodedImage, IngestError> {
    let bytes = decode_base64(text)?;
    let ext = sniff_extension(&bytes)
        .ok_or_else(|| IngestError::Content("unrecognized image format".to_string()))?;

    let bytes = if state.config.persist_api_uploads {
        persist(&state.dirs.api, &format!(".{}", ext), bytes).await?.bytes
    } else {
        bytes
    };

    tokio::task::spawn_blocking(move || DecodedImage::from_bytes(&bytes))
        .await
        .map_err(|e| IngestError::Content(e.to_string()))?
        .map_err(|e| IngestError::Content(e.to_string()))
}

/// Decode a stored upload off the async workers. `None` when it is not an
/// image the decoder understands.
async fn decode_stored(path: PathBuf) -> Option<DecodedImage> {
    let decoded = tokio::task::spawn_blocking({
        let path = path.clone();
        move || DecodedImage::open(&path)
    })
    .await;

    match decoded {
        Ok(Ok(decoded)) => Some(decoded),
        Ok(Err(e)) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to decode upload");
            None
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Decode task failed");
            None
        }
    }
}

fn html(rendered: Result<String, minijinja::Error>) -> Response {
    match rendered {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render template");
            (StatusCode::INTERNAL_SERVER_ERROR, "template error").into_response()
        }
    }
}
