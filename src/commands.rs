use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Html;
use axum::Json;
use log::{info, warn};

use crate::error::{Error, Result};
use crate::interface::{CaptionResponse, HealthResponse};
use crate::state::CaptionerState;

/// The multipart field the image is expected in.
pub const IMAGE_FIELD: &str = "file";

/// Generates a caption for an uploaded image.
/// Expects a multipart form with the image in the `file` field. If no field has that name,
/// the first field with any data in it is used, so that clients which name the field differently still work.
///
/// Inference is CPU-bound and may take a while, so it runs on the blocking thread pool.
pub async fn caption(
        State(state): State<CaptionerState>,
        multipart: std::result::Result<Multipart, MultipartRejection>,
    ) -> Result<Json<CaptionResponse>>
{
    let mut multipart = multipart
        .inspect_err(|e| warn!("Rejected caption request: {}", e))?;
    let (filename, bytes) = read_image_field(&mut multipart).await
        .inspect_err(|e| warn!("Rejected caption request: {}", e))?;

    let captioner = state.0.clone();
    let now = std::time::Instant::now();
    let caption = tokio::task::spawn_blocking(move || captioner.caption_bytes(&bytes))
        .await?
        .inspect_err(|e| warn!("Failed to caption {:?}: {}", filename, e))?;
    info!("Captioned {:?} in {:?}: {:?}", filename, now.elapsed(), caption);

    Ok(Json(CaptionResponse { caption }))
}

/// Reports that the server is up, along with the shape of the loaded vocabulary.
pub async fn health(State(state): State<CaptionerState>) -> Json<HealthResponse>
{
    Json(HealthResponse {
        status: "ok".to_string(),
        vocabulary_size: state.0.vocabulary().len(),
        max_len: state.0.options().max_len,
    })
}

/// Serves the upload page.
pub async fn index() -> Html<&'static str>
{
    Html(include_str!("../assets/index.html"))
}

async fn read_image_field(multipart: &mut Multipart) -> Result<(Option<String>, Vec<u8>)>
{
    let mut fallback: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let is_image_field = field.name() == Some(IMAGE_FIELD);
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;

        if is_image_field {
            return Ok((filename, bytes.to_vec()));
        }
        if fallback.is_none() && !bytes.is_empty() {
            fallback = Some((filename, bytes.to_vec()));
        }
    }

    fallback.ok_or(Error::MissingImage)
}
