use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};

use crate::interface::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Error loading vocabulary: {0}")]
    Vocabulary(String),
    #[error("Unable to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Error loading model: {0:#}")]
    Model(anyhow::Error),
    #[error("Error running inference: {0:#}")]
    Inference(anyhow::Error),
    #[error(transparent)]
    Multipart(#[from] axum::extract::multipart::MultipartError),
    #[error(transparent)]
    NotMultipart(#[from] axum::extract::multipart::MultipartRejection),
    #[error("The request did not contain an image file.")]
    MissingImage,
    #[error("The captioning task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error
{
    /// The status code reported to HTTP callers.
    /// Anything the caller sent us that we cannot use is a 400; the rest is on us.
    pub fn status_code(&self) -> StatusCode
    {
        match self {
            Error::ImageDecode(_) | Error::Multipart(_) | Error::NotMultipart(_) | Error::MissingImage => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
      S: serde::ser::Serializer,
    {
      serializer.serialize_str(self.to_string().as_ref())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse { error: self.to_string() };
        (status, Json(body)).into_response()
    }
}
