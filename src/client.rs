/// A small blocking client for the caption endpoint, used by the caption-client binary.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use log::debug;

use crate::interface::{CaptionResponse, ErrorResponse};

pub const DEFAULT_API: &str = "http://localhost:8080";

/// Captioning a large image on CPU can be slow.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

pub struct CaptionClient
{
    http: reqwest::blocking::Client,
    base_url: String,
}

impl CaptionClient
{
    pub fn new(base_url: &str) -> anyhow::Result<Self>
    {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(CaptionClient { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn caption_url(&self) -> String
    {
        format!("{}/caption", self.base_url)
    }

    /// Uploads the image file and returns its caption.
    /// A non-success response is turned into an error carrying the server's message.
    pub fn caption_file(&self, path: &Path) -> anyhow::Result<String>
    {
        let form = reqwest::blocking::multipart::Form::new()
            .file("file", path)
            .with_context(|| format!("Unable to read {}", path.display()))?;

        debug!("Posting {} to {}", path.display(), self.caption_url());
        let response = self.http.post(self.caption_url())
            .multipart(form)
            .send()
            .with_context(|| format!("Unable to reach {}", self.caption_url()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>() {
                Ok(body) => body.error,
                Err(_) => "no error message".to_string(),
            };
            anyhow::bail!("Server responded {}: {}", status, message);
        }

        let body: CaptionResponse = response.json()?;
        Ok(body.caption)
    }
}

#[cfg(test)]
mod tests
{
    use std::io::Write;

    use super::*;
    use crate::server;
    use crate::state::CaptionerState;
    use crate::state::tests::{png_bytes, test_captioner};

    #[test]
    fn trailing_slash_is_ignored()
    {
        let client = CaptionClient::new("http://captions.internal:8080/").unwrap();
        assert_eq!(client.caption_url(), "http://captions.internal:8080/caption");
    }

    #[test]
    fn missing_file_is_an_error()
    {
        let client = CaptionClient::new(DEFAULT_API).unwrap();
        let result = client.caption_file(Path::new("does/not/exist.png"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn round_trip_through_the_server()
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = server::router(CaptionerState::new(test_captioner()), 1024 * 1024);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        image.write_all(&png_bytes(200)).unwrap();
        let mut garbage = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        garbage.write_all(b"not a png").unwrap();

        let (caption, failure) = tokio::task::spawn_blocking(move || {
            let client = CaptionClient::new(&format!("http://{}", addr)).unwrap();
            (client.caption_file(image.path()), client.caption_file(garbage.path()))
        }).await.unwrap();

        assert_eq!(caption.unwrap(), "A cat");
        let failure = failure.unwrap_err().to_string();
        assert!(failure.contains("400"), "{}", failure);
        assert!(failure.contains("Unable to decode image"), "{}", failure);
    }
}
