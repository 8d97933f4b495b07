use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser};

use crate::decoding::{DecodeOptions, END_TOKEN, MAX_LEN, START_TOKEN};
use crate::preprocessing::IMAGE_INPUT_SIZE;

/// 20 MiB, enough for any photo straight off a phone.
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Serves captions for uploaded images.
#[derive(Debug, Clone, Parser)]
#[command(name = "captioner", version, about)]
pub struct ServerConfig
{
    #[arg(long, env = "CAPTION_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Largest accepted upload, in bytes.
    #[arg(long, env = "CAPTION_BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    #[command(flatten)]
    pub model: ModelConfig,
}

impl ServerConfig
{
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr>
    {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|e| anyhow::anyhow!("Invalid listen address {:?}: {}", addr, e))
    }
}

/// Where the models live, and how to run them.
#[derive(Debug, Clone, Args)]
pub struct ModelConfig
{
    /// Directory holding feature_extractor.onnx, model.onnx and tokenizer.json.
    #[arg(long, env = "CAPTION_MODEL_DIR", default_value = "models")]
    pub model_dir: PathBuf,

    /// Overrides <model-dir>/feature_extractor.onnx.
    #[arg(long, env = "CAPTION_FEATURE_EXTRACTOR")]
    pub feature_extractor: Option<PathBuf>,

    /// Overrides <model-dir>/model.onnx.
    #[arg(long, env = "CAPTION_MODEL")]
    pub caption_model: Option<PathBuf>,

    /// Overrides <model-dir>/tokenizer.json.
    #[arg(long, env = "CAPTION_TOKENIZER")]
    pub tokenizer: Option<PathBuf>,

    /// Length the word sequence is padded to; also the most words a caption can have.
    #[arg(long, env = "CAPTION_MAX_LEN", default_value_t = MAX_LEN)]
    pub max_len: usize,

    /// Side of the square the image is resized to before feature extraction.
    #[arg(long, env = "CAPTION_IMAGE_SIZE", default_value_t = IMAGE_INPUT_SIZE)]
    pub image_size: u32,

    #[arg(long, default_value = START_TOKEN)]
    pub start_token: String,

    #[arg(long, default_value = END_TOKEN)]
    pub end_token: String,

    #[arg(long, env = "CAPTION_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,
}

impl ModelConfig
{
    pub fn feature_extractor_path(&self) -> PathBuf
    {
        self.feature_extractor.clone().unwrap_or_else(|| self.model_dir.join("feature_extractor.onnx"))
    }

    pub fn caption_model_path(&self) -> PathBuf
    {
        self.caption_model.clone().unwrap_or_else(|| self.model_dir.join("model.onnx"))
    }

    pub fn tokenizer_path(&self) -> PathBuf
    {
        self.tokenizer.clone().unwrap_or_else(|| self.model_dir.join("tokenizer.json"))
    }

    pub fn decode_options(&self) -> DecodeOptions
    {
        DecodeOptions {
            max_len: self.max_len,
            start_token: self.start_token.clone(),
            end_token: self.end_token.clone(),
        }
    }
}
