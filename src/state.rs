use std::sync::Arc;

use image::DynamicImage;
use log::{debug, info};

use crate::config::ModelConfig;
use crate::decoding::{self, DecodeOptions};
use crate::error::{Error, Result};
use crate::models::{FeatureEncoder, NextWordPredictor, OnnxCaptionModel, OnnxFeatureEncoder};
use crate::preprocessing;
use crate::vocab::Vocabulary;

/// Everything needed to caption an image, loaded once at startup and shared read-only by every request.
/// Nothing in here is mutated after construction, so it is shared behind an Arc without a lock.
pub struct Captioner
{
    encoder: Box<dyn FeatureEncoder>,
    predictor: Box<dyn NextWordPredictor>,
    vocabulary: Vocabulary,
    options: DecodeOptions,
    image_size: u32,
}

impl Captioner
{
    pub fn new(
        encoder: Box<dyn FeatureEncoder>,
        predictor: Box<dyn NextWordPredictor>,
        vocabulary: Vocabulary,
        options: DecodeOptions,
        image_size: u32,
    ) -> Self
    {
        Captioner { encoder, predictor, vocabulary, options, image_size }
    }

    /// Loads the vocabulary and both ONNX models named by the config.
    /// Any failure here is fatal; the server must not start without them.
    pub fn load(config: &ModelConfig) -> Result<Self>
    {
        let tokenizer_path = config.tokenizer_path();
        info!("Loading vocabulary from {}", tokenizer_path.display());
        let vocabulary = Vocabulary::load(&tokenizer_path)?;
        info!("Vocabulary has {} words", vocabulary.len());

        let feature_extractor_path = config.feature_extractor_path();
        info!("Loading feature extractor from {}", feature_extractor_path.display());
        let now = std::time::Instant::now();
        let encoder = OnnxFeatureEncoder::new(&feature_extractor_path, config.intra_threads)
            .map_err(Error::Model)?;
        info!("Feature extractor took {:?} to load", now.elapsed());

        let caption_model_path = config.caption_model_path();
        info!("Loading caption model from {}", caption_model_path.display());
        let now = std::time::Instant::now();
        let predictor = OnnxCaptionModel::new(&caption_model_path, config.intra_threads)
            .map_err(Error::Model)?;
        info!("Caption model took {:?} to load", now.elapsed());

        Ok(Self::new(
            Box::new(encoder),
            Box::new(predictor),
            vocabulary,
            config.decode_options(),
            config.image_size,
        ))
    }

    pub fn vocabulary(&self) -> &Vocabulary
    {
        &self.vocabulary
    }

    pub fn options(&self) -> &DecodeOptions
    {
        &self.options
    }

    /// Extracts the image features and decodes a caption from them.
    pub fn caption_image(&self, image: &DynamicImage) -> Result<String>
    {
        debug!("Captioning {}x{} image", image.width(), image.height());
        let input = preprocessing::image_to_encoder_input(image, self.image_size);
        let features = self.encoder.encode(input).map_err(Error::Inference)?;

        decoding::greedy_decode(features.view(), &self.vocabulary, self.predictor.as_ref(), &self.options)
    }

    /// As caption_image(), for an encoded (PNG, JPEG, ...) image.
    pub fn caption_bytes(&self, bytes: &[u8]) -> Result<String>
    {
        let image = preprocessing::decode_image(bytes)?;
        self.caption_image(&image)
    }
}

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct CaptionerState(pub Arc<Captioner>);

impl CaptionerState
{
    pub fn new(captioner: Captioner) -> Self
    {
        CaptionerState(Arc::new(captioner))
    }
}
